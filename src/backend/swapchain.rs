// Swapchain - negotiating presentable images with the surface
//
// Picks concrete values from what the surface reports:
// - format: RGBA8/BGRA8 in non-linear sRGB, else whatever comes first
// - present mode: MAILBOX (triple buffered, no tearing), else FIFO
// - extent: the surface's current extent, or the window size clamped to limits
// - image count: one more than the minimum, capped by a nonzero maximum

use ash::prelude::VkResult;
use ash::vk;
use glam::UVec2;

use super::device::DeviceContext;
use super::{Backend, Resource, ResourceLedger};
use crate::error::{InitError, InitResult};

/// Used when the surface accepts any format.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Everything a surface reports about a device's ability to present to it.
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query<B: Backend + ?Sized>(
        backend: &B,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Self> {
        Ok(Self {
            capabilities: backend.surface_capabilities(physical_device, surface)?,
            formats: backend.surface_formats(physical_device, surface)?,
            present_modes: backend.present_modes(physical_device, surface)?,
        })
    }

    /// At least one format and one present mode.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    // A lone UNDEFINED entry means the surface has no preference.
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return PREFERRED_SURFACE_FORMAT;
        }
    }

    let preferred = formats.iter().copied().find(|f| {
        (f.format == vk::Format::R8G8B8A8_UNORM || f.format == vk::Format::B8G8R8A8_UNORM)
            && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });
    if let Some(format) = preferred {
        return format;
    }

    match formats.first() {
        Some(&first) => {
            log::warn!(
                "No sRGB RGBA8/BGRA8 surface format, falling back to {:?} / {:?}",
                first.format,
                first.color_space
            );
            first
        }
        // Unreachable after device selection, which rejects surfaces with no formats.
        None => PREFERRED_SURFACE_FORMAT,
    }
}

pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO) // FIFO is always supported
}

/// `framebuffer_size` is only consulted when the surface lets us pick.
pub fn choose_swap_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: impl FnOnce() -> UVec2,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = UVec2::new(
        capabilities.min_image_extent.width,
        capabilities.min_image_extent.height,
    );
    let max = UVec2::new(
        capabilities.max_image_extent.width,
        capabilities.max_image_extent.height,
    );
    let size = framebuffer_size().min(max).max(min);

    vk::Extent2D {
        width: size.x,
        height: size.y,
    }
}

pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count.saturating_add(1);
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        image_count
    }
}

/// Concrete swapchain parameters chosen for one device/surface pair.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceNegotiation {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SurfaceNegotiation {
    pub fn from_support(
        support: &SwapchainSupport,
        framebuffer_size: impl FnOnce() -> UVec2,
    ) -> Self {
        Self {
            format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_swap_extent(&support.capabilities, framebuffer_size),
            image_count: choose_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        }
    }
}

pub fn negotiate_swapchain<B: Backend + ?Sized>(
    backend: &B,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    framebuffer_size: impl FnOnce() -> UVec2,
) -> VkResult<SurfaceNegotiation> {
    let support = SwapchainSupport::query(backend, physical_device, surface)?;
    let negotiation = SurfaceNegotiation::from_support(&support, framebuffer_size);

    log::debug!(
        "Swapchain negotiation: {:?} / {:?}, {:?}, {}x{}, {} images",
        negotiation.format.format,
        negotiation.format.color_space,
        negotiation.present_mode,
        negotiation.extent.width,
        negotiation.extent.height,
        negotiation.image_count
    );

    Ok(negotiation)
}

/// Everything the backend needs to create the swapchain.
#[derive(Debug, Clone)]
pub struct SwapchainRequest {
    pub surface: vk::SurfaceKHR,
    pub negotiation: SurfaceNegotiation,
    pub sharing_mode: vk::SharingMode,
    /// Empty for exclusive sharing.
    pub queue_family_indices: Vec<u32>,
}

impl SwapchainRequest {
    pub fn new(
        surface: vk::SurfaceKHR,
        negotiation: SurfaceNegotiation,
        device: &DeviceContext,
    ) -> Self {
        // Images must be shareable when two different families touch them.
        let families = device.queue_families;
        let (sharing_mode, queue_family_indices) = if families.graphics != families.present {
            (
                vk::SharingMode::CONCURRENT,
                vec![families.graphics, families.present],
            )
        } else {
            (vk::SharingMode::EXCLUSIVE, Vec::new())
        };

        Self {
            surface,
            negotiation,
            sharing_mode,
            queue_family_indices,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
}

/// A created swapchain and its images, in acquire-index order.
#[derive(Debug, Clone)]
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<SwapchainImage>,
}

/// Creates the swapchain and one view per image. Each handle goes into the
/// ledger as soon as it exists, so views are always released before the
/// swapchain that owns their images.
pub fn create_swapchain<B: Backend + ?Sized>(
    backend: &mut B,
    ledger: &mut ResourceLedger,
    device: &DeviceContext,
    surface: vk::SurfaceKHR,
    negotiation: &SurfaceNegotiation,
) -> InitResult<Swapchain> {
    let request = SwapchainRequest::new(surface, *negotiation, device);
    let handle = backend
        .create_swapchain(&request)
        .map_err(InitError::SwapchainCreation)?;
    ledger.record(Resource::Swapchain(handle));

    let images = backend
        .swapchain_images(handle)
        .map_err(InitError::SwapchainCreation)?;

    let mut swapchain_images = Vec::with_capacity(images.len());
    for image in images {
        let view = backend
            .create_image_view(image, negotiation.format.format)
            .map_err(InitError::ImageViewCreation)?;
        ledger.record(Resource::ImageView(view));
        swapchain_images.push(SwapchainImage { image, view });
    }

    log::info!(
        "Created swapchain with {} images ({}x{}, {:?})",
        swapchain_images.len(),
        negotiation.extent.width,
        negotiation.extent.height,
        negotiation.present_mode
    );

    Ok(Swapchain {
        handle,
        format: negotiation.format,
        present_mode: negotiation.present_mode,
        extent: negotiation.extent,
        images: swapchain_images,
    })
}

#[cfg(test)]
mod tests {
    use super::super::device::QueueFamilies;
    use super::super::mock::{FailPoint, MockBackend};
    use super::*;
    use ash::vk::Handle;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn flexible_capabilities() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    fn device_context(graphics: u32, present: u32) -> DeviceContext {
        DeviceContext {
            physical_device: vk::PhysicalDevice::from_raw(0x1000),
            device: vk::Device::from_raw(7),
            queue_families: QueueFamilies { graphics, present },
            graphics_queue: vk::Queue::from_raw(8),
            present_queue: vk::Queue::from_raw(9),
        }
    }

    fn negotiation() -> SurfaceNegotiation {
        SurfaceNegotiation {
            format: PREFERRED_SURFACE_FORMAT,
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            image_count: 3,
            pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
        }
    }

    #[test]
    fn undefined_format_means_any_format() {
        let chosen = choose_surface_format(&[format(
            vk::Format::UNDEFINED,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )]);

        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn first_srgb_rgba_or_bgra_entry_wins() {
        let chosen = choose_surface_format(&[
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ]);

        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn preferred_entry_is_found_past_the_first() {
        let chosen = choose_surface_format(&[
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ]);

        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn no_match_falls_back_to_first_format() {
        let chosen = choose_surface_format(&[
            format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::HDR10_ST2084_EXT),
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ]);

        assert_eq!(chosen.format, vk::Format::A2B10G10R10_UNORM_PACK32);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::HDR10_ST2084_EXT);
    }

    #[test]
    fn empty_format_list_yields_the_preferred_default() {
        let chosen = choose_surface_format(&[]);

        assert_eq!(chosen.format, PREFERRED_SURFACE_FORMAT.format);
        assert_eq!(chosen.color_space, PREFERRED_SURFACE_FORMAT.color_space);
    }

    #[test]
    fn mailbox_is_preferred_over_fifo() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn fifo_is_the_fallback() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn flexible_extent_uses_framebuffer_size() {
        let extent = choose_swap_extent(&flexible_capabilities(), || UVec2::new(100, 100));

        assert_eq!((extent.width, extent.height), (100, 100));
    }

    #[test]
    fn flexible_extent_is_clamped_per_dimension() {
        let caps = flexible_capabilities();

        let tiny = choose_swap_extent(&caps, || UVec2::new(1, 1));
        let wide = choose_swap_extent(&caps, || UVec2::new(10_000, 32));

        assert_eq!((tiny.width, tiny.height), (64, 64));
        assert_eq!((wide.width, wide.height), (4096, 64));
    }

    #[test]
    fn fixed_extent_is_used_verbatim_without_asking_the_window() {
        let mut caps = flexible_capabilities();
        caps.current_extent = vk::Extent2D {
            width: 1920,
            height: 1080,
        };

        let extent = choose_swap_extent(&caps, || panic!("window size must not be queried"));

        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn image_count_is_min_plus_one_unless_capped() {
        let mut caps = flexible_capabilities();
        caps.min_image_count = 2;
        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);

        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn inadequate_support_is_detected() {
        let support = SwapchainSupport {
            capabilities: flexible_capabilities(),
            formats: vec![PREFERRED_SURFACE_FORMAT],
            present_modes: Vec::new(),
        };

        assert!(!support.is_adequate());
    }

    #[test]
    fn distinct_families_share_images_concurrently() {
        let split = SwapchainRequest::new(
            vk::SurfaceKHR::from_raw(1),
            negotiation(),
            &device_context(0, 2),
        );
        let shared = SwapchainRequest::new(
            vk::SurfaceKHR::from_raw(1),
            negotiation(),
            &device_context(1, 1),
        );

        assert_eq!(split.sharing_mode, vk::SharingMode::CONCURRENT);
        assert_eq!(split.queue_family_indices, vec![0, 2]);
        assert_eq!(shared.sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert!(shared.queue_family_indices.is_empty());
    }

    #[test]
    fn views_are_created_in_image_order_after_the_swapchain() {
        let mut backend = MockBackend::new();
        backend.swapchain_image_count = 3;
        let mut ledger = ResourceLedger::new();

        let swapchain = create_swapchain(
            &mut backend,
            &mut ledger,
            &device_context(0, 0),
            vk::SurfaceKHR::from_raw(1),
            &negotiation(),
        )
        .unwrap();

        assert_eq!(swapchain.images.len(), 3);
        let mut expected = vec![Resource::Swapchain(swapchain.handle)];
        expected.extend(swapchain.images.iter().map(|i| Resource::ImageView(i.view)));
        assert_eq!(ledger.resources(), expected.as_slice());
        assert_eq!(backend.swapchain_requests[0].negotiation.image_count, 3);
    }

    #[test]
    fn rejected_swapchain_is_a_swapchain_error() {
        let mut backend = MockBackend::new().failing_at(FailPoint::Swapchain);
        let mut ledger = ResourceLedger::new();

        let result = create_swapchain(
            &mut backend,
            &mut ledger,
            &device_context(0, 0),
            vk::SurfaceKHR::from_raw(1),
            &negotiation(),
        );

        assert!(matches!(
            result,
            Err(InitError::SwapchainCreation(vk::Result::ERROR_SURFACE_LOST_KHR))
        ));
        assert!(ledger.is_empty());
    }
}
