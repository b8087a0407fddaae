// Vulkan Device - picking a GPU and opening it
//
// Responsibilities:
// - Queue family resolution (graphics + presentation roles)
// - Physical device selection (first suitable candidate wins)
// - Logical device + queue creation

use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::vk;
use std::ffi::{CStr, CString};

use super::capabilities::supports_device_extensions;
use super::swapchain::SwapchainSupport;
use super::{Backend, Resource, ResourceLedger};
use crate::error::{InitError, InitResult};

/// Device extensions every candidate must expose.
pub fn required_device_extensions() -> [&'static CStr; 1] {
    [khr::Swapchain::name()]
}

/// Queue family roles found so far. `None` means "not found", never index 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Graphics is always required; presentation only when the caller presents.
    pub fn is_complete(&self, needs_present: bool) -> bool {
        self.graphics.is_some() && (!needs_present || self.present.is_some())
    }

    /// Both roles assigned, or `None`.
    pub fn resolve(self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// A fully resolved graphics + presentation assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Scans queue families in ascending index order. The first family that
/// qualifies for a role keeps it; the scan stops once every needed role is set.
pub fn resolve_queue_families<B: Backend + ?Sized>(
    backend: &B,
    physical_device: vk::PhysicalDevice,
    surface: Option<vk::SurfaceKHR>,
) -> VkResult<QueueFamilyIndices> {
    let families = backend.queue_families(physical_device)?;
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        if family.queue_count == 0 {
            continue;
        }

        if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(index);
        }

        if let Some(surface) = surface {
            if indices.present.is_none()
                && backend.surface_support(physical_device, index, surface)?
            {
                indices.present = Some(index);
            }
        }

        if indices.is_complete(surface.is_some()) {
            break;
        }
    }

    Ok(indices)
}

/// The device chosen by [`select_physical_device`] and its queue roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedDevice {
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: QueueFamilies,
}

/// Returns the first enumerated device that resolves both queue roles, exposes
/// every required extension, and offers at least one surface format and one
/// present mode for `surface`. There is no ranking among suitable devices.
pub fn select_physical_device<B, N>(
    backend: &B,
    surface: vk::SurfaceKHR,
    required_extensions: &[N],
) -> InitResult<SelectedDevice>
where
    B: Backend + ?Sized,
    N: AsRef<CStr>,
{
    let candidates = backend.enumerate_physical_devices()?;
    if candidates.is_empty() {
        return Err(InitError::NoCompatibleDevice("no GPU with Vulkan support"));
    }

    for physical_device in candidates {
        match evaluate_candidate(backend, physical_device, surface, required_extensions) {
            Ok(Some(selected)) => {
                log::info!("Selected GPU: {}", backend.device_name(physical_device));
                return Ok(selected);
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!(
                    "Skipping GPU {}: query failed ({})",
                    backend.device_name(physical_device),
                    e
                );
            }
        }
    }

    Err(InitError::NoCompatibleDevice(
        "no GPU offers graphics and presentation queues, the swapchain extension, and a usable surface",
    ))
}

fn evaluate_candidate<B, N>(
    backend: &B,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    required_extensions: &[N],
) -> VkResult<Option<SelectedDevice>>
where
    B: Backend + ?Sized,
    N: AsRef<CStr>,
{
    let indices = resolve_queue_families(backend, physical_device, Some(surface))?;
    let extensions_supported =
        supports_device_extensions(backend, physical_device, required_extensions)?;
    let swapchain_adequate = extensions_supported
        && SwapchainSupport::query(backend, physical_device, surface)?.is_adequate();

    log::debug!(
        "GPU {}: queues {:?}, extensions {}, swapchain {}",
        backend.device_name(physical_device),
        indices,
        extensions_supported,
        swapchain_adequate
    );

    Ok(indices
        .resolve()
        .filter(|_| extensions_supported && swapchain_adequate)
        .map(|queue_families| SelectedDevice {
            physical_device,
            queue_families,
        }))
}

/// What the logical device is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDesc {
    pub physical_device: vk::PhysicalDevice,
    /// One queue is requested from each of these families.
    pub queue_families: Vec<u32>,
    pub extensions: Vec<CString>,
}

/// The selected GPU, the device opened on it, and its queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceContext {
    pub physical_device: vk::PhysicalDevice,
    pub device: vk::Device,
    pub queue_families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

pub fn create_logical_device<B: Backend + ?Sized>(
    backend: &mut B,
    ledger: &mut ResourceLedger,
    selected: SelectedDevice,
) -> InitResult<DeviceContext> {
    let desc = DeviceDesc {
        physical_device: selected.physical_device,
        queue_families: selected.queue_families.unique(),
        extensions: required_device_extensions()
            .iter()
            .map(|name| (*name).to_owned())
            .collect(),
    };

    let device = backend
        .create_device(&desc)
        .map_err(InitError::DeviceCreation)?;
    ledger.record(Resource::Device(device));

    let graphics_queue = backend.device_queue(selected.queue_families.graphics, 0)?;
    let present_queue = backend.device_queue(selected.queue_families.present, 0)?;

    log::info!(
        "Created logical device (graphics family {}, present family {})",
        selected.queue_families.graphics,
        selected.queue_families.present
    );

    Ok(DeviceContext {
        physical_device: selected.physical_device,
        device,
        queue_families: selected.queue_families,
        graphics_queue,
        present_queue,
    })
}
