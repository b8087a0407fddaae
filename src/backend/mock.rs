// Scripted in-memory backend for unit tests.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use glam::UVec2;
use raw_window_handle::{
    HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle,
    XlibDisplayHandle, XlibWindowHandle,
};
use std::cell::RefCell;
use std::ffi::CString;
use std::rc::Rc;

use super::{
    Backend, DeviceDesc, InstanceDesc, PipelineDescription, RenderPassDescription, Resource,
    SwapchainRequest,
};
use crate::window::WindowSource;

const PHYSICAL_DEVICE_BASE: u64 = 0x1000;
const IMAGE_BASE: u64 = 0x5000;
const QUEUE_BASE: u64 = 0x9000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Create(Resource),
    Destroy(Resource),
}

/// Where the next matching create call should be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Instance,
    DebugMessenger,
    Surface,
    Device,
    Swapchain,
    ImageView,
    ShaderModule,
    RenderPass,
    PipelineLayout,
    Pipeline,
}

#[derive(Debug, Clone)]
pub struct MockDevice {
    pub name: &'static str,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    /// Presentation support per queue family index.
    pub present_support: Vec<bool>,
    pub extensions: Vec<CString>,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

pub fn family(flags: vk::QueueFlags, queue_count: u32) -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties {
        queue_flags: flags,
        queue_count,
        ..Default::default()
    }
}

impl MockDevice {
    /// One graphics+present family, the swapchain extension, and a typical surface.
    pub fn capable(name: &'static str) -> Self {
        Self {
            name,
            queue_families: vec![family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 1)],
            present_support: vec![true],
            extensions: vec![c"VK_KHR_swapchain".to_owned()],
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                max_image_array_layers: 1,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }
}

pub struct MockBackend {
    pub instance_extensions: Vec<CString>,
    pub layers: Vec<CString>,
    pub devices: Vec<MockDevice>,
    pub debug_capability: bool,
    pub swapchain_image_count: u64,
    pub fail_at: Option<FailPoint>,
    pub instance_requests: Vec<InstanceDesc>,
    pub device_requests: Vec<DeviceDesc>,
    pub swapchain_requests: Vec<SwapchainRequest>,
    pub render_passes: Vec<RenderPassDescription>,
    pub pipelines: Vec<PipelineDescription>,
    log: Rc<RefCell<Vec<Call>>>,
    next_handle: u64,
    selected: Option<usize>,
    debug_enabled: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            instance_extensions: vec![
                c"VK_KHR_surface".to_owned(),
                c"VK_KHR_xlib_surface".to_owned(),
                c"VK_EXT_debug_utils".to_owned(),
            ],
            layers: vec![c"VK_LAYER_KHRONOS_validation".to_owned()],
            devices: vec![MockDevice::capable("mock gpu")],
            debug_capability: true,
            swapchain_image_count: 3,
            fail_at: None,
            instance_requests: Vec::new(),
            device_requests: Vec::new(),
            swapchain_requests: Vec::new(),
            render_passes: Vec::new(),
            pipelines: Vec::new(),
            log: Rc::new(RefCell::new(Vec::new())),
            next_handle: 0,
            selected: None,
            debug_enabled: false,
        }
    }

    pub fn failing_at(mut self, point: FailPoint) -> Self {
        self.fail_at = Some(point);
        self
    }

    /// Shared handle on the call log; stays readable after the backend is dropped.
    pub fn log(&self) -> Rc<RefCell<Vec<Call>>> {
        Rc::clone(&self.log)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    fn fail_if(&self, point: FailPoint, error: vk::Result) -> VkResult<()> {
        if self.fail_at == Some(point) {
            Err(error)
        } else {
            Ok(())
        }
    }

    fn create<H: Handle + Copy>(&mut self, wrap: fn(H) -> Resource) -> H {
        self.next_handle += 1;
        let handle = H::from_raw(self.next_handle);
        self.log.borrow_mut().push(Call::Create(wrap(handle)));
        handle
    }

    fn device(&self, physical_device: vk::PhysicalDevice) -> VkResult<&MockDevice> {
        physical_device
            .as_raw()
            .checked_sub(PHYSICAL_DEVICE_BASE)
            .and_then(|index| self.devices.get(index as usize))
            .ok_or(vk::Result::ERROR_DEVICE_LOST)
    }
}

impl Backend for MockBackend {
    fn available_instance_extensions(&self) -> VkResult<Vec<CString>> {
        Ok(self.instance_extensions.clone())
    }

    fn available_layers(&self) -> VkResult<Vec<CString>> {
        Ok(self.layers.clone())
    }

    fn create_instance(&mut self, desc: &InstanceDesc) -> VkResult<vk::Instance> {
        self.fail_if(FailPoint::Instance, vk::Result::ERROR_INCOMPATIBLE_DRIVER)?;
        self.instance_requests.push(desc.clone());
        self.debug_enabled = self.debug_capability
            && desc
                .extensions
                .iter()
                .any(|name| name.as_c_str() == c"VK_EXT_debug_utils");
        Ok(self.create(Resource::Instance))
    }

    fn create_debug_messenger(&mut self) -> VkResult<Option<vk::DebugUtilsMessengerEXT>> {
        if !self.debug_enabled {
            return Ok(None);
        }
        self.fail_if(FailPoint::DebugMessenger, vk::Result::ERROR_OUT_OF_HOST_MEMORY)?;
        Ok(Some(self.create(Resource::DebugMessenger)))
    }

    fn create_surface(&mut self, _window: &dyn WindowSource) -> VkResult<vk::SurfaceKHR> {
        self.fail_if(FailPoint::Surface, vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR)?;
        Ok(self.create(Resource::Surface))
    }

    fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        Ok((0..self.devices.len() as u64)
            .map(|index| vk::PhysicalDevice::from_raw(PHYSICAL_DEVICE_BASE + index))
            .collect())
    }

    fn device_name(&self, physical_device: vk::PhysicalDevice) -> String {
        self.device(physical_device)
            .map(|device| device.name.to_string())
            .unwrap_or_default()
    }

    fn queue_families(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>> {
        Ok(self.device(physical_device)?.queue_families.clone())
    }

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        let device = self.device(physical_device)?;
        Ok(device
            .present_support
            .get(queue_family as usize)
            .copied()
            .unwrap_or(false))
    }

    fn device_extensions(&self, physical_device: vk::PhysicalDevice) -> VkResult<Vec<CString>> {
        Ok(self.device(physical_device)?.extensions.clone())
    }

    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        Ok(self.device(physical_device)?.capabilities)
    }

    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.device(physical_device)?.formats.clone())
    }

    fn present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.device(physical_device)?.present_modes.clone())
    }

    fn create_device(&mut self, desc: &DeviceDesc) -> VkResult<vk::Device> {
        self.fail_if(FailPoint::Device, vk::Result::ERROR_FEATURE_NOT_PRESENT)?;
        self.selected = Some((desc.physical_device.as_raw() - PHYSICAL_DEVICE_BASE) as usize);
        self.device_requests.push(desc.clone());
        Ok(self.create(Resource::Device))
    }

    fn device_queue(&self, queue_family: u32, index: u32) -> VkResult<vk::Queue> {
        self.selected.ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
        Ok(vk::Queue::from_raw(
            QUEUE_BASE + u64::from(queue_family) * 16 + u64::from(index),
        ))
    }

    fn create_swapchain(&mut self, request: &SwapchainRequest) -> VkResult<vk::SwapchainKHR> {
        self.fail_if(FailPoint::Swapchain, vk::Result::ERROR_SURFACE_LOST_KHR)?;
        self.swapchain_requests.push(request.clone());
        Ok(self.create(Resource::Swapchain))
    }

    fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        Ok((0..self.swapchain_image_count)
            .map(|index| vk::Image::from_raw(IMAGE_BASE + index))
            .collect())
    }

    fn create_image_view(
        &mut self,
        _image: vk::Image,
        _format: vk::Format,
    ) -> VkResult<vk::ImageView> {
        self.fail_if(FailPoint::ImageView, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)?;
        Ok(self.create(Resource::ImageView))
    }

    fn create_shader_module(&mut self, _code: &[u32]) -> VkResult<vk::ShaderModule> {
        self.fail_if(FailPoint::ShaderModule, vk::Result::ERROR_INVALID_SHADER_NV)?;
        Ok(self.create(Resource::ShaderModule))
    }

    fn create_render_pass(&mut self, desc: &RenderPassDescription) -> VkResult<vk::RenderPass> {
        self.fail_if(FailPoint::RenderPass, vk::Result::ERROR_OUT_OF_HOST_MEMORY)?;
        self.render_passes.push(*desc);
        Ok(self.create(Resource::RenderPass))
    }

    fn create_pipeline_layout(&mut self) -> VkResult<vk::PipelineLayout> {
        self.fail_if(FailPoint::PipelineLayout, vk::Result::ERROR_OUT_OF_HOST_MEMORY)?;
        Ok(self.create(Resource::PipelineLayout))
    }

    fn create_graphics_pipeline(&mut self, desc: &PipelineDescription) -> VkResult<vk::Pipeline> {
        self.fail_if(FailPoint::Pipeline, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)?;
        self.pipelines.push(desc.clone());
        Ok(self.create(Resource::Pipeline))
    }

    fn destroy(&mut self, resource: Resource) {
        self.log.borrow_mut().push(Call::Destroy(resource));
    }
}

/// Window stand-in with a fixed framebuffer size.
pub struct MockWindow {
    pub size: UVec2,
    pub extensions: Vec<CString>,
}

impl MockWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: UVec2::new(width, height),
            extensions: vec![c"VK_KHR_surface".to_owned(), c"VK_KHR_xlib_surface".to_owned()],
        }
    }
}

unsafe impl HasRawWindowHandle for MockWindow {
    fn raw_window_handle(&self) -> RawWindowHandle {
        RawWindowHandle::Xlib(XlibWindowHandle::empty())
    }
}

unsafe impl HasRawDisplayHandle for MockWindow {
    fn raw_display_handle(&self) -> RawDisplayHandle {
        RawDisplayHandle::Xlib(XlibDisplayHandle::empty())
    }
}

impl WindowSource for MockWindow {
    fn framebuffer_size(&self) -> UVec2 {
        self.size
    }

    fn required_extensions(&self) -> VkResult<Vec<CString>> {
        Ok(self.extensions.clone())
    }
}

/// Smallest blob that passes SPIR-V word and magic checks.
pub fn spirv_blob() -> Vec<u8> {
    [0x0723_0203u32, 0x0001_0000, 0, 1, 0]
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .collect()
}
