// Backend module - the narrow seam between the bootstrap sequence and Vulkan
//
// Design: every graphics-API call the bootstrap makes goes through `Backend`.
// `AshBackend` talks to the real driver; tests script a `MockBackend`.

pub mod capabilities;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod vulkan;

#[cfg(test)]
pub(crate) mod mock;

pub use device::{DeviceContext, DeviceDesc, QueueFamilies, QueueFamilyIndices, SelectedDevice};
pub use pipeline::{GraphicsPipeline, PipelineDescription, RenderPassDescription, ShaderStage};
pub use shader::{ShaderBinaries, ShaderBinary};
pub use swapchain::{SurfaceNegotiation, Swapchain, SwapchainImage, SwapchainRequest, SwapchainSupport};
pub use vulkan::AshBackend;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::ffi::CString;

use crate::window::WindowSource;

/// What the instance is created with.
#[derive(Debug, Clone)]
pub struct InstanceDesc {
    pub app_name: CString,
    pub app_version: u32,
    pub engine_name: CString,
    pub engine_version: u32,
    pub api_version: u32,
    pub extensions: Vec<CString>,
    pub layers: Vec<CString>,
}

/// Every kind of handle the bootstrap creates and must later destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Instance(vk::Instance),
    DebugMessenger(vk::DebugUtilsMessengerEXT),
    Surface(vk::SurfaceKHR),
    Device(vk::Device),
    Swapchain(vk::SwapchainKHR),
    ImageView(vk::ImageView),
    ShaderModule(vk::ShaderModule),
    RenderPass(vk::RenderPass),
    PipelineLayout(vk::PipelineLayout),
    Pipeline(vk::Pipeline),
}

impl Resource {
    pub fn is_null(&self) -> bool {
        let raw = match *self {
            Resource::Instance(h) => h.as_raw(),
            Resource::DebugMessenger(h) => h.as_raw(),
            Resource::Surface(h) => h.as_raw(),
            Resource::Device(h) => h.as_raw(),
            Resource::Swapchain(h) => h.as_raw(),
            Resource::ImageView(h) => h.as_raw(),
            Resource::ShaderModule(h) => h.as_raw(),
            Resource::RenderPass(h) => h.as_raw(),
            Resource::PipelineLayout(h) => h.as_raw(),
            Resource::Pipeline(h) => h.as_raw(),
        };
        raw == 0
    }
}

/// The graphics API as seen by the bootstrap sequence.
///
/// Query methods never create anything. Every `create_*` call that succeeds
/// hands back a handle the caller must eventually pass to [`Backend::destroy`].
pub trait Backend {
    /// Names of every instance extension the loader exposes.
    fn available_instance_extensions(&self) -> VkResult<Vec<CString>>;

    /// Names of every instance layer installed.
    fn available_layers(&self) -> VkResult<Vec<CString>>;

    fn create_instance(&mut self, desc: &InstanceDesc) -> VkResult<vk::Instance>;

    /// Returns `Ok(None)` when the instance was created without the
    /// debug-utils capability.
    fn create_debug_messenger(&mut self) -> VkResult<Option<vk::DebugUtilsMessengerEXT>>;

    fn create_surface(&mut self, window: &dyn WindowSource) -> VkResult<vk::SurfaceKHR>;

    fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>>;

    /// Human readable device name, for logging only.
    fn device_name(&self, physical_device: vk::PhysicalDevice) -> String;

    fn queue_families(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>>;

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool>;

    fn device_extensions(&self, physical_device: vk::PhysicalDevice) -> VkResult<Vec<CString>>;

    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR>;

    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>>;

    fn present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>>;

    fn create_device(&mut self, desc: &DeviceDesc) -> VkResult<vk::Device>;

    fn device_queue(&self, queue_family: u32, index: u32) -> VkResult<vk::Queue>;

    fn create_swapchain(&mut self, request: &SwapchainRequest) -> VkResult<vk::SwapchainKHR>;

    /// Images owned by `swapchain`, in presentation-index order.
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;

    fn create_image_view(&mut self, image: vk::Image, format: vk::Format)
        -> VkResult<vk::ImageView>;

    fn create_shader_module(&mut self, code: &[u32]) -> VkResult<vk::ShaderModule>;

    fn create_render_pass(&mut self, desc: &RenderPassDescription) -> VkResult<vk::RenderPass>;

    /// An empty layout: no descriptor sets, no push constants.
    fn create_pipeline_layout(&mut self) -> VkResult<vk::PipelineLayout>;

    fn create_graphics_pipeline(&mut self, desc: &PipelineDescription) -> VkResult<vk::Pipeline>;

    fn destroy(&mut self, resource: Resource);
}

/// Handles created so far, in creation order.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    created: Vec<Resource>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, resource: Resource) {
        log::trace!("Created {:?}", resource);
        self.created.push(resource);
    }

    pub fn resources(&self) -> &[Resource] {
        &self.created
    }

    pub fn len(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    /// Destroys everything recorded, newest first. The ledger is empty afterwards,
    /// so calling this again does nothing.
    pub fn release_all<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        while let Some(resource) = self.created.pop() {
            if resource.is_null() {
                continue;
            }
            log::trace!("Destroying {:?}", resource);
            backend.destroy(resource);
        }
    }
}
