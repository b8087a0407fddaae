// Vulkan backend - `Backend` over ash
//
// Owns the loader entry, the instance and device function tables, and the
// extension loaders. Loaders are created alongside the object they hang off
// and dropped when that object is destroyed.

use ash::extensions::{ext, khr};
use ash::prelude::VkResult;
use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};

use super::{
    Backend, DeviceDesc, InstanceDesc, PipelineDescription, RenderPassDescription, Resource,
    SwapchainRequest,
};
use crate::window::WindowSource;

pub struct AshBackend {
    entry: Entry,
    instance: Option<ash::Instance>,
    debug_utils: Option<ext::DebugUtils>,
    surface_loader: Option<khr::Surface>,
    device: Option<ash::Device>,
    swapchain_loader: Option<khr::Swapchain>,
}

impl AshBackend {
    /// Loads the Vulkan library.
    pub fn new() -> Result<Self, ash::LoadingError> {
        let entry = unsafe { Entry::load() }?;
        Ok(Self {
            entry,
            instance: None,
            debug_utils: None,
            surface_loader: None,
            device: None,
            swapchain_loader: None,
        })
    }

    fn instance(&self) -> VkResult<&ash::Instance> {
        self.instance
            .as_ref()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn surface_loader(&self) -> VkResult<&khr::Surface> {
        self.surface_loader
            .as_ref()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn device(&self) -> VkResult<&ash::Device> {
        self.device
            .as_ref()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn swapchain_loader(&self) -> VkResult<&khr::Swapchain> {
        self.swapchain_loader
            .as_ref()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }
}

fn name_pointers(names: &[CString]) -> Vec<*const c_char> {
    names.iter().map(|name| name.as_ptr()).collect()
}

/// Copies a fixed-size, NUL-terminated name out of a properties struct.
fn fixed_name(raw: &[c_char]) -> CString {
    unsafe { CStr::from_ptr(raw.as_ptr()) }.to_owned()
}

impl Backend for AshBackend {
    fn available_instance_extensions(&self) -> VkResult<Vec<CString>> {
        Ok(self
            .entry
            .enumerate_instance_extension_properties(None)?
            .iter()
            .map(|p| fixed_name(&p.extension_name))
            .collect())
    }

    fn available_layers(&self) -> VkResult<Vec<CString>> {
        Ok(self
            .entry
            .enumerate_instance_layer_properties()?
            .iter()
            .map(|p| fixed_name(&p.layer_name))
            .collect())
    }

    fn create_instance(&mut self, desc: &InstanceDesc) -> VkResult<vk::Instance> {
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&desc.app_name)
            .application_version(desc.app_version)
            .engine_name(&desc.engine_name)
            .engine_version(desc.engine_version)
            .api_version(desc.api_version);

        let extensions = name_pointers(&desc.extensions);
        let layers = name_pointers(&desc.layers);

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { self.entry.create_instance(&create_info, None) }?;

        // The debug-utils loader only exists if the extension was enabled.
        let debug_enabled = desc
            .extensions
            .iter()
            .any(|name| name.as_c_str() == ext::DebugUtils::name());
        self.debug_utils = debug_enabled.then(|| ext::DebugUtils::new(&self.entry, &instance));
        self.surface_loader = Some(khr::Surface::new(&self.entry, &instance));

        let handle = instance.handle();
        self.instance = Some(instance);
        Ok(handle)
    }

    fn create_debug_messenger(&mut self) -> VkResult<Option<vk::DebugUtilsMessengerEXT>> {
        let Some(debug_utils) = self.debug_utils.as_ref() else {
            return Ok(None);
        };

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }?;
        Ok(Some(messenger))
    }

    fn create_surface(&mut self, window: &dyn WindowSource) -> VkResult<vk::SurfaceKHR> {
        let instance = self.instance()?;
        unsafe {
            ash_window::create_surface(
                &self.entry,
                instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
    }

    fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance()?.enumerate_physical_devices() }
    }

    fn device_name(&self, physical_device: vk::PhysicalDevice) -> String {
        match self.instance() {
            Ok(instance) => {
                let properties = unsafe { instance.get_physical_device_properties(physical_device) };
                fixed_name(&properties.device_name)
                    .to_string_lossy()
                    .into_owned()
            }
            Err(_) => String::from("<unknown>"),
        }
    }

    fn queue_families(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>> {
        let instance = self.instance()?;
        Ok(unsafe { instance.get_physical_device_queue_family_properties(physical_device) })
    }

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        unsafe {
            self.surface_loader()?.get_physical_device_surface_support(
                physical_device,
                queue_family,
                surface,
            )
        }
    }

    fn device_extensions(&self, physical_device: vk::PhysicalDevice) -> VkResult<Vec<CString>> {
        let properties =
            unsafe { self.instance()?.enumerate_device_extension_properties(physical_device) }?;
        Ok(properties
            .iter()
            .map(|p| fixed_name(&p.extension_name))
            .collect())
    }

    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_capabilities(physical_device, surface)
        }
    }

    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_formats(physical_device, surface)
        }
    }

    fn present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_present_modes(physical_device, surface)
        }
    }

    fn create_device(&mut self, desc: &DeviceDesc) -> VkResult<vk::Device> {
        let instance = self.instance()?;

        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = desc
            .queue_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions = name_pointers(&desc.extensions);
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(desc.physical_device, &create_info, None) }?;

        let swapchain_loader = khr::Swapchain::new(instance, &device);
        let handle = device.handle();
        self.swapchain_loader = Some(swapchain_loader);
        self.device = Some(device);
        Ok(handle)
    }

    fn device_queue(&self, queue_family: u32, index: u32) -> VkResult<vk::Queue> {
        Ok(unsafe { self.device()?.get_device_queue(queue_family, index) })
    }

    fn create_swapchain(&mut self, request: &SwapchainRequest) -> VkResult<vk::SwapchainKHR> {
        let negotiation = &request.negotiation;
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(request.surface)
            .min_image_count(negotiation.image_count)
            .image_format(negotiation.format.format)
            .image_color_space(negotiation.format.color_space)
            .image_extent(negotiation.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(request.sharing_mode)
            .queue_family_indices(&request.queue_family_indices)
            .pre_transform(negotiation.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(negotiation.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        unsafe { self.swapchain_loader()?.create_swapchain(&create_info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader()?.get_swapchain_images(swapchain) }
    }

    fn create_image_view(
        &mut self,
        image: vk::Image,
        format: vk::Format,
    ) -> VkResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe { self.device()?.create_image_view(&create_info, None) }
    }

    fn create_shader_module(&mut self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe { self.device()?.create_shader_module(&create_info, None) }
    }

    fn create_render_pass(&mut self, desc: &RenderPassDescription) -> VkResult<vk::RenderPass> {
        let color_references = [*desc.color_reference()];
        let subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_references)
            .build();

        let attachments = [*desc.color_attachment()];
        let subpasses = [subpass];
        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(desc.dependencies());

        unsafe { self.device()?.create_render_pass(&create_info, None) }
    }

    fn create_pipeline_layout(&mut self) -> VkResult<vk::PipelineLayout> {
        let create_info = vk::PipelineLayoutCreateInfo::builder();
        unsafe { self.device()?.create_pipeline_layout(&create_info, None) }
    }

    fn create_graphics_pipeline(&mut self, desc: &PipelineDescription) -> VkResult<vk::Pipeline> {
        let device = self.device()?;

        let stages: Vec<_> = desc
            .stages()
            .iter()
            .map(|stage| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage.stage)
                    .module(stage.module)
                    .name(stage.entry_point)
                    .build()
            })
            .collect();

        // Vertices are generated in the shader.
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder();

        let viewports = [*desc.viewport()];
        let scissors = [*desc.scissor()];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let blend_attachments = [*desc.color_blend_attachment()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(desc.input_assembly())
            .viewport_state(&viewport_state)
            .rasterization_state(desc.rasterization())
            .multisample_state(desc.multisample())
            .color_blend_state(&color_blending)
            .layout(desc.layout())
            .render_pass(desc.render_pass())
            .subpass(0)
            .base_pipeline_handle(vk::Pipeline::null())
            .base_pipeline_index(-1)
            .build();

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| e)?;

        pipelines
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn destroy(&mut self, resource: Resource) {
        match resource {
            Resource::Instance(_) => {
                self.debug_utils = None;
                self.surface_loader = None;
                if let Some(instance) = self.instance.take() {
                    unsafe { instance.destroy_instance(None) };
                }
            }
            Resource::DebugMessenger(messenger) => {
                if let Some(debug_utils) = &self.debug_utils {
                    unsafe { debug_utils.destroy_debug_utils_messenger(messenger, None) };
                }
            }
            Resource::Surface(surface) => {
                if let Some(surface_loader) = &self.surface_loader {
                    unsafe { surface_loader.destroy_surface(surface, None) };
                }
            }
            Resource::Device(_) => {
                self.swapchain_loader = None;
                if let Some(device) = self.device.take() {
                    unsafe {
                        let _ = device.device_wait_idle();
                        device.destroy_device(None);
                    }
                }
            }
            Resource::Swapchain(swapchain) => {
                if let Some(swapchain_loader) = &self.swapchain_loader {
                    unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                }
            }
            Resource::ImageView(view) => {
                if let Some(device) = &self.device {
                    unsafe { device.destroy_image_view(view, None) };
                }
            }
            Resource::ShaderModule(module) => {
                if let Some(device) = &self.device {
                    unsafe { device.destroy_shader_module(module, None) };
                }
            }
            Resource::RenderPass(render_pass) => {
                if let Some(device) = &self.device {
                    unsafe { device.destroy_render_pass(render_pass, None) };
                }
            }
            Resource::PipelineLayout(layout) => {
                if let Some(device) = &self.device {
                    unsafe { device.destroy_pipeline_layout(layout, None) };
                }
            }
            Resource::Pipeline(pipeline) => {
                if let Some(device) = &self.device {
                    unsafe { device.destroy_pipeline(pipeline, None) };
                }
            }
        }
    }
}

/// Forwards validation messages to `log` at the matching level.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("[Vulkan] {}", message),
        _ => log::trace!("[Vulkan] {}", message),
    }

    vk::FALSE
}
