// =============================================================================
// RENDERER - one-shot Vulkan bootstrap
// =============================================================================
//
// Drives the setup sequence exactly once, top to bottom:
//
//   Uninitialized
//     -> InstanceCreated
//     -> DebugHooked            (only with validation + debug-utils available)
//     -> SurfaceCreated
//     -> DeviceSelected
//     -> LogicalDeviceCreated
//     -> SwapchainCreated
//     -> RenderPassCreated
//     -> PipelineCreated
//     -> Ready
//
// The first failing stage aborts the sequence. Whatever was created before it
// stays alive until `teardown` (or Drop) releases it, newest first.
//
// =============================================================================

use ash::extensions::ext::DebugUtils;
use ash::vk;
use std::ffi::{CStr, CString};

use crate::backend::capabilities::{missing_instance_extensions, missing_validation_layers};
use crate::backend::device::{create_logical_device, required_device_extensions, select_physical_device};
use crate::backend::pipeline::{build_pipeline, create_render_pass};
use crate::backend::swapchain::{create_swapchain, negotiate_swapchain};
use crate::backend::{
    Backend, DeviceContext, GraphicsPipeline, InstanceDesc, Resource, ResourceLedger,
    SelectedDevice, ShaderBinaries, Swapchain,
};
use crate::error::{InitError, InitResult};
use crate::window::WindowSource;

/// Layer requested when validation is enabled.
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

const ENGINE_NAME: &CStr = c"Custom";

/// Where the bootstrap sequence currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    InstanceCreated,
    DebugHooked,
    SurfaceCreated,
    DeviceSelected,
    LogicalDeviceCreated,
    SwapchainCreated,
    RenderPassCreated,
    PipelineCreated,
    Ready,
    /// Everything created has been released. Terminal.
    TornDown,
}

/// Caller-provided inputs to the bootstrap.
#[derive(Debug, Clone)]
pub struct RendererOptions {
    pub app_name: CString,
    pub app_version: u32,
    /// Request the Khronos validation layer and hook the debug messenger.
    pub enable_validation: bool,
    pub shaders: ShaderBinaries,
}

/// Owns every handle the bootstrap creates.
pub struct Renderer<B: Backend> {
    backend: B,
    options: RendererOptions,
    state: LifecycleState,
    ledger: ResourceLedger,

    instance: Option<vk::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    surface: Option<vk::SurfaceKHR>,
    selected_device: Option<SelectedDevice>,
    device: Option<DeviceContext>,
    swapchain: Option<Swapchain>,
    render_pass: Option<vk::RenderPass>,
    pipeline: Option<GraphicsPipeline>,
}

impl<B: Backend> Renderer<B> {
    pub fn new(backend: B, options: RendererOptions) -> Self {
        Self {
            backend,
            options,
            state: LifecycleState::Uninitialized,
            ledger: ResourceLedger::new(),
            instance: None,
            debug_messenger: None,
            surface: None,
            selected_device: None,
            device: None,
            swapchain: None,
            render_pass: None,
            pipeline: None,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Runs every stage against `window`. Only valid once, from `Uninitialized`.
    ///
    /// On error the renderer is left in the state of the last completed stage;
    /// nothing is cleaned up until [`Renderer::teardown`] is called.
    pub fn initialize<W: WindowSource>(&mut self, window: &W) -> InitResult<()> {
        if self.state != LifecycleState::Uninitialized {
            return Err(InitError::InvalidState(self.state));
        }

        log::info!("Initializing Vulkan...");
        let result = self.run_stages(window);
        match &result {
            Ok(()) => log::info!("Vulkan initialized successfully!"),
            Err(e) => log::error!("Initialization aborted after {:?}: {}", self.state, e),
        }
        result
    }

    fn run_stages<W: WindowSource>(&mut self, window: &W) -> InitResult<()> {
        self.create_instance(window)?;
        self.hook_debug_messenger()?;
        let surface = self.create_surface(window)?;
        let selected = self.select_device(surface)?;
        let device = self.create_logical_device(selected)?;

        // ─────────────────────────────────────────────────────────────────────
        // Swapchain: negotiated against the surface, then created with views
        // ─────────────────────────────────────────────────────────────────────
        let negotiation = negotiate_swapchain(
            &self.backend,
            device.physical_device,
            surface,
            || window.framebuffer_size(),
        )?;
        let swapchain = create_swapchain(
            &mut self.backend,
            &mut self.ledger,
            &device,
            surface,
            &negotiation,
        )?;
        let (format, extent) = (swapchain.format.format, swapchain.extent);
        self.swapchain = Some(swapchain);
        self.advance(LifecycleState::SwapchainCreated);

        // ─────────────────────────────────────────────────────────────────────
        // Render pass + pipeline
        // ─────────────────────────────────────────────────────────────────────
        let render_pass = create_render_pass(&mut self.backend, &mut self.ledger, format)?;
        self.render_pass = Some(render_pass);
        self.advance(LifecycleState::RenderPassCreated);

        let pipeline = build_pipeline(
            &mut self.backend,
            &mut self.ledger,
            render_pass,
            &self.options.shaders,
            extent,
        )?;
        self.pipeline = Some(pipeline);
        self.advance(LifecycleState::PipelineCreated);

        self.advance(LifecycleState::Ready);
        Ok(())
    }

    fn create_instance<W: WindowSource>(&mut self, window: &W) -> InitResult<()> {
        let mut extensions = window.required_extensions()?;
        let mut layers = Vec::new();

        if self.options.enable_validation {
            let debug_utils = DebugUtils::name();
            if !extensions.iter().any(|name| name.as_c_str() == debug_utils) {
                extensions.push(debug_utils.to_owned());
            }
            layers.push(VALIDATION_LAYER.to_owned());
        }

        let missing = missing_instance_extensions(&self.backend, &extensions)?;
        if !missing.is_empty() {
            return Err(InitError::UnsupportedExtension(missing));
        }

        let missing = missing_validation_layers(&self.backend, &layers)?;
        if !missing.is_empty() {
            return Err(InitError::UnsupportedValidationLayer(missing));
        }

        log::debug!("Instance extensions: {:?}", extensions);
        log::debug!("Instance layers: {:?}", layers);

        let desc = InstanceDesc {
            app_name: self.options.app_name.clone(),
            app_version: self.options.app_version,
            engine_name: ENGINE_NAME.to_owned(),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            api_version: vk::API_VERSION_1_0,
            extensions,
            layers,
        };

        let instance = self
            .backend
            .create_instance(&desc)
            .map_err(InitError::InstanceCreation)?;
        self.ledger.record(Resource::Instance(instance));
        self.instance = Some(instance);
        self.advance(LifecycleState::InstanceCreated);
        Ok(())
    }

    fn hook_debug_messenger(&mut self) -> InitResult<()> {
        if !self.options.enable_validation {
            return Ok(());
        }

        match self
            .backend
            .create_debug_messenger()
            .map_err(InitError::DebugMessenger)?
        {
            Some(messenger) => {
                self.ledger.record(Resource::DebugMessenger(messenger));
                self.debug_messenger = Some(messenger);
                self.advance(LifecycleState::DebugHooked);
            }
            None => log::warn!("Debug utils unavailable, validation output will not be forwarded"),
        }
        Ok(())
    }

    fn create_surface<W: WindowSource>(&mut self, window: &W) -> InitResult<vk::SurfaceKHR> {
        let surface = self
            .backend
            .create_surface(window)
            .map_err(InitError::SurfaceCreation)?;
        self.ledger.record(Resource::Surface(surface));
        self.surface = Some(surface);
        self.advance(LifecycleState::SurfaceCreated);
        Ok(surface)
    }

    fn select_device(&mut self, surface: vk::SurfaceKHR) -> InitResult<SelectedDevice> {
        let selected = select_physical_device(&self.backend, surface, &required_device_extensions())?;
        self.selected_device = Some(selected);
        self.advance(LifecycleState::DeviceSelected);
        Ok(selected)
    }

    fn create_logical_device(&mut self, selected: SelectedDevice) -> InitResult<DeviceContext> {
        let device = create_logical_device(&mut self.backend, &mut self.ledger, selected)?;
        self.device = Some(device);
        self.advance(LifecycleState::LogicalDeviceCreated);
        Ok(device)
    }

    fn advance(&mut self, next: LifecycleState) {
        log::debug!("Renderer state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    // =========================================================================
    // CLEANUP
    // =========================================================================

    /// Destroys everything created so far, newest first. Safe to call in any
    /// state and more than once.
    pub fn teardown(&mut self) {
        if self.state == LifecycleState::TornDown {
            return;
        }
        if self.state == LifecycleState::Uninitialized && self.ledger.is_empty() {
            return;
        }

        log::info!(
            "Cleaning up Vulkan resources ({} handles)...",
            self.ledger.len()
        );
        self.ledger.release_all(&mut self.backend);

        self.pipeline = None;
        self.render_pass = None;
        self.swapchain = None;
        self.device = None;
        self.selected_device = None;
        self.surface = None;
        self.debug_messenger = None;
        self.instance = None;
        self.state = LifecycleState::TornDown;

        log::info!("Cleanup complete");
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LifecycleState::Ready
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    /// Live handles in creation order.
    pub fn resources(&self) -> &[Resource] {
        self.ledger.resources()
    }

    pub fn instance(&self) -> Option<vk::Instance> {
        self.instance
    }

    pub fn debug_messenger(&self) -> Option<vk::DebugUtilsMessengerEXT> {
        self.debug_messenger
    }

    pub fn surface(&self) -> Option<vk::SurfaceKHR> {
        self.surface
    }

    pub fn selected_device(&self) -> Option<&SelectedDevice> {
        self.selected_device.as_ref()
    }

    pub fn device(&self) -> Option<&DeviceContext> {
        self.device.as_ref()
    }

    pub fn swapchain(&self) -> Option<&Swapchain> {
        self.swapchain.as_ref()
    }

    pub fn render_pass(&self) -> Option<vk::RenderPass> {
        self.render_pass
    }

    pub fn pipeline(&self) -> Option<&GraphicsPipeline> {
        self.pipeline.as_ref()
    }
}

impl<B: Backend> Drop for Renderer<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}
