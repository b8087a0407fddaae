// Initialization errors
//
// Every stage of the bootstrap sequence fails with one of these. None are
// retried; the coordinator reports the first one and stops.

use ash::vk;
use std::ffi::CString;
use thiserror::Error;

use crate::renderer::LifecycleState;

/// Errors raised while turning a shader blob into a shader module.
#[derive(Debug, Error)]
pub enum ShaderError {
    /// The blob could not be read, or is not a whole number of SPIR-V words.
    #[error("invalid shader binary: {0}")]
    Io(#[from] std::io::Error),
    /// The driver refused the module.
    #[error("shader module rejected by the driver: {0}")]
    Rejected(vk::Result),
}

/// Errors that abort renderer initialization.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to load the Vulkan library: {0}")]
    Loader(#[from] ash::LoadingError),

    #[error("required instance extensions not supported: {0:?}")]
    UnsupportedExtension(Vec<CString>),

    #[error("required validation layers not supported: {0:?}")]
    UnsupportedValidationLayer(Vec<CString>),

    #[error("failed to create Vulkan instance: {0}")]
    InstanceCreation(vk::Result),

    #[error("failed to create debug messenger: {0}")]
    DebugMessenger(vk::Result),

    #[error("failed to create window surface: {0}")]
    SurfaceCreation(vk::Result),

    #[error("no compatible GPU found: {0}")]
    NoCompatibleDevice(&'static str),

    #[error("failed to create logical device: {0}")]
    DeviceCreation(vk::Result),

    #[error("failed to create swapchain: {0}")]
    SwapchainCreation(vk::Result),

    #[error("failed to create swapchain image view: {0}")]
    ImageViewCreation(vk::Result),

    #[error("failed to create render pass: {0}")]
    RenderPassCreation(vk::Result),

    #[error("failed to create shader module `{name}`")]
    ShaderModule {
        name: String,
        #[source]
        source: ShaderError,
    },

    #[error("failed to create graphics pipeline: {0}")]
    PipelineCreation(vk::Result),

    /// A capability or enumeration query was rejected by the driver.
    #[error("vulkan query failed: {0}")]
    Query(#[from] vk::Result),

    #[error("initialize called in state {0:?}")]
    InvalidState(LifecycleState),
}

pub type InitResult<T> = Result<T, InitError>;
