//! One-shot Vulkan bootstrap: instance, surface, device, swapchain, render
//! pass and a static graphics pipeline, torn down in reverse creation order.
//!
//! ```no_run
//! # fn run(window: &winit::window::Window) -> Result<(), Box<dyn std::error::Error>> {
//! use vk_bootstrap_renderer::backend::{AshBackend, ShaderBinaries};
//! use vk_bootstrap_renderer::{Renderer, RendererOptions};
//!
//! let options = RendererOptions {
//!     app_name: c"demo".to_owned(),
//!     app_version: 1,
//!     enable_validation: cfg!(debug_assertions),
//!     shaders: ShaderBinaries::load("shaders/shader.vert.spv", "shaders/shader.frag.spv")?,
//! };
//! let mut renderer = Renderer::new(AshBackend::new()?, options);
//! renderer.initialize(window)?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod renderer;
pub mod window;

pub use error::{InitError, InitResult, ShaderError};
pub use renderer::{LifecycleState, Renderer, RendererOptions};
pub use window::WindowSource;
