// =============================================================================
// VULKAN BOOTSTRAP - window host
// =============================================================================
//
// Opens a window, runs the renderer's setup sequence once against it, and
// keeps the window open until it is closed. Nothing is drawn.
//
// =============================================================================

mod config;

use anyhow::{Context, Result};
use config::Config;
use std::ffi::CString;
use vk_bootstrap_renderer::backend::{AshBackend, ShaderBinaries};
use vk_bootstrap_renderer::{Renderer, RendererOptions};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, load_error) = Config::load_or_default("config.toml");

    init_logging(&config);
    if let Some(e) = load_error {
        log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
    }
    log::info!("Starting Vulkan bootstrap");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        config.window.title
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

fn init_logging(config: &Config) {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or(config.debug.log_level.as_str())).init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// IMPORTANT: Field order matters for Drop! The renderer holds a surface
/// created from the window, so it must go first.
struct App {
    config: Config,
    renderer: Option<Renderer<AshBackend>>,
    window: Option<Window>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
        }
    }

    fn init_vulkan(&self, window: &Window) -> Result<Renderer<AshBackend>> {
        let options = RendererOptions {
            app_name: CString::new(self.config.window.title.as_str())
                .context("Window title contains a NUL byte")?,
            app_version: ash::vk::make_api_version(0, 1, 0, 0),
            enable_validation: self.config.validation_enabled(),
            shaders: ShaderBinaries::load(&self.config.shaders.vertex, &self.config.shaders.fragment)
                .context("Failed to load shaders")?,
        };

        let backend = AshBackend::new().context("Failed to load Vulkan library. Is Vulkan installed?")?;
        let mut renderer = Renderer::new(backend, options);
        // On failure the renderer is dropped here, releasing whatever was created.
        renderer
            .initialize(window)
            .context("Failed to initialize Vulkan")?;
        Ok(renderer)
    }

    fn shutdown(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.teardown();
        }
        self.window = None;
    }
}

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => w,
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        match self.init_vulkan(&window) {
            Ok(renderer) => {
                log::info!("Renderer ready ({:?})", renderer.state());
                self.renderer = Some(renderer);
            }
            Err(e) => {
                log::error!("{:?}", e);
                event_loop.exit();
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        if let WindowEvent::CloseRequested = event {
            log::info!("Close requested, shutting down...");
            self.shutdown();
            event_loop.exit();
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.shutdown();
    }
}
