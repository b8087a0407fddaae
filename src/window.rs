// Windowing collaborator
//
// The renderer asks the window three things: which instance extensions it
// needs, its native handles (for the surface), and its framebuffer size.

use ash::prelude::VkResult;
use glam::UVec2;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::{CStr, CString};

/// A window the renderer can present into.
pub trait WindowSource: HasRawWindowHandle + HasRawDisplayHandle {
    /// Current drawable size in pixels.
    fn framebuffer_size(&self) -> UVec2;

    /// Instance extensions needed to create a surface for this window.
    fn required_extensions(&self) -> VkResult<Vec<CString>> {
        let names = ash_window::enumerate_required_extensions(self.raw_display_handle())?;
        Ok(names
            .iter()
            // Names are static strings owned by ash-window.
            .map(|&name| unsafe { CStr::from_ptr(name) }.to_owned())
            .collect())
    }
}

impl WindowSource for winit::window::Window {
    fn framebuffer_size(&self) -> UVec2 {
        let size = self.inner_size();
        UVec2::new(size.width, size.height)
    }
}
