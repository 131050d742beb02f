// Presentation surface and the window collaborator
//
// The bootstrap never creates or destroys the window. It only asks it for
// the instance extensions presentation needs, a surface, and the drawable
// size in pixels.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CStr;
use std::sync::Arc;

use super::error::{BootstrapError, Result, Stage};
use super::instance::Instance;

pub trait PresentationWindow {
    /// Instance extensions the platform needs to present to this window.
    fn required_extensions(&self) -> Result<Vec<&'static CStr>>;

    /// Create a surface for this window on `instance`.
    fn create_surface(&self, instance: &Instance) -> Result<vk::SurfaceKHR>;

    /// Drawable area in pixels.
    fn framebuffer_size(&self) -> (u32, u32);
}

impl PresentationWindow for winit::window::Window {
    fn required_extensions(&self) -> Result<Vec<&'static CStr>> {
        let display = self.display_handle()?.as_raw();
        let names = ash_window::enumerate_required_extensions(display)
            .map_err(BootstrapError::driver(Stage::Surface))?;

        // ash-window hands out pointers into its own static name tables.
        Ok(names.iter().map(|&ptr| unsafe { CStr::from_ptr(ptr) }).collect())
    }

    fn create_surface(&self, instance: &Instance) -> Result<vk::SurfaceKHR> {
        let display = self.display_handle()?.as_raw();
        let window = self.window_handle()?.as_raw();

        unsafe {
            ash_window::create_surface(instance.entry(), instance.handle(), display, window, None)
        }
        .map_err(BootstrapError::driver(Stage::Surface))
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }
}

/// Owns a `VkSurfaceKHR`; destroyed before the instance it was made on.
pub struct Surface {
    pub handle: vk::SurfaceKHR,
    pub loader: ash::khr::surface::Instance,
    _instance: Arc<Instance>,
}

impl Surface {
    pub fn new(instance: Arc<Instance>, window: &dyn PresentationWindow) -> Result<Self> {
        let handle = window.create_surface(&instance)?;
        let loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        log::info!("Presentation surface created");

        Ok(Self {
            handle,
            loader,
            _instance: instance,
        })
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}
