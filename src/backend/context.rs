// GPU context - the ordered bootstrap
//
// instance -> diagnostics -> surface -> device selection -> logical device
// -> swapchain -> pipeline layout
//
// Every stage returns a Result; the first failure unwinds whatever was built
// so far through Drop, in reverse construction order.

use std::sync::Arc;

use super::capabilities::VulkanCapabilities;
use super::debug::{DiagnosticsFilter, LogSink};
use super::device::{self, Device, FeatureRequirements, REQUIRED_DEVICE_EXTENSIONS};
use super::error::Result;
use super::instance::{DiagnosticsRequest, Instance, InstanceBuilder};
use super::pipeline::{FixedFunctionState, PipelineLayout};
use super::shader::ShaderBinary;
use super::surface::{PresentationWindow, Surface};
use super::swapchain::Swapchain;
use crate::config::Config;

/// Everything the bootstrap produced.
///
/// Field order is drop order: dependents first, the instance last.
pub struct GpuContext {
    pub pipeline_layout: PipelineLayout,
    pub swapchain: Swapchain,
    pub device: Arc<Device>,
    pub surface: Surface,
    pub instance: Arc<Instance>,
}

impl GpuContext {
    pub fn new(config: &Config, window: &dyn PresentationWindow) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let diagnostics = config.diagnostics_enabled().then(|| DiagnosticsRequest {
            filter: DiagnosticsFilter {
                severities: config.severity_mask(),
                types: config.type_mask(),
            },
            sink: Box::new(LogSink),
        });

        let instance = Arc::new(
            InstanceBuilder::new(&config.window.title)
                .window_extensions(window.required_extensions()?)
                .diagnostics(diagnostics)
                .build()?,
        );

        let surface = Surface::new(instance.clone(), window)?;

        let requirements = FeatureRequirements {
            geometry_shader: config.graphics.require_geometry_shader,
        };
        let caps = VulkanCapabilities {
            instance: instance.handle(),
            surface_loader: &surface.loader,
            surface: surface.handle,
        };
        let selected = device::pick_physical_device(&caps, &requirements, REQUIRED_DEVICE_EXTENSIONS)?;

        let device = Device::new(instance.clone(), &selected, &requirements, REQUIRED_DEVICE_EXTENSIONS)?;

        let swapchain = Swapchain::new(
            device.clone(),
            &surface,
            window.framebuffer_size(),
            config.get_present_mode(),
        )?;

        // Binaries are dropped once the layout exists
        let pipeline_layout = {
            let vertex = ShaderBinary::load(&config.shaders.vertex)?;
            let fragment = ShaderBinary::load(&config.shaders.fragment)?;
            PipelineLayout::new(
                device.clone(),
                &vertex,
                &fragment,
                swapchain.config.extent,
                FixedFunctionState::default(),
            )?
        };

        log::info!(
            "Vulkan initialized: {} image views at {}x{}, diagnostics {}",
            swapchain.image_views.len(),
            pipeline_layout.extent.width,
            pipeline_layout.extent.height,
            if instance.diagnostics_enabled() { "on" } else { "off" }
        );
        log::debug!(
            "Record-time state: {:?} {:?}, viewport {:?}, scissor {:?}",
            pipeline_layout.state.topology,
            pipeline_layout.state.front_face,
            FixedFunctionState::viewport(pipeline_layout.extent),
            FixedFunctionState::scissor(pipeline_layout.extent)
        );
        log::debug!(
            "Queues: graphics {:?}, present {:?}; instance extensions {:?}, layers {:?}",
            device.graphics_queue,
            device.present_queue,
            instance.enabled_extensions(),
            instance.enabled_layers()
        );

        Ok(Self {
            pipeline_layout,
            swapchain,
            device,
            surface,
            instance,
        })
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        let _ = self.device.wait_idle();
    }
}
