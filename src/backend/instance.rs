// Vulkan instance
//
// Responsibilities:
// - Load the Vulkan library
// - Verify required instance extensions and layers
// - Create the instance, chaining a messenger into creation when diagnostics
//   are on so creation/destruction-time messages are captured too
// - Register the long-lived messenger and own it until drop

use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};

use super::capabilities;
use super::debug::{DiagnosticsChannel, DiagnosticsFilter, DiagnosticsSink, SinkSlot};
use super::error::{BootstrapError, Result, Stage};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Diagnostics request passed to [`InstanceBuilder`].
pub struct DiagnosticsRequest {
    pub filter: DiagnosticsFilter,
    pub sink: Box<dyn DiagnosticsSink>,
}

pub struct InstanceBuilder<'a> {
    app_name: &'a str,
    window_extensions: Vec<&'static CStr>,
    diagnostics: Option<DiagnosticsRequest>,
}

impl<'a> InstanceBuilder<'a> {
    pub fn new(app_name: &'a str) -> Self {
        Self {
            app_name,
            window_extensions: Vec::new(),
            diagnostics: None,
        }
    }

    /// Extensions the window system needs for presentation.
    pub fn window_extensions(mut self, extensions: Vec<&'static CStr>) -> Self {
        self.window_extensions = extensions;
        self
    }

    pub fn diagnostics(mut self, request: Option<DiagnosticsRequest>) -> Self {
        self.diagnostics = request;
        self
    }

    /// Window extensions first, debug utils appended when diagnostics are on.
    pub fn required_extensions(&self) -> Vec<&'static CStr> {
        let mut extensions = self.window_extensions.clone();
        if self.diagnostics.is_some() && !extensions.contains(&ash::ext::debug_utils::NAME) {
            extensions.push(ash::ext::debug_utils::NAME);
        }
        extensions
    }

    pub fn required_layers(&self) -> Vec<&'static CStr> {
        if self.diagnostics.is_some() {
            vec![VALIDATION_LAYER]
        } else {
            Vec::new()
        }
    }

    pub fn build(self) -> Result<Instance> {
        log::info!("Creating Vulkan instance: {}", self.app_name);

        let entry = unsafe { Entry::load() }?;

        let extensions = self.required_extensions();
        let layers = self.required_layers();

        verify(
            &extensions,
            &layers,
            &capabilities::instance_extensions(&entry)?,
            &capabilities::instance_layers(&entry)?,
        )?;

        let app_name = CString::new(self.app_name).unwrap_or_else(|_| c"vk-bootstrap".to_owned());
        let engine_name = c"No Engine";

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let (filter, sink) = match self.diagnostics {
            Some(request) => (Some(request.filter), Some(SinkSlot::new(request.sink))),
            None => (None, None),
        };

        let mut creation_messenger = match (&filter, &sink) {
            (Some(filter), Some(sink)) => Some(filter.create_info(sink)),
            _ => None,
        };
        if let Some(messenger_info) = creation_messenger.as_mut() {
            create_info = create_info.push_next(messenger_info);
        }

        let handle = unsafe { entry.create_instance(&create_info, None) }
            .map_err(BootstrapError::driver(Stage::Instance))?;

        let mut instance = Instance {
            entry,
            handle,
            extensions: extensions.iter().map(|e| e.to_string_lossy().into_owned()).collect(),
            layers: layers.iter().map(|l| l.to_string_lossy().into_owned()).collect(),
            diagnostics: None,
            sink: None,
        };

        if let (Some(filter), Some(sink)) = (filter, sink) {
            // Hand the sink over first so an early return below still
            // destroys the instance before the sink goes away.
            let sink: &SinkSlot = instance.sink.insert(sink);
            if let Some(channel) = DiagnosticsChannel::load(&instance.entry, &instance.handle) {
                let messenger = channel.register(&filter, sink)?;
                instance.diagnostics = Some((channel, messenger));
                log::info!("Diagnostics messenger registered");
            }
        }

        log::info!(
            "Instance created ({} extensions, {} layers)",
            instance.extensions.len(),
            instance.layers.len()
        );

        Ok(instance)
    }
}

/// Fail on the first required extension, then the first required layer,
/// that the loader does not offer.
///
/// Layers are only ever requested alongside diagnostics, so a missing one is
/// fatal rather than a warning.
pub fn verify(
    extensions: &[&CStr],
    layers: &[&CStr],
    available_extensions: &[String],
    available_layers: &[String],
) -> Result<()> {
    if let Some(name) = capabilities::missing_names(extensions, available_extensions)
        .into_iter()
        .next()
    {
        return Err(BootstrapError::MissingExtension(name));
    }
    if let Some(name) = capabilities::missing_names(layers, available_layers)
        .into_iter()
        .next()
    {
        return Err(BootstrapError::MissingLayer(name));
    }
    Ok(())
}

/// Owns the loader, the instance handle and the diagnostics messenger.
///
/// Dropped last: every other bootstrap object holds an `Arc<Instance>`.
pub struct Instance {
    entry: Entry,
    handle: ash::Instance,
    extensions: Vec<String>,
    layers: Vec<String>,
    diagnostics: Option<(DiagnosticsChannel, vk::DebugUtilsMessengerEXT)>,
    // Dropped after the instance is destroyed.
    sink: Option<Box<SinkSlot>>,
}

impl Instance {
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn handle(&self) -> &ash::Instance {
        &self.handle
    }

    pub fn enabled_extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn enabled_layers(&self) -> &[String] {
        &self.layers
    }

    pub fn diagnostics_enabled(&self) -> bool {
        self.diagnostics.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");
        unsafe {
            if let Some((channel, messenger)) = self.diagnostics.take() {
                channel.unregister(messenger);
            }
            self.handle.destroy_instance(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::debug::LogSink;

    fn request() -> DiagnosticsRequest {
        DiagnosticsRequest {
            filter: DiagnosticsFilter {
                severities: vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                types: vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            },
            sink: Box::new(LogSink),
        }
    }

    #[test]
    fn debug_utils_is_appended_after_window_extensions() {
        let builder = InstanceBuilder::new("test")
            .window_extensions(vec![c"VK_KHR_surface", c"VK_KHR_xlib_surface"])
            .diagnostics(Some(request()));
        assert_eq!(
            builder.required_extensions(),
            vec![c"VK_KHR_surface", c"VK_KHR_xlib_surface", ash::ext::debug_utils::NAME]
        );
        assert_eq!(builder.required_layers(), vec![VALIDATION_LAYER]);
    }

    #[test]
    fn no_diagnostics_requests_nothing_extra() {
        let builder = InstanceBuilder::new("test").window_extensions(vec![c"VK_KHR_surface"]);
        assert_eq!(builder.required_extensions(), vec![c"VK_KHR_surface"]);
        assert!(builder.required_layers().is_empty());
    }

    #[test]
    fn debug_utils_is_not_duplicated() {
        let builder = InstanceBuilder::new("test")
            .window_extensions(vec![ash::ext::debug_utils::NAME])
            .diagnostics(Some(request()));
        assert_eq!(builder.required_extensions(), vec![ash::ext::debug_utils::NAME]);
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_missing_extension_is_fatal() {
        let builder = InstanceBuilder::new("test")
            .window_extensions(vec![c"VK_KHR_surface", c"VK_KHR_wayland_surface"])
            .diagnostics(Some(request()));
        let available = names(&["VK_KHR_surface"]);
        let layers = names(&["VK_LAYER_KHRONOS_validation"]);

        let err = verify(
            &builder.required_extensions(),
            &builder.required_layers(),
            &available,
            &layers,
        )
        .unwrap_err();
        assert!(matches!(err, BootstrapError::MissingExtension(ref name) if name == "VK_KHR_wayland_surface"));
        assert_eq!(err.stage(), Stage::Instance);
    }

    #[test]
    fn missing_validation_layer_is_fatal_with_diagnostics() {
        let builder = InstanceBuilder::new("test")
            .window_extensions(vec![c"VK_KHR_surface"])
            .diagnostics(Some(request()));
        let available = names(&["VK_KHR_surface", "VK_EXT_debug_utils"]);

        let err = verify(
            &builder.required_extensions(),
            &builder.required_layers(),
            &available,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, BootstrapError::MissingLayer(ref name) if name == "VK_LAYER_KHRONOS_validation"));
    }

    #[test]
    fn no_layers_needed_without_diagnostics() {
        let builder = InstanceBuilder::new("test").window_extensions(vec![c"VK_KHR_surface"]);
        let available = names(&["VK_KHR_surface"]);

        assert!(verify(
            &builder.required_extensions(),
            &builder.required_layers(),
            &available,
            &[],
        )
        .is_ok());
    }
}
