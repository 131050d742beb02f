// Diagnostics channel - driver message interception
//
// VK_EXT_debug_utils entry points are extension functions, so they are
// resolved against the instance once. When the loader cannot resolve them the
// channel is simply unavailable and bootstrap carries on without it.

use ash::vk;
use std::borrow::Cow;
use std::ffi::{c_void, CStr};

use super::error::{BootstrapError, Result, Stage};

/// One message delivered by the driver or a layer.
#[derive(Debug)]
pub struct DiagnosticMessage<'a> {
    pub severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    pub kind: vk::DebugUtilsMessageTypeFlagsEXT,
    pub text: &'a str,
}

/// Receives driver diagnostics.
///
/// Called on whatever thread the driver reports from; implementations must
/// not panic.
pub trait DiagnosticsSink: Send + Sync {
    fn receive(&self, message: &DiagnosticMessage<'_>);
}

/// Forwards diagnostics to the `log` facade under the `vulkan` target.
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn receive(&self, message: &DiagnosticMessage<'_>) {
        match message.severity {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
                log::error!(target: "vulkan", "[{:?}] {}", message.kind, message.text);
            }
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
                log::warn!(target: "vulkan", "[{:?}] {}", message.kind, message.text);
            }
            vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
                log::debug!(target: "vulkan", "[{:?}] {}", message.kind, message.text);
            }
            _ => {
                log::trace!(target: "vulkan", "[{:?}] {}", message.kind, message.text);
            }
        }
    }
}

/// Heap slot whose address is handed to the driver as callback user data.
///
/// Must stay at a fixed address until the instance is destroyed, since the
/// messenger chained into instance creation fires during destruction too.
pub struct SinkSlot(Box<dyn DiagnosticsSink>);

impl SinkSlot {
    pub fn new(sink: Box<dyn DiagnosticsSink>) -> Box<Self> {
        Box::new(Self(sink))
    }

    fn user_data(&self) -> *mut c_void {
        self as *const Self as *mut c_void
    }
}

/// Severity and category masks a messenger subscribes to.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsFilter {
    pub severities: vk::DebugUtilsMessageSeverityFlagsEXT,
    pub types: vk::DebugUtilsMessageTypeFlagsEXT,
}

impl DiagnosticsFilter {
    pub fn create_info<'a>(&self, sink: &'a SinkSlot) -> vk::DebugUtilsMessengerCreateInfoEXT<'a> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(self.severities)
            .message_type(self.types)
            .pfn_user_callback(Some(dispatch))
            .user_data(sink.user_data())
    }
}

/// Resolved debug-utils entry points for one instance.
pub struct DiagnosticsChannel {
    loader: ash::ext::debug_utils::Instance,
}

impl DiagnosticsChannel {
    /// Resolve the messenger entry points, or `None` if the driver does not
    /// expose them.
    pub fn load(entry: &ash::Entry, instance: &ash::Instance) -> Option<Self> {
        let resolve = |name: &CStr| unsafe {
            entry.get_instance_proc_addr(instance.handle(), name.as_ptr())
        };

        if resolve(c"vkCreateDebugUtilsMessengerEXT").is_none()
            || resolve(c"vkDestroyDebugUtilsMessengerEXT").is_none()
        {
            log::warn!("Debug utils entry points not found, diagnostics unavailable");
            return None;
        }

        Some(Self {
            loader: ash::ext::debug_utils::Instance::new(entry, instance),
        })
    }

    pub fn register(
        &self,
        filter: &DiagnosticsFilter,
        sink: &SinkSlot,
    ) -> Result<vk::DebugUtilsMessengerEXT> {
        let create_info = filter.create_info(sink);
        unsafe { self.loader.create_debug_utils_messenger(&create_info, None) }
            .map_err(BootstrapError::driver(Stage::Diagnostics))
    }

    /// # Safety
    /// `messenger` must come from [`register`](Self::register) on this
    /// channel and must not be used afterwards.
    pub unsafe fn unregister(&self, messenger: vk::DebugUtilsMessengerEXT) {
        self.loader.destroy_debug_utils_messenger(messenger, None);
    }
}

// Always returns FALSE so the triggering call is never aborted.
unsafe extern "system" fn dispatch(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    let text = if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        Cow::Borrowed("<no message>")
    } else {
        CStr::from_ptr((*p_callback_data).p_message).to_string_lossy()
    };

    let message = DiagnosticMessage {
        severity: message_severity,
        kind: message_type,
        text: &text,
    };

    if p_user_data.is_null() {
        LogSink.receive(&message);
    } else {
        let slot = &*(p_user_data as *const SinkSlot);
        slot.0.receive(&message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Captured = Arc<Mutex<Vec<(vk::DebugUtilsMessageSeverityFlagsEXT, String)>>>;

    struct CaptureSink(Captured);

    impl DiagnosticsSink for CaptureSink {
        fn receive(&self, message: &DiagnosticMessage<'_>) {
            self.0.lock().push((message.severity, message.text.to_string()));
        }
    }

    fn deliver(
        slot: Option<&SinkSlot>,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
        data: Option<&vk::DebugUtilsMessengerCallbackDataEXT<'_>>,
    ) -> vk::Bool32 {
        let user_data = slot.map_or(std::ptr::null_mut(), SinkSlot::user_data);
        let data = data.map_or(std::ptr::null(), |d| d as *const _);
        unsafe {
            dispatch(
                severity,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                data,
                user_data,
            )
        }
    }

    #[test]
    fn messages_reach_the_sink_and_never_abort() {
        let captured = Captured::default();
        let slot = SinkSlot::new(Box::new(CaptureSink(captured.clone())));

        for severity in [
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        ] {
            let data = vk::DebugUtilsMessengerCallbackDataEXT {
                p_message: c"vkCreateDevice: bad queue family".as_ptr(),
                ..Default::default()
            };
            assert_eq!(deliver(Some(&*slot), severity, Some(&data)), vk::FALSE);
        }

        let captured = captured.lock();
        assert_eq!(captured.len(), 3);
        assert_eq!(captured[2].0, vk::DebugUtilsMessageSeverityFlagsEXT::ERROR);
        assert_eq!(captured[2].1, "vkCreateDevice: bad queue family");
    }

    #[test]
    fn missing_message_text_is_tolerated() {
        let captured = Captured::default();
        let slot = SinkSlot::new(Box::new(CaptureSink(captured.clone())));

        let empty = vk::DebugUtilsMessengerCallbackDataEXT::default();
        deliver(Some(&*slot), vk::DebugUtilsMessageSeverityFlagsEXT::INFO, Some(&empty));
        deliver(Some(&*slot), vk::DebugUtilsMessageSeverityFlagsEXT::INFO, None);

        let captured = captured.lock();
        assert!(captured.iter().all(|(_, text)| text == "<no message>"));
    }

    #[test]
    fn no_sink_falls_back_to_log() {
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message: c"layer loaded".as_ptr(),
            ..Default::default()
        };
        assert_eq!(
            deliver(None, vk::DebugUtilsMessageSeverityFlagsEXT::WARNING, Some(&data)),
            vk::FALSE
        );
    }

    #[test]
    fn create_info_carries_filter_and_sink() {
        let slot = SinkSlot::new(Box::new(LogSink));
        let filter = DiagnosticsFilter {
            severities: vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            types: vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        };
        let info = filter.create_info(&slot);
        assert_eq!(info.message_severity, vk::DebugUtilsMessageSeverityFlagsEXT::ERROR);
        assert_eq!(info.message_type, vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE);
        assert!(info.pfn_user_callback.is_some());
        assert_eq!(info.p_user_data, slot.user_data());
    }
}
