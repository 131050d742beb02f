// Bootstrap errors
//
// Every stage reports failures through BootstrapError. Nothing below main
// terminates the process: the error travels up to the single boundary that
// logs it and exits.

use ash::vk;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;

/// Bootstrap stage a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CapabilityQuery,
    Instance,
    Diagnostics,
    Surface,
    DeviceSelection,
    LogicalDevice,
    Swapchain,
    ImageView,
    ShaderBinary,
    ShaderModule,
    PipelineLayout,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CapabilityQuery => "capability query",
            Stage::Instance => "instance",
            Stage::Diagnostics => "diagnostics",
            Stage::Surface => "surface",
            Stage::DeviceSelection => "device selection",
            Stage::LogicalDevice => "logical device",
            Stage::Swapchain => "swapchain",
            Stage::ImageView => "image view",
            Stage::ShaderBinary => "shader binary",
            Stage::ShaderModule => "shader module",
            Stage::PipelineLayout => "pipeline layout",
        };
        f.write_str(name)
    }
}

/// Coarse failure class, used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    CapabilityMismatch,
    DriverRejected,
    NoCandidate,
    ResourceIoFailure,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("could not load the Vulkan library")]
    Loading(#[from] ash::LoadingError),
    #[error("required instance extension `{0}` is not available")]
    MissingExtension(String),
    #[error("required layer `{0}` is not available")]
    MissingLayer(String),
    #[error("selected device is missing device extensions: {}", .0.join(", "))]
    MissingDeviceExtensions(Vec<String>),
    #[error("no Vulkan-capable physical device found")]
    NoDevice,
    #[error("no physical device scored above zero")]
    NoSuitableDevice,
    #[error("no queue family supports {0}")]
    IncompleteQueueFamilies(&'static str),
    #[error("surface reports no formats")]
    NoFormats,
    #[error("surface reports no present modes")]
    NoPresentModes,
    #[error("shader binary is {len} bytes, expected a non-empty multiple of 4")]
    InvalidShaderBinary { len: usize },
    #[error("driver rejected the request: {result}")]
    DriverRejected { stage: Stage, result: vk::Result },
    #[error("failed to read {}", .path.display())]
    ResourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("window handle unavailable")]
    WindowHandle(#[from] raw_window_handle::HandleError),
}

impl BootstrapError {
    pub fn driver(stage: Stage) -> impl Fn(vk::Result) -> Self + Copy {
        move |result| BootstrapError::DriverRejected { stage, result }
    }

    pub fn stage(&self) -> Stage {
        match self {
            BootstrapError::Loading(_)
            | BootstrapError::MissingExtension(_)
            | BootstrapError::MissingLayer(_) => Stage::Instance,
            BootstrapError::MissingDeviceExtensions(_)
            | BootstrapError::NoDevice
            | BootstrapError::NoSuitableDevice
            | BootstrapError::IncompleteQueueFamilies(_) => Stage::DeviceSelection,
            BootstrapError::NoFormats | BootstrapError::NoPresentModes => Stage::Swapchain,
            BootstrapError::InvalidShaderBinary { .. } => Stage::ShaderModule,
            BootstrapError::DriverRejected { stage, .. } => *stage,
            BootstrapError::ResourceIo { .. } => Stage::ShaderBinary,
            BootstrapError::WindowHandle(_) => Stage::Surface,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BootstrapError::MissingExtension(_)
            | BootstrapError::MissingLayer(_)
            | BootstrapError::MissingDeviceExtensions(_)
            | BootstrapError::NoFormats
            | BootstrapError::NoPresentModes
            | BootstrapError::WindowHandle(_) => ErrorCategory::CapabilityMismatch,
            BootstrapError::NoDevice
            | BootstrapError::NoSuitableDevice
            | BootstrapError::IncompleteQueueFamilies(_) => ErrorCategory::NoCandidate,
            BootstrapError::Loading(_)
            | BootstrapError::InvalidShaderBinary { .. }
            | BootstrapError::DriverRejected { .. } => ErrorCategory::DriverRejected,
            BootstrapError::ResourceIo { .. } => ErrorCategory::ResourceIoFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_rejection_keeps_stage() {
        let err = BootstrapError::driver(Stage::ImageView)(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        assert_eq!(err.stage(), Stage::ImageView);
        assert_eq!(err.category(), ErrorCategory::DriverRejected);
    }

    #[test]
    fn missing_names_are_reported() {
        let err = BootstrapError::MissingDeviceExtensions(vec![
            "VK_KHR_swapchain".to_string(),
            "VK_KHR_maintenance1".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "selected device is missing device extensions: VK_KHR_swapchain, VK_KHR_maintenance1"
        );
        assert_eq!(err.category(), ErrorCategory::CapabilityMismatch);
    }

    #[test]
    fn io_failures_belong_to_shader_loading() {
        let err = BootstrapError::ResourceIo {
            path: PathBuf::from("shaders/missing.spv"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.stage(), Stage::ShaderBinary);
        assert_eq!(err.category(), ErrorCategory::ResourceIoFailure);
        assert!(err.to_string().starts_with("failed to read shaders/missing.spv"));
    }
}
