// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Built once in main and handed to the bootstrap by reference.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub shaders: ShaderConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan".to_string(),
            width: 800,
            height: 600,
            resizable: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Preferred present mode; FIFO is used when the surface lacks it
    pub present_mode: String,
    /// Devices without geometry shaders score zero
    pub require_geometry_shader: bool,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            require_geometry_shader: true,
        }
    }
}

/// Driver message severities the diagnostics channel subscribes to
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageSeverity {
    Verbose,
    Info,
    Warning,
    Error,
}

/// Driver message categories the diagnostics channel subscribes to
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    General,
    Validation,
    Performance,
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub message_severities: Vec<MessageSeverity>,
    pub message_types: Vec<MessageType>,
    pub log_to_file: bool,
    pub log_file: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            message_severities: vec![
                MessageSeverity::Verbose,
                MessageSeverity::Warning,
                MessageSeverity::Error,
            ],
            message_types: vec![
                MessageType::General,
                MessageType::Validation,
                MessageType::Performance,
            ],
            log_to_file: false,
            log_file: "vulkan_debug.log".to_string(),
        }
    }
}

/// Compiled SPIR-V locations
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/triangle.vert.spv"),
            fragment: PathBuf::from("shaders/triangle.frag.spv"),
        }
    }
}

/// Where the active configuration came from.
///
/// Loading runs before the logger exists, so the outcome is kept and
/// reported once logging is up.
#[derive(Debug)]
pub enum ConfigOrigin {
    File(PathBuf),
    Missing(PathBuf),
    Invalid(anyhow::Error),
}

impl ConfigOrigin {
    pub fn report(&self) {
        match self {
            ConfigOrigin::File(path) => log::info!("Loaded configuration from {:?}", path),
            ConfigOrigin::Missing(path) => {
                log::info!("Config file not found at {:?}, using defaults", path)
            }
            ConfigOrigin::Invalid(e) => log::warn!("{:#}. Using defaults.", e),
        }
    }
}

impl Config {
    /// Load config.toml, falling back to defaults if it is missing or broken
    pub fn load() -> (Self, ConfigOrigin) {
        Self::load_or_default("config.toml")
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, ConfigOrigin) {
        let path = path.as_ref();

        if !path.exists() {
            return (Config::default(), ConfigOrigin::Missing(path.to_path_buf()));
        }

        match Self::load_from_path(path) {
            Ok(config) => (config, ConfigOrigin::File(path.to_path_buf())),
            Err(e) => (Config::default(), ConfigOrigin::Invalid(e)),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validation layers and the debug messenger are only ever enabled in
    /// debug builds.
    pub fn diagnostics_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }

    /// Get preferred present mode as Vulkan enum
    pub fn get_present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::MAILBOX
            }
        }
    }

    pub fn severity_mask(&self) -> vk::DebugUtilsMessageSeverityFlagsEXT {
        self.debug
            .message_severities
            .iter()
            .fold(vk::DebugUtilsMessageSeverityFlagsEXT::empty(), |mask, s| {
                mask | match s {
                    MessageSeverity::Verbose => vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
                    MessageSeverity::Info => vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
                    MessageSeverity::Warning => vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                    MessageSeverity::Error => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                }
            })
    }

    pub fn type_mask(&self) -> vk::DebugUtilsMessageTypeFlagsEXT {
        self.debug
            .message_types
            .iter()
            .fold(vk::DebugUtilsMessageTypeFlagsEXT::empty(), |mask, t| {
                mask | match t {
                    MessageType::General => vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                    MessageType::Validation => vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                    MessageType::Performance => vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                }
            })
    }
}
