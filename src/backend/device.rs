// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device scoring and selection (prefer discrete GPU)
// - Graphics / present queue family discovery
// - Device extension verification
// - Logical device + queue creation

use ash::vk;
use std::collections::BTreeSet;
use std::ffi::{c_char, CStr};
use std::sync::Arc;

use super::capabilities::{self, DeviceCapabilities};
use super::error::{BootstrapError, Result, Stage};
use super::instance::Instance;

/// Device extensions every candidate must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Features a device must support to score above zero.
#[derive(Debug, Clone, Copy)]
pub struct FeatureRequirements {
    pub geometry_shader: bool,
}

impl FeatureRequirements {
    pub fn satisfied_by(&self, features: &vk::PhysicalDeviceFeatures) -> bool {
        !self.geometry_shader || features.geometry_shader == vk::TRUE
    }

    /// Feature set handed to logical device creation.
    pub fn enabled_features(&self) -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default().geometry_shader(self.geometry_shader)
    }
}

/// Discrete GPUs get +1000, everything adds its max 2D image dimension, and
/// a device missing a required feature is zeroed.
pub fn score_device(
    properties: &vk::PhysicalDeviceProperties,
    features: &vk::PhysicalDeviceFeatures,
    requirements: &FeatureRequirements,
) -> u32 {
    let mut score = 0u32;

    if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += 1000;
    }
    score = score.saturating_add(properties.limits.max_image_dimension2_d);

    if !requirements.satisfied_by(features) {
        score = 0;
    }

    score
}

/// Index of the highest score; ties keep the earliest. `None` when every
/// score is zero.
pub fn best_candidate(scores: &[u32]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }
    best.filter(|&(_, score)| score > 0).map(|(index, _)| index)
}

/// Queue families found so far; each is unset until a matching family is
/// seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scan families in index order; the first graphics family and the
    /// first present-capable family win independently.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> Result<bool>,
    ) -> Result<Self> {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;

            if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }
            if indices.present.is_none() && supports_present(index)? {
                indices.present = Some(index);
            }
            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn complete(self) -> Result<QueueFamilies> {
        match (self.graphics, self.present) {
            (Some(graphics), Some(present)) => Ok(QueueFamilies { graphics, present }),
            (None, _) => Err(BootstrapError::IncompleteQueueFamilies("graphics")),
            (_, None) => Err(BootstrapError::IncompleteQueueFamilies("presentation")),
        }
    }
}

/// Fully resolved graphics and present family indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, ascending. One entry when a single family
    /// does both jobs.
    pub fn unique(&self) -> Vec<u32> {
        [self.graphics, self.present]
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Outcome of device selection.
#[derive(Debug, Clone, Copy)]
pub struct SelectedDevice {
    pub physical_device: vk::PhysicalDevice,
    pub families: QueueFamilies,
    pub score: u32,
}

/// Pick the highest-scoring device, then resolve its queue families and
/// verify its device extensions.
pub fn pick_physical_device(
    caps: &dyn DeviceCapabilities,
    requirements: &FeatureRequirements,
    required_extensions: &[&CStr],
) -> Result<SelectedDevice> {
    let devices = caps.physical_devices()?;
    if devices.is_empty() {
        return Err(BootstrapError::NoDevice);
    }

    let scores: Vec<u32> = devices
        .iter()
        .map(|&device| {
            let properties = caps.properties(device);
            let score = score_device(&properties, &caps.features(device), requirements);
            log::debug!(
                "Candidate GPU {}: {:?}, score {}",
                device_name(&properties),
                properties.device_type,
                score
            );
            score
        })
        .collect();

    let best = best_candidate(&scores).ok_or(BootstrapError::NoSuitableDevice)?;
    let physical_device = devices[best];

    let families = QueueFamilyIndices::find(&caps.queue_families(physical_device), |family| {
        caps.supports_present(physical_device, family)
    })?
    .complete()?;

    let available = caps.device_extensions(physical_device)?;
    let missing = capabilities::missing_names(required_extensions, &available);
    if !missing.is_empty() {
        return Err(BootstrapError::MissingDeviceExtensions(missing));
    }

    Ok(SelectedDevice {
        physical_device,
        families,
        score: scores[best],
    })
}

fn device_name(properties: &vk::PhysicalDeviceProperties) -> String {
    properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".to_string())
}

/// Logical device wrapper with automatic cleanup
pub struct Device {
    pub handle: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub families: QueueFamilies,

    // Queue handles live as long as the device
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,

    pub instance: Arc<Instance>,
}

impl Device {
    pub fn new(
        instance: Arc<Instance>,
        selected: &SelectedDevice,
        requirements: &FeatureRequirements,
        required_extensions: &[&CStr],
    ) -> Result<Arc<Self>> {
        let families = selected.families;
        let physical_device = selected.physical_device;

        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extension_ptrs: Vec<*const c_char> =
            required_extensions.iter().map(|e| e.as_ptr()).collect();
        let features = requirements.enabled_features();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);

        let handle = unsafe {
            instance
                .handle()
                .create_device(physical_device, &create_info, None)
        }
        .map_err(BootstrapError::driver(Stage::LogicalDevice))?;

        let graphics_queue = unsafe { handle.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { handle.get_device_queue(families.present, 0) };

        let properties = unsafe {
            instance
                .handle()
                .get_physical_device_properties(physical_device)
        };

        log::info!("Selected GPU: {} (score {})", device_name(&properties), selected.score);
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::info!(
            "Queue families: graphics {}, present {} ({} queue create request(s))",
            families.graphics,
            families.present,
            queue_create_infos.len()
        );

        Ok(Arc::new(Self {
            handle,
            physical_device,
            families,
            graphics_queue,
            present_queue,
            instance,
        }))
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.handle.device_wait_idle() }
            .map_err(BootstrapError::driver(Stage::LogicalDevice))
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::info!("Destroying logical device...");

        let _ = self.wait_idle();

        unsafe {
            self.handle.destroy_device(None);
        }
    }
}
