// Capability probes
//
// Read-only queries against the loader, the instance and the surface.
// Every list is returned owned; ash's enumerators run the count-then-fill
// dance and re-probe when the driver reports VK_INCOMPLETE, so callers never
// see a buffer sized from a stale count.

use ash::vk;
use std::ffi::CStr;

use super::error::{BootstrapError, Result, Stage};

fn name_to_string<E>(name: std::result::Result<&CStr, E>) -> Option<String> {
    name.ok().map(|name| name.to_string_lossy().into_owned())
}

pub fn instance_extensions(entry: &ash::Entry) -> Result<Vec<String>> {
    let properties = unsafe { entry.enumerate_instance_extension_properties(None) }
        .map_err(BootstrapError::driver(Stage::CapabilityQuery))?;

    Ok(properties
        .iter()
        .filter_map(|p| name_to_string(p.extension_name_as_c_str()))
        .collect())
}

pub fn instance_layers(entry: &ash::Entry) -> Result<Vec<String>> {
    let properties = unsafe { entry.enumerate_instance_layer_properties() }
        .map_err(BootstrapError::driver(Stage::CapabilityQuery))?;

    Ok(properties
        .iter()
        .filter_map(|p| name_to_string(p.layer_name_as_c_str()))
        .collect())
}

pub fn physical_devices(instance: &ash::Instance) -> Result<Vec<vk::PhysicalDevice>> {
    unsafe { instance.enumerate_physical_devices() }
        .map_err(BootstrapError::driver(Stage::CapabilityQuery))
}

pub fn queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Vec<vk::QueueFamilyProperties> {
    unsafe { instance.get_physical_device_queue_family_properties(physical_device) }
}

pub fn device_extensions(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<Vec<String>> {
    let properties = unsafe { instance.enumerate_device_extension_properties(physical_device) }
        .map_err(BootstrapError::driver(Stage::CapabilityQuery))?;

    Ok(properties
        .iter()
        .filter_map(|p| name_to_string(p.extension_name_as_c_str()))
        .collect())
}

/// Everything a surface reports about one physical device.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(
        loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        let to_err = BootstrapError::driver(Stage::CapabilityQuery);
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .map_err(to_err)?,
                formats: loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .map_err(to_err)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .map_err(to_err)?,
            })
        }
    }
}

/// Names from `required` that are absent from `available`.
///
/// Matching is exact and case-sensitive, as the loader compares names.
pub fn missing_names(required: &[&CStr], available: &[String]) -> Vec<String> {
    required
        .iter()
        .map(|name| name.to_string_lossy())
        .filter(|name| !available.iter().any(|a| a == name.as_ref()))
        .map(|name| name.into_owned())
        .collect()
}

/// Per-device probes used by device selection.
///
/// The Vulkan implementation answers from the driver; tests answer from
/// fabricated capability tables.
pub trait DeviceCapabilities {
    fn physical_devices(&self) -> Result<Vec<vk::PhysicalDevice>>;
    fn properties(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties;
    fn features(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures;
    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;
    fn supports_present(&self, device: vk::PhysicalDevice, family: u32) -> Result<bool>;
    fn device_extensions(&self, device: vk::PhysicalDevice) -> Result<Vec<String>>;
}

/// Driver-backed probes for one instance and one target surface.
pub struct VulkanCapabilities<'a> {
    pub instance: &'a ash::Instance,
    pub surface_loader: &'a ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
}

impl DeviceCapabilities for VulkanCapabilities<'_> {
    fn physical_devices(&self) -> Result<Vec<vk::PhysicalDevice>> {
        physical_devices(self.instance)
    }

    fn properties(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        unsafe { self.instance.get_physical_device_properties(device) }
    }

    fn features(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        unsafe { self.instance.get_physical_device_features(device) }
    }

    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        queue_families(self.instance, device)
    }

    fn supports_present(&self, device: vk::PhysicalDevice, family: u32) -> Result<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(device, family, self.surface)
        }
        .map_err(BootstrapError::driver(Stage::CapabilityQuery))
    }

    fn device_extensions(&self, device: vk::PhysicalDevice) -> Result<Vec<String>> {
        device_extensions(self.instance, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn all_present_reports_nothing() {
        let available = names(&["VK_KHR_surface", "VK_KHR_xcb_surface", "VK_EXT_debug_utils"]);
        let required = [c"VK_KHR_surface", c"VK_EXT_debug_utils"];
        assert!(missing_names(&required, &available).is_empty());
    }

    #[test]
    fn reports_each_absent_name_in_order() {
        let available = names(&["VK_KHR_surface"]);
        let required = [c"VK_KHR_wayland_surface", c"VK_KHR_surface", c"VK_EXT_debug_utils"];
        assert_eq!(
            missing_names(&required, &available),
            vec!["VK_KHR_wayland_surface", "VK_EXT_debug_utils"]
        );
    }

    #[test]
    fn matching_is_case_sensitive() {
        let available = names(&["vk_khr_swapchain"]);
        assert_eq!(
            missing_names(&[c"VK_KHR_swapchain"], &available),
            vec!["VK_KHR_swapchain"]
        );
    }
}
