// Swapchain - Window presentation
//
// Negotiates format, color space, present mode, extent and image count
// against what the surface reports, then creates the swapchain and one image
// view per image it hands back.

use ash::vk;
use std::sync::Arc;

use super::capabilities::SurfaceSupport;
use super::device::{Device, QueueFamilies};
use super::error::{BootstrapError, Result, Stage};
use super::surface::Surface;

/// Choose surface format (prefer BGRA8 sRGB with nonlinear color space)
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
        .ok_or(BootstrapError::NoFormats)
}

/// Choose present mode: the preferred one if offered, otherwise FIFO, which
/// every surface supports.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> Result<vk::PresentModeKHR> {
    if modes.is_empty() {
        return Err(BootstrapError::NoPresentModes);
    }
    Ok(if modes.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    })
}

/// A current extent of `u32::MAX` means the surface takes whatever size the
/// swapchain picks, so the window's framebuffer size is used, clamped.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, framebuffer: (u32, u32)) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    // A driver reporting max < min would make clamp panic; min wins then.
    let (min, max) = (caps.min_image_extent, caps.max_image_extent);
    vk::Extent2D {
        width: framebuffer.0.clamp(min.width, max.width.max(min.width)),
        height: framebuffer.1.clamp(min.height, max.height.max(min.height)),
    }
}

/// One more than the minimum, capped by a nonzero maximum (0 = unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = caps.min_image_count.saturating_add(1).max(caps.min_image_count);
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        caps.max_image_count
    } else {
        image_count
    }
}

/// How swapchain images are shared between the graphics and present queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SharingPolicy {
    Exclusive,
    Concurrent(Vec<u32>),
}

impl SharingPolicy {
    pub fn for_families(families: &QueueFamilies) -> Self {
        if families.graphics == families.present {
            SharingPolicy::Exclusive
        } else {
            SharingPolicy::Concurrent(vec![families.graphics, families.present])
        }
    }

    pub fn mode(&self) -> vk::SharingMode {
        match self {
            SharingPolicy::Exclusive => vk::SharingMode::EXCLUSIVE,
            SharingPolicy::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    pub fn family_indices(&self) -> &[u32] {
        match self {
            SharingPolicy::Exclusive => &[],
            SharingPolicy::Concurrent(indices) => indices,
        }
    }
}

/// Negotiated swapchain parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceConfig {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing: SharingPolicy,
    pub transform: vk::SurfaceTransformFlagsKHR,
}

impl SurfaceConfig {
    pub fn negotiate(
        support: &SurfaceSupport,
        framebuffer: (u32, u32),
        families: &QueueFamilies,
        preferred_mode: vk::PresentModeKHR,
    ) -> Result<Self> {
        let surface_format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes, preferred_mode)?;

        Ok(Self {
            format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode,
            extent: choose_extent(&support.capabilities, framebuffer),
            image_count: choose_image_count(&support.capabilities),
            sharing: SharingPolicy::for_families(families),
            transform: support.capabilities.current_transform,
        })
    }

    pub fn create_info(&self, surface: vk::SurfaceKHR) -> vk::SwapchainCreateInfoKHR<'_> {
        vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(self.image_count)
            .image_format(self.format)
            .image_color_space(self.color_space)
            .image_extent(self.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(self.sharing.mode())
            .queue_family_indices(self.sharing.family_indices())
            .pre_transform(self.transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null())
    }
}

pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub loader: ash::khr::swapchain::Device,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub config: SurfaceConfig,
    device: Arc<Device>,
}

impl Swapchain {
    pub fn new(
        device: Arc<Device>,
        surface: &Surface,
        framebuffer: (u32, u32),
        preferred_mode: vk::PresentModeKHR,
    ) -> Result<Self> {
        let support = SurfaceSupport::query(&surface.loader, device.physical_device, surface.handle)?;
        let config = SurfaceConfig::negotiate(&support, framebuffer, &device.families, preferred_mode)?;

        log::info!(
            "Creating swapchain: {}x{}, {:?}/{:?}, {:?}, {} images requested, {:?} sharing",
            config.extent.width,
            config.extent.height,
            config.format,
            config.color_space,
            config.present_mode,
            config.image_count,
            config.sharing.mode()
        );

        let loader = ash::khr::swapchain::Device::new(device.instance.handle(), &device.handle);

        let handle = unsafe { loader.create_swapchain(&config.create_info(surface.handle), None) }
            .map_err(BootstrapError::driver(Stage::Swapchain))?;

        // From here on Drop releases whatever has been created so far.
        let mut swapchain = Self {
            handle,
            loader,
            images: Vec::new(),
            image_views: Vec::new(),
            config,
            device,
        };

        // The driver may allocate more images than requested
        swapchain.images = unsafe { swapchain.loader.get_swapchain_images(handle) }
            .map_err(BootstrapError::driver(Stage::Swapchain))?;

        log::info!("Created swapchain with {} images", swapchain.images.len());

        let device = &swapchain.device.handle;
        let format = swapchain.config.format;
        swapchain.image_views = create_views(
            &swapchain.images,
            |image| create_image_view(device, image, format),
            |view| unsafe { device.destroy_image_view(view, None) },
        )?;

        Ok(swapchain)
    }
}

/// One view per image, in image order. If any creation fails the views made
/// so far are handed to `destroy` and the error is returned.
fn create_views(
    images: &[vk::Image],
    mut create: impl FnMut(vk::Image) -> Result<vk::ImageView>,
    mut destroy: impl FnMut(vk::ImageView),
) -> Result<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());
    for &image in images {
        match create(image) {
            Ok(view) => views.push(view),
            Err(e) => {
                views.into_iter().for_each(&mut destroy);
                return Err(e);
            }
        }
    }
    Ok(views)
}

fn create_image_view(device: &ash::Device, image: vk::Image, format: vk::Format) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }
        .map_err(BootstrapError::driver(Stage::ImageView))
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.handle.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D { width: 1024, height: 768 },
            min_image_extent: vk::Extent2D { width: 64, height: 64 },
            max_image_extent: vk::Extent2D { width: 4096, height: 2160 },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn any_size(mut caps: vk::SurfaceCapabilitiesKHR) -> vk::SurfaceCapabilitiesKHR {
        caps.current_extent = vk::Extent2D { width: u32::MAX, height: u32::MAX };
        caps
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn prefers_bgra_srgb_nonlinear_pair() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap(), formats[1]);
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap(), formats[0]);
        assert!(matches!(choose_surface_format(&[]), Err(BootstrapError::NoFormats)));
    }

    #[test]
    fn mailbox_when_offered_else_fifo() {
        let with_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&with_mailbox, vk::PresentModeKHR::MAILBOX).unwrap(),
            vk::PresentModeKHR::MAILBOX
        );

        let without = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&without, vk::PresentModeKHR::MAILBOX).unwrap(),
            vk::PresentModeKHR::FIFO
        );

        assert!(matches!(
            choose_present_mode(&[], vk::PresentModeKHR::MAILBOX),
            Err(BootstrapError::NoPresentModes)
        ));
    }

    #[test]
    fn reported_extent_is_used_verbatim() {
        let extent = choose_extent(&caps(2, 3), (1, 100_000));
        assert_eq!(extent, vk::Extent2D { width: 1024, height: 768 });
    }

    #[test]
    fn any_size_sentinel_uses_clamped_framebuffer() {
        let caps = any_size(caps(2, 3));
        assert_eq!(choose_extent(&caps, (800, 600)), vk::Extent2D { width: 800, height: 600 });
        assert_eq!(choose_extent(&caps, (10, 9000)), vk::Extent2D { width: 64, height: 2160 });
    }

    #[test]
    fn inverted_extent_limits_do_not_panic() {
        let mut caps = any_size(caps(2, 3));
        caps.max_image_extent = vk::Extent2D { width: 32, height: 32 };
        assert_eq!(choose_extent(&caps, (800, 10)), vk::Extent2D { width: 64, height: 64 });
    }

    fn fake_images(count: u64) -> Vec<vk::Image> {
        (1..=count).map(vk::Image::from_raw).collect()
    }

    #[test]
    fn one_view_per_retrieved_image() {
        for count in [0, 1, 3, 5] {
            let images = fake_images(count);
            let mut destroyed = Vec::new();
            let views = create_views(
                &images,
                |image| Ok(vk::ImageView::from_raw(image.as_raw() + 100)),
                |view| destroyed.push(view),
            )
            .unwrap();

            assert_eq!(views.len(), images.len());
            assert_eq!(views.first().map(|v| v.as_raw()), images.first().map(|i| i.as_raw() + 100));
            assert!(destroyed.is_empty());
        }
    }

    #[test]
    fn view_failure_aborts_and_releases_earlier_views() {
        let images = fake_images(4);
        let mut destroyed = Vec::new();
        let result = create_views(
            &images,
            |image| {
                if image.as_raw() == 3 {
                    Err(BootstrapError::driver(Stage::ImageView)(
                        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
                    ))
                } else {
                    Ok(vk::ImageView::from_raw(image.as_raw() + 100))
                }
            },
            |view| destroyed.push(view.as_raw()),
        );

        assert!(matches!(
            result,
            Err(BootstrapError::DriverRejected {
                stage: Stage::ImageView,
                ..
            })
        ));
        assert_eq!(destroyed, vec![101, 102]);
    }

    #[test]
    fn image_count_stays_within_limits() {
        for (min, max) in [(1, 0), (2, 3), (2, 2), (3, 8), (1, 1), (4, 0)] {
            let count = choose_image_count(&caps(min, max));
            assert!(count >= min, "{count} < min {min}");
            if max > 0 {
                assert!(count <= max, "{count} > max {max}");
            } else {
                assert_eq!(count, min + 1);
            }
        }
        assert_eq!(choose_image_count(&caps(2, 3)), 3);
        assert_eq!(choose_image_count(&caps(2, 2)), 2);
    }

    #[test]
    fn same_family_is_exclusive_without_indices() {
        let policy = SharingPolicy::for_families(&QueueFamilies { graphics: 2, present: 2 });
        assert_eq!(policy, SharingPolicy::Exclusive);
        assert_eq!(policy.mode(), vk::SharingMode::EXCLUSIVE);
        assert!(policy.family_indices().is_empty());
    }

    #[test]
    fn distinct_families_share_concurrently() {
        let policy = SharingPolicy::for_families(&QueueFamilies { graphics: 0, present: 1 });
        assert_eq!(policy.mode(), vk::SharingMode::CONCURRENT);
        assert_eq!(policy.family_indices(), &[0, 1]);
    }

    #[test]
    fn negotiated_config_feeds_create_info() {
        let support = SurfaceSupport {
            capabilities: any_size(caps(2, 0)),
            formats: vec![format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let families = QueueFamilies { graphics: 0, present: 1 };
        let config =
            SurfaceConfig::negotiate(&support, (800, 600), &families, vk::PresentModeKHR::MAILBOX)
                .unwrap();

        assert_eq!(config.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(config.extent, vk::Extent2D { width: 800, height: 600 });
        assert_eq!(config.image_count, 3);

        let info = config.create_info(vk::SurfaceKHR::null());
        assert_eq!(info.min_image_count, 3);
        assert_eq!(info.image_sharing_mode, vk::SharingMode::CONCURRENT);
        assert_eq!(info.queue_family_index_count, 2);
        assert_eq!(info.composite_alpha, vk::CompositeAlphaFlagsKHR::OPAQUE);
        assert_eq!(info.pre_transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
        assert_eq!(info.clipped, vk::TRUE);
        assert_eq!(info.old_swapchain, vk::SwapchainKHR::null());
    }

    #[test]
    fn exclusive_create_info_has_no_family_list() {
        let support = SurfaceSupport {
            capabilities: caps(2, 3),
            formats: vec![format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
        };
        let families = QueueFamilies { graphics: 2, present: 2 };
        let config =
            SurfaceConfig::negotiate(&support, (800, 600), &families, vk::PresentModeKHR::MAILBOX)
                .unwrap();
        let info = config.create_info(vk::SurfaceKHR::null());

        assert_eq!(info.image_sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert_eq!(info.queue_family_index_count, 0);
        assert_eq!(info.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(info.image_format, vk::Format::B8G8R8A8_UNORM);
    }
}
