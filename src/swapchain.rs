//! Swapchain negotiation.
//!
//! [`SwapchainSupport`] is what a (physical device, surface) pair offers,
//! queried once. [`SwapchainSupport::negotiate`] turns it into a
//! [`SwapchainConfig`] deterministically, and [`create_swapchain`] consumes
//! that config.
use crate::{QueueFamilies, SurfaceHandle};
use ash::extensions::khr;
use ash::{vk, Device};
use thiserror::Error;

/// Errors that can occur during swapchain negotiation or creation.
#[derive(Debug, Error)]
pub enum SwapchainError {
    /// Vulkan Error.
    #[error("vulkan error: {0}")]
    VulkanError(#[from] vk::Result),
    /// The surface reports no formats for this device.
    #[error("no surface formats available")]
    NoSurfaceFormats,
    /// The surface reports no present modes for this device.
    #[error("no present modes available")]
    NoPresentModes,
}

/// The surface format chosen whenever the surface offers it.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Capabilities, formats and present modes of a (physical device, surface)
/// pair.
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    /// Surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported formats, in driver order.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes, in driver order.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// Query what `physical_device` supports for `surface`.
    pub unsafe fn query(
        surface: &SurfaceHandle,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self, vk::Result> {
        let loader = surface.loader();
        Ok(SwapchainSupport {
            capabilities: loader
                .get_physical_device_surface_capabilities(physical_device, surface.handle())?,
            formats: loader
                .get_physical_device_surface_formats(physical_device, surface.handle())?,
            present_modes: loader
                .get_physical_device_surface_present_modes(physical_device, surface.handle())?,
        })
    }

    /// True if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    /// Pick format, present mode, extent and image count.
    ///
    /// `framebuffer_extent` is only called if the surface leaves the extent up
    /// to the swapchain.
    pub fn negotiate(
        &self,
        framebuffer_extent: impl FnOnce() -> vk::Extent2D,
    ) -> Result<SwapchainConfig, SwapchainError> {
        let surface_format =
            choose_surface_format(&self.formats).ok_or(SwapchainError::NoSurfaceFormats)?;
        if self.present_modes.is_empty() {
            return Err(SwapchainError::NoPresentModes);
        }

        let config = SwapchainConfig {
            format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode: choose_present_mode(&self.present_modes),
            extent: choose_extent(&self.capabilities, framebuffer_extent),
            image_count: choose_image_count(&self.capabilities),
            pre_transform: self.capabilities.current_transform,
        };
        log::info!(
            "[vk] swapchain: {:?} {:?}, {:?}, {}x{}, {} images",
            config.format,
            config.color_space,
            config.present_mode,
            config.extent.width,
            config.extent.height,
            config.image_count
        );

        Ok(config)
    }
}

/// The preferred 8-bit BGRA sRGB format if offered, otherwise the first one.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == PREFERRED_SURFACE_FORMAT.format
                && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| formats.first())
        .copied()
}

/// Mailbox if offered, otherwise FIFO, which every surface supports.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, or, if the surface reports `u32::MAX`, the
/// framebuffer size clamped into the supported range.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_extent: impl FnOnce() -> vk::Extent2D,
) -> vk::Extent2D {
    match capabilities.current_extent.width {
        // If Vulkan doesn't know, the windowing system probably does. Known to apply at
        // least to Wayland.
        u32::MAX => {
            let framebuffer = framebuffer_extent();
            // Not `clamp`: a driver may report min > max.
            vk::Extent2D {
                width: framebuffer
                    .width
                    .max(capabilities.min_image_extent.width)
                    .min(capabilities.max_image_extent.width),
                height: framebuffer
                    .height
                    .max(capabilities.min_image_extent.height)
                    .min(capabilities.max_image_extent.height),
            }
        }
        _ => capabilities.current_extent,
    }
}

/// One image more than the driver minimum, capped by the maximum unless that
/// is 0 (unbounded).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired_image_count = capabilities.min_image_count.saturating_add(1);
    if capabilities.max_image_count > 0 {
        capabilities.max_image_count.min(desired_image_count)
    } else {
        desired_image_count
    }
}

/// Negotiated swapchain parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SwapchainConfig {
    /// Image format.
    pub format: vk::Format,
    /// Color space the images are presented in.
    pub color_space: vk::ColorSpaceKHR,
    /// Presentation mode.
    pub present_mode: vk::PresentModeKHR,
    /// Image dimensions.
    pub extent: vk::Extent2D,
    /// Minimum number of images to request.
    pub image_count: u32,
    /// Transform applied on presentation.
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainConfig {
    /// Format and color space as one value.
    #[inline]
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: self.format,
            color_space: self.color_space,
        }
    }

    /// Sharing mode and queue family indices for images used by both the
    /// graphics and the present family.
    pub fn sharing(&self, queue_families: &QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
        if queue_families.graphics == queue_families.present {
            (vk::SharingMode::EXCLUSIVE, Vec::new())
        } else {
            (
                vk::SharingMode::CONCURRENT,
                vec![queue_families.graphics, queue_families.present],
            )
        }
    }
}

/// A created swapchain, its images, and the loader needed to destroy it.
#[derive(Clone)]
pub struct SwapchainHandle {
    loader: khr::Swapchain,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    config: SwapchainConfig,
}

impl SwapchainHandle {
    /// The swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// The swapchain images.
    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// The configuration the swapchain was created with.
    #[inline]
    pub fn config(&self) -> &SwapchainConfig {
        &self.config
    }

    /// The `VK_KHR_swapchain` function table.
    #[inline]
    pub fn loader(&self) -> &khr::Swapchain {
        &self.loader
    }

    /// Destroys the swapchain. Must happen before the device is destroyed.
    pub unsafe fn destroy(&self) {
        self.loader.destroy_swapchain(self.handle, None);
    }
}

/// Create a swapchain of color attachment images with one array layer.
///
/// # Safety
///
/// `device` must have been created with `VK_KHR_swapchain` enabled, from the
/// physical device `config` was negotiated for.
pub unsafe fn create_swapchain(
    instance: &ash::Instance,
    device: &Device,
    surface: &SurfaceHandle,
    queue_families: &QueueFamilies,
    config: &SwapchainConfig,
) -> Result<SwapchainHandle, SwapchainError> {
    let (sharing_mode, indices) = config.sharing(queue_families);
    let create_info = vk::SwapchainCreateInfoKHR::builder()
        .surface(surface.handle())
        .min_image_count(config.image_count)
        .image_format(config.format)
        .image_color_space(config.color_space)
        .image_extent(config.extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(sharing_mode)
        .queue_family_indices(&indices)
        .pre_transform(config.pre_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(config.present_mode)
        .clipped(true);

    let loader = khr::Swapchain::new(instance, device);
    let handle = loader.create_swapchain(&create_info, None)?;
    let images = match loader.get_swapchain_images(handle) {
        Ok(images) => images,
        Err(err) => {
            loader.destroy_swapchain(handle, None);
            return Err(err.into());
        }
    };
    log::debug!("[vk] swapchain created with {} images", images.len());

    Ok(SwapchainHandle {
        loader,
        handle,
        images,
        config: *config,
    })
}
