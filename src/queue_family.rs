//! Queue family resolution.
use crate::{BootstrapSmallVec, SurfaceHandle};
use ash::{vk, Instance};
use thiserror::Error;

/// Errors that can occur during queue family resolution.
#[derive(Debug, Error)]
pub enum QueueFamilyError {
    /// Vulkan Error.
    #[error("vulkan error: {0}")]
    VulkanError(#[from] vk::Result),
    /// After scanning every family, a capability was still unresolved.
    #[error("no queue family supports {0}")]
    Unresolved(&'static str),
}

/// Graphics and presentation family indices found so far.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct QueueFamilyIndices {
    /// First family with [`vk::QueueFlags::GRAPHICS`].
    pub graphics: Option<u32>,
    /// First family able to present to the surface.
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// True once both indices are known.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Both indices, or an error naming what is missing.
    pub fn resolved(&self) -> Result<QueueFamilies, QueueFamilyError> {
        match (self.graphics, self.present) {
            (Some(graphics), Some(present)) => Ok(QueueFamilies { graphics, present }),
            (None, Some(_)) => Err(QueueFamilyError::Unresolved("graphics")),
            (Some(_), None) => Err(QueueFamilyError::Unresolved("presentation")),
            (None, None) => Err(QueueFamilyError::Unresolved("graphics or presentation")),
        }
    }
}

/// Resolved graphics and presentation families. They may be the same family.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct QueueFamilies {
    /// Family the graphics queue is taken from.
    pub graphics: u32,
    /// Family the present queue is taken from.
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> BootstrapSmallVec<u32> {
        let mut unique = BootstrapSmallVec::new();
        for index in [self.graphics, self.present] {
            if !unique.contains(&index) {
                unique.push(index);
            }
        }
        unique
    }
}

/// Scan `queue_family_properties` in order, taking the first family matching
/// each capability and stopping as soon as both are found.
///
/// `supports_present` is asked only while no presentation family is known.
pub fn find_queue_families<E>(
    queue_family_properties: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> Result<bool, E>,
) -> Result<QueueFamilyIndices, E> {
    let mut indices = QueueFamilyIndices::default();
    for (i, properties) in queue_family_properties.iter().enumerate() {
        let i = i as u32;

        if indices.graphics.is_none() && properties.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics = Some(i);
        }

        if indices.present.is_none() && supports_present(i)? {
            indices.present = Some(i);
        }

        if indices.is_complete() {
            break;
        }
    }

    Ok(indices)
}

/// Resolve the graphics and presentation families of `physical_device` for
/// `surface`.
pub unsafe fn resolve_queue_families(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    surface: &SurfaceHandle,
) -> Result<QueueFamilies, QueueFamilyError> {
    let queue_family_properties =
        instance.get_physical_device_queue_family_properties(physical_device);
    let indices = find_queue_families(&queue_family_properties, |i| {
        surface
            .loader()
            .get_physical_device_surface_support(physical_device, i, surface.handle())
    })?;
    log::debug!("[vk] queue families: {:?}", indices);

    indices.resolved()
}
