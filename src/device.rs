//! Device creation utils.
use crate::{BootstrapSmallVec, InstanceMetadata, PhysicalDeviceCandidate, QueueFamilies};
use ash::{vk, Device, Instance};
use std::{
    ffi::{CStr, CString},
    hash::{Hash, Hasher},
    os::raw::{c_char, c_float},
};
use thiserror::Error;

/// Errors that can occur during device creation.
#[derive(Debug, Error)]
pub enum DeviceCreationError {
    /// Vulkan Error.
    #[error("vulkan error: {0}")]
    VulkanError(#[from] vk::Result),
}

/// Setup for [`vk::Queue`] creation.
/// The [`Hash`] and [`PartialEq`] implementations on this struct **only**
/// compare `queue_family_index`.
#[derive(Debug, Clone)]
pub struct QueueSetup {
    /// Flags used to specify usage behavior of the queue.
    pub flags: vk::DeviceQueueCreateFlags,
    /// Index of the queue family in the queue family array.
    pub queue_family_index: u32,
    /// Specifies the amount of queues and the respective priority for each.
    pub queue_priorities: Vec<c_float>,
}

impl QueueSetup {
    /// Create a new custom queue setup with simplified arguments.
    /// Queue priorities will all be 1.0 and all flags will be empty.
    #[inline]
    pub fn simple(queue_family_index: u32, queue_count: usize) -> QueueSetup {
        QueueSetup {
            flags: vk::DeviceQueueCreateFlags::empty(),
            queue_family_index,
            queue_priorities: (0..queue_count).map(|_| 1.0).collect(),
        }
    }

    #[inline]
    fn as_vulkan(&self) -> vk::DeviceQueueCreateInfoBuilder<'_> {
        vk::DeviceQueueCreateInfo::builder()
            .flags(self.flags)
            .queue_family_index(self.queue_family_index)
            .queue_priorities(&self.queue_priorities)
    }
}

impl PartialEq for QueueSetup {
    fn eq(&self, rhs: &Self) -> bool {
        self.queue_family_index == rhs.queue_family_index
    }
}

impl Eq for QueueSetup {}

impl Hash for QueueSetup {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.queue_family_index.hash(state);
    }
}

/// One single-queue setup per distinct family in `queue_families`.
pub fn queue_setups(queue_families: &QueueFamilies) -> BootstrapSmallVec<QueueSetup> {
    queue_families
        .unique()
        .into_iter()
        .map(|index| QueueSetup::simple(index, 1))
        .collect()
}

/// Queues retrieved from the logical device. They live as long as the device
/// and are never destroyed on their own.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Queues {
    /// Queue 0 of the graphics family.
    pub graphics: vk::Queue,
    /// Queue 0 of the present family. Equal to `graphics` if both families
    /// are the same.
    pub present: vk::Queue,
}

/// Metadata for after device creation.
#[derive(Debug, Clone)]
pub struct DeviceMetadata {
    device_handle: vk::Device,
    physical_device: vk::PhysicalDevice,
    queue_families: QueueFamilies,
    queue_setups: BootstrapSmallVec<QueueSetup>,
    enabled_extensions: BootstrapSmallVec<CString>,
    enabled_layers: BootstrapSmallVec<CString>,
}

impl DeviceMetadata {
    /// The device this metadata belongs to.
    #[inline]
    pub fn device_handle(&self) -> vk::Device {
        self.device_handle
    }

    /// The physical device this device belongs to.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// The graphics and present families queues were created from.
    #[inline]
    pub fn queue_families(&self) -> QueueFamilies {
        self.queue_families
    }

    /// The queue setups which are in use.
    #[inline]
    pub fn queue_setups(&self) -> &[QueueSetup] {
        &self.queue_setups
    }

    /// List of all enabled extensions in the device.
    #[inline]
    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }

    /// Returns true if `extension` is enabled.
    #[inline]
    pub fn is_extension_enabled(&self, extension: &CStr) -> bool {
        self.enabled_extensions
            .iter()
            .any(|i| i.as_c_str() == extension)
    }

    /// Layers passed at device creation, mirroring the instance.
    #[inline]
    pub fn enabled_layers(&self) -> &[CString] {
        &self.enabled_layers
    }
}

/// Create the logical device for `physical_device` and fetch its graphics and
/// present queues.
///
/// `extensions` should be the set the device was selected against. The
/// instance's layers are passed again for implementations that still scope
/// layers per device.
pub unsafe fn create_logical_device(
    instance: &Instance,
    instance_metadata: &InstanceMetadata,
    physical_device: &PhysicalDeviceCandidate,
    queue_families: QueueFamilies,
    extensions: &[CString],
) -> Result<(Device, Queues, DeviceMetadata), DeviceCreationError> {
    let queue_setups = queue_setups(&queue_families);
    let queue_create_infos: BootstrapSmallVec<_> = queue_setups
        .iter()
        .map(QueueSetup::as_vulkan)
        .map(|x| x.build())
        .collect();

    let extension_ptrs: BootstrapSmallVec<*const c_char> =
        extensions.iter().map(|e| e.as_ptr()).collect();
    let layer_ptrs: BootstrapSmallVec<*const c_char> = instance_metadata
        .enabled_layers()
        .iter()
        .map(|l| l.as_ptr())
        .collect();
    let features = vk::PhysicalDeviceFeatures::default();

    #[allow(deprecated)]
    let device_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_ptrs)
        .enabled_layer_names(&layer_ptrs)
        .enabled_features(&features);

    let device = instance.create_device(physical_device.handle(), &device_info, None)?;
    drop(queue_create_infos);

    let queues = Queues {
        graphics: device.get_device_queue(queue_families.graphics, 0),
        present: device.get_device_queue(queue_families.present, 0),
    };
    log::info!(
        "[vk] logical device created on {} with {} queue families",
        physical_device.name(),
        queue_setups.len()
    );

    let device_metadata = DeviceMetadata {
        device_handle: device.handle(),
        physical_device: physical_device.handle(),
        queue_families,
        queue_setups,
        enabled_extensions: extensions.iter().cloned().collect(),
        enabled_layers: instance_metadata.enabled_layers().iter().cloned().collect(),
    };

    Ok((device, queues, device_metadata))
}
