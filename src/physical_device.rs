//! Physical device enumeration and selection.
use crate::{BootstrapSmallVec, SurfaceHandle, SwapchainSupport};
use ash::{vk, Instance};
use std::{
    ffi::{CStr, CString},
    fmt,
};
use thiserror::Error;

/// Errors that can occur during physical device selection.
#[derive(Debug, Error)]
pub enum DeviceSelectionError {
    /// Vulkan Error.
    #[error("vulkan error: {0}")]
    VulkanError(#[from] vk::Result),
    /// The driver reports no physical devices at all.
    #[error("no physical devices found")]
    NoPhysicalDevices,
    /// No physical device met the requirements.
    #[error("no physical device met the requirements")]
    RequirementsNotMet,
}

/// Hard requirements on the device type and features.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DeviceRequirements {
    /// Only consider [`vk::PhysicalDeviceType::DISCRETE_GPU`]s.
    pub discrete: bool,
    /// Only consider devices supporting geometry shaders.
    pub geometry_shader: bool,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        DeviceRequirements {
            discrete: true,
            geometry_shader: true,
        }
    }
}

/// Snapshot of one physical device, taken at enumeration.
#[derive(Clone)]
pub struct PhysicalDeviceCandidate {
    handle: vk::PhysicalDevice,
    name: String,
    device_type: vk::PhysicalDeviceType,
    api_version: u32,
    features: vk::PhysicalDeviceFeatures,
    extensions: Vec<CString>,
    device_local_memory: vk::DeviceSize,
    swapchain_support: SwapchainSupport,
}

impl PhysicalDeviceCandidate {
    /// A candidate with no features, no extensions and no surface support.
    pub fn new(
        handle: vk::PhysicalDevice,
        name: &str,
        device_type: vk::PhysicalDeviceType,
    ) -> Self {
        PhysicalDeviceCandidate {
            handle,
            name: name.to_owned(),
            device_type,
            api_version: vk::API_VERSION_1_0,
            features: vk::PhysicalDeviceFeatures::default(),
            extensions: Vec::new(),
            device_local_memory: 0,
            swapchain_support: SwapchainSupport::default(),
        }
    }

    /// Set the supported features.
    #[inline]
    pub fn with_features(mut self, features: vk::PhysicalDeviceFeatures) -> Self {
        self.features = features;
        self
    }

    /// Set the supported device extensions.
    #[inline]
    pub fn with_extensions(mut self, extensions: impl IntoIterator<Item = CString>) -> Self {
        self.extensions = extensions.into_iter().collect();
        self
    }

    /// Set the size of the largest `DEVICE_LOCAL` heap.
    #[inline]
    pub fn with_device_local_memory(mut self, size: vk::DeviceSize) -> Self {
        self.device_local_memory = size;
        self
    }

    /// Set what the device supports for the target surface.
    #[inline]
    pub fn with_swapchain_support(mut self, support: SwapchainSupport) -> Self {
        self.swapchain_support = support;
        self
    }

    /// Snapshot `physical_device`, including its support for `surface`.
    pub unsafe fn query(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        surface: &SurfaceHandle,
    ) -> Result<Self, vk::Result> {
        let properties = instance.get_physical_device_properties(physical_device);
        let features = instance.get_physical_device_features(physical_device);
        let extensions = instance
            .enumerate_device_extension_properties(physical_device)?
            .iter()
            .map(|p| CStr::from_ptr(p.extension_name.as_ptr()).to_owned())
            .collect();

        let memory_properties = instance.get_physical_device_memory_properties(physical_device);
        let device_local_memory = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .max()
            .unwrap_or(0);

        let name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();
        let swapchain_support = surface_support_or_unsupported(
            &name,
            SwapchainSupport::query(surface, physical_device),
        );

        Ok(PhysicalDeviceCandidate {
            handle: physical_device,
            name,
            device_type: properties.device_type,
            api_version: properties.api_version,
            features,
            extensions,
            device_local_memory,
            swapchain_support,
        })
    }

    /// The physical device handle.
    #[inline]
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    /// Name of the physical device.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type of the physical device.
    #[inline]
    pub fn device_type(&self) -> vk::PhysicalDeviceType {
        self.device_type
    }

    /// Highest API version the device supports.
    #[inline]
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    /// Supported features.
    #[inline]
    pub fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    /// Supported device extensions.
    #[inline]
    pub fn extensions(&self) -> &[CString] {
        &self.extensions
    }

    /// Size of the largest `DEVICE_LOCAL` heap in bytes.
    #[inline]
    pub fn device_local_memory(&self) -> vk::DeviceSize {
        self.device_local_memory
    }

    /// Capabilities, formats and present modes for the target surface.
    #[inline]
    pub fn swapchain_support(&self) -> &SwapchainSupport {
        &self.swapchain_support
    }

    /// Required extensions this device lacks.
    pub fn missing_extensions(&self, required: &[CString]) -> BootstrapSmallVec<CString> {
        required
            .iter()
            .filter(|r| !self.extensions.contains(*r))
            .cloned()
            .collect()
    }

    /// Evaluate every suitability predicate against this device.
    pub fn assess(
        &self,
        requirements: &DeviceRequirements,
        required_extensions: &[CString],
    ) -> Suitability {
        let type_matches =
            !requirements.discrete || self.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
        let features_match =
            !requirements.geometry_shader || self.features.geometry_shader == vk::TRUE;

        Suitability {
            type_and_features: type_matches && features_match,
            missing_extensions: self.missing_extensions(required_extensions),
            surface_supported: self.swapchain_support.is_adequate(),
        }
    }
}

impl fmt::Debug for PhysicalDeviceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalDeviceCandidate")
            .field("name", &self.name)
            .field("device_type", &self.device_type)
            .field(
                "api_version",
                &format_args!(
                    "{}.{}",
                    vk::api_version_major(self.api_version),
                    vk::api_version_minor(self.api_version)
                ),
            )
            .field("extensions", &self.extensions.len())
            .field("device_local_memory", &self.device_local_memory)
            .finish()
    }
}

/// Verdict of the suitability predicates for one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suitability {
    /// Device type and features meet [`DeviceRequirements`].
    pub type_and_features: bool,
    /// Required extensions the device lacks.
    pub missing_extensions: BootstrapSmallVec<CString>,
    /// At least one surface format and one present mode are available.
    pub surface_supported: bool,
}

impl Suitability {
    /// True iff every predicate holds.
    #[inline]
    pub fn is_suitable(&self) -> bool {
        self.type_and_features && self.missing_extensions.is_empty() && self.surface_supported
    }
}

impl fmt::Display for Suitability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_suitable() {
            return f.write_str("suitable");
        }

        f.write_str("unsuitable:")?;
        if !self.type_and_features {
            f.write_str(" device type or features not met;")?;
        }
        if !self.missing_extensions.is_empty() {
            write!(f, " missing extensions {:?};", self.missing_extensions)?;
        }
        if !self.surface_supported {
            f.write_str(" no surface formats or present modes;")?;
        }
        Ok(())
    }
}

/// Orders suitable devices. Higher scores win; on a tie the device enumerated
/// later wins.
pub trait DeviceRanking {
    /// Score a candidate which already passed every suitability predicate.
    fn score(&self, candidate: &PhysicalDeviceCandidate) -> u64;
}

/// Every suitable device scores the same, so the last suitable one is chosen.
#[derive(Debug, Copy, Clone, Default)]
pub struct LastSuitable;

impl DeviceRanking for LastSuitable {
    #[inline]
    fn score(&self, _candidate: &PhysicalDeviceCandidate) -> u64 {
        0
    }
}

/// Prefer the device with the largest `DEVICE_LOCAL` heap.
#[derive(Debug, Copy, Clone, Default)]
pub struct MostDeviceLocalMemory;

impl DeviceRanking for MostDeviceLocalMemory {
    #[inline]
    fn score(&self, candidate: &PhysicalDeviceCandidate) -> u64 {
        candidate.device_local_memory()
    }
}

impl<F> DeviceRanking for F
where
    F: Fn(&PhysicalDeviceCandidate) -> u64,
{
    #[inline]
    fn score(&self, candidate: &PhysicalDeviceCandidate) -> u64 {
        self(candidate)
    }
}

/// A failed surface query marks only that device as unable to present.
fn surface_support_or_unsupported(
    name: &str,
    queried: Result<SwapchainSupport, vk::Result>,
) -> SwapchainSupport {
    queried.unwrap_or_else(|err| {
        log::warn!("[vk] {name}: surface query failed ({err}), treating as unsupported");
        SwapchainSupport::default()
    })
}

/// Snapshot every physical device visible to `instance`.
pub unsafe fn enumerate_candidates(
    instance: &Instance,
    surface: &SurfaceHandle,
) -> Result<Vec<PhysicalDeviceCandidate>, DeviceSelectionError> {
    let physical_devices = instance.enumerate_physical_devices()?;
    if physical_devices.is_empty() {
        return Err(DeviceSelectionError::NoPhysicalDevices);
    }

    physical_devices
        .into_iter()
        .map(|physical_device| {
            PhysicalDeviceCandidate::query(instance, physical_device, surface)
                .map_err(DeviceSelectionError::from)
        })
        .collect()
}

/// Choose one suitable device among `candidates`.
pub fn select_physical_device<'a>(
    candidates: &'a [PhysicalDeviceCandidate],
    requirements: &DeviceRequirements,
    required_extensions: &[CString],
    ranking: &dyn DeviceRanking,
) -> Result<&'a PhysicalDeviceCandidate, DeviceSelectionError> {
    if candidates.is_empty() {
        return Err(DeviceSelectionError::NoPhysicalDevices);
    }

    let mut chosen: Option<(&PhysicalDeviceCandidate, u64)> = None;
    for candidate in candidates {
        let suitability = candidate.assess(requirements, required_extensions);
        log::info!(
            "[vk] {} ({:?}): {}",
            candidate.name(),
            candidate.device_type(),
            suitability
        );
        if !suitability.is_suitable() {
            continue;
        }

        let score = ranking.score(candidate);
        if chosen.map_or(true, |(_, best)| score >= best) {
            chosen = Some((candidate, score));
        }
    }

    let (chosen, _) = chosen.ok_or(DeviceSelectionError::RequirementsNotMet)?;
    log::info!("[vk] selected {}", chosen.name());
    Ok(chosen)
}
