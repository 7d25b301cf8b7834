//! Bring-up configuration.
use crate::{
    BootstrapSmallVec, DebugMessenger, DeviceRequirements, MessengerConfig, ValidationLayers,
};
use ash::{extensions::khr::Swapchain, vk};
use std::ffi::{CStr, CString, NulError};

/// A `major.minor.patch` version triple.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
}

impl Version {
    /// Create a version triple.
    #[inline]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Version {
            major,
            minor,
            patch,
        }
    }

    /// Encoded the way Vulkan expects it, with variant 0.
    #[inline]
    pub fn raw(self) -> u32 {
        vk::make_api_version(0, self.major, self.minor, self.patch)
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::new(1, 0, 0)
    }
}

/// Everything the bring-up sequence needs to know up front.
///
/// Passed by reference to each step instead of living in process-wide state.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Application name to advertise.
    pub app_name: CString,
    /// Application version to advertise.
    pub app_version: Version,
    /// Engine name to advertise.
    pub engine_name: CString,
    /// Engine version to advertise.
    pub engine_version: Version,
    /// Instance API version to request.
    pub api_version: u32,
    /// Whether the Khronos validation layer is enabled.
    pub validation_layers: ValidationLayers,
    /// Debug messenger filters and sink.
    pub messenger: MessengerConfig,
    /// Extensions every candidate device must support. They are all enabled.
    pub device_extensions: BootstrapSmallVec<CString>,
    /// Hard requirements a candidate device must meet.
    pub device_requirements: DeviceRequirements,
}

impl BootstrapConfig {
    /// Create a configuration with opinionated defaults.
    #[inline]
    pub fn new() -> Self {
        BootstrapConfig {
            app_name: CString::from(crate::instance::default_app_name()),
            app_version: Version::default(),
            engine_name: CString::from(crate::instance::default_engine_name()),
            engine_version: Version::default(),
            api_version: vk::API_VERSION_1_0,
            validation_layers: ValidationLayers::default(),
            messenger: MessengerConfig {
                severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                messenger: if cfg!(debug_assertions) {
                    DebugMessenger::Default
                } else {
                    DebugMessenger::Disable
                },
            },
            device_extensions: std::iter::once(Swapchain::name().to_owned()).collect(),
            device_requirements: DeviceRequirements::default(),
        }
    }

    /// Application name to advertise.
    #[inline]
    pub fn app_name(mut self, app_name: &str) -> Result<Self, NulError> {
        self.app_name = CString::new(app_name)?;
        Ok(self)
    }

    /// Application version to advertise.
    #[inline]
    pub fn app_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.app_version = Version::new(major, minor, patch);
        self
    }

    /// Engine name to advertise.
    #[inline]
    pub fn engine_name(mut self, engine_name: &str) -> Result<Self, NulError> {
        self.engine_name = CString::new(engine_name)?;
        Ok(self)
    }

    /// Engine version to advertise.
    #[inline]
    pub fn engine_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.engine_version = Version::new(major, minor, patch);
        self
    }

    /// Instance API version to request.
    #[inline]
    pub fn api_version(mut self, major: u32, minor: u32) -> Self {
        self.api_version = vk::make_api_version(0, major, minor, 0);
        self
    }

    /// Require, request or disable the Khronos validation layer.
    #[inline]
    pub fn validation_layers(mut self, validation_layers: ValidationLayers) -> Self {
        self.validation_layers = validation_layers;
        self
    }

    /// Configure the debug messenger.
    #[inline]
    pub fn debug_messenger(mut self, debug_messenger: DebugMessenger) -> Self {
        self.messenger.messenger = debug_messenger;
        self
    }

    /// Filter for the severity of debug messages.
    #[inline]
    pub fn debug_message_severity(
        mut self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ) -> Self {
        self.messenger.severity = severity;
        self
    }

    /// Filter for the type of debug messages.
    #[inline]
    pub fn debug_message_type(mut self, ty: vk::DebugUtilsMessageTypeFlagsEXT) -> Self {
        self.messenger.message_type = ty;
        self
    }

    /// Turn validation layers and the debug messenger on or off together.
    #[inline]
    pub fn diagnostics(self, enabled: bool) -> Self {
        if enabled {
            self.validation_layers(ValidationLayers::Request)
                .debug_messenger(DebugMessenger::Default)
        } else {
            self.validation_layers(ValidationLayers::Disable)
                .debug_messenger(DebugMessenger::Disable)
        }
    }

    /// True if either validation layers or the debug messenger are wanted.
    #[inline]
    pub fn diagnostics_enabled(&self) -> bool {
        !matches!(self.validation_layers, ValidationLayers::Disable)
            || !matches!(self.messenger.messenger, DebugMessenger::Disable)
    }

    /// Require a device which supports `extension`. The extension will be
    /// enabled.
    #[inline]
    pub fn require_device_extension(mut self, extension: &CStr) -> Self {
        if !self.device_extensions.iter().any(|e| e.as_c_str() == extension) {
            self.device_extensions.push(extension.to_owned());
        }
        self
    }

    /// Replace the hard device requirements.
    #[inline]
    pub fn device_requirements(mut self, requirements: DeviceRequirements) -> Self {
        self.device_requirements = requirements;
        self
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapchain_extension_required_by_default() {
        let config = BootstrapConfig::new();
        assert_eq!(
            config.device_extensions.as_slice(),
            &[Swapchain::name().to_owned()]
        );
    }

    #[test]
    fn device_extensions_are_not_duplicated() {
        let config = BootstrapConfig::new().require_device_extension(Swapchain::name());
        assert_eq!(config.device_extensions.len(), 1);
    }

    #[test]
    fn diagnostics_toggle() {
        let config = BootstrapConfig::new().diagnostics(false);
        assert!(!config.diagnostics_enabled());
        assert_eq!(config.validation_layers, ValidationLayers::Disable);

        let config = config.diagnostics(true);
        assert!(config.diagnostics_enabled());
        assert!(matches!(config.messenger.messenger, DebugMessenger::Default));
    }

    #[test]
    fn version_encoding() {
        assert_eq!(Version::new(1, 2, 3).raw(), vk::make_api_version(0, 1, 2, 3));
        assert_eq!(Version::default(), Version::new(1, 0, 0));
    }
}
