//! Instance creation utils.
use crate::{
    debug, BootstrapConfig, BootstrapSmallVec, DebugMessenger, Diagnostics, MessengerConfig,
    SurfaceError, SurfaceProvider, ValidationLayers, Version,
};
use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};
use cstr::cstr;
use std::{
    ffi::{CStr, CString, NulError},
    fmt,
    os::raw::c_char,
};
use thiserror::Error;

pub(crate) fn default_app_name() -> &'static CStr {
    cstr!("Hello Triangle")
}

pub(crate) fn default_engine_name() -> &'static CStr {
    cstr!("My Engine")
}

/// Metadata for after instance creation.
#[derive(Clone)]
pub struct InstanceMetadata {
    instance_handle: vk::Instance,
    api_version: u32,
    enabled_layers: BootstrapSmallVec<CString>,
    enabled_extensions: BootstrapSmallVec<CString>,
}

impl InstanceMetadata {
    /// The instance this metadata belongs to.
    #[inline]
    pub fn instance_handle(&self) -> vk::Instance {
        self.instance_handle
    }

    /// Retrieve the used instance API version.
    #[inline]
    pub fn api_version_raw(&self) -> u32 {
        self.api_version
    }

    /// Retrieve the used instance API major version.
    #[inline]
    pub fn api_version_major(&self) -> u32 {
        vk::api_version_major(self.api_version)
    }

    /// Retrieve the used instance API minor version.
    #[inline]
    pub fn api_version_minor(&self) -> u32 {
        vk::api_version_minor(self.api_version)
    }

    /// List of all enabled layers in the instance.
    #[inline]
    pub fn enabled_layers(&self) -> &[CString] {
        &self.enabled_layers
    }

    /// Returns true if `layer` is enabled.
    #[inline]
    pub fn is_layer_enabled(&self, layer: &CStr) -> bool {
        self.enabled_layers.iter().any(|e| e.as_c_str() == layer)
    }

    /// List of all enabled extensions in the instance.
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
}

impl fmt::Debug for InstanceMetadata {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("InstanceMetadata")
            .field(
                "api_version",
                &format_args!("{}.{}", self.api_version_major(), self.api_version_minor()),
            )
            .field("enabled_layers", &self.enabled_layers)
            .field("enabled_extensions", &self.enabled_extensions)
            .finish()
    }
}

/// Errors that can occur during instance creation.
#[derive(Debug, Error)]
pub enum InstanceCreationError {
    /// Vulkan Error.
    #[error("vulkan error: {0}")]
    VulkanError(#[from] vk::Result),
    /// One or more layers are not present.
    #[error("layers ({0:?}) not present")]
    LayersNotPresent(BootstrapSmallVec<CString>),
    /// One or more extensions are not present.
    #[error("extensions ({0:?}) not present")]
    ExtensionsNotPresent(BootstrapSmallVec<CString>),
}

/// Splits `requested` names into the ones to enable and the required ones
/// missing from `supported`. Optional names that are unsupported are dropped.
fn select_names(
    requested: &[(CString, bool)],
    supported: &[CString],
) -> Result<BootstrapSmallVec<CString>, BootstrapSmallVec<CString>> {
    let mut enabled = BootstrapSmallVec::new();
    let mut missing = BootstrapSmallVec::new();
    for (name, required) in requested {
        if enabled.contains(name) {
            continue;
        }

        let present = supported.iter().any(|s| s == name);
        match (required, present) {
            (_, true) => enabled.push(name.clone()),
            (true, false) => missing.push(name.clone()),
            (false, false) => log::warn!("{} is not supported, skipping", name.to_string_lossy()),
        }
    }

    if missing.is_empty() {
        Ok(enabled)
    } else {
        Err(missing)
    }
}

fn extension_names(properties: &[vk::ExtensionProperties]) -> impl Iterator<Item = CString> + '_ {
    properties
        .iter()
        .map(|p| unsafe { CStr::from_ptr(p.extension_name.as_ptr()) }.to_owned())
}

/// Allows to easily create an [`ash::Instance`] and its debug messenger.
pub struct InstanceBuilder {
    app_name: CString,
    app_version: Version,
    engine_name: CString,
    engine_version: Version,
    api_version: u32,
    layers: BootstrapSmallVec<(CString, bool)>,
    extensions: BootstrapSmallVec<(CString, bool)>,
    validation_layers: ValidationLayers,
    messenger: MessengerConfig,
}

impl InstanceBuilder {
    /// Create a new instance builder with opinionated defaults.
    #[inline]
    pub fn new() -> Self {
        InstanceBuilder::from_config(&BootstrapConfig::new())
    }

    /// Create a new instance builder taking identity and diagnostics from
    /// `config`.
    pub fn from_config(config: &BootstrapConfig) -> Self {
        InstanceBuilder {
            app_name: config.app_name.clone(),
            app_version: config.app_version,
            engine_name: config.engine_name.clone(),
            engine_version: config.engine_version,
            api_version: config.api_version,
            layers: BootstrapSmallVec::new(),
            extensions: BootstrapSmallVec::new(),
            validation_layers: config.validation_layers,
            messenger: config.messenger,
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
    pub fn api_version_raw(mut self, api_version: u32) -> Self {
        self.api_version = api_version;
        self
    }

    /// Try to enable this layer, ignore if it's not supported
    #[inline]
    pub fn request_layer(mut self, layer: &CStr) -> Self {
        self.layers.push((layer.to_owned(), false));
        self
    }

    /// Enable this layer, fail if it's not supported.
    #[inline]
    pub fn require_layer(mut self, layer: &CStr) -> Self {
        self.layers.push((layer.to_owned(), true));
        self
    }

    /// Try to enable this extension, ignore if it is not supported.
    #[inline]
    pub fn request_extension(mut self, extension: &CStr) -> Self {
        self.extensions.push((extension.to_owned(), false));
        self
    }

    /// Enable this extension, fail if it's not supported.
    #[inline]
    pub fn require_extension(mut self, extension: &CStr) -> Self {
        self.extensions.push((extension.to_owned(), true));
        self
    }

    /// Adds a requirement on all extensions `provider` needs to create its
    /// surface.
    pub fn require_surface_extensions(
        mut self,
        provider: &impl SurfaceProvider,
    ) -> Result<Self, SurfaceError> {
        let required = provider.required_extensions()?;
        log::info!("[surface] {} required extensions", required.len());
        for name in required {
            log::info!("\t{}", name.to_string_lossy());
            self.extensions.push((name.to_owned(), true));
        }

        Ok(self)
    }

    /// Add Khronos validation layers.
    #[inline]
    pub fn validation_layers(mut self, validation_layers: ValidationLayers) -> Self {
        self.validation_layers = validation_layers;
        self
    }

    /// Try to create a debug messenger with the config provided by
    /// `debug_messenger`.
    #[inline]
    pub fn request_debug_messenger(mut self, debug_messenger: DebugMessenger) -> Self {
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

    /// Layers that will be asked for: the explicit ones plus the validation
    /// layer unless validation is disabled.
    pub fn requested_layers(&self) -> BootstrapSmallVec<(CString, bool)> {
        let mut layers = self.layers.clone();
        match self.validation_layers {
            ValidationLayers::Require | ValidationLayers::Request => layers.push((
                debug::khronos_validation_layer().to_owned(),
                matches!(self.validation_layers, ValidationLayers::Require),
            )),
            ValidationLayers::Disable => (),
        }

        layers
    }

    /// Extensions that will be asked for: the explicit ones plus the debug
    /// utils extension if a messenger is wanted.
    pub fn requested_extensions(&self) -> BootstrapSmallVec<(CString, bool)> {
        let mut extensions = self.extensions.clone();
        if self.messenger_requested() {
            extensions.push((DebugUtils::name().to_owned(), false));
        }

        extensions
    }

    /// True if a debug messenger will be created when the driver allows it.
    #[inline]
    pub fn messenger_requested(&self) -> bool {
        !matches!(self.messenger.messenger, DebugMessenger::Disable)
    }

    /// Returns the [`ash::Instance`], the outcome of installing the debug
    /// messenger, and [`InstanceMetadata`] about what is actually enabled in
    /// the instance.
    pub unsafe fn build(
        self,
        entry: &Entry,
    ) -> Result<(Instance, Diagnostics, InstanceMetadata), InstanceCreationError> {
        let layer_properties = debug::supported_layers(entry)?;
        let enabled_layers = match select_names(&self.requested_layers(), &layer_properties) {
            Ok(enabled) => enabled,
            Err(missing) => return Err(InstanceCreationError::LayersNotPresent(missing)),
        };

        let mut extension_properties: Vec<CString> =
            extension_names(&entry.enumerate_instance_extension_properties(None)?).collect();
        log::info!("[vk] {} extensions supported", extension_properties.len());
        for extension in &extension_properties {
            log::debug!("\t{}", extension.to_string_lossy());
        }
        for layer_name in &enabled_layers {
            let layer_extensions =
                entry.enumerate_instance_extension_properties(Some(layer_name.as_c_str()))?;
            extension_properties.extend(extension_names(&layer_extensions));
        }

        let enabled_extensions =
            match select_names(&self.requested_extensions(), &extension_properties) {
                Ok(enabled) => enabled,
                Err(missing) => return Err(InstanceCreationError::ExtensionsNotPresent(missing)),
            };

        let is_debug_utils_enabled = enabled_extensions
            .iter()
            .any(|e| e.as_c_str() == DebugUtils::name());
        let messenger_info = self.messenger.create_info();

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&self.app_name)
            .application_version(self.app_version.raw())
            .engine_name(&self.engine_name)
            .engine_version(self.engine_version.raw())
            .api_version(self.api_version);

        let layer_ptrs: BootstrapSmallVec<*const c_char> =
            enabled_layers.iter().map(|l| l.as_ptr()).collect();
        let extension_ptrs: BootstrapSmallVec<*const c_char> =
            enabled_extensions.iter().map(|e| e.as_ptr()).collect();
        let mut instance_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        // Catches messages emitted by vkCreateInstance itself.
        let mut instance_messenger_info;
        if let Some(messenger_info) = messenger_info.filter(|_| is_debug_utils_enabled) {
            instance_messenger_info = messenger_info;
            instance_info = instance_info.push_next(&mut instance_messenger_info);
        }

        let instance = entry.create_instance(&instance_info, None)?;

        let diagnostics = match debug::install_messenger(
            entry,
            &instance,
            messenger_info.as_ref(),
            is_debug_utils_enabled,
        ) {
            Ok(diagnostics) => diagnostics,
            Err(err) => {
                instance.destroy_instance(None);
                return Err(err.into());
            }
        };

        let instance_metadata = InstanceMetadata {
            instance_handle: instance.handle(),
            api_version: self.api_version,
            enabled_layers,
            enabled_extensions,
        };
        log::debug!("{:?}", instance_metadata);

        Ok((instance, diagnostics, instance_metadata))
    }
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    #[test]
    fn disabled_diagnostics_request_nothing_extra() {
        let builder = InstanceBuilder::new()
            .require_extension(cstr!("VK_KHR_surface"))
            .validation_layers(ValidationLayers::Disable)
            .request_debug_messenger(DebugMessenger::Disable);

        let extensions = builder.requested_extensions();
        assert_eq!(extensions.as_slice(), &[(name("VK_KHR_surface"), true)]);
        assert!(builder.requested_layers().is_empty());
        assert!(!builder.messenger_requested());
    }

    #[test]
    fn enabled_diagnostics_merge_debug_utils() {
        let builder = InstanceBuilder::new()
            .require_extension(cstr!("VK_KHR_surface"))
            .require_extension(cstr!("VK_KHR_xcb_surface"))
            .validation_layers(ValidationLayers::Request)
            .request_debug_messenger(DebugMessenger::Default);

        let extensions: Vec<_> = builder
            .requested_extensions()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(
            extensions,
            vec![
                name("VK_KHR_surface"),
                name("VK_KHR_xcb_surface"),
                DebugUtils::name().to_owned()
            ]
        );
        assert_eq!(
            builder.requested_layers().as_slice(),
            &[(debug::khronos_validation_layer().to_owned(), false)]
        );
    }

    #[test]
    fn required_validation_is_required() {
        let builder = InstanceBuilder::new().validation_layers(ValidationLayers::Require);
        assert_eq!(
            builder.requested_layers().as_slice(),
            &[(debug::khronos_validation_layer().to_owned(), true)]
        );
    }

    #[test]
    fn select_names_drops_optional_and_reports_required() {
        let supported = vec![name("a"), name("b")];
        let requested = [(name("a"), true), (name("c"), false), (name("b"), false)];
        assert_eq!(
            select_names(&requested, &supported).unwrap().as_slice(),
            &[name("a"), name("b")]
        );

        let requested = [(name("a"), true), (name("d"), true), (name("e"), true)];
        assert_eq!(
            select_names(&requested, &supported).unwrap_err().as_slice(),
            &[name("d"), name("e")]
        );
    }

    #[test]
    fn select_names_deduplicates() {
        let supported = vec![name("a")];
        let requested = [(name("a"), true), (name("a"), false)];
        assert_eq!(select_names(&requested, &supported).unwrap().len(), 1);
    }

    #[test]
    #[ignore = "requires a Vulkan driver"]
    fn basic() {
        let entry = unsafe { Entry::load() }.unwrap();
        let (instance, diagnostics, metadata) = unsafe {
            InstanceBuilder::new()
                .validation_layers(ValidationLayers::Disable)
                .request_debug_messenger(DebugMessenger::Disable)
                .build(&entry)
                .unwrap()
        };
        assert!(matches!(diagnostics, Diagnostics::Disabled));
        assert!(!metadata.is_extension_enabled(DebugUtils::name()));

        unsafe {
            instance.destroy_instance(None);
        }
    }

    #[test]
    #[ignore = "requires a Vulkan driver"]
    fn validation_and_messenger() {
        let entry = unsafe { Entry::load() }.unwrap();
        let (instance, diagnostics, _metadata) = unsafe {
            InstanceBuilder::new()
                .validation_layers(ValidationLayers::Request)
                .request_debug_messenger(DebugMessenger::Default)
                .build(&entry)
                .unwrap()
        };

        unsafe {
            if let Some(channel) = diagnostics.channel() {
                channel.destroy();
            }

            instance.destroy_instance(None);
        }
    }
}
