//! Validation layers and the debug messenger.
use crate::BootstrapSmallVec;
use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};
use cstr::cstr;
use std::{
    borrow::Cow,
    ffi::{c_void, CStr, CString},
    fmt,
};

/// Name of the Khronos validation layer.
#[inline]
pub fn khronos_validation_layer() -> &'static CStr {
    cstr!("VK_LAYER_KHRONOS_validation")
}

/// Require, request or disable validation layers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValidationLayers {
    /// Instance creation will fail if there are no validation layers installed.
    Require,
    /// If there are validation layers installed, enable them.
    Request,
    /// Don't enable validation layers.
    Disable,
}

impl Default for ValidationLayers {
    /// [`ValidationLayers::Request`] in debug builds, [`ValidationLayers::Disable`]
    /// otherwise.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            ValidationLayers::Request
        } else {
            ValidationLayers::Disable
        }
    }
}

/// Enable or disable the debug messenger, optionally providing a custom callback.
#[derive(Copy, Clone)]
pub enum DebugMessenger {
    /// Enables the debug messenger with the [`default_debug_callback`]
    /// callback.
    Default,
    /// Enables the debug messenger with a custom, user-provided callback.
    Custom {
        /// The user provided callback function. Feel free to take a look at the
        /// [`default_debug_callback`] when implementing your own.
        callback: vk::PFN_vkDebugUtilsMessengerCallbackEXT,
        /// A user data pointer passed to the debug callback.
        user_data_pointer: *mut c_void,
    },
    /// Disables the debug messenger.
    Disable,
}

impl fmt::Debug for DebugMessenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugMessenger::Default => f.write_str("Default"),
            DebugMessenger::Custom { .. } => f.write_str("Custom"),
            DebugMessenger::Disable => f.write_str("Disable"),
        }
    }
}

/// Log level a driver message of `severity` is forwarded at.
pub fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Info
    } else {
        log::Level::Debug
    }
}

fn message_type_label(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

/// The default debug callback used in [`DebugMessenger::Default`].
///
/// Forwards the message to the [`log`] facade and never asks the driver to
/// abort the call that triggered it.
pub unsafe extern "system" fn default_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        Cow::Borrowed("<no message>")
    } else {
        CStr::from_ptr((*p_callback_data).p_message).to_string_lossy()
    };

    log::log!(
        target: "vulkan",
        severity_level(message_severity),
        "[vk] {}: {}",
        message_type_label(message_type),
        message
    );

    vk::FALSE
}

/// Returns the requested layers which are absent from `supported`, in request
/// order. An empty result means every requested layer is available.
pub fn missing_layers<'a>(
    requested: impl IntoIterator<Item = &'a CStr>,
    supported: &[CString],
) -> BootstrapSmallVec<CString> {
    requested
        .into_iter()
        .filter(|layer| !supported.iter().any(|s| s.as_c_str() == *layer))
        .map(CStr::to_owned)
        .collect()
}

/// True iff every requested layer appears in `supported`.
#[inline]
pub fn layers_supported<'a>(
    requested: impl IntoIterator<Item = &'a CStr>,
    supported: &[CString],
) -> bool {
    missing_layers(requested, supported).is_empty()
}

/// Enumerates the instance layers the loader knows about.
pub fn supported_layers(entry: &Entry) -> Result<Vec<CString>, vk::Result> {
    let properties = entry.enumerate_instance_layer_properties()?;
    log::info!("[vk] {} layers supported", properties.len());
    Ok(properties
        .iter()
        .map(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) }.to_owned();
            log::debug!("\t{}", name.to_string_lossy());
            name
        })
        .collect())
}

/// Filters and sink of a debug messenger.
///
/// The same configuration is used twice: chained into instance creation, so
/// that messages emitted while the instance is created are observed, and for
/// the standalone messenger that lives as long as the instance.
#[derive(Debug, Copy, Clone)]
pub struct MessengerConfig {
    /// Which severities are forwarded.
    pub severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    /// Which message categories are forwarded.
    pub message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    /// Where messages are sent.
    pub messenger: DebugMessenger,
}

impl MessengerConfig {
    /// Returns `None` if the messenger is disabled.
    pub fn create_info(&self) -> Option<vk::DebugUtilsMessengerCreateInfoEXT> {
        let info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(self.severity)
            .message_type(self.message_type);
        let info = match self.messenger {
            DebugMessenger::Default => info.pfn_user_callback(Some(default_debug_callback)),
            DebugMessenger::Custom {
                callback,
                user_data_pointer,
            } => info.pfn_user_callback(callback).user_data(user_data_pointer),
            DebugMessenger::Disable => return None,
        };

        Some(info.build())
    }
}

/// An installed debug messenger together with the loader needed to destroy it.
#[derive(Clone)]
pub struct DiagnosticsChannel {
    loader: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DiagnosticsChannel {
    /// The messenger handle.
    #[inline]
    pub fn messenger(&self) -> vk::DebugUtilsMessengerEXT {
        self.messenger
    }

    /// The debug utils function table, e.g. for naming objects.
    #[inline]
    pub fn loader(&self) -> &DebugUtils {
        &self.loader
    }

    /// Destroys the messenger. Must happen before the instance is destroyed.
    pub unsafe fn destroy(&self) {
        self.loader
            .destroy_debug_utils_messenger(self.messenger, None);
    }
}

/// Outcome of installing the debug messenger.
#[derive(Clone)]
pub enum Diagnostics {
    /// A messenger is installed.
    Active(DiagnosticsChannel),
    /// The messenger was requested, but the driver does not expose its entry
    /// points (or the debug utils extension could not be enabled).
    Unavailable,
    /// The messenger was not requested.
    Disabled,
}

impl Diagnostics {
    /// Returns the installed channel, if any.
    #[inline]
    pub fn channel(&self) -> Option<&DiagnosticsChannel> {
        match self {
            Diagnostics::Active(channel) => Some(channel),
            _ => None,
        }
    }

    /// True if a messenger is installed.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, Diagnostics::Active(_))
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostics::Active(channel) => f
                .debug_tuple("Active")
                .field(&channel.messenger)
                .finish(),
            Diagnostics::Unavailable => f.write_str("Unavailable"),
            Diagnostics::Disabled => f.write_str("Disabled"),
        }
    }
}

/// What happens to the standalone debug messenger once the instance exists.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessengerInstall {
    /// Every prerequisite holds; the messenger is created.
    Create,
    /// The messenger was requested but cannot be created.
    Unavailable,
    /// The messenger was not requested.
    Disabled,
}

/// Decide whether the messenger can be created.
///
/// `resolve` reports whether an instance-level entry point is exposed by the
/// driver. A missing extension or entry point never fails the bring-up.
pub fn plan_messenger(
    requested: bool,
    extension_enabled: bool,
    resolve: impl Fn(&CStr) -> bool,
) -> MessengerInstall {
    if !requested {
        return MessengerInstall::Disabled;
    }

    if !extension_enabled {
        log::warn!("debug utils extension unavailable, continuing without diagnostics");
        return MessengerInstall::Unavailable;
    }

    if !resolve(cstr!("vkCreateDebugUtilsMessengerEXT"))
        || !resolve(cstr!("vkDestroyDebugUtilsMessengerEXT"))
    {
        log::warn!("debug messenger entry points are unavailable, continuing without diagnostics");
        return MessengerInstall::Unavailable;
    }

    MessengerInstall::Create
}

/// Installs the standalone debug messenger on `instance`.
///
/// `create_info` is `None` if the messenger is disabled. The create and
/// destroy entry points are looked up at runtime; see [`plan_messenger`] for
/// when this returns [`Diagnostics::Unavailable`] instead of failing.
pub unsafe fn install_messenger(
    entry: &Entry,
    instance: &Instance,
    create_info: Option<&vk::DebugUtilsMessengerCreateInfoEXT>,
    extension_enabled: bool,
) -> Result<Diagnostics, vk::Result> {
    let resolve = |name: &CStr| {
        entry
            .get_instance_proc_addr(instance.handle(), name.as_ptr())
            .is_some()
    };

    match (
        plan_messenger(create_info.is_some(), extension_enabled, resolve),
        create_info,
    ) {
        (MessengerInstall::Create, Some(create_info)) => {
            let loader = DebugUtils::new(entry, instance);
            let messenger = loader.create_debug_utils_messenger(create_info, None)?;
            Ok(Diagnostics::Active(DiagnosticsChannel { loader, messenger }))
        }
        (MessengerInstall::Unavailable, _) => Ok(Diagnostics::Unavailable),
        _ => Ok(Diagnostics::Disabled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(names: &[&str]) -> Vec<CString> {
        names.iter().map(|n| CString::new(*n).unwrap()).collect()
    }

    #[test]
    fn all_requested_layers_present() {
        let supported = names(&["VK_LAYER_KHRONOS_validation", "VK_LAYER_LUNARG_monitor"]);
        assert!(layers_supported(
            [khronos_validation_layer()],
            &supported
        ));
    }

    #[test]
    fn missing_layer_is_reported() {
        let supported = names(&["VK_LAYER_LUNARG_monitor"]);
        let missing = missing_layers([khronos_validation_layer()], &supported);
        assert_eq!(missing.as_slice(), &[khronos_validation_layer().to_owned()]);
        assert!(!layers_supported([khronos_validation_layer()], &supported));
    }

    #[test]
    fn adding_a_supported_layer_keeps_the_check_true() {
        let supported = names(&["VK_LAYER_KHRONOS_validation", "VK_LAYER_LUNARG_monitor"]);
        let monitor = cstr!("VK_LAYER_LUNARG_monitor");
        let unknown = cstr!("VK_LAYER_does_not_exist");

        assert!(layers_supported([khronos_validation_layer()], &supported));
        assert!(layers_supported(
            [khronos_validation_layer(), monitor],
            &supported
        ));
        assert!(!layers_supported(
            [khronos_validation_layer(), monitor, unknown],
            &supported
        ));
    }

    #[test]
    fn nothing_supported() {
        assert!(!layers_supported([khronos_validation_layer()], &[]));
    }

    #[test]
    fn severity_maps_to_log_level() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        assert_eq!(severity_level(S::ERROR), log::Level::Error);
        assert_eq!(severity_level(S::WARNING), log::Level::Warn);
        assert_eq!(severity_level(S::INFO), log::Level::Info);
        assert_eq!(severity_level(S::VERBOSE), log::Level::Debug);
    }

    #[test]
    fn callback_never_aborts() {
        let message = cstr!("vkCreateDevice: something went wrong");
        let data = vk::DebugUtilsMessengerCallbackDataEXT::builder().message(message);
        let result = unsafe {
            default_debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &*data,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, vk::FALSE);

        let result = unsafe {
            default_debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                std::ptr::null(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, vk::FALSE);
    }

    fn resolves_all(_: &CStr) -> bool {
        true
    }

    #[test]
    fn messenger_created_when_everything_resolves() {
        assert_eq!(
            plan_messenger(true, true, resolves_all),
            MessengerInstall::Create
        );
    }

    #[test]
    fn messenger_disabled_skips_lookup() {
        let plan = plan_messenger(false, true, |_: &CStr| -> bool {
            panic!("entry points must not be looked up")
        });
        assert_eq!(plan, MessengerInstall::Disabled);
        assert_eq!(
            plan_messenger(false, false, resolves_all),
            MessengerInstall::Disabled
        );
    }

    #[test]
    fn missing_extension_degrades_to_unavailable() {
        assert_eq!(
            plan_messenger(true, false, resolves_all),
            MessengerInstall::Unavailable
        );
    }

    #[test]
    fn missing_create_entry_point_degrades_to_unavailable() {
        let plan = plan_messenger(true, true, |name: &CStr| {
            name != cstr!("vkCreateDebugUtilsMessengerEXT")
        });
        assert_eq!(plan, MessengerInstall::Unavailable);
    }

    #[test]
    fn missing_destroy_entry_point_degrades_to_unavailable() {
        let plan = plan_messenger(true, true, |name: &CStr| {
            name != cstr!("vkDestroyDebugUtilsMessengerEXT")
        });
        assert_eq!(plan, MessengerInstall::Unavailable);
    }

    #[test]
    fn disabled_messenger_has_no_create_info() {
        let config = MessengerConfig {
            severity: vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            messenger: DebugMessenger::Disable,
        };
        assert!(config.create_info().is_none());

        let config = MessengerConfig {
            messenger: DebugMessenger::Default,
            ..config
        };
        let info = config.create_info().unwrap();
        assert_eq!(info.message_severity, vk::DebugUtilsMessageSeverityFlagsEXT::ERROR);
        assert!(info.pfn_user_callback.is_some());
    }
}
