//! The full bring-up sequence.
//!
//! Instance, then messenger and surface, then physical device, queue
//! families, swapchain configuration, logical device and queues. Every handle
//! is registered with a [`TeardownStack`] as soon as it exists, so both a
//! failing step and dropping the [`Bootstrap`] release everything in reverse.
use crate::{
    create_logical_device, create_swapchain, enumerate_candidates, resolve_queue_families,
    select_physical_device, BootstrapConfig, DeviceCreationError, DeviceMetadata, DeviceRanking,
    DeviceSelectionError, Diagnostics, InstanceBuilder, InstanceCreationError, InstanceMetadata,
    PhysicalDeviceCandidate, QueueFamilies, QueueFamilyError, Queues, SurfaceError,
    SurfaceHandle, SurfaceProvider, SwapchainConfig, SwapchainError, SwapchainHandle,
    TeardownStack,
};
use ash::{Device, Entry, Instance, LoadingError};
use thiserror::Error;

/// Broad classes of bring-up failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// A required layer, extension, feature or surface capability is missing.
    CapabilityAbsent,
    /// The driver returned an empty list where at least one entry is needed.
    EnumerationEmpty,
    /// No queue family satisfies the graphics or presentation requirement.
    ResolutionIncomplete,
    /// A driver call returned a non-success status.
    DriverCallFailure,
}

/// Errors that can occur during the bring-up sequence.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The Vulkan library could not be loaded.
    #[error("failed to load the vulkan library: {0}")]
    Loading(#[from] LoadingError),
    /// Instance creation failed.
    #[error("instance creation failed: {0}")]
    Instance(#[from] InstanceCreationError),
    /// The windowing layer failed.
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    /// No usable physical device.
    #[error("physical device selection failed: {0}")]
    DeviceSelection(#[from] DeviceSelectionError),
    /// Queue families could not be resolved.
    #[error("queue family resolution failed: {0}")]
    QueueFamily(#[from] QueueFamilyError),
    /// Swapchain negotiation or creation failed.
    #[error("swapchain setup failed: {0}")]
    Swapchain(#[from] SwapchainError),
    /// Logical device creation failed.
    #[error("device creation failed: {0}")]
    Device(#[from] DeviceCreationError),
}

impl BootstrapError {
    /// Which class of failure this is.
    pub fn kind(&self) -> FailureKind {
        use FailureKind::*;

        match self {
            BootstrapError::Loading(_) => DriverCallFailure,
            BootstrapError::Instance(err) => match err {
                InstanceCreationError::VulkanError(_) => DriverCallFailure,
                InstanceCreationError::LayersNotPresent(_)
                | InstanceCreationError::ExtensionsNotPresent(_) => CapabilityAbsent,
            },
            BootstrapError::Surface(err) => match err {
                SurfaceError::RequiredExtensions(_) => CapabilityAbsent,
                SurfaceError::Creation(_) => DriverCallFailure,
            },
            BootstrapError::DeviceSelection(err) => match err {
                DeviceSelectionError::VulkanError(_) => DriverCallFailure,
                DeviceSelectionError::NoPhysicalDevices => EnumerationEmpty,
                DeviceSelectionError::RequirementsNotMet => CapabilityAbsent,
            },
            BootstrapError::QueueFamily(err) => match err {
                QueueFamilyError::VulkanError(_) => DriverCallFailure,
                QueueFamilyError::Unresolved(_) => ResolutionIncomplete,
            },
            BootstrapError::Swapchain(err) => match err {
                SwapchainError::VulkanError(_) => DriverCallFailure,
                SwapchainError::NoSurfaceFormats | SwapchainError::NoPresentModes => {
                    EnumerationEmpty
                }
            },
            BootstrapError::Device(DeviceCreationError::VulkanError(_)) => DriverCallFailure,
        }
    }
}

/// Handles the bring-up sequence acquires, in acquisition order. They are
/// released in the opposite order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// The instance.
    Instance,
    /// The standalone debug messenger, if installed.
    DebugMessenger,
    /// The presentation surface.
    Surface,
    /// The logical device.
    Device,
    /// The swapchain, once created.
    Swapchain,
}

impl Stage {
    /// Every stage, in acquisition order.
    pub const ALL: [Stage; 5] = [
        Stage::Instance,
        Stage::DebugMessenger,
        Stage::Surface,
        Stage::Device,
        Stage::Swapchain,
    ];

    /// Label the stage is registered under in the [`TeardownStack`].
    pub fn label(self) -> &'static str {
        match self {
            Stage::Instance => "instance",
            Stage::DebugMessenger => "debug messenger",
            Stage::Surface => "surface",
            Stage::Device => "device",
            Stage::Swapchain => "swapchain",
        }
    }

    fn from_label(label: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| stage.label() == label)
    }
}

/// Returns the first stage acquired before a stage it depends on.
pub fn out_of_order(acquired: impl IntoIterator<Item = Stage>) -> Option<Stage> {
    let mut previous: Option<Stage> = None;
    for stage in acquired {
        if previous.map_or(false, |previous| stage <= previous) {
            return Some(stage);
        }
        previous = Some(stage);
    }

    None
}

fn register(teardown: &mut TeardownStack, stage: Stage, release: impl FnOnce() + 'static) {
    teardown.push(stage.label(), release);
}

fn stages(teardown: &TeardownStack) -> impl Iterator<Item = Stage> + '_ {
    teardown.labels().filter_map(Stage::from_label)
}

/// Everything the bring-up sequence acquired.
///
/// Dropping it destroys the swapchain (if created), the device, the surface,
/// the debug messenger and the instance, in that order.
pub struct Bootstrap {
    // Declared first so it drops before `entry` unloads the library.
    teardown: TeardownStack,
    instance: Instance,
    instance_metadata: InstanceMetadata,
    diagnostics: Diagnostics,
    surface: SurfaceHandle,
    physical_device: PhysicalDeviceCandidate,
    queue_families: QueueFamilies,
    swapchain_config: SwapchainConfig,
    device: Device,
    queues: Queues,
    device_metadata: DeviceMetadata,
    swapchain: Option<SwapchainHandle>,
    entry: Entry,
}

impl Bootstrap {
    /// Load the Vulkan library and run the bring-up sequence.
    pub fn load(
        config: &BootstrapConfig,
        provider: &impl SurfaceProvider,
        ranking: &dyn DeviceRanking,
    ) -> Result<Self, BootstrapError> {
        let entry = unsafe { Entry::load() }?;
        Bootstrap::run(entry, config, provider, ranking)
    }

    /// Run the bring-up sequence on an already loaded `entry`.
    pub fn run(
        entry: Entry,
        config: &BootstrapConfig,
        provider: &impl SurfaceProvider,
        ranking: &dyn DeviceRanking,
    ) -> Result<Self, BootstrapError> {
        let mut teardown = TeardownStack::new();

        let instance_builder =
            InstanceBuilder::from_config(config).require_surface_extensions(provider)?;
        let (instance, diagnostics, instance_metadata) = unsafe { instance_builder.build(&entry) }?;
        {
            let instance = instance.clone();
            register(&mut teardown, Stage::Instance, move || unsafe {
                instance.destroy_instance(None)
            });
        }
        if let Some(channel) = diagnostics.channel() {
            let channel = channel.clone();
            register(&mut teardown, Stage::DebugMessenger, move || unsafe {
                channel.destroy()
            });
        }

        let surface = unsafe { SurfaceHandle::create(&entry, &instance, provider) }?;
        {
            let surface = surface.clone();
            register(&mut teardown, Stage::Surface, move || unsafe { surface.destroy() });
        }

        let candidates = unsafe { enumerate_candidates(&instance, &surface) }?;
        let physical_device = select_physical_device(
            &candidates,
            &config.device_requirements,
            &config.device_extensions,
            ranking,
        )?
        .clone();

        let queue_families =
            unsafe { resolve_queue_families(&instance, physical_device.handle(), &surface) }?;

        let swapchain_config = physical_device
            .swapchain_support()
            .negotiate(|| provider.framebuffer_extent())?;

        let (device, queues, device_metadata) = unsafe {
            create_logical_device(
                &instance,
                &instance_metadata,
                &physical_device,
                queue_families,
                &config.device_extensions,
            )
        }?;
        {
            let device = device.clone();
            register(&mut teardown, Stage::Device, move || unsafe {
                if let Err(err) = device.device_wait_idle() {
                    log::warn!("device_wait_idle failed during teardown: {err}");
                }
                device.destroy_device(None);
            });
        }

        if let Some(stage) = out_of_order(stages(&teardown)) {
            log::error!("{} acquired out of order", stage.label());
        }

        Ok(Bootstrap {
            teardown,
            instance,
            instance_metadata,
            diagnostics,
            surface,
            physical_device,
            queue_families,
            swapchain_config,
            device,
            queues,
            device_metadata,
            swapchain: None,
            entry,
        })
    }

    /// Create the swapchain from the negotiated configuration. Later calls
    /// return the existing swapchain.
    pub fn create_swapchain(&mut self) -> Result<&SwapchainHandle, BootstrapError> {
        let swapchain = match self.swapchain.take() {
            Some(swapchain) => swapchain,
            None => {
                let swapchain = unsafe {
                    create_swapchain(
                        &self.instance,
                        &self.device,
                        &self.surface,
                        &self.queue_families,
                        &self.swapchain_config,
                    )
                }?;
                let release = swapchain.clone();
                register(&mut self.teardown, Stage::Swapchain, move || unsafe {
                    release.destroy()
                });
                swapchain
            }
        };

        Ok(self.swapchain.insert(swapchain))
    }

    /// The loaded Vulkan library.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// The instance.
    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// What is enabled on the instance.
    #[inline]
    pub fn instance_metadata(&self) -> &InstanceMetadata {
        &self.instance_metadata
    }

    /// Whether a debug messenger is installed.
    #[inline]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// The presentation surface.
    #[inline]
    pub fn surface(&self) -> &SurfaceHandle {
        &self.surface
    }

    /// The chosen physical device.
    #[inline]
    pub fn physical_device(&self) -> &PhysicalDeviceCandidate {
        &self.physical_device
    }

    /// The resolved graphics and present families.
    #[inline]
    pub fn queue_families(&self) -> QueueFamilies {
        self.queue_families
    }

    /// The negotiated swapchain configuration.
    #[inline]
    pub fn swapchain_config(&self) -> &SwapchainConfig {
        &self.swapchain_config
    }

    /// The logical device.
    #[inline]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The graphics and present queues.
    #[inline]
    pub fn queues(&self) -> Queues {
        self.queues
    }

    /// What is enabled on the device.
    #[inline]
    pub fn device_metadata(&self) -> &DeviceMetadata {
        &self.device_metadata
    }

    /// The swapchain, if [`create_swapchain`](Self::create_swapchain) was
    /// called.
    #[inline]
    pub fn swapchain(&self) -> Option<&SwapchainHandle> {
        self.swapchain.as_ref()
    }

    /// Handles that will be released, oldest first.
    pub fn acquired(&self) -> impl Iterator<Item = Stage> + '_ {
        stages(&self.teardown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn failure_kinds() {
        let cases: Vec<(BootstrapError, FailureKind)> = vec![
            (
                DeviceSelectionError::NoPhysicalDevices.into(),
                FailureKind::EnumerationEmpty,
            ),
            (
                DeviceSelectionError::RequirementsNotMet.into(),
                FailureKind::CapabilityAbsent,
            ),
            (
                InstanceCreationError::LayersNotPresent(
                    std::iter::once(CString::new("VK_LAYER_KHRONOS_validation").unwrap())
                        .collect(),
                )
                .into(),
                FailureKind::CapabilityAbsent,
            ),
            (
                QueueFamilyError::Unresolved("presentation").into(),
                FailureKind::ResolutionIncomplete,
            ),
            (
                SwapchainError::NoPresentModes.into(),
                FailureKind::EnumerationEmpty,
            ),
            (
                DeviceCreationError::VulkanError(ash::vk::Result::ERROR_DEVICE_LOST).into(),
                FailureKind::DriverCallFailure,
            ),
            (
                SurfaceError::Creation(ash::vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR).into(),
                FailureKind::DriverCallFailure,
            ),
        ];

        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn acquisition_order_is_checked() {
        assert_eq!(out_of_order(Stage::ALL), None);
        assert_eq!(
            out_of_order([Stage::Instance, Stage::Surface, Stage::Device]),
            None
        );
        assert_eq!(
            out_of_order([Stage::Instance, Stage::Device, Stage::Surface]),
            Some(Stage::Surface)
        );
        assert_eq!(
            out_of_order([Stage::Surface, Stage::Surface]),
            Some(Stage::Surface)
        );
    }

    #[test]
    fn stages_release_in_reverse() {
        use std::{cell::RefCell, rc::Rc};

        let released = Rc::new(RefCell::new(Vec::new()));
        let mut teardown = TeardownStack::new();
        for stage in Stage::ALL {
            let released = Rc::clone(&released);
            register(&mut teardown, stage, move || released.borrow_mut().push(stage));
        }
        assert_eq!(stages(&teardown).collect::<Vec<_>>(), Stage::ALL.to_vec());
        assert_eq!(
            teardown.labels().collect::<Vec<_>>(),
            vec!["instance", "debug messenger", "surface", "device", "swapchain"]
        );

        drop(teardown);
        let mut expected = Stage::ALL.to_vec();
        expected.reverse();
        assert_eq!(*released.borrow(), expected);
    }

    #[test]
    fn error_messages_name_the_stage() {
        let err = BootstrapError::from(QueueFamilyError::Unresolved("graphics"));
        assert_eq!(
            err.to_string(),
            "queue family resolution failed: no queue family supports graphics"
        );
    }
}
