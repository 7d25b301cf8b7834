use ash::extensions::khr::Swapchain;
use ash::vk::{self, Handle};
use ash_bringup::{
    find_queue_families, queue_setups, select_physical_device, BootstrapConfig, DeviceRanking,
    DeviceSelectionError, LastSuitable, PhysicalDeviceCandidate, SwapchainSupport,
    PREFERRED_SURFACE_FORMAT,
};
use std::convert::Infallible;

fn window_surface_support() -> SwapchainSupport {
    SwapchainSupport {
        capabilities: vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        },
        formats: vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            PREFERRED_SURFACE_FORMAT,
        ],
        present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
    }
}

fn gpu(raw: u64, name: &str, device_type: vk::PhysicalDeviceType) -> PhysicalDeviceCandidate {
    PhysicalDeviceCandidate::new(vk::PhysicalDevice::from_raw(raw), name, device_type)
        .with_features(vk::PhysicalDeviceFeatures {
            geometry_shader: vk::TRUE,
            ..Default::default()
        })
        .with_extensions([Swapchain::name().to_owned()])
        .with_swapchain_support(window_surface_support())
}

#[test]
fn negotiates_a_complete_configuration() {
    let config = BootstrapConfig::new().diagnostics(false);
    let candidates = [
        gpu(1, "llvmpipe", vk::PhysicalDeviceType::CPU),
        gpu(2, "discrete", vk::PhysicalDeviceType::DISCRETE_GPU),
        gpu(3, "integrated", vk::PhysicalDeviceType::INTEGRATED_GPU),
    ];

    let chosen = select_physical_device(
        &candidates,
        &config.device_requirements,
        &config.device_extensions,
        &LastSuitable,
    )
    .unwrap();
    assert_eq!(chosen.name(), "discrete");

    let families = [vk::QueueFamilyProperties {
        queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
        queue_count: 16,
        ..Default::default()
    }];
    let queue_families = find_queue_families(&families, |_| Ok::<_, Infallible>(true))
        .unwrap()
        .resolved()
        .unwrap();
    assert_eq!(queue_setups(&queue_families).len(), 1);

    let swapchain = chosen
        .swapchain_support()
        .negotiate(|| vk::Extent2D {
            width: 8000,
            height: 8000,
        })
        .unwrap();
    assert_eq!(swapchain.format, vk::Format::B8G8R8A8_SRGB);
    assert_eq!(swapchain.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    assert_eq!(swapchain.present_mode, vk::PresentModeKHR::MAILBOX);
    assert_eq!(
        swapchain.extent,
        vk::Extent2D {
            width: 4096,
            height: 4096
        }
    );
    assert_eq!(swapchain.image_count, 3);
}

#[test]
fn custom_ranking_plugs_in() {
    struct PreferName(&'static str);

    impl DeviceRanking for PreferName {
        fn score(&self, candidate: &PhysicalDeviceCandidate) -> u64 {
            (candidate.name() == self.0) as u64
        }
    }

    let config = BootstrapConfig::new();
    let candidates = [
        gpu(1, "first", vk::PhysicalDeviceType::DISCRETE_GPU),
        gpu(2, "second", vk::PhysicalDeviceType::DISCRETE_GPU),
    ];

    let chosen = select_physical_device(
        &candidates,
        &config.device_requirements,
        &config.device_extensions,
        &PreferName("first"),
    )
    .unwrap();
    assert_eq!(chosen.name(), "first");
}

#[test]
fn nothing_suitable_is_an_error() {
    let config = BootstrapConfig::new();
    let candidates = [gpu(1, "integrated", vk::PhysicalDeviceType::INTEGRATED_GPU)];

    let err = select_physical_device(
        &candidates,
        &config.device_requirements,
        &config.device_extensions,
        &LastSuitable,
    )
    .unwrap_err();
    assert!(matches!(err, DeviceSelectionError::RequirementsNotMet));
}
