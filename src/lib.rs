#![allow(clippy::missing_safety_doc)]
#![warn(missing_docs)]
/*!
Vulkan bring-up for Rust: negotiates everything between loading the driver and
holding a presentation-capable device on top of [`ash`].

- ✅ Instance creation, with validation layers and a debug messenger chained
  into instance creation
- ✅ Surface creation through a pluggable [`SurfaceProvider`]
- ✅ Physical device selection with a pluggable [`DeviceRanking`]
- ✅ Queue family resolution for graphics and presentation
- ✅ Swapchain format, present mode, extent and image count negotiation
- ✅ Logical device creation and queue retrieval
- ✅ Reverse-order teardown on every exit path

## Cargo Features

- `surface` (enabled by default): Enables the use of [`raw-window-handle`].

## Example

```rust,ignore
let entry = unsafe { ash::Entry::load() }?;
let config = BootstrapConfig::new()
    .app_name("Hello Triangle")?
    .validation_layers(ValidationLayers::Request)
    .debug_messenger(DebugMessenger::Default);
let provider = WindowSurface::new(&window, || {
    let size = window.inner_size();
    vk::Extent2D { width: size.width, height: size.height }
});

let mut bootstrap = Bootstrap::run(entry, &config, &provider, &LastSuitable)?;
let swapchain = bootstrap.create_swapchain()?;
// ... render ...
drop(bootstrap); // swapchain, device, surface, messenger, instance
```

The individual steps ([`InstanceBuilder`], [`select_physical_device`],
[`resolve_queue_families`], [`SwapchainSupport::negotiate`],
[`create_logical_device`]) are public as well, for callers that want to drive
the sequence themselves.

[`raw-window-handle`]: https://crates.io/crates/raw-window-handle
*/

pub mod bootstrap;
pub mod config;
pub mod debug;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod queue_family;
pub mod surface;
pub mod swapchain;
pub mod teardown;

pub use bootstrap::*;
pub use config::*;
pub use debug::*;
pub use device::*;
pub use instance::*;
pub use physical_device::*;
pub use queue_family::*;
pub use surface::*;
pub use swapchain::*;
pub use teardown::*;

type BootstrapSmallVec<T> = smallvec::SmallVec<[T; 8]>;
