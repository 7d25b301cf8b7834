//! Presentation surfaces.
use crate::BootstrapSmallVec;
use ash::extensions::khr::Surface;
use ash::{vk, Entry, Instance};
use std::ffi::CStr;
use thiserror::Error;

#[cfg(feature = "surface")]
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

/// Errors that can occur while talking to the windowing layer.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The windowing layer could not name the instance extensions it needs.
    #[error("could not enumerate required surface extensions: {0}")]
    RequiredExtensions(vk::Result),
    /// Surface creation failed.
    #[error("surface creation failed: {0}")]
    Creation(vk::Result),
}

/// What the bring-up sequence needs from the windowing layer. Windows are
/// created and owned elsewhere.
pub trait SurfaceProvider {
    /// Instance extensions the windowing layer needs enabled.
    fn required_extensions(&self) -> Result<BootstrapSmallVec<&'static CStr>, SurfaceError>;

    /// Create a surface bound to one native window.
    ///
    /// # Safety
    ///
    /// `instance` must have been created from `entry` with every extension
    /// returned by [`required_extensions`](Self::required_extensions) enabled,
    /// and the window must outlive the surface.
    unsafe fn create_surface(
        &self,
        entry: &Entry,
        instance: &Instance,
    ) -> Result<vk::SurfaceKHR, SurfaceError>;

    /// Current framebuffer size in pixels.
    fn framebuffer_extent(&self) -> vk::Extent2D;
}

/// [`SurfaceProvider`] for anything exposing raw window and display handles,
/// e.g. a `winit` window.
#[cfg(feature = "surface")]
pub struct WindowSurface<'a, W> {
    window: &'a W,
    framebuffer_extent: Box<dyn Fn() -> vk::Extent2D + 'a>,
}

#[cfg(feature = "surface")]
impl<'a, W> WindowSurface<'a, W>
where
    W: HasRawDisplayHandle + HasRawWindowHandle,
{
    /// Raw window handles carry no size, so the framebuffer size is asked of
    /// `framebuffer_extent`.
    pub fn new(window: &'a W, framebuffer_extent: impl Fn() -> vk::Extent2D + 'a) -> Self {
        WindowSurface {
            window,
            framebuffer_extent: Box::new(framebuffer_extent),
        }
    }
}

#[cfg(feature = "surface")]
impl<'a, W> SurfaceProvider for WindowSurface<'a, W>
where
    W: HasRawDisplayHandle + HasRawWindowHandle,
{
    fn required_extensions(&self) -> Result<BootstrapSmallVec<&'static CStr>, SurfaceError> {
        let names = ash_window::enumerate_required_extensions(self.window.raw_display_handle())
            .map_err(SurfaceError::RequiredExtensions)?;
        Ok(names
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect())
    }

    unsafe fn create_surface(
        &self,
        entry: &Entry,
        instance: &Instance,
    ) -> Result<vk::SurfaceKHR, SurfaceError> {
        ash_window::create_surface(
            entry,
            instance,
            self.window.raw_display_handle(),
            self.window.raw_window_handle(),
            None,
        )
        .map_err(SurfaceError::Creation)
    }

    fn framebuffer_extent(&self) -> vk::Extent2D {
        (self.framebuffer_extent)()
    }
}

/// A created surface together with the loader needed to query and destroy it.
#[derive(Clone)]
pub struct SurfaceHandle {
    loader: Surface,
    handle: vk::SurfaceKHR,
}

impl SurfaceHandle {
    /// Create a surface through `provider`.
    pub unsafe fn create(
        entry: &Entry,
        instance: &Instance,
        provider: &impl SurfaceProvider,
    ) -> Result<Self, SurfaceError> {
        let handle = provider.create_surface(entry, instance)?;
        Ok(SurfaceHandle {
            loader: Surface::new(entry, instance),
            handle,
        })
    }

    /// The surface handle.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// The `VK_KHR_surface` function table.
    #[inline]
    pub fn loader(&self) -> &Surface {
        &self.loader
    }

    /// Destroys the surface. Must happen before the instance is destroyed.
    pub unsafe fn destroy(&self) {
        self.loader.destroy_surface(self.handle, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InstanceBuilder;
    use cstr::cstr;

    struct Headless;

    impl SurfaceProvider for Headless {
        fn required_extensions(&self) -> Result<BootstrapSmallVec<&'static CStr>, SurfaceError> {
            Ok([cstr!("VK_KHR_surface"), cstr!("VK_EXT_headless_surface")]
                .into_iter()
                .collect())
        }

        unsafe fn create_surface(
            &self,
            _entry: &Entry,
            _instance: &Instance,
        ) -> Result<vk::SurfaceKHR, SurfaceError> {
            Err(SurfaceError::Creation(vk::Result::ERROR_EXTENSION_NOT_PRESENT))
        }

        fn framebuffer_extent(&self) -> vk::Extent2D {
            vk::Extent2D {
                width: 800,
                height: 600,
            }
        }
    }

    #[test]
    fn surface_extensions_become_required() {
        let builder = InstanceBuilder::new()
            .request_debug_messenger(crate::DebugMessenger::Disable)
            .require_surface_extensions(&Headless)
            .unwrap();
        let requested = builder.requested_extensions();
        assert_eq!(requested.len(), 2);
        assert!(requested.iter().all(|(_, required)| *required));
        assert_eq!(requested[1].0.as_c_str(), cstr!("VK_EXT_headless_surface"));
    }
}
