// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CStr;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};

use crate::error::{RenderError, RenderResult, VkResultExt};

/// Raw handles of the window being rendered into, captured once so the
/// instance and the surface are built for the same display connection.
#[derive(Clone, Copy, Debug)]
pub struct WindowTarget {
    display: RawDisplayHandle,
    window: RawWindowHandle,
}

impl WindowTarget {
    pub fn from_handles(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
    ) -> RenderResult<Self> {
        Ok(Self {
            display: display.display_handle()?.as_raw(),
            window: window.window_handle()?.as_raw(),
        })
    }

    /// Instance extensions the platform needs before a surface can exist.
    pub fn required_extensions(&self) -> RenderResult<Vec<&'static CStr>> {
        let raw = ash_window::enumerate_required_extensions(self.display)
            .vk_op("enumerate_required_extensions")?;
        // SAFETY: ash-window hands back pointers to static NUL-terminated names.
        Ok(raw.iter().map(|&p| unsafe { CStr::from_ptr(p) }).collect())
    }

    /// The caller owns the surface and must destroy it before the instance.
    pub unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> RenderResult<vk::SurfaceKHR> {
        ash_window::create_surface(entry, instance, self.display, self.window, None)
            .map_err(RenderError::SurfaceCreationFailed)
    }
}
