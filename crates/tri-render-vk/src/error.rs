// SPDX-License-Identifier: CEPL-1.0
use std::fmt;

use ash::prelude::VkResult;
use ash::vk;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapabilityKind {
    Layer,
    InstanceExtension,
    DeviceExtension,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CapabilityKind::Layer => "layer",
            CapabilityKind::InstanceExtension => "instance extension",
            CapabilityKind::DeviceExtension => "device extension",
        })
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Vulkan loader unavailable: {0}")]
    Loader(#[from] ash::LoadingError),

    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    #[error("required {kind} `{name}` is not available")]
    MissingCapability { kind: CapabilityKind, name: String },

    #[error("no suitable physical device found")]
    NoSuitableDevice,

    #[error("failed to create window surface: {0}")]
    SurfaceCreationFailed(vk::Result),

    #[error("surface exposes no supported (format, color space) pair")]
    NoSurfaceFormat,

    #[error("invalid shader blob: {0}")]
    InvalidShader(String),

    #[error("graphics pipeline creation failed: {0}")]
    PipelineCreationFailed(vk::Result),

    #[error("no memory type satisfies {0:?}")]
    NoMemoryType(vk::MemoryPropertyFlags),

    #[error("{op} returned unexpected result {result}")]
    UnexpectedResult { op: &'static str, result: vk::Result },

    #[error("{op} failed: {result}")]
    Vulkan { op: &'static str, result: vk::Result },
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Tags a raw Vulkan result with the call that produced it.
pub(crate) trait VkResultExt<T> {
    fn vk_op(self, op: &'static str) -> RenderResult<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn vk_op(self, op: &'static str) -> RenderResult<T> {
        self.map_err(|result| RenderError::Vulkan { op, result })
    }
}
