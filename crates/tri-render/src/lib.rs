// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports 0 in either dimension.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What a frame attempt ended up doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Image acquired, submitted and queued for presentation.
    Presented,
    /// The swapchain was stale on acquire; it was rebuilt and the frame dropped.
    SwapchainRecreated,
    /// Nothing to draw into (minimized or paused).
    Skipped,
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self>
    where
        Self: Sized;

    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self) -> Result<FrameOutcome>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);

    /// Blocks until the GPU is idle and releases every GPU object.
    /// Safe to call more than once.
    fn shutdown(&mut self);
}
