// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;
use tri_render::{FrameOutcome, RenderSize, Renderer};

pub mod commands;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod negotiate;
pub mod pipeline;
pub mod queue;
pub mod render_pass;
mod renderer;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use config::{PresentModePreference, VkConfig};
pub use error::{CapabilityKind, RenderError, RenderResult};
pub use frame::{FrameBackend, FrameExecutor};
pub use pipeline::GeometryMode;

use renderer::RenderState;
use surface::WindowTarget;

pub struct VkRenderer {
    state: RenderState,
    executor: FrameExecutor,
    paused: bool,
}

impl VkRenderer {
    pub fn with_config(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        cfg: VkConfig,
    ) -> Result<Self> {
        let target = WindowTarget::from_handles(window, display)?;
        let executor = FrameExecutor::new(cfg.frames_in_flight());
        let state = unsafe { RenderState::create(&target, size, cfg) }
            .context("Vulkan renderer initialization")?;
        Ok(Self {
            state,
            executor,
            paused: size.is_empty(),
        })
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self> {
        Self::with_config(window, display, size, VkConfig::default())
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        self.state.set_window_size(size);
        if size.is_empty() {
            if !self.paused {
                info!("vk: resize to 0x0 → paused");
            }
            self.paused = true;
            return Ok(());
        }
        if self.paused {
            info!("vk: resize to {}x{} → resumed", size.width, size.height);
        }
        self.paused = false;
        self.executor.request_recreate();
        Ok(())
    }

    // STRICT PER-FRAME ORDER lives in FrameExecutor::draw_frame.
    fn render(&mut self) -> Result<FrameOutcome> {
        if !self.state.is_alive() {
            return Ok(FrameOutcome::Skipped);
        }
        Ok(self.executor.render(&mut self.state, self.paused)?)
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.state.set_clear_color(rgba);
    }

    fn shutdown(&mut self) {
        unsafe { self.state.shutdown() }
    }
}
