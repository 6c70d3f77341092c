// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use tracing::{debug, info};
use tri_render::RenderSize;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowId};

use crate::event::{EventQueue, PlatformEvent};

/// Capabilities the application needs from a native window. Surface creation
/// goes through the raw handles, so any implementor is presentable.
pub trait PlatformWindow: HasWindowHandle + HasDisplayHandle {
    fn is_open(&self) -> bool;
    /// Current drawable size in physical pixels.
    fn size(&self) -> RenderSize;
    fn set_size(&mut self, size: RenderSize);
    /// Drains everything queued since the last call, oldest first.
    fn poll_events(&mut self) -> Vec<PlatformEvent>;
}

#[derive(Clone, Debug)]
pub struct WindowSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: "Triangle".to_owned(),
            width: 1280,
            height: 720,
            resizable: true,
        }
    }
}

pub struct WinitWindow {
    window: Window,
    events: EventQueue,
}

impl WinitWindow {
    pub fn create(event_loop: &ActiveEventLoop, settings: &WindowSettings) -> Result<Self> {
        let attrs = Window::default_attributes()
            .with_title(settings.title.clone())
            .with_inner_size(LogicalSize::new(settings.width, settings.height))
            .with_resizable(settings.resizable);
        let window = event_loop
            .create_window(attrs)
            .context("create_window")?;

        let size = window.inner_size();
        info!("window created ({}x{})", size.width, size.height);

        Ok(Self {
            window,
            events: EventQueue::default(),
        })
    }

    pub fn id(&self) -> WindowId {
        self.window.id()
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Feeds one winit event into the queue drained by [`PlatformWindow::poll_events`].
    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        if let Some(ev) = self.events.push_window_event(event) {
            debug!("platform event {:?}", ev);
        }
    }
}

impl PlatformWindow for WinitWindow {
    fn is_open(&self) -> bool {
        self.events.is_open()
    }

    fn size(&self) -> RenderSize {
        let size = self.window.inner_size();
        RenderSize::new(size.width, size.height)
    }

    fn set_size(&mut self, size: RenderSize) {
        // Some platforms apply the size synchronously and return it; others
        // report it later through a Resized event.
        let applied = self
            .window
            .request_inner_size(PhysicalSize::new(size.width, size.height));
        self.events
            .push_applied_size(applied.map(|s| RenderSize::new(s.width, s.height)));
    }

    fn poll_events(&mut self) -> Vec<PlatformEvent> {
        self.events.drain()
    }
}

impl HasWindowHandle for WinitWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl HasDisplayHandle for WinitWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}
