// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Result};
use tracing::{error, info};
use tri_core::init_tracing;
use tri_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::WindowId,
};
use tri_platform::{PlatformEvent, PlatformWindow, WinitWindow};
use tri_render::{FrameOutcome, RenderSize, Renderer};
use tri_render_vk::VkRenderer;

mod config;

use config::{AppCfg, CONFIG_FILE};

struct App {
    cfg: AppCfg,
    window: Option<WinitWindow>,
    renderer: Option<VkRenderer>,
    render_size: RenderSize,
    occluded: bool,
    exiting: bool,
    /// First fatal error; ends the event loop and the process with code 1.
    fatal: Option<anyhow::Error>,

    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn new(cfg: AppCfg) -> Self {
        App {
            cfg,
            window: None,
            renderer: None,
            render_size: RenderSize::default(),
            occluded: false,
            exiting: false,
            fatal: None,
            frames: 0,
            last_fps_instant: Instant::now(),
        }
    }

    fn paused(&self) -> bool {
        self.occluded || self.render_size.is_empty()
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = WinitWindow::create(event_loop, &self.cfg.window_settings())?;
        self.render_size = window.size();
        let renderer =
            VkRenderer::with_config(&window, &window, self.render_size, self.cfg.vk_config())?;
        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    /// Waits for the GPU, releases everything, then leaves the loop.
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut r) = self.renderer.take() {
            r.shutdown();
        }
        self.window = None;
        self.exiting = true;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("fatal: {err:#}");
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
        self.shutdown(event_loop);
    }

    fn drain_events(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        let events = window.poll_events();
        let closing = !window.is_open();
        for ev in events {
            match ev {
                // nothing left to resize or redraw once a close is queued
                PlatformEvent::Resized(_) if closing => {}
                PlatformEvent::Resized(size) => {
                    let was_paused = self.paused();
                    self.render_size = size;
                    info!(
                        "Resized → {}x{} (paused={})",
                        size.width,
                        size.height,
                        self.paused()
                    );
                    if let Some(r) = self.renderer.as_mut() {
                        if let Err(e) = r.resize(size) {
                            self.fail(event_loop, e);
                            return;
                        }
                    }
                    if was_paused && !self.paused() {
                        self.frames = 0;
                    }
                }
                PlatformEvent::Visibility(visible) => {
                    self.occluded = !visible;
                    info!("Visible={} → paused={}", visible, self.paused());
                }
                PlatformEvent::Focused(focused) => {
                    info!("Focused({})", focused);
                }
                PlatformEvent::CloseRequested => info!("CloseRequested"),
            }
        }
        if closing {
            self.shutdown(event_loop);
        }
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting || self.paused() {
            return;
        }
        let Some(r) = self.renderer.as_mut() else {
            return;
        };
        match r.render() {
            // count only frames that were actually presented
            Ok(FrameOutcome::Presented) => self.frames = self.frames.saturating_add(1),
            Ok(FrameOutcome::SwapchainRecreated | FrameOutcome::Skipped) => {}
            Err(e) => self.fail(event_loop, e),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() && !self.exiting {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
                return;
            }
            info!("resumed → paused={}", self.paused());
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        if window_id != window.id() {
            return;
        }
        window.handle_window_event(&event);
        self.drain_events(event_loop);

        if matches!(event, WindowEvent::RedrawRequested) {
            self.draw(event_loop);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if self.paused() {
            // minimized or occluded → sleep until the next event
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();

    let mut cfg = AppCfg::load(Path::new(CONFIG_FILE));
    cfg.apply_env(|k| std::env::var(k).ok());

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        // Returning the error prints its chain to stderr and exits with 1.
        Some(e) => Err(e),
        None if app.exiting => Ok(()),
        None => Err(anyhow!("event loop ended before the window was closed")),
    }
}
