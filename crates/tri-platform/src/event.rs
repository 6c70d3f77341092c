// SPDX-License-Identifier: CEPL-1.0
use std::collections::VecDeque;

use tri_render::RenderSize;
use winit::event::WindowEvent;

/// The subset of window-system traffic the application reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlatformEvent {
    Resized(RenderSize),
    /// `false` while minimized or fully occluded.
    Visibility(bool),
    Focused(bool),
    CloseRequested,
}

/// Maps a winit event onto a [`PlatformEvent`]; everything else is dropped.
pub fn translate_window_event(event: &WindowEvent) -> Option<PlatformEvent> {
    match event {
        WindowEvent::Resized(size) => Some(PlatformEvent::Resized(RenderSize::new(
            size.width,
            size.height,
        ))),
        WindowEvent::Occluded(occluded) => Some(PlatformEvent::Visibility(!occluded)),
        WindowEvent::Focused(focused) => Some(PlatformEvent::Focused(*focused)),
        WindowEvent::CloseRequested | WindowEvent::Destroyed => Some(PlatformEvent::CloseRequested),
        _ => None,
    }
}

/// Events waiting for the application, plus whether a close has been seen.
/// A close is still delivered through [`EventQueue::drain`].
#[derive(Debug)]
pub struct EventQueue {
    pending: VecDeque<PlatformEvent>,
    open: bool,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            open: true,
        }
    }
}

impl EventQueue {
    pub fn push(&mut self, ev: PlatformEvent) {
        if ev == PlatformEvent::CloseRequested {
            self.open = false;
        }
        self.pending.push_back(ev);
    }

    /// Translates and queues; returns what was queued, if anything.
    pub fn push_window_event(&mut self, event: &WindowEvent) -> Option<PlatformEvent> {
        let ev = translate_window_event(event)?;
        self.push(ev);
        Some(ev)
    }

    /// A size change the window system applied synchronously produces no
    /// Resized event of its own.
    pub fn push_applied_size(&mut self, applied: Option<RenderSize>) {
        if let Some(size) = applied {
            self.push(PlatformEvent::Resized(size));
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn drain(&mut self) -> Vec<PlatformEvent> {
        self.pending.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;

    #[test]
    fn resize_carries_physical_size() {
        let ev = WindowEvent::Resized(PhysicalSize::new(800, 600));
        assert_eq!(
            translate_window_event(&ev),
            Some(PlatformEvent::Resized(RenderSize::new(800, 600)))
        );
    }

    #[test]
    fn occlusion_inverts_to_visibility() {
        assert_eq!(
            translate_window_event(&WindowEvent::Occluded(true)),
            Some(PlatformEvent::Visibility(false))
        );
        assert_eq!(
            translate_window_event(&WindowEvent::Occluded(false)),
            Some(PlatformEvent::Visibility(true))
        );
    }

    #[test]
    fn close_and_destroy_both_request_close() {
        assert_eq!(
            translate_window_event(&WindowEvent::CloseRequested),
            Some(PlatformEvent::CloseRequested)
        );
        assert_eq!(
            translate_window_event(&WindowEvent::Destroyed),
            Some(PlatformEvent::CloseRequested)
        );
    }

    #[test]
    fn unrelated_events_are_ignored() {
        assert_eq!(translate_window_event(&WindowEvent::RedrawRequested), None);
    }

    #[test]
    fn queue_drains_in_arrival_order() {
        let mut q = EventQueue::default();
        q.push_window_event(&WindowEvent::Focused(true));
        q.push_window_event(&WindowEvent::RedrawRequested);
        q.push_window_event(&WindowEvent::Resized(PhysicalSize::new(0, 0)));
        assert_eq!(
            q.drain(),
            vec![
                PlatformEvent::Focused(true),
                PlatformEvent::Resized(RenderSize::new(0, 0))
            ]
        );
        assert!(q.drain().is_empty());
    }

    #[test]
    fn close_marks_queue_closed_and_is_still_delivered() {
        let mut q = EventQueue::default();
        assert!(q.is_open());
        q.push_window_event(&WindowEvent::CloseRequested);
        assert!(!q.is_open());
        assert_eq!(q.drain(), vec![PlatformEvent::CloseRequested]);
        assert!(!q.is_open());
    }

    #[test]
    fn synchronously_applied_size_becomes_a_resize() {
        let mut q = EventQueue::default();
        q.push_applied_size(None);
        assert!(q.drain().is_empty());
        q.push_applied_size(Some(RenderSize::new(640, 480)));
        assert_eq!(
            q.drain(),
            vec![PlatformEvent::Resized(RenderSize::new(640, 480))]
        );
        assert!(q.is_open());
    }
}
