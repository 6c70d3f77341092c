// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Windowing collaborator. The renderer only sees [`PlatformWindow`] and the
//! raw handles; everything winit-specific stays in this crate.

mod event;
mod window;

pub use event::{translate_window_event, EventQueue, PlatformEvent};
pub use window::{PlatformWindow, WindowSettings, WinitWindow};
pub use winit;
