// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Injection pipeline (C7, §4.7): inbound stream -> dispatcher -> injector.
//!
//! OS-level injection (virtual pointer/keyboard devices) is an external
//! collaborator (§1, §6); [`Injector`] is the seam a platform-specific
//! backend plugs into, mirroring `waymon_server::pipeline::CaptureSource`
//! on the server side of the same boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::warn;
use waymon_core::error::WaymonError;
use waymon_core::protocol::event::InputEventKind;

/// Platform-specific synthetic input backend (§6 "Injection API").
///
/// `inject_key_with_modifiers` is optional: backends without a
/// modifiers-aware call fall back to `inject_key` and let modifier state
/// become the backend's own responsibility (§4.7).
pub trait Injector: Send + Sync {
    fn start(&self) -> Result<(), WaymonError>;
    fn stop(&self);
    fn inject_mouse_move(&self, dx: f64, dy: f64);
    fn inject_mouse_position(&self, x: f64, y: f64);
    fn inject_mouse_button(&self, button: u8, pressed: bool);
    fn inject_mouse_scroll(&self, dx: f64, dy: f64);
    fn inject_key(&self, key: u32, pressed: bool);

    fn supports_modifiers(&self) -> bool {
        false
    }

    fn inject_key_with_modifiers(&self, key: u32, pressed: bool, _modifiers: u8) {
        self.inject_key(key, pressed);
    }

    /// Whether `inject_mouse_position` is backed by real absolute
    /// positioning. Backends that only support relative motion return
    /// `false`; the pipeline then converts `MousePosition` into the
    /// equivalent `inject_mouse_move` delta (§4.7).
    fn supports_absolute_position(&self) -> bool {
        true
    }
}

/// Tracks whether injected input should currently be applied (§3
/// `ControlStatus`), and the last known absolute cursor position so
/// `MousePosition` can be translated into a relative delta for backends
/// that only support relative motion.
pub struct InjectionPipeline<I: Injector> {
    injector: I,
    being_controlled: AtomicBool,
    last_position: Mutex<Option<(f64, f64)>>,
}

impl<I: Injector> InjectionPipeline<I> {
    pub fn new(injector: I) -> Self {
        Self { injector, being_controlled: AtomicBool::new(false), last_position: Mutex::new(None) }
    }

    pub fn start(&self) -> Result<(), WaymonError> {
        self.injector.start()
    }

    pub fn stop(&self) {
        self.injector.stop();
    }

    pub fn being_controlled(&self) -> bool {
        self.being_controlled.load(Ordering::SeqCst)
    }

    pub fn set_being_controlled(&self, value: bool) {
        self.being_controlled.store(value, Ordering::SeqCst);
        if !value {
            *self.last_position.lock().unwrap_or_else(|e| e.into_inner()) = None;
        }
    }

    /// Dispatch one input-kind event. No-op, silently, unless currently
    /// being controlled (§4.7).
    pub fn dispatch(&self, kind: &InputEventKind) {
        if !self.being_controlled() {
            return;
        }

        match kind {
            InputEventKind::MouseMove { dx, dy } => self.injector.inject_mouse_move(*dx, *dy),
            InputEventKind::MousePosition { x, y } => self.dispatch_absolute_position(*x, *y),
            InputEventKind::MouseButton { button, pressed } => {
                self.injector.inject_mouse_button(*button, *pressed)
            }
            InputEventKind::MouseScroll { dx, dy, .. } => self.injector.inject_mouse_scroll(*dx, *dy),
            InputEventKind::Keyboard { key, pressed, modifiers } => {
                if self.injector.supports_modifiers() {
                    self.injector.inject_key_with_modifiers(*key, *pressed, *modifiers);
                } else {
                    self.injector.inject_key(*key, *pressed);
                }
            }
            InputEventKind::Control(_) | InputEventKind::Log(_) => {}
        }
    }

    fn dispatch_absolute_position(&self, x: f64, y: f64) {
        if x < 0.0 || y < 0.0 {
            warn!(x, y, "rejecting negative absolute mouse position");
            return;
        }

        let mut last = self.last_position.lock().unwrap_or_else(|e| e.into_inner());

        if self.injector.supports_absolute_position() {
            self.injector.inject_mouse_position(x, y);
        } else {
            let (last_x, last_y) = last.unwrap_or((x, y));
            self.injector.inject_mouse_move(x - last_x, y - last_y);
        }

        *last = Some((x, y));
    }
}

#[cfg(test)]
#[path = "injector_tests.rs"]
mod tests;
