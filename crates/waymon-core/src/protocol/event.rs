// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-format data model (§3): `InputEvent`, `ControlEvent`, `ClientConfig`.
//!
//! These are sealed enums with explicit discriminants per §9's re-architecture
//! hints — the discriminant is also the on-wire tag byte written by
//! [`crate::protocol::codec`].

use serde::{Deserialize, Serialize};

/// Mouse scroll axis/unit, carried alongside a scroll delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrollKind {
    Line,
    Pixel,
}

/// A single physical monitor attached to a client, as reported in
/// `ClientConfig`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
    pub primary: bool,
    pub scale: f32,
    pub refresh: f32,
}

/// What a client's injector backend is able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCapabilities {
    pub keyboard: bool,
    pub mouse: bool,
    pub scroll: bool,
}

impl ClientCapabilities {
    /// Whether this client can accept input at all. `switch_to` (§4.5)
    /// refuses targets that can't.
    pub fn accepts_input(&self) -> bool {
        self.keyboard || self.mouse
    }
}

/// A client's self-reported configuration, sent as `CLIENT_CONFIG` within
/// 2s of connecting (§4.12) and re-sent after every reconnect (§4.8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_name: String,
    pub monitors: Vec<Monitor>,
    pub capabilities: ClientCapabilities,
    pub compositor: String,
    pub injector_version: String,
    pub keyboard_layout: String,
}

/// Control-plane message kinds (§3, §4.12).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlEvent {
    /// Server asks a client to start receiving input.
    RequestControl { target_id: String },
    /// Either side releases a client from `being_controlled`.
    ReleaseControl { target_id: String },
    /// Client asks to be returned to observer-only (no active controller).
    SwitchToLocal,
    /// Client asks the server for the current client list.
    ClientListRequest,
    /// Server's answer to `ClientListRequest`.
    ClientListResponse { client_ids: Vec<String> },
    /// Client announces (or re-announces) its configuration.
    ClientConfig(ClientConfig),
    /// Server is shutting down; client must re-enter the reconnect loop
    /// without tearing down injector state (§4.12 step 6).
    ServerShutdown,
    /// Liveness probe (§4.2); either side may send, the other must pong.
    HealthPing,
    HealthPong,
}

/// The tagged union carried in every frame (§3). Exactly one variant is
/// populated — an "empty union" is a protocol violation the codec never
/// constructs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEventKind {
    MouseMove { dx: f64, dy: f64 },
    MousePosition { x: f64, y: f64 },
    MouseButton { button: u8, pressed: bool },
    MouseScroll { dx: f64, dy: f64, kind: ScrollKind },
    Keyboard { key: u32, pressed: bool, modifiers: u8 },
    Control(ControlEvent),
    Log(LogEvent),
}

impl InputEventKind {
    /// Whether this variant must flush the buffered writer immediately to
    /// preserve pointer responsiveness (§4.2).
    pub fn requires_immediate_flush(&self) -> bool {
        matches!(self, Self::MouseMove { .. } | Self::MousePosition { .. })
    }
}

/// A fully-stamped event as it travels over the wire (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    pub timestamp_ns: i64,
    pub source_id: String,
    pub kind: InputEventKind,
}

impl InputEvent {
    pub fn new(source_id: impl Into<String>, kind: InputEventKind) -> Self {
        Self { timestamp_ns: crate::time::monotonic_now_ns(), source_id: source_id.into(), kind }
    }
}

/// A client-originated log record tunneled over the main stream (C11).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
