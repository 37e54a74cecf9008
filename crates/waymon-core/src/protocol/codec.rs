// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame codec (C1): length-prefixed framing + tagged-union event
//! (de)serialization, with text/binary recovery per spec.md §4.1.
//!
//! Wire layout:
//!
//! ```text
//! +----+----+----+----+--- length bytes ---+
//! |  length  (u32 BE) |   serialized event  |
//! +-------------------+---------------------+
//! ```
//!
//! The payload is a hand-rolled tagged-union encoding (discriminant byte
//! followed by fixed/length-prefixed fields) rather than a generic
//! `serde` format: spec.md is explicit that byte-exact frame layout is the
//! compatibility requirement, not payload schema identity, and a
//! length-prefix codec written by hand is the idiom this corpus uses for
//! anything that must survive interleaved text (see `RouteInfo` /
//! `extract_route_info` in the teacher's bridge module for the sibling
//! JSON-sniffing idiom this mirrors in spirit).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;
use crate::protocol::event::{
    ClientCapabilities, ClientConfig, ControlEvent, InputEvent, InputEventKind, LogEvent,
    LogLevel, Monitor, ScrollKind,
};

/// Largest frame the codec will accept. Applies uniformly to control and
/// input payloads as well as the larger `ClientConfig` announcements.
pub const MAX_FRAME_SIZE: u32 = 1_048_576;

/// Text a server writes instead of a frame when rejecting a connection over
/// capacity (§4.4); also the marker `read_frame` treats as fatal on the
/// client side of the same exchange (§4.1, §8 scenario 6).
pub const MAX_CLIENTS_FATAL_TEXT: &str = "maximum number of active clients";

const FATAL_TEXT_MARKERS: &[&str] = &[MAX_CLIENTS_FATAL_TEXT];

/// Outcome of a single `read_frame` call.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A well-formed event frame.
    Event(InputEvent),
    /// Text was sniffed on what looked like a length prefix; the line was
    /// consumed and logged. The caller may continue reading.
    RecoverableText(String),
    /// Recovered text matched a fatal marker; the caller must close the
    /// connection. No malformed event is ever delivered upstream.
    FatalText(String),
}

// -- Tag bytes ----------------------------------------------------------------

const TAG_MOUSE_MOVE: u8 = 0;
const TAG_MOUSE_POSITION: u8 = 1;
const TAG_MOUSE_BUTTON: u8 = 2;
const TAG_MOUSE_SCROLL: u8 = 3;
const TAG_KEYBOARD: u8 = 4;
const TAG_CONTROL: u8 = 5;
const TAG_LOG: u8 = 6;

const CTRL_REQUEST_CONTROL: u8 = 0;
const CTRL_RELEASE_CONTROL: u8 = 1;
const CTRL_SWITCH_TO_LOCAL: u8 = 2;
const CTRL_CLIENT_LIST_REQUEST: u8 = 3;
const CTRL_CLIENT_LIST_RESPONSE: u8 = 4;
const CTRL_CLIENT_CONFIG: u8 = 5;
const CTRL_SERVER_SHUTDOWN: u8 = 6;
const CTRL_HEALTH_PING: u8 = 7;
const CTRL_HEALTH_PONG: u8 = 8;

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn get_string(buf: &mut Bytes) -> Result<String, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::Malformed("truncated string length".into()));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::Malformed("truncated string body".into()));
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

fn need(buf: &Bytes, n: usize, what: &str) -> Result<(), ProtocolError> {
    if buf.remaining() < n {
        return Err(ProtocolError::Malformed(format!("truncated {what}")));
    }
    Ok(())
}

/// Serialize an `InputEvent` into its binary payload (without the length
/// prefix — that is added by [`write_frame`]).
pub fn encode_event(event: &InputEvent) -> BytesMut {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_i64(event.timestamp_ns);
    put_string(&mut buf, &event.source_id);
    encode_kind(&mut buf, &event.kind);
    buf
}

fn encode_kind(buf: &mut BytesMut, kind: &InputEventKind) {
    match kind {
        InputEventKind::MouseMove { dx, dy } => {
            buf.put_u8(TAG_MOUSE_MOVE);
            buf.put_f64(*dx);
            buf.put_f64(*dy);
        }
        InputEventKind::MousePosition { x, y } => {
            buf.put_u8(TAG_MOUSE_POSITION);
            buf.put_f64(*x);
            buf.put_f64(*y);
        }
        InputEventKind::MouseButton { button, pressed } => {
            buf.put_u8(TAG_MOUSE_BUTTON);
            buf.put_u8(*button);
            buf.put_u8(*pressed as u8);
        }
        InputEventKind::MouseScroll { dx, dy, kind } => {
            buf.put_u8(TAG_MOUSE_SCROLL);
            buf.put_f64(*dx);
            buf.put_f64(*dy);
            buf.put_u8(match kind {
                ScrollKind::Line => 0,
                ScrollKind::Pixel => 1,
            });
        }
        InputEventKind::Keyboard { key, pressed, modifiers } => {
            buf.put_u8(TAG_KEYBOARD);
            buf.put_u32(*key);
            buf.put_u8(*pressed as u8);
            buf.put_u8(*modifiers);
        }
        InputEventKind::Control(ctrl) => {
            buf.put_u8(TAG_CONTROL);
            encode_control(buf, ctrl);
        }
        InputEventKind::Log(log) => {
            buf.put_u8(TAG_LOG);
            buf.put_u8(match log.level {
                LogLevel::Trace => 0,
                LogLevel::Debug => 1,
                LogLevel::Info => 2,
                LogLevel::Warn => 3,
                LogLevel::Error => 4,
            });
            put_string(buf, &log.message);
        }
    }
}

fn encode_control(buf: &mut BytesMut, ctrl: &ControlEvent) {
    match ctrl {
        ControlEvent::RequestControl { target_id } => {
            buf.put_u8(CTRL_REQUEST_CONTROL);
            put_string(buf, target_id);
        }
        ControlEvent::ReleaseControl { target_id } => {
            buf.put_u8(CTRL_RELEASE_CONTROL);
            put_string(buf, target_id);
        }
        ControlEvent::SwitchToLocal => {
            buf.put_u8(CTRL_SWITCH_TO_LOCAL);
        }
        ControlEvent::ClientListRequest => {
            buf.put_u8(CTRL_CLIENT_LIST_REQUEST);
        }
        ControlEvent::ClientListResponse { client_ids } => {
            buf.put_u8(CTRL_CLIENT_LIST_RESPONSE);
            buf.put_u32(client_ids.len() as u32);
            for id in client_ids {
                put_string(buf, id);
            }
        }
        ControlEvent::ClientConfig(cfg) => {
            buf.put_u8(CTRL_CLIENT_CONFIG);
            encode_client_config(buf, cfg);
        }
        ControlEvent::ServerShutdown => {
            buf.put_u8(CTRL_SERVER_SHUTDOWN);
        }
        ControlEvent::HealthPing => {
            buf.put_u8(CTRL_HEALTH_PING);
        }
        ControlEvent::HealthPong => {
            buf.put_u8(CTRL_HEALTH_PONG);
        }
    }
}

fn encode_client_config(buf: &mut BytesMut, cfg: &ClientConfig) {
    put_string(buf, &cfg.client_id);
    put_string(buf, &cfg.client_name);
    buf.put_u32(cfg.monitors.len() as u32);
    for m in &cfg.monitors {
        put_string(buf, &m.name);
        buf.put_i32(m.x);
        buf.put_i32(m.y);
        buf.put_u32(m.w);
        buf.put_u32(m.h);
        buf.put_u8(m.primary as u8);
        buf.put_f32(m.scale);
        buf.put_f32(m.refresh);
    }
    buf.put_u8(cfg.capabilities.keyboard as u8);
    buf.put_u8(cfg.capabilities.mouse as u8);
    buf.put_u8(cfg.capabilities.scroll as u8);
    put_string(buf, &cfg.compositor);
    put_string(buf, &cfg.injector_version);
    put_string(buf, &cfg.keyboard_layout);
}

/// Parse a binary payload (as produced by [`encode_event`]) back into an
/// `InputEvent`.
pub fn decode_event(mut buf: Bytes) -> Result<InputEvent, ProtocolError> {
    need(&buf, 8, "timestamp")?;
    let timestamp_ns = buf.get_i64();
    let source_id = get_string(&mut buf)?;
    let kind = decode_kind(&mut buf)?;
    Ok(InputEvent { timestamp_ns, source_id, kind })
}

fn decode_kind(buf: &mut Bytes) -> Result<InputEventKind, ProtocolError> {
    need(buf, 1, "tag")?;
    let tag = buf.get_u8();
    match tag {
        TAG_MOUSE_MOVE => {
            need(buf, 16, "mouse move")?;
            Ok(InputEventKind::MouseMove { dx: buf.get_f64(), dy: buf.get_f64() })
        }
        TAG_MOUSE_POSITION => {
            need(buf, 16, "mouse position")?;
            Ok(InputEventKind::MousePosition { x: buf.get_f64(), y: buf.get_f64() })
        }
        TAG_MOUSE_BUTTON => {
            need(buf, 2, "mouse button")?;
            Ok(InputEventKind::MouseButton { button: buf.get_u8(), pressed: buf.get_u8() != 0 })
        }
        TAG_MOUSE_SCROLL => {
            need(buf, 17, "mouse scroll")?;
            let dx = buf.get_f64();
            let dy = buf.get_f64();
            let kind = match buf.get_u8() {
                0 => ScrollKind::Line,
                _ => ScrollKind::Pixel,
            };
            Ok(InputEventKind::MouseScroll { dx, dy, kind })
        }
        TAG_KEYBOARD => {
            need(buf, 6, "keyboard")?;
            let key = buf.get_u32();
            let pressed = buf.get_u8() != 0;
            let modifiers = buf.get_u8();
            Ok(InputEventKind::Keyboard { key, pressed, modifiers })
        }
        TAG_CONTROL => Ok(InputEventKind::Control(decode_control(buf)?)),
        TAG_LOG => {
            need(buf, 1, "log level")?;
            let level = match buf.get_u8() {
                0 => LogLevel::Trace,
                1 => LogLevel::Debug,
                2 => LogLevel::Info,
                3 => LogLevel::Warn,
                _ => LogLevel::Error,
            };
            let message = get_string(buf)?;
            Ok(InputEventKind::Log(LogEvent { level, message }))
        }
        other => Err(ProtocolError::UnknownVariant { tag: other }),
    }
}

fn decode_control(buf: &mut Bytes) -> Result<ControlEvent, ProtocolError> {
    need(buf, 1, "control tag")?;
    match buf.get_u8() {
        CTRL_REQUEST_CONTROL => {
            Ok(ControlEvent::RequestControl { target_id: get_string(buf)? })
        }
        CTRL_RELEASE_CONTROL => {
            Ok(ControlEvent::ReleaseControl { target_id: get_string(buf)? })
        }
        CTRL_SWITCH_TO_LOCAL => Ok(ControlEvent::SwitchToLocal),
        CTRL_CLIENT_LIST_REQUEST => Ok(ControlEvent::ClientListRequest),
        CTRL_CLIENT_LIST_RESPONSE => {
            need(buf, 4, "client list count")?;
            let count = buf.get_u32();
            let mut client_ids = Vec::with_capacity(count as usize);
            for _ in 0..count {
                client_ids.push(get_string(buf)?);
            }
            Ok(ControlEvent::ClientListResponse { client_ids })
        }
        CTRL_CLIENT_CONFIG => Ok(ControlEvent::ClientConfig(decode_client_config(buf)?)),
        CTRL_SERVER_SHUTDOWN => Ok(ControlEvent::ServerShutdown),
        CTRL_HEALTH_PING => Ok(ControlEvent::HealthPing),
        CTRL_HEALTH_PONG => Ok(ControlEvent::HealthPong),
        other => Err(ProtocolError::UnknownVariant { tag: other }),
    }
}

fn decode_client_config(buf: &mut Bytes) -> Result<ClientConfig, ProtocolError> {
    let client_id = get_string(buf)?;
    let client_name = get_string(buf)?;
    need(buf, 4, "monitor count")?;
    let monitor_count = buf.get_u32();
    let mut monitors = Vec::with_capacity(monitor_count as usize);
    for _ in 0..monitor_count {
        let name = get_string(buf)?;
        need(buf, 18, "monitor fields")?;
        let x = buf.get_i32();
        let y = buf.get_i32();
        let w = buf.get_u32();
        let h = buf.get_u32();
        let primary = buf.get_u8() != 0;
        let scale = buf.get_f32();
        let refresh = buf.get_f32();
        monitors.push(Monitor { name, x, y, w, h, primary, scale, refresh });
    }
    need(buf, 3, "capabilities")?;
    let capabilities = ClientCapabilities {
        keyboard: buf.get_u8() != 0,
        mouse: buf.get_u8() != 0,
        scroll: buf.get_u8() != 0,
    };
    let compositor = get_string(buf)?;
    let injector_version = get_string(buf)?;
    let keyboard_layout = get_string(buf)?;
    Ok(ClientConfig {
        client_id,
        client_name,
        monitors,
        capabilities,
        compositor,
        injector_version,
        keyboard_layout,
    })
}

// -- Framing --------------------------------------------------------------

/// Write one event as a length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    event: &InputEvent,
) -> Result<(), ProtocolError> {
    let body = encode_event(event);
    if body.len() as u32 > MAX_FRAME_SIZE || body.is_empty() {
        return Err(ProtocolError::InvalidLength { declared: body.len() as u32 });
    }
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    Ok(())
}

/// Read the next frame, recovering from interleaved diagnostic text per
/// spec.md §4.1.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<ReadOutcome, ProtocolError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let length = u32::from_be_bytes(len_bytes);

    if length == 0 || length > MAX_FRAME_SIZE {
        if len_bytes.iter().all(|b| (0x20..=0x7e).contains(b)) {
            return recover_text(reader, len_bytes).await;
        }
        return Err(ProtocolError::InvalidLength { declared: length });
    }

    let mut body = vec![0u8; length as usize];
    reader.read_exact(&mut body).await?;
    let event = decode_event(Bytes::from(body))?;
    Ok(ReadOutcome::Event(event))
}

/// Consume the rest of a bogus length prefix as a diagnostic text line.
async fn recover_text<R: AsyncRead + Unpin>(
    reader: &mut R,
    prefix: [u8; 4],
) -> Result<ReadOutcome, ProtocolError> {
    const MAX_TEXT: usize = 1024;
    let mut text = String::from_utf8_lossy(&prefix).into_owned();

    let mut byte = [0u8; 1];
    while text.len() < MAX_TEXT {
        match reader.read_exact(&mut byte).await {
            Ok(_) => {
                if byte[0] == b'\n' {
                    break;
                }
                text.push(byte[0] as char);
            }
            Err(_) => break,
        }
    }

    tracing::warn!(text = %text, "recovered diagnostic text interleaved on the frame channel");

    if FATAL_TEXT_MARKERS.iter().any(|marker| text.contains(marker)) {
        return Ok(ReadOutcome::FatalText(text));
    }
    Ok(ReadOutcome::RecoverableText(text))
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
