// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport session (C2): the read loop, write path, and health-check
//! ticker that together own one authenticated duplex channel.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::WaymonError;
use crate::protocol::codec::{self, ReadOutcome, MAX_FRAME_SIZE};
use crate::protocol::event::{ControlEvent, InputEvent, InputEventKind};
use crate::transport::channel::DuplexChannel;
use crate::transport::writer::BufferedWriter;

/// Default period for the liveness ping ticker (§4.2, §5).
pub const HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(5);

/// How long a session may go without a successful read before the health
/// ticker declares it dead.
const ACTIVITY_TIMEOUT_MULTIPLIER: u32 = 2;

/// Depth of the channel carrying events up to the session's owner.
const INBOUND_CHANNEL_DEPTH: usize = 256;

/// One authenticated duplex channel plus its background tasks.
///
/// Cloning shares the same writer, cancel token, and error slot — cheap,
/// and how multiple call sites (pipeline, IPC status handler) can hold a
/// reference without owning the session.
#[derive(Clone)]
pub struct TransportSession {
    writer: BufferedWriter,
    cancel: CancellationToken,
    last_error: Arc<Mutex<Option<WaymonError>>>,
}

impl TransportSession {
    /// Split `stream`, spawn the read loop and health ticker, and return a
    /// handle plus the channel of events read from the peer.
    ///
    /// `cancel` is typically a child of the listener's cancellation token so
    /// a server-wide shutdown tears every session down together.
    pub fn spawn<S>(
        stream: S,
        cancel: CancellationToken,
        batch_max: usize,
    ) -> (Self, mpsc::Receiver<InputEvent>)
    where
        S: DuplexChannel + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (writer, flush_handle) = BufferedWriter::spawn(write_half, batch_max);
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_DEPTH);
        let last_error = Arc::new(Mutex::new(None));
        let last_activity = Arc::new(AtomicI64::new(crate::time::monotonic_now_ns()));

        let session = Self { writer: writer.clone(), cancel: cancel.clone(), last_error: Arc::clone(&last_error) };

        tokio::spawn(read_loop(session.clone(), read_half, tx, Arc::clone(&last_activity)));
        tokio::spawn(health_loop(session.clone(), Arc::clone(&last_activity)));
        tokio::spawn(flush_on_close(cancel, writer, flush_handle));

        (session, rx)
    }

    /// Serialize and queue `event`. Motion events flush immediately; other
    /// events may coalesce with subsequent writes (§4.2).
    pub async fn send(&self, event: &InputEvent) -> Result<(), WaymonError> {
        if self.writer.has_failed() {
            self.fail(WaymonError::TransportIo).await;
            return Err(WaymonError::TransportIo);
        }

        let body = codec::encode_event(event);
        if body.len() as u32 > MAX_FRAME_SIZE {
            return Err(WaymonError::TransportIo);
        }
        let mut framed = BytesMut::with_capacity(4 + body.len());
        framed.put_u32(body.len() as u32);
        framed.extend_from_slice(&body);

        let immediate = event.kind.requires_immediate_flush();
        self.writer.write(framed.freeze(), immediate).await
    }

    /// Cancel the session's background tasks. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn last_error(&self) -> Option<WaymonError> {
        *self.last_error.lock().await
    }

    async fn fail(&self, err: WaymonError) {
        let mut guard = self.last_error.lock().await;
        if guard.is_none() {
            *guard = Some(err);
        }
        drop(guard);
        self.cancel.cancel();
    }
}

async fn read_loop<R>(
    session: TransportSession,
    mut reader: R,
    tx: mpsc::Sender<InputEvent>,
    last_activity: Arc<AtomicI64>,
) where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    loop {
        let outcome = tokio::select! {
            _ = session.cancel.cancelled() => break,
            result = codec::read_frame(&mut reader) => result,
        };

        match outcome {
            Ok(ReadOutcome::Event(event)) => {
                last_activity.store(crate::time::monotonic_now_ns(), Ordering::Release);
                if !handle_control_internally(&session, &event).await {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
            Ok(ReadOutcome::RecoverableText(_text)) => {
                last_activity.store(crate::time::monotonic_now_ns(), Ordering::Release);
            }
            Ok(ReadOutcome::FatalText(_text)) => {
                session.fail(WaymonError::MaxClients).await;
                break;
            }
            Err(_e) => {
                session.fail(WaymonError::TransportIo).await;
                break;
            }
        }
    }
    drop(tx);
}

/// Health pings/pongs are transport-internal; everything else is forwarded
/// to the owner's inbound channel. Returns `true` if the event was consumed
/// here and should not be forwarded.
async fn handle_control_internally(session: &TransportSession, event: &InputEvent) -> bool {
    match &event.kind {
        InputEventKind::Control(ControlEvent::HealthPing) => {
            let pong = InputEvent::new(&event.source_id, InputEventKind::Control(ControlEvent::HealthPong));
            let _ = session.send(&pong).await;
            true
        }
        InputEventKind::Control(ControlEvent::HealthPong) => true,
        _ => false,
    }
}

async fn health_loop(session: TransportSession, last_activity: Arc<AtomicI64>) {
    let mut ticker = tokio::time::interval(HEALTH_CHECK_PERIOD);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let stale_after_ns = (HEALTH_CHECK_PERIOD.as_nanos() as i64) * ACTIVITY_TIMEOUT_MULTIPLIER as i64;

    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let ping = InputEvent::new("health", InputEventKind::Control(ControlEvent::HealthPing));
        if session.send(&ping).await.is_err() {
            session.fail(WaymonError::TransportIo).await;
            break;
        }

        let elapsed = crate::time::monotonic_now_ns() - last_activity.load(Ordering::Acquire);
        if elapsed > stale_after_ns {
            tracing::warn!(elapsed_ns = elapsed, "session exceeded activity timeout, closing");
            session.fail(WaymonError::TransportIo).await;
            break;
        }
    }
}

async fn flush_on_close(
    cancel: CancellationToken,
    writer: BufferedWriter,
    flush_handle: tokio::task::JoinHandle<()>,
) {
    cancel.cancelled().await;
    writer.close().await;
    let _ = flush_handle.await;
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
