// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Buffered writer (§4.2): a single-producer-single-flusher queue that
//! coalesces small writes while flushing latency-critical ones immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::WaymonError;

/// Minimum accepted `BATCH_MAX` (§4.2).
pub const MIN_BATCH_MAX: usize = 64 * 1024;

/// Debounce window after the first write lands in an empty batch.
const FLUSH_DEBOUNCE: Duration = Duration::from_millis(1);

enum WriterMsg {
    Write { bytes: Bytes, immediate: bool },
    Close,
}

/// Handle to a running flusher task. Cloning shares the same underlying
/// sink and buffer — producers never touch the sink directly.
#[derive(Clone)]
pub struct BufferedWriter {
    tx: mpsc::Sender<WriterMsg>,
    failed: Arc<AtomicBool>,
    /// Single-slot mailbox for pointer-motion frames (§4.2, §4.6). A slow
    /// peer never backs motion up behind other writes: a new motion frame
    /// replaces whatever is still unflushed instead of queuing behind it.
    motion_slot: Arc<StdMutex<Option<Bytes>>>,
    motion_notify: Arc<Notify>,
}

impl BufferedWriter {
    /// Spawn the flusher task over `sink`. `batch_max` is clamped up to
    /// [`MIN_BATCH_MAX`].
    pub fn spawn<W>(sink: W, batch_max: usize) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let batch_max = batch_max.max(MIN_BATCH_MAX);
        let (tx, rx) = mpsc::channel(1024);
        let failed = Arc::new(AtomicBool::new(false));
        let motion_slot = Arc::new(StdMutex::new(None));
        let motion_notify = Arc::new(Notify::new());
        let handle = tokio::spawn(flusher_loop(
            sink,
            rx,
            batch_max,
            Arc::clone(&failed),
            Arc::clone(&motion_slot),
            Arc::clone(&motion_notify),
        ));
        (Self { tx, failed, motion_slot, motion_notify }, handle)
    }

    /// Queue `bytes` for sending. `immediate` events (pointer motion, §4.2)
    /// bypass the coalescing batch and are conflated into a single pending
    /// slot: if the flusher hasn't drained the previous one yet, it is
    /// dropped in favor of this one and [`WaymonError::Backpressure`] is
    /// returned so the caller can log it (§4.6). Non-immediate writes queue
    /// normally and block once the channel is full.
    pub async fn write(&self, bytes: Bytes, immediate: bool) -> Result<(), WaymonError> {
        if self.failed.load(Ordering::Acquire) {
            return Err(WaymonError::TransportIo);
        }
        if immediate {
            let dropped = self.motion_slot.lock().unwrap_or_else(|e| e.into_inner()).replace(bytes).is_some();
            self.motion_notify.notify_one();
            return if dropped { Err(WaymonError::Backpressure) } else { Ok(()) };
        }
        self.tx
            .send(WriterMsg::Write { bytes, immediate })
            .await
            .map_err(|_| WaymonError::TransportIo)
    }

    /// Whether a prior flush has failed. The caller is responsible for
    /// tearing the session down once this is observed.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Signal the flusher to flush any pending bytes once and stop. Returns
    /// once the close message is accepted; callers that need to know the
    /// flush actually completed should await the `JoinHandle` returned by
    /// [`Self::spawn`].
    pub async fn close(&self) {
        let _ = self.tx.send(WriterMsg::Close).await;
    }
}

async fn flusher_loop<W>(
    mut sink: W,
    mut rx: mpsc::Receiver<WriterMsg>,
    batch_max: usize,
    failed: Arc<AtomicBool>,
    motion_slot: Arc<StdMutex<Option<Bytes>>>,
    motion_notify: Arc<Notify>,
) where
    W: AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::new();
    let mut flush_deadline: Option<Instant> = None;

    loop {
        let debounce = async {
            match flush_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            msg = rx.recv() => match msg {
                Some(WriterMsg::Write { bytes, immediate }) => {
                    if buffer.is_empty() && flush_deadline.is_none() {
                        flush_deadline = Some(Instant::now() + FLUSH_DEBOUNCE);
                    }
                    buffer.extend_from_slice(&bytes);
                    if immediate || buffer.len() >= batch_max {
                        if flush(&mut sink, &mut buffer).await.is_err() {
                            failed.store(true, Ordering::Release);
                        }
                        flush_deadline = None;
                    }
                }
                Some(WriterMsg::Close) | None => {
                    drain_motion(&mut sink, &motion_slot, &failed).await;
                    if flush(&mut sink, &mut buffer).await.is_err() {
                        failed.store(true, Ordering::Release);
                    }
                    break;
                }
            },
            _ = motion_notify.notified() => {
                drain_motion(&mut sink, &motion_slot, &failed).await;
            },
            _ = debounce => {
                if flush(&mut sink, &mut buffer).await.is_err() {
                    failed.store(true, Ordering::Release);
                }
                flush_deadline = None;
            }
        }
    }
}

/// Write out whatever pointer-motion frame is currently pending, if any.
async fn drain_motion<W: AsyncWrite + Unpin>(
    sink: &mut W,
    motion_slot: &StdMutex<Option<Bytes>>,
    failed: &AtomicBool,
) {
    let Some(bytes) = motion_slot.lock().unwrap_or_else(|e| e.into_inner()).take() else {
        return;
    };
    let mut pending = BytesMut::from(&bytes[..]);
    if flush(sink, &mut pending).await.is_err() {
        failed.store(true, Ordering::Release);
    }
}

async fn flush<W: AsyncWrite + Unpin>(sink: &mut W, buffer: &mut BytesMut) -> std::io::Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }
    sink.write_all(buffer).await?;
    sink.flush().await?;
    buffer.clear();
    Ok(())
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod tests;
