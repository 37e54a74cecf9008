// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monotonic timestamp helper shared by event stamping and latency checks.

use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch, clamped to `i64`.
///
/// Wall-clock rather than `Instant`-based: timestamps are compared across
/// process boundaries (server vs. client clocks), so a monotonic-but-opaque
/// `Instant` can't be used here the way a single-process latency check
/// would use one.
pub fn monotonic_now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
