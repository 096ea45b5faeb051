// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared semantic validation rules.
//!
//! The metrics and log validators both enforce the same agent identifier
//! format and the same timestamp freshness window; the rules live here so
//! the two gates cannot drift apart.

/// Maximum accepted agent identifier length, in bytes.
pub const MAX_AGENT_ID_LEN: usize = 64;

/// Timestamp freshness window relative to the server's wall clock.
///
/// A timestamp is acceptable when it falls inside
/// `[now - max_age_ms, now + max_future_ms]`. The lower bound saturates at
/// zero so early wall-clock values cannot underflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampWindow {
    /// How far in the past a timestamp may be, in milliseconds.
    pub max_age_ms: u64,
    /// How far in the future a timestamp may be, in milliseconds.
    pub max_future_ms: u64,
}

impl Default for TimestampWindow {
    fn default() -> Self {
        Self {
            max_age_ms: 300_000,  // 5 minutes
            max_future_ms: 60_000, // 1 minute
        }
    }
}

impl TimestampWindow {
    /// Oldest acceptable timestamp for the given wall clock, saturating at 0.
    pub fn min_allowed(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.max_age_ms)
    }

    /// Newest acceptable timestamp for the given wall clock.
    pub fn max_allowed(&self, now_ms: u64) -> u64 {
        now_ms.saturating_add(self.max_future_ms)
    }

    /// Whether `ts` is inside the window relative to `now_ms`.
    pub fn contains(&self, ts: u64, now_ms: u64) -> bool {
        ts >= self.min_allowed(now_ms) && ts <= self.max_allowed(now_ms)
    }
}

/// Checks the strict agent identifier format: `^[A-Za-z][A-Za-z0-9_-]{0,63}$`.
///
/// The parser admits a looser character class (dots allowed); this is the
/// final form enforced at the semantic gate.
pub fn agent_id_format_ok(agent_id: &str) -> bool {
    let bytes = agent_id.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_AGENT_ID_LEN {
        return false;
    }
    if !bytes[0].is_ascii_alphabetic() {
        return false;
    }
    bytes[1..]
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
