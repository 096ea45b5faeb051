// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Semantic validation of parsed logs.
//!
//! Checks identifier format, timestamp freshness, level floor, and message
//! length. Oversized messages are truncated by default rather than
//! dropped; the policy is configurable.

use crate::logs::parser::{Level, LogField, ParsedLog};
use crate::validation::{agent_id_format_ok, TimestampWindow, MAX_AGENT_ID_LEN};

/// Log validation configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogValidationConfig {
    pub timestamp_window: TimestampWindow,
    /// Logs below this level are dropped.
    pub min_level: Level,
    pub max_message_length: usize,
    /// Truncate oversized messages instead of dropping them.
    pub truncate_oversized_message: bool,
    pub require_agent_id: bool,
}

impl Default for LogValidationConfig {
    fn default() -> Self {
        Self {
            timestamp_window: TimestampWindow::default(),
            min_level: Level::Trace,
            max_message_length: 1024,
            truncate_oversized_message: true,
            require_agent_id: false,
        }
    }
}

/// Semantic drop reasons for logs.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum LogValidationDrop {
    #[error("timestamp older than the accepted window")]
    TimestampTooOld,

    #[error("timestamp further in the future than allowed")]
    TimestampInFuture,

    #[error("agent identifier required but absent")]
    AgentIdEmpty,

    #[error("agent identifier exceeds {MAX_AGENT_ID_LEN} bytes")]
    AgentIdTooLong,

    #[error("agent identifier does not match ^[A-Za-z][A-Za-z0-9_-]{{0,63}}$")]
    AgentIdInvalidFormat,

    #[error("log level below the configured floor")]
    LevelBelowMinimum,

    #[error("message exceeds the configured length")]
    MessageTooLong,

    #[error("message is empty")]
    MessageEmpty,
}

impl LogValidationDrop {
    /// Stable label used as a counter key.
    pub fn label(self) -> &'static str {
        match self {
            LogValidationDrop::TimestampTooOld => "timestamp_too_old",
            LogValidationDrop::TimestampInFuture => "timestamp_in_future",
            LogValidationDrop::AgentIdEmpty => "agent_id_empty",
            LogValidationDrop::AgentIdTooLong => "agent_id_too_long",
            LogValidationDrop::AgentIdInvalidFormat => "agent_id_invalid_format",
            LogValidationDrop::LevelBelowMinimum => "level_below_minimum",
            LogValidationDrop::MessageTooLong => "message_too_long",
            LogValidationDrop::MessageEmpty => "message_empty",
        }
    }
}

/// A semantically valid log. Borrows the parsed data; the message view is
/// already truncated when the policy applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedLog<'a> {
    /// Empty when the line carried no agent field.
    pub agent_id: &'a str,
    pub ts: u64,
    pub level: Level,
    pub msg: &'a str,
    pub fields: &'a [LogField<'a>],
}

/// Validates a parsed log against `config` at wall-clock time `now_ms`.
pub fn validate_log<'a>(
    parsed: &'a ParsedLog<'a>,
    config: &LogValidationConfig,
    now_ms: u64,
) -> Result<ValidatedLog<'a>, LogValidationDrop> {
    if parsed.agent_id.is_empty() {
        if config.require_agent_id {
            return Err(LogValidationDrop::AgentIdEmpty);
        }
    } else {
        if parsed.agent_id.len() > MAX_AGENT_ID_LEN {
            return Err(LogValidationDrop::AgentIdTooLong);
        }
        if !agent_id_format_ok(parsed.agent_id) {
            return Err(LogValidationDrop::AgentIdInvalidFormat);
        }
    }

    if !config.timestamp_window.contains(parsed.ts, now_ms) {
        if parsed.ts < config.timestamp_window.min_allowed(now_ms) {
            return Err(LogValidationDrop::TimestampTooOld);
        }
        return Err(LogValidationDrop::TimestampInFuture);
    }

    if parsed.level < config.min_level {
        return Err(LogValidationDrop::LevelBelowMinimum);
    }

    if parsed.msg.is_empty() {
        return Err(LogValidationDrop::MessageEmpty);
    }
    let msg = if parsed.msg.len() > config.max_message_length {
        if !config.truncate_oversized_message {
            return Err(LogValidationDrop::MessageTooLong);
        }
        truncate_to_char_boundary(parsed.msg, config.max_message_length)
    } else {
        parsed.msg
    };

    Ok(ValidatedLog {
        agent_id: parsed.agent_id,
        ts: parsed.ts,
        level: parsed.level,
        msg,
        fields: parsed.fields(),
    })
}

/// Cuts `s` to at most `max_len` bytes without splitting a UTF-8 sequence.
fn truncate_to_char_boundary(s: &str, mut max_len: usize) -> &str {
    while max_len > 0 && !s.is_char_boundary(max_len) {
        max_len -= 1;
    }
    &s[..max_len]
}
