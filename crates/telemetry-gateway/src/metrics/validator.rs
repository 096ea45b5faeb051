// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Semantic validation of parsed metrics.
//!
//! The parser guarantees shape; this gate judges meaning: identifier
//! format, timestamp freshness, and value sanity. Work is O(metric_count),
//! already bounded by the parser's cap.

use crate::metrics::parser::{Metric, ParsedMetrics};
use crate::validation::{agent_id_format_ok, TimestampWindow, MAX_AGENT_ID_LEN};

/// Numeric sanity rules for metric values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricValueRules {
    pub min_value: f64,
    pub max_value: f64,
    pub reject_nan: bool,
    pub reject_infinity: bool,
}

impl Default for MetricValueRules {
    fn default() -> Self {
        Self {
            min_value: -1e15,
            max_value: 1e15,
            reject_nan: true,
            reject_infinity: true,
        }
    }
}

/// Full metrics validation configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsValidationConfig {
    pub timestamp_window: TimestampWindow,
    pub value_rules: MetricValueRules,
    /// When set, `ts == 0` (absent in the payload) is rejected.
    pub require_timestamp: bool,
}

impl Default for MetricsValidationConfig {
    fn default() -> Self {
        Self {
            timestamp_window: TimestampWindow::default(),
            value_rules: MetricValueRules::default(),
            require_timestamp: true,
        }
    }
}

/// Semantic drop reasons, distinct from the parse-stage taxonomy.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum MetricsValidationDrop {
    #[error("timestamp required but absent")]
    TimestampMissing,

    #[error("timestamp older than the accepted window")]
    TimestampTooOld,

    #[error("timestamp further in the future than allowed")]
    TimestampInFuture,

    #[error("agent_id is empty")]
    AgentIdEmpty,

    #[error("agent_id exceeds {MAX_AGENT_ID_LEN} bytes")]
    AgentIdTooLong,

    #[error("agent_id does not match ^[A-Za-z][A-Za-z0-9_-]{{0,63}}$")]
    AgentIdInvalidFormat,

    #[error("metric value is NaN")]
    MetricValueNaN,

    #[error("metric value is infinite")]
    MetricValueInfinity,

    #[error("metric value below configured minimum")]
    MetricValueTooLow,

    #[error("metric value above configured maximum")]
    MetricValueTooHigh,

    #[error("metric name is empty")]
    MetricNameEmpty,
}

impl MetricsValidationDrop {
    /// Stable label used as a counter key.
    pub fn label(self) -> &'static str {
        match self {
            MetricsValidationDrop::TimestampMissing => "timestamp_missing",
            MetricsValidationDrop::TimestampTooOld => "timestamp_too_old",
            MetricsValidationDrop::TimestampInFuture => "timestamp_in_future",
            MetricsValidationDrop::AgentIdEmpty => "agent_id_empty",
            MetricsValidationDrop::AgentIdTooLong => "agent_id_too_long",
            MetricsValidationDrop::AgentIdInvalidFormat => "agent_id_invalid_format",
            MetricsValidationDrop::MetricValueNaN => "metric_value_nan",
            MetricsValidationDrop::MetricValueInfinity => "metric_value_infinity",
            MetricsValidationDrop::MetricValueTooLow => "metric_value_too_low",
            MetricsValidationDrop::MetricValueTooHigh => "metric_value_too_high",
            MetricsValidationDrop::MetricNameEmpty => "metric_name_empty",
        }
    }
}

/// A semantically valid metrics message. Borrows the parsed data; produced
/// immediately before serialization, so it never outlives the parse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedMetrics<'a> {
    pub agent_id: &'a str,
    pub seq: u32,
    pub ts: u64,
    pub metrics: &'a [Metric<'a>],
}

/// Validates a parsed metrics message against `config` at wall-clock time
/// `now_ms` (milliseconds since epoch).
pub fn validate_metrics<'a>(
    parsed: &'a ParsedMetrics<'a>,
    config: &MetricsValidationConfig,
    now_ms: u64,
) -> Result<ValidatedMetrics<'a>, MetricsValidationDrop> {
    if parsed.agent_id.is_empty() {
        return Err(MetricsValidationDrop::AgentIdEmpty);
    }
    if parsed.agent_id.len() > MAX_AGENT_ID_LEN {
        return Err(MetricsValidationDrop::AgentIdTooLong);
    }
    if !agent_id_format_ok(parsed.agent_id) {
        return Err(MetricsValidationDrop::AgentIdInvalidFormat);
    }

    if config.require_timestamp && parsed.ts == 0 {
        return Err(MetricsValidationDrop::TimestampMissing);
    }
    if parsed.ts != 0 && !config.timestamp_window.contains(parsed.ts, now_ms) {
        if parsed.ts < config.timestamp_window.min_allowed(now_ms) {
            return Err(MetricsValidationDrop::TimestampTooOld);
        }
        return Err(MetricsValidationDrop::TimestampInFuture);
    }

    let rules = &config.value_rules;
    for metric in parsed.metrics() {
        if metric.name.is_empty() {
            return Err(MetricsValidationDrop::MetricNameEmpty);
        }
        if rules.reject_nan && metric.value.is_nan() {
            return Err(MetricsValidationDrop::MetricValueNaN);
        }
        if rules.reject_infinity && metric.value.is_infinite() {
            return Err(MetricsValidationDrop::MetricValueInfinity);
        }
        if metric.value.is_finite() {
            if metric.value < rules.min_value {
                return Err(MetricsValidationDrop::MetricValueTooLow);
            }
            if metric.value > rules.max_value {
                return Err(MetricsValidationDrop::MetricValueTooHigh);
            }
        }
    }

    Ok(ValidatedMetrics {
        agent_id: parsed.agent_id,
        seq: parsed.seq,
        ts: parsed.ts,
        metrics: parsed.metrics(),
    })
}
