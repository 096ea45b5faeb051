// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The ingest pipeline: admission through forwarding, wired together.
//!
//! A datagram that arrived through the receive loop flows strictly
//! forward: source admission, envelope framing, type-dispatched parsing,
//! semantic validation, then bounded forwarding. Each stage either refines
//! the value for the next or terminates the datagram with a named reason;
//! the pipeline bumps exactly one drop counter per terminated datagram and
//! nothing downstream of the failing stage runs.
//!
//! The envelope body's first non-whitespace byte selects the parser: `{`
//! means metrics JSON, anything else is treated as a logfmt line.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::envelope::{parse_envelope, EnvelopeDrop};
use crate::forwarder::{
    BoundedForwarder, EventKind, ForwardResult, ForwarderStats, QueuedEvent,
};
use crate::logs::parser::{parse_log, LogParseDrop};
use crate::logs::validator::{validate_log, LogValidationConfig, LogValidationDrop};
use crate::metrics::parser::{parse_metrics, MetricsParseDrop};
use crate::metrics::validator::{
    validate_metrics, MetricsValidationConfig, MetricsValidationDrop,
};
use crate::serialize;
use crate::sink::Sink;
use crate::source_limiter::{Admit, SourceKey, SourceLimiter, SourceLimiterStats};

/// Why a datagram terminated before reaching the sink queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropCause {
    /// The source endpoint exhausted its token budget.
    SourceRateLimited,
    /// Envelope framing failure.
    Envelope(EnvelopeDrop),
    /// Metrics parse failure.
    MetricsParse(MetricsParseDrop),
    /// Metrics semantic failure.
    MetricsValidation(MetricsValidationDrop),
    /// Log parse failure.
    LogParse(LogParseDrop),
    /// Log semantic failure.
    LogValidation(LogValidationDrop),
    /// Global queue at capacity.
    QueueFull,
    /// Agent over its fairness quota.
    AgentQuotaExceeded,
}

impl DropCause {
    /// Stable `stage/reason` label used as a counter key and in logs.
    pub fn label(self) -> String {
        match self {
            DropCause::SourceRateLimited => "source/rate_limited".to_owned(),
            DropCause::Envelope(reason) => format!("envelope/{}", reason.label()),
            DropCause::MetricsParse(reason) => {
                format!("metrics_parse/{}", reason.label())
            }
            DropCause::MetricsValidation(reason) => {
                format!("metrics_validation/{}", reason.label())
            }
            DropCause::LogParse(reason) => format!("log_parse/{}", reason.label()),
            DropCause::LogValidation(reason) => {
                format!("log_validation/{}", reason.label())
            }
            DropCause::QueueFull => "forward/queue_full".to_owned(),
            DropCause::AgentQuotaExceeded => "forward/agent_quota".to_owned(),
        }
    }
}

/// Terminal state of one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Queued for the sink.
    Forwarded(EventKind),
    /// Terminated with a named reason.
    Dropped(DropCause),
}

/// Per-reason drop counters, grouped by stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DropCounters {
    pub source_rate_limited: u64,
    pub envelope: BTreeMap<&'static str, u64>,
    pub metrics_parse: BTreeMap<&'static str, u64>,
    pub metrics_validation: BTreeMap<&'static str, u64>,
    pub log_parse: BTreeMap<&'static str, u64>,
    pub log_validation: BTreeMap<&'static str, u64>,
    pub queue_full: u64,
    pub agent_quota: u64,
}

impl DropCounters {
    fn record(&mut self, cause: DropCause) {
        match cause {
            DropCause::SourceRateLimited => self.source_rate_limited += 1,
            DropCause::Envelope(reason) => {
                *self.envelope.entry(reason.label()).or_insert(0) += 1;
            }
            DropCause::MetricsParse(reason) => {
                *self.metrics_parse.entry(reason.label()).or_insert(0) += 1;
            }
            DropCause::MetricsValidation(reason) => {
                *self.metrics_validation.entry(reason.label()).or_insert(0) += 1;
            }
            DropCause::LogParse(reason) => {
                *self.log_parse.entry(reason.label()).or_insert(0) += 1;
            }
            DropCause::LogValidation(reason) => {
                *self.log_validation.entry(reason.label()).or_insert(0) += 1;
            }
            DropCause::QueueFull => self.queue_full += 1,
            DropCause::AgentQuotaExceeded => self.agent_quota += 1,
        }
    }

    /// Total datagrams dropped across all stages.
    pub fn total(&self) -> u64 {
        self.source_rate_limited
            + self.envelope.values().sum::<u64>()
            + self.metrics_parse.values().sum::<u64>()
            + self.metrics_validation.values().sum::<u64>()
            + self.log_parse.values().sum::<u64>()
            + self.log_validation.values().sum::<u64>()
            + self.queue_full
            + self.agent_quota
    }
}

/// Counter snapshot across the pipeline stages.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub ingested: u64,
    pub source: SourceLimiterStats,
    pub drops: DropCounters,
    pub forwarder: ForwarderStats,
}

/// The post-receive stages, wired together over one sink.
pub struct Pipeline {
    limiter: SourceLimiter,
    forwarder: BoundedForwarder,
    metrics_validation: MetricsValidationConfig,
    log_validation: LogValidationConfig,
    drops: DropCounters,
    ingested: u64,
}

impl Pipeline {
    /// Builds the pipeline from config, owning `sink`.
    pub fn new(config: &GatewayConfig, sink: Box<dyn Sink>) -> Self {
        Self::with_limiter(config, sink, SourceLimiter::new(config.source_limiter))
    }

    /// Variant with an injected source limiter, used by tests that need a
    /// deterministic clock.
    pub fn with_limiter(
        config: &GatewayConfig,
        sink: Box<dyn Sink>,
        limiter: SourceLimiter,
    ) -> Self {
        Self {
            limiter,
            forwarder: BoundedForwarder::new(config.forwarder, sink),
            metrics_validation: config.metrics_validation,
            log_validation: config.log_validation,
            drops: DropCounters::default(),
            ingested: 0,
        }
    }

    /// Runs one received datagram through admission, framing, parsing,
    /// validation, and forwarding.
    ///
    /// `now_ms` is the host's wall clock in milliseconds since epoch, used
    /// only for timestamp-window validation. Exactly one counter is bumped
    /// for the reason a datagram terminates.
    pub fn ingest(&mut self, payload: &[u8], source: SourceKey, now_ms: u64) -> Outcome {
        self.ingested += 1;
        let outcome = self.run_stages(payload, source, now_ms);
        if let Outcome::Dropped(cause) = outcome {
            self.drops.record(cause);
            debug!(%source, reason = %cause.label(), "datagram dropped");
        }
        outcome
    }

    fn run_stages(&mut self, payload: &[u8], source: SourceKey, now_ms: u64) -> Outcome {
        if self.limiter.admit(source) == Admit::Drop {
            return Outcome::Dropped(DropCause::SourceRateLimited);
        }

        let body = match parse_envelope(payload) {
            Ok(body) => body,
            Err(reason) => return Outcome::Dropped(DropCause::Envelope(reason)),
        };

        let event = if looks_like_json(body) {
            match self.build_metrics_event(body, now_ms) {
                Ok(event) => event,
                Err(cause) => return Outcome::Dropped(cause),
            }
        } else {
            match self.build_log_event(body, now_ms) {
                Ok(event) => event,
                Err(cause) => return Outcome::Dropped(cause),
            }
        };

        let kind = event.kind;
        match self.forwarder.try_forward(event) {
            ForwardResult::Queued => Outcome::Forwarded(kind),
            ForwardResult::DroppedQueueFull => Outcome::Dropped(DropCause::QueueFull),
            ForwardResult::DroppedAgentQuotaExceeded => {
                Outcome::Dropped(DropCause::AgentQuotaExceeded)
            }
        }
    }

    fn build_metrics_event(
        &self,
        body: &[u8],
        now_ms: u64,
    ) -> Result<QueuedEvent, DropCause> {
        let parsed = parse_metrics(body).map_err(DropCause::MetricsParse)?;
        let validated = validate_metrics(&parsed, &self.metrics_validation, now_ms)
            .map_err(DropCause::MetricsValidation)?;
        Ok(QueuedEvent {
            agent_id: validated.agent_id.to_owned(),
            kind: EventKind::Metrics,
            payload: serialize::metrics_event(&validated),
        })
    }

    fn build_log_event(&self, body: &[u8], now_ms: u64) -> Result<QueuedEvent, DropCause> {
        let parsed = parse_log(body).map_err(DropCause::LogParse)?;
        let validated = validate_log(&parsed, &self.log_validation, now_ms)
            .map_err(DropCause::LogValidation)?;
        Ok(QueuedEvent {
            agent_id: validated.agent_id.to_owned(),
            kind: EventKind::Log,
            payload: serialize::log_event(&validated),
        })
    }

    /// Writes one queued event to the sink; false when the queue is empty.
    pub fn drain_one(&mut self) -> bool {
        self.forwarder.drain_one()
    }

    /// Flushes the whole queue to the sink; returns the number drained.
    pub fn drain_all(&mut self) -> usize {
        self.forwarder.drain_all()
    }

    pub fn flush_sink(&mut self) {
        self.forwarder.flush_sink();
    }

    pub fn queue_depth(&self) -> usize {
        self.forwarder.queue_depth()
    }

    pub fn forwarder(&self) -> &BoundedForwarder {
        &self.forwarder
    }

    pub fn source_limiter(&self) -> &SourceLimiter {
        &self.limiter
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            ingested: self.ingested,
            source: self.limiter.stats(),
            drops: self.drops.clone(),
            forwarder: self.forwarder.stats(),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("ingested", &self.ingested)
            .field("queue_depth", &self.forwarder.queue_depth())
            .finish()
    }
}

/// Parser dispatch: a body opening with `{` is metrics JSON.
fn looks_like_json(body: &[u8]) -> bool {
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'{')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullSink;
    use std::net::Ipv4Addr;

    const NOW_MS: u64 = 1_705_689_600_000;

    fn source(octet: u8) -> SourceKey {
        SourceKey::new(Ipv4Addr::new(192, 0, 2, octet), 5000)
    }

    fn framed(body: &[u8]) -> Vec<u8> {
        let mut datagram = (body.len() as u16).to_be_bytes().to_vec();
        datagram.extend_from_slice(body);
        datagram
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(&GatewayConfig::default(), Box::new(NullSink::default()))
    }

    #[test]
    fn metrics_datagram_flows_to_queue() {
        let mut p = pipeline();
        let body = format!(
            r#"{{"agent_id":"node-1","seq":1,"ts":{NOW_MS},"metrics":[{{"n":"cpu","v":1}}]}}"#
        );
        let outcome = p.ingest(&framed(body.as_bytes()), source(1), NOW_MS);
        assert_eq!(outcome, Outcome::Forwarded(EventKind::Metrics));
        assert_eq!(p.queue_depth(), 1);
        assert_eq!(p.drain_all(), 1);
    }

    #[test]
    fn log_datagram_flows_to_queue() {
        let mut p = pipeline();
        let body = format!("ts={NOW_MS} level=info msg=hello");
        let outcome = p.ingest(&framed(body.as_bytes()), source(1), NOW_MS);
        assert_eq!(outcome, Outcome::Forwarded(EventKind::Log));
    }

    #[test]
    fn leading_whitespace_still_dispatches_to_metrics() {
        let mut p = pipeline();
        let body = format!(
            "  \t{{\"agent_id\":\"A\",\"seq\":1,\"ts\":{NOW_MS},\"metrics\":[]}}"
        );
        let outcome = p.ingest(&framed(body.as_bytes()), source(1), NOW_MS);
        assert_eq!(outcome, Outcome::Forwarded(EventKind::Metrics));
    }

    #[test]
    fn framing_failure_counted_once() {
        let mut p = pipeline();
        let outcome = p.ingest(&[0x00], source(1), NOW_MS);
        assert_eq!(
            outcome,
            Outcome::Dropped(DropCause::Envelope(EnvelopeDrop::PayloadTooSmall))
        );
        let stats = p.stats();
        assert_eq!(stats.drops.envelope.get("payload_too_small"), Some(&1));
        assert_eq!(stats.drops.total(), 1);
        assert_eq!(stats.ingested, 1);
    }

    #[test]
    fn empty_body_is_a_log_parse_drop() {
        let mut p = pipeline();
        let outcome = p.ingest(&framed(b""), source(1), NOW_MS);
        assert_eq!(
            outcome,
            Outcome::Dropped(DropCause::LogParse(LogParseDrop::EmptyInput))
        );
    }

    #[test]
    fn semantic_failure_stops_before_forwarder() {
        let mut p = pipeline();
        let body = r#"{"agent_id":"A","seq":1,"metrics":[]}"#;
        let outcome = p.ingest(&framed(body.as_bytes()), source(1), NOW_MS);
        assert_eq!(
            outcome,
            Outcome::Dropped(DropCause::MetricsValidation(
                MetricsValidationDrop::TimestampMissing
            ))
        );
        assert_eq!(p.queue_depth(), 0);
        assert_eq!(p.stats().forwarder.forwarded, 0);
    }

    #[test]
    fn drop_labels_are_stage_qualified() {
        assert_eq!(
            DropCause::Envelope(EnvelopeDrop::TrailingJunk).label(),
            "envelope/trailing_junk"
        );
        assert_eq!(
            DropCause::LogParse(LogParseDrop::InvalidLevel).label(),
            "log_parse/invalid_level"
        );
        assert_eq!(DropCause::QueueFull.label(), "forward/queue_full");
    }

    #[test]
    fn stats_serialize_to_json() {
        let mut p = pipeline();
        let _ = p.ingest(&framed(b"garbage"), source(1), NOW_MS);
        let value = serde_json::to_value(p.stats()).unwrap();
        assert_eq!(value["ingested"], 1);
        assert!(value["drops"]["log_parse"].is_object());
    }
}
