// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end pipeline scenarios with literal datagrams.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use telemetry_gateway::clock::Clock;
use telemetry_gateway::config::{ForwarderConfig, GatewayConfig, SourceLimiterConfig};
use telemetry_gateway::envelope::EnvelopeDrop;
use telemetry_gateway::forwarder::EventKind;
use telemetry_gateway::metrics::validator::MetricsValidationDrop;
use telemetry_gateway::pipeline::{DropCause, Outcome, Pipeline};
use telemetry_gateway::sink::{FailingSink, NullSink, RecordingSink};
use telemetry_gateway::source_limiter::{SourceKey, SourceLimiter};

const NOW_MS: u64 = 1_705_689_600_000;

/// Test clock that only moves when advanced.
#[derive(Clone)]
struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }
}

fn source(octet: u8) -> SourceKey {
    SourceKey::new(Ipv4Addr::new(203, 0, 113, octet), 40000)
}

fn framed(body: &[u8]) -> Vec<u8> {
    let mut datagram = (body.len() as u16).to_be_bytes().to_vec();
    datagram.extend_from_slice(body);
    datagram
}

#[test]
fn scenario_a_json_fragment_with_matching_header() {
    // 0x0014 = 20 declared, followed by exactly 20 bytes of JSON fragment.
    let datagram: Vec<u8> = vec![
        0x00, 0x14, 0x7b, 0x22, 0x61, 0x67, 0x65, 0x6e, 0x74, 0x5f, 0x69, 0x64, 0x22,
        0x3a, 0x22, 0x41, 0x22, 0x2c, 0x22, 0x73, 0x65, 0x71,
    ];
    assert_eq!(datagram.len(), 22);

    // The full 22 bytes frame correctly; the fragment then dies in the
    // JSON reader.
    let mut p = Pipeline::new(&GatewayConfig::default(), Box::new(NullSink::default()));
    match p.ingest(&datagram, source(1), NOW_MS) {
        Outcome::Dropped(DropCause::MetricsParse(_)) => {}
        other => panic!("expected a metrics parse drop, got {other:?}"),
    }

    // Any short delivery of the same datagram is a framing failure.
    let mut p = Pipeline::new(&GatewayConfig::default(), Box::new(NullSink::default()));
    assert_eq!(
        p.ingest(&datagram[..20], source(1), NOW_MS),
        Outcome::Dropped(DropCause::Envelope(EnvelopeDrop::LengthMismatch))
    );
}

#[test]
fn scenario_b_metrics_without_timestamp_rejected_semantically() {
    let mut p = Pipeline::new(&GatewayConfig::default(), Box::new(NullSink::default()));
    let body = br#"{"agent_id":"A","seq":1,"metrics":[]}"#;
    assert_eq!(
        p.ingest(&framed(body), source(1), NOW_MS),
        Outcome::Dropped(DropCause::MetricsValidation(
            MetricsValidationDrop::TimestampMissing
        ))
    );
}

#[test]
fn scenario_c_log_line_reaches_sink_verbatim() {
    let (sink, received) = RecordingSink::new();
    let mut p = Pipeline::new(&GatewayConfig::default(), Box::new(sink));
    let body = format!(r#"ts={NOW_MS} level=info msg="hello world""#);

    assert_eq!(
        p.ingest(&framed(body.as_bytes()), source(1), NOW_MS),
        Outcome::Forwarded(EventKind::Log)
    );
    assert_eq!(p.drain_all(), 1);

    let received = received.lock().unwrap();
    let event: serde_json::Value = serde_json::from_slice(&received[0]).unwrap();
    assert_eq!(event["msg"], "hello world");
    assert_eq!(event["level"], "info");
    assert_eq!(event["ts"], NOW_MS);
}

#[test]
fn scenario_d_burst_bounded_by_bucket_plus_refill() {
    let clock = ManualClock::new();
    let mut config = GatewayConfig::default();
    config.source_limiter = SourceLimiterConfig {
        max_sources: 64,
        tokens_per_sec: 50,
        burst_tokens: 100,
    };
    let limiter =
        SourceLimiter::with_clock(config.source_limiter, Box::new(clock.clone()));
    let mut p = Pipeline::with_limiter(&config, Box::new(NullSink::default()), limiter);

    let body = format!("ts={NOW_MS} level=info msg=x");
    let datagram = framed(body.as_bytes());

    let mut admitted = 0u32;
    let mut first_drop_at = None;
    // 200 datagrams spread over exactly one second.
    for i in 0..200u32 {
        clock.advance(Duration::from_millis(5));
        match p.ingest(&datagram, source(7), NOW_MS) {
            Outcome::Forwarded(_) => admitted += 1,
            Outcome::Dropped(DropCause::SourceRateLimited) => {
                first_drop_at.get_or_insert(i);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        p.drain_all();
    }

    // The initial burst clears in full before the first drop.
    assert!(first_drop_at.unwrap() >= 100);
    // Over any 1-second window: at most burst + ceil(rate * 1s).
    assert!(admitted <= 151, "admitted {admitted}");
    assert!(admitted >= 100, "admitted {admitted}");
    assert_eq!(
        p.stats().drops.source_rate_limited,
        u64::from(200 - admitted)
    );
}

#[test]
fn scenario_e_quota_bounds_one_agent_until_drain() {
    let mut config = GatewayConfig::default();
    config.forwarder = ForwarderConfig {
        max_queue_depth: 10,
        max_per_agent: 2,
    };
    let mut p = Pipeline::new(&config, Box::new(NullSink::default()));

    let body = format!(
        r#"{{"agent_id":"A","seq":1,"ts":{NOW_MS},"metrics":[{{"n":"m","v":1}}]}}"#
    );
    let datagram = framed(body.as_bytes());

    assert_eq!(
        p.ingest(&datagram, source(1), NOW_MS),
        Outcome::Forwarded(EventKind::Metrics)
    );
    assert_eq!(
        p.ingest(&datagram, source(1), NOW_MS),
        Outcome::Forwarded(EventKind::Metrics)
    );
    assert_eq!(
        p.ingest(&datagram, source(1), NOW_MS),
        Outcome::Dropped(DropCause::AgentQuotaExceeded)
    );

    assert!(p.drain_one());
    assert_eq!(
        p.ingest(&datagram, source(1), NOW_MS),
        Outcome::Forwarded(EventKind::Metrics)
    );
}

#[test]
fn scenario_f_failing_sink_progresses_and_releases_quota() {
    let mut p = Pipeline::new(&GatewayConfig::default(), Box::new(FailingSink::default()));
    let body = format!("ts={NOW_MS} level=error agent=node-1 msg=down");

    assert_eq!(
        p.ingest(&framed(body.as_bytes()), source(1), NOW_MS),
        Outcome::Forwarded(EventKind::Log)
    );
    assert!(p.drain_one());

    let stats = p.stats();
    assert_eq!(stats.forwarder.sink_failures, 1);
    assert_eq!(stats.forwarder.forwarded, 0);
    assert_eq!(p.forwarder().quota_tracker().in_flight_count("node-1"), 0);
    assert_eq!(p.queue_depth(), 0);
}

#[test]
fn queue_full_drop_from_second_agent_retains_no_quota() {
    // Boundary behavior 5: depth 1, generous per-agent quota.
    let mut config = GatewayConfig::default();
    config.forwarder = ForwarderConfig {
        max_queue_depth: 1,
        max_per_agent: 10,
    };
    let mut p = Pipeline::new(&config, Box::new(NullSink::default()));

    let body_a = format!("ts={NOW_MS} level=info agent=agent-a msg=one");
    let body_b = format!("ts={NOW_MS} level=info agent=agent-b msg=two");

    assert_eq!(
        p.ingest(&framed(body_a.as_bytes()), source(1), NOW_MS),
        Outcome::Forwarded(EventKind::Log)
    );
    assert_eq!(
        p.ingest(&framed(body_b.as_bytes()), source(2), NOW_MS),
        Outcome::Dropped(DropCause::QueueFull)
    );
    assert_eq!(p.forwarder().quota_tracker().in_flight_count("agent-b"), 0);
}

#[test]
fn mixed_traffic_keeps_per_reason_counters() {
    let mut p = Pipeline::new(&GatewayConfig::default(), Box::new(NullSink::default()));

    let good_log = format!("ts={NOW_MS} level=info msg=ok");
    let stale_log = format!("ts={} level=info msg=old", NOW_MS - 10_000_000);
    let bad_level = format!("ts={NOW_MS} level=shout msg=ok");

    let _ = p.ingest(&framed(good_log.as_bytes()), source(1), NOW_MS);
    let _ = p.ingest(&framed(stale_log.as_bytes()), source(1), NOW_MS);
    let _ = p.ingest(&framed(bad_level.as_bytes()), source(1), NOW_MS);
    let _ = p.ingest(b"", source(1), NOW_MS);

    let stats = p.stats();
    assert_eq!(stats.ingested, 4);
    assert_eq!(stats.drops.total(), 3);
    assert_eq!(
        stats.drops.log_validation.get("timestamp_too_old"),
        Some(&1)
    );
    assert_eq!(stats.drops.log_parse.get("invalid_level"), Some(&1));
    assert_eq!(stats.drops.envelope.get("payload_too_small"), Some(&1));
    assert_eq!(stats.forwarder.forwarded, 0);
    assert_eq!(stats.forwarder.queue_depth, 1);
}
