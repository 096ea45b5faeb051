// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Serialization boundary between borrowed views and owned events.
//!
//! Everything upstream of the forwarder borrows from the receive buffer.
//! Here a validated message is copied out into one owned JSON line, which
//! becomes the queued event payload; after this point the buffer may be
//! reused.

use serde_json::{json, Map, Value};

use crate::logs::validator::ValidatedLog;
use crate::metrics::validator::ValidatedMetrics;

/// Serializes a validated metrics message into an owned JSON line.
pub fn metrics_event(validated: &ValidatedMetrics<'_>) -> Vec<u8> {
    let metrics: Vec<Value> = validated
        .metrics
        .iter()
        .map(|metric| {
            let mut entry = Map::new();
            entry.insert("n".to_owned(), json!(metric.name));
            entry.insert("v".to_owned(), json!(metric.value));
            if let Some(unit) = metric.unit {
                entry.insert("u".to_owned(), json!(unit));
            }
            if !metric.tags().is_empty() {
                let tags: Map<String, Value> = metric
                    .tags()
                    .iter()
                    .map(|tag| (tag.key.to_owned(), json!(tag.value)))
                    .collect();
                entry.insert("t".to_owned(), Value::Object(tags));
            }
            Value::Object(entry)
        })
        .collect();

    json!({
        "kind": "metrics",
        "agent_id": validated.agent_id,
        "seq": validated.seq,
        "ts": validated.ts,
        "metrics": metrics,
    })
    .to_string()
    .into_bytes()
}

/// Serializes a validated log into an owned JSON line.
///
/// The pass-through `fields` object carries only keys that are not already
/// promoted to the top level; it is omitted entirely when empty, as is an
/// absent agent identifier.
pub fn log_event(validated: &ValidatedLog<'_>) -> Vec<u8> {
    let mut event = Map::new();
    event.insert("kind".to_owned(), json!("log"));
    if !validated.agent_id.is_empty() {
        event.insert("agent_id".to_owned(), json!(validated.agent_id));
    }
    event.insert("ts".to_owned(), json!(validated.ts));
    event.insert("level".to_owned(), json!(validated.level.as_str()));
    event.insert("msg".to_owned(), json!(validated.msg));

    let fields: Map<String, Value> = validated
        .fields
        .iter()
        .filter(|field| !matches!(field.key, "ts" | "level" | "msg" | "agent"))
        .map(|field| (field.key.to_owned(), json!(field.value)))
        .collect();
    if !fields.is_empty() {
        event.insert("fields".to_owned(), Value::Object(fields));
    }

    Value::Object(event).to_string().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::parser::parse_log;
    use crate::logs::validator::{validate_log, LogValidationConfig};
    use crate::metrics::parser::parse_metrics;
    use crate::metrics::validator::{validate_metrics, MetricsValidationConfig};

    const NOW_MS: u64 = 1_705_689_600_000;

    #[test]
    fn metrics_line_shape() {
        let json_in = format!(
            r#"{{"agent_id":"node-1","seq":3,"ts":{NOW_MS},
                "metrics":[{{"n":"cpu","v":0.5,"u":"ratio","t":{{"core":"0"}}}},
                           {{"n":"up","v":1}}]}}"#
        );
        let parsed = parse_metrics(json_in.as_bytes()).unwrap();
        let validated =
            validate_metrics(&parsed, &MetricsValidationConfig::default(), NOW_MS).unwrap();

        let line = metrics_event(&validated);
        let value: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(value["kind"], "metrics");
        assert_eq!(value["agent_id"], "node-1");
        assert_eq!(value["seq"], 3);
        assert_eq!(value["metrics"][0]["n"], "cpu");
        assert_eq!(value["metrics"][0]["t"]["core"], "0");
        // Absent unit and tags stay absent rather than serializing empty.
        assert!(value["metrics"][1].get("u").is_none());
        assert!(value["metrics"][1].get("t").is_none());
    }

    #[test]
    fn log_line_shape() {
        let line_in = format!(
            r#"ts={NOW_MS} level=warn agent=node-2 msg="disk low" mount=/var free_mb=120"#
        );
        let parsed = parse_log(line_in.as_bytes()).unwrap();
        let validated =
            validate_log(&parsed, &LogValidationConfig::default(), NOW_MS).unwrap();

        let line = log_event(&validated);
        let value: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(value["kind"], "log");
        assert_eq!(value["agent_id"], "node-2");
        assert_eq!(value["level"], "warn");
        assert_eq!(value["msg"], "disk low");
        assert_eq!(value["fields"]["mount"], "/var");
        assert_eq!(value["fields"]["free_mb"], "120");
        // Promoted keys are not duplicated inside fields.
        assert!(value["fields"].get("ts").is_none());
    }

    #[test]
    fn log_without_agent_or_extras_is_minimal() {
        let line_in = format!("ts={NOW_MS} level=info msg=ok");
        let parsed = parse_log(line_in.as_bytes()).unwrap();
        let validated =
            validate_log(&parsed, &LogValidationConfig::default(), NOW_MS).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&log_event(&validated)).unwrap();
        assert!(value.get("agent_id").is_none());
        assert!(value.get("fields").is_none());
    }
}
