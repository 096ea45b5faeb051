// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded single-pass JSON reader for the metrics schema.
//!
//! This is deliberately not a general JSON parser. It validates syntax and
//! extracts the fixed metrics schema in one pass, without building a tree:
//! string fields stay views into the input, child records land in inline
//! fixed-length arrays, and every cap below is enforced while reading.
//! Untrusted input therefore drives neither allocation nor unbounded
//! iteration.
//!
//! Schema (strict, unknown fields rejected):
//!
//! ```json
//! {"agent_id":"node-1","seq":7,"ts":1705689600000,
//!  "metrics":[{"n":"cpu","v":0.93,"u":"ratio","t":{"core":"0"}}]}
//! ```

/// Maximum accepted input size, in bytes.
pub const MAX_INPUT_BYTES: usize = 65536;
/// Maximum container nesting depth below the root object.
pub const MAX_NESTING_DEPTH: usize = 4;
/// Maximum entries in the `metrics` array.
pub const MAX_METRICS: usize = 50;
/// Maximum tags per metric.
pub const MAX_TAGS: usize = 8;
/// Maximum `agent_id` length accepted at parse time.
pub const MAX_AGENT_ID_LEN: usize = 64;
/// Maximum metric name length.
pub const MAX_METRIC_NAME_LEN: usize = 128;
/// Maximum unit string length.
pub const MAX_UNIT_LEN: usize = 16;
/// Maximum tag key length.
pub const MAX_TAG_KEY_LEN: usize = 64;
/// Maximum tag value length.
pub const MAX_TAG_VALUE_LEN: usize = 64;

/// Parse-stage drop reasons. Closed taxonomy: every rejected payload maps
/// to exactly one variant, counted by the pipeline.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum MetricsParseDrop {
    #[error("input exceeds {MAX_INPUT_BYTES} bytes")]
    InputTooLarge,

    #[error("malformed JSON")]
    InvalidJson,

    #[error("nesting exceeds depth {MAX_NESTING_DEPTH}")]
    NestingTooDeep,

    #[error("agent_id, seq, or metrics missing")]
    MissingRequiredField,

    #[error("agent_id exceeds {MAX_AGENT_ID_LEN} bytes")]
    AgentIdTooLong,

    #[error("agent_id contains characters outside [A-Za-z0-9_.-]")]
    AgentIdInvalidChars,

    #[error("metrics array exceeds {MAX_METRICS} entries")]
    TooManyMetrics,

    #[error("metric name exceeds {MAX_METRIC_NAME_LEN} bytes")]
    MetricNameTooLong,

    #[error("metric missing \"n\" field")]
    MetricMissingName,

    #[error("metric missing \"v\" field")]
    MetricMissingValue,

    #[error("metric \"v\" is not a number")]
    MetricValueNotNumber,

    #[error("unit exceeds {MAX_UNIT_LEN} bytes")]
    UnitTooLong,

    #[error("tags exceed {MAX_TAGS} entries")]
    TooManyTags,

    #[error("tag key exceeds {MAX_TAG_KEY_LEN} bytes")]
    TagKeyTooLong,

    #[error("tag value exceeds {MAX_TAG_VALUE_LEN} bytes")]
    TagValueTooLong,

    #[error("field not in schema")]
    UnexpectedField,

    #[error("field has wrong type")]
    InvalidFieldType,
}

impl MetricsParseDrop {
    /// Stable label used as a counter key.
    pub fn label(self) -> &'static str {
        match self {
            MetricsParseDrop::InputTooLarge => "input_too_large",
            MetricsParseDrop::InvalidJson => "invalid_json",
            MetricsParseDrop::NestingTooDeep => "nesting_too_deep",
            MetricsParseDrop::MissingRequiredField => "missing_required_field",
            MetricsParseDrop::AgentIdTooLong => "agent_id_too_long",
            MetricsParseDrop::AgentIdInvalidChars => "agent_id_invalid_chars",
            MetricsParseDrop::TooManyMetrics => "too_many_metrics",
            MetricsParseDrop::MetricNameTooLong => "metric_name_too_long",
            MetricsParseDrop::MetricMissingName => "metric_missing_name",
            MetricsParseDrop::MetricMissingValue => "metric_missing_value",
            MetricsParseDrop::MetricValueNotNumber => "metric_value_not_number",
            MetricsParseDrop::UnitTooLong => "unit_too_long",
            MetricsParseDrop::TooManyTags => "too_many_tags",
            MetricsParseDrop::TagKeyTooLong => "tag_key_too_long",
            MetricsParseDrop::TagValueTooLong => "tag_value_too_long",
            MetricsParseDrop::UnexpectedField => "unexpected_field",
            MetricsParseDrop::InvalidFieldType => "invalid_field_type",
        }
    }
}

/// One tag pair, borrowed from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricTag<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

const EMPTY_TAG: MetricTag<'static> = MetricTag { key: "", value: "" };

/// One metric entry, borrowed from the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metric<'a> {
    pub name: &'a str,
    pub value: f64,
    pub unit: Option<&'a str>,
    tags: [MetricTag<'a>; MAX_TAGS],
    tag_count: usize,
}

impl<'a> Metric<'a> {
    fn empty() -> Self {
        Self {
            name: "",
            value: 0.0,
            unit: None,
            tags: [EMPTY_TAG; MAX_TAGS],
            tag_count: 0,
        }
    }

    /// The populated tag entries.
    pub fn tags(&self) -> &[MetricTag<'a>] {
        &self.tags[..self.tag_count]
    }
}

/// A parsed metrics message. All string members borrow from the input
/// buffer; the struct itself is one fixed-size region.
#[derive(Debug, Clone)]
pub struct ParsedMetrics<'a> {
    pub agent_id: &'a str,
    pub seq: u32,
    /// Milliseconds since epoch; 0 when the payload omitted `ts`.
    pub ts: u64,
    metrics: [Metric<'a>; MAX_METRICS],
    metric_count: usize,
}

impl<'a> ParsedMetrics<'a> {
    /// The populated metric entries.
    pub fn metrics(&self) -> &[Metric<'a>] {
        &self.metrics[..self.metric_count]
    }

    #[cfg(test)]
    pub(crate) fn metrics_mut(&mut self) -> &mut [Metric<'a>] {
        &mut self.metrics[..self.metric_count]
    }
}

/// Parses a metrics payload from an envelope body.
pub fn parse_metrics(input: &[u8]) -> Result<ParsedMetrics<'_>, MetricsParseDrop> {
    if input.len() > MAX_INPUT_BYTES {
        return Err(MetricsParseDrop::InputTooLarge);
    }
    let text = std::str::from_utf8(input).map_err(|_| MetricsParseDrop::InvalidJson)?;
    Reader::new(text).parse_root()
}

/// Cursor over the input with a nesting-depth budget.
struct Reader<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> u8 {
        *self.input.as_bytes().get(self.pos).unwrap_or(&0)
    }

    fn advance(&mut self) -> u8 {
        let b = self.peek();
        if b != 0 {
            self.pos += 1;
        }
        b
    }

    fn expect(&mut self, b: u8) -> bool {
        if self.peek() == b {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), b' ' | b'\t' | b'\n' | b'\r') {
            self.pos += 1;
        }
    }

    fn enter(&mut self) -> Result<(), MetricsParseDrop> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(MetricsParseDrop::NestingTooDeep);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Reads a JSON string, returning a view into the input. Escapes are
    /// skipped, not decoded; the view carries them verbatim.
    fn read_string(&mut self) -> Option<&'a str> {
        if !self.expect(b'"') {
            return None;
        }
        let start = self.pos;
        loop {
            match self.peek() {
                0 => return None, // unterminated
                b'"' => {
                    let s = &self.input[start..self.pos];
                    self.pos += 1;
                    return Some(s);
                }
                b'\\' => {
                    self.pos += 1;
                    if self.pos < self.input.len() {
                        self.pos += 1;
                    }
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Reads an optionally signed integer.
    fn read_integer(&mut self) -> Option<i64> {
        let start = self.pos;
        if self.peek() == b'-' {
            self.pos += 1;
        }
        if !self.peek().is_ascii_digit() {
            return None;
        }
        while self.peek().is_ascii_digit() {
            self.pos += 1;
        }
        self.input[start..self.pos].parse().ok()
    }

    /// Reads a JSON number: optional sign, integer part, optional fraction
    /// and exponent.
    fn read_number(&mut self) -> Option<f64> {
        let start = self.pos;
        if self.peek() == b'-' {
            self.pos += 1;
        }
        if !self.peek().is_ascii_digit() {
            return None;
        }
        while self.peek().is_ascii_digit() {
            self.pos += 1;
        }
        if self.peek() == b'.' {
            self.pos += 1;
            while self.peek().is_ascii_digit() {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), b'e' | b'E') {
            self.pos += 1;
            if matches!(self.peek(), b'+' | b'-') {
                self.pos += 1;
            }
            while self.peek().is_ascii_digit() {
                self.pos += 1;
            }
        }
        self.input[start..self.pos].parse().ok()
    }

    fn parse_root(mut self) -> Result<ParsedMetrics<'a>, MetricsParseDrop> {
        self.skip_whitespace();
        if !self.expect(b'{') {
            return Err(MetricsParseDrop::InvalidJson);
        }

        let mut result = ParsedMetrics {
            agent_id: "",
            seq: 0,
            ts: 0,
            metrics: [Metric::empty(); MAX_METRICS],
            metric_count: 0,
        };
        let mut has_agent_id = false;
        let mut has_seq = false;
        let mut has_metrics = false;

        self.skip_whitespace();
        if self.peek() == b'}' {
            self.advance();
            return Err(MetricsParseDrop::MissingRequiredField);
        }

        loop {
            self.skip_whitespace();
            let key = self
                .read_string()
                .ok_or(MetricsParseDrop::InvalidJson)?;
            self.skip_whitespace();
            if !self.expect(b':') {
                return Err(MetricsParseDrop::InvalidJson);
            }
            self.skip_whitespace();

            match key {
                "agent_id" => {
                    let val = self
                        .read_string()
                        .ok_or(MetricsParseDrop::InvalidFieldType)?;
                    if val.len() > MAX_AGENT_ID_LEN {
                        return Err(MetricsParseDrop::AgentIdTooLong);
                    }
                    if !agent_id_chars_ok(val) {
                        return Err(MetricsParseDrop::AgentIdInvalidChars);
                    }
                    result.agent_id = val;
                    has_agent_id = true;
                }
                "seq" => {
                    let val = self
                        .read_integer()
                        .ok_or(MetricsParseDrop::InvalidFieldType)?;
                    result.seq = val as u32;
                    has_seq = true;
                }
                "ts" => {
                    let val = self
                        .read_integer()
                        .ok_or(MetricsParseDrop::InvalidFieldType)?;
                    result.ts = val as u64;
                }
                "metrics" => {
                    self.parse_metrics_array(&mut result)?;
                    has_metrics = true;
                }
                _ => return Err(MetricsParseDrop::UnexpectedField),
            }

            self.skip_whitespace();
            if self.peek() == b'}' {
                self.advance();
                break;
            }
            if !self.expect(b',') {
                return Err(MetricsParseDrop::InvalidJson);
            }
        }

        if !has_agent_id || !has_seq || !has_metrics {
            return Err(MetricsParseDrop::MissingRequiredField);
        }

        Ok(result)
    }

    fn parse_metrics_array(
        &mut self,
        result: &mut ParsedMetrics<'a>,
    ) -> Result<(), MetricsParseDrop> {
        if !self.expect(b'[') {
            return Err(MetricsParseDrop::InvalidFieldType);
        }
        self.enter()?;

        self.skip_whitespace();
        if self.peek() == b']' {
            self.advance();
            self.leave();
            return Ok(());
        }

        loop {
            if result.metric_count >= MAX_METRICS {
                return Err(MetricsParseDrop::TooManyMetrics);
            }
            let metric = self.parse_metric()?;
            result.metrics[result.metric_count] = metric;
            result.metric_count += 1;

            self.skip_whitespace();
            if self.peek() == b']' {
                self.advance();
                self.leave();
                return Ok(());
            }
            if !self.expect(b',') {
                return Err(MetricsParseDrop::InvalidJson);
            }
            self.skip_whitespace();
        }
    }

    fn parse_metric(&mut self) -> Result<Metric<'a>, MetricsParseDrop> {
        self.skip_whitespace();
        if !self.expect(b'{') {
            return Err(MetricsParseDrop::InvalidJson);
        }
        self.enter()?;

        let mut metric = Metric::empty();
        let mut has_name = false;
        let mut has_value = false;

        self.skip_whitespace();
        if self.peek() == b'}' {
            self.advance();
            self.leave();
            return Err(MetricsParseDrop::MetricMissingName);
        }

        loop {
            self.skip_whitespace();
            let key = self
                .read_string()
                .ok_or(MetricsParseDrop::InvalidJson)?;
            self.skip_whitespace();
            if !self.expect(b':') {
                return Err(MetricsParseDrop::InvalidJson);
            }
            self.skip_whitespace();

            match key {
                "n" => {
                    let val = self
                        .read_string()
                        .ok_or(MetricsParseDrop::InvalidFieldType)?;
                    if val.len() > MAX_METRIC_NAME_LEN {
                        return Err(MetricsParseDrop::MetricNameTooLong);
                    }
                    metric.name = val;
                    has_name = true;
                }
                "v" => {
                    metric.value = self
                        .read_number()
                        .ok_or(MetricsParseDrop::MetricValueNotNumber)?;
                    has_value = true;
                }
                "u" => {
                    let val = self
                        .read_string()
                        .ok_or(MetricsParseDrop::InvalidFieldType)?;
                    if val.len() > MAX_UNIT_LEN {
                        return Err(MetricsParseDrop::UnitTooLong);
                    }
                    metric.unit = Some(val);
                }
                "t" => self.parse_tags(&mut metric)?,
                _ => return Err(MetricsParseDrop::UnexpectedField),
            }

            self.skip_whitespace();
            if self.peek() == b'}' {
                self.advance();
                self.leave();
                break;
            }
            if !self.expect(b',') {
                return Err(MetricsParseDrop::InvalidJson);
            }
        }

        if !has_name {
            return Err(MetricsParseDrop::MetricMissingName);
        }
        if !has_value {
            return Err(MetricsParseDrop::MetricMissingValue);
        }

        Ok(metric)
    }

    fn parse_tags(&mut self, metric: &mut Metric<'a>) -> Result<(), MetricsParseDrop> {
        if !self.expect(b'{') {
            return Err(MetricsParseDrop::InvalidFieldType);
        }
        self.enter()?;

        self.skip_whitespace();
        if self.peek() == b'}' {
            self.advance();
            self.leave();
            return Ok(());
        }

        loop {
            if metric.tag_count >= MAX_TAGS {
                return Err(MetricsParseDrop::TooManyTags);
            }

            self.skip_whitespace();
            let key = self
                .read_string()
                .ok_or(MetricsParseDrop::InvalidJson)?;
            if key.len() > MAX_TAG_KEY_LEN {
                return Err(MetricsParseDrop::TagKeyTooLong);
            }

            self.skip_whitespace();
            if !self.expect(b':') {
                return Err(MetricsParseDrop::InvalidJson);
            }
            self.skip_whitespace();

            let value = self
                .read_string()
                .ok_or(MetricsParseDrop::InvalidFieldType)?;
            if value.len() > MAX_TAG_VALUE_LEN {
                return Err(MetricsParseDrop::TagValueTooLong);
            }

            metric.tags[metric.tag_count] = MetricTag { key, value };
            metric.tag_count += 1;

            self.skip_whitespace();
            if self.peek() == b'}' {
                self.advance();
                self.leave();
                return Ok(());
            }
            if !self.expect(b',') {
                return Err(MetricsParseDrop::InvalidJson);
            }
        }
    }
}

/// Parse-time agent_id character class: `[A-Za-z0-9_.-]+`. The stricter
/// first-character rule is enforced at the semantic gate.
fn agent_id_chars_ok(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<ParsedMetrics<'_>, MetricsParseDrop> {
        parse_metrics(s.as_bytes())
    }

    #[test]
    fn full_message_parses() {
        let parsed = parse(
            r#"{"agent_id":"node-42","seq":7,"ts":1705689600000,
                "metrics":[{"n":"cpu.user","v":0.93,"u":"ratio","t":{"core":"0","host":"a"}},
                           {"n":"mem.rss","v":1.5e9}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.agent_id, "node-42");
        assert_eq!(parsed.seq, 7);
        assert_eq!(parsed.ts, 1_705_689_600_000);
        assert_eq!(parsed.metrics().len(), 2);

        let cpu = &parsed.metrics()[0];
        assert_eq!(cpu.name, "cpu.user");
        assert_eq!(cpu.value, 0.93);
        assert_eq!(cpu.unit, Some("ratio"));
        assert_eq!(cpu.tags().len(), 2);
        assert_eq!(cpu.tags()[0], MetricTag { key: "core", value: "0" });

        let mem = &parsed.metrics()[1];
        assert_eq!(mem.value, 1.5e9);
        assert_eq!(mem.unit, None);
        assert!(mem.tags().is_empty());
    }

    #[test]
    fn empty_metrics_array_is_valid() {
        let parsed = parse(r#"{"agent_id":"A","seq":1,"metrics":[]}"#).unwrap();
        assert_eq!(parsed.metrics().len(), 0);
        assert_eq!(parsed.ts, 0);
    }

    #[test]
    fn missing_required_fields() {
        assert!(matches!(
            parse("{}"),
            Err(MetricsParseDrop::MissingRequiredField)
        ));
        assert!(matches!(
            parse(r#"{"agent_id":"A","seq":1}"#),
            Err(MetricsParseDrop::MissingRequiredField)
        ));
        assert!(matches!(
            parse(r#"{"seq":1,"metrics":[]}"#),
            Err(MetricsParseDrop::MissingRequiredField)
        ));
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(matches!(
            parse(r#"{"agent_id":"A","seq":1,"metrics":[],"extra":1}"#),
            Err(MetricsParseDrop::UnexpectedField)
        ));
        assert!(matches!(
            parse(r#"{"agent_id":"A","seq":1,"metrics":[{"n":"x","v":1,"z":2}]}"#),
            Err(MetricsParseDrop::UnexpectedField)
        ));
    }

    #[test]
    fn wrong_types_rejected() {
        assert!(matches!(
            parse(r#"{"agent_id":7,"seq":1,"metrics":[]}"#),
            Err(MetricsParseDrop::InvalidFieldType)
        ));
        assert!(matches!(
            parse(r#"{"agent_id":"A","seq":"x","metrics":[]}"#),
            Err(MetricsParseDrop::InvalidFieldType)
        ));
        assert!(matches!(
            parse(r#"{"agent_id":"A","seq":1,"metrics":{}}"#),
            Err(MetricsParseDrop::InvalidFieldType)
        ));
        assert!(matches!(
            parse(r#"{"agent_id":"A","seq":1,"metrics":[{"n":"x","v":"s"}]}"#),
            Err(MetricsParseDrop::MetricValueNotNumber)
        ));
    }

    #[test]
    fn malformed_json_rejected() {
        for bad in [
            "",
            "[]",
            "{",
            r#"{"agent_id""#,
            r#"{"agent_id":"A" "seq":1}"#,
            r#"{"agent_id":"A","seq":1,"metrics":[}"#,
        ] {
            assert!(parse(bad).is_err(), "accepted: {bad}");
        }
    }

    #[test]
    fn agent_id_limits() {
        let long = "a".repeat(65);
        assert!(matches!(
            parse(&format!(
                r#"{{"agent_id":"{long}","seq":1,"metrics":[]}}"#
            )),
            Err(MetricsParseDrop::AgentIdTooLong)
        ));
        assert!(matches!(
            parse(r#"{"agent_id":"bad id","seq":1,"metrics":[]}"#),
            Err(MetricsParseDrop::AgentIdInvalidChars)
        ));
        // Dots are fine at parse time; the semantic gate tightens this.
        assert!(parse(r#"{"agent_id":"node.7","seq":1,"metrics":[]}"#).is_ok());
    }

    #[test]
    fn metric_cap_is_exact() {
        let entry = r#"{"n":"m","v":1}"#;
        let at_cap = vec![entry; MAX_METRICS].join(",");
        let at_cap_json = format!(r#"{{"agent_id":"A","seq":1,"metrics":[{at_cap}]}}"#);
        let parsed = parse(&at_cap_json).unwrap();
        assert_eq!(parsed.metrics().len(), MAX_METRICS);

        let over_cap = vec![entry; MAX_METRICS + 1].join(",");
        assert!(matches!(
            parse(&format!(
                r#"{{"agent_id":"A","seq":1,"metrics":[{over_cap}]}}"#
            )),
            Err(MetricsParseDrop::TooManyMetrics)
        ));
    }

    #[test]
    fn tag_caps() {
        let tags: String = (0..MAX_TAGS + 1)
            .map(|i| format!(r#""k{i}":"v""#))
            .collect::<Vec<_>>()
            .join(",");
        assert!(matches!(
            parse(&format!(
                r#"{{"agent_id":"A","seq":1,"metrics":[{{"n":"m","v":1,"t":{{{tags}}}}}]}}"#
            )),
            Err(MetricsParseDrop::TooManyTags)
        ));

        let key = "k".repeat(MAX_TAG_KEY_LEN + 1);
        assert!(matches!(
            parse(&format!(
                r#"{{"agent_id":"A","seq":1,"metrics":[{{"n":"m","v":1,"t":{{"{key}":"v"}}}}]}}"#
            )),
            Err(MetricsParseDrop::TagKeyTooLong)
        ));

        let value = "v".repeat(MAX_TAG_VALUE_LEN + 1);
        assert!(matches!(
            parse(&format!(
                r#"{{"agent_id":"A","seq":1,"metrics":[{{"n":"m","v":1,"t":{{"k":"{value}"}}}}]}}"#
            )),
            Err(MetricsParseDrop::TagValueTooLong)
        ));
    }

    #[test]
    fn name_and_unit_lengths() {
        let name = "n".repeat(MAX_METRIC_NAME_LEN + 1);
        assert!(matches!(
            parse(&format!(
                r#"{{"agent_id":"A","seq":1,"metrics":[{{"n":"{name}","v":1}}]}}"#
            )),
            Err(MetricsParseDrop::MetricNameTooLong)
        ));
        let unit = "u".repeat(MAX_UNIT_LEN + 1);
        assert!(matches!(
            parse(&format!(
                r#"{{"agent_id":"A","seq":1,"metrics":[{{"n":"m","v":1,"u":"{unit}"}}]}}"#
            )),
            Err(MetricsParseDrop::UnitTooLong)
        ));
    }

    #[test]
    fn metric_required_fields() {
        assert!(matches!(
            parse(r#"{"agent_id":"A","seq":1,"metrics":[{}]}"#),
            Err(MetricsParseDrop::MetricMissingName)
        ));
        assert!(matches!(
            parse(r#"{"agent_id":"A","seq":1,"metrics":[{"v":1}]}"#),
            Err(MetricsParseDrop::MetricMissingName)
        ));
        assert!(matches!(
            parse(r#"{"agent_id":"A","seq":1,"metrics":[{"n":"m"}]}"#),
            Err(MetricsParseDrop::MetricMissingValue)
        ));
    }

    #[test]
    fn oversized_input_rejected_before_parsing() {
        let padding = " ".repeat(MAX_INPUT_BYTES + 1);
        assert!(matches!(
            parse_metrics(padding.as_bytes()),
            Err(MetricsParseDrop::InputTooLarge)
        ));
    }

    #[test]
    fn number_forms() {
        let parsed = parse(
            r#"{"agent_id":"A","seq":1,"metrics":[
                {"n":"a","v":-12},{"n":"b","v":0.5},{"n":"c","v":2e3},{"n":"d","v":1.25E-2}]}"#,
        )
        .unwrap();
        let values: Vec<f64> = parsed.metrics().iter().map(|m| m.value).collect();
        assert_eq!(values, vec![-12.0, 0.5, 2000.0, 0.0125]);
    }

    #[test]
    fn views_borrow_from_input() {
        let input = r#"{"agent_id":"A","seq":1,"metrics":[{"n":"cpu","v":1}]}"#.to_string();
        let parsed = parse(&input).unwrap();
        let name = parsed.metrics()[0].name;
        let input_range = input.as_ptr() as usize..input.as_ptr() as usize + input.len();
        assert!(input_range.contains(&(name.as_ptr() as usize)));
    }

    #[test]
    fn non_utf8_rejected() {
        assert!(matches!(
            parse_metrics(&[0x7b, 0xff, 0xfe, 0x7d]),
            Err(MetricsParseDrop::InvalidJson)
        ));
    }
}
