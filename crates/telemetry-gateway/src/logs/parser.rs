// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded single-pass logfmt parser.
//!
//! Grammar:
//!
//! ```text
//! line   = field (whitespace field)*
//! field  = key "=" value
//! key    = [a-z_][a-z0-9_]*
//! value  = bare | quoted
//! bare   = [^ \t"=]+
//! quoted = '"' [^"]* '"'
//! ```
//!
//! `ts`, `level`, and `msg` are required; `agent` is recognized; anything
//! else is retained for pass-through up to the field cap. No regex, no
//! backtracking, no allocation: every view points into the input line.

/// Maximum accepted line length, in bytes.
pub const MAX_LINE_BYTES: usize = 2048;
/// Maximum fields per line, including the required ones.
pub const MAX_FIELDS: usize = 16;
/// Maximum key length.
pub const MAX_KEY_LEN: usize = 32;
/// Maximum value length (quoted values measured without the quotes).
pub const MAX_VALUE_LEN: usize = 1024;

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl std::str::FromStr for Level {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            _ => Err(()),
        }
    }
}

/// Parse-stage drop reasons for log lines.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum LogParseDrop {
    #[error("input exceeds {MAX_LINE_BYTES} bytes")]
    InputTooLarge,

    #[error("input empty or whitespace only")]
    EmptyInput,

    #[error("line exceeds {MAX_FIELDS} fields")]
    TooManyFields,

    #[error("key exceeds {MAX_KEY_LEN} bytes")]
    KeyTooLong,

    #[error("value exceeds {MAX_VALUE_LEN} bytes")]
    ValueTooLong,

    #[error("key contains a character outside [a-z0-9_]")]
    InvalidKeyChar,

    #[error("field missing '=' separator")]
    MissingEquals,

    #[error("quoted value missing closing quote")]
    UnterminatedQuote,

    #[error("required \"ts\" field missing")]
    MissingTimestamp,

    #[error("required \"level\" field missing")]
    MissingLevel,

    #[error("required \"msg\" field missing")]
    MissingMessage,

    #[error("\"ts\" is not an unsigned integer")]
    InvalidTimestamp,

    #[error("\"level\" is not a recognized level")]
    InvalidLevel,
}

impl LogParseDrop {
    /// Stable label used as a counter key.
    pub fn label(self) -> &'static str {
        match self {
            LogParseDrop::InputTooLarge => "input_too_large",
            LogParseDrop::EmptyInput => "empty_input",
            LogParseDrop::TooManyFields => "too_many_fields",
            LogParseDrop::KeyTooLong => "key_too_long",
            LogParseDrop::ValueTooLong => "value_too_long",
            LogParseDrop::InvalidKeyChar => "invalid_key_char",
            LogParseDrop::MissingEquals => "missing_equals",
            LogParseDrop::UnterminatedQuote => "unterminated_quote",
            LogParseDrop::MissingTimestamp => "missing_timestamp",
            LogParseDrop::MissingLevel => "missing_level",
            LogParseDrop::MissingMessage => "missing_message",
            LogParseDrop::InvalidTimestamp => "invalid_timestamp",
            LogParseDrop::InvalidLevel => "invalid_level",
        }
    }
}

/// One key=value pair, borrowed from the input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogField<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

const EMPTY_FIELD: LogField<'static> = LogField { key: "", value: "" };

/// A parsed log line. All views borrow from the input; the inline field
/// array keeps every pair (required ones included) for pass-through.
#[derive(Debug, Clone)]
pub struct ParsedLog<'a> {
    pub ts: u64,
    pub level: Level,
    /// Empty when the line carried no `agent` field.
    pub agent_id: &'a str,
    pub msg: &'a str,
    fields: [LogField<'a>; MAX_FIELDS],
    field_count: usize,
}

impl<'a> ParsedLog<'a> {
    /// Every parsed field in line order, including `ts`/`level`/`msg`.
    pub fn fields(&self) -> &[LogField<'a>] {
        &self.fields[..self.field_count]
    }
}

/// Parses one logfmt line from an envelope body.
///
/// Trailing whitespace and newlines are stripped before parsing. Input
/// that is not valid UTF-8 cannot form a well-formed line and is rejected
/// at the key gate.
pub fn parse_log(input: &[u8]) -> Result<ParsedLog<'_>, LogParseDrop> {
    if input.len() > MAX_LINE_BYTES {
        return Err(LogParseDrop::InputTooLarge);
    }
    if input.is_empty() {
        return Err(LogParseDrop::EmptyInput);
    }
    let text = std::str::from_utf8(input).map_err(|_| LogParseDrop::InvalidKeyChar)?;
    let text = text.trim_end_matches(['\n', '\r', ' ', '\t']);
    if text.is_empty() {
        return Err(LogParseDrop::EmptyInput);
    }

    let mut parser = LogfmtParser {
        input: text,
        pos: 0,
    };
    parser.parse()
}

struct LogfmtParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> LogfmtParser<'a> {
    fn parse(&mut self) -> Result<ParsedLog<'a>, LogParseDrop> {
        let mut result = ParsedLog {
            ts: 0,
            level: Level::Info,
            agent_id: "",
            msg: "",
            fields: [EMPTY_FIELD; MAX_FIELDS],
            field_count: 0,
        };
        let mut has_ts = false;
        let mut has_level = false;
        let mut has_msg = false;

        while self.pos < self.input.len() {
            self.skip_spaces();
            if self.pos >= self.input.len() {
                break;
            }

            if result.field_count >= MAX_FIELDS {
                return Err(LogParseDrop::TooManyFields);
            }

            let key = self.parse_key()?;
            if key.len() > MAX_KEY_LEN {
                return Err(LogParseDrop::KeyTooLong);
            }

            if self.peek() != Some(b'=') {
                return Err(LogParseDrop::MissingEquals);
            }
            self.pos += 1;

            let value = self.parse_value()?;
            if value.len() > MAX_VALUE_LEN {
                return Err(LogParseDrop::ValueTooLong);
            }

            result.fields[result.field_count] = LogField { key, value };
            result.field_count += 1;

            match key {
                "ts" => {
                    result.ts = value
                        .parse::<u64>()
                        .map_err(|_| LogParseDrop::InvalidTimestamp)?;
                    has_ts = true;
                }
                "level" => {
                    result.level = value
                        .parse::<Level>()
                        .map_err(|_| LogParseDrop::InvalidLevel)?;
                    has_level = true;
                }
                "msg" => {
                    result.msg = value;
                    has_msg = true;
                }
                "agent" => result.agent_id = value,
                _ => {}
            }
        }

        if !has_ts {
            return Err(LogParseDrop::MissingTimestamp);
        }
        if !has_level {
            return Err(LogParseDrop::MissingLevel);
        }
        if !has_msg {
            return Err(LogParseDrop::MissingMessage);
        }

        Ok(result)
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    /// Key: `[a-z_][a-z0-9_]*`.
    fn parse_key(&mut self) -> Result<&'a str, LogParseDrop> {
        let start = self.pos;
        match self.peek() {
            Some(b) if b == b'_' || b.is_ascii_lowercase() => self.pos += 1,
            _ => return Err(LogParseDrop::InvalidKeyChar),
        }
        while let Some(b) = self.peek() {
            if b == b'_' || b.is_ascii_lowercase() || b.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(&self.input[start..self.pos])
    }

    fn parse_value(&mut self) -> Result<&'a str, LogParseDrop> {
        match self.peek() {
            None => Ok(""), // empty value at end of line
            Some(b'"') => self.parse_quoted_value(),
            Some(_) => Ok(self.parse_bare_value()),
        }
    }

    /// Bare value: runs until whitespace, `"`, or `=`.
    fn parse_bare_value(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b' ' | b'\t' | b'"' | b'=') {
                break;
            }
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    /// Quoted value: `"` then any non-quote run then `"`. No escapes.
    fn parse_quoted_value(&mut self) -> Result<&'a str, LogParseDrop> {
        self.pos += 1; // opening quote
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'"' {
                let value = &self.input[start..self.pos];
                self.pos += 1;
                return Ok(value);
            }
            self.pos += 1;
        }
        Err(LogParseDrop::UnterminatedQuote)
    }
}
