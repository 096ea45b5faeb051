// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Envelope framing validation.
//!
//! A datagram carries exactly one envelope: a big-endian 16-bit body
//! length followed by that many body bytes. This stage checks framing and
//! nothing else; the datagram size cap belongs to the receive loop. The
//! validator is a pure function returning a view into the payload, so no
//! bytes are copied before the parsers run.

/// Framing failures. The taxonomy is closed; every malformed datagram maps
/// to exactly one reason.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeDrop {
    #[error("payload smaller than the 2-byte length header")]
    PayloadTooSmall,

    #[error("declared body length exceeds available bytes")]
    LengthMismatch,

    #[error("bytes present beyond the declared body length")]
    TrailingJunk,
}

impl EnvelopeDrop {
    /// Stable label used as a counter key.
    pub fn label(self) -> &'static str {
        match self {
            EnvelopeDrop::PayloadTooSmall => "payload_too_small",
            EnvelopeDrop::LengthMismatch => "length_mismatch",
            EnvelopeDrop::TrailingJunk => "trailing_junk",
        }
    }
}

/// Validates the length-prefix framing and returns the body view.
///
/// The returned slice borrows from `payload` and may be empty when the
/// declared length is zero.
pub fn parse_envelope(payload: &[u8]) -> Result<&[u8], EnvelopeDrop> {
    if payload.len() < 2 {
        return Err(EnvelopeDrop::PayloadTooSmall);
    }

    let declared = u16::from_be_bytes([payload[0], payload[1]]) as usize;
    let expected_total = 2 + declared;

    if expected_total > payload.len() {
        return Err(EnvelopeDrop::LengthMismatch);
    }
    if expected_total < payload.len() {
        return Err(EnvelopeDrop::TrailingJunk);
    }

    Ok(&payload[2..expected_total])
}
