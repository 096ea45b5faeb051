// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Telemetry ingress gateway core.
//!
//! A single-process UDP service accepts untrusted datagrams from many
//! agents and runs each through a five-stage defensive pipeline:
//!
//! 1. Bounded receive ([`recv`]): per-datagram byte cap, truncation
//!    detection.
//! 2. Source admission ([`source_limiter`]): per-endpoint token buckets
//!    with LRU-bounded state.
//! 3. Envelope framing ([`envelope`]): 2-byte length-prefix validation.
//! 4. Payload parsing ([`metrics`], [`logs`]): bounded single-pass
//!    parsers producing views into the receive buffer.
//! 5. Semantic validation and bounded forwarding ([`forwarder`]): fairness
//!    quota, fixed-capacity queue, tail drop.
//!
//! Untrusted input performs no unbounded work and drives no unbounded
//! state: every allocation and iteration is capped by a compile-time
//! constant or configured ceiling, and every degraded mode is a counted
//! drop with a named reason rather than a crash or a stall.
//!
//! The crate is synchronous and single-threaded; [`pipeline::Pipeline`]
//! wires the stages together and the hosting loop decides scheduling.

pub mod bounded_queue;
pub mod clock;
pub mod config;
pub mod envelope;
pub mod forwarder;
pub mod logs;
pub mod metrics;
pub mod pipeline;
pub mod recv;
pub mod serialize;
pub mod sink;
pub mod source_limiter;
pub mod validation;
