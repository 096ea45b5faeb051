// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Gateway configuration.
//!
//! Every stage is configured by a small value struct with conservative
//! defaults. [`GatewayConfig`] aggregates them, reads `GATEWAY_*`
//! environment overrides, and validates the result before the host wires
//! the pipeline together.

use std::env;

use crate::logs::validator::LogValidationConfig;
use crate::metrics::validator::MetricsValidationConfig;

/// Source rate limiter settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceLimiterConfig {
    /// Hard cap on distinct tracked sources (LRU capacity).
    pub max_sources: usize,
    /// Sustained refill rate per source, tokens per second.
    pub tokens_per_sec: u32,
    /// Bucket ceiling and initial fill.
    pub burst_tokens: u32,
}

impl Default for SourceLimiterConfig {
    fn default() -> Self {
        Self {
            max_sources: 1024,
            tokens_per_sec: 100,
            burst_tokens: 200,
        }
    }
}

/// Receive loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvConfig {
    /// Hard per-datagram byte cap. Default is MTU(1500) - IP(20) - UDP(8).
    pub max_datagram_bytes: usize,
    /// SO_RCVBUF hint for the kernel socket buffer.
    pub recv_buffer_bytes: usize,
}

impl Default for RecvConfig {
    fn default() -> Self {
        Self {
            max_datagram_bytes: 1472,
            recv_buffer_bytes: 256 * 1024,
        }
    }
}

/// Forwarder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwarderConfig {
    /// Total bounded backlog capacity.
    pub max_queue_depth: usize,
    /// Per-agent in-flight quota.
    pub max_per_agent: usize,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: 4096,
            max_per_agent: 64,
        }
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayConfig {
    pub source_limiter: SourceLimiterConfig,
    pub recv: RecvConfig,
    pub forwarder: ForwarderConfig,
    pub metrics_validation: MetricsValidationConfig,
    pub log_validation: LogValidationConfig,
}

/// Configuration rejected by [`GatewayConfig::validate`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_sources must be positive")]
    ZeroMaxSources,

    #[error("tokens_per_sec must be positive")]
    ZeroTokensPerSec,

    #[error("burst_tokens must be positive")]
    ZeroBurstTokens,

    #[error("max_datagram_bytes must be at least 2 (envelope header)")]
    DatagramCapTooSmall,

    #[error("max_queue_depth must be positive")]
    ZeroQueueDepth,

    #[error("max_per_agent must be positive")]
    ZeroAgentQuota,

    #[error("metrics value range is inverted (min > max)")]
    InvertedValueRange,
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|val| val.parse::<T>().ok())
        .unwrap_or(default)
}

impl GatewayConfig {
    /// Builds a configuration from defaults with `GATEWAY_*` environment
    /// overrides, then validates it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            source_limiter: SourceLimiterConfig {
                max_sources: env_parsed(
                    "GATEWAY_MAX_SOURCES",
                    defaults.source_limiter.max_sources,
                ),
                tokens_per_sec: env_parsed(
                    "GATEWAY_TOKENS_PER_SEC",
                    defaults.source_limiter.tokens_per_sec,
                ),
                burst_tokens: env_parsed(
                    "GATEWAY_BURST_TOKENS",
                    defaults.source_limiter.burst_tokens,
                ),
            },
            recv: RecvConfig {
                max_datagram_bytes: env_parsed(
                    "GATEWAY_MAX_DATAGRAM_BYTES",
                    defaults.recv.max_datagram_bytes,
                ),
                recv_buffer_bytes: env_parsed(
                    "GATEWAY_RECV_BUFFER_BYTES",
                    defaults.recv.recv_buffer_bytes,
                ),
            },
            forwarder: ForwarderConfig {
                max_queue_depth: env_parsed(
                    "GATEWAY_MAX_QUEUE_DEPTH",
                    defaults.forwarder.max_queue_depth,
                ),
                max_per_agent: env_parsed(
                    "GATEWAY_MAX_PER_AGENT",
                    defaults.forwarder.max_per_agent,
                ),
            },
            metrics_validation: defaults.metrics_validation,
            log_validation: defaults.log_validation,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that would break a pipeline invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_limiter.max_sources == 0 {
            return Err(ConfigError::ZeroMaxSources);
        }
        if self.source_limiter.tokens_per_sec == 0 {
            return Err(ConfigError::ZeroTokensPerSec);
        }
        if self.source_limiter.burst_tokens == 0 {
            return Err(ConfigError::ZeroBurstTokens);
        }
        if self.recv.max_datagram_bytes < 2 {
            return Err(ConfigError::DatagramCapTooSmall);
        }
        if self.forwarder.max_queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        if self.forwarder.max_per_agent == 0 {
            return Err(ConfigError::ZeroAgentQuota);
        }
        if self.metrics_validation.value_rules.min_value
            > self.metrics_validation.value_rules.max_value
        {
            return Err(ConfigError::InvertedValueRange);
        }
        Ok(())
    }
}
