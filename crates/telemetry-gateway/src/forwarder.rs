// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded forwarding: the backlog and fairness boundary.
//!
//! The forwarder combines three collaborators: a per-agent quota tracker,
//! a fixed-capacity event queue, and the downstream sink. Quota is checked
//! before the queue so an abusive agent is rejected on its own budget and
//! cannot convert its excess into queue-full drops for everyone else. A
//! reservation taken for an event that then fails to enqueue is released
//! immediately; leaking it would slowly strangle the agent.
//!
//! Draining pops in FIFO order, releases the reservation unconditionally,
//! and hands the payload to the sink. Sink failures are counted, never
//! retried: the system prefers loss over backlog.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::bounded_queue::BoundedQueue;
use crate::config::ForwarderConfig;
use crate::sink::Sink;

/// What kind of telemetry an owned event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Metrics,
    Log,
}

/// An owned event queued for the sink.
///
/// This is the pipeline's single ownership boundary: borrowed views from
/// the receive buffer are copied into `payload` here so the buffer can be
/// reused for the next datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEvent {
    pub agent_id: String,
    pub kind: EventKind,
    pub payload: Vec<u8>,
}

/// Result of attempting to forward one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardResult {
    /// Queued for the sink.
    Queued,
    /// Global queue at capacity.
    DroppedQueueFull,
    /// Agent already using its full share of the queue.
    DroppedAgentQuotaExceeded,
}

/// Tracks in-flight event counts per agent.
///
/// Entries are pruned as soon as their count reaches zero, so the map
/// never holds more entries than the queue holds events.
#[derive(Debug)]
pub struct AgentQuotaTracker {
    in_flight: HashMap<String, usize>,
    max_per_agent: usize,
    total_in_flight: usize,
    rejections: u64,
}

impl AgentQuotaTracker {
    pub fn new(max_per_agent: usize) -> Self {
        Self {
            in_flight: HashMap::new(),
            max_per_agent,
            total_in_flight: 0,
            rejections: 0,
        }
    }

    /// Reserves one slot for `agent_id`, refusing when the agent is at its
    /// cap. Each successful reservation must be paired with one `release`.
    pub fn try_reserve(&mut self, agent_id: &str) -> bool {
        let current = self.in_flight.get(agent_id).copied().unwrap_or(0);
        if current >= self.max_per_agent {
            self.rejections += 1;
            return false;
        }
        *self.in_flight.entry(agent_id.to_owned()).or_insert(0) += 1;
        self.total_in_flight += 1;
        true
    }

    /// Releases one slot. Unknown agents are a no-op.
    pub fn release(&mut self, agent_id: &str) {
        if let Some(count) = self.in_flight.get_mut(agent_id) {
            *count -= 1;
            self.total_in_flight -= 1;
            if *count == 0 {
                self.in_flight.remove(agent_id);
            }
        }
    }

    /// Current in-flight count for one agent.
    pub fn in_flight_count(&self, agent_id: &str) -> usize {
        self.in_flight.get(agent_id).copied().unwrap_or(0)
    }

    /// Number of distinct agents with at least one in-flight event.
    pub fn tracked_agents(&self) -> usize {
        self.in_flight.len()
    }

    /// Total events across all agents; equals the forwarder queue depth.
    pub fn total_in_flight(&self) -> usize {
        self.total_in_flight
    }

    pub fn quota_rejections(&self) -> u64 {
        self.rejections
    }
}

/// Monotonic forwarder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ForwarderStats {
    pub forwarded: u64,
    pub dropped_queue_full: u64,
    pub dropped_agent_quota: u64,
    pub sink_failures: u64,
    pub queue_depth: usize,
    pub quota_rejections: u64,
}

/// The forwarding stage: quota tracker + bounded queue + sink.
pub struct BoundedForwarder {
    quota: AgentQuotaTracker,
    queue: BoundedQueue<QueuedEvent>,
    sink: Box<dyn Sink>,
    forwarded: u64,
    dropped_queue_full: u64,
    dropped_quota: u64,
    sink_failures: u64,
}

impl BoundedForwarder {
    /// Builds a forwarder that owns `sink`.
    pub fn new(config: ForwarderConfig, sink: Box<dyn Sink>) -> Self {
        Self {
            quota: AgentQuotaTracker::new(config.max_per_agent),
            queue: BoundedQueue::new(config.max_queue_depth),
            sink,
            forwarded: 0,
            dropped_queue_full: 0,
            dropped_quota: 0,
            sink_failures: 0,
        }
    }

    /// Attempts to queue an event for the sink. Non-blocking.
    ///
    /// Checks agent quota first, then queue capacity; a quota reservation
    /// whose enqueue fails is rolled back before returning.
    pub fn try_forward(&mut self, event: QueuedEvent) -> ForwardResult {
        if !self.quota.try_reserve(&event.agent_id) {
            self.dropped_quota += 1;
            return ForwardResult::DroppedAgentQuotaExceeded;
        }

        if let Err(event) = self.queue.try_push(event) {
            self.quota.release(&event.agent_id);
            self.dropped_queue_full += 1;
            return ForwardResult::DroppedQueueFull;
        }

        ForwardResult::Queued
    }

    /// Pops and writes one event. Returns false when the queue is empty.
    ///
    /// The agent's reservation is released whether or not the sink accepts
    /// the payload; a failed write is counted, not retried.
    pub fn drain_one(&mut self) -> bool {
        let Some(event) = self.queue.try_pop() else {
            return false;
        };

        self.quota.release(&event.agent_id);

        if self.sink.write(&event.payload) {
            self.forwarded += 1;
        } else {
            self.sink_failures += 1;
            warn!(agent_id = %event.agent_id, "sink rejected event payload");
        }

        true
    }

    /// Drains until the queue is empty; returns the number of events
    /// processed.
    pub fn drain_all(&mut self) -> usize {
        let mut drained = 0;
        while self.drain_one() {
            drained += 1;
        }
        drained
    }

    /// Asks the sink to flush anything it buffered.
    pub fn flush_sink(&mut self) {
        self.sink.flush();
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn quota_tracker(&self) -> &AgentQuotaTracker {
        &self.quota
    }

    pub fn total_forwarded(&self) -> u64 {
        self.forwarded
    }

    pub fn total_dropped_queue_full(&self) -> u64 {
        self.dropped_queue_full
    }

    pub fn total_dropped_quota(&self) -> u64 {
        self.dropped_quota
    }

    pub fn total_sink_failures(&self) -> u64 {
        self.sink_failures
    }

    pub fn stats(&self) -> ForwarderStats {
        ForwarderStats {
            forwarded: self.forwarded,
            dropped_queue_full: self.dropped_queue_full,
            dropped_agent_quota: self.dropped_quota,
            sink_failures: self.sink_failures,
            queue_depth: self.queue.len(),
            quota_rejections: self.quota.quota_rejections(),
        }
    }
}

impl std::fmt::Debug for BoundedForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedForwarder")
            .field("queue_depth", &self.queue.len())
            .field("queue_capacity", &self.queue.capacity())
            .field("stats", &self.stats())
            .finish()
    }
}
