// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-source admission control.
//!
//! Each source endpoint gets an independent token bucket so one noisy
//! sender cannot consume another's budget. Bucket state is held in an
//! LRU-bounded map: when a datagram arrives from a source beyond
//! `max_sources`, the least recently seen entry is evicted. Both the rate
//! and the state footprint are therefore bounded regardless of how many
//! endpoints probe the gateway.
//!
//! Not thread-safe; one limiter per ingest loop.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::SourceLimiterConfig;

/// Transport endpoint a datagram arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl SourceKey {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Admission verdict for one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admit {
    /// Source has budget; one token consumed.
    Allow,
    /// Source exhausted its budget.
    Drop,
}

/// Token bucket for a single source.
#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_update: Instant,
}

/// Sentinel for "no slot" in the intrusive LRU links.
const NIL: usize = usize::MAX;

/// One slot of the slab-backed LRU list.
#[derive(Debug)]
struct Slot {
    key: SourceKey,
    bucket: Bucket,
    prev: usize,
    next: usize,
}

/// Counter snapshot for observability.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SourceLimiterStats {
    pub admits: u64,
    pub drops: u64,
    pub evictions: u64,
    pub tracked_sources: usize,
}

/// Per-source token-bucket rate limiter with LRU-bounded state.
pub struct SourceLimiter {
    config: SourceLimiterConfig,
    clock: Box<dyn Clock>,
    /// Source -> slot index. `index.len()` equals the number of live slots.
    index: HashMap<SourceKey, usize>,
    slots: Vec<Slot>,
    free: Vec<usize>,
    /// Most recently used slot, or NIL when empty.
    head: usize,
    /// Least recently used slot, or NIL when empty.
    tail: usize,
    admits: u64,
    drops: u64,
    evictions: u64,
}

impl SourceLimiter {
    pub fn new(config: SourceLimiterConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock))
    }

    /// Constructor with an injected clock, used by tests for deterministic
    /// refill.
    pub fn with_clock(config: SourceLimiterConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            index: HashMap::with_capacity(config.max_sources),
            slots: Vec::with_capacity(config.max_sources),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            admits: 0,
            drops: 0,
            evictions: 0,
            config,
            clock,
        }
    }

    /// Decides whether a datagram from `source` may proceed, consuming one
    /// token on admission.
    ///
    /// Unknown sources start with a full burst bucket; when the tracked set
    /// is at capacity the least recently seen source is evicted first.
    pub fn admit(&mut self, source: SourceKey) -> Admit {
        let now = self.clock.now();

        let slot = match self.index.get(&source) {
            Some(&slot) => {
                self.detach(slot);
                self.attach_front(slot);
                slot
            }
            None => {
                if self.index.len() >= self.config.max_sources {
                    self.evict_lru();
                }
                let slot = self.alloc_slot(source, now);
                self.attach_front(slot);
                self.index.insert(source, slot);
                slot
            }
        };

        self.refill(slot, now);

        let bucket = &mut self.slots[slot].bucket;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            self.admits += 1;
            Admit::Allow
        } else {
            self.drops += 1;
            Admit::Drop
        }
    }

    /// Number of sources currently tracked.
    pub fn tracked_count(&self) -> usize {
        self.index.len()
    }

    /// Whether a source currently has bucket state.
    pub fn is_tracked(&self, source: &SourceKey) -> bool {
        self.index.contains_key(source)
    }

    pub fn total_admits(&self) -> u64 {
        self.admits
    }

    pub fn total_drops(&self) -> u64 {
        self.drops
    }

    pub fn eviction_count(&self) -> u64 {
        self.evictions
    }

    pub fn stats(&self) -> SourceLimiterStats {
        SourceLimiterStats {
            admits: self.admits,
            drops: self.drops,
            evictions: self.evictions,
            tracked_sources: self.index.len(),
        }
    }

    /// Adds tokens for the time elapsed since the bucket was last touched.
    /// Clock regression counts as zero elapsed, never a refund.
    fn refill(&mut self, slot: usize, now: Instant) {
        let rate = f64::from(self.config.tokens_per_sec);
        let ceiling = f64::from(self.config.burst_tokens);
        let bucket = &mut self.slots[slot].bucket;
        let elapsed = now.saturating_duration_since(bucket.last_update);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * rate).min(ceiling);
        bucket.last_update = now;
    }

    fn alloc_slot(&mut self, key: SourceKey, now: Instant) -> usize {
        let bucket = Bucket {
            tokens: f64::from(self.config.burst_tokens),
            last_update: now,
        };
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Slot {
                    key,
                    bucket,
                    prev: NIL,
                    next: NIL,
                };
                slot
            }
            None => {
                self.slots.push(Slot {
                    key,
                    bucket,
                    prev: NIL,
                    next: NIL,
                });
                self.slots.len() - 1
            }
        }
    }

    /// Unlinks a slot from the LRU list without freeing it.
    fn detach(&mut self, slot: usize) {
        let (prev, next) = (self.slots[slot].prev, self.slots[slot].next);
        if prev != NIL {
            self.slots[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.slots[slot].prev = NIL;
        self.slots[slot].next = NIL;
    }

    /// Links a detached slot in as most recently used.
    fn attach_front(&mut self, slot: usize) {
        self.slots[slot].prev = NIL;
        self.slots[slot].next = self.head;
        if self.head != NIL {
            self.slots[self.head].prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }

    /// Removes the strict least-recently-used entry.
    fn evict_lru(&mut self) {
        let victim = self.tail;
        if victim == NIL {
            return;
        }
        let key = self.slots[victim].key;
        self.detach(victim);
        self.index.remove(&key);
        self.free.push(victim);
        self.evictions += 1;
        debug!(source = %key, "evicted rate-limiter state for least recently seen source");
    }
}

impl std::fmt::Debug for SourceLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceLimiter")
            .field("config", &self.config)
            .field("tracked", &self.index.len())
            .field("admits", &self.admits)
            .field("drops", &self.drops)
            .field("evictions", &self.evictions)
            .finish()
    }
}
