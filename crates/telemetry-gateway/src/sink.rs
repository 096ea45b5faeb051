// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Downstream sink contract and stock implementations.
//!
//! A sink consumes one serialized event at a time and reports success or
//! failure; it may block but must not panic. The forwarder owns its sink
//! and treats a failed write as a counted loss, never a retry.

use std::io::Write as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Downstream consumer of serialized events.
pub trait Sink: Send {
    /// Writes one event payload. Returns false on downstream failure.
    fn write(&mut self, payload: &[u8]) -> bool;

    /// Hints that buffered data should be pushed out. Optional.
    fn flush(&mut self) {}
}

/// Discards everything, counting writes. For tests and load runs.
#[derive(Debug, Default)]
pub struct NullSink {
    write_count: u64,
}

impl NullSink {
    pub fn write_count(&self) -> u64 {
        self.write_count
    }
}

impl Sink for NullSink {
    fn write(&mut self, _payload: &[u8]) -> bool {
        self.write_count += 1;
        true
    }
}

/// Refuses everything. For error-path tests.
#[derive(Debug, Default)]
pub struct FailingSink {
    fail_count: u64,
}

impl FailingSink {
    pub fn fail_count(&self) -> u64 {
        self.fail_count
    }
}

impl Sink for FailingSink {
    fn write(&mut self, _payload: &[u8]) -> bool {
        self.fail_count += 1;
        false
    }
}

/// Writes each event as one line on stdout.
#[derive(Debug, Default)]
pub struct StdoutJsonSink {
    write_count: u64,
}

impl StdoutJsonSink {
    pub fn write_count(&self) -> u64 {
        self.write_count
    }
}

impl Sink for StdoutJsonSink {
    fn write(&mut self, payload: &[u8]) -> bool {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        let ok = handle
            .write_all(payload)
            .and_then(|()| handle.write_all(b"\n"))
            .and_then(|()| handle.flush())
            .is_ok();
        if ok {
            self.write_count += 1;
        }
        ok
    }

    fn flush(&mut self) {
        let _ = std::io::stdout().flush();
    }
}

/// Decorator that sleeps before each delegated write, simulating a slow
/// downstream for backpressure demonstrations.
pub struct SlowSink {
    inner: Box<dyn Sink>,
    delay: Duration,
}

impl SlowSink {
    pub fn new(inner: Box<dyn Sink>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl Sink for SlowSink {
    fn write(&mut self, payload: &[u8]) -> bool {
        std::thread::sleep(self.delay);
        self.inner.write(payload)
    }

    fn flush(&mut self) {
        self.inner.flush();
    }
}

/// Captures every payload into shared storage so tests can assert on what
/// reached the downstream.
#[derive(Debug)]
pub struct RecordingSink {
    received: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingSink {
    /// Returns the sink and the shared buffer it appends to.
    pub fn new() -> (Self, Arc<Mutex<Vec<Vec<u8>>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                received: Arc::clone(&received),
            },
            received,
        )
    }
}

impl Sink for RecordingSink {
    fn write(&mut self, payload: &[u8]) -> bool {
        match self.received.lock() {
            Ok(mut received) => {
                received.push(payload.to_vec());
                true
            }
            Err(_) => false,
        }
    }
}
