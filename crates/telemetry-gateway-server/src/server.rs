// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hosting loop for the gateway pipeline.
//!
//! Owns the bound UDP socket and drives the synchronous core from a tokio
//! task: readiness-driven receive bursts, a periodic drain of the
//! forwarder queue, periodic stats logging, and a final drain on
//! cancellation so shutdown flushes whatever is queued.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::os::fd::AsRawFd;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use telemetry_gateway::config::GatewayConfig;
use telemetry_gateway::pipeline::{Pipeline, PipelineStats};
use telemetry_gateway::recv::{RecvLoop, RecvOutcome, RecvStats};
use telemetry_gateway::sink::Sink;

/// How often the forwarder queue is drained toward the sink.
const DRAIN_INTERVAL: Duration = Duration::from_millis(10);
/// How often a stats snapshot is logged.
const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Final counters returned when the server stops.
#[derive(Debug, Clone, Copy)]
pub struct ServerReport {
    pub recv: RecvStats,
    pub drained_on_shutdown: usize,
}

/// The UDP host wrapping a [`Pipeline`].
pub struct GatewayServer {
    socket: UdpSocket,
    recv: RecvLoop,
    pipeline: Pipeline,
}

impl GatewayServer {
    /// Binds `0.0.0.0:port` (port 0 picks an ephemeral port), applies the
    /// receive socket options, and wires the pipeline around `sink`.
    pub fn bind(
        port: u16,
        config: &GatewayConfig,
        sink: Box<dyn Sink>,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
        socket.set_nonblocking(true)?;

        let recv = RecvLoop::new(socket.as_raw_fd(), config.recv);
        recv.configure_socket()?;

        Ok(Self {
            socket,
            recv,
            pipeline: Pipeline::new(config, sink),
        })
    }

    /// The actual bound address, useful when port 0 was requested.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// A snapshot of the pipeline counters.
    pub fn pipeline_stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    /// Serves until `cancel` fires, then drains the queue and returns the
    /// final counters.
    pub async fn run(mut self, cancel: CancellationToken) -> std::io::Result<ServerReport> {
        let async_fd = AsyncFd::with_interest(self.socket, Interest::READABLE)?;

        let mut drain_tick = tokio::time::interval(DRAIN_INTERVAL);
        let mut stats_tick = tokio::time::interval(STATS_INTERVAL);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,

                guard = async_fd.readable() => {
                    let mut guard = guard?;
                    // Drain the socket until the kernel queue is empty so
                    // one readiness event serves a whole burst.
                    loop {
                        match self.recv.recv_one() {
                            RecvOutcome::Ok(datagram) => {
                                self.pipeline.ingest(
                                    &datagram.data,
                                    datagram.source,
                                    unix_millis(),
                                );
                            }
                            RecvOutcome::Truncated => {
                                warn!("dropped datagram exceeding the size cap");
                            }
                            RecvOutcome::WouldBlock => {
                                guard.clear_ready();
                                break;
                            }
                            RecvOutcome::Error(errno) => {
                                error!(errno, "recv failed");
                                guard.clear_ready();
                                break;
                            }
                        }
                    }
                }

                _ = drain_tick.tick() => {
                    self.pipeline.drain_all();
                }

                _ = stats_tick.tick() => {
                    let snapshot = serde_json::json!({
                        "recv": self.recv.stats(),
                        "pipeline": self.pipeline.stats(),
                    });
                    info!(stats = %snapshot, "gateway stats");
                }
            }
        }

        // Cooperative shutdown: stop receiving, flush the backlog.
        let drained_on_shutdown = self.pipeline.drain_all();
        self.pipeline.flush_sink();
        info!(drained_on_shutdown, "gateway stopped");

        Ok(ServerReport {
            recv: self.recv.stats(),
            drained_on_shutdown,
        })
    }
}

/// Wall clock in milliseconds since the Unix epoch.
fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
