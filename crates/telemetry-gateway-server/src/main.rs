// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use telemetry_gateway::config::GatewayConfig;
use telemetry_gateway::sink::{Sink, SlowSink, StdoutJsonSink};
use telemetry_gateway_server::server::GatewayServer;

#[derive(Parser)]
#[command(
    name = "telemetry-gateway-server",
    about = "Bounded UDP telemetry ingress gateway"
)]
struct Cli {
    /// UDP port to listen on
    #[arg(long, default_value_t = 9465, env = "GATEWAY_PORT")]
    port: u16,

    /// Sleep before every sink write to simulate a slow downstream
    #[arg(long)]
    slow: bool,

    /// Per-write delay in milliseconds when --slow is set
    #[arg(long, default_value_t = 100, env = "GATEWAY_SLOW_DELAY_MS")]
    slow_delay_ms: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GATEWAY_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let mut sink: Box<dyn Sink> = Box::new(StdoutJsonSink::default());
    if cli.slow {
        sink = Box::new(SlowSink::new(
            sink,
            Duration::from_millis(cli.slow_delay_ms),
        ));
    }

    let server = match GatewayServer::bind(cli.port, &config, sink) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(port = cli.port, "failed to bind UDP socket: {e}");
            std::process::exit(1);
        }
    };

    match server.local_addr() {
        Ok(addr) => tracing::info!(%addr, slow = cli.slow, "gateway listening"),
        Err(e) => {
            tracing::error!("failed to read bound address: {e}");
            std::process::exit(1);
        }
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal_cancel.cancel();
        }
    });

    match server.run(cancel).await {
        Ok(report) => {
            tracing::info!(
                received = report.recv.received,
                truncated = report.recv.truncated,
                errors = report.recv.errors,
                drained_on_shutdown = report.drained_on_shutdown,
                "gateway exited"
            );
        }
        Err(e) => {
            tracing::error!("server loop failed: {e}");
            std::process::exit(1);
        }
    }
}
