//! boxlog
//!
//! Runs a shell command inside a throwaway container and ships every line it
//! prints to a CloudWatch log stream.
//!
//! Architecture:
//! - Configuration: command line flags (with environment fallbacks) and defaults
//! - Runtime: a Docker-compatible CLI driving the container
//! - Workload: container lifecycle and output scanning into the relay channel
//! - Service: batched, ordered upload of relayed lines
//! - Scheduler: supervision of the run and the teardown order
//!
//! The process exits 0 once the run is over, whatever the workload's own exit
//! status, and 2 if it could not be set up.

mod cli;
mod config;
mod error;
mod relay;
mod runtime;
mod scheduler;
mod service;
mod shutdown;
mod workload;

#[cfg(test)]
mod testing;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::config::Config;
use crate::error::SetupError;
use crate::runtime::CliRuntime;
use crate::scheduler::{RunSummary, Timeouts, supervise};
use crate::service::{BatchedUploader, StopReason, UploaderConfig};
use crate::shutdown::{Shutdown, ShutdownReason};
use crate::workload::WorkloadController;
use boxlog_sink::CloudWatchSink;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boxlog_runner=info,boxlog_sink=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(summary) => {
            match summary.upload {
                Some(report) => info!(
                    "Run complete ({}, uploader stopped on {}): {} line(s) in {} batch(es) delivered, {} line(s) dropped",
                    summary.outcome,
                    match report.reason {
                        StopReason::Cancelled => "shutdown",
                        StopReason::SourceClosed => "end of output",
                    },
                    report.stats.lines_delivered,
                    report.stats.batches_delivered,
                    report.stats.lines_dropped
                ),
                None => info!("Run complete ({}), upload did not finish", summary.outcome),
            }
            ExitCode::SUCCESS
        }
        Err(e @ SetupError::Interrupted { .. }) => {
            warn!("Setup {}, nothing left running", e);
            ExitCode::from(e.exit_code())
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// Sets everything up in order, then hands over to the supervisor
///
/// Every resource is acquired before the workload starts, so a setup failure
/// never leaves a container behind.
async fn run(cli: Cli) -> Result<RunSummary, SetupError> {
    let config = Config::try_from(cli)?;
    info!(
        "Loaded configuration: image={}, group={}, stream={}, runtime={}",
        config.workload.image, config.log_group, config.log_stream, config.container_runtime
    );

    let shutdown = Shutdown::new();
    let signals = shutdown.listen_for_signals();

    let runtime = CliRuntime::connect(config.container_runtime.clone())
        .await
        .map_err(SetupError::EnvironmentUnavailable)?;

    let sink = CloudWatchSink::new(config.sink.clone())?;
    info!("CloudWatch client initialized for {}", sink.region());

    let mut workload =
        WorkloadController::new(Arc::new(runtime), config.workload.clone(), config.buffer_lines)
            .with_stop_timeout(config.stop_timeout);

    if let Err(e) = workload.run(shutdown.token()).await {
        shutdown.cancel();
        workload.close().await;
        return Err(e);
    }

    let uploader = BatchedUploader::new(
        Arc::new(sink),
        UploaderConfig {
            log_group: config.log_group.clone(),
            log_stream: config.log_stream.clone(),
            flush_interval: config.flush_interval,
        },
    );

    let timeouts = Timeouts {
        output_drain: config.output_drain_timeout,
        shutdown: config.shutdown_timeout,
    };

    let summary = supervise(workload, uploader, &shutdown, timeouts).await;

    match signals.await {
        Ok(ShutdownReason::Requested) => debug!("Shutdown was not triggered by a signal"),
        Ok(reason) => info!("Run was cut short by {:?}", reason),
        Err(e) => warn!("Signal listener failed: {}", e),
    }

    Ok(summary)
}
