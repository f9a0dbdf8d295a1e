//! Runner configuration
//!
//! Everything the runner needs, resolved from the command line with defaults
//! for the tuning knobs.

use std::time::Duration;

use boxlog_core::domain::workload::WorkloadSpec;
use boxlog_sink::CloudWatchConfig;

use crate::cli::Cli;
use crate::error::SetupError;
use crate::relay;
use crate::workload::DEFAULT_STOP_TIMEOUT;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Image and command to run
    pub workload: WorkloadSpec,

    /// Docker-compatible CLI program (e.g. "docker", "podman")
    pub container_runtime: String,

    /// Destination log group
    pub log_group: String,

    /// Destination log stream
    pub log_stream: String,

    /// CloudWatch credentials and region
    pub sink: CloudWatchConfig,

    /// How often buffered lines are shipped
    pub flush_interval: Duration,

    /// Capacity of the relay channel between the container and the uploader
    pub buffer_lines: usize,

    /// Grace period given to the container on stop
    pub stop_timeout: Duration,

    /// How long to wait for the output tail after the workload exits
    pub output_drain_timeout: Duration,

    /// How long to wait for the uploader's final flush
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(
        workload: WorkloadSpec,
        log_group: String,
        log_stream: String,
        sink: CloudWatchConfig,
    ) -> Self {
        Self {
            workload,
            container_runtime: "docker".to_string(),
            log_group,
            log_stream,
            sink,
            flush_interval: Duration::from_secs(3),
            buffer_lines: relay::DEFAULT_CAPACITY,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            output_drain_timeout: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(10),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), SetupError> {
        let invalid = |msg: &str| Err(SetupError::InvalidConfig(msg.to_string()));

        if self.workload.image.trim().is_empty() {
            return invalid("docker image cannot be empty");
        }

        if self.workload.command.trim().is_empty() {
            return invalid("bash command cannot be empty");
        }

        if self.container_runtime.trim().is_empty() {
            return invalid("container runtime cannot be empty");
        }

        if self.log_group.is_empty() {
            return invalid("cloudwatch group cannot be empty");
        }

        if self.log_stream.is_empty() {
            return invalid("cloudwatch stream cannot be empty");
        }

        if self.log_stream.contains(':') || self.log_stream.contains('*') {
            return invalid("cloudwatch stream cannot contain ':' or '*'");
        }

        if self.buffer_lines == 0 {
            return invalid("buffer_lines must be greater than 0");
        }

        Ok(())
    }
}

impl TryFrom<Cli> for Config {
    type Error = SetupError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let mut config = Config::new(
            WorkloadSpec::new(cli.docker_image, cli.bash_command),
            cli.cloudwatch_group,
            cli.cloudwatch_stream,
            CloudWatchConfig {
                access_key_id: cli.aws_access_key_id,
                secret_access_key: cli.aws_secret_access_key,
                region: cli.aws_region,
            },
        );
        config.container_runtime = cli.container_runtime;
        config.flush_interval = Duration::from_secs(cli.flush_interval);
        config.buffer_lines = cli.buffer_lines;
        config.stop_timeout = Duration::from_secs(cli.stop_timeout);
        config.shutdown_timeout = Duration::from_secs(cli.shutdown_timeout);

        config.validate()?;
        Ok(config)
    }
}
