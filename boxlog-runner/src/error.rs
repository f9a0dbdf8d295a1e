//! Runner error taxonomy
//!
//! Setup errors abort the process with exit status 2. Upload errors end the
//! uploader task only; the workload keeps running.

use boxlog_sink::SinkError;
use thiserror::Error;

/// Failures before the relay pipeline starts
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("container runtime unavailable: {0:#}")]
    EnvironmentUnavailable(anyhow::Error),

    #[error("unable to create log sink client: {0}")]
    SinkUnavailable(#[from] SinkError),

    #[error("unable to pull image {image}: {source:#}")]
    ImagePullFailed {
        image: String,
        source: anyhow::Error,
    },

    #[error("unable to start workload: {0:#}")]
    WorkloadStartFailed(anyhow::Error),

    /// Shutdown was requested before the workload was running
    #[error("interrupted during {stage}")]
    Interrupted { stage: &'static str },
}

impl SetupError {
    /// Process exit status reported for this failure
    ///
    /// An interrupt is a clean stop, not a failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Interrupted { .. } => 0,
            _ => 2,
        }
    }
}

/// Failures that stop the uploader before it ships anything
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unable to provision log group {group}: {source}")]
    GroupProvisionFailed {
        group: String,
        #[source]
        source: SinkError,
    },

    #[error("unable to provision log stream {group}/{stream}: {source}")]
    StreamProvisionFailed {
        group: String,
        stream: String,
        #[source]
        source: SinkError,
    },
}
