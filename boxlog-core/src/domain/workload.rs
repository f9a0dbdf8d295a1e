//! Workload domain model
//!
//! Describes the single process run inside the container runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What to run: an image and a shell command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Image reference (e.g., docker.io/library/alpine:latest)
    pub image: String,

    /// Command line executed under `/bin/sh -c`
    pub command: String,
}

impl WorkloadSpec {
    pub fn new(image: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: command.into(),
        }
    }
}

/// Runtime-assigned identifier of a created workload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkloadId(String);

impl WorkloadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used in log lines
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a wait on the workload ended
///
/// Callers treat every variant as "the workload is done"; the value only
/// feeds the final status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitOutcome {
    /// The workload exited on its own
    Exited { code: i64 },

    /// Cancellation fired before the workload exited
    Cancelled,

    /// The runtime reported an error while waiting
    Failed,
}

impl fmt::Display for WaitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitOutcome::Exited { code } => write!(f, "exited with code {}", code),
            WaitOutcome::Cancelled => write!(f, "cancelled"),
            WaitOutcome::Failed => write!(f, "wait failed"),
        }
    }
}
