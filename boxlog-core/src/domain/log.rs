//! Log domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// One captured output line, stamped when it reached the uploader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub message: String,
    /// Milliseconds since the Unix epoch
    pub timestamp_millis: i64,
}

impl LogEvent {
    /// Creates an event stamped with the current wall-clock time
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp_millis: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Opaque value issued by the sink that must accompany the next append
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceToken(String);

impl SequenceToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SequenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
