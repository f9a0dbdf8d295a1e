//! Remote sink resources

use serde::{Deserialize, Serialize};

use super::log::SequenceToken;

/// A log group known to the sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogGroup {
    pub name: String,
}

/// A log stream inside a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStream {
    pub name: String,

    /// Token to present with the next append, if the sink issued one
    pub sequence_token: Option<SequenceToken>,
}
