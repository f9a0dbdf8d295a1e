//! Boxlog Sink Client
//!
//! Client side of the remote append-only log sink.
//!
//! The [`LogSink`] trait is the seam the uploader talks to; [`CloudWatchSink`]
//! implements it on top of AWS CloudWatch Logs.
//!
//! # Example
//!
//! ```no_run
//! use boxlog_core::domain::log::LogEvent;
//! use boxlog_sink::{CloudWatchConfig, CloudWatchSink, LogSink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), boxlog_sink::SinkError> {
//!     let sink = CloudWatchSink::new(CloudWatchConfig {
//!         access_key_id: "AKIA...".to_string(),
//!         secret_access_key: "secret".to_string(),
//!         region: "eu-west-1".to_string(),
//!     })?;
//!
//!     let next = sink
//!         .put_events("my-group", "my-stream", vec![LogEvent::now("hello")], None)
//!         .await?;
//!     println!("next token: {:?}", next);
//!     Ok(())
//! }
//! ```

mod cloudwatch;
pub mod error;

// Re-export commonly used types
pub use cloudwatch::{CloudWatchConfig, CloudWatchSink};
pub use error::{Result, SinkError};

use async_trait::async_trait;
use boxlog_core::domain::log::{LogEvent, SequenceToken};
use boxlog_core::domain::sink::{LogGroup, LogStream};

/// Remote append-only log sink
///
/// Every call is fallible and none of them retry on their own behalf;
/// retry policy belongs to the implementation's transport.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Lists log groups whose name starts with `prefix`
    async fn describe_groups(&self, prefix: &str) -> Result<Vec<LogGroup>>;

    /// Creates a log group; an already existing group is not an error
    async fn create_group(&self, name: &str) -> Result<()>;

    /// Lists streams of `group` whose name starts with `prefix`
    async fn describe_streams(&self, group: &str, prefix: &str) -> Result<Vec<LogStream>>;

    /// Creates a stream in `group`; an already existing stream is not an error
    async fn create_stream(&self, group: &str, name: &str) -> Result<()>;

    /// Appends an ordered batch of events
    ///
    /// # Arguments
    /// * `token` - Token returned by the previous append, `None` before the first
    ///
    /// # Returns
    /// The token to present with the next append, if the sink issued one
    async fn put_events(
        &self,
        group: &str,
        stream: &str,
        events: Vec<LogEvent>,
        token: Option<SequenceToken>,
    ) -> Result<Option<SequenceToken>>;
}
