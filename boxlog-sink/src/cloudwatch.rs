//! CloudWatch Logs implementation of the sink
//!
//! Thin adapter over `aws-sdk-cloudwatchlogs`: converts domain types to SDK
//! shapes and flattens SDK errors into [`SinkError`].

use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::Client;
use aws_sdk_cloudwatchlogs::config::retry::RetryConfig;
use aws_sdk_cloudwatchlogs::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_cloudwatchlogs::error::DisplayErrorContext;
use aws_sdk_cloudwatchlogs::types::InputLogEvent;
use boxlog_core::domain::log::{LogEvent, SequenceToken};
use boxlog_core::domain::sink::{LogGroup, LogStream};
use tracing::debug;

use crate::LogSink;
use crate::error::{Result, SinkError};

/// Attempts per request, including the first one
const MAX_ATTEMPTS: u32 = 10;

/// PutLogEvents limits
const MAX_REQUEST_EVENTS: usize = 10_000;
const MAX_REQUEST_BYTES: usize = 1_048_576;
const MAX_EVENT_BYTES: usize = 256 * 1024;
/// Per-event overhead counted against both byte limits
const EVENT_OVERHEAD_BYTES: usize = 26;

/// Connection settings for CloudWatch Logs
#[derive(Clone)]
pub struct CloudWatchConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl std::fmt::Debug for CloudWatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudWatchConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

impl CloudWatchConfig {
    fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(SinkError::InvalidConfig("region cannot be empty".to_string()));
        }
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err(SinkError::InvalidConfig(
                "access key id and secret access key are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// CloudWatch Logs client
#[derive(Debug, Clone)]
pub struct CloudWatchSink {
    client: Client,
    region: String,
}

impl CloudWatchSink {
    /// Creates a client with static credentials and standard retries
    pub fn new(config: CloudWatchConfig) -> Result<Self> {
        config.validate()?;

        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "boxlog-static",
        );

        let sdk_config = aws_sdk_cloudwatchlogs::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::standard().with_max_attempts(MAX_ATTEMPTS))
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            region: config.region,
        })
    }

    /// Region this client talks to
    pub fn region(&self) -> &str {
        &self.region
    }

    /// One PutLogEvents request; `events` must fit the request limits
    #[allow(deprecated)]
    async fn put_chunk(
        &self,
        group: &str,
        stream: &str,
        events: Vec<LogEvent>,
        token: Option<SequenceToken>,
    ) -> Result<Option<SequenceToken>> {
        let count = events.len();
        let events = events
            .into_iter()
            .map(to_input_event)
            .collect::<Result<Vec<_>>>()?;

        let output = self
            .client
            .put_log_events()
            .log_group_name(group)
            .log_stream_name(stream)
            .set_log_events(Some(events))
            .set_sequence_token(token.map(SequenceToken::into_inner))
            .send()
            .await
            .map_err(|e| {
                SinkError::request_failed("PutLogEvents", DisplayErrorContext(&e).to_string())
            })?;

        if let Some(rejected) = output.rejected_log_events_info() {
            debug!(
                "PutLogEvents rejected part of the batch: too_old_end={:?}, too_new_start={:?}, expired_end={:?}",
                rejected.too_old_log_event_end_index(),
                rejected.too_new_log_event_start_index(),
                rejected.expired_log_event_end_index()
            );
        }

        debug!("Delivered {} event(s) to {}/{}", count, group, stream);

        Ok(output.next_sequence_token().map(SequenceToken::new))
    }
}

/// Cuts `message` to the largest event CloudWatch accepts, on a char boundary
///
/// Returns `true` if the message was cut.
fn truncate_message(message: &mut String) -> bool {
    let limit = MAX_EVENT_BYTES - EVENT_OVERHEAD_BYTES;
    if message.len() <= limit {
        return false;
    }
    let mut end = limit;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message.truncate(end);
    true
}

/// Splits an ordered batch into request-sized chunks, keeping the order
fn chunk_events(events: Vec<LogEvent>) -> Vec<Vec<LogEvent>> {
    let mut chunks = Vec::new();
    let mut current: Vec<LogEvent> = Vec::new();
    let mut current_bytes = 0;

    for mut event in events {
        if truncate_message(&mut event.message) {
            debug!("Truncated a log event to {} bytes", event.message.len());
        }

        let size = event.message.len() + EVENT_OVERHEAD_BYTES;
        if !current.is_empty()
            && (current.len() == MAX_REQUEST_EVENTS || current_bytes + size > MAX_REQUEST_BYTES)
        {
            chunks.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current_bytes += size;
        current.push(event);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Delivers `events` chunk by chunk, each chunk using the token returned
/// for the previous one
///
/// Stops at the first failing chunk; chunks already sent stay delivered.
async fn put_in_chunks<F, Fut>(
    events: Vec<LogEvent>,
    mut token: Option<SequenceToken>,
    mut put: F,
) -> Result<Option<SequenceToken>>
where
    F: FnMut(Vec<LogEvent>, Option<SequenceToken>) -> Fut,
    Fut: Future<Output = Result<Option<SequenceToken>>>,
{
    let mut latest = None;
    for chunk in chunk_events(events) {
        if let Some(next) = put(chunk, token.clone()).await? {
            token = Some(next.clone());
            latest = Some(next);
        }
    }
    Ok(latest)
}

fn to_input_event(event: LogEvent) -> Result<InputLogEvent> {
    InputLogEvent::builder()
        .message(event.message)
        .timestamp(event.timestamp_millis)
        .build()
        .map_err(|e| SinkError::InvalidEvent(e.to_string()))
}

#[async_trait]
impl LogSink for CloudWatchSink {
    async fn describe_groups(&self, prefix: &str) -> Result<Vec<LogGroup>> {
        let output = self
            .client
            .describe_log_groups()
            .log_group_name_prefix(prefix)
            .send()
            .await
            .map_err(|e| {
                SinkError::request_failed("DescribeLogGroups", DisplayErrorContext(&e).to_string())
            })?;

        Ok(output
            .log_groups()
            .iter()
            .filter_map(|group| group.log_group_name())
            .map(|name| LogGroup {
                name: name.to_string(),
            })
            .collect())
    }

    async fn create_group(&self, name: &str) -> Result<()> {
        match self
            .client
            .create_log_group()
            .log_group_name(name)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_already_exists_exception()) =>
            {
                debug!("Log group {} was created concurrently", name);
                Ok(())
            }
            Err(e) => Err(SinkError::request_failed(
                "CreateLogGroup",
                DisplayErrorContext(&e).to_string(),
            )),
        }
    }

    #[allow(deprecated)]
    async fn describe_streams(&self, group: &str, prefix: &str) -> Result<Vec<LogStream>> {
        let output = self
            .client
            .describe_log_streams()
            .log_group_name(group)
            .log_stream_name_prefix(prefix)
            .send()
            .await
            .map_err(|e| {
                SinkError::request_failed("DescribeLogStreams", DisplayErrorContext(&e).to_string())
            })?;

        Ok(output
            .log_streams()
            .iter()
            .filter_map(|stream| {
                stream.log_stream_name().map(|name| LogStream {
                    name: name.to_string(),
                    sequence_token: stream.upload_sequence_token().map(SequenceToken::new),
                })
            })
            .collect())
    }

    async fn create_stream(&self, group: &str, name: &str) -> Result<()> {
        match self
            .client
            .create_log_stream()
            .log_group_name(group)
            .log_stream_name(name)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_already_exists_exception()) =>
            {
                debug!("Log stream {}/{} was created concurrently", group, name);
                Ok(())
            }
            Err(e) => Err(SinkError::request_failed(
                "CreateLogStream",
                DisplayErrorContext(&e).to_string(),
            )),
        }
    }

    async fn put_events(
        &self,
        group: &str,
        stream: &str,
        events: Vec<LogEvent>,
        token: Option<SequenceToken>,
    ) -> Result<Option<SequenceToken>> {
        put_in_chunks(events, token, move |chunk, token| {
            self.put_chunk(group, stream, chunk, token)
        })
        .await
    }
}
