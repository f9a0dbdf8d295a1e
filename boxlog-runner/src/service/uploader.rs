//! Batched uploader
//!
//! Accumulates relayed lines and ships them to the sink on a fixed ticker,
//! on cancellation, or when the relay channel closes. The sink's ordering
//! token is threaded from one flush to the next.
//!
//! Delivery is best effort: a rejected batch is logged and dropped, never
//! retried or re-buffered.

use boxlog_core::domain::log::SequenceToken;
use boxlog_sink::{LogSink, SinkError};
use std::sync::Arc;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::UploadError;
use crate::relay::LogReceiver;
use crate::service::batch::LogBatch;

/// Flush interval used when the configured one is zero
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Where and how often to upload
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub log_group: String,
    pub log_stream: String,
    pub flush_interval: Duration,
}

/// Why the uploader stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    SourceClosed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadStats {
    pub batches_delivered: usize,
    pub batches_failed: usize,
    pub lines_delivered: usize,
    pub lines_dropped: usize,
}

/// Summary returned when the uploader stops normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    pub reason: StopReason,
    pub stats: UploadStats,
}

pub struct BatchedUploader {
    sink: Arc<dyn LogSink>,
    group: String,
    stream: String,
    flush_interval: Duration,
    token: Option<SequenceToken>,
    batch: LogBatch,
    stats: UploadStats,
}

impl BatchedUploader {
    pub fn new(sink: Arc<dyn LogSink>, config: UploaderConfig) -> Self {
        let flush_interval = if config.flush_interval.is_zero() {
            DEFAULT_FLUSH_INTERVAL
        } else {
            config.flush_interval
        };

        Self {
            sink,
            group: config.log_group,
            stream: config.log_stream,
            flush_interval,
            token: None,
            batch: LogBatch::new(),
            stats: UploadStats::default(),
        }
    }

    /// Runs until cancellation or until the relay channel closes
    ///
    /// Provisioning always runs to completion, even if `cancel` fires
    /// meanwhile, so lines queued by a short-lived workload still get their
    /// final flush. The caller bounds the whole task.
    ///
    /// Provisioning failures are logged here and returned; they end the
    /// upload without affecting the workload.
    pub async fn write(
        mut self,
        cancel: CancellationToken,
        mut lines: LogReceiver,
    ) -> Result<UploadReport, UploadError> {
        self.token = provision(self.sink.as_ref(), &self.group, &self.stream)
            .await
            .inspect_err(|e| error!("{}", e))?;

        info!(
            "Uploading to {}/{} every {:?}",
            self.group, self.stream, self.flush_interval
        );

        let mut ticker = time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    let queued = self.drain_queued(&mut lines);
                    debug!("Shutdown requested, {} queued line(s) picked up", queued);
                    self.flush(None).await;
                    break StopReason::Cancelled;
                }
                _ = ticker.tick() => {
                    self.flush(Some(&cancel)).await;
                }
                line = lines.recv() => match line {
                    Some(line) => self.batch.push_line(line),
                    None => {
                        self.flush(None).await;
                        info!("Log source ended");
                        break StopReason::SourceClosed;
                    }
                },
            }
        };

        let report = self.report(reason);
        info!(
            "Uploader stopped ({:?}): {} batch(es) delivered, {} failed, {} line(s) dropped",
            report.reason,
            report.stats.batches_delivered,
            report.stats.batches_failed,
            report.stats.lines_dropped
        );
        Ok(report)
    }

    /// Moves lines already sitting in the channel into the batch
    fn drain_queued(&mut self, lines: &mut LogReceiver) -> usize {
        let mut count = 0;
        while let Ok(line) = lines.try_recv() {
            self.batch.push_line(line);
            count += 1;
        }
        count
    }

    /// Ships the whole batch and clears it
    ///
    /// With `cancel` set the request is abandoned if cancellation fires first;
    /// without it the request always runs to completion.
    async fn flush(&mut self, cancel: Option<&CancellationToken>) {
        if self.batch.is_empty() {
            return;
        }

        let events = self.batch.take();
        let count = events.len();
        let put = self
            .sink
            .put_events(&self.group, &self.stream, events, self.token.clone());

        let result = match cancel {
            Some(cancel) => tokio::select! {
                _ = cancel.cancelled() => None,
                result = put => Some(result),
            },
            None => Some(put.await),
        };

        match result {
            Some(Ok(next)) => {
                debug!("Uploaded {} line(s) to {}/{}", count, self.group, self.stream);
                if next.is_some() {
                    self.token = next;
                }
                self.stats.batches_delivered += 1;
                self.stats.lines_delivered += count;
            }
            Some(Err(e)) => {
                error!("Unable to put logs to {}/{}: {}", self.group, self.stream, e);
                self.stats.batches_failed += 1;
                self.stats.lines_dropped += count;
            }
            None => {
                warn!("Upload of {} line(s) abandoned on shutdown", count);
                self.stats.batches_failed += 1;
                self.stats.lines_dropped += count;
            }
        }
    }

    fn report(&self, reason: StopReason) -> UploadReport {
        UploadReport {
            reason,
            stats: self.stats,
        }
    }
}

/// Makes sure the group and stream exist
///
/// # Returns
/// The stream's current ordering token when the stream already existed
async fn provision(
    sink: &dyn LogSink,
    group: &str,
    stream: &str,
) -> Result<Option<SequenceToken>, UploadError> {
    let group_failed = |source: SinkError| UploadError::GroupProvisionFailed {
        group: group.to_string(),
        source,
    };
    let stream_failed = |source: SinkError| UploadError::StreamProvisionFailed {
        group: group.to_string(),
        stream: stream.to_string(),
        source,
    };

    let groups = sink.describe_groups(group).await.map_err(group_failed)?;
    if !groups.iter().any(|g| g.name == group) {
        info!("Creating log group {}", group);
        sink.create_group(group).await.map_err(group_failed)?;
    }

    let streams = sink
        .describe_streams(group, stream)
        .await
        .map_err(stream_failed)?;
    if let Some(existing) = streams.into_iter().find(|s| s.name == stream) {
        debug!("Log stream {}/{} already exists", group, stream);
        return Ok(existing.sequence_token);
    }

    info!("Creating log stream {}/{}", group, stream);
    sink.create_stream(group, stream)
        .await
        .map_err(stream_failed)?;
    Ok(None)
}
