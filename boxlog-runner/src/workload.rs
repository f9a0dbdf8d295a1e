//! Workload controller
//!
//! Owns the single container for the lifetime of the process:
//! - Pulling the image, creating and starting the container
//! - Scanning its output into the relay channel
//! - Waiting for it to exit
//! - Tearing it down (relay close, stop, remove, client release)

use boxlog_core::domain::workload::{WaitOutcome, WorkloadId, WorkloadSpec};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SetupError;
use crate::relay::{self, LogReceiver, LogSender};
use crate::runtime::ContainerRuntime;

/// Default grace period before a stopping container is killed
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest line relayed as a single message; longer lines are split
pub const MAX_LINE_BYTES: usize = 64 * 1024;

pub struct WorkloadController {
    runtime: Arc<dyn ContainerRuntime>,
    spec: WorkloadSpec,
    stop_timeout: Duration,

    /// Written once by `run`, consumed by `close`
    id: Option<WorkloadId>,

    /// The owner's end of the relay channel; dropped by `close`
    log_tx: Option<LogSender>,
    log_rx: Option<LogReceiver>,
    scanner: Option<JoinHandle<()>>,
    released: bool,
}

impl WorkloadController {
    /// Creates a controller for `spec` on an already connected runtime
    ///
    /// # Arguments
    /// * `buffer_lines` - Capacity of the relay channel
    pub fn new(runtime: Arc<dyn ContainerRuntime>, spec: WorkloadSpec, buffer_lines: usize) -> Self {
        let (log_tx, log_rx) = relay::channel(buffer_lines);
        Self {
            runtime,
            spec,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            id: None,
            log_tx: Some(log_tx),
            log_rx: Some(log_rx),
            scanner: None,
            released: false,
        }
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// Pulls, creates and starts the workload, then starts scanning its output
    ///
    /// Returns as soon as the workload is running. If `cancel` fires first,
    /// the pending step is abandoned and [`SetupError::Interrupted`] is
    /// returned. Creation is never abandoned halfway, so a created container
    /// is always known to `close`.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), SetupError> {
        tokio::select! {
            _ = cancel.cancelled() => return Err(SetupError::Interrupted { stage: "image pull" }),
            pulled = self.runtime.pull_image(&self.spec.image) => {
                pulled.map_err(|source| SetupError::ImagePullFailed {
                    image: self.spec.image.clone(),
                    source,
                })?;
            }
        }

        if cancel.is_cancelled() {
            return Err(SetupError::Interrupted { stage: "workload creation" });
        }
        let id = self
            .runtime
            .create_workload(&self.spec)
            .await
            .map_err(SetupError::WorkloadStartFailed)?;
        self.id = Some(id.clone());

        tokio::select! {
            _ = cancel.cancelled() => return Err(SetupError::Interrupted { stage: "workload start" }),
            started = self.runtime.start_workload(&id) => started.map_err(SetupError::WorkloadStartFailed)?,
        }
        info!("Workload {} started: {}", id.short(), self.spec.command);

        let tx = self
            .log_tx
            .clone()
            .ok_or_else(|| SetupError::WorkloadStartFailed(anyhow::anyhow!("controller already closed")))?;
        let runtime = Arc::clone(&self.runtime);
        self.scanner = Some(tokio::spawn(async move {
            match runtime.stream_output(&id).await {
                Ok(output) => scan_output(output, tx, cancel, &id).await,
                Err(e) => error!("Unable to fetch logs of workload {}: {:#}", id.short(), e),
            }
        }));

        Ok(())
    }

    /// Hands out the read end of the relay channel (once)
    pub fn logs(&mut self) -> Option<LogReceiver> {
        self.log_rx.take()
    }

    /// Blocks until the workload exits or `cancel` fires
    ///
    /// Runtime errors are logged, never returned.
    pub async fn wait(&self, cancel: &CancellationToken) -> WaitOutcome {
        let Some(id) = &self.id else {
            warn!("Wait called before the workload was created");
            return WaitOutcome::Failed;
        };

        tokio::select! {
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
            result = self.runtime.wait_for_exit(id) => match result {
                Ok(code) => {
                    info!("Workload {} exited with code {}", id.short(), code);
                    WaitOutcome::Exited { code }
                }
                Err(e) => {
                    error!("Error in workload {}: {:#}", id.short(), e);
                    WaitOutcome::Failed
                }
            },
        }
    }

    /// Gives the scanner up to `timeout` to reach the end of the output
    ///
    /// Returns `true` if the scanner finished (or never ran).
    pub async fn drain_output(&mut self, timeout: Duration) -> bool {
        let Some(scanner) = self.scanner.as_mut() else {
            return true;
        };

        match tokio::time::timeout(timeout, scanner).await {
            Ok(_) => {
                self.scanner = None;
                true
            }
            Err(_) => {
                debug!("Output still open after {:?}", timeout);
                false
            }
        }
    }

    /// Tears the workload down; safe to call more than once
    ///
    /// Closes the relay channel first, then stops, removes and releases.
    /// A failing step is logged and does not prevent the next one.
    pub async fn close(&mut self) {
        let relay_open = self.log_tx.take().is_some();
        self.log_rx = None;
        if let Some(scanner) = self.scanner.take() {
            scanner.abort();
            let _ = scanner.await;
        }
        if relay_open {
            debug!("Relay channel closed");
        }

        if let Some(id) = self.id.take() {
            if let Err(e) = self.runtime.stop_workload(&id, self.stop_timeout).await {
                error!("Unable to stop workload {}: {:#}", id.short(), e);
            }
            if let Err(e) = self.runtime.remove_workload(&id, true).await {
                error!("Unable to remove workload {}: {:#}", id.short(), e);
            } else {
                info!("Workload {} removed", id.short());
            }
        }

        if !self.released {
            self.released = true;
            if let Err(e) = self.runtime.release().await {
                error!("Unable to close runtime client: {:#}", e);
            }
        } else {
            debug!("Workload controller already closed");
        }
    }
}

impl Drop for WorkloadController {
    fn drop(&mut self) {
        if let Some(id) = &self.id {
            warn!("Workload {} dropped without close; it may still be running", id.short());
        }
    }
}

/// Forwards each output line into the relay channel
///
/// Lines longer than [`MAX_LINE_BYTES`] are relayed in pieces of at most
/// that size. Stops at end of output, on cancellation, or when the consumer
/// is gone. Never closes the channel; its owner does.
async fn scan_output<R>(output: R, tx: LogSender, cancel: CancellationToken, id: &WorkloadId)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(output);
    let mut buf: Vec<u8> = Vec::with_capacity(8 * 1024);

    loop {
        buf.clear();

        let mut line_reader = (&mut reader).take(MAX_LINE_BYTES as u64);
        let read = tokio::select! {
            _ = cancel.cancelled() => return,
            r = line_reader.read_until(b'\n', &mut buf) => r,
        };

        match read {
            Ok(0) => {
                debug!("Output of workload {} ended", id.short());
                return;
            }
            Ok(_) => {
                if cancel.is_cancelled() {
                    return;
                }

                let line = trim_newline(&buf);
                // the sink rejects empty messages
                if line.is_empty() {
                    continue;
                }
                let line = String::from_utf8_lossy(line).into_owned();

                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(line) => if sent.is_err() {
                        warn!("Log consumer is gone, no longer relaying output of {}", id.short());
                        return;
                    },
                }
            }
            Err(e) => {
                warn!("Error reading output of workload {}: {}", id.short(), e);
                return;
            }
        }
    }
}

/// Strips one trailing `\n`, then one trailing `\r`
fn trim_newline(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}
