//! Run supervisor
//!
//! Wires the running workload to the uploader and enforces the teardown order:
//! 1. Start the uploader on the shared cancellation token
//! 2. Wait for the workload to exit or for the token to fire
//! 3. Let the output tail reach the relay if the workload exited on its own
//! 4. Fire the token, close the workload, wait for the final upload

use boxlog_core::domain::workload::WaitOutcome;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::service::{BatchedUploader, UploadReport};
use crate::shutdown::Shutdown;
use crate::workload::WorkloadController;

/// Upper bounds for the shutdown phases
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Time the output scanner gets to reach end of output after exit
    pub output_drain: Duration,

    /// Time the uploader gets for its final flush
    pub shutdown: Duration,
}

/// What happened during the run
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub outcome: WaitOutcome,

    /// `None` if the uploader failed, panicked or ran out of time
    pub upload: Option<UploadReport>,
}

/// Drives a running workload to completion
///
/// `workload` must have been started with `shutdown`'s token.
pub async fn supervise(
    mut workload: WorkloadController,
    uploader: BatchedUploader,
    shutdown: &Shutdown,
    timeouts: Timeouts,
) -> RunSummary {
    let token = shutdown.token();

    let mut upload_task = match workload.logs() {
        Some(lines) => Some(tokio::spawn(uploader.write(token.clone(), lines))),
        None => {
            warn!("Relay channel already taken, output will not be uploaded");
            None
        }
    };

    let outcome = workload.wait(&token).await;
    info!("Workload finished: {}", outcome);

    if matches!(outcome, WaitOutcome::Exited { .. })
        && !workload.drain_output(timeouts.output_drain).await
    {
        warn!(
            "Output did not end within {:?} of exit, remaining lines are dropped",
            timeouts.output_drain
        );
    }

    shutdown.cancel();
    workload.close().await;

    let upload = match upload_task.as_mut() {
        Some(task) => match tokio::time::timeout(timeouts.shutdown, &mut *task).await {
            Ok(Ok(Ok(report))) => Some(report),
            Ok(Ok(Err(e))) => {
                debug!("Uploader ended early: {}", e);
                None
            }
            Ok(Err(e)) => {
                error!("Uploader task failed: {}", e);
                None
            }
            Err(_) => {
                warn!(
                    "Final upload did not finish within {:?}, abandoning it",
                    timeouts.shutdown
                );
                task.abort();
                None
            }
        },
        None => None,
    };

    RunSummary { outcome, upload }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{StopReason, UploaderConfig};
    use crate::testing::{FakeRuntime, RecordingSink};
    use boxlog_core::domain::workload::WorkloadSpec;
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;

    const TIMEOUTS: Timeouts = Timeouts {
        output_drain: Duration::from_secs(2),
        shutdown: Duration::from_secs(10),
    };

    fn uploader(sink: &Arc<RecordingSink>) -> BatchedUploader {
        BatchedUploader::new(
            sink.clone(),
            UploaderConfig {
                log_group: "g".to_string(),
                log_stream: "s".to_string(),
                flush_interval: Duration::from_secs(3),
            },
        )
    }

    async fn started(runtime: &Arc<FakeRuntime>, shutdown: &Shutdown) -> WorkloadController {
        let mut workload =
            WorkloadController::new(runtime.clone(), WorkloadSpec::new("alpine", "yes"), 100);
        workload.run(shutdown.token()).await.unwrap();
        workload
    }

    fn assert_torn_down(runtime: &FakeRuntime) {
        let calls = runtime.calls();
        let tail = &calls[calls.len() - 3..];
        assert!(tail[0].starts_with("stop "), "{:?}", calls);
        assert!(tail[1].starts_with("rm "), "{:?}", calls);
        assert_eq!(tail[2], "release");
    }

    #[tokio::test(start_paused = true)]
    async fn test_workload_exit_ships_every_line_and_tears_down() {
        let (fake, mut writer) = FakeRuntime::new();
        let runtime = Arc::new(fake);
        let sink = Arc::new(RecordingSink::default());
        let shutdown = Shutdown::new();
        let workload = started(&runtime, &shutdown).await;

        writer.write_all(b"a\nb\nc\n").await.unwrap();
        drop(writer);
        runtime.exit(0);

        let summary = supervise(workload, uploader(&sink), &shutdown, TIMEOUTS).await;

        assert_eq!(summary.outcome, WaitOutcome::Exited { code: 0 });
        assert_eq!(sink.delivered(), ["a", "b", "c"]);
        assert!(summary.upload.is_some());
        assert!(shutdown.token().is_cancelled());
        assert_torn_down(&runtime);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_lived_workload_outpaces_slow_provisioning() {
        let (fake, mut writer) = FakeRuntime::new();
        let runtime = Arc::new(fake);
        let mut sink = RecordingSink::default();
        sink.provision_delay = Duration::from_millis(300);
        let sink = Arc::new(sink);
        let shutdown = Shutdown::new();
        let workload = started(&runtime, &shutdown).await;

        writer.write_all(b"a\nb\nc\n").await.unwrap();
        drop(writer);
        runtime.exit(0);

        let summary = supervise(workload, uploader(&sink), &shutdown, TIMEOUTS).await;

        assert_eq!(summary.outcome, WaitOutcome::Exited { code: 0 });
        assert_eq!(sink.delivered(), ["a", "b", "c"]);
        let report = summary.upload.unwrap();
        assert_eq!(report.reason, StopReason::Cancelled);
        assert_eq!(report.stats.lines_delivered, 3);
        assert_eq!(report.stats.lines_dropped, 0);
        assert_torn_down(&runtime);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_flushes_and_tears_down() {
        let (fake, mut writer) = FakeRuntime::new();
        let runtime = Arc::new(fake);
        let sink = Arc::new(RecordingSink::default());
        let shutdown = Shutdown::new();
        let workload = started(&runtime, &shutdown).await;

        writer.write_all(b"working\n").await.unwrap();
        let interrupt = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            interrupt.cancel();
        });

        let summary = supervise(workload, uploader(&sink), &shutdown, TIMEOUTS).await;

        assert_eq!(summary.outcome, WaitOutcome::Cancelled);
        assert_eq!(sink.delivered(), ["working"]);
        assert_eq!(summary.upload.map(|r| r.reason), Some(StopReason::Cancelled));
        assert_torn_down(&runtime);
        drop(writer);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provisioning_failure_leaves_workload_running() {
        let (fake, _writer) = FakeRuntime::new();
        let runtime = Arc::new(fake);
        let sink = Arc::new(RecordingSink {
            fail_describe_groups: true,
            ..RecordingSink::default()
        });
        let shutdown = Shutdown::new();
        let workload = started(&runtime, &shutdown).await;

        let exit = runtime.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            exit.exit(1);
        });

        let summary = supervise(workload, uploader(&sink), &shutdown, TIMEOUTS).await;

        assert_eq!(summary.outcome, WaitOutcome::Exited { code: 1 });
        assert!(summary.upload.is_none());
        assert!(sink.puts().is_empty());
        assert_torn_down(&runtime);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_upload_is_bounded() {
        let (fake, mut writer) = FakeRuntime::new();
        let runtime = Arc::new(fake);
        let mut sink = RecordingSink::default();
        sink.put_delay = Duration::from_secs(600);
        let sink = Arc::new(sink);
        let shutdown = Shutdown::new();
        let workload = started(&runtime, &shutdown).await;

        writer.write_all(b"stuck\n").await.unwrap();
        drop(writer);
        runtime.exit(0);

        let summary = supervise(workload, uploader(&sink), &shutdown, TIMEOUTS).await;

        assert!(summary.upload.is_none());
        assert!(sink.puts().is_empty());
        assert_torn_down(&runtime);
    }
}
