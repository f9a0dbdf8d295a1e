//! Test doubles for the runtime and sink seams

use anyhow::Result;
use async_trait::async_trait;
use boxlog_core::domain::log::{LogEvent, SequenceToken};
use boxlog_core::domain::sink::{LogGroup, LogStream};
use boxlog_core::domain::workload::{WorkloadId, WorkloadSpec};
use boxlog_sink::{LogSink, SinkError};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::watch;

use crate::runtime::{ContainerRuntime, OutputStream};

/// One recorded `put_events` call
#[derive(Debug, Clone)]
pub struct PutCall {
    pub messages: Vec<String>,
    pub events: Vec<LogEvent>,
    pub token: Option<SequenceToken>,
}

/// In-memory sink that records every call
#[derive(Default)]
pub struct RecordingSink {
    pub groups: Mutex<Vec<String>>,
    pub streams: Mutex<Vec<LogStream>>,
    pub calls: Mutex<Vec<&'static str>>,
    pub puts: Mutex<Vec<PutCall>>,
    /// Scripted put outcomes; `true` fails the call. Empty means success.
    pub put_failures: Mutex<VecDeque<bool>>,
    pub fail_describe_groups: bool,
    pub fail_create_stream: bool,
    /// Latency of each describe call
    pub provision_delay: Duration,
    pub put_delay: Duration,
    pub issued: Mutex<usize>,
}

impl RecordingSink {
    /// Sink where `group` already exists but no stream does
    pub fn with_group(group: &str) -> Self {
        let sink = Self::default();
        sink.groups.lock().unwrap().push(group.to_string());
        sink
    }

    pub fn with_stream(self, name: &str, token: Option<&str>) -> Self {
        self.streams.lock().unwrap().push(LogStream {
            name: name.to_string(),
            sequence_token: token.map(SequenceToken::new),
        });
        self
    }

    pub fn fail_puts(&self, script: &[bool]) {
        self.put_failures.lock().unwrap().extend(script.iter().copied());
    }

    pub fn puts(&self) -> Vec<PutCall> {
        self.puts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// Every delivered message, across batches, in delivery order
    pub fn delivered(&self) -> Vec<String> {
        self.puts()
            .into_iter()
            .flat_map(|p| p.messages)
            .collect()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl LogSink for RecordingSink {
    async fn describe_groups(&self, prefix: &str) -> boxlog_sink::Result<Vec<LogGroup>> {
        self.record("describe_groups");
        if !self.provision_delay.is_zero() {
            tokio::time::sleep(self.provision_delay).await;
        }
        if self.fail_describe_groups {
            return Err(SinkError::request_failed("DescribeLogGroups", "access denied"));
        }
        Ok(self
            .groups
            .lock()
            .unwrap()
            .iter()
            .filter(|g| g.starts_with(prefix))
            .map(|g| LogGroup { name: g.clone() })
            .collect())
    }

    async fn create_group(&self, name: &str) -> boxlog_sink::Result<()> {
        self.record("create_group");
        self.groups.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn describe_streams(
        &self,
        _group: &str,
        prefix: &str,
    ) -> boxlog_sink::Result<Vec<LogStream>> {
        self.record("describe_streams");
        if !self.provision_delay.is_zero() {
            tokio::time::sleep(self.provision_delay).await;
        }
        Ok(self
            .streams
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn create_stream(&self, _group: &str, name: &str) -> boxlog_sink::Result<()> {
        self.record("create_stream");
        if self.fail_create_stream {
            return Err(SinkError::request_failed("CreateLogStream", "limit exceeded"));
        }
        self.streams.lock().unwrap().push(LogStream {
            name: name.to_string(),
            sequence_token: None,
        });
        Ok(())
    }

    async fn put_events(
        &self,
        _group: &str,
        _stream: &str,
        events: Vec<LogEvent>,
        token: Option<SequenceToken>,
    ) -> boxlog_sink::Result<Option<SequenceToken>> {
        self.record("put_events");
        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }

        self.puts.lock().unwrap().push(PutCall {
            messages: events.iter().map(|e| e.message.clone()).collect(),
            events,
            token,
        });

        let fail = self.put_failures.lock().unwrap().pop_front().unwrap_or(false);
        if fail {
            return Err(SinkError::request_failed(
                "PutLogEvents",
                "InvalidSequenceTokenException",
            ));
        }

        let mut issued = self.issued.lock().unwrap();
        *issued += 1;
        Ok(Some(SequenceToken::new(format!("token-{}", issued))))
    }
}

/// Scripted container runtime
///
/// Output is fed through the returned duplex writer; exit is triggered with
/// [`FakeRuntime::exit`].
pub struct FakeRuntime {
    pub calls: Mutex<Vec<String>>,
    output: Mutex<Option<DuplexStream>>,
    exit_tx: watch::Sender<Option<i64>>,
    pub fail_pull: bool,
    /// How long `pull_image` takes
    pub pull_delay: Duration,
    pub fail_start: bool,
    pub fail_wait: bool,
    pub fail_stop: bool,
}

impl FakeRuntime {
    /// Returns the runtime and the write half of the workload's output
    pub fn new() -> (Self, DuplexStream) {
        let (writer, reader) = tokio::io::duplex(64 * 1024);
        let (exit_tx, _) = watch::channel(None);
        let runtime = Self {
            calls: Mutex::new(Vec::new()),
            output: Mutex::new(Some(reader)),
            exit_tx,
            fail_pull: false,
            pull_delay: Duration::ZERO,
            fail_start: false,
            fail_wait: false,
            fail_stop: false,
        };
        (runtime, writer)
    }

    /// Makes the workload exit with `code`
    pub fn exit(&self, code: i64) {
        self.exit_tx.send_replace(Some(code));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn pull_image(&self, image: &str) -> Result<()> {
        self.record(format!("pull {}", image));
        if !self.pull_delay.is_zero() {
            tokio::time::sleep(self.pull_delay).await;
        }
        if self.fail_pull {
            anyhow::bail!("manifest for {} not found", image);
        }
        Ok(())
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<WorkloadId> {
        self.record(format!("create {}", spec.command));
        Ok(WorkloadId::new("c0ffee0000000000"))
    }

    async fn start_workload(&self, id: &WorkloadId) -> Result<()> {
        self.record(format!("start {}", id));
        if self.fail_start {
            anyhow::bail!("executable file not found");
        }
        Ok(())
    }

    async fn stream_output(&self, id: &WorkloadId) -> Result<OutputStream> {
        self.record(format!("logs {}", id));
        let reader = self
            .output
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow::anyhow!("output already streamed"))?;
        Ok(Box::new(reader))
    }

    async fn wait_for_exit(&self, id: &WorkloadId) -> Result<i64> {
        self.record(format!("wait {}", id));
        if self.fail_wait {
            anyhow::bail!("no such container");
        }
        let mut rx = self.exit_tx.subscribe();
        let code = *rx.wait_for(Option::is_some).await?;
        Ok(code.unwrap_or_default())
    }

    async fn stop_workload(&self, id: &WorkloadId, grace: Duration) -> Result<()> {
        self.record(format!("stop {} {}s", id, grace.as_secs()));
        if self.fail_stop {
            anyhow::bail!("container already stopped");
        }
        Ok(())
    }

    async fn remove_workload(&self, id: &WorkloadId, force: bool) -> Result<()> {
        self.record(format!("rm {} force={}", id, force));
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        self.record("release");
        Ok(())
    }
}
