//! Run-state event sinks and the best-effort recorder in front of them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use basecamp_core::error::RunLogError;
use basecamp_core::message::ToolCall;
use basecamp_core::run::{RunEvent, RunEventKind, RunLog, RunState};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

// ── Recorder ──────────────────────────────────────────────────────────────

/// Writes run events without ever failing the caller.
///
/// Every method reports whether the write landed; failures are logged.
#[derive(Clone, Default)]
pub struct RunRecorder {
    log: Option<Arc<dyn RunLog>>,
}

impl RunRecorder {
    pub fn new(log: Arc<dyn RunLog>) -> Self {
        Self { log: Some(log) }
    }

    /// A recorder that drops everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub async fn record(&self, run: &RunState, kind: RunEventKind) -> bool {
        let Some(log) = &self.log else {
            return false;
        };
        let event = run.event(kind);
        let event_type = event.kind.event_type();
        match log.append(event).await {
            Ok(()) => {
                debug!(run_id = %run.run_id, event_type, "Run event recorded");
                true
            }
            Err(e) => {
                warn!(run_id = %run.run_id, event_type, error = %e, "Failed to record run event");
                false
            }
        }
    }

    pub async fn started(&self, run: &RunState) -> bool {
        self.record(
            run,
            RunEventKind::RunStarted {
                max_iterations: run.max_iterations(),
                tool_timeout_ms: run.tool_timeout.as_millis() as u64,
                approval_policy: run.approval_policy,
            },
        )
        .await
    }

    pub async fn tool_executing(&self, run: &RunState, call: &ToolCall) -> bool {
        self.record(
            run,
            RunEventKind::ToolExecuting {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        )
        .await
    }

    pub async fn tool_result(&self, run: &RunState, call: &ToolCall, result: &str) -> bool {
        self.record(
            run,
            RunEventKind::ToolResult {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                result: result.to_string(),
            },
        )
        .await
    }

    /// Tool-scoped failure; the run goes on.
    pub async fn tool_failed(&self, run: &RunState, call: &ToolCall, error: &str) -> bool {
        self.record(
            run,
            RunEventKind::RunFailed {
                tool_call_id: Some(call.id.clone()),
                tool_name: Some(call.name.clone()),
                error: error.to_string(),
            },
        )
        .await
    }

    /// Run-level failure; terminal.
    pub async fn run_failed(&self, run: &RunState, error: &str) -> bool {
        self.record(
            run,
            RunEventKind::RunFailed {
                tool_call_id: None,
                tool_name: None,
                error: error.to_string(),
            },
        )
        .await
    }

    pub async fn completed(&self, run: &RunState, iterations: u32) -> bool {
        self.record(run, RunEventKind::RunCompleted { iterations }).await
    }
}

// ── In-memory sink ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryRunLog {
    events: RwLock<Vec<RunEvent>>,
}

impl InMemoryRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<RunEvent> {
        self.events.read().await.clone()
    }

    pub async fn events_for(&self, run_id: &str) -> Vec<RunEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RunLog for InMemoryRunLog {
    async fn append(&self, event: RunEvent) -> Result<(), RunLogError> {
        self.events.write().await.push(event);
        Ok(())
    }
}

// ── JSON-lines sink ───────────────────────────────────────────────────────

/// Appends one JSON object per line. Writers are serialized.
pub struct JsonlRunLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every event in the file.
    pub async fn read_all(&self) -> Result<Vec<RunEvent>, RunLogError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(RunLogError::from))
            .collect()
    }
}

#[async_trait]
impl RunLog for JsonlRunLog {
    async fn append(&self, event: RunEvent) -> Result<(), RunLogError> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenLog;

    #[async_trait]
    impl RunLog for BrokenLog {
        async fn append(&self, _event: RunEvent) -> Result<(), RunLogError> {
            Err(RunLogError::Write("disk full".into()))
        }
    }

    #[tokio::test]
    async fn recorder_reports_success_and_failure() {
        let run = RunState::new("camp-1");
        let log = Arc::new(InMemoryRunLog::new());
        assert!(RunRecorder::new(log.clone()).started(&run).await);
        assert_eq!(log.events_for(&run.run_id).await.len(), 1);

        assert!(!RunRecorder::new(Arc::new(BrokenLog)).started(&run).await);
        assert!(!RunRecorder::disabled().completed(&run, 0).await);
    }

    #[tokio::test]
    async fn started_snapshots_run_settings() {
        let run = RunState::new("camp-1").with_max_iterations(3);
        let log = Arc::new(InMemoryRunLog::new());
        RunRecorder::new(log.clone()).started(&run).await;
        match &log.events().await[0].kind {
            RunEventKind::RunStarted {
                max_iterations,
                tool_timeout_ms,
                ..
            } => {
                assert_eq!(*max_iterations, 3);
                assert_eq!(*tool_timeout_ms, 30_000);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn tool_failures_are_not_terminal() {
        let run = RunState::new("camp-1");
        let log = Arc::new(InMemoryRunLog::new());
        let recorder = RunRecorder::new(log.clone());
        let call = ToolCall::new("call_1", "write_file", "{}");
        recorder.tool_failed(&run, &call, "denied").await;
        recorder.run_failed(&run, "loop exceeded").await;

        let events = log.events().await;
        assert!(!events[0].is_terminal());
        assert!(events[1].is_terminal());
    }

    #[tokio::test]
    async fn jsonl_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlRunLog::new(dir.path().join("runs").join("events.jsonl"));
        let run = RunState::new("camp-1");
        let call = ToolCall::new("call_1", "read_file", r#"{"path":"a"}"#);
        log.append(run.event(RunEventKind::ToolExecuting {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
        }))
        .await
        .unwrap();
        log.append(run.event(RunEventKind::RunCompleted { iterations: 1 }))
            .await
            .unwrap();

        let events = log.read_all().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind.event_type(), "tool_executing");
        assert!(events[1].is_terminal());
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(JsonlRunLog::new(dir.path().join("events.jsonl")));
        let mut handles = Vec::new();
        for i in 0..16 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let run = RunState::new(format!("camp-{i}"));
                log.append(run.event(RunEventKind::RunCompleted { iterations: i }))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(log.read_all().await.unwrap().len(), 16);
    }
}
