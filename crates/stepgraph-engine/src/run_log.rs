use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use stepgraph_core::event::EventBus;
use stepgraph_core::types::FlowEvent;

/// JSONL runtime logger.
///
/// Subscribes to the EventBus and appends one JSON object per line for
/// every run it observes. Each line is flushed as it is written, so a crash
/// leaves all earlier lines intact.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

/// A single log entry written to the JSONL file.
#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// `level` controls verbosity: 1 = run lifecycle, 2 = plus steps,
    /// 3 = plus state snapshots.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    /// Path of the log file for a logger started now.
    pub fn log_path(&self) -> PathBuf {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        self.log_dir.join(format!("{}.jsonl", timestamp))
    }

    /// Run the logger as a background task until cancellation or bus close.
    pub async fn run(self, event_bus: Arc<EventBus>, cancel: CancellationToken) {
        // Only the receiver is kept, so dropping the last bus handle ends the logger.
        let mut rx = event_bus.subscribe();
        drop(event_bus);
        let log_path = self.log_path();
        self.run_with(&mut rx, &log_path, cancel).await;
    }

    async fn run_with(
        &self,
        rx: &mut tokio::sync::broadcast::Receiver<FlowEvent>,
        log_path: &Path,
        cancel: CancellationToken,
    ) {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return;
            }
        };

        info!(path = %log_path.display(), level = self.level, "RunLogger started");
        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let Some(entry) = self.event_to_entry(&event) else {
                                continue;
                            };
                            if let Ok(json) = serde_json::to_string(&entry) {
                                let line = format!("{}\n", json);
                                if let Err(e) = writer.write_all(line.as_bytes()).await {
                                    error!(error = %e, "Failed to write log entry");
                                    break;
                                }
                                if let Err(e) = writer.flush().await {
                                    error!(error = %e, "Failed to flush log");
                                }
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
    }

    /// Convert a FlowEvent to a log entry (None if filtered by level).
    fn event_to_entry(&self, event: &FlowEvent) -> Option<LogEntry> {
        let entry = |event_type, step, detail| LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: event.run_id().to_string(),
            event_type,
            step,
            detail,
        };

        match event {
            FlowEvent::RunStarted { graph_id, .. } => Some(entry(
                "run_started",
                None,
                Some(serde_json::json!({ "graph_id": graph_id })),
            )),
            FlowEvent::RunCompleted { steps, .. } => {
                Some(entry("run_completed", Some(*steps), None))
            }
            FlowEvent::RunFailed { error, .. } => Some(entry(
                "run_failed",
                None,
                Some(serde_json::json!({ "error": error })),
            )),
            FlowEvent::StepCompleted(step) if self.level >= 3 => Some(entry(
                "step_completed",
                Some(step.step),
                Some(serde_json::json!({
                    "node": step.node,
                    "tool": step.tool,
                    "state": step.state,
                })),
            )),
            FlowEvent::StepCompleted(step) if self.level >= 2 => Some(entry(
                "step_completed",
                Some(step.step),
                Some(serde_json::json!({ "node": step.node, "tool": step.tool })),
            )),
            FlowEvent::StepCompleted(_) => None,
        }
    }
}
