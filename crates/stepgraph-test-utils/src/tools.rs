//! Mock tools with predictable behavior.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use stepgraph_core::error::{FlowError, Result};
use stepgraph_core::state::{State, ToolOutput};
use stepgraph_core::traits::Tool;

/// Increments an integer key, optionally jumping back to a node while the
/// counter stays below `limit`.
pub struct CounterTool {
    name: String,
    key: String,
    loop_to: Option<(String, i64)>,
}

impl CounterTool {
    pub fn new(name: &str, key: &str) -> Self {
        Self {
            name: name.to_string(),
            key: key.to_string(),
            loop_to: None,
        }
    }

    pub fn looping(mut self, node: &str, limit: i64) -> Self {
        self.loop_to = Some((node.to_string(), limit));
        self
    }
}

impl Tool for CounterTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Increments a counter"
    }

    fn execute<'a>(&'a self, state: &'a State) -> BoxFuture<'a, Result<ToolOutput>> {
        Box::pin(async move {
            let count = state.get_i64(&self.key).unwrap_or(0) + 1;
            let out = ToolOutput::none().set(self.key.clone(), json!(count));
            Ok(match &self.loop_to {
                Some((node, limit)) if count < *limit => out.goto(node.clone()),
                _ => out,
            })
        })
    }
}

/// Returns a fixed update and optional next-node override.
pub struct StaticTool {
    name: String,
    output: ToolOutput,
}

impl StaticTool {
    pub fn new(name: &str, update: Value) -> Self {
        Self {
            name: name.to_string(),
            output: ToolOutput::value(update),
        }
    }

    /// Always jump to `node`.
    pub fn goto(name: &str, node: &str) -> Self {
        Self {
            name: name.to_string(),
            output: ToolOutput::none().goto(node),
        }
    }
}

impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns a fixed output"
    }

    fn execute<'a>(&'a self, _state: &'a State) -> BoxFuture<'a, Result<ToolOutput>> {
        let out = self.output.clone();
        Box::pin(async move { Ok(out) })
    }
}

/// Always fails with a tool execution error.
pub struct FailingTool {
    name: String,
    message: String,
}

impl FailingTool {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn execute<'a>(&'a self, _state: &'a State) -> BoxFuture<'a, Result<ToolOutput>> {
        Box::pin(async move { Err(FlowError::tool(&self.name, &self.message)) })
    }
}

/// Sleeps before returning an empty output.
pub struct SlowTool {
    name: String,
    delay: Duration,
    timeout_secs: Option<u64>,
}

impl SlowTool {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Sleeps, then returns nothing"
    }

    fn execute<'a>(&'a self, _state: &'a State) -> BoxFuture<'a, Result<ToolOutput>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(ToolOutput::none())
        })
    }

    fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }
}

/// Records how many times it ran and the state it was handed each time.
pub struct RecordingTool {
    name: String,
    calls: Arc<AtomicUsize>,
    seen: Arc<std::sync::Mutex<Vec<State>>>,
}

impl RecordingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Shared call counter, readable after the tool moves into a registry.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Shared list of observed input states.
    pub fn seen(&self) -> Arc<std::sync::Mutex<Vec<State>>> {
        self.seen.clone()
    }
}

impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Records its inputs"
    }

    fn execute<'a>(&'a self, state: &'a State) -> BoxFuture<'a, Result<ToolOutput>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(state.clone());
        Box::pin(async { Ok(ToolOutput::none()) })
    }
}
