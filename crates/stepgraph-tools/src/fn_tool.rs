use futures::future::BoxFuture;

use stepgraph_core::error::Result;
use stepgraph_core::state::{State, ToolOutput};
use stepgraph_core::traits::Tool;

type ToolFn = dyn Fn(&State) -> Result<ToolOutput> + Send + Sync;

/// A tool backed by a synchronous closure.
///
/// ```ignore
/// registry.register(FnTool::new("inc", "Increment count", |state| {
///     let count = state.get_i64("count").unwrap_or(0) + 1;
///     Ok(ToolOutput::none().set("count", count.into()))
/// }));
/// ```
pub struct FnTool {
    name: String,
    description: String,
    timeout_secs: Option<u64>,
    func: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(&State) -> Result<ToolOutput> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            timeout_secs: None,
            func: Box::new(func),
        }
    }

    /// Override the registry's default timeout for this tool.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn execute<'a>(&'a self, state: &'a State) -> BoxFuture<'a, Result<ToolOutput>> {
        Box::pin(futures::future::ready((self.func)(state)))
    }

    fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }
}
