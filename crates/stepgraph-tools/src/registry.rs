use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use stepgraph_core::error::{FlowError, Result};
use stepgraph_core::state::{State, ToolOutput};
use stepgraph_core::traits::Tool;

/// Default per-call timeout when neither the tool nor the caller sets one.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// Registry of available tools.
///
/// Registration normally happens once at startup; lookups take a read lock
/// and may run concurrently with late registrations.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    default_timeout_secs: u64,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TOOL_TIMEOUT_SECS)
    }

    /// Create an empty registry with a custom default timeout.
    pub fn with_timeout(default_timeout_secs: u64) -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            default_timeout_secs,
        }
    }

    /// Register a tool under its own name. Replaces any previous binding.
    pub fn register(&self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.register_as(name, Arc::new(tool));
    }

    /// Register a shared tool under an explicit name.
    pub fn register_as(&self, name: impl Into<String>, tool: Arc<dyn Tool>) {
        let name = name.into();
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if tools.insert(name.clone(), tool).is_some() {
            debug!(tool = %name, "Replaced existing tool binding");
        }
    }

    /// Unregister a tool by name.
    pub fn unregister(&self, name: &str) -> bool {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| FlowError::ToolNotFound(name.to_string()))
    }

    /// Whether a tool is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// List all registered tools with their descriptions.
    pub fn list(&self) -> BTreeMap<String, String> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Execute a tool by name against `state`, bounded by its timeout.
    pub async fn execute(&self, name: &str, state: &State) -> Result<ToolOutput> {
        let tool = self.get(name)?;
        let timeout_secs = tool.timeout_secs().unwrap_or(self.default_timeout_secs);
        let timeout = std::time::Duration::from_secs(timeout_secs);

        match tokio::time::timeout(timeout, tool.execute(state)).await {
            Ok(result) => result,
            Err(_) => Err(FlowError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs,
            }),
        }
    }

    /// Create a registry with all built-in tools registered.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_builtins();
        registry
    }

    /// Register the built-in tools into this registry.
    pub fn register_builtins(&self) {
        // ── Data quality pipeline (5) ───────────────────────────
        self.register(crate::builtin::data_quality::ProfileDataTool);
        self.register(crate::builtin::data_quality::IdentifyAnomaliesTool);
        self.register(crate::builtin::data_quality::GenerateRulesTool);
        self.register(crate::builtin::data_quality::ApplyRulesTool);
        self.register(crate::builtin::data_quality::DecideNextStepTool);
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
