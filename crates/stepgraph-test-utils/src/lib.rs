//! Shared test utilities for stepgraph crates.

pub mod tools;

use std::io::Write;
use std::sync::Arc;

use serde_json::Value;

use stepgraph_core::config::AppConfig;
use stepgraph_core::graph::{Graph, Node};
use stepgraph_core::state::State;
use stepgraph_tools::ToolRegistry;

pub use tools::{CounterTool, FailingTool, RecordingTool, SlowTool, StaticTool};

/// Build a state from a JSON object literal. Panics on non-objects.
pub fn state(value: Value) -> State {
    State::from_value(value).expect("state fixture must be a JSON object")
}

/// `n` nodes `n0 → n1 → … → n{n-1}`, all bound to `tool`.
pub fn linear_graph(n: usize, tool: &str, max_steps: usize) -> Graph {
    let nodes = (0..n)
        .map(|i| {
            let node = Node::new(format!("n{}", i), tool);
            if i + 1 < n {
                node.with_next(format!("n{}", i + 1))
            } else {
                node
            }
        })
        .collect();
    Graph::new("linear", "n0", max_steps, nodes)
}

/// A single-node graph whose node `a` runs `tool` with no static edge.
pub fn single_node_graph(tool: &str, max_steps: usize) -> Graph {
    Graph::new("single", "a", max_steps, vec![Node::new("a", tool)])
}

/// Registry preloaded with the common mock tools:
/// `inc` (counter on `count`), `loop3` (counter looping to `a` until 3),
/// `fail`, and `noop`.
pub fn mock_registry() -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new();
    registry.register(CounterTool::new("inc", "count"));
    registry.register(CounterTool::new("loop3", "count").looping("a", 3));
    registry.register(FailingTool::new("fail", "boom"));
    registry.register(StaticTool::new("noop", Value::Null));
    Arc::new(registry)
}

/// Configuration with an in-memory store and file logging disabled.
pub fn test_config() -> AppConfig {
    AppConfig::parse(
        r#"
[engine]
default_max_steps = 20
tool_timeout_secs = 5

[log]
enabled = false
"#,
    )
    .expect("test config must parse")
}

/// Write `content` to a temporary `.toml` file.
pub fn temp_config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp config");
    file.write_all(content.as_bytes()).expect("write temp config");
    file
}
