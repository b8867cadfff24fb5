use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    // Lookup misses
    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input invalid: {tool}: {message}")]
    ToolInput { tool: String, message: String },

    #[error("Run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // Gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowError {
    /// Shorthand for a failure raised from inside a tool.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a lookup miss (reported as "not found").
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::GraphNotFound(_)
                | Self::RunNotFound(_)
                | Self::NodeNotFound(_)
                | Self::ToolNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
