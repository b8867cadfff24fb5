pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod run;
pub mod state;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{FlowError, Result};
pub use event::EventBus;
pub use graph::{CreateGraphRequest, Graph, Node};
pub use run::{Run, RunStatus, RunSummary, StepLogEntry};
pub use state::{State, ToolOutput};
pub use types::*;
