pub mod executor;
pub mod run_log;
pub mod service;

pub use executor::GraphExecutor;
pub use run_log::RunLogger;
pub use service::GraphService;
