pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use tracing::info;

use stepgraph_core::config::{StoreBackend, StoreConfig};
use stepgraph_core::error::Result;
use stepgraph_core::traits::{GraphStore, RunStore};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Graph and run stores sharing one backend.
#[derive(Clone)]
pub struct Stores {
    pub graphs: Arc<dyn GraphStore>,
    pub runs: Arc<dyn RunStore>,
}

impl Stores {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            graphs: store.clone(),
            runs: store,
        }
    }
}

/// Open the backend selected by the store configuration.
pub fn open(config: &StoreConfig) -> Result<Stores> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store");
            Ok(Stores::memory())
        }
        StoreBackend::Sqlite => {
            let path = config.resolved_path();
            let store = Arc::new(SqliteStore::open(&path)?);
            info!(path = %path.display(), "Using SQLite store");
            Ok(Stores {
                graphs: store.clone(),
                runs: store,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepgraph_core::run::Run;
    use stepgraph_core::state::State;
    use stepgraph_core::types::GraphId;

    #[tokio::test]
    async fn test_open_sqlite_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::Sqlite,
            path: dir.path().join("runs.db").display().to_string(),
        };
        let stores = open(&config).unwrap();
        let run = Run::new(GraphId::from_string("g"), State::new());
        stores.runs.put_run(&run).await.unwrap();
        assert!(stores.runs.get_run(&run.id).await.unwrap().is_some());
        assert!(dir.path().join("runs.db").exists());
    }

    #[tokio::test]
    async fn test_open_memory_backend() {
        let stores = open(&StoreConfig::default()).unwrap();
        assert!(stores.graphs.list_graphs().await.unwrap().is_empty());
    }
}
