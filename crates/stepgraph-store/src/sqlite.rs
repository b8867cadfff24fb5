use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use stepgraph_core::error::{FlowError, Result};
use stepgraph_core::graph::Graph;
use stepgraph_core::run::Run;
use stepgraph_core::traits::{GraphStore, RunStore};
use stepgraph_core::types::{GraphId, RunId};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS graphs (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        body TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS runs (
        id TEXT PRIMARY KEY,
        graph_id TEXT NOT NULL,
        status TEXT NOT NULL,
        body TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_runs_graph ON runs(graph_id, created_at);";

fn db_err(e: impl std::fmt::Display) -> FlowError {
    FlowError::Database(e.to_string())
}

/// SQLite-backed graph and run store.
///
/// Each record is kept as a JSON body alongside a few indexed columns.
/// Writes replace the whole row, so a run row always holds the latest
/// snapshot.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    FlowError::Database(format!("Failed to create db directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_bodies<T: serde::de::DeserializeOwned>(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<T>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(args, |row| row.get::<_, String>(0))
            .map_err(db_err)?;

        let mut out = Vec::new();
        for body in rows {
            let body = body.map_err(db_err)?;
            out.push(serde_json::from_str(&body)?);
        }
        Ok(out)
    }

    fn query_body<T: serde::de::DeserializeOwned>(&self, sql: &str, id: &str) -> Result<Option<T>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let body: Option<String> = conn
            .query_row(sql, params![id], |row| row.get(0))
            .optional()
            .map_err(db_err)?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }
}

impl GraphStore for SqliteStore {
    fn put_graph(&self, graph: &Graph) -> BoxFuture<'_, Result<()>> {
        let id = graph.id.to_string();
        let name = graph.name.clone();
        let created_at = graph.created_at.to_rfc3339();
        let body = serde_json::to_string(graph);

        Box::pin(async move {
            let body = body?;
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "INSERT OR REPLACE INTO graphs (id, name, body, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, name, body, created_at],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn get_graph(&self, id: &GraphId) -> BoxFuture<'_, Result<Option<Graph>>> {
        let id = id.to_string();
        Box::pin(async move { self.query_body("SELECT body FROM graphs WHERE id = ?1", &id) })
    }

    fn list_graphs(&self) -> BoxFuture<'_, Result<Vec<Graph>>> {
        Box::pin(async move {
            self.query_bodies("SELECT body FROM graphs ORDER BY created_at ASC", &[])
        })
    }
}

impl RunStore for SqliteStore {
    fn put_run(&self, run: &Run) -> BoxFuture<'_, Result<()>> {
        let id = run.id.to_string();
        let graph_id = run.graph_id.to_string();
        let status = run.status.as_str();
        let created_at = run.created_at.to_rfc3339();
        let updated_at = run.updated_at.to_rfc3339();
        let body = serde_json::to_string(run);

        Box::pin(async move {
            let body = body?;
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "INSERT OR REPLACE INTO runs (id, graph_id, status, body, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, graph_id, status, body, created_at, updated_at],
            )
            .map_err(db_err)?;
            debug!(run_id = %id, status, "Run snapshot saved");
            Ok(())
        })
    }

    fn get_run(&self, id: &RunId) -> BoxFuture<'_, Result<Option<Run>>> {
        let id = id.to_string();
        Box::pin(async move { self.query_body("SELECT body FROM runs WHERE id = ?1", &id) })
    }

    fn list_runs(&self, graph_id: Option<&GraphId>) -> BoxFuture<'_, Result<Vec<Run>>> {
        let graph_id = graph_id.map(|g| g.to_string());
        Box::pin(async move {
            match graph_id {
                Some(gid) => self.query_bodies(
                    "SELECT body FROM runs WHERE graph_id = ?1 ORDER BY created_at ASC",
                    &[&gid],
                ),
                None => self.query_bodies("SELECT body FROM runs ORDER BY created_at ASC", &[]),
            }
        })
    }
}
