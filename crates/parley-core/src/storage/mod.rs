//! SQLite persistence shared by the history, booking and ingestion stores
//!
//! A single `Connection` sits behind an async mutex and every statement runs
//! on the blocking thread pool, so SQLite I/O never stalls the runtime.

use crate::errors::AgentError;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        tool_calls TEXT,
        tool_call_id TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, id);

    CREATE TABLE IF NOT EXISTS bookings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        full_name TEXT NOT NULL,
        email TEXT NOT NULL,
        interview_date TEXT NOT NULL,
        interview_time TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS ingestion_metadata (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_name TEXT NOT NULL,
        chunking_strategy TEXT NOT NULL,
        embedding_model TEXT NOT NULL,
        chunk_count INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );
";

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (creating if needed) the database file and apply the schema.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, AgentError> {
        let db_path: PathBuf = path.as_ref().to_path_buf();
        log::info!("Opening database at: {}", db_path.display());

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, AgentError> {
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(&db_path)?;
            conn.busy_timeout(Duration::from_secs(5))?;
            Ok(conn)
        })
        .await
        .map_err(|e| AgentError::Storage(format!("Database open task failed: {}", e)))??;

        Self::initialize(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, AgentError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn).await
    }

    async fn initialize(conn: Connection) -> Result<Self, AgentError> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.execute(|conn| conn.execute_batch(SCHEMA)).await?;
        Ok(db)
    }

    /// Run `f` against the connection on the blocking pool.
    pub async fn execute<F, R>(&self, f: F) -> Result<R, AgentError>
    where
        F: FnOnce(&mut Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn).map_err(AgentError::from)
        })
        .await
        .map_err(|e| AgentError::Storage(format!("Database task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_schema_is_created() {
        let db = Database::open_in_memory().await.unwrap();
        let tables: Vec<String> = db
            .execute(|conn| {
                let mut stmt =
                    conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .unwrap();

        for expected in ["bookings", "ingestion_metadata", "messages"] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
    }

    #[tokio::test]
    async fn test_open_file_database_twice() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("parley.db");

        {
            let db = Database::open(&path).await.unwrap();
            db.execute(|conn| {
                conn.execute(
                    "INSERT INTO bookings (full_name, email, interview_date, interview_time, created_at)
                     VALUES ('A', 'a@example.com', 'd', 't', 'now')",
                    [],
                )
            })
            .await
            .unwrap();
        }

        let db = Database::open(&path).await.unwrap();
        let count: i64 = db
            .execute(|conn| conn.query_row("SELECT COUNT(*) FROM bookings", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
