use crate::error::{AgentError, Result};
use crate::state::CellValue;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Columns and rows produced by one statement. Statements without a result
/// set (DDL, DML) come back with no columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// Cancels whatever statement a connection is running, from another thread.
pub trait StatementInterrupt: Send + Sync {
    fn interrupt(&self);
}

impl StatementInterrupt for rusqlite::InterruptHandle {
    fn interrupt(&self) {
        rusqlite::InterruptHandle::interrupt(self)
    }
}

/// One short-lived connection. `close` must be safe to call more than once.
pub trait StoreConnection: Send {
    /// Run a single statement. The error is the engine's own message.
    fn execute(&mut self, sql: &str) -> std::result::Result<StatementOutput, String>;

    fn close(&mut self);

    /// Handle that aborts a running `execute`. `None` when the backend
    /// cannot be interrupted.
    fn interrupt_handle(&self) -> Option<Arc<dyn StatementInterrupt>> {
        None
    }
}

pub trait DataStore: Send + Sync {
    fn connect(&self) -> Result<Box<dyn StoreConnection>>;

    fn describe(&self) -> String {
        "data store".to_string()
    }
}

/// Owns a connection for the duration of one stage and closes it on drop,
/// whichever way the stage exits.
pub struct ConnectionGuard {
    conn: Box<dyn StoreConnection>,
}

impl ConnectionGuard {
    pub fn open(store: &dyn DataStore) -> Result<Self> {
        Ok(Self { conn: store.connect()? })
    }

    pub fn execute(&mut self, sql: &str) -> std::result::Result<StatementOutput, String> {
        self.conn.execute(sql)
    }

    pub fn interrupt_handle(&self) -> Option<Arc<dyn StatementInterrupt>> {
        self.conn.interrupt_handle()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.conn.close();
    }
}

/// SQLite file produced by the dataset loader.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl DataStore for SqliteStore {
    fn connect(&self) -> Result<Box<dyn StoreConnection>> {
        if !self.path.exists() {
            return Err(AgentError::Store(format!(
                "Database not found at: {}. Run `text2sql init-db` first.",
                self.path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| AgentError::Store(format!("Failed to open database: {}", e)))?;
        debug!("Opened SQLite connection to {}", self.path.display());
        Ok(Box::new(SqliteConnection { conn: Some(conn) }))
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

struct SqliteConnection {
    conn: Option<Connection>,
}

impl StoreConnection for SqliteConnection {
    fn execute(&mut self, sql: &str) -> std::result::Result<StatementOutput, String> {
        let conn = self.conn.as_ref().ok_or_else(|| "connection already closed".to_string())?;
        let mut stmt = conn.prepare(sql).map_err(|e| e.to_string())?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query([]).map_err(|e| e.to_string())?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| e.to_string())? {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                let value = row.get_ref(idx).map_err(|e| e.to_string())?;
                values.push(cell_from_sqlite(value));
            }
            out.push(values);
        }

        Ok(StatementOutput { columns, rows: out })
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                debug!("SQLite close reported: {}", e);
            }
        }
    }

    fn interrupt_handle(&self) -> Option<Arc<dyn StatementInterrupt>> {
        self.conn
            .as_ref()
            .map(|conn| Arc::new(conn.get_interrupt_handle()) as Arc<dyn StatementInterrupt>)
    }
}

fn cell_from_sqlite(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(i) => CellValue::Integer(i),
        ValueRef::Real(f) => CellValue::Real(f),
        ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => CellValue::Text(format!("<{} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded_store(dir: &TempDir) -> SqliteStore {
        let path = dir.path().join("test.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE products (id INTEGER, name TEXT, retail_price REAL);
             INSERT INTO products VALUES (1, 'Jeans', 49.5), (2, 'Socks', NULL);",
        )
        .unwrap();
        SqliteStore::new(path)
    }

    #[test]
    fn test_execute_returns_typed_rows() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);
        let mut guard = ConnectionGuard::open(&store).unwrap();
        let out = guard.execute("SELECT id, name, retail_price FROM products ORDER BY id").unwrap();
        assert_eq!(out.columns, vec!["id", "name", "retail_price"]);
        assert_eq!(out.rows[0], vec![CellValue::Integer(1), CellValue::Text("Jeans".into()), CellValue::Real(49.5)]);
        assert_eq!(out.rows[1][2], CellValue::Null);
    }

    #[test]
    fn test_engine_error_text_is_returned() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);
        let mut guard = ConnectionGuard::open(&store).unwrap();
        let err = guard.execute("SELECT nope FROM products").unwrap_err();
        assert!(err.contains("no such column"), "{}", err);
    }

    #[test]
    fn test_missing_database_is_store_error() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("absent.db"));
        assert!(matches!(store.connect(), Err(AgentError::Store(_))));
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);
        let mut conn = store.connect().unwrap();
        conn.close();
        conn.close();
        assert!(conn.execute("SELECT 1").is_err());
        assert!(conn.interrupt_handle().is_none());
    }

    #[test]
    fn test_interrupt_aborts_running_statement() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir);
        let mut guard = ConnectionGuard::open(&store).unwrap();
        let handle = guard.interrupt_handle().expect("sqlite connections are interruptible");

        let started = std::time::Instant::now();
        let worker = std::thread::spawn(move || {
            guard.execute(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 1000000000) \
                 SELECT count(*) FROM c",
            )
        });
        std::thread::sleep(std::time::Duration::from_millis(100));
        handle.interrupt();

        let err = worker.join().unwrap().unwrap_err();
        assert!(err.contains("interrupt"), "{}", err);
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }
}
