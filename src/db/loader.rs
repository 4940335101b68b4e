//! Dataset loader
//!
//! Builds the SQLite database from the CSV exports in the data directory.
//! Column types are inferred from the values (INTEGER, REAL, otherwise TEXT).

use crate::error::{AgentError, Result};
use csv::{ReaderBuilder, StringRecord};
use itertools::Itertools;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use tracing::info;

/// Table name and the CSV file it is loaded from.
pub const CSV_TABLES: [(&str, &str); 7] = [
    ("products", "products.csv"),
    ("users", "users.csv"),
    ("orders", "orders.csv"),
    ("order_items", "order_items.csv"),
    ("inventory_items", "inventory_items.csv"),
    ("distribution_centers", "distribution_centers.csv"),
    ("events", "events.csv"),
];

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    AlreadyPresent,
    Created { tables: Vec<(String, usize)> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    fn infer<'a>(values: impl Iterator<Item = &'a str>) -> Self {
        let mut kind = ColumnType::Integer;
        for raw in values.map(str::trim).filter(|v| !v.is_empty()) {
            if kind == ColumnType::Integer && raw.parse::<i64>().is_err() {
                kind = ColumnType::Real;
            }
            if kind == ColumnType::Real && raw.parse::<f64>().is_err() {
                return ColumnType::Text;
            }
        }
        kind
    }

    fn coerce(&self, raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        match self {
            ColumnType::Integer => trimmed.parse::<i64>().map(Value::Integer).unwrap_or(Value::Null),
            ColumnType::Real => trimmed.parse::<f64>().map(Value::Real).unwrap_or(Value::Null),
            ColumnType::Text => Value::Text(raw.to_string()),
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Create the database from `data_dir`. An existing database is kept unless
/// `force` is set.
pub fn initialize_database(data_dir: &Path, db_path: &Path, force: bool) -> Result<LoadOutcome> {
    if db_path.exists() && !force {
        info!("Database already exists at: {}", db_path.display());
        return Ok(LoadOutcome::AlreadyPresent);
    }

    for (_, file) in CSV_TABLES.iter() {
        let csv_path = data_dir.join(file);
        if !csv_path.exists() {
            return Err(AgentError::Store(format!(
                "CSV file not found: {}. Put all data files in '{}'.",
                csv_path.display(),
                data_dir.display()
            )));
        }
    }

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut conn = Connection::open(db_path)?;
    let tx = conn.transaction()?;
    let mut tables = Vec::with_capacity(CSV_TABLES.len());

    for (table, file) in CSV_TABLES.iter() {
        let rows = load_table(&tx, table, &data_dir.join(file))?;
        info!("Created table '{}' with {} rows", table, rows);
        tables.push((table.to_string(), rows));
    }

    tx.commit()?;
    info!("Database initialization complete: {} ({} tables)", db_path.display(), tables.len());
    Ok(LoadOutcome::Created { tables })
}

fn load_table(conn: &Connection, table: &str, csv_path: &Path) -> Result<usize> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(csv_path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let records: Vec<StringRecord> = reader.records().collect::<std::result::Result<_, _>>()?;

    let types: Vec<ColumnType> = (0..headers.len())
        .map(|idx| ColumnType::infer(records.iter().filter_map(|r| r.get(idx))))
        .collect();

    let columns_sql = headers
        .iter()
        .zip(&types)
        .map(|(name, kind)| format!("{} {}", quote_ident(name), kind.sql()))
        .join(", ");

    conn.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)), [])?;
    conn.execute(&format!("CREATE TABLE {} ({})", quote_ident(table), columns_sql), [])?;

    let placeholders = (1..=headers.len()).map(|i| format!("?{}", i)).join(", ");
    let mut insert = conn.prepare(&format!(
        "INSERT INTO {} VALUES ({})",
        quote_ident(table),
        placeholders
    ))?;

    for record in &records {
        let values = types
            .iter()
            .enumerate()
            .map(|(idx, kind)| kind.coerce(record.get(idx).unwrap_or("")));
        insert.execute(params_from_iter(values))?;
    }

    Ok(records.len())
}

/// Row count of every table in the database, sorted by table name.
pub fn verify_database(db_path: &Path) -> Result<Vec<(String, i64)>> {
    if !db_path.exists() {
        return Err(AgentError::Store(format!(
            "Database not found at: {}. Run `text2sql init-db` first.",
            db_path.display()
        )));
    }

    let conn = Connection::open(db_path)?;
    let names: Vec<String> = {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<_, _>>()?
    };

    names
        .into_iter()
        .map(|name| -> Result<(String, i64)> {
            let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(&name)), [], |row| row.get(0))?;
            Ok((name, count))
        })
        .collect()
}
