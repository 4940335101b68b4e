//! SQL execution stage
//!
//! Runs every `;`-separated statement of the candidate SQL on one connection
//! and renders the rows as text for the analysis stage. Engine errors are
//! recorded in the state for the correction loop; connection or task failures
//! abort the turn.

use super::StageContext;
use crate::db::{format_table, ConnectionGuard};
use crate::error::{AgentError, Result};
use crate::state::{QuerySessionState, ResultTable};
use tracing::{debug, info, warn};

/// Single statement that returned nothing.
pub const NO_RESULTS_MARKER: &str = "No results found.";
/// One statement of a batch that returned nothing.
pub const NO_ROWS_MARKER: &str = "No rows returned";
/// The SQL contained no statements at all.
pub const EMPTY_BATCH_MESSAGE: &str = "Query executed successfully but returned no results.";
pub const EXECUTION_ERROR_PREFIX: &str = "SQL Execution Error: ";

lazy_static::lazy_static! {
    static ref RESULT_DELIMITER: String = format!("\n\n{}\n\n", "=".repeat(80));
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutput {
    pub result_text: String,
    pub tables: Vec<ResultTable>,
}

pub fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Execute `statements` in order on `conn`. The `Err` is the engine's message
/// for the first statement that failed. The connection is closed when the
/// guard is dropped on return.
pub fn execute_batch(
    mut conn: ConnectionGuard,
    statements: &[String],
) -> std::result::Result<BatchOutput, String> {
    let multiple = statements.len() > 1;
    let mut blocks = Vec::with_capacity(statements.len());
    let mut tables = Vec::with_capacity(statements.len());

    for (idx, statement) in statements.iter().enumerate() {
        debug!("Executing statement {}/{}: {}", idx + 1, statements.len(), statement);
        let output = match conn.execute(statement) {
            Ok(output) => output,
            Err(e) => return Err(e),
        };

        let block = match (output.rows.is_empty(), multiple) {
            (false, true) => format!(
                "Query {}:\n{}\n\nResult:\n{}",
                idx + 1,
                statement,
                format_table(&output.columns, &output.rows)
            ),
            (false, false) => format_table(&output.columns, &output.rows),
            (true, true) => format!("Query {}:\n{}\n\nResult: {}", idx + 1, statement, NO_ROWS_MARKER),
            (true, false) => NO_RESULTS_MARKER.to_string(),
        };
        blocks.push(block);
        tables.push(ResultTable {
            statement: statement.clone(),
            columns: output.columns,
            rows: output.rows,
        });
    }

    let result_text = if blocks.is_empty() {
        EMPTY_BATCH_MESSAGE.to_string()
    } else {
        blocks.join(RESULT_DELIMITER.as_str())
    };

    Ok(BatchOutput { result_text, tables })
}

pub async fn run(ctx: &StageContext, mut state: QuerySessionState) -> Result<QuerySessionState> {
    let statements = split_statements(&state.sql_query);
    let store = ctx.store.clone();
    let limit = ctx.settings.store_timeout;

    let conn = tokio::task::spawn_blocking(move || ConnectionGuard::open(store.as_ref()))
        .await
        .map_err(|e| AgentError::Store(format!("Connection task failed: {}", e)))??;
    let interrupt = conn.interrupt_handle();

    let mut task = tokio::task::spawn_blocking(move || execute_batch(conn, &statements));
    let outcome = match tokio::time::timeout(limit, &mut task).await {
        Ok(joined) => joined.map_err(|e| AgentError::Store(format!("Execution task failed: {}", e)))?,
        Err(_) => {
            warn!("SQL execution exceeded {:?}, interrupting", limit);
            if let Some(handle) = interrupt {
                handle.interrupt();
            }
            // The guard lives in the task; wait for it so the connection is closed.
            if let Err(e) = task.await {
                warn!("Execution task failed after interrupt: {}", e);
            }
            return Err(AgentError::Timeout {
                stage: "SQL execution".to_string(),
                elapsed: limit,
            });
        }
    };

    match outcome {
        Ok(batch) => {
            let rows: usize = batch.tables.iter().map(|t| t.rows.len()).sum();
            info!("SQL executed: {} statement(s), {} row(s)", batch.tables.len(), rows);
            state.query_result = batch.result_text;
            state.result_tables = batch.tables;
            state.error_message.clear();
        }
        Err(e) => {
            warn!("SQL execution failed (attempt {}): {}", state.retry_count, e);
            state.error_message = format!("{}{}", EXECUTION_ERROR_PREFIX, e);
            state.query_result.clear();
            state.result_tables.clear();
        }
    }

    Ok(state)
}
