use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Statement, params_from_iter};

use crate::error::BridgeError;
use crate::results::ResultSet;
use crate::types::RowValues;

use super::config::SharedSqliteConnection;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
/// Returns `BridgeError` if the value cannot be read.
pub fn sqlite_extract_value_sync(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<RowValues, BridgeError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// Build a result set from a prepared statement.
///
/// Mutations with a returning clause run here too; their returned rows become the result set.
///
/// # Errors
/// Returns `BridgeError` if query execution or row extraction fails.
pub fn build_result_set(stmt: &mut Statement, params: &[Value]) -> Result<ResultSet, BridgeError> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut rows_iter = stmt.query(params_from_iter(params.iter()))?;
    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(Arc::new(column_names));

    while let Some(row) = rows_iter.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value_sync(row, i)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

pub(crate) fn select_on(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[Value],
) -> Result<ResultSet, BridgeError> {
    let mut stmt = conn.prepare_cached(sql)?;
    build_result_set(&mut stmt, params)
}

pub(crate) fn execute_on(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[Value],
) -> Result<u64, BridgeError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let affected = stmt.execute(params_from_iter(params.iter()))?;
    u64::try_from(affected).map_err(|e| {
        BridgeError::ExecutionError(format!("affected row count out of range: {e}"))
    })
}

/// Run `func` against the connection on tokio's blocking pool.
pub(crate) async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R, BridgeError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, BridgeError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| BridgeError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}
