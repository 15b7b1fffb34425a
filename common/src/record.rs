use serde_json::{Map, Value};

use crate::error::DataError;
use crate::value::{normalize, SqlValue};

/// One materialized row: column name → normalized value, in projection order.
pub type Record = Map<String, Value>;

/// Zip a positional row against the projected column names.
///
/// The row must have exactly one value per column; a mismatch means the
/// statement and the column list have drifted apart and is reported rather
/// than truncated.
pub fn assemble(columns: &[&str], row: Vec<SqlValue>) -> Result<Record, DataError> {
    if columns.len() != row.len() {
        return Err(DataError::Query(format!(
            "row has {} values but {} columns were projected",
            row.len(),
            columns.len()
        )));
    }
    columns
        .iter()
        .zip(row)
        .map(|(column, value)| Ok((column.to_string(), normalize(value)?)))
        .collect()
}
