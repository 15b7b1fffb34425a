//! SQL text for the column-driven reader, writer and aggregator.
//!
//! Identifiers come from the static schema tables and are validated here;
//! values are never rendered into the statement, only placeholders.

use crate::error::DataError;

/// Placeholder and identifier conventions of the target store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// `?` placeholders, bare identifiers (ODBC style).
    #[default]
    Ansi,
    /// `$n` placeholders, double-quoted identifiers so mixed case survives.
    Postgres,
}

impl Dialect {
    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Ansi => "?".to_string(),
            Dialect::Postgres => format!("${index}"),
        }
    }

    /// Validate and render an identifier.
    pub fn ident(self, name: &str) -> Result<String, DataError> {
        validate_identifier(name)?;
        Ok(match self {
            Dialect::Ansi => name.to_string(),
            Dialect::Postgres => format!("\"{name}\""),
        })
    }

    fn idents(self, names: &[&str]) -> Result<Vec<String>, DataError> {
        names.iter().map(|name| self.ident(name)).collect()
    }
}

/// ASCII letters, digits and underscores, not starting with a digit.
pub fn validate_identifier(name: &str) -> Result<(), DataError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DataError::Query(format!("invalid identifier '{name}'")))
    }
}

/// `SELECT c1, c2 FROM table [WHERE f1 = ? AND f2 = ?];`
///
/// Each entry of `filters` becomes one equality predicate, bound in order.
pub fn select(
    dialect: Dialect,
    table: &str,
    columns: &[&str],
    filters: &[&str],
) -> Result<String, DataError> {
    if columns.is_empty() {
        return Err(DataError::Query(format!("no columns projected from {table}")));
    }
    let table = dialect.ident(table)?;
    let columns = dialect.idents(columns)?.join(", ");
    let mut sql = format!("SELECT {columns} FROM {table}");
    push_filters(&mut sql, dialect, filters)?;
    sql.push(';');
    Ok(sql)
}

/// `INSERT INTO table (f1, f2) VALUES (?, ?);`
pub fn insert(dialect: Dialect, table: &str, fields: &[&str]) -> Result<String, DataError> {
    if fields.is_empty() {
        return Err(DataError::Query(format!("no fields to insert into {table}")));
    }
    let table = dialect.ident(table)?;
    let columns = dialect.idents(fields)?.join(", ");
    let placeholders = (1..=fields.len())
        .map(|i| dialect.placeholder(i))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("INSERT INTO {table} ({columns}) VALUES ({placeholders});"))
}

/// `SELECT SUM(a), SUM(b) FROM table WHERE owner = ? AND time >= ?;`
pub fn windowed_sum(
    dialect: Dialect,
    table: &str,
    summed: &[&str],
    owner_column: &str,
    time_column: &str,
) -> Result<String, DataError> {
    if summed.is_empty() {
        return Err(DataError::Query(format!("no columns summed from {table}")));
    }
    let table = dialect.ident(table)?;
    let sums = dialect
        .idents(summed)?
        .into_iter()
        .map(|column| format!("SUM({column})"))
        .collect::<Vec<_>>()
        .join(", ");
    let owner = dialect.ident(owner_column)?;
    let time = dialect.ident(time_column)?;
    Ok(format!(
        "SELECT {sums} FROM {table} WHERE {owner} = {} AND {time} >= {};",
        dialect.placeholder(1),
        dialect.placeholder(2)
    ))
}

fn push_filters(
    sql: &mut String,
    dialect: Dialect,
    filters: &[&str],
) -> Result<(), DataError> {
    for (offset, filter) in filters.iter().enumerate() {
        let keyword = if offset == 0 { " WHERE " } else { " AND " };
        sql.push_str(keyword);
        sql.push_str(&dialect.ident(filter)?);
        sql.push_str(" = ");
        sql.push_str(&dialect.placeholder(offset + 1));
    }
    Ok(())
}
