//! Column-projected reads.

use ecoimpact_common::error::DataError;
use ecoimpact_common::record::{self, Record};
use ecoimpact_common::schema::EntitySchema;
use ecoimpact_common::sql;
use ecoimpact_common::value::SqlValue;
use tracing::{debug, warn};

use crate::connector::{Connection, Connector};
use crate::Store;

impl<C: Connector> Store<C> {
    /// `SELECT columns FROM table;` An empty table yields an empty vector.
    pub async fn fetch_all(&self, table: &str, columns: &[&str]) -> Result<Vec<Record>, DataError> {
        let sql = sql::select(self.connector.dialect(), table, columns, &[])?;
        self.fetch(&sql, table, columns, &[]).await
    }

    /// `SELECT columns FROM table WHERE id_column = ?;` with `id` bound.
    /// `None` when nothing matches.
    pub async fn fetch_by_id(
        &self,
        table: &str,
        columns: &[&str],
        id_column: &str,
        id: SqlValue,
    ) -> Result<Option<Record>, DataError> {
        let sql = sql::select(self.connector.dialect(), table, columns, &[id_column])?;
        let records = self.fetch(&sql, table, columns, &[id]).await?;
        Ok(records.into_iter().next())
    }

    /// Every row whose `column` equals `value`.
    pub async fn fetch_where(
        &self,
        table: &str,
        columns: &[&str],
        column: &str,
        value: SqlValue,
    ) -> Result<Vec<Record>, DataError> {
        let sql = sql::select(self.connector.dialect(), table, columns, &[column])?;
        self.fetch(&sql, table, columns, &[value]).await
    }

    pub async fn list(&self, schema: &EntitySchema) -> Result<Vec<Record>, DataError> {
        self.fetch_all(schema.table, &schema.columns()).await
    }

    pub async fn get(&self, schema: &EntitySchema, id: SqlValue) -> Result<Option<Record>, DataError> {
        self.fetch_by_id(schema.table, &schema.columns(), schema.identity(), id)
            .await
    }

    pub async fn list_where(
        &self,
        schema: &EntitySchema,
        column: &str,
        value: SqlValue,
    ) -> Result<Vec<Record>, DataError> {
        self.fetch_where(schema.table, &schema.columns(), column, value)
            .await
    }

    async fn fetch(
        &self,
        sql: &str,
        table: &str,
        columns: &[&str],
        params: &[SqlValue],
    ) -> Result<Vec<Record>, DataError> {
        let mut conn = self.connector.connect().await?;
        debug!(table, columns = columns.len(), "select");
        let rows = conn
            .query(sql, params)
            .await
            .inspect_err(|err| warn!(table, error = %err, "select failed"))?;
        drop(conn);
        rows.into_iter()
            .map(|row| record::assemble(columns, row))
            .collect()
    }
}
