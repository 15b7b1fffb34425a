//! Parameterized single-row inserts.

use ecoimpact_common::error::DataError;
use ecoimpact_common::record::Record;
use ecoimpact_common::schema::EntitySchema;
use ecoimpact_common::sql;
use ecoimpact_common::value::SqlValue;
use tracing::{debug, warn};

use crate::connector::{Connection, Connector};
use crate::Store;

impl<C: Connector> Store<C> {
    /// `INSERT INTO table (fields) VALUES (?, ...);` in its own transaction.
    ///
    /// Arity is checked before the store is contacted. Nothing is retried.
    pub async fn insert(
        &self,
        table: &str,
        fields: &[&str],
        values: &[SqlValue],
    ) -> Result<(), DataError> {
        if fields.len() != values.len() {
            return Err(DataError::Arity {
                fields: fields.len(),
                values: values.len(),
            });
        }
        let sql = sql::insert(self.connector.dialect(), table, fields)?;

        let mut conn = self.connector.connect().await?;
        debug!(table, fields = fields.len(), "insert");
        let written = async {
            conn.begin().await?;
            conn.execute(&sql, values).await?;
            conn.commit().await
        }
        .await;
        drop(conn);
        written.inspect_err(|err| warn!(table, error = %err, "insert failed"))
    }

    /// Insert a JSON payload using the schema's writable fields. Absent keys
    /// bind as NULL; the identity column is never taken from the payload.
    pub async fn create(&self, schema: &EntitySchema, payload: &Record) -> Result<(), DataError> {
        let values = schema.insert_values(payload);
        self.insert(schema.table, &schema.insert_fields(), &values)
            .await
    }
}

#[cfg(test)]
mod tests {
    use ecoimpact_common::schema::USERS;
    use serde_json::json;

    use super::*;
    use crate::fake::{FakeConnector, Failure};

    #[tokio::test]
    async fn arity_mismatch_never_contacts_the_store() {
        let fake = FakeConnector::new();
        let store = Store::new(fake.clone());

        let err = store
            .insert(
                "USERS",
                &["Username", "FirstName", "Password"],
                &[SqlValue::from("ada"), SqlValue::from("pw")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Arity { fields: 3, values: 2 }));
        assert_eq!(fake.connections_opened(), 0);
        assert!(fake.statements().is_empty());
    }

    #[tokio::test]
    async fn insert_commits_one_statement() {
        let fake = FakeConnector::new();
        let store = Store::new(fake.clone());

        store
            .insert(
                "USERS",
                &["Username", "Password"],
                &[SqlValue::from("ada"), SqlValue::from("pw")],
            )
            .await
            .unwrap();

        let committed = fake.committed();
        assert_eq!(committed.len(), 1);
        assert_eq!(
            committed[0].sql,
            "INSERT INTO USERS (Username, Password) VALUES (?, ?);"
        );
        assert_eq!(committed[0].params.len(), 2);
        assert_eq!(fake.open_connections(), 0);
    }

    #[tokio::test]
    async fn create_skips_identity_and_nulls_missing_fields() {
        let fake = FakeConnector::new();
        let store = Store::new(fake.clone());
        let payload = json!({"userID": 5, "Username": "ada", "Password": "pw"});

        store
            .create(&USERS, payload.as_object().unwrap())
            .await
            .unwrap();

        let executed = &fake.committed()[0];
        assert_eq!(
            executed.sql,
            "INSERT INTO USERS (Username, FirstName, LastName, Password) VALUES (?, ?, ?, ?);"
        );
        assert_eq!(
            executed.params,
            [
                SqlValue::from("ada"),
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::from("pw"),
            ]
        );
    }

    #[tokio::test]
    async fn failed_commit_is_a_write_error_and_leaves_nothing() {
        let fake = FakeConnector::new();
        fake.push_failure(Failure::Commit);
        let store = Store::new(fake.clone());

        let err = store
            .insert("USERS", &["Username"], &[SqlValue::from("ada")])
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Write(_)));
        assert!(fake.committed().is_empty());
        assert_eq!(fake.open_connections(), 0);
    }

    #[tokio::test]
    async fn failed_statement_is_surfaced_without_retry() {
        let fake = FakeConnector::new();
        fake.push_failure(Failure::Write);
        let store = Store::new(fake.clone());

        let err = store
            .insert("USERS", &["Username"], &[SqlValue::from("ada")])
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Write(_)));
        assert_eq!(fake.connections_opened(), 1);
        assert_eq!(fake.statements().len(), 1);
        assert_eq!(fake.open_connections(), 0);
    }
}
