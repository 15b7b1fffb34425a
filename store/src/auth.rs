//! Credential checks.
//!
//! All password handling goes through [`CredentialVerifier`]. The only
//! implementation today, [`PlaintextCredentials`], compares the stored password
//! by equality inside the query. That is a known weakness of the existing
//! schema; a hashing scheme replaces this type without touching the generic
//! reader or writer.

use std::future::Future;

use ecoimpact_common::error::DataError;
use ecoimpact_common::schema::{PASSWORD, USERNAME, USERS, USER_ID};
use ecoimpact_common::sql;
use ecoimpact_common::value::{normalize, SqlValue};
use serde_json::Value;
use tracing::{debug, warn};

use crate::connector::{Connection, Connector};

/// Checks a username/password pair and yields the user's id on success.
pub trait CredentialVerifier: Send + Sync {
    fn verify(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<Option<Value>, DataError>> + Send;
}

/// Equality match against the `Password` column.
#[derive(Debug, Clone)]
pub struct PlaintextCredentials<C> {
    connector: C,
}

impl<C: Connector> PlaintextCredentials<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }
}

impl<C: Connector> CredentialVerifier for PlaintextCredentials<C> {
    async fn verify(&self, username: &str, password: &str) -> Result<Option<Value>, DataError> {
        let sql = sql::select(
            self.connector.dialect(),
            USERS.table,
            &[USER_ID],
            &[USERNAME, PASSWORD],
        )?;
        let params = [SqlValue::from(username), SqlValue::from(password)];

        let mut conn = self.connector.connect().await?;
        debug!("credential lookup");
        let rows = conn
            .query(&sql, &params)
            .await
            .inspect_err(|err| warn!(error = %err, "credential lookup failed"))?;
        drop(conn);

        match rows.into_iter().next().and_then(|row| row.into_iter().next()) {
            Some(id) => normalize(id).map(Some),
            None => Ok(None),
        }
    }
}
