//! Fixtures for tests against a live PostgreSQL database.
//!
//! The database named by `DB_SERVER`/`DB_NAME`/`DB_USER`/`DB_PASS` is wiped and
//! rebuilt from `schema/postgres.sql` by every [`fresh_database`] call. Never
//! point these at data you want to keep.

use chrono::{DateTime, Utc};
use ecoimpact_common::config::ConnectionConfig;
use ecoimpact_common::schema::{USERNAME, USERS, USER_ID};
use ecoimpact_common::value::SqlValue;
use ecoimpact_store::postgres::PgConnector;
use ecoimpact_store::Store;
use tokio::sync::{Mutex, MutexGuard};

/// DDL applied before each test.
pub const SCHEMA: &str = include_str!("../../../schema/postgres.sql");

static DB_LOCK: Mutex<()> = Mutex::const_new(());

/// Connector built from the `DB_*` environment.
pub fn connector() -> PgConnector {
    let config = ConnectionConfig::from_env()
        .unwrap_or_else(|e| panic!("DB_* environment incomplete: {e}"));
    PgConnector::new(&config).unwrap_or_else(|e| panic!("Failed to configure connector: {e}"))
}

/// Take the database for one test and reset it to an empty schema.
///
/// Hold the returned guard until the test ends; tests in one binary would
/// otherwise rebuild the schema underneath each other.
pub async fn fresh_database() -> (MutexGuard<'static, ()>, PgConnector) {
    tracing_subscriber::fmt::try_init().ok();
    let guard = DB_LOCK.lock().await;
    let connector = connector();
    let client = connector
        .client()
        .await
        .unwrap_or_else(|e| panic!("Failed to reach test database: {e}"));
    client
        .batch_execute(SCHEMA)
        .await
        .unwrap_or_else(|e| panic!("Failed to apply schema: {e}"));
    (guard, connector)
}

/// Create a user through the store and return its assigned id.
pub async fn create_user(store: &Store<PgConnector>, username: &str) -> i64 {
    store
        .insert(
            USERS.table,
            &[USERNAME, "Password"],
            &[SqlValue::from(username), SqlValue::from("pw")],
        )
        .await
        .unwrap_or_else(|e| panic!("Failed to create user {username}: {e}"));
    let rows = store
        .list_where(&USERS, USERNAME, SqlValue::from(username))
        .await
        .unwrap_or_else(|e| panic!("Failed to read back user {username}: {e}"));
    rows.first()
        .and_then(|record| record.get(USER_ID))
        .and_then(serde_json::Value::as_i64)
        .unwrap_or_else(|| panic!("User {username} has no id"))
}

/// Insert an impact event with an explicit timestamp, bypassing the store
/// default.
pub async fn record_impact_at(
    connector: &PgConnector,
    user_id: i64,
    ghg: f64,
    water: f64,
    at: DateTime<Utc>,
) {
    let client = connector
        .client()
        .await
        .unwrap_or_else(|e| panic!("Failed to reach test database: {e}"));
    let user_id = i32::try_from(user_id).unwrap_or_else(|_| panic!("user id {user_id} out of range"));
    client
        .execute(
            r#"INSERT INTO "UserImpact" ("UserID", "GHG", "Water", "ImpactTime")
               VALUES ($1, $2::float8, $3::float8, $4)"#,
            &[&user_id, &ghg, &water, &at],
        )
        .await
        .unwrap_or_else(|e| panic!("Failed to insert backdated impact: {e}"));
}
