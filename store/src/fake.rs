//! Scripted in-memory connector.
//!
//! Each `query`/`execute` consumes the next scripted step (an empty script
//! answers with no rows and one affected row). The connector counts opened and
//! dropped connections so tests can assert nothing leaks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ecoimpact_common::error::DataError;
use ecoimpact_common::sql::Dialect;
use ecoimpact_common::value::SqlValue;

use crate::connector::{Connection, Connector, Row};

/// Failure injected at the next scripted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Query,
    Write,
    /// The statement succeeds but the following commit fails.
    Commit,
}

#[derive(Debug, Clone)]
enum Step {
    Rows(Vec<Row>),
    Fail(Failure),
}

/// A statement as the fake received it.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Debug, Default)]
struct FakeState {
    opened: AtomicUsize,
    closed: AtomicUsize,
    refuse: AtomicBool,
    script: Mutex<VecDeque<Step>>,
    statements: Mutex<Vec<Executed>>,
    committed: Mutex<Vec<Executed>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    state: Arc<FakeState>,
}

impl FakeConnector {
    /// ANSI dialect, so expected SQL reads as `?` placeholders.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        lock(&self.state.script).push_back(Step::Rows(rows));
    }

    pub fn push_failure(&self, failure: Failure) {
        lock(&self.state.script).push_back(Step::Fail(failure));
    }

    /// While set, `connect` fails with a connection error.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn connections_opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn connections_closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Connections handed out and not yet dropped.
    pub fn open_connections(&self) -> usize {
        self.connections_opened() - self.connections_closed()
    }

    /// Every `query`/`execute` received, in order.
    pub fn statements(&self) -> Vec<Executed> {
        lock(&self.state.statements).clone()
    }

    /// Executed statements whose transaction committed.
    pub fn committed(&self) -> Vec<Executed> {
        lock(&self.state.committed).clone()
    }

    fn next_step(&self) -> Option<Step> {
        lock(&self.state.script).pop_front()
    }

    fn record(&self, sql: &str, params: &[SqlValue]) -> Executed {
        let executed = Executed {
            sql: sql.to_string(),
            params: params.to_vec(),
        };
        lock(&self.state.statements).push(executed.clone());
        executed
    }
}

impl Connector for FakeConnector {
    type Conn = FakeConnection;

    fn dialect(&self) -> Dialect {
        Dialect::Ansi
    }

    async fn connect(&self) -> Result<FakeConnection, DataError> {
        if self.state.refuse.load(Ordering::SeqCst) {
            return Err(DataError::Connection("connection refused".to_string()));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection {
            connector: self.clone(),
            pending: Vec::new(),
            fail_commit: false,
        })
    }
}

#[derive(Debug)]
pub struct FakeConnection {
    connector: FakeConnector,
    pending: Vec<Executed>,
    fail_commit: bool,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.connector.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Connection for FakeConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DataError> {
        self.connector.record(sql, params);
        match self.connector.next_step() {
            Some(Step::Rows(rows)) => Ok(rows),
            Some(Step::Fail(Failure::Write | Failure::Commit)) => {
                Err(DataError::Write("scripted failure".to_string()))
            }
            Some(Step::Fail(Failure::Query)) => {
                Err(DataError::Query("scripted failure".to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    async fn begin(&mut self) -> Result<(), DataError> {
        self.pending.clear();
        self.fail_commit = false;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DataError> {
        let executed = self.connector.record(sql, params);
        match self.connector.next_step() {
            Some(Step::Fail(Failure::Query)) => {
                Err(DataError::Query("scripted failure".to_string()))
            }
            Some(Step::Fail(Failure::Write)) => {
                Err(DataError::Write("scripted failure".to_string()))
            }
            Some(Step::Fail(Failure::Commit)) => {
                self.fail_commit = true;
                self.pending.push(executed);
                Ok(1)
            }
            Some(Step::Rows(rows)) => {
                self.pending.push(executed);
                Ok(rows.len() as u64)
            }
            None => {
                self.pending.push(executed);
                Ok(1)
            }
        }
    }

    async fn commit(&mut self) -> Result<(), DataError> {
        if self.fail_commit {
            self.pending.clear();
            return Err(DataError::Write("commit failed".to_string()));
        }
        lock(&self.connector.state.committed).append(&mut self.pending);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use ecoimpact_common::schema::{PRODUCTS, USERS};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::auth::{CredentialVerifier, PlaintextCredentials};
    use crate::Store;

    #[tokio::test]
    async fn dropping_a_connection_counts_as_closed() {
        let fake = FakeConnector::new();
        let conn = fake.connect().await.unwrap();
        assert_eq!(fake.open_connections(), 1);
        drop(conn);
        assert_eq!(fake.open_connections(), 0);
    }

    /// 100 randomized reads, writes, aggregates and logins, each either
    /// succeeding or failing at a random point, must leave no open connection.
    #[tokio::test]
    async fn no_connection_leaks_across_randomized_calls() {
        let fake = FakeConnector::new();
        let store = Store::new(fake.clone());
        let credentials = PlaintextCredentials::new(fake.clone());
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut refused = 0;

        for _ in 0..100 {
            let refuse = rng.gen_bool(0.1);
            fake.refuse_connections(refuse);
            if refuse {
                refused += 1;
            }
            match rng.gen_range(0..4u8) {
                0 => fake.push_failure(Failure::Query),
                1 => fake.push_failure(Failure::Write),
                2 => fake.push_failure(Failure::Commit),
                _ => {}
            }

            let _ = match rng.gen_range(0..6u8) {
                0 => store.list(&PRODUCTS).await.map(drop),
                1 => store.get(&USERS, SqlValue::Int(1)).await.map(drop),
                2 => store
                    .insert("USERS", &["Username"], &[SqlValue::from("ada")])
                    .await,
                3 => store.summarize_impact(1, Utc::now()).await.map(drop),
                4 => credentials.verify("ada", "pw").await.map(drop),
                _ => store
                    .insert("USERS", &["Username", "Password"], &[SqlValue::Null])
                    .await,
            };

            // Steps not consumed by a refused or short-circuited call must not
            // bleed into the next iteration.
            lock(&fake.state.script).clear();
            assert_eq!(fake.open_connections(), 0);
        }

        assert!(refused > 0);
        assert!(fake.connections_opened() > 0);
        assert_eq!(fake.connections_opened(), fake.connections_closed());
    }
}
