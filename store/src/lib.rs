//! Column-driven data access over a relational store.
//!
//! Every operation on [`Store`] opens one connection, issues one statement and
//! drops the connection before returning, on success and on every error path.
//! The backend sits behind [`Connector`]; [`postgres::PgConnector`] is the
//! production implementation.

pub mod auth;
pub mod connector;
pub mod impact;
pub mod postgres;
pub mod reader;
pub mod writer;

#[cfg(any(test, feature = "testing"))]
pub mod fake;

pub use connector::{Connection, Connector, Row};
pub use ecoimpact_common::error::DataError;

/// Entry point for reads, writes and impact aggregation.
#[derive(Debug, Clone)]
pub struct Store<C> {
    connector: C,
}

impl<C: Connector> Store<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }
}
