use std::future::Future;

use ecoimpact_common::error::DataError;
use ecoimpact_common::sql::Dialect;
use ecoimpact_common::value::SqlValue;

/// One positional result row, in projection order.
pub type Row = Vec<SqlValue>;

/// Opens connections to the backing store.
pub trait Connector: Send + Sync {
    type Conn: Connection;

    /// SQL conventions of this store. Known before connecting so statements
    /// can be built (and rejected) without touching the store.
    fn dialect(&self) -> Dialect;

    fn connect(&self) -> impl Future<Output = Result<Self::Conn, DataError>> + Send;
}

/// A single open connection. Dropping it releases the connection; an open
/// transaction that was never committed is rolled back by the store.
pub trait Connection: Send {
    /// Run a statement that returns rows.
    fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = Result<Vec<Row>, DataError>> + Send;

    fn begin(&mut self) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Run a statement inside the open transaction, returning affected rows.
    fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = Result<u64, DataError>> + Send;

    fn commit(&mut self) -> impl Future<Output = Result<(), DataError>> + Send;
}
