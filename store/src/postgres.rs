//! PostgreSQL backend over `tokio-postgres`.
//!
//! Values are converted against the parameter and column types the server
//! reports for each prepared statement, so a JSON integer can land in an
//! `INT4`, `NUMERIC` or `TEXT` column alike.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use ecoimpact_common::config::ConnectionConfig;
use ecoimpact_common::error::DataError;
use ecoimpact_common::sql::Dialect;
use ecoimpact_common::value::SqlValue;
use postgres_native_tls::MakeTlsConnector;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tokio_postgres::config::SslMode;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::Client;
use tracing::{debug, warn};

use crate::connector::{Connection, Connector, Row};

type Param = Box<dyn ToSql + Sync + Send>;

/// Opens one fresh connection per call. No pooling.
#[derive(Clone)]
pub struct PgConnector {
    config: tokio_postgres::Config,
    tls: MakeTlsConnector,
}

impl std::fmt::Debug for PgConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // tokio_postgres::Config's Debug already redacts the password.
        f.debug_struct("PgConnector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PgConnector {
    pub fn new(config: &ConnectionConfig) -> Result<Self, DataError> {
        let (host, port) = config
            .host_and_port()
            .map_err(|err| DataError::Connection(err.to_string()))?;

        let mut pg = tokio_postgres::Config::new();
        pg.host(host)
            .port(port)
            .dbname(&config.database)
            .user(&config.user)
            .password(&config.password)
            .connect_timeout(config.connect_timeout())
            .application_name("ecoimpact")
            .ssl_mode(if config.encrypt {
                SslMode::Require
            } else {
                SslMode::Disable
            });

        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(config.trust_server_certificate)
            .danger_accept_invalid_hostnames(config.trust_server_certificate)
            .build()
            .map_err(|err| DataError::Connection(format!("TLS setup failed: {err}")))?;

        Ok(Self {
            config: pg,
            tls: MakeTlsConnector::new(tls),
        })
    }

    /// Open a raw client. The connection task ends once the client is dropped.
    pub async fn client(&self) -> Result<Client, DataError> {
        let (client, connection) = self
            .config
            .connect(self.tls.clone())
            .await
            .map_err(|err| DataError::Connection(describe(&err)))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!(error = %describe(&err), "postgres connection closed with error");
            }
        });
        Ok(client)
    }
}

impl Connector for PgConnector {
    type Conn = PgConnection;

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn connect(&self) -> Result<PgConnection, DataError> {
        let client = self.client().await?;
        debug!("postgres connection opened");
        Ok(PgConnection { client })
    }
}

/// Dropping the connection drops the client, which ends the session. An open
/// transaction is rolled back by the server.
pub struct PgConnection {
    client: Client,
}

impl Connection for PgConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DataError> {
        let statement = self.client.prepare(sql).await.map_err(query_error)?;
        let bound = bind(statement.params(), params, Overflow::NeverMatches)?;
        let refs = as_refs(&bound);
        let rows = self
            .client
            .query(&statement, &refs)
            .await
            .map_err(query_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn begin(&mut self) -> Result<(), DataError> {
        self.client.batch_execute("BEGIN").await.map_err(write_error)
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DataError> {
        let statement = self.client.prepare(sql).await.map_err(write_error)?;
        let bound = bind(statement.params(), params, Overflow::Reject)?;
        let refs = as_refs(&bound);
        self.client
            .execute(&statement, &refs)
            .await
            .map_err(write_error)
    }

    async fn commit(&mut self) -> Result<(), DataError> {
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(|err| DataError::Write(describe(&err)))
    }
}

/// Driver error text without any bound values. Server `DETAIL` lines can echo
/// row contents, so only the SQLSTATE and primary message are kept.
fn describe(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => format!("{}: {}", db.code().code(), db.message()),
        None => err.to_string(),
    }
}

fn is_connection_lost(err: &tokio_postgres::Error) -> bool {
    err.as_db_error().is_none() && err.is_closed()
}

fn query_error(err: tokio_postgres::Error) -> DataError {
    if is_connection_lost(&err) {
        DataError::Connection(describe(&err))
    } else {
        DataError::Query(describe(&err))
    }
}

/// SQLSTATE class 42 (syntax error or access rule violation) is a statement
/// defect; everything else on the write path is a write failure.
fn write_error(err: tokio_postgres::Error) -> DataError {
    match err.code() {
        Some(code) if code.code().starts_with("42") => DataError::Query(describe(&err)),
        _ if is_connection_lost(&err) => DataError::Connection(describe(&err)),
        _ => DataError::Write(describe(&err)),
    }
}

fn as_refs(bound: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    bound
        .iter()
        .map(|param| param.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

/// What to do with a whole number that does not fit its integer parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overflow {
    /// Fail the bind. Used on the write path, where storing it is impossible.
    Reject,
    /// Bind a typed NULL. Lookups compare parameters by equality or ordering
    /// only, and a NULL operand matches no row.
    NeverMatches,
}

fn bind(types: &[Type], values: &[SqlValue], overflow: Overflow) -> Result<Vec<Param>, DataError> {
    if types.len() != values.len() {
        return Err(DataError::Query(format!(
            "statement expects {} parameters, got {}",
            types.len(),
            values.len()
        )));
    }
    types
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (ty, value))| {
            if overflow == Overflow::NeverMatches && overflows_integer(value, ty) {
                return Ok(null_of(ty));
            }
            to_param(value, ty).ok_or_else(|| {
                DataError::Query(format!(
                    "cannot bind {} to parameter ${} of type {}",
                    value.kind(),
                    i + 1,
                    ty
                ))
            })
        })
        .collect()
}

/// Whether `value` is a whole number outside the range of integer type `ty`.
fn overflows_integer(value: &SqlValue, ty: &Type) -> bool {
    let n = match value {
        SqlValue::Int(n) => i128::from(*n),
        SqlValue::Float(f) if f.is_finite() && f.fract() == 0.0 => *f as i128,
        _ => return false,
    };
    let (min, max) = match *ty {
        Type::INT2 => (i128::from(i16::MIN), i128::from(i16::MAX)),
        Type::INT4 => (i128::from(i32::MIN), i128::from(i32::MAX)),
        Type::INT8 => (i128::from(i64::MIN), i128::from(i64::MAX)),
        _ => return false,
    };
    n < min || n > max
}

/// Convert one value for a parameter of type `ty`. `None` when the value
/// cannot be represented in that type.
fn to_param(value: &SqlValue, ty: &Type) -> Option<Param> {
    match value {
        SqlValue::Null => Some(null_of(ty)),
        SqlValue::Bool(b) => match *ty {
            Type::BOOL => Some(Box::new(*b)),
            _ => None,
        },
        SqlValue::Int(n) => int_param(*n, ty),
        SqlValue::Float(f) => float_param(*f, ty),
        SqlValue::Decimal(d) => match *ty {
            Type::NUMERIC => Some(Box::new(*d)),
            Type::FLOAT8 => d.to_f64().map(|f| Box::new(f) as Param),
            Type::FLOAT4 => d.to_f32().map(|f| Box::new(f) as Param),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR => Some(Box::new(d.to_string())),
            _ => None,
        },
        SqlValue::Text(s) => text_param(s, ty),
        SqlValue::Bytes(bytes) => match *ty {
            Type::BYTEA => Some(Box::new(bytes.clone())),
            _ => None,
        },
        SqlValue::Timestamp(ts) => match *ty {
            Type::TIMESTAMPTZ => Some(Box::new(*ts)),
            Type::TIMESTAMP => Some(Box::new(ts.naive_utc())),
            Type::DATE => Some(Box::new(ts.date_naive())),
            _ => None,
        },
        SqlValue::LocalTimestamp(ts) => match *ty {
            Type::TIMESTAMP => Some(Box::new(*ts)),
            Type::TIMESTAMPTZ => Some(Box::new(ts.and_utc())),
            _ => None,
        },
        SqlValue::Date(d) => match *ty {
            Type::DATE => Some(Box::new(*d)),
            _ => None,
        },
        SqlValue::Json(v) => match *ty {
            Type::JSON | Type::JSONB => Some(Box::new(v.clone())),
            _ => None,
        },
    }
}

fn int_param(n: i64, ty: &Type) -> Option<Param> {
    match *ty {
        Type::INT2 => i16::try_from(n).ok().map(|v| Box::new(v) as Param),
        Type::INT4 => i32::try_from(n).ok().map(|v| Box::new(v) as Param),
        Type::INT8 => Some(Box::new(n)),
        Type::FLOAT4 => Some(Box::new(n as f32)),
        Type::FLOAT8 => Some(Box::new(n as f64)),
        Type::NUMERIC => Some(Box::new(Decimal::from(n))),
        Type::BOOL => match n {
            0 => Some(Box::new(false)),
            1 => Some(Box::new(true)),
            _ => None,
        },
        Type::TEXT | Type::VARCHAR | Type::BPCHAR => Some(Box::new(n.to_string())),
        _ => None,
    }
}

fn float_param(f: f64, ty: &Type) -> Option<Param> {
    match *ty {
        Type::FLOAT8 => Some(Box::new(f)),
        Type::FLOAT4 => Some(Box::new(f as f32)),
        Type::NUMERIC => Decimal::from_f64(f).map(|d| Box::new(d) as Param),
        Type::INT2 | Type::INT4 | Type::INT8
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 =>
        {
            int_param(f as i64, ty)
        }
        Type::TEXT | Type::VARCHAR | Type::BPCHAR => Some(Box::new(f.to_string())),
        _ => None,
    }
}

fn text_param(s: &str, ty: &Type) -> Option<Param> {
    match *ty {
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            Some(Box::new(s.to_string()))
        }
        Type::INT2 | Type::INT4 | Type::INT8 => s.trim().parse().ok().and_then(|n| int_param(n, ty)),
        Type::FLOAT4 | Type::FLOAT8 => s.trim().parse().ok().and_then(|f| float_param(f, ty)),
        Type::NUMERIC => Decimal::from_str(s.trim()).ok().map(|d| Box::new(d) as Param),
        Type::BOOL => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "1" => Some(Box::new(true)),
            "false" | "f" | "no" | "0" => Some(Box::new(false)),
            _ => None,
        },
        Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|ts| Box::new(ts.with_timezone(&Utc)) as Param),
        Type::TIMESTAMP => NaiveDateTime::from_str(s).ok().map(|ts| Box::new(ts) as Param),
        Type::DATE => NaiveDate::from_str(s).ok().map(|d| Box::new(d) as Param),
        Type::JSON | Type::JSONB => Some(Box::new(serde_json::Value::String(s.to_string()))),
        _ => None,
    }
}

/// A typed NULL. The server checks the parameter type even for NULLs.
fn null_of(ty: &Type) -> Param {
    match *ty {
        Type::BOOL => Box::new(None::<bool>),
        Type::INT2 => Box::new(None::<i16>),
        Type::INT4 => Box::new(None::<i32>),
        Type::INT8 => Box::new(None::<i64>),
        Type::FLOAT4 => Box::new(None::<f32>),
        Type::FLOAT8 => Box::new(None::<f64>),
        Type::NUMERIC => Box::new(None::<Decimal>),
        Type::BYTEA => Box::new(None::<Vec<u8>>),
        Type::TIMESTAMPTZ => Box::new(None::<DateTime<Utc>>),
        Type::TIMESTAMP => Box::new(None::<NaiveDateTime>),
        Type::DATE => Box::new(None::<NaiveDate>),
        Type::JSON | Type::JSONB => Box::new(None::<serde_json::Value>),
        _ => Box::new(None::<String>),
    }
}

fn decode_row(row: &tokio_postgres::Row) -> Result<Row, DataError> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| decode(row, idx, column.type_()))
        .collect()
}

fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, idx: usize) -> Result<Option<T>, DataError> {
    row.try_get(idx)
        .map_err(|err| DataError::Query(describe(&err)))
}

fn decode(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<SqlValue, DataError> {
    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.map(SqlValue::Bool),
        Type::INT2 => get::<i16>(row, idx)?.map(|n| SqlValue::Int(n.into())),
        Type::INT4 => get::<i32>(row, idx)?.map(|n| SqlValue::Int(n.into())),
        Type::INT8 => get::<i64>(row, idx)?.map(SqlValue::Int),
        Type::OID => get::<u32>(row, idx)?.map(|n| SqlValue::Int(n.into())),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|f| SqlValue::Float(f.into())),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(SqlValue::Float),
        Type::NUMERIC => get::<Decimal>(row, idx)?.map(SqlValue::Decimal),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            get::<String>(row, idx)?.map(SqlValue::Text)
        }
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(SqlValue::Bytes),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx)?.map(SqlValue::Timestamp),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx)?.map(SqlValue::LocalTimestamp),
        Type::DATE => get::<NaiveDate>(row, idx)?.map(SqlValue::Date),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx)?.map(SqlValue::Json),
        _ => {
            return Err(DataError::Query(format!(
                "unsupported column type {ty} at position {idx}"
            )))
        }
    };
    Ok(value.unwrap_or(SqlValue::Null))
}
