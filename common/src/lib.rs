pub mod config;
pub mod error;
pub mod impact;
pub mod record;
pub mod schema;
pub mod sql;
pub mod value;
