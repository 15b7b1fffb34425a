//! HTTP surface for the eco-impact data layer.
//!
//! Routes are thin: each handler makes one store call and maps the outcome to
//! a status code. Password columns are stripped from user records here, before
//! anything leaves the process.

pub mod routes;

pub use routes::{router, AppState};
