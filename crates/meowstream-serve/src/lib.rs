//! meowstream serve - HTTP query API for stored meow records.
//!
//! This crate provides a small read-only REST API over the ClickHouse
//! table the ingester writes. It is a thin wrapper: request validation,
//! bound store lookups, JSON responses.
//!
//! # Architecture
//!
//! - **AppState**: Shared application state (ClickHouse client, configuration)
//! - **Routes**: Endpoint handlers (health, meow lookups)
//! - **ApiError**: Structured error responses that never leak store
//!   error text to callers

mod error;
mod routes;
mod state;

pub use self::error::ApiError;
pub use self::routes::router;
pub use self::state::{AppState, Config};
