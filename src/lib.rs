//! Disposable PostgreSQL databases for tests.
//!
//! A [`Sandbox`] talks to one PostgreSQL server (a container started through
//! testcontainers, or an external server). Each [`Sandbox::run`] call gets a
//! freshly created database with the registered schema applied, and the
//! database is dropped afterwards whether the test passed, failed or panicked.

pub mod address;
pub mod config;
pub mod db;
pub mod error;
pub mod fixture;
pub mod introspect;
pub mod logging;
pub mod provision;
pub mod readiness;
pub mod registry;
pub mod sql_constants;

pub use address::{ConnectionString, Credentials, ServerAddress};
pub use config::{LoaderKind, SandboxConfig};
pub use db::models::{ColumnInfo, TableHandle};
pub use error::{Result, SandboxError};
pub use fixture::{Sandbox, TestDatabase};
pub use introspect::get_table;
pub use readiness::RetryPolicy;
pub use registry::set_schema;

#[cfg(test)]
pub mod test_utils;
