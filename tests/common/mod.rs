//! Common utilities for integration tests
//!
//! Sandboxes built here use the process-wide server: a container started on
//! first use, or the server named by `PG_SANDBOX_HOST`/`PG_SANDBOX_PORT`.

#![allow(dead_code)] // Not every test binary uses every helper

use pg_sandbox::db::loader::SchemaLoader;
use pg_sandbox::logging::init_test_logging;
use pg_sandbox::{Sandbox, SandboxConfig};
use sqlx::{Connection, PgConnection};
use std::path::PathBuf;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// `users(id, name, age, password)` plus `sum_of_ages()`
pub fn example_schema() -> PathBuf {
    fixture_path("example_schema.sql")
}

pub fn config() -> SandboxConfig {
    init_test_logging();
    SandboxConfig::from_env()
        .expect("PG_SANDBOX_* environment is invalid")
        .with_schema(example_schema())
}

pub async fn sandbox() -> Sandbox {
    sandbox_with(config()).await
}

pub async fn sandbox_with(config: SandboxConfig) -> Sandbox {
    Sandbox::start(config)
        .await
        .expect("Failed to start sandbox server")
}

/// Count databases on the server whose name starts with `prefix`
pub async fn count_databases<L: SchemaLoader>(sandbox: &Sandbox<L>, prefix: &str) -> i64 {
    let mut conn = PgConnection::connect_with(&sandbox.admin_connection().connect_options())
        .await
        .expect("Failed to connect to admin database");
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pg_database WHERE datname LIKE $1")
        .bind(format!("{prefix}\\_%"))
        .fetch_one(&mut conn)
        .await
        .expect("Failed to count databases");
    conn.close().await.ok();
    count
}

pub async fn drop_database<L: SchemaLoader>(sandbox: &Sandbox<L>, name: &str) {
    let mut conn = PgConnection::connect_with(&sandbox.admin_connection().connect_options())
        .await
        .expect("Failed to connect to admin database");
    sqlx::raw_sql(&format!("DROP DATABASE IF EXISTS \"{name}\" WITH (FORCE)"))
        .execute(&mut conn)
        .await
        .expect("Failed to drop database");
    conn.close().await.ok();
}
