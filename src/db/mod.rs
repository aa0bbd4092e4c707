pub mod loader;
pub mod models;

use crate::address::ConnectionString;
use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::sql_constants::{CHECK_DATABASE_EXISTS, QUIET_NOTICES};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Executor;
use std::sync::atomic::{AtomicU64, Ordering};

/// PostgreSQL truncates identifiers longer than this
pub const MAX_IDENTIFIER_LEN: usize = 63;

static NEXT_DATABASE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn pool_options(config: &SandboxConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute(QUIET_NOTICES).await?;
                Ok(())
            })
        })
}

pub async fn create_pool(target: &ConnectionString, config: &SandboxConfig) -> Result<PgPool> {
    let pool = pool_options(config)
        .connect_with(target.connect_options())
        .await?;
    Ok(pool)
}

/// Pool that opens its first connection on first use
pub fn create_lazy_pool(target: &ConnectionString, config: &SandboxConfig) -> Result<PgPool> {
    let pool = pool_options(config).connect_lazy_with(target.connect_options());
    Ok(pool)
}

/// Unique, valid database name: `<prefix>_<pid>_<seq>_<random>`
pub fn generate_database_name(prefix: &str) -> String {
    let seq = NEXT_DATABASE_ID.fetch_add(1, Ordering::Relaxed);
    let salt: u32 = rand::random();
    let suffix = format!("_{}_{}_{:08x}", std::process::id(), seq, salt);

    let mut prefix = sanitize_identifier(prefix);
    if prefix.is_empty() || prefix.starts_with(|c: char| c.is_ascii_digit()) {
        prefix.insert(0, 'd');
    }
    prefix.truncate(MAX_IDENTIFIER_LEN.saturating_sub(suffix.len()));

    format!("{prefix}{suffix}")
}

fn sanitize_identifier(input: &str) -> String {
    input
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Quote a database name for use in DDL.
///
/// Only names this crate could have generated are accepted.
pub fn quote_identifier(name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(SandboxError::PreconditionViolation(format!(
            "invalid database name '{name}'"
        )));
    }
    Ok(format!("\"{name}\""))
}

pub async fn create_database(admin: &PgPool, name: &str) -> Result<()> {
    let sql = format!("CREATE DATABASE {}", quote_identifier(name)?);
    admin.execute(sql.as_str()).await?;
    tracing::info!(database = name, "Created database");
    Ok(())
}

/// Drop a database, terminating any sessions still connected to it.
pub async fn drop_database(admin: &PgPool, name: &str) -> Result<()> {
    let sql = format!(
        "DROP DATABASE IF EXISTS {} WITH (FORCE)",
        quote_identifier(name)?
    );
    admin.execute(sql.as_str()).await?;
    tracing::info!(database = name, "Dropped database");
    Ok(())
}

pub async fn database_exists(admin: &PgPool, name: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(CHECK_DATABASE_EXISTS)
        .bind(name)
        .fetch_one(admin)
        .await?;
    Ok(exists)
}
