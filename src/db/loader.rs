//! Schema loaders: apply a SQL file to a freshly created database.
//!
//! Both loaders fail with [`SandboxError::SchemaLoadError`] when the script
//! does not apply cleanly, so a broken schema stops the test during setup
//! instead of surfacing later as confusing assertion failures.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use sqlx::postgres::PgPoolOptions;

use crate::address::ConnectionString;
use crate::config::LoaderKind;
use crate::error::{Result, SandboxError};

pub trait SchemaLoader: Send + Sync {
    fn load(
        &self,
        schema: &Path,
        target: &ConnectionString,
    ) -> impl Future<Output = Result<()>> + Send;
}

fn load_error(schema: &Path, detail: impl Into<String>) -> SandboxError {
    SandboxError::SchemaLoadError {
        path: schema.to_path_buf(),
        detail: detail.into(),
    }
}

/// Sends the whole script over a single-connection sqlx pool using the simple
/// query protocol, which accepts multiple statements and dollar-quoted bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectLoader;

impl SchemaLoader for DirectLoader {
    async fn load(&self, schema: &Path, target: &ConnectionString) -> Result<()> {
        let sql = tokio::fs::read_to_string(schema)
            .await
            .map_err(|e| load_error(schema, format!("cannot read schema file: {e}")))?;

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(target.connect_options())
            .await
            .map_err(|e| {
                load_error(schema, format!("cannot connect to {}: {e}", target.database))
            })?;
        let applied = sqlx::raw_sql(&sql).execute(&pool).await;
        pool.close().await;

        applied.map_err(|e| load_error(schema, e.to_string()))?;
        tracing::debug!(schema = %schema.display(), database = %target.database, "Schema applied");
        Ok(())
    }
}

/// Runs the `psql` client against the target database.
#[derive(Debug, Clone, Default)]
pub struct PsqlLoader {
    binary: Option<PathBuf>,
}

impl PsqlLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(path.into()),
        }
    }

    fn resolve_binary(&self, schema: &Path) -> Result<PathBuf> {
        match &self.binary {
            Some(path) => Ok(path.clone()),
            None => which::which("psql")
                .map_err(|_| load_error(schema, "psql binary not found in PATH")),
        }
    }
}

impl SchemaLoader for PsqlLoader {
    async fn load(&self, schema: &Path, target: &ConnectionString) -> Result<()> {
        let binary = self.resolve_binary(schema)?;
        tracing::debug!(
            psql = %binary.display(),
            schema = %schema.display(),
            database = %target.database,
            "Loading schema with psql"
        );

        let output = tokio::process::Command::new(&binary)
            .arg("--no-psqlrc")
            .arg("--quiet")
            .arg("-v")
            .arg("ON_ERROR_STOP=1")
            .arg("-f")
            .arg(schema)
            .arg("--host")
            .arg(&target.address.host)
            .arg("--port")
            .arg(target.address.port.to_string())
            .arg("--username")
            .arg(&target.credentials.user)
            .arg("--dbname")
            .arg(&target.database)
            .env("PGPASSWORD", &target.credentials.password)
            .env("PGCONNECT_TIMEOUT", "10")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| load_error(schema, format!("failed to run {}: {e}", binary.display())))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(load_error(
                schema,
                format!("psql exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        if let Some(line) = stderr
            .lines()
            .find(|line| line.contains("ERROR:") || line.contains("FATAL:"))
        {
            return Err(load_error(schema, line.trim().to_string()));
        }

        Ok(())
    }
}

/// Loader selected at runtime from [`LoaderKind`].
#[derive(Debug, Clone)]
pub enum AnyLoader {
    Direct(DirectLoader),
    Psql(PsqlLoader),
}

impl From<LoaderKind> for AnyLoader {
    fn from(kind: LoaderKind) -> Self {
        match kind {
            LoaderKind::Direct => AnyLoader::Direct(DirectLoader),
            LoaderKind::Psql => AnyLoader::Psql(PsqlLoader::new()),
        }
    }
}

impl SchemaLoader for AnyLoader {
    async fn load(&self, schema: &Path, target: &ConnectionString) -> Result<()> {
        match self {
            AnyLoader::Direct(loader) => loader.load(schema, target).await,
            AnyLoader::Psql(loader) => loader.load(schema, target).await,
        }
    }
}
