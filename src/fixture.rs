//! Per-test database lifecycle.
//!
//! A [`Sandbox`] owns an admin connection to one server. Every call to
//! [`Sandbox::run`] creates a uniquely named database, applies the schema,
//! hands a [`TestDatabase`] to the test body and drops the database again on
//! every exit path, so no test can observe rows written by another.
//!
//! ```no_run
//! use pg_sandbox::{Sandbox, SandboxConfig};
//!
//! # async fn example() -> pg_sandbox::Result<()> {
//! let sandbox = Sandbox::start(SandboxConfig::default().with_schema("schema.sql")).await?;
//! sandbox
//!     .run(|db| async move {
//!         let users = db.get_table("users", Some(&["id", "name"][..])).await.unwrap();
//!         assert_eq!(users.columns.len(), 2);
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;

use futures_util::FutureExt;
use sqlx::PgPool;

use crate::address::{ConnectionString, ServerAddress};
use crate::config::SandboxConfig;
use crate::db;
use crate::db::loader::{AnyLoader, SchemaLoader};
use crate::db::models::TableHandle;
use crate::error::{Result, SandboxError};
use crate::introspect;
use crate::provision::{self, Provisioner};
use crate::readiness::ReadinessPoller;
use crate::registry;

/// Connection handle to one sandbox database.
///
/// Becomes unusable once the database is released: the pool is closed and
/// every later query fails.
#[derive(Debug, Clone)]
pub struct TestDatabase {
    name: String,
    connection: ConnectionString,
    pool: PgPool,
}

impl TestDatabase {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection_string(&self) -> &ConnectionString {
        &self.connection
    }

    pub fn url(&self) -> String {
        self.connection.url()
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    pub async fn get_table(&self, table: &str, expected: Option<&[&str]>) -> Result<TableHandle> {
        introspect::get_table(&self.pool, table, expected).await
    }
}

pub struct Sandbox<L = AnyLoader> {
    config: SandboxConfig,
    server: ServerAddress,
    admin_connection: ConnectionString,
    admin: PgPool,
    loader: L,
}

impl Sandbox {
    /// Start (or reuse) the process-wide server, wait for it and connect.
    pub async fn start(config: SandboxConfig) -> Result<Self> {
        let server = provision::shared_server(&config).await?;
        Self::connect(config, server).await
    }

    /// Like [`Sandbox::start`] with a caller-owned provisioner.
    pub async fn start_with<P: Provisioner>(
        config: SandboxConfig,
        provisioner: &P,
    ) -> Result<Self> {
        let server = provisioner.start().await?;
        Self::connect(config, server).await
    }

    async fn connect(config: SandboxConfig, server: ServerAddress) -> Result<Self> {
        ReadinessPoller::new(config.readiness)
            .wait_until_ready(&server)
            .await?;

        let sandbox = Self::from_parts(config, server)?;
        sqlx::query("SELECT 1")
            .execute(&sandbox.admin)
            .await
            .map_err(|e| {
                SandboxError::ProvisioningError(format!(
                    "cannot connect to {}: {e}",
                    sandbox.admin_connection.database
                ))
            })?;
        Ok(sandbox)
    }

    /// Build a sandbox for a known server without probing it. The admin
    /// connection is opened on first use.
    pub fn from_parts(config: SandboxConfig, server: ServerAddress) -> Result<Self> {
        let admin_connection = ConnectionString::new(
            server.clone(),
            config.credentials.clone(),
            config.admin_database.clone(),
        );
        let admin = db::create_lazy_pool(&admin_connection, &config)?;
        let loader = AnyLoader::from(config.loader);

        Ok(Self {
            config,
            server,
            admin_connection,
            admin,
            loader,
        })
    }
}

impl<L: SchemaLoader> Sandbox<L> {
    pub fn with_loader<M: SchemaLoader>(self, loader: M) -> Sandbox<M> {
        Sandbox {
            config: self.config,
            server: self.server,
            admin_connection: self.admin_connection,
            admin: self.admin,
            loader,
        }
    }

    pub fn server(&self) -> &ServerAddress {
        &self.server
    }

    pub fn admin_connection(&self) -> &ConnectionString {
        &self.admin_connection
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub async fn database_exists(&self, name: &str) -> Result<bool> {
        db::database_exists(&self.admin, name).await
    }

    fn schema(&self) -> Result<&Path> {
        match self.config.schema.as_deref() {
            Some(path) => Ok(path),
            None => registry::global().require(),
        }
    }

    /// Create a database, apply the schema and connect to it.
    ///
    /// Prefer [`Sandbox::run`]; callers of `acquire` must pass the handle to
    /// [`Sandbox::release`] themselves.
    pub async fn acquire(&self) -> Result<TestDatabase> {
        let schema = self.schema()?;
        let name = db::generate_database_name(&self.config.database_prefix);

        db::create_database(&self.admin, &name)
            .await
            .map_err(|e| {
                SandboxError::ProvisioningError(format!("failed to create database {name}: {e}"))
            })?;

        let connection = self.admin_connection.for_database(name.clone());
        if let Err(e) = self.loader.load(schema, &connection).await {
            self.drop_database(&name).await;
            return Err(e);
        }

        let pool = match db::create_pool(&connection, &self.config).await {
            Ok(pool) => pool,
            Err(e) => {
                self.drop_database(&name).await;
                return Err(SandboxError::ProvisioningError(format!(
                    "failed to connect to {name}: {e}"
                )));
            },
        };

        crate::log_sandbox_operation!("acquire", name, schema.display());
        Ok(TestDatabase {
            name,
            connection,
            pool,
        })
    }

    /// Close the handle and drop its database. Failures are logged, not returned.
    pub async fn release(&self, database: TestDatabase) {
        database.pool.close().await;
        self.drop_database(&database.name).await;
        crate::log_sandbox_operation!("release", database.name);
    }

    async fn drop_database(&self, name: &str) {
        if self.config.keep_databases {
            tracing::info!(database = name, "Keeping database");
            return;
        }
        if let Err(e) = db::drop_database(&self.admin, name).await {
            tracing::warn!(database = name, error = %e, "Failed to drop database");
        }
    }

    /// Run `body` against a fresh database.
    ///
    /// Setup failures are returned before `body` runs. Whatever `body`
    /// returns is passed through; if it panics, the database is dropped and
    /// the panic resumed.
    pub async fn run<F, Fut, T>(&self, body: F) -> Result<T>
    where
        F: FnOnce(TestDatabase) -> Fut,
        Fut: Future<Output = T>,
    {
        let database = self.acquire().await?;
        let handle = database.clone();

        let outcome = AssertUnwindSafe(async move { body(handle).await })
            .catch_unwind()
            .await;
        self.release(database).await;

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
