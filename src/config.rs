//! Sandbox configuration.
//!
//! Everything has a default that works with a stock `postgres` container.
//! [`SandboxConfig::from_env`] layers `PG_SANDBOX_*` environment variables on
//! top of those defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::address::{Credentials, ServerAddress};
use crate::error::{Result, SandboxError};
use crate::readiness::RetryPolicy;

pub const DEFAULT_IMAGE: &str = "postgres";
pub const DEFAULT_TAG: &str = "16-alpine";
pub const DEFAULT_USER: &str = "postgres";
pub const DEFAULT_PASSWORD: &str = "postgres";
pub const DEFAULT_ADMIN_DATABASE: &str = "postgres";
pub const DEFAULT_DATABASE_PREFIX: &str = "sandbox";
pub const POSTGRES_PORT: u16 = 5432;

/// Which client applies the schema file to a new database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoaderKind {
    /// Send the whole file over the sqlx connection
    #[default]
    Direct,
    /// Shell out to the `psql` command-line client
    Psql,
}

impl LoaderKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "direct" | "sqlx" => Ok(LoaderKind::Direct),
            "psql" => Ok(LoaderKind::Psql),
            other => Err(SandboxError::PreconditionViolation(format!(
                "unknown schema loader '{other}', expected 'direct' or 'psql'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub image: String,
    pub tag: String,
    pub credentials: Credentials,
    /// Maintenance database used to create and drop sandbox databases
    pub admin_database: String,
    /// Connect to this server instead of starting a container
    pub external_server: Option<ServerAddress>,
    pub readiness: RetryPolicy,
    pub schema: Option<PathBuf>,
    pub loader: LoaderKind,
    /// Leave sandbox databases behind after each test, for debugging
    pub keep_databases: bool,
    pub database_prefix: String,
    pub max_connections: u32,
    /// How long a pool waits for a connection before giving up
    pub acquire_timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            tag: DEFAULT_TAG.to_string(),
            credentials: Credentials::new(DEFAULT_USER, DEFAULT_PASSWORD),
            admin_database: DEFAULT_ADMIN_DATABASE.to_string(),
            external_server: None,
            readiness: RetryPolicy::default(),
            schema: None,
            loader: LoaderKind::default(),
            keep_databases: false,
            database_prefix: DEFAULT_DATABASE_PREFIX.to_string(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl SandboxConfig {
    /// Defaults overridden by `PG_SANDBOX_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(image) = lookup("PG_SANDBOX_IMAGE") {
            config.image = image;
        }
        if let Some(tag) = lookup("PG_SANDBOX_TAG") {
            config.tag = tag;
        }
        if let Some(user) = lookup("PG_SANDBOX_USER") {
            config.credentials.user = user;
        }
        if let Some(password) = lookup("PG_SANDBOX_PASSWORD") {
            config.credentials.password = password;
        }
        if let Some(db) = lookup("PG_SANDBOX_ADMIN_DB") {
            config.admin_database = db;
        }
        if let Some(host) = lookup("PG_SANDBOX_HOST") {
            let port = match lookup("PG_SANDBOX_PORT") {
                Some(port) => port.parse::<u16>().map_err(|_| {
                    SandboxError::PreconditionViolation(format!(
                        "PG_SANDBOX_PORT must be a port number, got '{port}'"
                    ))
                })?,
                None => POSTGRES_PORT,
            };
            config.external_server = Some(ServerAddress::new(host, port));
        }
        if let Some(secs) = lookup("PG_SANDBOX_READY_TIMEOUT_SECS") {
            let secs = secs.parse::<u64>().map_err(|_| {
                SandboxError::PreconditionViolation(format!(
                    "PG_SANDBOX_READY_TIMEOUT_SECS must be a number of seconds, got '{secs}'"
                ))
            })?;
            config.readiness = config.readiness.with_timeout(Duration::from_secs(secs));
        }
        if let Some(schema) = lookup("PG_SANDBOX_SCHEMA") {
            config.schema = Some(PathBuf::from(schema));
        }
        if let Some(loader) = lookup("PG_SANDBOX_LOADER") {
            config.loader = LoaderKind::parse(&loader)?;
        }
        if let Some(keep) = lookup("PG_SANDBOX_KEEP_DATABASES") {
            config.keep_databases = matches!(keep.as_str(), "1" | "true" | "yes");
        }
        if let Some(prefix) = lookup("PG_SANDBOX_DB_PREFIX") {
            config.database_prefix = prefix;
        }

        Ok(config)
    }

    pub fn with_schema(mut self, path: impl AsRef<Path>) -> Self {
        self.schema = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>, tag: impl Into<String>) -> Self {
        self.image = image.into();
        self.tag = tag.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_external_server(mut self, address: ServerAddress) -> Self {
        self.external_server = Some(address);
        self
    }

    pub fn with_readiness(mut self, policy: RetryPolicy) -> Self {
        self.readiness = policy;
        self
    }

    pub fn with_loader(mut self, loader: LoaderKind) -> Self {
        self.loader = loader;
        self
    }

    pub fn keep_databases(mut self, keep: bool) -> Self {
        self.keep_databases = keep;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_database_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.database_prefix = prefix.into();
        self
    }
}
