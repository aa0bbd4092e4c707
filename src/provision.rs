//! Server provisioning.
//!
//! A [`Provisioner`] produces the address of a running PostgreSQL server.
//! [`ContainerProvisioner`] starts one in Docker through testcontainers;
//! [`ExternalServer`] points at a server managed elsewhere (a CI service
//! container, a local install).

use std::future::Future;

use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tokio::sync::OnceCell;

use crate::address::{Credentials, ServerAddress};
use crate::config::{SandboxConfig, POSTGRES_PORT};
use crate::error::{Result, SandboxError};

pub trait Provisioner: Send + Sync {
    fn start(&self) -> impl Future<Output = Result<ServerAddress>> + Send;
}

/// A server that is already running.
#[derive(Debug, Clone)]
pub struct ExternalServer {
    address: ServerAddress,
}

impl ExternalServer {
    pub fn new(address: ServerAddress) -> Self {
        Self { address }
    }
}

impl Provisioner for ExternalServer {
    async fn start(&self) -> Result<ServerAddress> {
        tracing::info!(addr = %self.address, "Using external server");
        Ok(self.address.clone())
    }
}

/// A started container and the host address its port is mapped to.
pub struct RunningContainer {
    address: ServerAddress,
    _container: ContainerAsync<GenericImage>,
}

impl RunningContainer {
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }
}

/// Starts a PostgreSQL container on first use; the container lives as long
/// as the provisioner.
pub struct ContainerProvisioner {
    image: String,
    tag: String,
    credentials: Credentials,
    admin_database: String,
    running: OnceCell<RunningContainer>,
}

impl ContainerProvisioner {
    pub fn new(image: impl Into<String>, tag: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            image: image.into(),
            tag: tag.into(),
            credentials,
            admin_database: crate::config::DEFAULT_ADMIN_DATABASE.to_string(),
            running: OnceCell::new(),
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            admin_database: config.admin_database.clone(),
            ..Self::new(
                config.image.clone(),
                config.tag.clone(),
                config.credentials.clone(),
            )
        }
    }

    pub async fn launch(&self) -> Result<RunningContainer> {
        tracing::info!(image = %self.image, tag = %self.tag, "Starting database container");

        // The init-time server logs "ready to accept connections" too, but only
        // the final server listens on TCP.
        let mut request = GenericImage::new(self.image.clone(), self.tag.clone())
            .with_exposed_port(POSTGRES_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stderr("port 5432"))
            .with_env_var("POSTGRES_USER", self.credentials.user.clone())
            .with_env_var("POSTGRES_DB", self.admin_database.clone());
        request = if self.credentials.password.is_empty() {
            request.with_env_var("POSTGRES_HOST_AUTH_METHOD", "trust")
        } else {
            request.with_env_var("POSTGRES_PASSWORD", self.credentials.password.clone())
        };

        let container = request.start().await.map_err(|e| {
            SandboxError::ProvisioningError(format!(
                "failed to start {}:{}: {e}",
                self.image, self.tag
            ))
        })?;

        let host = container.get_host().await.map_err(|e| {
            SandboxError::ProvisioningError(format!("failed to resolve container host: {e}"))
        })?;
        let port = container
            .get_host_port_ipv4(POSTGRES_PORT.tcp())
            .await
            .map_err(|e| {
                SandboxError::ProvisioningError(format!("failed to resolve mapped port: {e}"))
            })?;

        let address = ServerAddress::new(host.to_string(), port);
        tracing::info!(addr = %address, container = %container.id(), "Database container started");

        Ok(RunningContainer {
            address,
            _container: container,
        })
    }
}

impl Provisioner for ContainerProvisioner {
    async fn start(&self) -> Result<ServerAddress> {
        let running = self.running.get_or_try_init(|| self.launch()).await?;
        Ok(running.address().clone())
    }
}

/// Provisioner chosen by configuration: an external server when one is
/// configured, otherwise a container.
pub enum AnyProvisioner {
    External(ExternalServer),
    Container(ContainerProvisioner),
}

impl AnyProvisioner {
    pub fn from_config(config: &SandboxConfig) -> Self {
        match &config.external_server {
            Some(address) => AnyProvisioner::External(ExternalServer::new(address.clone())),
            None => AnyProvisioner::Container(ContainerProvisioner::from_config(config)),
        }
    }
}

impl Provisioner for AnyProvisioner {
    async fn start(&self) -> Result<ServerAddress> {
        match self {
            AnyProvisioner::External(server) => server.start().await,
            AnyProvisioner::Container(container) => container.start().await,
        }
    }
}

/// What a shared server was started for. Later callers must ask for the
/// same thing.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ServerKey {
    External(ServerAddress),
    Container {
        image: String,
        tag: String,
        credentials: Credentials,
        admin_database: String,
    },
}

impl ServerKey {
    fn from_config(config: &SandboxConfig) -> Self {
        match &config.external_server {
            Some(address) => ServerKey::External(address.clone()),
            None => ServerKey::Container {
                image: config.image.clone(),
                tag: config.tag.clone(),
                credentials: config.credentials.clone(),
                admin_database: config.admin_database.clone(),
            },
        }
    }

    // Never includes the password
    fn describe(&self) -> String {
        match self {
            ServerKey::External(address) => format!("external server {address}"),
            ServerKey::Container {
                image,
                tag,
                credentials,
                admin_database,
            } => format!(
                "container {image}:{tag} (user '{}', database '{admin_database}')",
                credentials.user
            ),
        }
    }
}

/// A provisioner started at most once, bound to the configuration of its
/// first caller.
pub struct SharedServer {
    cell: OnceCell<(ServerKey, AnyProvisioner)>,
}

impl SharedServer {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    /// Start the server on first call. Later calls must carry the same
    /// image, credentials and external address, otherwise they fail with
    /// [`SandboxError::PreconditionViolation`].
    pub async fn start(&self, config: &SandboxConfig) -> Result<ServerAddress> {
        let key = ServerKey::from_config(config);
        let (owner, provisioner) = self
            .cell
            .get_or_init(|| async { (key.clone(), AnyProvisioner::from_config(config)) })
            .await;

        if *owner != key {
            return Err(SandboxError::PreconditionViolation(format!(
                "shared server already set up for {}, cannot switch to {}",
                owner.describe(),
                key.describe()
            )));
        }
        provisioner.start().await
    }
}

impl Default for SharedServer {
    fn default() -> Self {
        Self::new()
    }
}

static SHARED: SharedServer = SharedServer::new();

/// One server per test process, started on first call.
///
/// The provisioner is never dropped, so a container started here keeps
/// running until the test process exits.
pub async fn shared_server(config: &SandboxConfig) -> Result<ServerAddress> {
    SHARED.start(config).await
}
