//! Server addresses and connection strings.

use std::fmt;

use sqlx::postgres::PgConnectOptions;

/// Default URL scheme for PostgreSQL connection strings
pub const DEFAULT_SCHEME: &str = "postgres";

/// Host and port of a running database server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` form accepted by socket connect calls
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    /// May be empty for trust-authenticated servers
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

/// `<scheme>://<user>:<password>@<host>:<port>/<database>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub scheme: String,
    pub credentials: Credentials,
    pub address: ServerAddress,
    pub database: String,
}

impl ConnectionString {
    pub fn new(
        address: ServerAddress,
        credentials: Credentials,
        database: impl Into<String>,
    ) -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            credentials,
            address,
            database: database.into(),
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Same server and credentials, different logical database
    pub fn for_database(&self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self.clone()
        }
    }

    /// Rendered URL with percent-encoded userinfo. Pools connect through
    /// [`ConnectionString::connect_options`] instead.
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}@{}:{}/{}",
            self.scheme,
            urlencoding::encode(&self.credentials.user),
            urlencoding::encode(&self.credentials.password),
            self.address.host,
            self.address.port,
            self.database
        )
    }

    /// Structured sqlx options; credentials are passed as-is, never parsed
    /// back out of a URL.
    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.address.host)
            .port(self.address.port)
            .username(&self.credentials.user)
            .database(&self.database);
        if self.credentials.password.is_empty() {
            options
        } else {
            options.password(&self.credentials.password)
        }
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}
