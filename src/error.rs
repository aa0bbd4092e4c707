use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("Provisioning failed: {0}")]
    ProvisioningError(String),

    #[error("Failed to load schema {}: {detail}", .path.display())]
    SchemaLoadError { path: PathBuf, detail: String },

    #[error("Schema mismatch for table '{table}': expected {expected:?}, found {actual:?}")]
    SchemaMismatch {
        table: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Server at {addr} not ready after {attempts} attempts ({waited:?})")]
    Timeout {
        addr: String,
        attempts: u32,
        waited: Duration,
    },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub setup: bool,
}

impl SandboxError {
    pub fn to_error_code(&self) -> &'static str {
        match self {
            SandboxError::PreconditionViolation(_) => "PRECONDITION_VIOLATION",
            SandboxError::ProvisioningError(_) => "PROVISIONING_ERROR",
            SandboxError::SchemaLoadError { .. } => "SCHEMA_LOAD_ERROR",
            SandboxError::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            SandboxError::TableNotFound(_) => "TABLE_NOT_FOUND",
            SandboxError::Timeout { .. } => "TIMEOUT",
            SandboxError::DatabaseError(_) => "DATABASE_ERROR",
            SandboxError::IoError(_) => "IO_ERROR",
        }
    }

    /// Infrastructure failures raised before a test body runs.
    ///
    /// These should surface as test errors rather than assertion failures.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            SandboxError::PreconditionViolation(_)
                | SandboxError::ProvisioningError(_)
                | SandboxError::SchemaLoadError { .. }
                | SandboxError::Timeout { .. }
        )
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.to_error_code().to_string(),
            setup: self.is_setup_error(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
