//! Set-once storage for the schema file applied to every sandbox database.
//!
//! [`crate::config::SandboxConfig::with_schema`] is the preferred way to
//! choose a schema. The process-wide registry exists for suites that pick the
//! schema once at module level and build sandboxes without threading a config
//! through every test.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{Result, SandboxError};

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    slot: OnceLock<PathBuf>,
}

impl SchemaRegistry {
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// Register the schema file.
    ///
    /// Registering the same path twice is accepted; a different path is a
    /// precondition violation since tests may already have run against the
    /// first one.
    pub fn set(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SandboxError::PreconditionViolation(format!(
                "schema file {} does not exist",
                path.display()
            )));
        }

        let stored = self.slot.get_or_init(|| path.to_path_buf());
        if stored != path {
            return Err(SandboxError::PreconditionViolation(format!(
                "schema already set to {}, refusing {}",
                stored.display(),
                path.display()
            )));
        }

        tracing::debug!(schema = %path.display(), "Schema registered");
        Ok(())
    }

    pub fn is_set(&self) -> bool {
        self.slot.get().is_some()
    }

    pub(crate) fn require(&self) -> Result<&Path> {
        self.slot.get().map(PathBuf::as_path).ok_or_else(|| {
            SandboxError::PreconditionViolation(
                "schema not set, call set_schema(path) first".to_string(),
            )
        })
    }
}

static GLOBAL: SchemaRegistry = SchemaRegistry::new();

/// Register the schema file for every sandbox in this process.
pub fn set_schema(path: impl AsRef<Path>) -> Result<()> {
    GLOBAL.set(path)
}

pub(crate) fn global() -> &'static SchemaRegistry {
    &GLOBAL
}
