//! Instance identifier store.

use std::path::PathBuf;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{CONFIG_FILE_MODE, set_mode};
use crate::error::Result;

/// Persists the gateway instance identifier to a well-known file.
#[derive(Debug, Clone)]
pub struct InstanceIdStore {
    /// Path of the identifier file.
    path: PathBuf,
}

impl InstanceIdStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the persisted identifier, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let id = std::fs::read_to_string(&self.path)?.trim().to_string();
        Ok((!id.is_empty()).then_some(id))
    }

    /// Resolves the identifier to use and persists it.
    ///
    /// An operator-supplied identifier always wins and replaces the stored
    /// one. Otherwise the stored identifier is reused, and a new one is
    /// generated only when nothing is stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written.
    pub fn resolve(&self, supplied: Option<&str>) -> Result<String> {
        if let Some(id) = supplied.map(str::trim).filter(|id| !id.is_empty()) {
            debug!("Using operator supplied instance id {id}");
            self.save(id)?;
            return Ok(id.to_string());
        }

        if let Some(id) = self.load()? {
            debug!("Recovered instance id {id}");
            return Ok(id);
        }

        let id = Uuid::new_v4().to_string();
        info!("Generated instance id {id}");
        self.save(&id)?;
        Ok(id)
    }

    fn save(&self, id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, id)?;
        set_mode(&self.path, CONFIG_FILE_MODE)?;
        Ok(())
    }
}
