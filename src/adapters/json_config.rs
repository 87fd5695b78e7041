//! File-backed configuration adapters.
//!
//! Implement [`ConfigPort`] for a JSON document (hand-edited on the bench)
//! and for a postcard blob (what the board stores in flash). A missing file
//! yields [`SystemConfig::default()`]; anything present must parse and
//! validate, or loading fails.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::SystemConfig;

pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ConfigPort for JsonConfigFile {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("CONFIG: {} not found, using defaults", self.path.display());
                return Ok(SystemConfig::default());
            }
            Err(e) => {
                warn!("CONFIG: reading {} failed: {e}", self.path.display());
                return Err(ConfigError::IoError);
            }
        };
        let config = SystemConfig::from_json(&text)?;
        info!("CONFIG: loaded {}", self.path.display());
        Ok(config)
    }
}

pub struct BlobConfig {
    path: PathBuf,
}

impl BlobConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Validate and persist `config` as a postcard blob.
    pub fn store(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        let bytes = config.to_blob()?;
        std::fs::write(&self.path, bytes).map_err(|_| ConfigError::IoError)
    }
}

impl ConfigPort for BlobConfig {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => SystemConfig::from_blob(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("CONFIG: {} not found, using defaults", self.path.display());
                Ok(SystemConfig::default())
            }
            Err(_) => Err(ConfigError::IoError),
        }
    }
}
