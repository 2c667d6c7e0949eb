//! JSON settings file adapter.
//!
//! Implements [`ConfigPort`] over a `config.json` in the key layout the
//! web front-end writes.  Keys that are missing from the file take their
//! defaults; unknown keys are ignored, so the front-end may store its own
//! fields next to ours.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::Settings;

pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a default file if none exists.  Returns `true` if one was created.
    pub fn ensure_exists(&self) -> Result<bool, ConfigError> {
        if self.path.is_file() {
            return Ok(false);
        }
        info!("config: {} missing, writing defaults", self.path.display());
        self.save(&Settings::default())?;
        Ok(true)
    }
}

impl ConfigPort for JsonConfigFile {
    fn load(&self) -> Result<Settings, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("config: no {}, using defaults", self.path.display());
                return Ok(Settings::default());
            }
            Err(e) => {
                warn!("config: read {} failed: {}", self.path.display(), e);
                return Err(ConfigError::IoError);
            }
        };
        let settings: Settings = serde_json::from_str(&text).map_err(|e| {
            warn!("config: {} is not valid JSON: {}", self.path.display(), e);
            ConfigError::Corrupted
        })?;
        settings.validate()?;
        info!("config: loaded {}", self.path.display());
        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        let json = serde_json::to_string_pretty(settings).map_err(|_| ConfigError::IoError)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|_| ConfigError::IoError)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, json).map_err(|_| ConfigError::IoError)?;
        fs::rename(&tmp_path, &self.path).map_err(|_| ConfigError::IoError)?;
        info!("config: saved {}", self.path.display());
        Ok(())
    }
}
