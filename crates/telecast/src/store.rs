//! # Config Store
//!
//! Load/save of the [`EndpointConfig`] record at a fixed per-user path.
//!
//! ## Location
//!
//! ```text
//! Windows:  %APPDATA%\telecast\endpoint.toml
//! Others:   $XDG_CONFIG_HOME/telecast/endpoint.toml
//!           $HOME/.config/telecast/endpoint.toml
//! Fallback: <temp dir>/telecast/endpoint.toml
//! ```
//!
//! A missing or malformed file is treated exactly like "no config".

use crate::config::EndpointConfig;
use crate::error::{TelecastError, TelecastResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Directory created under the per-user config root.
const APP_DIR: &str = "telecast";

/// File name of the endpoint record.
const FILE_NAME: &str = "endpoint.toml";

/// Persistent home of the endpoint record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store at the fixed per-user location.
    #[must_use]
    pub fn per_user() -> Self {
        Self::at(user_config_root().join(APP_DIR).join(FILE_NAME))
    }

    /// Store backed by an explicit file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted record.
    ///
    /// Returns `None` if the file is missing, unreadable or malformed.
    #[must_use]
    pub fn load(&self) -> Option<EndpointConfig> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("no endpoint config at {}", self.path.display());
                return None;
            }
            Err(e) => {
                tracing::warn!("cannot read endpoint config {}: {}", self.path.display(), e);
                return None;
            }
        };

        match toml::from_str::<EndpointConfig>(&text) {
            Ok(config) => {
                tracing::debug!(
                    "loaded endpoint config from {} ({} {}:{})",
                    self.path.display(),
                    config.mode,
                    config.host,
                    config.port
                );
                Some(config)
            }
            Err(e) => {
                tracing::warn!("ignoring malformed endpoint config {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Writes the record, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`TelecastError::PersistenceFailure`]; callers log it and
    /// carry on.
    pub fn save(&self, config: &EndpointConfig) -> TelecastResult<()> {
        let text = toml::to_string_pretty(config)
            .map_err(|e| TelecastError::persistence(&self.path, e))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| TelecastError::persistence(parent, e))?;
        }

        // Write-then-rename so a crash never leaves a half-written record
        let staging = self.path.with_extension("toml.tmp");
        fs::write(&staging, text).map_err(|e| TelecastError::persistence(&staging, e))?;
        fs::rename(&staging, &self.path).map_err(|e| TelecastError::persistence(&self.path, e))?;

        tracing::info!("saved endpoint config to {}", self.path.display());
        Ok(())
    }

    /// Removes the persisted record. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`TelecastError::PersistenceFailure`] if the file exists but
    /// cannot be removed.
    pub fn clear(&self) -> TelecastResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("removed endpoint config {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TelecastError::persistence(&self.path, e)),
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::per_user()
    }
}

/// Per-user application-data root.
fn user_config_root() -> PathBuf {
    let from_env = |key: &str| {
        std::env::var_os(key)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    };

    if cfg!(windows) {
        if let Some(appdata) = from_env("APPDATA") {
            return appdata;
        }
    }

    from_env("XDG_CONFIG_HOME")
        .or_else(|| from_env("HOME").map(|home| home.join(".config")))
        .unwrap_or_else(std::env::temp_dir)
}
