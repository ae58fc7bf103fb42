//! User configuration loading.
//!
//! User config location: $XDG_CONFIG_HOME/zonediff/zonediff.toml
//! Fallback: the platform config directory from `dirs::config_dir()`.

use std::path::PathBuf;

use thiserror::Error;

use super::ZonediffSettings;

pub const CONFIG_DIR_NAME: &str = "zonediff";
pub const CONFIG_FILE_NAME: &str = "zonediff.toml";

#[derive(Debug, Error)]
pub enum UserConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type UserConfigResult<T> = Result<T, UserConfigError>;

/// Returns the path to the user configuration file.
///
/// The path is determined by:
/// 1. If $XDG_CONFIG_HOME is set and non-empty: $XDG_CONFIG_HOME/zonediff/zonediff.toml
/// 2. Otherwise: `<config_dir>/zonediff/zonediff.toml`
///
/// Returns None if no config directory can be determined.
pub fn user_config_path() -> Option<PathBuf> {
    let base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(xdg_config) if !xdg_config.is_empty() => PathBuf::from(xdg_config),
        _ => dirs::config_dir()?,
    };
    Some(base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load the user configuration file.
///
/// A missing file is `Ok(None)`; only unreadable or malformed files are errors.
pub fn load_user_config() -> UserConfigResult<Option<ZonediffSettings>> {
    let Some(path) = user_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|source| UserConfigError::Read {
        path: path.clone(),
        source,
    })?;
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| UserConfigError::Parse { path, source })
}
