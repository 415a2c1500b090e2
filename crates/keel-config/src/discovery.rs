//! Config file discovery and loading.
//!
//! Precedence, highest first: the `KEEL_CONFIG` environment variable,
//! a project-local `keel.toml` in the working directory, the
//! user-level `keel/keel.toml` under the platform config directory.
//! The first file that exists wins whole; missing files mean
//! defaults.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::types::EngineConfig;

/// Environment variable naming an explicit config path.
pub const CONFIG_ENV_VAR: &str = "KEEL_CONFIG";

/// Project-local config file name.
pub const PROJECT_CONFIG: &str = "keel.toml";

/// The user-level config path (`<config dir>/keel/keel.toml`), when a
/// config directory exists on this platform.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("keel").join(PROJECT_CONFIG))
}

/// Load configuration following the discovery precedence.
pub fn load_config() -> Result<EngineConfig> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
        return load_config_from(Path::new(&explicit));
    }

    let project = Path::new(PROJECT_CONFIG);
    if project.exists() {
        return load_config_from(project);
    }

    if let Some(user) = user_config_path() {
        if user.exists() {
            return load_config_from(&user);
        }
    }

    Ok(EngineConfig::default())
}

/// Load configuration from an explicit path.
pub fn load_config_from(path: &Path) -> Result<EngineConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keel.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[queue]\nsoft_cap = 99").unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.queue.soft_cap, 99);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = load_config_from(Path::new("/nonexistent/keel.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keel.toml");
        std::fs::write(&path, "queue = \"not a table\"").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
