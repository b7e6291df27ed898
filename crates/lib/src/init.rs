//! Initialize the configuration directory: create ~/.ruta, the default
//! config file, and the data directory the stores write to.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with `{}` if missing.
/// - Creates the data directory used by the JSON stores.
pub fn init_config_dir(config_path: &Path, config: &config::Config) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let default_config = b"{}";
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let data_dir = config::resolve_data_dir(config, config_path);
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;
        log::info!("created data directory at {}", data_dir.display());
    } else {
        log::debug!("data directory already exists at {}, skipping", data_dir.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_config_and_data_dir() {
        let dir = std::env::temp_dir().join(format!("ruta-init-{}", uuid::Uuid::new_v4()));
        let config_path = dir.join("config.json");
        let config = config::Config::default();

        let created = init_config_dir(&config_path, &config).unwrap();
        assert_eq!(created, dir);
        assert_eq!(std::fs::read_to_string(&config_path).unwrap(), "{}");
        assert!(dir.join("data").is_dir());

        // Running again is a no-op and must not clobber an edited config.
        std::fs::write(&config_path, r#"{"server":{"port":9000}}"#).unwrap();
        init_config_dir(&config_path, &config).unwrap();
        assert!(std::fs::read_to_string(&config_path).unwrap().contains("9000"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
