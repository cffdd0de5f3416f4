//! CLI configuration handling.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use sessionward_core::SessionConfig;
use std::path::{Path, PathBuf};

/// Configuration as loaded for one CLI invocation.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub session: SessionConfig,

    /// Path the configuration was read from, or would be read from.
    pub config_path: PathBuf,

    /// Whether the file existed.
    pub from_file: bool,
}

/// Load configuration from `path`, or from the default location.
///
/// A missing file yields the defaults. `base_url`, when given, overrides
/// whatever the file says.
pub fn load_config(path: Option<&Path>, base_url: Option<&str>) -> Result<LoadedConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path(),
    };

    let from_file = config_path.exists();
    let mut session = if from_file {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        parse_config(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        SessionConfig::default()
    };

    if let Some(base_url) = base_url {
        session.base_url = base_url.to_string();
    }

    // Fail early on a bad URL rather than at the first request.
    session.base_url()?;

    Ok(LoadedConfig {
        session,
        config_path,
        from_file,
    })
}

fn parse_config(contents: &str) -> Result<SessionConfig> {
    Ok(toml::from_str(contents)?)
}

fn default_config_path() -> PathBuf {
    ProjectDirs::from("dev", "sessionward", "sessionward")
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("sessionward.toml"))
}
