/// `load_config` module: reads the optional YAML config file and injects the
/// OAuth application secrets from the environment.
///
/// Every YAML key has a default, so running without a file is valid. Secrets
/// never live in the file: `WPCOM_CLIENT_ID` and `WPCOM_CLIENT_SECRET` come
/// from the environment (a `.env` file is honoured by `main`).
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use blog_history_core::config::HistoryConfig;
use std::fs;
use std::path::Path;
use tracing::{error, info};

use crate::auth::OAuthApp;

pub const CLIENT_ID_VAR: &str = "WPCOM_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "WPCOM_CLIENT_SECRET";

#[derive(Debug)]
pub struct CliConfig {
    pub history: HistoryConfig,
    pub oauth: OAuthApp,
}

/// Loads the run configuration, from `path` when given, defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let history = match path {
        Some(path_ref) => read_history_config(path_ref)?,
        None => {
            info!("No config file given, using defaults");
            HistoryConfig::default()
        }
    };

    let client_id = required_env(CLIENT_ID_VAR)?;
    let client_secret = required_env(CLIENT_SECRET_VAR)?;

    Ok(CliConfig {
        history,
        oauth: OAuthApp {
            client_id,
            client_secret,
        },
    })
}

fn read_history_config(path_ref: &Path) -> Result<HistoryConfig> {
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a valid, all-defaults config.
    if config_content.trim().is_empty() {
        return Ok(HistoryConfig::default());
    }

    match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

fn required_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => {
            info!(var = name, "Found in environment");
            Ok(value)
        }
        Ok(_) => {
            error!(var = name, "Environment variable is empty");
            Err(anyhow::anyhow!("{name} environment variable is empty"))
        }
        Err(e) => {
            error!(error = ?e, var = name, "Environment variable not set");
            Err(anyhow::anyhow!("{name} environment variable not set: {e}"))
        }
    }
}
