//! Configuration loading from disk and the environment.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Values that take precedence over the file (command line, environment).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Full bind address.
    pub bind: Option<String>,
    /// Port only, as hosting platforms inject it through `PORT`.
    pub port: Option<String>,
    pub directory: Option<String>,
}

impl ConfigOverrides {
    /// Overrides from the process environment.
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT").ok(),
            ..Self::default()
        }
    }

    fn apply(&self, config: &mut ProxyConfig) -> Result<(), ConfigError> {
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(port) = &self.port {
            let port: u16 = port.trim().parse().map_err(|_| {
                ConfigError::Validation(vec![ValidationError {
                    field: "PORT".to_string(),
                    message: format!("not a port number: {port:?}"),
                }])
            })?;
            let ip = config
                .listener
                .bind_address
                .parse::<SocketAddr>()
                .map(|addr| addr.ip())
                .unwrap_or_else(|_| [0, 0, 0, 0].into());
            config.listener.bind_address = SocketAddr::new(ip, port).to_string();
        }
        if let Some(directory) = &self.directory {
            config.bare.directory = directory.clone();
        }
        Ok(())
    }
}

/// Load configuration from an optional TOML file, apply overrides, then
/// validate. Without a file every field takes its default.
pub fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ProxyConfig::default(),
    };

    overrides.apply(&mut config)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
