//! Layered resolution of connection parameters.
//!
//! Three layers feed one [`ConnectionConfig`]:
//! 1. environment variables
//! 2. a JSON config file, filling fields the environment left unset
//! 3. caller overrides, which always win
//!
//! Layers are kept apart and merged on demand, so the order in which the
//! resolvers are called never changes the outcome.

use crate::error::DbError;
use crate::models::{
    ConfigField, ConfigValues, ConnectionConfig, PortValue, DEFAULT_HOST, DEFAULT_PORT,
};

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Config file looked up when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "conn.json";

/// Names of the environment variables read by
/// [`ConfigStore::resolve_from_environment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvNames {
    /// Variable holding the database name
    pub name: String,
    /// Variable holding the username
    pub user: String,
    /// Variable holding the password or key
    pub password: String,
    /// Variable holding the host
    pub host: String,
    /// Variable holding the port
    pub port: String,
}

impl EnvNames {
    /// Use `{prefix}NAME`, `{prefix}USER`, `{prefix}PASSWORD`, `{prefix}HOST`
    /// and `{prefix}PORT`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            name: format!("{prefix}NAME"),
            user: format!("{prefix}USER"),
            password: format!("{prefix}PASSWORD"),
            host: format!("{prefix}HOST"),
            port: format!("{prefix}PORT"),
        }
    }
}

impl EnvNames {
    /// The libpq variables: `PGDATABASE`, `PGUSER`, `PGPASSWORD`, `PGHOST`
    /// and `PGPORT`.
    pub fn libpq() -> Self {
        Self {
            name: "PGDATABASE".to_string(),
            user: "PGUSER".to_string(),
            password: "PGPASSWORD".to_string(),
            host: "PGHOST".to_string(),
            port: "PGPORT".to_string(),
        }
    }
}

impl Default for EnvNames {
    /// `DBN`, `DBU`, `DBK` (password or key), `DBH` and `DBP`.
    fn default() -> Self {
        Self {
            name: "DBN".to_string(),
            user: "DBU".to_string(),
            password: "DBK".to_string(),
            host: "DBH".to_string(),
            port: "DBP".to_string(),
        }
    }
}

/// Holds the configuration layers and turns them into a [`ConnectionConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    env_names: EnvNames,
    env: ConfigValues,
    file: ConfigValues,
    overrides: ConfigValues,
    file_path: Option<PathBuf>,
}

impl ConfigStore {
    /// Create an empty store. Nothing is resolved until a resolver is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store reading custom environment variable names.
    pub fn with_env_names(env_names: EnvNames) -> Self {
        Self { env_names, ..Self::default() }
    }

    /// Environment variable names in use.
    pub fn env_names(&self) -> &EnvNames {
        &self.env_names
    }

    /// Path of the last config file loaded, if any.
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Read the process environment into the environment layer.
    ///
    /// Missing or blank variables leave their field unset. Returns the
    /// fields that were found.
    pub fn resolve_from_environment(&mut self) -> Vec<ConfigField> {
        self.resolve_from_env_source(|key| std::env::var(key).ok())
    }

    /// Fill the environment layer through `lookup` instead of the process
    /// environment.
    pub fn resolve_from_env_source<F>(&mut self, lookup: F) -> Vec<ConfigField>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        self.env = ConfigValues {
            name: read(&self.env_names.name),
            host: read(&self.env_names.host),
            port: read(&self.env_names.port).map(PortValue::Text),
            user: read(&self.env_names.user),
            password: read(&self.env_names.password),
        };

        let found = self.env.supplied();
        tracing::debug!(fields = %ConfigField::join(&found), "Resolved config from environment");
        found
    }

    /// Load the file layer from a JSON document at `path`.
    ///
    /// Fails with [`DbError::ConfigFileNotFound`] when the file is absent.
    pub fn resolve_from_file(&mut self, path: impl AsRef<Path>) -> Result<Vec<ConfigField>, DbError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found");
                return Err(DbError::config_file_not_found(absolute(path)));
            }
            Err(e) => {
                return Err(DbError::invalid_config(format!(
                    "Failed to read config file {}: {e}",
                    path.display()
                )))
            }
        };

        let values: ConfigValues = serde_json::from_str(&contents).map_err(|e| {
            DbError::invalid_config(format!("Invalid config file {}: {e}", path.display()))
        })?;

        self.file = blank_to_unset(values);
        self.file_path = Some(path.to_path_buf());

        let found = self.file.supplied();
        tracing::debug!(
            path = %path.display(),
            fields = %ConfigField::join(&found),
            "Resolved config from file"
        );
        Ok(found)
    }

    /// Like [`ConfigStore::resolve_from_file`], but an absent file is not an
    /// error. Returns whether a file was loaded.
    pub fn resolve_from_file_optional(&mut self, path: impl AsRef<Path>) -> Result<bool, DbError> {
        match self.resolve_from_file(path) {
            Ok(_) => Ok(true),
            Err(DbError::ConfigFileNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Overwrite exactly the fields supplied in `values`.
    ///
    /// Overrides take precedence over every other layer, whenever the other
    /// layers are resolved.
    pub fn apply_overrides(&mut self, values: ConfigValues) {
        tracing::debug!(fields = %ConfigField::join(&values.supplied()), "Applying config overrides");
        self.overrides.overwrite_with(values);
    }

    /// Drop every layer, keeping the environment variable names.
    pub fn clear(&mut self) {
        self.env = ConfigValues::default();
        self.file = ConfigValues::default();
        self.overrides = ConfigValues::default();
        self.file_path = None;
    }

    /// Current merged view: overrides, then environment, then file, then
    /// defaults for host and port.
    pub fn resolved(&self) -> ConfigValues {
        let defaults = ConfigValues::new().host(DEFAULT_HOST).port(DEFAULT_PORT);
        self.overrides.clone().or(&self.env).or(&self.file).or(&defaults)
    }

    /// Check the merged view and produce a complete configuration.
    ///
    /// Reports every missing field at once. Blank strings count as missing.
    pub fn validate(&self) -> Result<ConnectionConfig, DbError> {
        let resolved = self.resolved();

        let missing: Vec<ConfigField> = ConfigField::ALL
            .into_iter()
            .filter(|field| match field {
                ConfigField::Name => is_blank(&resolved.name),
                ConfigField::Host => is_blank(&resolved.host),
                ConfigField::Port => resolved.port.as_ref().map_or(true, PortValue::is_blank),
                ConfigField::User => is_blank(&resolved.user),
                ConfigField::Password => is_blank(&resolved.password),
            })
            .collect();

        if !missing.is_empty() {
            tracing::warn!(missing = %ConfigField::join(&missing), "Connection config incomplete");
            return Err(DbError::config_incomplete(missing));
        }

        let port = match &resolved.port {
            Some(port) => port.to_port()?,
            None => return Err(DbError::config_incomplete(vec![ConfigField::Port])),
        };

        Ok(ConnectionConfig::new(
            resolved.name.unwrap_or_default(),
            resolved.host.unwrap_or_default(),
            port,
            resolved.user.unwrap_or_default(),
            resolved.password.unwrap_or_default(),
        ))
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn blank_to_unset(values: ConfigValues) -> ConfigValues {
    let keep = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
    ConfigValues {
        name: keep(values.name),
        host: keep(values.host),
        port: values.port.filter(|p| !p.is_blank()),
        user: keep(values.user),
        password: keep(values.password),
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
