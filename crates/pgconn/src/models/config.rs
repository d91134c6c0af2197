//! Connection configuration models.

use crate::error::DbError;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default server host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default server port.
pub const DEFAULT_PORT: u16 = 5432;

/// One of the five connection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigField {
    /// Database name
    Name,
    /// Server hostname or IP
    Host,
    /// Server port
    Port,
    /// Login username
    User,
    /// Login password
    Password,
}

impl ConfigField {
    /// All fields, in reporting order.
    pub const ALL: [ConfigField; 5] =
        [Self::Name, Self::Host, Self::Port, Self::User, Self::Password];

    /// Key used in the config file and in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Host => "host",
            Self::Port => "port",
            Self::User => "user",
            Self::Password => "password",
        }
    }

    /// Render a field list as `a, b, c`.
    pub fn join(fields: &[ConfigField]) -> String {
        fields.iter().map(ConfigField::as_str).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A port as supplied by a config layer, before coercion.
///
/// Config files and callers may give the port as a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    /// Numeric port
    Number(i64),
    /// Textual port, e.g. from an environment variable
    Text(String),
}

impl PortValue {
    /// Check if the value carries nothing usable.
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }

    /// Coerce to a TCP port (1-65535).
    pub fn to_port(&self) -> Result<u16, DbError> {
        let number = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<i64>().map_err(|_| {
                DbError::invalid_field(ConfigField::Port, format!("'{s}' is not a number"))
            })?,
        };

        u16::try_from(number)
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| {
                DbError::invalid_field(
                    ConfigField::Port,
                    format!("{number} is outside the range 1-65535"),
                )
            })
    }
}

impl From<u16> for PortValue {
    fn from(port: u16) -> Self {
        Self::Number(i64::from(port))
    }
}

impl From<i64> for PortValue {
    fn from(port: i64) -> Self {
        Self::Number(port)
    }
}

impl From<i32> for PortValue {
    fn from(port: i32) -> Self {
        Self::Number(i64::from(port))
    }
}

impl From<&str> for PortValue {
    fn from(port: &str) -> Self {
        Self::Text(port.to_string())
    }
}

impl From<String> for PortValue {
    fn from(port: String) -> Self {
        Self::Text(port)
    }
}

/// A partial set of connection parameters.
///
/// Used for every configuration layer: environment, file, and caller
/// overrides. Unset fields are `None`. The file format accepts both the
/// short keys and the `db_`-prefixed keys.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigValues {
    /// Database name
    #[serde(default, alias = "db_name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Server hostname or IP
    #[serde(default, alias = "db_host", skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Server port
    #[serde(default, alias = "db_port", skip_serializing_if = "Option::is_none")]
    pub port: Option<PortValue>,
    /// Login username
    #[serde(default, alias = "db_user", skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Login password
    #[serde(default, alias = "db_pass", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ConfigValues {
    /// Create an empty set of values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port, as a number or a string.
    pub fn port(mut self, port: impl Into<PortValue>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// Set the username.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Check if no field is set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.host.is_none()
            && self.port.is_none()
            && self.user.is_none()
            && self.password.is_none()
    }

    /// Fields this layer supplies.
    pub fn supplied(&self) -> Vec<ConfigField> {
        ConfigField::ALL.into_iter().filter(|field| self.has(*field)).collect()
    }

    /// Check if this layer supplies `field`.
    pub fn has(&self, field: ConfigField) -> bool {
        match field {
            ConfigField::Name => self.name.is_some(),
            ConfigField::Host => self.host.is_some(),
            ConfigField::Port => self.port.is_some(),
            ConfigField::User => self.user.is_some(),
            ConfigField::Password => self.password.is_some(),
        }
    }

    /// Fill fields unset in `self` from `lower`.
    pub fn or(self, lower: &ConfigValues) -> ConfigValues {
        ConfigValues {
            name: self.name.or_else(|| lower.name.clone()),
            host: self.host.or_else(|| lower.host.clone()),
            port: self.port.or_else(|| lower.port.clone()),
            user: self.user.or_else(|| lower.user.clone()),
            password: self.password.or_else(|| lower.password.clone()),
        }
    }

    /// Overwrite fields from `upper` wherever it supplies one.
    pub fn overwrite_with(&mut self, upper: ConfigValues) {
        if upper.name.is_some() {
            self.name = upper.name;
        }
        if upper.host.is_some() {
            self.host = upper.host;
        }
        if upper.port.is_some() {
            self.port = upper.port;
        }
        if upper.user.is_some() {
            self.user = upper.user;
        }
        if upper.password.is_some() {
            self.password = upper.password;
        }
    }
}

impl fmt::Debug for ConfigValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigValues")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A complete, validated configuration for one connection.
///
/// Only [`ConfigStore::validate`](crate::services::ConfigStore::validate)
/// creates one, so holding a value means every field passed validation.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    name: String,
    host: String,
    port: u16,
    user: String,
    password: String,
}

impl ConnectionConfig {
    pub(crate) fn new(name: String, host: String, port: u16, user: String, password: String) -> Self {
        Self { name, host, port, user, password }
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server hostname or IP.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Server port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Login username.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Login password.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Get the display connection string (without password).
    pub fn display_url(&self) -> String {
        format!("postgresql://{}@{}:{}/{}", self.user, self.host, self.port, self.name)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_value_coercion() {
        assert_eq!(PortValue::from("5432").to_port().unwrap(), 5432);
        assert_eq!(PortValue::from(" 6543 ").to_port().unwrap(), 6543);
        assert_eq!(PortValue::from(5433u16).to_port().unwrap(), 5433);
        assert!(PortValue::from("abc").to_port().is_err());
        assert!(PortValue::from(0i64).to_port().is_err());
        assert!(PortValue::from(70000i64).to_port().is_err());
        assert!(PortValue::from(-1i64).to_port().is_err());
    }

    #[test]
    fn test_port_value_blank() {
        assert!(PortValue::from("  ").is_blank());
        assert!(!PortValue::from("1").is_blank());
        assert!(!PortValue::from(1i64).is_blank());
    }

    #[test]
    fn test_config_values_deserialize_short_and_prefixed_keys() {
        let short: ConfigValues =
            serde_json::from_str(r#"{"name":"db","host":"h","port":5432,"user":"u","password":"p"}"#)
                .unwrap();
        let prefixed: ConfigValues = serde_json::from_str(
            r#"{"db_name":"db","db_host":"h","db_port":"5432","db_user":"u","db_pass":"p"}"#,
        )
        .unwrap();

        assert_eq!(short.name.as_deref(), Some("db"));
        assert_eq!(short.port, Some(PortValue::Number(5432)));
        assert_eq!(prefixed.port, Some(PortValue::Text("5432".to_string())));
        assert_eq!(prefixed.password.as_deref(), Some("p"));
    }

    #[test]
    fn test_config_values_rejects_unknown_keys() {
        let result = serde_json::from_str::<ConfigValues>(r#"{"name":"db","database":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_or_fills_only_unset_fields() {
        let upper = ConfigValues::new().host("upper");
        let lower = ConfigValues::new().host("lower").user("bob");

        let merged = upper.or(&lower);
        assert_eq!(merged.host.as_deref(), Some("upper"));
        assert_eq!(merged.user.as_deref(), Some("bob"));
        assert!(merged.name.is_none());
    }

    #[test]
    fn test_overwrite_with_keeps_unsupplied_fields() {
        let mut values = ConfigValues::new().name("db").host("a");
        values.overwrite_with(ConfigValues::new().host("b"));

        assert_eq!(values.name.as_deref(), Some("db"));
        assert_eq!(values.host.as_deref(), Some("b"));
        assert_eq!(values.supplied(), vec![ConfigField::Name, ConfigField::Host]);
    }

    #[test]
    fn test_debug_redacts_password() {
        let values = ConfigValues::new().password("hunter2");
        assert!(!format!("{values:?}").contains("hunter2"));

        let config = ConnectionConfig::new(
            "db".into(),
            "localhost".into(),
            5432,
            "u".into(),
            "hunter2".into(),
        );
        assert!(!format!("{config:?}").contains("hunter2"));
        assert_eq!(config.display_url(), "postgresql://u@localhost:5432/db");
    }
}
