use std::fmt;
use std::time::Duration;

use thiserror::Error as ThisError;

/// Port used when `server` carries no explicit one.
pub const DEFAULT_PORT: u16 = 5432;

/// Connection-establishment timeout when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Everything needed to reach the store. Injected by the caller; the core
/// never assembles it from literals.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// `host` or `host:port`.
    pub server: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub encrypt: bool,
    /// Accept any server certificate when encrypting.
    pub trust_server_certificate: bool,
    pub timeout_seconds: u64,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("encrypt", &self.encrypt)
            .field("trust_server_certificate", &self.trust_server_certificate)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl ConnectionConfig {
    /// Read `DB_SERVER`, `DB_NAME`, `DB_USER`, `DB_PASS` and the optional
    /// `DB_ENCRYPT`, `DB_TRUST_SERVER_CERT`, `DB_TIMEOUT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));
        let encrypt = match lookup("DB_ENCRYPT") {
            Some(raw) => parse_flag("DB_ENCRYPT", &raw)?,
            None => true,
        };
        let trust_server_certificate = match lookup("DB_TRUST_SERVER_CERT") {
            Some(raw) => parse_flag("DB_TRUST_SERVER_CERT", &raw)?,
            None => false,
        };
        let timeout_seconds = match lookup("DB_TIMEOUT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "DB_TIMEOUT",
                reason: "expected a whole number of seconds".to_string(),
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        let config = Self {
            server: required("DB_SERVER")?,
            database: required("DB_NAME")?,
            user: required("DB_USER")?,
            password: required("DB_PASS")?,
            encrypt,
            trust_server_certificate,
            timeout_seconds,
        };
        config.host_and_port()?;
        Ok(config)
    }

    /// Split `server` into host and port, defaulting the port.
    pub fn host_and_port(&self) -> Result<(&str, u16), ConfigError> {
        let server = self.server.trim();
        if server.is_empty() {
            return Err(ConfigError::Missing("DB_SERVER"));
        }
        match server.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !host.ends_with(':') => {
                let port = port.parse().map_err(|_| ConfigError::Invalid {
                    key: "DB_SERVER",
                    reason: format!("bad port '{port}'"),
                })?;
                Ok((host, port))
            }
            _ => Ok((server, DEFAULT_PORT)),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Accepts the spellings seen in connection strings (`yes`/`no`, `true`/`false`, `1`/`0`).
pub fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" | "on" => Ok(true),
        "no" | "false" | "0" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            reason: "expected yes/no".to_string(),
        }),
    }
}
