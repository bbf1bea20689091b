use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ErrorKind, ServerError};

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub connection: Connection,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub broker: Broker,
    #[serde(default)]
    pub logger: Logger,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            connection: Connection::default(),
            auth: Auth::default(),
            broker: Broker::default(),
            logger: Logger::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Connection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1883
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Auth {
    /// Comma-separated in the TOML source; split and lower-cased once at load time.
    pub allowed_users: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Broker {
    #[serde(default = "default_qos_retry_timeout_secs")]
    pub qos_retry_timeout_secs: u64,
    #[serde(default = "default_qos_max_retries")]
    pub qos_max_retries: u32,
    #[serde(default = "default_keep_alive_grace_factor")]
    pub keep_alive_grace_factor: f32,
    #[serde(default)]
    pub rewrite_source_prefix: bool,
}

impl Default for Broker {
    fn default() -> Self {
        Self {
            qos_retry_timeout_secs: default_qos_retry_timeout_secs(),
            qos_max_retries: default_qos_max_retries(),
            keep_alive_grace_factor: default_keep_alive_grace_factor(),
            rewrite_source_prefix: false,
        }
    }
}

fn default_qos_retry_timeout_secs() -> u64 {
    5
}

fn default_qos_max_retries() -> u32 {
    3
}

fn default_keep_alive_grace_factor() -> f32 {
    1.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logger {
    #[serde(default = "default_true")]
    pub console: bool,
    #[serde(default)]
    pub file: bool,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            console: true,
            file: false,
            level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TryFrom<&Path> for BrokerConfig {
    type Error = ServerError;

    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        if !path.exists() {
            let default = BrokerConfig::default();
            let toml = toml::to_string_pretty(&DefaultConfigTemplate::from(&default))
                .map_err(|e| ServerError::new(ErrorKind::Io, e.to_string()))?;
            fs::write(path, toml)?;
            return Ok(default);
        }

        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| ServerError::new(ErrorKind::Io, e.to_string()))
    }
}

/// `BrokerConfig` itself only derives `Deserialize` (the teacher's convention
/// for config types it never needs to write back out); first-run bootstrap
/// serializes this mirror struct instead of adding an unused `Serialize`
/// derive to the real one.
#[derive(serde::Serialize)]
struct DefaultConfigTemplate {
    connection: DefaultConnection,
    auth: DefaultAuth,
    broker: DefaultBroker,
    logger: DefaultLogger,
}

#[derive(serde::Serialize)]
struct DefaultConnection {
    host: String,
    port: u16,
}

#[derive(serde::Serialize)]
struct DefaultAuth {
    allowed_users: Option<String>,
    password: Option<String>,
}

#[derive(serde::Serialize)]
struct DefaultBroker {
    qos_retry_timeout_secs: u64,
    qos_max_retries: u32,
    keep_alive_grace_factor: f32,
    rewrite_source_prefix: bool,
}

#[derive(serde::Serialize)]
struct DefaultLogger {
    console: bool,
    file: bool,
    level: String,
}

impl From<&BrokerConfig> for DefaultConfigTemplate {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            connection: DefaultConnection {
                host: config.connection.host.clone(),
                port: config.connection.port,
            },
            auth: DefaultAuth {
                allowed_users: config.auth.allowed_users.clone(),
                password: config.auth.password.clone(),
            },
            broker: DefaultBroker {
                qos_retry_timeout_secs: config.broker.qos_retry_timeout_secs,
                qos_max_retries: config.broker.qos_max_retries,
                keep_alive_grace_factor: config.broker.keep_alive_grace_factor,
                rewrite_source_prefix: config.broker.rewrite_source_prefix,
            },
            logger: DefaultLogger {
                console: config.logger.console,
                file: config.logger.file,
                level: config.logger.level.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_toml_document() {
        let config: BrokerConfig = toml::from_str(
            r#"
            [connection]
            port = 1884

            [auth]
            allowed_users = "alice, bob"
            "#,
        )
        .unwrap();
        assert_eq!(config.connection.port, 1884);
        assert_eq!(config.auth.allowed_users.as_deref(), Some("alice, bob"));
        assert_eq!(config.broker.qos_max_retries, 3);
    }

    #[test]
    fn writes_a_default_file_when_missing() {
        let dir = std::env::temp_dir().join(format!("mqtt-broker-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        let config = BrokerConfig::try_from(path.as_path()).unwrap();
        assert_eq!(config.connection.port, 1883);
        assert!(path.exists());
        fs::remove_dir_all(&dir).ok();
    }
}
