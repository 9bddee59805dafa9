//! Configuration management
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `GBSIP__<SECTION>__<KEY>` environment variables.

use crate::infrastructure::protocols::sip::{
    ClientOptions, Endpoint, RegisterOptions, ServerOptions, TransportProtocol, UserOptions,
};
use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "gbsip";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub local: LocalConfig,
    pub user: UserConfig,
    pub register: RegisterConfig,
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub protocol: TransportProtocol,
    /// SIP server ID
    pub id: String,
    pub host: String,
    pub port: u16,
    /// Response timeout in milliseconds
    pub timeout_ms: u64,
    pub auto_reconnect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub name: String,
    pub domain: String,
    pub password: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterConfig {
    pub expires: u32,
    /// Seconds between re-registrations
    pub keepalive_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device the binary talks to
    pub id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol: TransportProtocol::Udp,
            id: "34020000002000000001".to_string(),
            host: "127.0.0.1".to_string(),
            port: 5060,
            timeout_ms: 5000,
            auto_reconnect: true,
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5060,
        }
    }
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            name: "34020000001320000001".to_string(),
            domain: "3402000000".to_string(),
            password: "12345678".to_string(),
            user_agent: "IP Camera".to_string(),
        }
    }
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            expires: 3600,
            keepalive_interval: 60,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: "34020000001320000002".to_string(),
        }
    }
}

impl Config {
    /// Load from `path` (required) or `gbsip.toml` (optional), with
    /// environment overrides on top
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::with_name(path),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        config::Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("GBSIP")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            protocol: self.server.protocol,
            id: self.server.id.clone(),
            endpoint: Endpoint::new(self.server.host.clone(), self.server.port),
            timeout: Duration::from_millis(self.server.timeout_ms),
            auto_reconnect: self.server.auto_reconnect,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            local: Endpoint::new(self.local.host.clone(), self.local.port),
            user: UserOptions {
                name: self.user.name.clone(),
                domain: self.user.domain.clone(),
                password: self.user.password.clone(),
                user_agent: self.user.user_agent.clone(),
            },
            register: RegisterOptions {
                expires: self.register.expires,
                keepalive_interval: self.register.keepalive_interval,
            },
        }
    }
}
