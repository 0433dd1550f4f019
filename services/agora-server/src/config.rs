//! Server configuration
//!
//! All configuration is injected: a TOML file, overridden by environment
//! variables and CLI flags. Nothing operational is hard-coded in the core
//! crates.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use agora_auth::AuthConfig;
use agora_db::DatabaseConfig;
use agora_market::{FeeConfig, RegistrationConfig};
use agora_verify::{SandboxConfig, VerifyConfig};
use agora_workers::{WalletConfig, WebhookConfig};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub registration: RegistrationSettings,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub wallet: WalletSettings,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationSettings {
    #[serde(default)]
    pub require_agent_card: bool,
    pub external_identity_url: Option<String>,
    #[serde(default = "default_card_timeout")]
    pub card_fetch_timeout_secs: u64,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            require_agent_card: false,
            external_identity_url: None,
            card_fetch_timeout_secs: default_card_timeout(),
        }
    }
}

impl RegistrationSettings {
    pub fn to_registration_config(&self) -> RegistrationConfig {
        RegistrationConfig {
            require_agent_card: self.require_agent_card,
            external_identity_url: self.external_identity_url.clone(),
            card_fetch_timeout: Duration::from_secs(self.card_fetch_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSettings {
    /// Wallet gateway JSON-RPC endpoint.
    #[serde(default = "default_chain_rpc")]
    pub chain_rpc_url: String,
    /// Chain network selector, forwarded to the gateway for sanity checks.
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(flatten)]
    pub watcher: WalletConfig,
}

impl Default for WalletSettings {
    fn default() -> Self {
        Self {
            chain_rpc_url: default_chain_rpc(),
            network: default_network(),
            watcher: WalletConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Universal request body cap in bytes.
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    15
}

fn default_card_timeout() -> u64 {
    30
}

fn default_chain_rpc() -> String {
    "http://localhost:8545".to_string()
}

fn default_network() -> String {
    "base-sepolia".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_max_body() -> usize {
    1024 * 1024
}

impl ServerConfig {
    /// Load from an optional TOML file; defaults otherwise.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Ok(toml::from_str(&raw)?)
            }
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.api.max_body_bytes, 1024 * 1024);
        assert_eq!(config.server.port, 8080);
        assert!(config.server.socket_addr().is_ok());
    }

    #[test]
    fn toml_round_trip() {
        let config = ServerConfig::default();
        let raw = toml::to_string(&config).unwrap();
        let parsed: ServerConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
    }
}
