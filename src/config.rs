use crate::domain::ledger::DEFAULT_DEDUP_TTL;
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment overrides, e.g. `PAYCORE__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "PAYCORE";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub pay: PayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Default,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Default,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerConfig {
    /// RocksDB directory. In-memory ledger when absent.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayConfig {
    /// Name of the default driver; picked automatically when empty.
    #[serde(default)]
    pub default: String,
    pub alipay: Option<AlipayConfig>,
    pub wechat: Option<WechatConfig>,
    pub card: Option<CardConfig>,
    /// Seconds a notification key stays in the ledger.
    #[serde(default = "default_dedup_ttl")]
    pub dedup_ttl: u64,
    /// Outbound gateway call timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_dedup_ttl() -> u64 {
    DEFAULT_DEDUP_TTL.as_secs()
}

fn default_timeout() -> u64 {
    10
}

impl Default for PayConfig {
    fn default() -> Self {
        Self {
            default: String::new(),
            alipay: None,
            wechat: None,
            card: None,
            dedup_ttl: default_dedup_ttl(),
            timeout_secs: default_timeout(),
        }
    }
}

impl PayConfig {
    /// A zero TTL falls back to the 24h default.
    pub fn dedup_ttl(&self) -> Duration {
        if self.dedup_ttl == 0 {
            DEFAULT_DEDUP_TTL
        } else {
            Duration::from_secs(self.dedup_ttl)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlipayConfig {
    pub app_id: String,
    pub private_key_path: PathBuf,
    pub alipay_public_key_path: PathBuf,
    #[serde(default)]
    pub notify_url: String,
    #[serde(default)]
    pub return_url: String,
    #[serde(default)]
    pub sandbox: bool,
    /// Overrides the production/sandbox gateway URL.
    pub gateway: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WechatConfig {
    pub mch_id: String,
    pub app_id: String,
    pub api_v3_key: String,
    pub serial_no: String,
    pub private_key_path: PathBuf,
    /// Platform public key used to verify `Wechatpay-Signature` on callbacks.
    pub platform_public_key_path: Option<PathBuf>,
    #[serde(default)]
    pub notify_url: String,
    /// Overrides `https://api.mch.weixin.qq.com`.
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardConfig {
    pub gateway: String,
    #[serde(default)]
    pub merchant_id: String,
    #[serde(default)]
    pub private_key_path: PathBuf,
    #[serde(default)]
    pub public_key_path: PathBuf,
    #[serde(default)]
    pub notify_url: String,
    #[serde(default)]
    pub threeds_enabled: bool,
}

impl AppConfig {
    /// Loads configuration from an optional file, then applies `PAYCORE__*` environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| PaymentError::Config(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| PaymentError::Config(e.to_string()))
    }
}
