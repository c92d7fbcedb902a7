//! Configuration management for jwquant-notify
//!
//! This module defines the main `Config` struct and its sub-structs. It uses
//! the `figment` crate to layer, in order: built-in defaults, a TOML file,
//! `JWQUANT_`-prefixed environment variables (with `__` separating nested
//! keys) and command-line overrides.

use crate::cli::Cli;
use crate::core::Level;
use crate::retry::RetryPolicy;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Keys whose values are never printed.
const SENSITIVE_KEYS: &[&str] = &["api_key", "token", "password", "secret", "account_id"];

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level (or `tracing` filter directive) for the application.
    pub log_level: String,
    /// Record delivery counters and log them before exit.
    #[serde(default)]
    pub log_metrics: bool,
    /// Outbound notification settings.
    pub notification: NotificationConfig,
}

/// Settings under the `notification.*` namespace.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct NotificationConfig {
    /// Master switch for [`NotificationRouter::notify`](crate::notification::NotificationRouter::notify).
    pub enabled: bool,
    /// Whether outbound attempts go through the sliding-window limiter.
    pub rate_limit_enabled: bool,
    /// Admitted notifications per trailing minute.
    pub max_messages_per_minute: usize,
    /// Channels to construct senders for (`wechat`, `dingtalk`, `email`).
    pub channels: Vec<String>,
    /// Per-severity channel list overrides.
    pub routing: RoutingConfig,
    pub wechat: WeChatConfig,
    pub dingtalk: DingTalkConfig,
    pub email: EmailConfig,
    pub retry: RetryConfig,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate_limit_enabled: true,
            max_messages_per_minute: 10,
            channels: Vec::new(),
            routing: RoutingConfig::default(),
            wechat: WeChatConfig::default(),
            dingtalk: DingTalkConfig::default(),
            email: EmailConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Routing overrides. A missing or empty list falls back to the built-in route.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct RoutingConfig {
    #[serde(rename = "INFO", alias = "info", skip_serializing_if = "Option::is_none")]
    pub info: Option<Vec<String>>,
    #[serde(rename = "WARNING", alias = "warning", skip_serializing_if = "Option::is_none")]
    pub warning: Option<Vec<String>>,
    #[serde(rename = "ERROR", alias = "error", skip_serializing_if = "Option::is_none")]
    pub error: Option<Vec<String>>,
    #[serde(rename = "CRITICAL", alias = "critical", skip_serializing_if = "Option::is_none")]
    pub critical: Option<Vec<String>>,
}

impl RoutingConfig {
    /// The override configured for `level`, if any.
    pub fn for_level(&self, level: Level) -> Option<&[String]> {
        let list = match level {
            Level::Info => &self.info,
            Level::Warning => &self.warning,
            Level::Error => &self.error,
            Level::Critical => &self.critical,
        };
        list.as_deref().filter(|l| !l.is_empty())
    }
}

/// WeChat push settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct WeChatConfig {
    /// `serverchan` or `pushplus`.
    pub provider: String,
    pub token: String,
    /// Overrides the provider's API host (proxies, tests).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for WeChatConfig {
    fn default() -> Self {
        Self {
            provider: "serverchan".to_string(),
            token: String::new(),
            base_url: None,
        }
    }
}

/// DingTalk robot settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct DingTalkConfig {
    pub webhook: String,
    /// Signing secret. Empty means unsigned requests.
    pub secret: String,
}

/// SMTP settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_addr: String,
    pub to_addrs: Vec<String>,
    /// Upgrade the connection with STARTTLS.
    pub use_tls: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_server: String::new(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from_addr: String::new(),
            to_addrs: Vec::new(),
            use_tls: true,
        }
    }
}

/// Retry and backoff settings for channel sends.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per send, including the first.
    pub max_retries: u32,
    /// Initial backoff for WeChat and DingTalk in milliseconds.
    pub chat_backoff_ms: u64,
    /// Initial backoff for email in milliseconds.
    pub email_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            chat_backoff_ms: 1000,
            email_backoff_ms: 2000,
        }
    }
}

impl RetryConfig {
    pub fn chat_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.chat_backoff_ms))
    }

    pub fn email_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.email_backoff_ms))
    }
}

impl Config {
    /// Loads the configuration by layering defaults, the TOML file named by
    /// `cli.config` (if any), the environment and the CLI overrides.
    ///
    /// Environment example: `JWQUANT_NOTIFICATION__DINGTALK__SECRET=SEC...`
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = &cli.config {
            figment = figment.merge(Toml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed("JWQUANT_").split("__"))
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }

    /// A JSON view of the configuration with credentials replaced by `***`.
    pub fn masked(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        mask_value(&mut value);
        value
    }
}

fn mask_value(value: &mut Value) {
    if let Value::Object(map) = value {
        for (key, inner) in map.iter_mut() {
            match inner {
                Value::String(s) if SENSITIVE_KEYS.contains(&key.as_str()) && !s.is_empty() => {
                    *s = "***".to_string();
                }
                other => mask_value(other),
            }
        }
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_metrics: false,
            notification: NotificationConfig::default(),
        }
    }
}
