//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the `jwquant-notify`
//! tool using the `clap` crate. Global flags are merged over the TOML file and
//! environment configuration; subcommands select what the tool does.

use clap::{Parser, Subcommand};
use figment::{
    providers::Serialized,
    value::{Dict, Map},
    Error, Metadata, Profile, Provider,
};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

/// Sends JWQuant alerts through the configured notification channels.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Logging level or filter directive (e.g. "debug", "jwquant_notify=trace").
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log delivery counters before exiting.
    #[arg(long)]
    pub log_metrics: bool,

    /// Enable delivery even if the configuration file disables it.
    #[arg(long)]
    pub force_enable: bool,

    /// Override the per-minute notification cap.
    #[arg(long, value_name = "COUNT")]
    pub max_per_minute: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Send a plain notification.
    Send {
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        /// INFO, WARNING, ERROR or CRITICAL (case-insensitive).
        #[arg(long, default_value = "INFO")]
        level: String,
    },
    /// Render a named template and send it.
    Template {
        /// Template name (order_filled, risk_alert, daily_briefing, system_error).
        name: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "INFO")]
        level: String,
        /// Template variable as key=value; repeatable.
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, Value)>,
    },
    /// Print the effective configuration with credentials masked.
    ShowConfig,
}

/// Parses `key=value`. Values that are valid JSON scalars keep their type so
/// `price=1840.0` renders as a number; everything else is a string.
pub fn parse_var(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    let value = match serde_json::from_str::<Value>(value) {
        Ok(v) if !v.is_object() && !v.is_array() => v,
        _ => Value::String(value.to_string()),
    };
    Ok((key.to_string(), value))
}

#[derive(Serialize, Default)]
struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    log_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_metrics: Option<bool>,
    #[serde(skip_serializing_if = "NotificationOverrides::is_empty")]
    notification: NotificationOverrides,
}

#[derive(Serialize, Default)]
struct NotificationOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_messages_per_minute: Option<usize>,
}

impl NotificationOverrides {
    fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.max_messages_per_minute.is_none()
    }
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        // Only flags that were actually given override lower layers.
        let overrides = Overrides {
            log_level: self.log_level.clone(),
            log_metrics: self.log_metrics.then_some(true),
            notification: NotificationOverrides {
                enabled: self.force_enable.then_some(true),
                max_messages_per_minute: self.max_per_minute,
            },
        };
        Serialized::defaults(overrides).data()
    }
}
