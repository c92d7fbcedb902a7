//! Outbound alert delivery.
//!
//! Channel senders implement [`Notifier`](crate::core::Notifier) and own
//! their wire protocol. The [`NotificationRouter`] picks senders by severity,
//! applies the rate limit and reports per-channel outcomes. The
//! [`bridge`] module wires bus events to the router.

pub mod bridge;
pub mod dingtalk;
pub mod email;
pub mod router;
pub mod templates;
pub mod wechat;

pub use bridge::subscribe_alerts;
pub use dingtalk::DingTalkNotifier;
pub use email::EmailNotifier;
pub use router::{NotificationRouter, RouterBuilder, RoutingTable};
pub use templates::{render_template, Message, TemplateError};
pub use wechat::{WeChatNotifier, WeChatProvider};

use crate::config::NotificationConfig;
use crate::core::Notifier;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Timeout applied to every webhook request.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A failure inside a single channel attempt.
///
/// These never reach router callers; the retry loop logs them and the sender
/// reports `false` once the policy is exhausted.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("SMTP transaction failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("could not build email: {0}")]
    Email(#[from] lettre::error::Error),

    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("invalid channel configuration: {0}")]
    InvalidConfig(String),
}

// Webhook URLs carry credentials (ServerChan key, DingTalk access_token) and
// these errors end up in logs.
impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        ChannelError::Http(e.without_url())
    }
}

/// The channels the router knows how to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    WeChat,
    DingTalk,
    Email,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::WeChat => "wechat",
            ChannelKind::DingTalk => "dingtalk",
            ChannelKind::Email => "email",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wechat" => Ok(ChannelKind::WeChat),
            "dingtalk" => Ok(ChannelKind::DingTalk),
            "email" => Ok(ChannelKind::Email),
            other => Err(ChannelError::InvalidConfig(format!(
                "unknown channel '{other}'"
            ))),
        }
    }
}

/// Builds the sender for one configured channel name.
pub fn build_channel(
    name: &str,
    config: &NotificationConfig,
) -> Result<Arc<dyn Notifier>, ChannelError> {
    let kind: ChannelKind = name.parse()?;
    let notifier: Arc<dyn Notifier> = match kind {
        ChannelKind::WeChat => Arc::new(WeChatNotifier::from_config(
            &config.wechat,
            config.retry.chat_policy(),
        )?),
        ChannelKind::DingTalk => Arc::new(DingTalkNotifier::from_config(
            &config.dingtalk,
            config.retry.chat_policy(),
        )),
        ChannelKind::Email => Arc::new(EmailNotifier::from_config(
            &config.email,
            config.retry.email_policy(),
        )),
    };
    Ok(notifier)
}
