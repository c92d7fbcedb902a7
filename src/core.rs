//! Core domain types and service traits for jwquant-notify
//!
//! This module defines the severity levels used for routing, the capability
//! every notification channel implements, and the per-channel delivery report
//! returned by the router.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Per-channel outcome of a routed notification, keyed by channel name.
///
/// An empty report means the message was dropped before any channel was
/// attempted (rate limited or notifications disabled). A report full of
/// `false` values means every channel was tried and failed.
pub type DeliveryReport = HashMap<String, bool>;

/// Severity of an outbound alert. Selects the channel list in the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    /// All levels, lowest severity first.
    pub const ALL: [Level; 4] = [Level::Info, Level::Warning, Level::Error, Level::Critical];

    /// The canonical upper-case name used in configuration keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known severity level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity level: {0}")]
pub struct UnknownLevel(pub String);

impl FromStr for Level {
    type Err = UnknownLevel;

    /// Parses a level name case-insensitively (`"error"`, `"Error"`, `"ERROR"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INFO" => Ok(Level::Info),
            "WARNING" => Ok(Level::Warning),
            "ERROR" => Ok(Level::Error),
            "CRITICAL" => Ok(Level::Critical),
            _ => Err(UnknownLevel(s.to_string())),
        }
    }
}

/// A single outbound alert, alive only for the duration of a send.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub title: String,
    /// Pre-rendered message body (markdown is allowed).
    pub body: String,
    pub level: Level,
}

// =============================================================================
// Service Traits
// =============================================================================

/// An external delivery channel (WeChat, DingTalk, Email, ...).
///
/// Implementations own their wire protocol and credentials. `send` must not
/// panic on transport problems; it reports them as `false`.
pub trait Notifier: Send + Sync {
    /// The channel name used in routing tables and delivery reports.
    fn name(&self) -> &str;

    /// Delivers a message through this channel.
    ///
    /// # Returns
    /// * `true` if the remote endpoint acknowledged the message
    /// * `false` if the channel is not configured or every attempt failed
    fn send(&self, title: &str, body: &str) -> bool;
}
