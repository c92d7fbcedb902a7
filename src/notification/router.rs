//! Severity-based routing of alerts to channel senders.

use super::build_channel;
use super::templates::{Message, TemplateError};
use crate::config::{NotificationConfig, RoutingConfig};
use crate::core::{DeliveryReport, Level, NotificationRequest, Notifier};
use crate::rate_limit::RateLimiter;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info, instrument, warn};

/// Channel used when a level name is not recognised.
pub const FALLBACK_CHANNEL: &str = "wechat";

/// Maps each severity to the ordered list of channels to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    routes: HashMap<Level, Vec<String>>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.set(Level::Info, ["wechat"]);
        table.set(Level::Warning, ["wechat", "dingtalk"]);
        table.set(Level::Error, ["wechat", "dingtalk", "email"]);
        table.set(Level::Critical, ["wechat", "dingtalk", "email"]);
        table
    }
}

impl RoutingTable {
    /// A table with no routes at all.
    pub fn empty() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// The built-in table with configured overrides applied per level.
    pub fn from_config(config: &RoutingConfig) -> Self {
        let mut table = Self::default();
        for level in Level::ALL {
            if let Some(channels) = config.for_level(level) {
                table.set(level, channels.iter().cloned());
            }
        }
        table
    }

    /// Replaces the route for `level`. Repeated names are kept once.
    pub fn set<I, S>(&mut self, level: Level, channels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut deduped: Vec<String> = Vec::new();
        for name in channels {
            let name = name.into().trim().to_ascii_lowercase();
            if !name.is_empty() && !deduped.contains(&name) {
                deduped.push(name);
            }
        }
        self.routes.insert(level, deduped);
    }

    pub fn route(&self, level: Level) -> &[String] {
        self.routes.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Channels for a level name given by a caller. Unknown names fall back
    /// to [`FALLBACK_CHANNEL`].
    pub fn channels_for(&self, level: &str) -> Vec<String> {
        match level.parse::<Level>() {
            Ok(level) => self.route(level).to_vec(),
            Err(e) => {
                warn!(error = %e, fallback = FALLBACK_CHANNEL, "Routing unknown level to fallback channel");
                vec![FALLBACK_CHANNEL.to_string()]
            }
        }
    }
}

/// Everything the router builds on first use.
struct RouterState {
    limiter: Option<RateLimiter>,
    routing: RoutingTable,
    channels: HashMap<String, Arc<dyn Notifier>>,
}

impl RouterState {
    fn from_config(config: &NotificationConfig) -> Self {
        let limiter = config
            .rate_limit_enabled
            .then(|| RateLimiter::new(config.max_messages_per_minute));

        let mut channels: HashMap<String, Arc<dyn Notifier>> = HashMap::new();
        for name in &config.channels {
            match build_channel(name, config) {
                Ok(channel) => {
                    channels.insert(channel.name().to_string(), channel);
                }
                Err(e) => error!(channel = %name, error = %e, "Skipping channel that failed to initialize"),
            }
        }

        let mut names: Vec<&str> = channels.keys().map(String::as_str).collect();
        names.sort_unstable();
        info!(
            channels = ?names,
            rate_limit = limiter.as_ref().map(RateLimiter::capacity),
            "Notification router initialized"
        );

        Self {
            limiter,
            routing: RoutingTable::from_config(&config.routing),
            channels,
        }
    }
}

/// Fans a notification out to the channels routed for its severity.
///
/// Construction is cheap. Channel senders, the routing table and the rate
/// limiter are built exactly once, on the first send, even under concurrent
/// first calls.
pub struct NotificationRouter {
    config: NotificationConfig,
    state: OnceLock<RouterState>,
}

impl std::fmt::Debug for NotificationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationRouter")
            .field("enabled", &self.config.enabled)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl NotificationRouter {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            config,
            state: OnceLock::new(),
        }
    }

    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    /// Names of the channels with a constructed sender, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state().channels.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    fn state(&self) -> &RouterState {
        self.state.get_or_init(|| RouterState::from_config(&self.config))
    }

    /// Sends a pre-rendered message to every configured channel routed for
    /// `level`.
    ///
    /// # Returns
    /// A report keyed by channel name. Channels without a sender are absent.
    /// The report is empty when the rate limit rejects the message.
    #[instrument(skip(self, body))]
    pub fn send(&self, title: &str, body: &str, level: &str) -> DeliveryReport {
        let state = self.state();
        let mut report = DeliveryReport::new();

        if let Some(limiter) = &state.limiter {
            if !limiter.allow() {
                warn!(cap = limiter.capacity(), "Rate limit reached, dropping notification");
                metrics::counter!("notifications_rate_limited_total").increment(1);
                return report;
            }
        }

        for name in state.routing.channels_for(level) {
            let Some(channel) = state.channels.get(&name) else {
                debug!(channel = %name, "Channel routed but not configured");
                continue;
            };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| channel.send(title, body)))
                .unwrap_or_else(|_| {
                    error!(channel = %name, "Channel panicked while sending");
                    false
                });
            let status = if outcome { "ok" } else { "failed" };
            metrics::counter!("notification_deliveries_total", "channel" => name.clone(), "status" => status)
                .increment(1);
            report.insert(name, outcome);
        }

        report
    }

    /// [`send`](Self::send) for an already-typed request.
    pub fn dispatch(&self, request: &NotificationRequest) -> DeliveryReport {
        self.send(&request.title, &request.body, request.level.as_str())
    }

    /// The high-level entry point: honours the `enabled` switch and renders
    /// templates before routing.
    ///
    /// Returns an empty report when notifications are disabled.
    pub fn notify(
        &self,
        title: &str,
        message: impl Into<Message>,
        level: &str,
    ) -> Result<DeliveryReport, TemplateError> {
        if !self.config.enabled {
            debug!(title, "Notifications disabled, skipping");
            return Ok(DeliveryReport::new());
        }
        let body = message.into().render()?;
        Ok(self.send(title, &body, level))
    }

    /// Runs [`send`](Self::send) on the blocking thread pool.
    pub async fn send_async(
        self: Arc<Self>,
        title: String,
        body: String,
        level: String,
    ) -> DeliveryReport {
        let result = tokio::task::spawn_blocking(move || self.send(&title, &body, &level)).await;
        match result {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Notification task failed");
                DeliveryReport::new()
            }
        }
    }
}

/// Assembles an already-initialized router from explicit parts.
///
/// Starts with the built-in routing table, no channels, no rate limit and
/// notifications enabled.
pub struct RouterBuilder {
    config: NotificationConfig,
    routing: RoutingTable,
    channels: HashMap<String, Arc<dyn Notifier>>,
    limiter: Option<RateLimiter>,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self {
            config: NotificationConfig {
                enabled: true,
                rate_limit_enabled: false,
                ..Default::default()
            },
            routing: RoutingTable::default(),
            channels: HashMap::new(),
            limiter: None,
        }
    }
}

impl RouterBuilder {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn routing(mut self, routing: RoutingTable) -> Self {
        self.routing = routing;
        self
    }

    pub fn route<I, S>(mut self, level: Level, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.routing.set(level, channels);
        self
    }

    /// Registers a sender under its own [`Notifier::name`].
    pub fn channel(mut self, channel: Arc<dyn Notifier>) -> Self {
        self.channels.insert(channel.name().to_string(), channel);
        self
    }

    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.config.rate_limit_enabled = true;
        self.config.max_messages_per_minute = limiter.capacity();
        self.limiter = Some(limiter);
        self
    }

    pub fn build(self) -> NotificationRouter {
        let state = RouterState {
            limiter: self.limiter,
            routing: self.routing,
            channels: self.channels,
        };
        NotificationRouter {
            config: self.config,
            state: OnceLock::from(state),
        }
    }
}
