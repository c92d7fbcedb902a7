//! WeChat push through ServerChan or PushPlus.

use super::{ChannelError, HTTP_TIMEOUT};
use crate::config::WeChatConfig;
use crate::core::Notifier;
use crate::retry::{RetryExecutor, RetryPolicy};
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::{debug, instrument, warn};

/// Which WeChat push service the token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeChatProvider {
    ServerChan,
    PushPlus,
}

impl WeChatProvider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            WeChatProvider::ServerChan => "https://sctapi.ftqq.com",
            WeChatProvider::PushPlus => "https://www.pushplus.plus",
        }
    }

    /// The `code` value the provider returns on success.
    fn success_code(&self) -> i64 {
        match self {
            WeChatProvider::ServerChan => 0,
            WeChatProvider::PushPlus => 200,
        }
    }
}

impl FromStr for WeChatProvider {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serverchan" => Ok(WeChatProvider::ServerChan),
            "pushplus" => Ok(WeChatProvider::PushPlus),
            other => Err(ChannelError::InvalidConfig(format!(
                "unknown WeChat provider '{other}'"
            ))),
        }
    }
}

/// Sends markdown messages to a WeChat account.
#[derive(Debug)]
pub struct WeChatNotifier {
    provider: WeChatProvider,
    token: String,
    base_url: String,
    retry: RetryExecutor,
}

impl WeChatNotifier {
    pub fn new(provider: WeChatProvider, token: impl Into<String>) -> Self {
        Self {
            provider,
            token: token.into(),
            base_url: provider.default_base_url().to_string(),
            retry: RetryExecutor::new(RetryPolicy::chat()),
        }
    }

    /// Builds a notifier from configuration. Fails only on an unknown provider.
    pub fn from_config(config: &WeChatConfig, policy: RetryPolicy) -> Result<Self, ChannelError> {
        let provider: WeChatProvider = config.provider.parse()?;
        let mut notifier = Self::new(provider, config.token.clone()).with_retry(RetryExecutor::new(policy));
        if let Some(base_url) = &config.base_url {
            notifier = notifier.with_base_url(base_url.clone());
        }
        Ok(notifier)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> WeChatProvider {
        self.provider
    }

    fn deliver(&self, title: &str, body: &str) -> Result<bool, ChannelError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;

        let request = match self.provider {
            WeChatProvider::ServerChan => client
                .post(format!("{}/{}.send", self.base_url, self.token))
                .form(&[("title", title), ("desp", body)]),
            WeChatProvider::PushPlus => client.post(format!("{}/send", self.base_url)).json(&json!({
                "token": self.token,
                "title": title,
                "content": body,
                "template": "markdown",
            })),
        };

        let response: Value = request.send()?.json()?;
        let code = response.get("code").and_then(Value::as_i64);
        if code == Some(self.provider.success_code()) {
            debug!(provider = ?self.provider, "WeChat message accepted");
            Ok(true)
        } else {
            warn!(provider = ?self.provider, response = %response, "WeChat rejected the message");
            Ok(false)
        }
    }
}

impl Notifier for WeChatNotifier {
    fn name(&self) -> &str {
        "wechat"
    }

    #[instrument(skip(self, body), fields(provider = ?self.provider))]
    fn send(&self, title: &str, body: &str) -> bool {
        if self.token.is_empty() {
            warn!("WeChat token not configured, skipping");
            return false;
        }
        self.retry.run("wechat", || self.deliver(title, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::tests::executor;
    use tracing_test::traced_test;

    #[test]
    fn test_provider_parse_and_defaults() {
        let provider: WeChatProvider = "PushPlus".parse().unwrap();
        assert_eq!(provider, WeChatProvider::PushPlus);
        assert_eq!(provider.default_base_url(), "https://www.pushplus.plus");
        assert!("wxpusher".parse::<WeChatProvider>().is_err());
    }

    #[test]
    #[traced_test]
    fn test_empty_token_short_circuits() {
        let (retry, sleeper) = executor(3, 1000);
        let notifier = WeChatNotifier::new(WeChatProvider::ServerChan, "")
            .with_base_url("http://127.0.0.1:9")
            .with_retry(retry);
        assert!(!notifier.send("title", "body"));
        assert!(sleeper.slept.lock().is_empty());
        assert!(logs_contain("WeChat token not configured"));
        assert!(!logs_contain("Attempt failed"));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let notifier = WeChatNotifier::new(WeChatProvider::PushPlus, "t").with_base_url("http://host/");
        assert_eq!(notifier.base_url, "http://host");
    }
}
