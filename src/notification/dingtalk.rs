//! DingTalk custom robot webhook with optional HMAC-SHA256 signing.

use super::{ChannelError, HTTP_TIMEOUT};
use crate::config::DingTalkConfig;
use crate::core::Notifier;
use crate::retry::{RetryExecutor, RetryPolicy};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

/// Computes the URL-escaped robot signature for `timestamp_ms`.
///
/// The HMAC key is the secret and the message is `"{timestamp_ms}\n{secret}"`.
pub fn sign(secret: &str, timestamp_ms: i64) -> Result<String, ChannelError> {
    let string_to_sign = format!("{timestamp_ms}\n{secret}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ChannelError::InvalidConfig(format!("bad DingTalk secret: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    let digest = STANDARD.encode(mac.finalize().into_bytes());
    Ok(urlencoding::encode(&digest).into_owned())
}

/// Posts markdown messages to a DingTalk group robot.
#[derive(Debug)]
pub struct DingTalkNotifier {
    webhook: String,
    secret: String,
    retry: RetryExecutor,
}

impl DingTalkNotifier {
    pub fn new(webhook: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            webhook: webhook.into(),
            secret: secret.into(),
            retry: RetryExecutor::new(RetryPolicy::chat()),
        }
    }

    pub fn from_config(config: &DingTalkConfig, policy: RetryPolicy) -> Self {
        Self::new(config.webhook.clone(), config.secret.clone()).with_retry(RetryExecutor::new(policy))
    }

    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    /// The webhook URL for a request made at `timestamp_ms`.
    ///
    /// Without a secret this is the bare webhook.
    pub fn signed_url(&self, timestamp_ms: i64) -> Result<String, ChannelError> {
        if self.secret.is_empty() {
            return Ok(self.webhook.clone());
        }
        let sign = sign(&self.secret, timestamp_ms)?;
        let sep = if self.webhook.contains('?') { '&' } else { '?' };
        Ok(format!("{}{sep}timestamp={timestamp_ms}&sign={sign}", self.webhook))
    }

    fn deliver(&self, payload: &Value) -> Result<bool, ChannelError> {
        // Signatures expire, so each attempt signs with a fresh timestamp.
        let url = self.signed_url(chrono::Utc::now().timestamp_millis())?;
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;

        let response: Value = client.post(url).json(payload).send()?.json()?;
        match response.get("errcode").and_then(Value::as_i64) {
            Some(0) => {
                debug!("DingTalk message accepted");
                Ok(true)
            }
            _ => {
                warn!(response = %response, "DingTalk rejected the message");
                Ok(false)
            }
        }
    }
}

impl Notifier for DingTalkNotifier {
    fn name(&self) -> &str {
        "dingtalk"
    }

    #[instrument(skip(self, body), fields(signed = !self.secret.is_empty()))]
    fn send(&self, title: &str, body: &str) -> bool {
        if self.webhook.is_empty() {
            warn!("DingTalk webhook not configured, skipping");
            return false;
        }
        let payload = json!({
            "msgtype": "markdown",
            "markdown": {
                "title": title,
                "text": format!("## {title}\n\n{body}"),
            },
        });
        self.retry.run("dingtalk", || self.deliver(&payload))
    }
}
