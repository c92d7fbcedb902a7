//! SMTP email delivery.

use super::ChannelError;
use crate::config::EmailConfig;
use crate::core::Notifier;
use crate::retry::{RetryExecutor, RetryPolicy};
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Prepended to every subject line.
pub const SUBJECT_PREFIX: &str = "[JWQuant] ";

const SMTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Sends plain-text alerts over SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    config: EmailConfig,
    retry: RetryExecutor,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            retry: RetryExecutor::new(RetryPolicy::email()),
        }
    }

    pub fn from_config(config: &EmailConfig, policy: RetryPolicy) -> Self {
        Self::new(config.clone()).with_retry(RetryExecutor::new(policy))
    }

    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    fn is_configured(&self) -> bool {
        !self.config.smtp_server.is_empty() && !self.config.to_addrs.is_empty()
    }

    /// Builds the message. The sender is `from_addr`, falling back to the
    /// login name.
    pub fn build_message(&self, title: &str, body: &str) -> Result<Message, ChannelError> {
        let from = if self.config.from_addr.is_empty() {
            &self.config.username
        } else {
            &self.config.from_addr
        };

        let mut builder = Message::builder()
            .from(from.parse::<Mailbox>()?)
            .subject(format!("{SUBJECT_PREFIX}{title}"))
            .header(ContentType::TEXT_PLAIN);
        for to in &self.config.to_addrs {
            builder = builder.to(to.parse::<Mailbox>()?);
        }
        Ok(builder.body(body.to_string())?)
    }

    fn transport(&self) -> Result<SmtpTransport, ChannelError> {
        let mut builder = if self.config.use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_server)?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_server)
        };
        builder = builder
            .port(self.config.smtp_port)
            .timeout(Some(SMTP_TIMEOUT));
        if !self.config.username.is_empty() && !self.config.password.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ));
        }
        Ok(builder.build())
    }

    fn deliver(&self, message: &Message) -> Result<bool, ChannelError> {
        let transport = self.transport()?;
        transport.send(message)?;
        debug!(recipients = self.config.to_addrs.len(), "Email sent");
        Ok(true)
    }
}

impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    #[instrument(skip(self, body), fields(server = %self.config.smtp_server))]
    fn send(&self, title: &str, body: &str) -> bool {
        if !self.is_configured() {
            warn!("Email server or recipients not configured, skipping");
            return false;
        }
        // A malformed address will not fix itself on retry.
        let message = match self.build_message(title, body) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Could not build email");
                return false;
            }
        };
        self.retry.run("email", || self.deliver(&message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::tests::executor;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_server: "smtp.example.com".to_string(),
            username: "bot@example.com".to_string(),
            to_addrs: vec!["ops@example.com".to_string(), "pm@example.com".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_subject_has_prefix_and_sender_falls_back_to_username() {
        let notifier = EmailNotifier::new(config());
        let message = notifier.build_message("止损触发", "body").unwrap();
        let headers = message.headers().to_string();
        assert!(headers.contains("bot@example.com"));
        assert!(headers.contains("ops@example.com"));
        assert!(headers.contains("pm@example.com"));

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("text/plain"));
    }

    #[test]
    fn test_ascii_subject_is_prefixed() {
        let message = EmailNotifier::new(config()).build_message("Daily", "b").unwrap();
        assert!(message.headers().to_string().contains("Subject: [JWQuant] Daily"));
    }

    #[test]
    fn test_bad_address_is_an_error() {
        let mut cfg = config();
        cfg.to_addrs = vec!["not an address".to_string()];
        assert!(matches!(
            EmailNotifier::new(cfg).build_message("t", "b"),
            Err(ChannelError::Address(_))
        ));
    }

    #[test]
    fn test_unconfigured_short_circuits() {
        let mut cfg = config();
        cfg.to_addrs.clear();
        for cfg in [cfg, EmailConfig::default()] {
            let (retry, sleeper) = executor(3, 1000);
            assert!(!EmailNotifier::new(cfg).with_retry(retry).send("t", "b"));
            assert!(sleeper.slept.lock().is_empty());
        }
    }
}
