use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use super::email::InvitationEmail;
use crate::config::MailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Email transport failed: {0}")]
    Transport(String),

    #[error("Email provider rejected the message with HTTP {status}")]
    Rejected { status: u16 },

    #[error("Invalid mail configuration: {0}")]
    InvalidConfig(String),
}

/// Outbound email transport. Fire and forget: no retry on failure.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &InvitationEmail) -> Result<(), MailError>;
}

/// Posts messages to an HTTP JSON email API, rate limited per minute
#[derive(Debug)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl HttpMailer {
    pub fn new(config: &MailConfig, api_url: String) -> Result<Self, MailError> {
        let per_minute = NonZeroU32::new(config.sends_per_minute)
            .ok_or_else(|| MailError::InvalidConfig("sends_per_minute must be positive".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| MailError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key: config.api_key.clone(),
            from: config.from_address.clone(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &InvitationEmail) -> Result<(), MailError> {
        self.rate_limiter.until_ready().await;

        let body = json!({
            "from": self.from,
            "to": [email.to],
            "subject": email.subject,
            "html": email.html,
        });
        let mut request = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(to = %email.to, "Sending invitation email");
        let response = request
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Rejected {
                status: status.as_u16(),
            });
        }
        info!(to = %email.to, "Invitation email sent");
        Ok(())
    }
}

/// Logs messages instead of sending them; used when no email API is configured
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &InvitationEmail) -> Result<(), MailError> {
        info!(
            to = %email.to,
            subject = %email.subject,
            accept_url = %email.accept_url,
            "Invitation email (not sent, no mail API configured)"
        );
        Ok(())
    }
}

/// Pick the transport for the configuration
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match &config.api_url {
        Some(url) => Ok(Arc::new(HttpMailer::new(config, url.clone())?)),
        None => Ok(Arc::new(LogMailer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail_config() -> MailConfig {
        MailConfig {
            api_url: None,
            api_key: None,
            from_address: "contracts@example.com".into(),
            sends_per_minute: 30,
            request_timeout_seconds: 10,
        }
    }

    #[test]
    fn test_zero_rate_is_invalid() {
        let mut config = mail_config();
        config.sends_per_minute = 0;
        let err = HttpMailer::new(&config, "http://localhost:9/send".into()).unwrap_err();
        assert!(matches!(err, MailError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        let mailer = mailer_from_config(&mail_config()).unwrap();
        let email = InvitationEmail {
            to: "a@example.com".into(),
            subject: "s".into(),
            html: "<p>x</p>".into(),
            accept_url: "http://localhost/acceptInvite?id=1".into(),
        };
        assert!(mailer.send(&email).await.is_ok());
    }
}
