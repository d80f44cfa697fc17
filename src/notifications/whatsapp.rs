//! WhatsApp delivery through the Twilio Messages API.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::db::GatewayCredentials;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("gateway call timed out after {0:?}")]
    Timeout(Duration),
}

/// An outbound messaging channel. `to` is an E.164 number with a leading '+'.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), GatewayError>;
}

/// Bring a stored contact number to E.164.
///
/// Numbers written with a leading '+' keep their country code. Bare numbers of
/// at most 11 digits are national numbers and get `default_country_code`.
/// Returns `None` when nothing dialable is left.
pub fn normalize_number(raw: &str, default_country_code: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    if trimmed.starts_with('+') || digits.len() > 11 {
        Some(format!("+{}", digits))
    } else {
        Some(format!("+{}{}", default_country_code, digits))
    }
}

pub struct TwilioGateway {
    client: reqwest::Client,
    api_base: String,
    credentials: GatewayCredentials,
    sender: String,
}

impl TwilioGateway {
    pub fn new(
        api_base: &str,
        credentials: GatewayCredentials,
        default_country_code: &str,
        timeout: Duration,
    ) -> Self {
        let sender = normalize_number(&credentials.phone_number, default_country_code)
            .unwrap_or_else(|| credentials.phone_number.clone());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            credentials,
            sender,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.api_base, self.credentials.account_sid
        )
    }
}

#[async_trait]
impl MessagingGateway for TwilioGateway {
    async fn send(&self, to: &str, body: &str) -> Result<(), GatewayError> {
        let from = format!("whatsapp:{}", self.sender);
        let to = format!("whatsapp:{}", to);

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.credentials.account_sid, Some(&self.credentials.auth_token))
            .form(&[("From", from.as_str()), ("To", to.as_str()), ("Body", body)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
