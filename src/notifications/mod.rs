//! Status-change notifications over WhatsApp.
//!
//! Delivery is best effort: every failure is logged and swallowed, and each
//! transition gets at most one attempt.

mod whatsapp;

pub use whatsapp::{normalize_number, GatewayError, MessagingGateway, TwilioGateway};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::metrics::NOTIFICATIONS_TOTAL;
use crate::config::{MessageLocale, NotificationConfig};
use crate::db::{GatewayCredentials, MediaRequest, RequestStatus, Settings};

/// Builds a gateway for a set of credentials
pub type GatewayFactory =
    Arc<dyn Fn(&GatewayCredentials) -> Arc<dyn MessagingGateway> + Send + Sync>;

/// Why a dispatch was not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NoNumber,
    MissingCredentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Skipped(SkipReason),
    Failed,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Sent => "sent",
            DispatchOutcome::Skipped(_) => "skipped",
            DispatchOutcome::Failed => "failed",
        }
    }
}

/// Message sent to the owner when their request moves to `status`
pub fn status_message(locale: MessageLocale, status: RequestStatus, media_title: &str) -> String {
    match locale {
        MessageLocale::PtBr => {
            let label = match status {
                RequestStatus::Pending => "está pendente de análise",
                RequestStatus::InProgress => "está em análise",
                RequestStatus::Completed => "foi concluída com sucesso",
                RequestStatus::Rejected => "foi rejeitada",
            };
            format!("Olá! Sua solicitação para \"{}\" {}.", media_title, label)
        }
        MessageLocale::En => {
            let label = match status {
                RequestStatus::Pending => "is pending review",
                RequestStatus::InProgress => "is under review",
                RequestStatus::Completed => "was completed successfully",
                RequestStatus::Rejected => "was rejected",
            };
            format!("Hi! Your request for \"{}\" {}.", media_title, label)
        }
    }
}

struct CachedGateway {
    credentials: GatewayCredentials,
    gateway: Arc<dyn MessagingGateway>,
    validated_at: Instant,
}

pub struct WhatsAppNotifier {
    config: NotificationConfig,
    factory: GatewayFactory,
    cached: Mutex<Option<CachedGateway>>,
}

impl WhatsAppNotifier {
    /// Notifier delivering through Twilio
    pub fn new(config: NotificationConfig) -> Self {
        let api_base = config.twilio_api_base.clone();
        let country_code = config.default_country_code.clone();
        let timeout = Duration::from_secs(config.gateway_timeout_secs);
        let factory: GatewayFactory = Arc::new(move |credentials: &GatewayCredentials| {
            Arc::new(TwilioGateway::new(
                &api_base,
                credentials.clone(),
                &country_code,
                timeout,
            )) as Arc<dyn MessagingGateway>
        });
        Self::with_factory(config, factory)
    }

    pub fn with_factory(config: NotificationConfig, factory: GatewayFactory) -> Self {
        Self {
            config,
            factory,
            cached: Mutex::new(None),
        }
    }

    /// The cached gateway, re-validated against `credentials` at most once
    /// per refresh interval
    fn gateway(&self, credentials: GatewayCredentials) -> Arc<dyn MessagingGateway> {
        let refresh = Duration::from_secs(self.config.client_refresh_secs);
        let mut cached = self.cached.lock();

        if let Some(entry) = cached.as_mut() {
            if entry.validated_at.elapsed() < refresh {
                return entry.gateway.clone();
            }
            if entry.credentials == credentials {
                entry.validated_at = Instant::now();
                return entry.gateway.clone();
            }
            tracing::info!("Gateway credentials changed, rebuilding client");
        }

        let gateway = (self.factory)(&credentials);
        *cached = Some(CachedGateway {
            credentials,
            gateway: gateway.clone(),
            validated_at: Instant::now(),
        });
        gateway
    }

    /// Send `message` to `number`, checking the delivery preconditions first
    pub async fn notify(&self, settings: &Settings, number: Option<&str>, message: &str) -> DispatchOutcome {
        let outcome = self.dispatch(settings, number, message).await;
        metrics::counter!(NOTIFICATIONS_TOTAL, "outcome" => outcome.as_str()).increment(1);
        outcome
    }

    async fn dispatch(&self, settings: &Settings, number: Option<&str>, message: &str) -> DispatchOutcome {
        if !settings.whatsapp_enabled {
            tracing::debug!("WhatsApp notifications disabled, skipping");
            return DispatchOutcome::Skipped(SkipReason::Disabled);
        }

        let Some(to) = number
            .filter(|n| !n.trim().is_empty())
            .and_then(|n| normalize_number(n, &self.config.default_country_code))
        else {
            tracing::debug!("No contact number, skipping notification");
            return DispatchOutcome::Skipped(SkipReason::NoNumber);
        };

        let Some(credentials) = settings.gateway_credentials() else {
            tracing::warn!("WhatsApp enabled but gateway credentials are missing or invalid");
            return DispatchOutcome::Skipped(SkipReason::MissingCredentials);
        };

        let gateway = self.gateway(credentials);
        let timeout = Duration::from_secs(self.config.gateway_timeout_secs);

        let result = match tokio::time::timeout(timeout, gateway.send(&to, message)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(timeout)),
        };

        match result {
            Ok(()) => {
                tracing::info!(to = %to, "WhatsApp notification sent");
                DispatchOutcome::Sent
            }
            Err(e) => {
                tracing::warn!(to = %to, error = %e, "Failed to send WhatsApp notification");
                DispatchOutcome::Failed
            }
        }
    }

    /// Tell the owner of `request` that it moved to its current status.
    /// The request's contact number wins over the owner's profile number.
    pub async fn notify_status_change(
        &self,
        settings: &Settings,
        request: &MediaRequest,
        owner_number: Option<&str>,
    ) -> DispatchOutcome {
        let number = request
            .contact_number
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(owner_number);
        let message = status_message(self.config.locale, request.status, &request.media_title);
        self.notify(settings, number, &message).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;

    /// Records every message instead of delivering it
    #[derive(Default)]
    pub struct RecordingGateway {
        pub sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MessagingGateway for RecordingGateway {
        async fn send(&self, to: &str, body: &str) -> Result<(), GatewayError> {
            self.sent.lock().push((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    /// Fails every call with a rejection
    pub struct FailingGateway;

    #[async_trait]
    impl MessagingGateway for FailingGateway {
        async fn send(&self, _to: &str, _body: &str) -> Result<(), GatewayError> {
            Err(GatewayError::Rejected {
                status: 500,
                body: "upstream exploded".to_string(),
            })
        }
    }

    pub fn notifier_with(gateway: Arc<dyn MessagingGateway>) -> WhatsAppNotifier {
        WhatsAppNotifier::with_factory(
            NotificationConfig::default(),
            Arc::new(move |_: &GatewayCredentials| gateway.clone()),
        )
    }

    /// Settings with notifications on and valid credentials
    pub fn enabled_settings() -> Settings {
        Settings {
            whatsapp_enabled: true,
            twilio_account_sid: Some("AC0123456789abcdef".to_string()),
            twilio_auth_token: Some("token".to_string()),
            twilio_phone_number: Some("+14155238886".to_string()),
            ..Default::default()
        }
    }
}
