//! The runtime settings row.
//!
//! The table holds exactly one row, pinned to `id = 1` by a CHECK constraint.
//! The row is created with `INSERT OR IGNORE`, so concurrent first writes
//! converge on the same record instead of racing an existence check.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Version of the settings layout stored in `schema_version`
pub const SETTINGS_SCHEMA_VERSION: i64 = 1;

const SINGLETON_ID: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Settings {
    #[serde(skip)]
    pub id: i64,
    pub schema_version: i64,
    pub request_limit_per_day: i64,
    pub request_limit_per_week: i64,
    pub whatsapp_enabled: bool,
    pub twilio_account_sid: Option<String>,
    #[serde(skip_serializing)]
    pub twilio_auth_token: Option<String>,
    pub twilio_phone_number: Option<String>,
    pub primary_color: String,
    pub platform_enabled: bool,
    pub disabled_message: String,
    pub registration_enabled: bool,
    pub updated_at: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            id: SINGLETON_ID,
            schema_version: SETTINGS_SCHEMA_VERSION,
            request_limit_per_day: 10,
            request_limit_per_week: 50,
            whatsapp_enabled: false,
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_phone_number: None,
            primary_color: "#1DB954".to_string(),
            platform_enabled: true,
            disabled_message: "Platform is currently under maintenance. Please try again later."
                .to_string(),
            registration_enabled: true,
            updated_at: String::new(),
        }
    }
}

/// Sender credentials for the messaging gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GatewayCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub phone_number: String,
}

impl Settings {
    /// Gateway credentials, when all three are set and the account SID is well formed
    pub fn gateway_credentials(&self) -> Option<GatewayCredentials> {
        let sid = self.twilio_account_sid.as_deref()?.trim();
        let token = self.twilio_auth_token.as_deref()?.trim();
        let phone = self.twilio_phone_number.as_deref()?.trim();

        if !sid.starts_with("AC") || sid.len() < 10 || token.is_empty() || phone.is_empty() {
            return None;
        }

        Some(GatewayCredentials {
            account_sid: sid.to_string(),
            auth_token: token.to_string(),
            phone_number: phone.to_string(),
        })
    }

    /// Create the row with default values if it does not exist yet
    pub async fn ensure(db: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO settings (id, schema_version, updated_at) VALUES (?, ?, ?)")
            .bind(SINGLETON_ID)
            .bind(SETTINGS_SCHEMA_VERSION)
            .bind(crate::db::now())
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn find(db: &SqlitePool) -> Result<Option<Settings>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM settings WHERE id = ?")
            .bind(SINGLETON_ID)
            .fetch_optional(db)
            .await
    }

    /// Apply a partial update in one statement. Absent fields keep their
    /// stored value; an empty string clears a gateway credential.
    ///
    /// Returns `false` and writes nothing when the resulting daily limit would
    /// exceed the weekly one. The limits are compared against the row as it is
    /// at write time, so concurrent edits cannot cross them.
    pub async fn apply(db: &SqlitePool, update: &UpdateSettingsRequest) -> Result<bool, sqlx::Error> {
        Self::ensure(db).await?;

        let result = sqlx::query(
            r#"
            UPDATE settings SET
                request_limit_per_day = COALESCE(?1, request_limit_per_day),
                request_limit_per_week = COALESCE(?2, request_limit_per_week),
                whatsapp_enabled = COALESCE(?3, whatsapp_enabled),
                twilio_account_sid = NULLIF(COALESCE(?4, twilio_account_sid), ''),
                twilio_auth_token = NULLIF(COALESCE(?5, twilio_auth_token), ''),
                twilio_phone_number = NULLIF(COALESCE(?6, twilio_phone_number), ''),
                primary_color = COALESCE(?7, primary_color),
                platform_enabled = COALESCE(?8, platform_enabled),
                disabled_message = COALESCE(?9, disabled_message),
                registration_enabled = COALESCE(?10, registration_enabled),
                updated_at = ?11
            WHERE id = ?12
              AND COALESCE(?1, request_limit_per_day) <= COALESCE(?2, request_limit_per_week)
            "#,
        )
        .bind(update.request_limit_per_day)
        .bind(update.request_limit_per_week)
        .bind(update.whatsapp_enabled)
        .bind(update.twilio_account_sid.as_deref().map(str::trim))
        .bind(update.twilio_auth_token.as_deref().map(str::trim))
        .bind(update.twilio_phone_number.as_deref().map(str::trim))
        .bind(&update.primary_color)
        .bind(update.platform_enabled)
        .bind(&update.disabled_message)
        .bind(update.registration_enabled)
        .bind(crate::db::now())
        .bind(SINGLETON_ID)
        .execute(db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Partial settings update. Unknown fields are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSettingsRequest {
    pub request_limit_per_day: Option<i64>,
    pub request_limit_per_week: Option<i64>,
    pub whatsapp_enabled: Option<bool>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_phone_number: Option<String>,
    pub primary_color: Option<String>,
    pub platform_enabled: Option<bool>,
    pub disabled_message: Option<String>,
    pub registration_enabled: Option<bool>,
}

/// Settings as shown to admins, with the auth token masked
#[derive(Debug, Clone, Serialize)]
pub struct SettingsResponse {
    #[serde(flatten)]
    pub settings: Settings,
    /// Last four characters of the auth token, when one is stored
    pub twilio_auth_token_hint: Option<String>,
}

impl From<Settings> for SettingsResponse {
    fn from(settings: Settings) -> Self {
        let twilio_auth_token_hint = settings.twilio_auth_token.as_deref().map(|token| {
            let tail: String = token
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("****{}", tail)
        });
        Self {
            settings,
            twilio_auth_token_hint,
        }
    }
}

/// The subset of settings the client needs before login
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicSettings {
    pub platform_enabled: bool,
    pub disabled_message: String,
    pub registration_enabled: bool,
    pub primary_color: String,
    pub whatsapp_enabled: bool,
}

impl From<&Settings> for PublicSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            platform_enabled: settings.platform_enabled,
            disabled_message: settings.disabled_message.clone(),
            registration_enabled: settings.registration_enabled,
            primary_color: settings.primary_color.clone(),
            whatsapp_enabled: settings.whatsapp_enabled,
        }
    }
}
