//! Access to the runtime settings row.
//!
//! Handlers and services receive a [`SettingsStore`] through the application
//! state and take one [`Settings`] snapshot per operation.

use thiserror::Error;

use crate::db::{DbPool, PublicSettings, Settings, UpdateSettingsRequest};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Daily limit cannot be greater than the weekly limit")]
    LimitsCrossed,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct SettingsStore {
    db: DbPool,
}

impl SettingsStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// The stored row, or `None` if it is missing
    pub async fn find(&self) -> Result<Option<Settings>, sqlx::Error> {
        Settings::find(&self.db).await
    }

    /// The stored row, creating it with defaults when missing
    pub async fn get(&self) -> Result<Settings, sqlx::Error> {
        if let Some(settings) = Settings::find(&self.db).await? {
            return Ok(settings);
        }

        tracing::info!("Settings row missing, creating defaults");
        Settings::ensure(&self.db).await?;
        Settings::find(&self.db).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Apply a partial update and return the new row
    pub async fn update(&self, update: &UpdateSettingsRequest) -> Result<Settings, SettingsError> {
        if !Settings::apply(&self.db, update).await? {
            tracing::warn!(
                request_limit_per_day = ?update.request_limit_per_day,
                request_limit_per_week = ?update.request_limit_per_week,
                "Settings update refused, daily limit would exceed weekly limit"
            );
            return Err(SettingsError::LimitsCrossed);
        }
        let settings = Settings::find(&self.db).await?.ok_or(sqlx::Error::RowNotFound)?;

        tracing::info!(
            request_limit_per_day = settings.request_limit_per_day,
            request_limit_per_week = settings.request_limit_per_week,
            whatsapp_enabled = settings.whatsapp_enabled,
            platform_enabled = settings.platform_enabled,
            "Settings updated"
        );
        Ok(settings)
    }

    pub async fn public(&self) -> Result<PublicSettings, sqlx::Error> {
        Ok(PublicSettings::from(&self.get().await?))
    }
}
