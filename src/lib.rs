pub mod api;
pub mod config;
pub mod db;
pub mod lifecycle;
pub mod media;
pub mod notifications;
pub mod policy;
pub mod quota;
pub mod settings;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::lifecycle::Lifecycle;
use crate::media::MediaSearch;
use crate::notifications::WhatsAppNotifier;
use crate::quota::SubmissionLocks;
use crate::settings::SettingsStore;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub settings: SettingsStore,
    pub lifecycle: Lifecycle,
    pub submissions: SubmissionLocks,
    pub media: MediaSearch,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let notifier = Arc::new(WhatsAppNotifier::new(config.notifications.clone()));
        Self::with_notifier(config, db, notifier)
    }

    /// Build the state around an existing notifier
    pub fn with_notifier(config: Config, db: DbPool, notifier: Arc<WhatsAppNotifier>) -> Self {
        let settings = SettingsStore::new(db.clone());
        let lifecycle = Lifecycle::new(db.clone(), settings.clone(), notifier);
        let media = MediaSearch::new(config.media.clone());
        Self {
            config,
            db,
            settings,
            lifecycle,
            submissions: SubmissionLocks::new(),
            media,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
