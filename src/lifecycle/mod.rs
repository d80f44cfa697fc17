//! Request status transitions and their side effects.
//!
//! ```text
//! pending <-> in_progress
//! pending | in_progress -> completed | rejected
//! ```
//!
//! `completed` and `rejected` are final. Setting the current status again is
//! accepted and changes nothing. Notifications run on a spawned task after the
//! new status is stored, so a delivery failure never reaches the caller.

use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::api::metrics::REQUEST_STATUS_TRANSITIONS_TOTAL;
use crate::db::{DbPool, MediaRequest, RequestStatus, User};
use crate::notifications::{DispatchOutcome, WhatsAppNotifier};
use crate::policy::{self, AccessError, RequestAction};
use crate::settings::SettingsStore;

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("Cannot change status from {from} to {to}")]
    Invalid {
        from: RequestStatus,
        to: RequestStatus,
    },
    #[error("Request status was changed by someone else, reload and try again")]
    Concurrent,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub fn is_terminal(status: RequestStatus) -> bool {
    matches!(status, RequestStatus::Completed | RequestStatus::Rejected)
}

/// Whether the graph has an edge from `from` to `to`
pub fn can_transition(from: RequestStatus, to: RequestStatus) -> bool {
    use RequestStatus::*;
    matches!(
        (from, to),
        (Pending, InProgress)
            | (InProgress, Pending)
            | (Pending | InProgress, Completed | Rejected)
    )
}

/// Result of a status change
#[derive(Debug)]
pub struct StatusChange {
    pub request: MediaRequest,
    pub previous: RequestStatus,
    /// Background notification, present when one was scheduled
    pub notification: Option<JoinHandle<DispatchOutcome>>,
}

impl StatusChange {
    pub fn changed(&self) -> bool {
        self.previous != self.request.status
    }
}

/// Collaborators a status change needs
#[derive(Clone)]
pub struct Lifecycle {
    db: DbPool,
    settings: SettingsStore,
    notifier: Arc<WhatsAppNotifier>,
}

impl Lifecycle {
    pub fn new(db: DbPool, settings: SettingsStore, notifier: Arc<WhatsAppNotifier>) -> Self {
        Self {
            db,
            settings,
            notifier,
        }
    }

    /// Move request `id` to `to` on behalf of `actor`
    pub async fn change_status(
        &self,
        actor: &User,
        id: &str,
        to: RequestStatus,
    ) -> Result<StatusChange, TransitionError> {
        let found = MediaRequest::find_by_id(&self.db, id).await?;
        let mut request = policy::authorize(found, actor, RequestAction::ChangeStatus)?;
        let from = request.status;

        if from == to {
            return Ok(StatusChange {
                request,
                previous: from,
                notification: None,
            });
        }

        if !can_transition(from, to) {
            return Err(TransitionError::Invalid { from, to });
        }

        if !MediaRequest::compare_and_set_status(&self.db, id, from, to).await? {
            return Err(TransitionError::Concurrent);
        }

        request = MediaRequest::find_by_id(&self.db, id)
            .await?
            .ok_or(AccessError::NotFound)?;

        metrics::counter!(
            REQUEST_STATUS_TRANSITIONS_TOTAL,
            "from" => from.as_str(),
            "to" => to.as_str()
        )
        .increment(1);
        tracing::info!(
            request_id = %request.id,
            actor = %actor.id,
            from = from.as_str(),
            to = to.as_str(),
            "Request status changed"
        );

        let notification = request
            .notify_whatsapp
            .then(|| self.spawn_notification(request.clone()));

        Ok(StatusChange {
            request,
            previous: from,
            notification,
        })
    }

    fn spawn_notification(&self, request: MediaRequest) -> JoinHandle<DispatchOutcome> {
        let db = self.db.clone();
        let settings = self.settings.clone();
        let notifier = self.notifier.clone();

        tokio::spawn(async move {
            let settings = match settings.find().await {
                Ok(Some(settings)) => settings,
                Ok(None) => {
                    tracing::warn!("Settings missing, notification skipped");
                    return DispatchOutcome::Failed;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load settings for notification");
                    return DispatchOutcome::Failed;
                }
            };

            let owner_number = match User::find_by_id(&db, &request.user_id).await {
                Ok(owner) => owner.and_then(|u| u.whatsapp),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to load request owner for notification");
                    None
                }
            };

            notifier
                .notify_status_change(&settings, &request, owner_number.as_deref())
                .await
        })
    }
}
