//! Who may do what with a content request.
//!
//! Lookups resolve the identifier first: an unknown id is `NotFound`, a known
//! one the actor has no rights on is `Forbidden`. Every request endpoint goes
//! through [`authorize`] so the two outcomes are reported the same way everywhere.

use thiserror::Error;

use crate::db::{MediaRequest, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("Request not found")]
    NotFound,
    #[error("Not authorized")]
    Forbidden,
}

/// An operation on a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    View,
    Edit,
    ChangeStatus,
    Delete,
}

impl RequestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestAction::View => "view",
            RequestAction::Edit => "edit",
            RequestAction::ChangeStatus => "change_status",
            RequestAction::Delete => "delete",
        }
    }
}

fn is_owner(request: &MediaRequest, actor: &User) -> bool {
    request.user_id == actor.id
}

/// Admins see everything, users see their own requests
pub fn can_view(request: &MediaRequest, actor: &User) -> bool {
    actor.is_admin() || is_owner(request, actor)
}

/// Status is an administrative judgment
pub fn can_mutate_status(_request: &MediaRequest, actor: &User) -> bool {
    actor.is_admin()
}

/// Only the owner retracts a request; admins use the bulk delete instead
pub fn can_delete(request: &MediaRequest, actor: &User) -> bool {
    is_owner(request, actor)
}

/// Only the owner edits the request body
pub fn can_edit(request: &MediaRequest, actor: &User) -> bool {
    is_owner(request, actor)
}

pub fn permits(action: RequestAction, request: &MediaRequest, actor: &User) -> bool {
    match action {
        RequestAction::View => can_view(request, actor),
        RequestAction::Edit => can_edit(request, actor),
        RequestAction::ChangeStatus => can_mutate_status(request, actor),
        RequestAction::Delete => can_delete(request, actor),
    }
}

/// Resolve a looked-up request against the actor's rights
pub fn authorize(
    request: Option<MediaRequest>,
    actor: &User,
    action: RequestAction,
) -> Result<MediaRequest, AccessError> {
    let request = request.ok_or(AccessError::NotFound)?;
    if permits(action, &request, actor) {
        Ok(request)
    } else {
        tracing::warn!(
            user_id = %actor.id,
            request_id = %request.id,
            action = action.as_str(),
            "Denied access to request"
        );
        Err(AccessError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MediaType, RequestKind, RequestStatus, UserRole};

    fn actor(id: &str, role: UserRole) -> User {
        User {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            password_hash: String::new(),
            name: id.to_string(),
            role,
            whatsapp: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn request_owned_by(user_id: &str) -> MediaRequest {
        MediaRequest {
            id: "r1".to_string(),
            user_id: user_id.to_string(),
            kind: RequestKind::Add,
            media_id: 1,
            media_type: MediaType::Movie,
            media_title: "Alien".to_string(),
            media_poster: None,
            status: RequestStatus::Pending,
            description: None,
            notify_whatsapp: false,
            contact_number: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_view_matrix() {
        let request = request_owned_by("owner");
        let cases = [
            (actor("owner", UserRole::Admin), true),
            (actor("other", UserRole::Admin), true),
            (actor("owner", UserRole::User), true),
            (actor("other", UserRole::User), false),
        ];
        for (who, expected) in cases {
            assert_eq!(
                can_view(&request, &who),
                expected,
                "view by {} ({})",
                who.id,
                who.role
            );
        }
    }

    #[test]
    fn test_status_is_admin_only() {
        let request = request_owned_by("owner");
        assert!(!can_mutate_status(&request, &actor("owner", UserRole::User)));
        assert!(can_mutate_status(&request, &actor("other", UserRole::Admin)));
    }

    #[test]
    fn test_delete_is_owner_only() {
        let request = request_owned_by("owner");
        assert!(can_delete(&request, &actor("owner", UserRole::User)));
        assert!(!can_delete(&request, &actor("other", UserRole::Admin)));
        assert!(!can_delete(&request, &actor("other", UserRole::User)));
    }

    #[test]
    fn test_authorize_distinguishes_missing_from_forbidden() {
        let stranger = actor("other", UserRole::User);
        assert_eq!(
            authorize(None, &stranger, RequestAction::View).unwrap_err(),
            AccessError::NotFound
        );
        assert_eq!(
            authorize(Some(request_owned_by("owner")), &stranger, RequestAction::Delete)
                .unwrap_err(),
            AccessError::Forbidden
        );
        assert!(authorize(
            Some(request_owned_by("owner")),
            &actor("owner", UserRole::User),
            RequestAction::Edit
        )
        .is_ok());
    }
}
