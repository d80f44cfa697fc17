//! Content requests: a user asking for a movie or show to be added, updated or fixed.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// What the user wants done with the title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RequestKind {
    Add,
    Update,
    Fix,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Add => "add",
            RequestKind::Update => "update",
            RequestKind::Fix => "fix",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Triage state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Rejected,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 4] = [
        RequestStatus::Pending,
        RequestStatus::InProgress,
        RequestStatus::Completed,
        RequestStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MediaRequest {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: RequestKind,
    /// External (TMDB) identifier of the title
    pub media_id: i64,
    pub media_type: MediaType,
    pub media_title: String,
    pub media_poster: Option<String>,
    pub status: RequestStatus,
    pub description: Option<String>,
    pub notify_whatsapp: bool,
    /// Overrides the owner's profile number for notifications
    pub contact_number: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request row joined with its owner, for the admin listing
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MediaRequestWithOwner {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub request: MediaRequest,
    pub owner_name: String,
    pub owner_email: String,
}

/// Body of a submission
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRequestBody {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub media_id: i64,
    pub media_type: MediaType,
    pub media_title: String,
    #[serde(default)]
    pub media_poster: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notify_whatsapp: bool,
    #[serde(default)]
    pub contact_number: Option<String>,
}

/// Owner edit of a pending request; absent fields are left unchanged.
/// Status and ownership are not part of this body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRequestBody {
    #[serde(rename = "type")]
    pub kind: Option<RequestKind>,
    pub media_id: Option<i64>,
    pub media_type: Option<MediaType>,
    pub media_title: Option<String>,
    pub media_poster: Option<String>,
    pub description: Option<String>,
    pub notify_whatsapp: Option<bool>,
    pub contact_number: Option<String>,
}

/// Body of an admin status change
#[derive(Debug, Clone, Deserialize)]
pub struct StatusChangeBody {
    pub status: RequestStatus,
}

/// Query parameters for the admin listing
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RequestListQuery {
    /// Page number (1-indexed, defaults to 1)
    pub page: Option<i64>,
    /// Items per page (defaults to 10, max 100)
    pub limit: Option<i64>,
    pub status: Option<RequestStatus>,
    #[serde(rename = "type")]
    pub kind: Option<RequestKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestListResponse {
    pub items: Vec<MediaRequestWithOwner>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub has_more: bool,
}

/// Number of requests per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub rejected: i64,
}

impl MediaRequest {
    /// Insert a new request owned by `user_id`; status always starts at pending
    pub async fn create(
        db: &SqlitePool,
        user_id: &str,
        body: &CreateRequestBody,
    ) -> Result<MediaRequest, sqlx::Error> {
        let request = MediaRequest {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind: body.kind,
            media_id: body.media_id,
            media_type: body.media_type,
            media_title: body.media_title.trim().to_string(),
            media_poster: body.media_poster.clone(),
            status: RequestStatus::Pending,
            description: body.description.clone(),
            notify_whatsapp: body.notify_whatsapp,
            contact_number: body.contact_number.clone(),
            created_at: crate::db::now(),
            updated_at: crate::db::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO requests (
                id, user_id, kind, media_id, media_type, media_title, media_poster,
                status, description, notify_whatsapp, contact_number, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.id)
        .bind(&request.user_id)
        .bind(request.kind)
        .bind(request.media_id)
        .bind(request.media_type)
        .bind(&request.media_title)
        .bind(&request.media_poster)
        .bind(request.status)
        .bind(&request.description)
        .bind(request.notify_whatsapp)
        .bind(&request.contact_number)
        .bind(&request.created_at)
        .bind(&request.updated_at)
        .execute(db)
        .await?;

        Ok(request)
    }

    pub async fn find_by_id(db: &SqlitePool, id: &str) -> Result<Option<MediaRequest>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM requests WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// All requests of one user, newest first
    pub async fn list_for_user(db: &SqlitePool, user_id: &str) -> Result<Vec<MediaRequest>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM requests WHERE user_id = ? ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(db)
            .await
    }

    /// Number of requests `user_id` created at or after `since`
    pub async fn count_since(db: &SqlitePool, user_id: &str, since: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM requests WHERE user_id = ? AND created_at >= ?")
            .bind(user_id)
            .bind(since)
            .fetch_one(db)
            .await
    }

    /// Paginated listing across all users, newest first
    pub async fn list_page(
        db: &SqlitePool,
        query: &RequestListQuery,
    ) -> Result<RequestListResponse, sqlx::Error> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(10).clamp(1, 100);
        let offset = (page - 1) * limit;

        let mut conditions = Vec::new();
        let mut bindings: Vec<&'static str> = Vec::new();

        if let Some(status) = query.status {
            conditions.push("r.status = ?");
            bindings.push(status.as_str());
        }

        if let Some(kind) = query.kind {
            conditions.push("r.kind = ?");
            bindings.push(kind.as_str());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM requests r {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for binding in &bindings {
            count_query = count_query.bind(*binding);
        }
        let total = count_query.fetch_one(db).await?;

        let sql = format!(
            r#"
            SELECT r.*, u.name AS owner_name, u.email AS owner_email
            FROM requests r
            INNER JOIN users u ON u.id = r.user_id
            {}
            ORDER BY r.created_at DESC
            LIMIT ? OFFSET ?
            "#,
            where_clause
        );
        let mut items_query = sqlx::query_as::<_, MediaRequestWithOwner>(&sql);
        for binding in &bindings {
            items_query = items_query.bind(*binding);
        }
        let items = items_query.bind(limit).bind(offset).fetch_all(db).await?;

        Ok(RequestListResponse {
            items,
            total,
            page,
            limit,
            has_more: offset + limit < total,
        })
    }

    /// Apply an owner edit to the editable columns
    pub fn apply_edit(&mut self, body: &UpdateRequestBody) {
        if let Some(kind) = body.kind {
            self.kind = kind;
        }
        if let Some(media_id) = body.media_id {
            self.media_id = media_id;
        }
        if let Some(media_type) = body.media_type {
            self.media_type = media_type;
        }
        if let Some(ref title) = body.media_title {
            self.media_title = title.trim().to_string();
        }
        if let Some(ref poster) = body.media_poster {
            self.media_poster = non_empty(poster);
        }
        if let Some(ref description) = body.description {
            self.description = non_empty(description);
        }
        if let Some(notify) = body.notify_whatsapp {
            self.notify_whatsapp = notify;
        }
        if let Some(ref number) = body.contact_number {
            self.contact_number = non_empty(number);
        }
    }

    /// Persist the editable columns, guarded on the request still being pending.
    /// Returns false when the row is gone or was triaged in the meantime.
    pub async fn save_edit(&mut self, db: &SqlitePool) -> Result<bool, sqlx::Error> {
        let now = crate::db::now();
        let result = sqlx::query(
            r#"
            UPDATE requests
            SET kind = ?, media_id = ?, media_type = ?, media_title = ?, media_poster = ?,
                description = ?, notify_whatsapp = ?, contact_number = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(self.kind)
        .bind(self.media_id)
        .bind(self.media_type)
        .bind(&self.media_title)
        .bind(&self.media_poster)
        .bind(&self.description)
        .bind(self.notify_whatsapp)
        .bind(&self.contact_number)
        .bind(&now)
        .bind(&self.id)
        .execute(db)
        .await?;

        if result.rows_affected() == 1 {
            self.updated_at = now;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Move the status from `from` to `to` only if it is still `from`.
    /// Returns false when another writer changed it first.
    pub async fn compare_and_set_status(
        db: &SqlitePool,
        id: &str,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE requests SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to)
        .bind(crate::db::now())
        .bind(id)
        .bind(from)
        .execute(db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM requests WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove every request of every user
    pub async fn delete_all(db: &SqlitePool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM requests").execute(db).await?;
        Ok(result.rows_affected())
    }

    pub async fn status_summary(db: &SqlitePool) -> Result<StatusSummary, sqlx::Error> {
        let rows: Vec<(RequestStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM requests GROUP BY status")
                .fetch_all(db)
                .await?;

        let mut summary = StatusSummary::default();
        for (status, count) in rows {
            summary.total += count;
            match status {
                RequestStatus::Pending => summary.pending = count,
                RequestStatus::InProgress => summary.in_progress = count,
                RequestStatus::Completed => summary.completed = count,
                RequestStatus::Rejected => summary.rejected = count,
            }
        }
        Ok(summary)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::db::{NewUser, User, UserRole};

    pub async fn user(db: &SqlitePool, email: &str, role: UserRole) -> User {
        User::create(
            db,
            NewUser {
                email,
                password_hash: "not-a-real-hash",
                name: email.split('@').next().unwrap_or(email),
                role,
                whatsapp: None,
            },
        )
        .await
        .unwrap()
    }

    pub fn body(title: &str) -> CreateRequestBody {
        CreateRequestBody {
            kind: RequestKind::Add,
            media_id: 603,
            media_type: MediaType::Movie,
            media_title: title.to_string(),
            media_poster: Some("/poster.jpg".to_string()),
            description: None,
            notify_whatsapp: false,
            contact_number: None,
        }
    }

    /// Insert a request with an explicit creation time
    pub async fn request_at(db: &SqlitePool, user_id: &str, created_at: &str) -> MediaRequest {
        let mut request = MediaRequest::create(db, user_id, &body("The Matrix")).await.unwrap();
        sqlx::query("UPDATE requests SET created_at = ? WHERE id = ?")
            .bind(created_at)
            .bind(&request.id)
            .execute(db)
            .await
            .unwrap();
        request.created_at = created_at.to_string();
        request
    }
}
