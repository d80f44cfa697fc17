//! Access audit trail: logins, logouts and terminated sessions.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteExecutor, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AccessAction {
    Login,
    Logout,
    /// A previous session was closed by a newer login
    SessionTerminated,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessAction::Login => "login",
            AccessAction::Logout => "logout",
            AccessAction::SessionTerminated => "session_terminated",
        }
    }
}

/// Client details captured with a session or log entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessLog {
    pub id: String,
    pub user_id: String,
    pub action: AccessAction,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: String,
}

/// Log entry joined with the account it belongs to
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AccessLogEntry {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub log: AccessLog,
    pub user_name: String,
    pub user_email: String,
}

/// Query parameters for listing the trail
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AccessLogQuery {
    pub user_id: Option<String>,
    pub action: Option<AccessAction>,
    /// Page number (1-indexed, defaults to 1)
    pub page: Option<i64>,
    /// Items per page (defaults to 50, max 100)
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessLogListResponse {
    pub items: Vec<AccessLogEntry>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl AccessLog {
    /// Append an entry. Accepts a pool or an open transaction.
    pub async fn record<'e, E>(
        executor: E,
        user_id: &str,
        action: AccessAction,
        device: &DeviceInfo,
    ) -> Result<(), sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO access_logs (id, user_id, action, user_agent, ip_address, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(action)
        .bind(&device.user_agent)
        .bind(&device.ip_address)
        .bind(crate::db::now())
        .execute(executor)
        .await?;

        tracing::debug!(user_id = user_id, action = action.as_str(), "Access log recorded");
        Ok(())
    }

    pub async fn list(
        db: &SqlitePool,
        query: &AccessLogQuery,
    ) -> Result<AccessLogListResponse, sqlx::Error> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(50).clamp(1, 100);
        let offset = (page - 1) * limit;

        let mut conditions = Vec::new();
        let mut bindings: Vec<String> = Vec::new();

        if let Some(user_id) = &query.user_id {
            conditions.push("l.user_id = ?");
            bindings.push(user_id.clone());
        }

        if let Some(action) = query.action {
            conditions.push("l.action = ?");
            bindings.push(action.as_str().to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM access_logs l {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for binding in &bindings {
            count_query = count_query.bind(binding);
        }
        let total = count_query.fetch_one(db).await?;

        let sql = format!(
            r#"
            SELECT l.*,
                   COALESCE(u.name, 'Deleted account') AS user_name,
                   COALESCE(u.email, '') AS user_email
            FROM access_logs l
            LEFT JOIN users u ON u.id = l.user_id
            {}
            ORDER BY l.created_at DESC
            LIMIT ? OFFSET ?
            "#,
            where_clause
        );
        let mut query_builder = sqlx::query_as::<_, AccessLogEntry>(&sql);
        for binding in &bindings {
            query_builder = query_builder.bind(binding);
        }
        let items = query_builder.bind(limit).bind(offset).fetch_all(db).await?;

        let total_pages = (total as f64 / limit as f64).ceil() as i64;

        Ok(AccessLogListResponse {
            items,
            total,
            page,
            limit,
            total_pages,
        })
    }
}
