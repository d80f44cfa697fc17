//! Login sessions.
//!
//! An account has at most one active session. Starting a session closes the
//! previous ones inside the same transaction that inserts the new row.

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use super::access_log::{AccessAction, AccessLog, DeviceInfo};
use super::user::UserRole;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub is_active: bool,
    pub last_activity: String,
    pub expires_at: String,
    pub created_at: String,
}

/// A user with a recently used session
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OnlineUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub last_activity: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl Session {
    /// Close every active session of `user_id`, open a new one and record the
    /// login, all in one transaction. Returns the session and the number of
    /// sessions that were closed.
    pub async fn start(
        db: &SqlitePool,
        user_id: &str,
        token_hash: &str,
        device: &DeviceInfo,
        ttl: Duration,
    ) -> Result<(Session, u64), sqlx::Error> {
        let now = Utc::now();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            token_hash: token_hash.to_string(),
            user_agent: device.user_agent.clone(),
            ip_address: device.ip_address.clone(),
            is_active: true,
            last_activity: crate::db::timestamp(now),
            expires_at: crate::db::timestamp(now + ttl),
            created_at: crate::db::timestamp(now),
        };

        let mut tx = db.begin().await?;

        let terminated = sqlx::query(
            "UPDATE sessions SET is_active = 0 WHERE user_id = ? AND is_active = 1",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, user_id, token_hash, user_agent, ip_address,
                is_active, last_activity, expires_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.token_hash)
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .bind(&session.last_activity)
        .bind(&session.expires_at)
        .bind(&session.created_at)
        .execute(&mut *tx)
        .await?;

        AccessLog::record(&mut *tx, user_id, AccessAction::Login, device).await?;
        if terminated > 0 {
            AccessLog::record(&mut *tx, user_id, AccessAction::SessionTerminated, device).await?;
        }

        tx.commit().await?;

        Ok((session, terminated))
    }

    /// Active, unexpired session for a token hash
    pub async fn find_active(db: &SqlitePool, token_hash: &str) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM sessions WHERE token_hash = ? AND is_active = 1 AND expires_at > ?",
        )
        .bind(token_hash)
        .bind(crate::db::now())
        .fetch_optional(db)
        .await
    }

    pub async fn touch(db: &SqlitePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET last_activity = ? WHERE id = ?")
            .bind(crate::db::now())
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Deactivate this session and record the logout
    pub async fn end(&self, db: &SqlitePool, device: &DeviceInfo) -> Result<(), sqlx::Error> {
        let mut tx = db.begin().await?;
        sqlx::query("UPDATE sessions SET is_active = 0 WHERE id = ?")
            .bind(&self.id)
            .execute(&mut *tx)
            .await?;
        AccessLog::record(&mut *tx, &self.user_id, AccessAction::Logout, device).await?;
        tx.commit().await
    }

    /// Users whose active session was used at or after `since`, most recent first
    pub async fn online_users(db: &SqlitePool, since: &str) -> Result<Vec<OnlineUser>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT u.id, u.name, u.email, u.role, s.last_activity, s.user_agent, s.ip_address
            FROM sessions s
            INNER JOIN users u ON u.id = s.user_id
            WHERE s.is_active = 1 AND s.expires_at > ? AND s.last_activity >= ?
            ORDER BY s.last_activity DESC
            "#,
        )
        .bind(crate::db::now())
        .bind(since)
        .fetch_all(db)
        .await
    }
}
