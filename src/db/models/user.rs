//! User accounts.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: UserRole,
    /// Contact number used for WhatsApp notifications
    pub whatsapp: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub async fn find_by_id(db: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn find_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(db)
            .await
    }

    pub async fn list(db: &SqlitePool) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(db)
            .await
    }

    pub async fn admin_exists(db: &SqlitePool) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(db)
            .await?;
        Ok(count > 0)
    }

    /// Insert a new account. The password must already be hashed.
    pub async fn create(db: &SqlitePool, new: NewUser<'_>) -> Result<User, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = crate::db::now();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, name, role, whatsapp, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.name)
        .bind(new.role)
        .bind(new.whatsapp)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await?;

        Ok(User {
            id,
            email: new.email.to_string(),
            password_hash: new.password_hash.to_string(),
            name: new.name.to_string(),
            role: new.role,
            whatsapp: new.whatsapp.map(|s| s.to_string()),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Persist every mutable column of this user
    pub async fn save(&self, db: &SqlitePool) -> Result<User, sqlx::Error> {
        let now = crate::db::now();
        sqlx::query(
            r#"
            UPDATE users
            SET email = ?, password_hash = ?, name = ?, role = ?, whatsapp = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&self.email)
        .bind(&self.password_hash)
        .bind(&self.name)
        .bind(self.role)
        .bind(&self.whatsapp)
        .bind(&now)
        .bind(&self.id)
        .execute(db)
        .await?;

        let mut saved = self.clone();
        saved.updated_at = now;
        Ok(saved)
    }

    /// Delete an account; requests and sessions cascade, access logs stay
    pub async fn delete(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Column values for [`User::create`]
#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub name: &'a str,
    pub role: UserRole,
    pub whatsapp: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub whatsapp: Option<String>,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            whatsapp: user.whatsapp,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: String,
    pub user: UserResponse,
}

/// Public self-registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub whatsapp: Option<String>,
}

/// Account creation by an admin
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub whatsapp: Option<String>,
}

/// Account edit by an admin; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub whatsapp: Option<String>,
    pub password: Option<String>,
}

/// Self-service profile edit
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub whatsapp: Option<String>,
    pub password: Option<String>,
    /// Required when `password` is set
    pub current_password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[test]
    fn test_role_roundtrip() {
        assert_eq!("admin".parse::<UserRole>(), Ok(UserRole::Admin));
        assert_eq!("USER".parse::<UserRole>(), Ok(UserRole::User));
        assert!("owner".parse::<UserRole>().is_err());
        assert_eq!(UserRole::Admin.to_string(), "admin");
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let user = User {
            id: "u1".to_string(),
            email: "a@b.com".to_string(),
            password_hash: "secret-hash".to_string(),
            name: "A".to_string(),
            role: UserRole::User,
            whatsapp: None,
            created_at: "2024-01-01T00:00:00.000Z".to_string(),
            updated_at: "2024-01-01T00:00:00.000Z".to_string(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let db = test_pool().await;
        let user = User::create(
            &db,
            NewUser {
                email: "ana@example.com",
                password_hash: "hash",
                name: "Ana",
                role: UserRole::User,
                whatsapp: Some("11999999999"),
            },
        )
        .await
        .unwrap();

        let found = User::find_by_email(&db, "ana@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.role, UserRole::User);
        assert_eq!(found.whatsapp.as_deref(), Some("11999999999"));
        assert!(!User::admin_exists(&db).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let db = test_pool().await;
        let new = NewUser {
            email: "dup@example.com",
            password_hash: "hash",
            name: "Dup",
            role: UserRole::User,
            whatsapp: None,
        };
        User::create(&db, new).await.unwrap();
        assert!(User::create(&db, new).await.is_err());
    }
}
