//! Identity verification.
//!
//! Handles user signup, login, and bearer-session management. Connection
//! handshakes and privileged requests both resolve their token here; a
//! rejection is terminal for the connection or the HTTP call.

pub mod middleware;

use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// User record stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Public user info (no sensitive data).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            created_at: user.created_at,
        }
    }
}

/// Session token for authenticated requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Verifies bearer credentials and manages sessions.
pub struct AuthManager {
    pool: SqlitePool,
    /// In-memory session cache
    sessions: RwLock<HashMap<String, Session>>,
}

impl AuthManager {
    /// Creates the manager over an existing pool and ensures the schema.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                username TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_login TEXT,
                is_active INTEGER DEFAULT 1
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!("[Auth] Schema ready");

        Ok(Self {
            pool,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Register a new user.
    pub async fn signup(&self, email: String, username: String, password: String) -> Result<User> {
        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;

        if existing.is_some() {
            return Err(anyhow::anyhow!("Email already registered"));
        }

        let password_hash = hash(&password, DEFAULT_COST).context("Failed to hash password")?;

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.clone(),
            username: username.clone(),
            password_hash,
            created_at: Utc::now(),
            last_login: None,
            is_active: true,
        };

        sqlx::query(
            "INSERT INTO users (id, email, username, password_hash, created_at, is_active) VALUES (?, ?, ?, ?, ?, ?)"
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at.to_rfc3339())
        .bind(user.is_active)
        .execute(&self.pool)
        .await?;

        info!("[Auth] User registered: {} ({})", username, email);

        Ok(user)
    }

    /// Login user and create session.
    pub async fn login(&self, email: String, password: String) -> Result<(User, Session)> {
        let row: Option<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT id, email, username, password_hash, created_at FROM users WHERE email = ? AND is_active = 1"
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;

        let (user_id, email, username, password_hash, created_at) =
            row.ok_or_else(|| anyhow::anyhow!("Invalid email or password"))?;

        let valid = verify(&password, &password_hash).context("Failed to verify password")?;

        if !valid {
            warn!("[Auth] Failed login attempt for {}", email);
            return Err(anyhow::anyhow!("Invalid email or password"));
        }

        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&user_id)
            .execute(&self.pool)
            .await?;

        let session = self.create_session(&user_id).await?;

        let user = User {
            id: user_id,
            email,
            username,
            password_hash: String::new(), // Don't return hash
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            last_login: Some(Utc::now()),
            is_active: true,
        };

        info!("[Auth] User logged in: {}", user.username);

        Ok((user, session))
    }

    async fn create_session(&self, user_id: &str) -> Result<Session> {
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::days(30),
        };

        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(&session.user_id)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());

        Ok(session)
    }

    /// Validate a session token, returning the bound identity.
    pub async fn validate_session(&self, token: &str) -> Result<UserInfo> {
        let cached_user_id = {
            let sessions = self.sessions.read().await;
            sessions
                .get(token)
                .filter(|s| s.expires_at > Utc::now())
                .map(|s| s.user_id.clone())
        };

        if let Some(user_id) = cached_user_id {
            return self.get_user(&user_id).await;
        }

        let row: Option<(String, String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT u.id, u.email, u.username, u.created_at, s.expires_at
            FROM users u
            JOIN sessions s ON u.id = s.user_id
            WHERE s.token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id, email, username, created_at, expires_at)) = row {
            let expires: DateTime<Utc> = expires_at
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid date"))?;
            if expires > Utc::now() {
                return Ok(UserInfo {
                    id,
                    email,
                    username,
                    created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
                });
            }
        }

        Err(anyhow::anyhow!("Invalid or expired session"))
    }

    /// Logout user (invalidate session).
    pub async fn logout(&self, token: &str) -> Result<()> {
        self.sessions.write().await.remove(token);

        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        info!("[Auth] Session invalidated");

        Ok(())
    }

    /// Get user by ID.
    pub async fn get_user(&self, user_id: &str) -> Result<UserInfo> {
        let row: Option<(String, String, String, String)> =
            sqlx::query_as("SELECT id, email, username, created_at FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        if let Some((id, email, username, created_at)) = row {
            Ok(UserInfo {
                id,
                email,
                username,
                created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            })
        } else {
            Err(anyhow::anyhow!("User not found"))
        }
    }

    /// List all users (for contact discovery).
    pub async fn list_users(&self) -> Result<Vec<UserInfo>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT id, email, username, created_at FROM users WHERE is_active = 1",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, email, username, created_at)| UserInfo {
                id,
                email,
                username,
                created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_auth() -> AuthManager {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        AuthManager::new(pool).await.unwrap()
    }

    #[tokio::test]
    async fn signup_login_validate_round_trip() {
        let auth = memory_auth().await;
        let user = auth
            .signup(
                "alice@example.com".to_string(),
                "alice".to_string(),
                "hunter2".to_string(),
            )
            .await
            .unwrap();

        let (logged_in, session) = auth
            .login("alice@example.com".to_string(), "hunter2".to_string())
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);

        let info = auth.validate_session(&session.token).await.unwrap();
        assert_eq!(info.username, "alice");

        auth.logout(&session.token).await.unwrap();
        assert!(auth.validate_session(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let auth = memory_auth().await;
        auth.signup(
            "bob@example.com".to_string(),
            "bob".to_string(),
            "secret".to_string(),
        )
        .await
        .unwrap();

        assert!(auth
            .login("bob@example.com".to_string(), "wrong".to_string())
            .await
            .is_err());
    }
}
