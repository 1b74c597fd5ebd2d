//! Account storage in the `users` table.

use sqlx::{Row, SqlitePool};

use crate::error::{AuthError, AuthResult, InputConstraintViolation};
use crate::models::{Identity, User};

use super::password::{hash_password, verify_password};
use super::RoleList;

/// Role granted to every newly registered account.
pub const DEFAULT_ROLE: &str = "user";

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an account. Fails with [`AuthError::PasswordMismatch`] before
    /// touching the database if the two passwords differ.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        password_repeat: &str,
    ) -> AuthResult<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(InputConstraintViolation::new("username must not be empty").into());
        }
        if password.is_empty() {
            return Err(InputConstraintViolation::new("password must not be empty").into());
        }
        if password != password_repeat {
            return Err(AuthError::PasswordMismatch);
        }

        let password_hash = hash_password(password).await?;
        let roles = vec![DEFAULT_ROLE.to_string()];
        let roles_json = encode_roles(username, &roles)?;

        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, roles_json, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind(&password_hash)
        .bind(&roles_json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(r) => r,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(AuthError::UserExists(username.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(username, "registered user");
        Ok(User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            password_hash,
            roles,
        })
    }

    pub async fn find(&self, username: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, roles_json FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else {
            return Ok(None);
        };

        let username: String = r.get("username");
        let roles_json: String = r.get("roles_json");
        let roles = serde_json::from_str(&roles_json).map_err(|e| AuthError::CorruptRoles {
            username: username.clone(),
            message: e.to_string(),
        })?;

        Ok(Some(User {
            id: r.get("id"),
            username,
            password_hash: r.get("password_hash"),
            roles,
        }))
    }

    /// Check a username/password pair. Unknown users and wrong passwords
    /// produce the same error.
    pub async fn verify_credentials(&self, username: &str, password: &str) -> AuthResult<Identity> {
        let user = self
            .find(username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash).await? {
            tracing::warn!(username = %user.username, "rejected login");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(Identity {
            username: user.username,
            roles: user.roles,
        })
    }

    /// Replace a user's roles. Returns the stored role list.
    pub async fn update_roles(&self, username: &str, roles: RoleList) -> AuthResult<Vec<String>> {
        let roles = roles.into_vec();
        let roles_json = encode_roles(username, &roles)?;

        let updated = sqlx::query("UPDATE users SET roles_json = ? WHERE username = ?")
            .bind(&roles_json)
            .bind(username.trim())
            .execute(&self.pool)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(AuthError::UserNotFound(username.to_string()));
        }

        tracing::info!(username, roles = ?roles, "updated roles");
        Ok(roles)
    }

    pub async fn count(&self) -> AuthResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?)
    }
}

fn encode_roles(username: &str, roles: &[String]) -> AuthResult<String> {
    serde_json::to_string(roles).map_err(|e| AuthError::CorruptRoles {
        username: username.to_string(),
        message: e.to_string(),
    })
}
