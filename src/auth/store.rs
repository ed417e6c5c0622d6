//! User, session and credential storage.
//!
//! Handles password hashing (argon2), session creation/validation, user
//! management and WebAuthn credential rows.

use crate::db::{DbPool, DbRow};
use crate::sql;
use anyhow::{Context, Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use sqlx::Row;

/// User record
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Argon2 hash; None for accounts that only log in via OIDC.
    pub password_hash: Option<String>,
    pub email: Option<String>,
    pub active: bool,
    pub roles: Vec<String>,
    /// Base32 TOTP seed; non-null means the second factor is required.
    pub totp_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Server-side session record
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Stored WebAuthn credential (serialized passkey plus a user label).
#[derive(Debug, Clone)]
pub struct WebauthnCredentialRecord {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub credential: String,
    pub created_at: DateTime<Utc>,
}

/// Database-backed storage for users, sessions and WebAuthn credentials.
#[derive(Clone)]
pub struct UserStore {
    pool: DbPool,
}

impl UserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Hash a password using Argon2id.
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {e}"))?;
        Ok(hash.to_string())
    }

    /// Verify a password against a stored hash.
    pub fn verify_password(password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(_) => return false,
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// Generate a cryptographically secure session ID.
    fn generate_session_id() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect()
    }

    /// Create a new user. `password` may be None for OIDC-only accounts.
    pub async fn create_user(
        &self,
        username: &str,
        password: Option<&str>,
        email: Option<&str>,
        roles: &[String],
    ) -> Result<()> {
        let password_hash = password.map(Self::hash_password).transpose()?;
        let roles_json = serde_json::to_string(roles)?;
        let now = Utc::now();

        sqlx::query(sql::INSERT_USER)
            .bind(username)
            .bind(&password_hash)
            .bind(email)
            .bind(1_i64)
            .bind(&roles_json)
            .bind(None::<String>) // totp_secret
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to create user")?;

        Ok(())
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(sql::SELECT_USER_BY_USERNAME)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query user")?;

        row.map(Self::row_to_user).transpose()
    }

    pub async fn get_user_by_id(&self, user_id: i64) -> Result<Option<User>> {
        let row = sqlx::query(sql::SELECT_USER_BY_ID)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query user")?;

        row.map(Self::row_to_user).transpose()
    }

    /// Find an active user by case-insensitive email (OIDC account matching).
    pub async fn get_active_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(sql::SELECT_ACTIVE_USER_BY_EMAIL)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query user by email")?;

        row.map(Self::row_to_user).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(sql::SELECT_ALL_USERS)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?;

        rows.into_iter().map(Self::row_to_user).collect()
    }

    pub async fn update_password(&self, username: &str, new_password: &str) -> Result<()> {
        let password_hash = Self::hash_password(new_password)?;

        let result = sqlx::query(sql::UPDATE_USER_PASSWORD)
            .bind(&password_hash)
            .bind(username)
            .execute(&self.pool)
            .await
            .context("Failed to update password")?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("User not found: {username}"));
        }

        Ok(())
    }

    /// Set or clear the TOTP seed for a user.
    pub async fn set_totp_secret(&self, username: &str, secret: Option<&str>) -> Result<()> {
        let result = sqlx::query(sql::UPDATE_USER_TOTP)
            .bind(secret)
            .bind(username)
            .execute(&self.pool)
            .await
            .context("Failed to update TOTP secret")?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("User not found: {username}"));
        }

        Ok(())
    }

    pub async fn delete_user(&self, username: &str) -> Result<()> {
        let user = self
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| anyhow!("User not found: {username}"))?;

        // First delete all sessions for this user
        sqlx::query(sql::DELETE_SESSIONS_BY_USER)
            .bind(user.id)
            .execute(&self.pool)
            .await
            .context("Failed to delete user sessions")?;

        sqlx::query(sql::DELETE_USER)
            .bind(username)
            .execute(&self.pool)
            .await
            .context("Failed to delete user")?;

        Ok(())
    }

    /// Mint a fresh session for a user who just authenticated.
    ///
    /// A new id is generated every time; pre-login state never carries over
    /// into the authenticated session.
    pub async fn create_session(&self, user_id: i64, timeout_secs: u64) -> Result<String> {
        let session_id = Self::generate_session_id();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(timeout_secs as i64);

        sqlx::query(sql::INSERT_SESSION)
            .bind(&session_id)
            .bind(user_id)
            .bind(now.to_rfc3339())
            .bind(expires_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to create session")?;

        Ok(session_id)
    }

    /// Validate a session and return the associated active user.
    pub async fn validate_session(&self, session_id: &str) -> Result<Option<User>> {
        let row = sqlx::query(sql::SELECT_SESSION)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query session")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at = DateTime::parse_from_rfc3339(row.get("expires_at"))
            .context("Invalid expires_at timestamp")?
            .with_timezone(&Utc);

        if expires_at < Utc::now() {
            // Delete expired session
            self.delete_session(session_id).await.ok();
            return Ok(None);
        }

        let user_id: i64 = row.get("user_id");
        let user = self.get_user_by_id(user_id).await?;

        Ok(user.filter(|u| u.active))
    }

    /// Delete a session (logout).
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        sqlx::query(sql::DELETE_SESSION)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete session")?;

        Ok(())
    }

    /// Delete all expired sessions (background cleanup task).
    pub async fn cleanup_expired_sessions(&self) -> Result<u64> {
        let result = sqlx::query(sql::DELETE_EXPIRED_SESSIONS)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to delete expired sessions")?;

        Ok(result.rows_affected())
    }

    /// Store a new WebAuthn credential for a user.
    pub async fn add_webauthn_credential(
        &self,
        user_id: i64,
        name: &str,
        credential: &str,
    ) -> Result<()> {
        sqlx::query(sql::INSERT_WEBAUTHN_CREDENTIAL)
            .bind(user_id)
            .bind(name)
            .bind(credential)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to store webauthn credential")?;

        Ok(())
    }

    pub async fn webauthn_credentials(&self, user_id: i64) -> Result<Vec<WebauthnCredentialRecord>> {
        let rows = sqlx::query(sql::SELECT_WEBAUTHN_CREDENTIALS_BY_USER)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list webauthn credentials")?;

        rows.into_iter()
            .map(|row| {
                Ok(WebauthnCredentialRecord {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    name: row.get("name"),
                    credential: row.get("credential"),
                    created_at: DateTime::parse_from_rfc3339(row.get("created_at"))
                        .context("Invalid created_at timestamp")?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }

    /// Replace the serialized credential (signature counter updates).
    pub async fn update_webauthn_credential(&self, credential_id: i64, credential: &str) -> Result<()> {
        sqlx::query(sql::UPDATE_WEBAUTHN_CREDENTIAL)
            .bind(credential)
            .bind(credential_id)
            .execute(&self.pool)
            .await
            .context("Failed to update webauthn credential")?;

        Ok(())
    }

    /// Delete a credential owned by the given user. Returns false when no
    /// matching row existed.
    pub async fn delete_webauthn_credential(&self, credential_id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query(sql::DELETE_WEBAUTHN_CREDENTIAL)
            .bind(credential_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete webauthn credential")?;

        Ok(result.rows_affected() > 0)
    }

    fn row_to_user(row: DbRow) -> Result<User> {
        let roles_json: String = row.get("roles");
        let roles: Vec<String> =
            serde_json::from_str(&roles_json).context("Invalid roles column")?;
        let active: i64 = row.get("active");

        Ok(User {
            id: row.get("id"),
            username: row.get("username"),
            password_hash: row.get("password_hash"),
            email: row.get("email"),
            active: active != 0,
            roles,
            totp_secret: row.get("totp_secret"),
            created_at: DateTime::parse_from_rfc3339(row.get("created_at"))
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hashing() {
        let password = "test_password_123";
        let hash = UserStore::hash_password(password).unwrap();

        // Hash should be different from password
        assert_ne!(hash, password);

        // Should verify correctly
        assert!(UserStore::verify_password(password, &hash));

        // Wrong password should fail
        assert!(!UserStore::verify_password("wrong_password", &hash));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(!UserStore::verify_password("anything", "not-a-phc-string"));
    }
}
