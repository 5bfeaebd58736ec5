/// Session Manager
///
/// Orchestrates the session token lifecycle: login issues a token pair
/// and a ledger row, refresh rotates the pair (the presented token is
/// single-use), logout revokes best-effort, identity verifies an access
/// token without touching storage.
///
/// Holds no in-process mutable state; everything durable lives in the
/// ledger, so instances can be cloned freely across workers.

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::claims::AccessClaims;
use crate::auth::jwt::{
    decode_refresh_unverified, issue_access_token, issue_refresh_token, verify_access_token,
    verify_refresh_token,
};
use crate::auth::ledger::{
    hash_token, insert_refresh_token, list_active_for_user, revoke_all_for_user, revoke_if_active,
};
use crate::auth::password::verify_password;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// A freshly issued access/refresh pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Public projection of a user, safe to return to clients
#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub id: String,
    pub username: String,
    pub name: String,
    pub role: String,
}

#[derive(Clone)]
pub struct SessionManager {
    pool: PgPool,
    settings: JwtSettings,
}

impl SessionManager {
    pub fn new(pool: PgPool, settings: JwtSettings) -> Self {
        Self { pool, settings }
    }

    pub fn settings(&self) -> &JwtSettings {
        &self.settings
    }

    /// Authenticate a user and open a new session
    ///
    /// # Security Notes
    /// - Unknown username and wrong password collapse into the same
    ///   error, preventing user enumeration
    /// - Never returns the password hash
    ///
    /// # Errors
    /// - `InvalidCredentials` on mismatch
    /// - `Database` if the credential store or ledger fails
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(TokenPair, SessionUser), AppError> {
        let row = sqlx::query_as::<_, (Uuid, String, String, String, String)>(
            "SELECT id, username, name, role, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        let (user_id, username, name, role, password_hash) =
            row.ok_or(AppError::Auth(AuthError::InvalidCredentials))?;

        if !verify_password(password, &password_hash)? {
            return Err(AppError::Auth(AuthError::InvalidCredentials));
        }

        let tokens = self.open_session(&user_id, &username, &role).await?;

        tracing::info!(user_id = %user_id, "User logged in successfully");

        Ok((
            tokens,
            SessionUser {
                id: user_id.to_string(),
                username,
                name,
                role,
            },
        ))
    }

    /// Issue a token pair and persist the refresh token's ledger row
    ///
    /// The caller must already have authenticated the user.
    pub async fn open_session(
        &self,
        user_id: &Uuid,
        username: &str,
        role: &str,
    ) -> Result<TokenPair, AppError> {
        let access_token = issue_access_token(user_id, username, role, &self.settings)?;
        let refresh_token = issue_refresh_token(user_id, &self.settings)?;

        let expires_at = Utc::now() + Duration::seconds(self.settings.refresh_token_expiry);
        insert_refresh_token(&self.pool, *user_id, &hash_token(&refresh_token), expires_at)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Rotate a refresh token: authenticate it, destroy it, issue its successor
    ///
    /// Order is fixed: verify -> lookup -> revoke -> insert. A presented
    /// token that fails cryptographic verification never touches the
    /// ledger. The revoke step is the guarded UPDATE in the ledger, so of
    /// two calls racing on the same token exactly one mints a successor;
    /// the other sees the row already revoked and fails like any replay.
    ///
    /// # Errors
    /// - `TokenExpired` / `TokenInvalid` (both surface as the same 401)
    ///   for bad signature, expiry, replay, or a lost race
    /// - `Database` if the ledger fails
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair, AppError> {
        let claims = verify_refresh_token(presented, &self.settings)?;
        let user_id = claims.user_id()?;

        let records = list_active_for_user(&self.pool, user_id).await?;
        let presented_hash = hash_token(presented);

        // Replay detection point: a rotated-out or revoked token no
        // longer has an active row, so its hash matches nothing here.
        let record = records
            .iter()
            .find(|r| r.token_hash == presented_hash)
            .ok_or_else(|| {
                tracing::warn!(user_id = %user_id, "Refresh token not found among active records");
                AppError::Auth(AuthError::TokenInvalid)
            })?;

        let now = Utc::now();
        if record.expires_at <= now {
            tracing::info!(user_id = %user_id, "Refresh token expired");
            return Err(AppError::Auth(AuthError::TokenExpired));
        }

        // Single-use: only the caller that flips revoked_at proceeds
        if !revoke_if_active(&self.pool, record.id, now).await? {
            tracing::warn!(user_id = %user_id, "Refresh token lost a rotation race");
            return Err(AppError::Auth(AuthError::TokenInvalid));
        }

        let user = sqlx::query_as::<_, (String, String)>(
            "SELECT username, role FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::Auth(AuthError::TokenInvalid))?;

        let tokens = self.open_session(&user_id, &user.0, &user.1).await?;

        tracing::info!(user_id = %user_id, "Token refreshed successfully");

        Ok(tokens)
    }

    /// Revoke the presented refresh token, best-effort
    ///
    /// Never fails: a malformed, expired, or unknown token already cannot
    /// be used, which is the outcome logout exists to guarantee. Storage
    /// failures are logged and swallowed.
    pub async fn logout(&self, presented: &str) {
        let claims = match decode_refresh_unverified(presented) {
            Ok(claims) => claims,
            Err(_) => return,
        };
        let user_id = match claims.user_id() {
            Ok(user_id) => user_id,
            Err(_) => return,
        };

        let records = match list_active_for_user(&self.pool, user_id).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Logout could not read the token ledger");
                return;
            }
        };

        let presented_hash = hash_token(presented);
        if let Some(record) = records.iter().find(|r| r.token_hash == presented_hash) {
            match revoke_if_active(&self.pool, record.id, Utc::now()).await {
                Ok(_) => {
                    tracing::info!(user_id = %user_id, "Refresh token revoked on logout");
                }
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Logout could not revoke the presented token");
                }
            }
        }
    }

    /// Revoke every active refresh token a user holds
    ///
    /// # Errors
    /// Returns error if the ledger fails
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = revoke_all_for_user(&self.pool, user_id, Utc::now()).await?;
        tracing::info!(user_id = %user_id, revoked, "All refresh tokens revoked for user");
        Ok(revoked)
    }

    /// Verify an access token and return its claims
    ///
    /// Pure cryptographic verification; no ledger lookup. Access tokens
    /// stay valid until their own short expiry even after a logout.
    pub fn identity(&self, access_token: &str) -> Result<AccessClaims, AppError> {
        verify_access_token(access_token, &self.settings)
    }
}
