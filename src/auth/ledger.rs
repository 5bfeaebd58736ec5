/// Refresh Token Ledger
///
/// Durable record of issued refresh tokens in the `auth_tokens` table.
/// Tokens are:
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - Queried by owning user; matching a presented token is a linear
///   hash-compare over that user's active rows
/// - Revoked through a single guarded UPDATE, so two concurrent
///   rotations of the same token cannot both succeed
/// - Never deleted (revoked rows are kept for replay detection)

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// One issued refresh token, as persisted
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    /// Null while the token is live; set once, never cleared
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Hash a refresh token using SHA-256
///
/// Never store plaintext tokens in the database.
pub fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Insert a new ledger row for a freshly issued refresh token
///
/// # Errors
/// Returns error if the database operation fails
pub async fn insert_refresh_token(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<RefreshTokenRecord, AppError> {
    let record = sqlx::query_as::<_, RefreshTokenRecord>(
        r#"
        INSERT INTO auth_tokens (id, user_id, token_hash, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, user_id, token_hash, expires_at, revoked_at, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// List a user's non-revoked ledger rows
///
/// Expired-but-unrevoked rows ARE included; expiry is the caller's check
/// against `expires_at`. The ledger only answers "not revoked".
pub async fn list_active_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<RefreshTokenRecord>, AppError> {
    let records = sqlx::query_as::<_, RefreshTokenRecord>(
        r#"
        SELECT id, user_id, token_hash, expires_at, revoked_at, created_at
        FROM auth_tokens
        WHERE user_id = $1 AND revoked_at IS NULL
        ORDER BY created_at
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Revoke a ledger row, but only if it is still active
///
/// The `revoked_at IS NULL` guard makes this a compare-and-revoke: of two
/// callers racing on the same row, exactly one observes `true`. Calling
/// it on an already-revoked row is a no-op returning `false`.
///
/// # Errors
/// Returns error if the database operation fails
pub async fn revoke_if_active(
    pool: &PgPool,
    record_id: Uuid,
    at: DateTime<Utc>,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE auth_tokens
        SET revoked_at = $1
        WHERE id = $2 AND revoked_at IS NULL
        "#,
    )
    .bind(at)
    .bind(record_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Revoke all active refresh tokens for a user
///
/// Used for logout-all-devices functionality.
///
/// # Errors
/// Returns error if the database operation fails
pub async fn revoke_all_for_user(
    pool: &PgPool,
    user_id: Uuid,
    at: DateTime<Utc>,
) -> Result<u64, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE auth_tokens
        SET revoked_at = $1
        WHERE user_id = $2 AND revoked_at IS NULL
        "#,
    )
    .bind(at)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_hashing_is_deterministic() {
        let token = "some.signed.token";
        let hash1 = hash_token(token);
        let hash2 = hash_token(token);

        // Same token should produce same hash
        assert_eq!(hash1, hash2);
        // Hash should not equal plaintext
        assert_ne!(token, hash1);
        // Hash should be 64 chars (SHA-256 hex)
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_tokens_different_hashes() {
        let hash1 = hash_token("token-one");
        let hash2 = hash_token("token-two");

        assert_ne!(hash1, hash2);
    }
}
