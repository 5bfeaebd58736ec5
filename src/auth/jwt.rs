/// Token Codec
///
/// Signs and verifies the two token families. Access and refresh tokens
/// use independent secrets so that leaking one secret lets an attacker
/// forge at most that token family, never mint the other.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, RefreshClaims};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

const NONCE_LENGTH: usize = 32;

/// Generate the random alphanumeric nonce embedded in refresh tokens
fn generate_nonce() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

/// Sign a new access token for a user
///
/// # Errors
/// Returns error if token generation fails
pub fn issue_access_token(
    user_id: &Uuid,
    username: &str,
    role: &str,
    config: &JwtSettings,
) -> Result<String, AppError> {
    let claims = AccessClaims::new(
        *user_id,
        username.to_string(),
        role.to_string(),
        config.access_token_expiry,
        config.issuer.clone(),
    );

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.access_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Sign a new refresh token for a user, using the refresh-token secret
///
/// # Errors
/// Returns error if token generation fails
pub fn issue_refresh_token(user_id: &Uuid, config: &JwtSettings) -> Result<String, AppError> {
    let claims = RefreshClaims::new(
        *user_id,
        generate_nonce(),
        config.refresh_token_expiry,
        config.issuer.clone(),
    );

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.refresh_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Validate and extract claims from an access token
///
/// # Errors
/// Returns error if token is invalid, expired, or tampered with
pub fn verify_access_token(token: &str, config: &JwtSettings) -> Result<AccessClaims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Verify issuer matches configuration
    validation.set_issuer(&[&config.issuer]);

    decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(config.access_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(map_jwt_error)
}

/// Validate and extract claims from a refresh token
///
/// # Errors
/// Returns error if token is invalid, expired, or tampered with
pub fn verify_refresh_token(token: &str, config: &JwtSettings) -> Result<RefreshClaims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);

    decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(config.refresh_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(map_jwt_error)
}

/// Decode refresh claims without any signature or expiry check
///
/// Used only to locate candidate ledger rows during logout, where an
/// expired or foreign-signed token must still be revocable. The result
/// MUST NOT be treated as proof of authenticity.
pub fn decode_refresh_unverified(token: &str) -> Result<RefreshClaims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;

    decode::<RefreshClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::Auth(AuthError::TokenInvalid))
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> AppError {
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::Auth(AuthError::TokenExpired)
        }
        _ => {
            tracing::warn!("JWT validation error: {}", e);
            AppError::Auth(AuthError::TokenInvalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_config() -> JwtSettings {
        JwtSettings {
            access_secret: "test-access-secret-at-least-32-chars-long".to_string(),
            refresh_secret: "test-refresh-secret-at-least-32-chars-lo".to_string(),
            access_token_expiry: 3600,
            refresh_token_expiry: 604800,
            issuer: "test".to_string(),
        }
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();

        let token = issue_access_token(&user_id, "john_doe", "USER", &config)
            .expect("Failed to generate token");
        let claims = verify_access_token(&token, &config).expect("Failed to validate token");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.username, "john_doe");
        assert_eq!(claims.role, "USER");
        assert_eq!(claims.iss, "test");
    }

    #[test]
    fn test_issue_and_verify_refresh_token() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();

        let token = issue_refresh_token(&user_id, &config).expect("Failed to generate token");
        let claims = verify_refresh_token(&token, &config).expect("Failed to validate token");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.nonce.len(), NONCE_LENGTH);
    }

    #[test]
    fn test_refresh_tokens_are_unique() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();

        let token1 = issue_refresh_token(&user_id, &config).unwrap();
        let token2 = issue_refresh_token(&user_id, &config).unwrap();

        // Same user, same instant: the nonce still separates them
        assert_ne!(token1, token2);
    }

    #[test]
    fn test_invalid_token() {
        let config = get_test_config();
        let result = verify_access_token("invalid.token.here", &config);

        assert!(result.is_err());
    }

    #[test]
    fn test_tampered_token() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();

        let token =
            issue_access_token(&user_id, "john_doe", "USER", &config).expect("Failed to generate");

        let tampered = format!("{}X", token);
        let result = verify_access_token(&tampered, &config);

        assert!(result.is_err());
    }

    #[test]
    fn test_secrets_are_independent() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();

        let refresh = issue_refresh_token(&user_id, &config).unwrap();
        let access = issue_access_token(&user_id, "john_doe", "USER", &config).unwrap();

        // A token from one family never verifies against the other secret
        assert!(verify_access_token(&refresh, &config).is_err());
        assert!(verify_refresh_token(&access, &config).is_err());
    }

    #[test]
    fn test_wrong_issuer() {
        let mut config = get_test_config();
        let user_id = Uuid::new_v4();

        let token =
            issue_access_token(&user_id, "john_doe", "USER", &config).expect("Failed to generate");

        config.issuer = "wrong-issuer".to_string();
        let result = verify_access_token(&token, &config);

        assert!(result.is_err());
    }

    #[test]
    fn test_expired_token_reports_expiry() {
        let mut config = get_test_config();
        config.access_token_expiry = -120;
        let user_id = Uuid::new_v4();

        let token =
            issue_access_token(&user_id, "john_doe", "USER", &config).expect("Failed to generate");
        let result = verify_access_token(&token, &config);

        match result {
            Err(AppError::Auth(AuthError::TokenExpired)) => (),
            other => panic!("Expected TokenExpired, got {:?}", other),
        }
    }

    #[test]
    fn test_unverified_decode_ignores_expiry_and_signature() {
        let mut config = get_test_config();
        config.refresh_token_expiry = -120;
        let user_id = Uuid::new_v4();

        let token = issue_refresh_token(&user_id, &config).expect("Failed to generate");

        // Expired and verified against no secret at all: still decodable
        let claims = decode_refresh_unverified(&token).expect("Failed to decode");
        assert_eq!(claims.sub, user_id.to_string());
    }

    #[test]
    fn test_unverified_decode_rejects_garbage() {
        assert!(decode_refresh_unverified("not-a-token").is_err());
    }
}
