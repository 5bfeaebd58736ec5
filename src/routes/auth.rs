/// Authentication Routes
///
/// Handles user registration, login, token refresh, logout, and current
/// user information.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{hash_password, AccessClaims, SessionManager, SessionUser};
use crate::error::{AppError, ErrorContext};
use crate::validators::{is_valid_email, is_valid_name, is_valid_username};

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub name: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Token refresh request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout request
#[derive(Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// Authentication response with access and refresh tokens
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Login response: the token pair plus the public user projection
#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: SessionUser,
}

/// User information response
#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub created_at: String,
}

/// POST /auth/register
///
/// Register a new user with username, email, password, and name.
/// Returns access token and refresh token on success.
///
/// # Validation
/// - Username must be a 3-32 character identifier and not already taken
/// - Email must be valid format and not already registered
/// - Password must be 8+ chars with digit, lowercase, and uppercase
/// - Name must be valid (non-empty, no suspicious content)
///
/// # Errors
/// - 400: Validation errors (invalid username/email/password/name)
/// - 409: Username or email already registered (duplicate)
/// - 500: Internal server error
pub async fn register(
    form: web::Json<RegisterRequest>,
    pool: web::Data<PgPool>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    // Validate inputs
    let username = is_valid_username(&form.username)?;
    let email = is_valid_email(&form.email)?;
    let name = is_valid_name(&form.name)?;
    let password_hash = hash_password(&form.password)?;

    // Create user in database
    let user_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO users (id, username, email, name, password_hash, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, 'USER', $6, $7)
        "#,
    )
    .bind(user_id)
    .bind(&username)
    .bind(&email)
    .bind(&name)
    .bind(&password_hash)
    .bind(Utc::now())
    .bind(Utc::now())
    .execute(pool.get_ref())
    .await?;

    // Open the first session for the new account
    let tokens = sessions.open_session(&user_id, &username, "USER").await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        "User registered successfully"
    );

    Ok(HttpResponse::Created().json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: sessions.settings().access_token_expiry,
    }))
}

/// POST /auth/login
///
/// Authenticate user with username and password.
/// Returns access token, refresh token, and the public user projection.
///
/// # Errors
/// - 401: Invalid credentials (username not found or wrong password)
/// - 500: Internal server error
///
/// # Security Notes
/// - Uses same error message for "not found" and "wrong password"
/// - Prevents user enumeration attacks
pub async fn login(
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let (tokens, user) = sessions.login(&form.username, &form.password).await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "Login handled"
    );

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: sessions.settings().access_token_expiry,
        user,
    }))
}

/// POST /auth/refresh
///
/// Exchange a refresh token for a new access/refresh pair.
/// Implements token rotation: the presented token is revoked before its
/// successor is issued, so every refresh token is redeemable at most once.
///
/// # Token Rotation Security
/// - A replayed token (already rotated or revoked) is rejected with the
///   same 401 as a forged or expired one
/// - Two concurrent refreshes of one token: exactly one succeeds
///
/// # Errors
/// - 401: Invalid, expired, revoked, or already-rotated refresh token
/// - 500: Internal server error
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let tokens = sessions.refresh(&form.refresh_token).await?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: sessions.settings().access_token_expiry,
    }))
}

/// POST /auth/logout
///
/// Revoke the presented refresh token. Always returns 204: a malformed or
/// already-dead token is already unusable, which is what logout is for,
/// and there is nothing actionable a client could do with a logout error.
pub async fn logout(
    form: web::Json<LogoutRequest>,
    sessions: web::Data<SessionManager>,
) -> HttpResponse {
    sessions.logout(&form.refresh_token).await;

    HttpResponse::NoContent().finish()
}

/// POST /api/logout_all
///
/// Revoke every active refresh token of the authenticated user.
/// **Requires valid access token** in Authorization header.
///
/// # Errors
/// - 401: Missing or invalid token (handled by middleware)
/// - 500: Internal server error
pub async fn logout_all(
    claims: web::ReqData<AccessClaims>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    sessions.logout_all(user_id).await?;

    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/me
///
/// Get current authenticated user's information.
/// **Requires valid access token** in Authorization header.
///
/// # Authentication
/// - Requires: `Authorization: Bearer <access_token>`
/// - Claims are injected by JWT middleware
///
/// # Errors
/// - 401: Missing or invalid token (handled by middleware)
/// - 404: User not found (should not happen if token is valid)
/// - 500: Internal server error
pub async fn get_current_user(
    claims: web::ReqData<AccessClaims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    let user = sqlx::query_as::<_, (Uuid, String, String, String, String, chrono::DateTime<Utc>)>(
        "SELECT id, username, email, name, role, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(UserResponse {
        id: user.0.to_string(),
        username: user.1,
        email: user.2,
        name: user.3,
        role: user.4,
        created_at: user.5.to_rfc3339(),
    }))
}
