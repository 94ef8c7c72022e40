use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::extractor::{AuthUser, ACCESS_COOKIE};
use crate::auth::jwt::{encode_token, Claims};
use crate::auth::password;
use crate::config::Config;
use crate::db;
use crate::error::AppError;
use crate::extract::JsonBody;
use crate::middleware::audit;
use crate::models::UserView;
use crate::schemas::user::LoginRequest;
use crate::state::{AppState, SharedState};

pub const REFRESH_COOKIE: &str = "refresh_token";

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RefreshRequest {
    refresh_token: Option<String>,
}

/// A freshly issued access/refresh token pair.
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
}

impl Session {
    pub fn cookies(&self, config: &Config) -> CookieJar {
        let access = Cookie::build((ACCESS_COOKIE, self.access_token.clone()))
            .path("/")
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::minutes(config.access_token_ttl_minutes))
            .build();

        let refresh = Cookie::build((REFRESH_COOKIE, self.refresh_token.clone()))
            .path("/api/v1/auth")
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Strict)
            .max_age(time::Duration::days(config.refresh_token_ttl_days))
            .build();

        CookieJar::new().add(access).add(refresh)
    }

    pub fn body(&self, config: &Config) -> Value {
        json!({
            "access_token": self.access_token,
            "refresh_token": self.refresh_token,
            "token_type": "Bearer",
            "expires_in": config.access_token_ttl_minutes * 60,
        })
    }
}

fn clear_auth_cookies() -> CookieJar {
    let access = Cookie::build((ACCESS_COOKIE, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();
    let refresh = Cookie::build((REFRESH_COOKIE, ""))
        .path("/api/v1/auth")
        .max_age(time::Duration::ZERO)
        .build();
    CookieJar::new().add(access).add(refresh)
}

fn generate_refresh_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub async fn issue_session(state: &AppState, user_id: Uuid) -> Result<Session, AppError> {
    let claims = Claims::access(user_id, state.config.access_token_ttl_minutes);
    let access_token =
        encode_token(&claims, &state.config.jwt_secret).map_err(AppError::Internal)?;

    let refresh_token = generate_refresh_token();
    db::refresh_tokens::issue(
        &state.pool,
        user_id,
        &hash_token(&refresh_token),
        Utc::now() + Duration::days(state.config.refresh_token_ttl_days),
    )
    .await?;

    Ok(Session {
        access_token,
        refresh_token,
    })
}

/// Refresh token from the cookie, else from an optional `{"refresh_token": ...}` body.
fn presented_refresh_token(jar: &CookieJar, body: &Bytes) -> Result<Option<String>, AppError> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        return Ok(Some(cookie.value().to_string()));
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let req: RefreshRequest = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?;
    Ok(req.refresh_token)
}

pub async fn login(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let (email, password) = req.validate()?;

    if let Err(retry_after) = state.login_limiter.check(&email) {
        tracing::warn!(%email, "Login blocked by rate limiter");
        return Err(AppError::RateLimited(format!(
            "Too many login attempts. Try again in {retry_after} seconds."
        )));
    }

    let Some(user) = db::users::find_by_email(&state.pool, &email).await? else {
        state.login_limiter.record_failure(&email);
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    };

    let valid = password::verify(&password, &user.password_hash).map_err(AppError::Internal)?;
    if !valid {
        state.login_limiter.record_failure(&email);
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    if !user.is_active {
        return Err(AppError::Forbidden("User account is disabled".to_string()));
    }

    state.login_limiter.reset(&email);
    db::users::touch_last_login(&state.pool, user.id).await?;

    let session = issue_session(&state, user.id).await?;

    audit::log_event(
        &state.pool,
        user.company_id,
        Some(user.id),
        "user.login",
        "user",
        Some(user.id),
        None,
    )
    .await;

    let detail = db::users::find_detail_by_id(&state.pool, user.id)
        .await?
        .ok_or_else(|| AppError::Internal("User vanished during login".to_string()))?;

    let mut body = session.body(&state.config);
    body["user"] = json!(detail);
    Ok((session.cookies(&state.config), Json(body)))
}

pub async fn refresh(
    State(state): State<SharedState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let presented = presented_refresh_token(&jar, &body)?
        .ok_or_else(|| AppError::Unauthorized("Missing refresh token".to_string()))?;

    let stored = db::refresh_tokens::find_by_hash(&state.pool, &hash_token(&presented))
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;

    if stored.used || !db::refresh_tokens::claim(&state.pool, stored.id).await? {
        tracing::warn!(
            user_id = %stored.user_id,
            "Refresh token reuse detected, revoking all sessions"
        );
        db::refresh_tokens::revoke_all_for_user(&state.pool, stored.user_id).await?;
        return Err(AppError::Unauthorized(
            "Refresh token reuse detected. All sessions revoked.".to_string(),
        ));
    }

    if stored.expires_at < Utc::now() {
        return Err(AppError::Unauthorized("Refresh token expired".to_string()));
    }

    let user = db::users::find_by_id(&state.pool, stored.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Unauthorized("User not found or disabled".to_string()))?;

    let session = issue_session(&state, user.id).await?;
    Ok((session.cookies(&state.config), Json(session.body(&state.config))))
}

pub async fn logout(
    State(state): State<SharedState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<Value>), AppError> {
    if let Some(token) = presented_refresh_token(&jar, &body)? {
        db::refresh_tokens::revoke(&state.pool, &hash_token(&token)).await?;
    }

    Ok((
        clear_auth_cookies(),
        Json(json!({ "message": "Logged out successfully" })),
    ))
}

pub async fn me(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<Json<Value>, AppError> {
    let user = db::users::find_detail_by_id(&state.pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    let permissions = match auth.role_id.filter(|_| user.has_active_role()) {
        Some(role_id) => db::permissions::active_names_by_role(&state.pool, &[role_id])
            .await?
            .remove(&role_id)
            .unwrap_or_default(),
        None => Vec::new(),
    };

    Ok(Json(json!({
        "user": UserView { user, permissions: Some(permissions) },
        "tier": auth.tier,
    })))
}
