use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::auth::jwt;
use crate::db;
use crate::error::AppError;
use crate::policy::{self, Action, Target, Tier};
use crate::state::SharedState;

pub const ACCESS_COOKIE: &str = "access_token";

/// The authenticated caller. Company, role and tier are read from the
/// database on each request so deactivations and role changes apply at once.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub company_id: Option<Uuid>,
    pub role_id: Option<Uuid>,
    pub access_level: i32,
    pub tier: Tier,
}

impl AuthUser {
    pub fn authorize(&self, action: Action, target: Target) -> Result<(), AppError> {
        policy::decide(self, action, target).into_result()
    }
}

fn bearer_token(parts: &Parts) -> Result<Option<String>, AppError> {
    if let Some(auth_header) = parts.headers.get("authorization") {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid authorization header".to_string()))?;
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Ok(Some(token.trim().to_string()));
        }
    }

    let jar = CookieJar::from_headers(&parts.headers);
    Ok(jar.get(ACCESS_COOKIE).map(|c| c.value().to_string()))
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?
            .ok_or_else(|| AppError::Unauthorized("Missing authentication token".to_string()))?;

        let claims = jwt::decode_token(&token, &state.config.jwt_secret)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

        let user = db::users::find_detail_by_id(&state.pool, claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

        if !user.user.is_active {
            return Err(AppError::Unauthorized("User account is disabled".to_string()));
        }

        let level = user.has_active_role().then_some(user.access_level);
        Ok(AuthUser {
            user_id: user.user.id,
            company_id: user.user.company_id,
            role_id: user.user.role_id,
            access_level: user.access_level,
            tier: Tier::from_access_level(level),
        })
    }
}
