use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::db::audit::AuditFilter;
use crate::error::AppError;
use crate::extract::QueryParams;
use crate::pagination::{PageMeta, PageRequest};
use crate::policy::{Action, Target};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct AuditListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

pub async fn list(
    State(state): State<SharedState>,
    auth: AuthUser,
    QueryParams(query): QueryParams<AuditListQuery>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Read, Target::AuditLog)?;
    let page = PageRequest::new(query.page, query.per_page)?;
    let filter = AuditFilter {
        resource_type: query.resource_type.filter(|s| !s.trim().is_empty()),
        resource_id: query.resource_id,
        user_id: query.user_id,
    };

    let (events, total) = db::audit::list(&state.pool, &filter, page).await?;
    Ok(Json(json!({
        "events": events,
        "pagination": PageMeta::new(page, total),
    })))
}
