use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::extractor::AuthUser;

/// Record an audit event for a mutation performed by `actor`. Handlers call
/// this after the change is committed; a failed write is logged, never returned.
pub async fn record(
    pool: &PgPool,
    actor: &AuthUser,
    action: &str,
    resource_type: &str,
    resource_id: Option<Uuid>,
    details: Option<serde_json::Value>,
) {
    log_event(
        pool,
        actor.company_id,
        Some(actor.user_id),
        action,
        resource_type,
        resource_id,
        details,
    )
    .await;
}

pub async fn log_event(
    pool: &PgPool,
    company_id: Option<Uuid>,
    user_id: Option<Uuid>,
    action: &str,
    resource_type: &str,
    resource_id: Option<Uuid>,
    details: Option<serde_json::Value>,
) {
    if let Err(e) = crate::db::audit::log_event(
        pool,
        company_id,
        user_id,
        action,
        resource_type,
        resource_id,
        details,
    )
    .await
    {
        tracing::error!(action, resource_type, "Failed to log audit event: {e}");
    }
}
