use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::SharedState;

const SERVICE: &str = "edoras";

pub async fn liveness() -> &'static str {
    "ok"
}

pub async fn status() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    }))
}

/// Includes a database round trip; 503 when it fails.
pub async fn detailed(State(state): State<SharedState>) -> (StatusCode, Json<Value>) {
    let database = match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => json!({ "status": "healthy" }),
        Err(e) => {
            tracing::error!("Health check database probe failed: {e}");
            json!({ "status": "unhealthy", "error": "database unreachable" })
        }
    };
    let healthy = database["status"] == "healthy";

    let body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "service": SERVICE,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
        "checks": {
            "database": database,
            "pool": {
                "size": state.pool.size(),
                "idle": state.pool.num_idle(),
            },
        },
    });
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}
