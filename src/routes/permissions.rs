use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use sqlx::{Connection, PgConnection};
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::db::permissions::PermissionFilter;
use crate::error::{conflict_on_unique, unique_violation_constraint, AppError};
use crate::extract::{JsonBody, PathParam, QueryParams};
use crate::middleware::audit;
use crate::models::{Permission, PermissionDetail};
use crate::pagination::{search_term, PageMeta, PageRequest};
use crate::policy::{Action, Target};
use crate::schemas::permission::{
    BulkCreatePermissions, BulkUpdatePermissions, CreatePermission, PermissionListQuery,
    UpdatePermission,
};
use crate::state::{AppState, SharedState};
use crate::validation::FieldErrors;

const DUPLICATE_MESSAGE: &str = "Permission already exists for this role";

async fn load_permission(state: &AppState, id: Uuid) -> Result<Permission, AppError> {
    db::permissions::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Permission not found".to_string()))
}

fn with_role_info(detail: &PermissionDetail) -> Value {
    let mut value = json!(detail);
    value["role_info"] = detail.role_info();
    value
}

fn errors_or_null(errors: Vec<Value>) -> Value {
    if errors.is_empty() {
        Value::Null
    } else {
        Value::Array(errors)
    }
}

pub async fn list(
    State(state): State<SharedState>,
    auth: AuthUser,
    QueryParams(query): QueryParams<PermissionListQuery>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Read, Target::Permissions)?;
    let page = PageRequest::new(query.page, query.per_page)?;
    query.validate_category()?;
    let filter = PermissionFilter {
        search: search_term(query.search.as_deref())?,
        category: query.category.clone(),
        role_id: query.role_id,
        is_active: query.is_active,
    };

    let (permissions, total) = db::permissions::list(&state.pool, &filter, page).await?;
    let permissions: Vec<Value> = permissions
        .iter()
        .map(|p| {
            if query.include_role_info {
                with_role_info(p)
            } else {
                json!(p)
            }
        })
        .collect();

    Ok(Json(json!({
        "permissions": permissions,
        "pagination": PageMeta::new(page, total),
        "filters_applied": {
            "search": filter.search,
            "category": filter.category,
            "role_id": filter.role_id,
            "is_active": filter.is_active,
            "include_role_info": query.include_role_info,
        },
    })))
}

pub async fn get(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Read, Target::Permissions)?;
    let detail = db::permissions::find_detail(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Permission not found".to_string()))?;
    Ok(Json(json!({ "permission": with_role_info(&detail) })))
}

pub async fn stats(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Read, Target::Permissions)?;
    Ok(Json(json!(db::permissions::stats(&state.pool).await?)))
}

pub async fn categories(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Read, Target::Permissions)?;
    let categories = db::permissions::category_counts(&state.pool).await?;
    Ok(Json(json!({
        "total_categories": categories.len(),
        "categories": categories,
    })))
}

pub async fn create(
    State(state): State<SharedState>,
    auth: AuthUser,
    JsonBody(body): JsonBody<CreatePermission>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    auth.authorize(Action::Create, Target::Permissions)?;
    let new = body.validate()?;

    db::roles::find_active(&state.pool, new.role_id)
        .await?
        .ok_or_else(|| FieldErrors::single("role_id", "Role not found or inactive."))?;
    if let Some(existing) =
        db::permissions::find_by_role_and_name(&state.pool, new.role_id, &new.name).await?
    {
        return Err(AppError::Conflict(format!(
            "Permission \"{}\" already exists for this role",
            existing.name
        )));
    }

    let permission = db::permissions::create(&state.pool, &new)
        .await
        .map_err(conflict_on_unique(DUPLICATE_MESSAGE))?;

    audit::record(
        &state.pool,
        &auth,
        "permission.created",
        "permission",
        Some(permission.id),
        Some(json!({ "name": permission.name, "role_id": permission.role_id })),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Permission created successfully", "permission": permission })),
    ))
}

pub async fn update(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(changes): JsonBody<UpdatePermission>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Update, Target::Permissions)?;
    let permission = load_permission(&state, id).await?;
    changes.validate()?;

    let protected = changes.protected_changes(&permission);
    if !protected.is_empty() {
        return Err(AppError::Forbidden(format!(
            "Cannot change {} of system permission {}",
            protected.join(", "),
            permission.name
        )));
    }

    let updated = db::permissions::update(&state.pool, id, &changes)
        .await
        .map_err(conflict_on_unique(DUPLICATE_MESSAGE))?;

    audit::record(&state.pool, &auth, "permission.updated", "permission", Some(id), None).await;

    Ok(Json(json!({ "message": "Permission updated successfully", "permission": updated })))
}

pub async fn delete(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Delete, Target::Permissions)?;
    let permission = load_permission(&state, id).await?;

    if permission.is_system() {
        return Err(AppError::Forbidden(format!(
            "Cannot delete system permission {}",
            permission.name
        )));
    }

    db::permissions::soft_delete(&state.pool, id).await?;
    audit::record(
        &state.pool,
        &auth,
        "permission.deleted",
        "permission",
        Some(id),
        Some(json!({ "name": permission.name })),
    )
    .await;

    Ok(Json(json!({
        "message": "Permission deleted successfully",
        "permission_name": permission.name,
        "permission_display_name": permission.display_name,
    })))
}

pub async fn activate(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Activate, Target::Permissions)?;
    let permission = load_permission(&state, id).await?;

    if permission.is_active {
        return Ok(Json(json!({
            "message": "Permission is already active",
            "permission": permission,
        })));
    }

    let permission = db::permissions::activate(&state.pool, id).await?;
    audit::record(&state.pool, &auth, "permission.activated", "permission", Some(id), None).await;

    Ok(Json(json!({ "message": "Permission activated successfully", "permission": permission })))
}

/// Validates and inserts one bulk item under its own savepoint.
/// The inner error describes why this item failed; the outer one aborts the batch.
async fn create_item(
    conn: &mut PgConnection,
    item: Value,
) -> Result<Result<Permission, Value>, AppError> {
    let new = match serde_json::from_value::<CreatePermission>(item) {
        Ok(parsed) => match parsed.validate() {
            Ok(new) => new,
            Err(errors) => return Ok(Err(json!(errors))),
        },
        Err(e) => return Ok(Err(json!(e.to_string()))),
    };

    if db::roles::find_active(&mut *conn, new.role_id).await?.is_none() {
        return Ok(Err(json!("Role not found or inactive")));
    }

    let mut savepoint = conn.begin().await?;
    match db::permissions::create(&mut *savepoint, &new).await {
        Ok(permission) => {
            savepoint.commit().await?;
            Ok(Ok(permission))
        }
        Err(e) if unique_violation_constraint(&e).is_some() => {
            savepoint.rollback().await?;
            Ok(Err(json!(DUPLICATE_MESSAGE)))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn bulk_create(
    State(state): State<SharedState>,
    auth: AuthUser,
    JsonBody(body): JsonBody<BulkCreatePermissions>,
) -> Result<Response, AppError> {
    auth.authorize(Action::Create, Target::Permissions)?;
    let items = body.validate()?;
    let requested = items.len();

    let mut tx = state.pool.begin().await?;
    let mut created = Vec::new();
    let mut errors = Vec::new();

    for (index, item) in items.into_iter().enumerate() {
        let name = item
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        match create_item(&mut tx, item).await? {
            Ok(permission) => created.push(permission),
            Err(error) => errors.push(json!({ "index": index, "name": name, "error": error })),
        }
    }

    if created.is_empty() {
        tx.rollback().await?;
        let body = json!({ "error": "No permissions created", "errors": errors });
        return Ok((StatusCode::BAD_REQUEST, Json(body)).into_response());
    }
    tx.commit().await?;

    audit::record(
        &state.pool,
        &auth,
        "permission.bulk_created",
        "permission",
        None,
        Some(json!({ "created": created.len(), "failed": errors.len() })),
    )
    .await;

    let body = json!({
        "message": format!("{} permissions created successfully", created.len()),
        "summary": {
            "total_requested": requested,
            "created": created.len(),
            "failed": errors.len(),
        },
        "created_permissions": created,
        "errors": errors_or_null(errors),
    });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub async fn bulk_update(
    State(state): State<SharedState>,
    auth: AuthUser,
    JsonBody(body): JsonBody<BulkUpdatePermissions>,
) -> Result<Response, AppError> {
    auth.authorize(Action::Update, Target::Permissions)?;
    let (ids, changes) = body.validate()?;

    let mut tx = state.pool.begin().await?;
    let permissions = db::permissions::find_many(&mut *tx, &ids).await?;
    if permissions.len() != ids.len() {
        return Err(AppError::NotFound(
            "One or more permissions do not exist".to_string(),
        ));
    }

    let mut updated = Vec::new();
    let mut errors = Vec::new();
    let mut protected_skipped = 0usize;

    for permission in &permissions {
        if !changes.protected_changes(permission).is_empty() {
            protected_skipped += 1;
            continue;
        }
        let mut savepoint = tx.begin().await?;
        match db::permissions::update(&mut *savepoint, permission.id, &changes).await {
            Ok(p) => {
                savepoint.commit().await?;
                updated.push(p);
            }
            Err(e) if unique_violation_constraint(&e).is_some() => {
                savepoint.rollback().await?;
                errors.push(json!({
                    "id": permission.id,
                    "name": permission.name,
                    "error": DUPLICATE_MESSAGE,
                }));
            }
            Err(e) => return Err(e.into()),
        }
    }

    if updated.is_empty() && !errors.is_empty() {
        tx.rollback().await?;
        let body = json!({ "error": "No permissions updated", "errors": errors });
        return Ok((StatusCode::BAD_REQUEST, Json(body)).into_response());
    }
    tx.commit().await?;

    audit::record(
        &state.pool,
        &auth,
        "permission.bulk_updated",
        "permission",
        None,
        Some(json!({ "updated": updated.len(), "protected_skipped": protected_skipped })),
    )
    .await;

    let body = json!({
        "message": format!("{} permissions updated successfully", updated.len()),
        "summary": {
            "total_requested": ids.len(),
            "updated": updated.len(),
            "protected_skipped": protected_skipped,
            "failed": errors.len(),
        },
        "updated_permissions": updated,
        "protected_permissions_skipped": protected_skipped,
        "errors": errors_or_null(errors),
    });
    Ok(Json(body).into_response())
}
