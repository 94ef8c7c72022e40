use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::db::roles::{RoleFilter, DEFAULT_ROLE_CONSTRAINT};
use crate::error::{unique_violation_constraint, AppError};
use crate::extract::{JsonBody, PathParam, QueryParams};
use crate::middleware::audit;
use crate::models::{Role, RoleView};
use crate::pagination::{search_term, PageMeta, PageRequest};
use crate::policy::{Action, Target};
use crate::schemas::role::{AssignPermissions, CreateRole, RoleListQuery, UpdateRole};
use crate::state::{AppState, SharedState};

async fn load_role(state: &AppState, id: Uuid) -> Result<Role, AppError> {
    db::roles::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Role not found".to_string()))
}

async fn full_view(state: &AppState, id: Uuid) -> Result<RoleView, AppError> {
    let role = db::roles::find_with_counts(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Role not found".to_string()))?;
    let permissions = db::permissions::list_active_for_role(&state.pool, id).await?;
    Ok(RoleView::new(role, true).with_permissions(permissions))
}

/// 409 when another role already carries the default flag.
async fn ensure_default_free(state: &AppState, exclude: Option<Uuid>) -> Result<(), AppError> {
    if let Some(existing) = db::roles::find_default(&state.pool, exclude).await? {
        return Err(AppError::Conflict(format!(
            "Role \"{}\" is already the default role",
            existing.display_name
        )));
    }
    Ok(())
}

fn role_conflict(err: sqlx::Error) -> AppError {
    match unique_violation_constraint(&err).as_deref() {
        Some(DEFAULT_ROLE_CONSTRAINT) => {
            AppError::Conflict("Another role is already the default role".to_string())
        }
        Some(_) => AppError::Conflict("Role name must be unique".to_string()),
        None => AppError::Database(err),
    }
}

async fn ensure_no_active_users(state: &AppState, role: &Role) -> Result<(), AppError> {
    let active_users = db::users::count_active_by_role(&state.pool, role.id).await?;
    if active_users > 0 {
        return Err(AppError::Conflict(format!(
            "Role \"{}\" has {active_users} active users",
            role.display_name
        )));
    }
    Ok(())
}

pub async fn list(
    State(state): State<SharedState>,
    auth: AuthUser,
    QueryParams(query): QueryParams<RoleListQuery>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Read, Target::Roles)?;
    let page = PageRequest::new(query.page, query.per_page)?;
    let filter = RoleFilter {
        search: search_term(query.search.as_deref())?,
        access_level: query.access_level,
        is_active: query.is_active,
    };

    let (roles, total) = db::roles::list(&state.pool, &filter, page).await?;
    let mut views = Vec::with_capacity(roles.len());
    for role in roles {
        let id = role.role.id;
        let view = RoleView::new(role, query.include_stats);
        views.push(if query.include_permissions {
            view.with_permissions(db::permissions::list_active_for_role(&state.pool, id).await?)
        } else {
            view
        });
    }

    Ok(Json(json!({
        "roles": views,
        "pagination": PageMeta::new(page, total),
    })))
}

pub async fn get(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Read, Target::Roles)?;
    Ok(Json(json!({ "role": full_view(&state, id).await? })))
}

pub async fn stats(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Read, Target::Roles)?;
    let stats = db::roles::stats(&state.pool).await?;
    Ok(Json(json!(stats)))
}

pub async fn create(
    State(state): State<SharedState>,
    auth: AuthUser,
    JsonBody(body): JsonBody<CreateRole>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    auth.authorize(Action::Create, Target::Roles)?;
    let new = body.validate()?;

    if db::roles::find_by_name(&state.pool, &new.name).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "Role \"{}\" already exists",
            new.name
        )));
    }
    if new.is_default {
        ensure_default_free(&state, None).await?;
    }

    let role = db::roles::create(&state.pool, &new)
        .await
        .map_err(role_conflict)?;

    audit::record(
        &state.pool,
        &auth,
        "role.created",
        "role",
        Some(role.id),
        Some(json!({ "name": role.name, "access_level": role.access_level })),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Role created successfully", "role": role })),
    ))
}

pub async fn update(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(changes): JsonBody<UpdateRole>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Update, Target::Roles)?;
    let role = load_role(&state, id).await?;
    changes.validate()?;

    let protected = changes.protected_changes(&role);
    if !protected.is_empty() {
        return Err(AppError::Forbidden(format!(
            "Cannot change {} of system role {}",
            protected.join(", "),
            role.display_name
        )));
    }
    if changes.is_active == Some(false) && role.is_active {
        if role.is_system {
            return Err(AppError::Forbidden(format!(
                "Cannot deactivate system role {}",
                role.display_name
            )));
        }
        ensure_no_active_users(&state, &role).await?;
    }
    if changes.is_default == Some(true) && !role.is_default {
        ensure_default_free(&state, Some(id)).await?;
    }

    let updated = db::roles::update(&state.pool, id, &changes)
        .await
        .map_err(role_conflict)?;

    audit::record(&state.pool, &auth, "role.updated", "role", Some(id), None).await;

    Ok(Json(json!({ "message": "Role updated successfully", "role": updated })))
}

pub async fn delete(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Delete, Target::Roles)?;
    let role = load_role(&state, id).await?;

    if role.is_system {
        return Err(AppError::Forbidden(format!(
            "Cannot delete system role {}",
            role.display_name
        )));
    }
    ensure_no_active_users(&state, &role).await?;

    db::roles::soft_delete(&state.pool, id).await?;
    audit::record(
        &state.pool,
        &auth,
        "role.deleted",
        "role",
        Some(id),
        Some(json!({ "name": role.name })),
    )
    .await;

    Ok(Json(json!({ "message": "Role deleted successfully" })))
}

pub async fn activate(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Activate, Target::Roles)?;
    let role = load_role(&state, id).await?;

    if role.is_active {
        return Ok(Json(json!({ "message": "Role is already active", "role": role })));
    }

    let role = db::roles::activate(&state.pool, id).await?;
    audit::record(&state.pool, &auth, "role.activated", "role", Some(id), None).await;

    Ok(Json(json!({ "message": "Role activated successfully", "role": role })))
}

/// Moves the listed permissions onto the role, all or nothing.
pub async fn assign_permissions(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<AssignPermissions>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Update, Target::Roles)?;
    let role = load_role(&state, id).await?;
    let ids = body.validate()?;

    let mut tx = state.pool.begin().await?;

    let permissions = db::permissions::find_many(&mut *tx, &ids).await?;
    if permissions.len() != ids.len() {
        return Err(AppError::NotFound(
            "One or more permissions do not exist".to_string(),
        ));
    }
    if let Some(system) = permissions.iter().find(|p| p.is_system() && p.role_id != id) {
        return Err(AppError::Forbidden(format!(
            "Cannot move system permission {}",
            system.name
        )));
    }

    db::permissions::move_to_role(&mut *tx, &ids, id)
        .await
        .map_err(|e| match unique_violation_constraint(&e) {
            Some(_) => AppError::Conflict(
                "The role already has a permission with one of these names".to_string(),
            ),
            None => AppError::Database(e),
        })?;
    tx.commit().await?;

    audit::record(
        &state.pool,
        &auth,
        "role.permissions_assigned",
        "role",
        Some(id),
        Some(json!({ "permission_ids": ids })),
    )
    .await;

    Ok(Json(json!({
        "message": "Permissions assigned successfully",
        "role": role.display_name,
        "permissions_assigned": permissions.len(),
        "permissions": permissions
            .iter()
            .map(|p| json!({ "id": p.id, "name": p.name, "display_name": p.display_name }))
            .collect::<Vec<_>>(),
    })))
}
