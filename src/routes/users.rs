use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::CookieJar;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::auth::password;
use crate::db;
use crate::db::users::UserFilter;
use crate::error::{unique_violation_constraint, AppError};
use crate::extract::{self, JsonBody, PathParam, QueryParams};
use crate::middleware::audit;
use crate::models::{Role, UserDetail, UserView};
use crate::pagination::{search_term, PageMeta, PageRequest};
use crate::policy::{self, Action, Target, Tier, UpdateScope};
use crate::routes::auth::issue_session;
use crate::schemas::user::{
    AssignCompanyRole, ChangePassword, CreateUser, ResetPassword, UpdateProfile, UpdateUser,
    UserListQuery,
};
use crate::state::{AppState, SharedState};
use crate::validation::FieldErrors;

async fn load_user(state: &AppState, id: Uuid) -> Result<UserDetail, AppError> {
    db::users::find_detail_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

fn target(user: &UserDetail) -> Target {
    Target::User {
        id: user.user.id,
        company_id: user.user.company_id,
        access_level: user.access_level,
    }
}

/// Attach the active permission names of each user's role.
async fn with_permissions(
    state: &AppState,
    users: Vec<UserDetail>,
) -> Result<Vec<UserView>, AppError> {
    let mut role_ids: Vec<Uuid> = users
        .iter()
        .filter(|u| u.has_active_role())
        .filter_map(|u| u.user.role_id)
        .collect();
    role_ids.sort();
    role_ids.dedup();
    let names = db::permissions::active_names_by_role(&state.pool, &role_ids).await?;

    Ok(users
        .into_iter()
        .map(|user| {
            let permissions = user
                .user
                .role_id
                .filter(|_| user.has_active_role())
                .and_then(|id| names.get(&id).cloned())
                .unwrap_or_default();
            UserView {
                user,
                permissions: Some(permissions),
            }
        })
        .collect())
}

async fn single_view(state: &AppState, user: UserDetail) -> Result<UserView, AppError> {
    let mut views = with_permissions(state, vec![user]).await?;
    views
        .pop()
        .ok_or_else(|| AppError::Internal("Empty user view".to_string()))
}

/// An active role the caller is allowed to hand out.
async fn assignable_role(state: &AppState, auth: &AuthUser, role_id: Uuid) -> Result<Role, AppError> {
    let role = db::roles::find_active(&state.pool, role_id)
        .await?
        .ok_or_else(|| FieldErrors::single("role_id", "Role not found or inactive."))?;
    if !policy::may_assign_role(auth, role.access_level) {
        return Err(AppError::Forbidden(
            "Cannot assign a role with higher privileges than your own".to_string(),
        ));
    }
    Ok(role)
}

async fn ensure_active_company(state: &AppState, company_id: Uuid) -> Result<(), AppError> {
    db::companies::find_active(&state.pool, company_id)
        .await?
        .ok_or_else(|| FieldErrors::single("company_id", "Company not found or inactive."))?;
    Ok(())
}

async fn default_role(state: &AppState) -> Result<Option<Role>, AppError> {
    Ok(db::roles::find_default(&state.pool, None)
        .await?
        .filter(|r| r.is_active))
}

fn user_conflict(err: sqlx::Error) -> AppError {
    match unique_violation_constraint(&err).as_deref() {
        Some("users_email_key") => AppError::Conflict("Email already registered".to_string()),
        Some("users_username_key") => AppError::Conflict("Username already taken".to_string()),
        Some(_) => AppError::Conflict("User already exists".to_string()),
        None => AppError::Database(err),
    }
}

pub async fn list(
    State(state): State<SharedState>,
    auth: AuthUser,
    QueryParams(query): QueryParams<UserListQuery>,
) -> Result<Json<Value>, AppError> {
    let page = PageRequest::new(query.page, query.per_page)?;
    let filter = UserFilter {
        scope: policy::user_scope(&auth),
        search: search_term(query.search.as_deref())?,
        company_id: query.company_id,
        role_id: query.role_id,
        is_active: query.is_active.unwrap_or(true),
    };

    let (users, total) = db::users::list(&state.pool, &filter, page).await?;
    let users = if query.include_stats {
        with_permissions(&state, users).await?
    } else {
        users.into_iter().map(UserView::from).collect()
    };

    Ok(Json(json!({
        "users": users,
        "pagination": PageMeta::new(page, total),
    })))
}

pub async fn get(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Value>, AppError> {
    let user = load_user(&state, id).await?;
    auth.authorize(Action::Read, target(&user))?;
    Ok(Json(json!({ "user": single_view(&state, user).await? })))
}

pub async fn get_me(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<Json<Value>, AppError> {
    let user = load_user(&state, auth.user_id).await?;
    Ok(Json(json!({ "user": single_view(&state, user).await? })))
}

pub async fn create(
    State(state): State<SharedState>,
    auth: AuthUser,
    JsonBody(body): JsonBody<CreateUser>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let mut new = body.validate()?;
    if auth.tier == Tier::Lord && new.company_id.is_none() {
        new.company_id = auth.company_id;
    }
    auth.authorize(Action::Create, Target::Users { company_id: new.company_id })?;

    if let Some(company_id) = new.company_id {
        ensure_active_company(&state, company_id).await?;
    }
    new.role_id = match new.role_id {
        Some(role_id) => Some(assignable_role(&state, &auth, role_id).await?.id),
        None => default_role(&state)
            .await?
            .filter(|r| policy::may_assign_role(&auth, r.access_level))
            .map(|r| r.id),
    };

    let hash = password::hash(&new.password).map_err(AppError::Internal)?;
    let user = db::users::create(&state.pool, &new, &hash)
        .await
        .map_err(user_conflict)?;

    audit::record(
        &state.pool,
        &auth,
        "user.created",
        "user",
        Some(user.id),
        Some(json!({ "email": user.email, "company_id": user.company_id })),
    )
    .await;

    let detail = load_user(&state, user.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User created successfully", "user": detail })),
    ))
}

/// Checks the administrative parts of an update against the caller's reach.
async fn check_admin_changes(
    state: &AppState,
    auth: &AuthUser,
    target: &UserDetail,
    changes: &UpdateUser,
) -> Result<(), AppError> {
    if target.user.id == auth.user_id && changes.is_active == Some(false) {
        return Err(AppError::Forbidden(
            "You cannot deactivate your own account".to_string(),
        ));
    }
    if let Some(company_id) = changes.company_id {
        if !policy::may_place_in_company(auth, company_id) {
            return Err(AppError::Forbidden(
                "Users can only belong to your own company".to_string(),
            ));
        }
        if let Some(company_id) = company_id {
            ensure_active_company(state, company_id).await?;
        }
    }
    if let Some(Some(role_id)) = changes.role_id {
        assignable_role(state, auth, role_id).await?;
    }
    Ok(())
}

async fn apply_update(
    state: &AppState,
    auth: &AuthUser,
    target: UserDetail,
    changes: UpdateUser,
) -> Result<Json<Value>, AppError> {
    let id = target.user.id;
    db::users::update(&state.pool, id, &changes)
        .await
        .map_err(user_conflict)?;

    if changes.is_active == Some(false) {
        db::refresh_tokens::revoke_all_for_user(&state.pool, id).await?;
    }

    audit::record(
        &state.pool,
        auth,
        "user.updated",
        "user",
        Some(id),
        Some(json!({ "fields": changes.changed_fields() })),
    )
    .await;

    let user = load_user(state, id).await?;
    Ok(Json(json!({
        "message": "User updated successfully",
        "user": single_view(state, user).await?,
    })))
}

pub async fn update(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<Value>, AppError> {
    let user = load_user(&state, id).await?;
    auth.authorize(Action::Update, target(&user))?;

    let changes = match policy::update_scope(&auth, id) {
        UpdateScope::Admin => {
            let mut changes: UpdateUser = extract::from_value(body)?;
            changes.validate()?;
            check_admin_changes(&state, &auth, &user, &changes).await?;
            changes
        }
        UpdateScope::Profile => {
            let profile: UpdateProfile = extract::from_value(body)?;
            profile.validate()?;
            profile.into_update()
        }
    };

    apply_update(&state, &auth, user, changes).await
}

pub async fn update_me(
    State(state): State<SharedState>,
    auth: AuthUser,
    JsonBody(profile): JsonBody<UpdateProfile>,
) -> Result<Json<Value>, AppError> {
    profile.validate()?;
    let user = load_user(&state, auth.user_id).await?;
    apply_update(&state, &auth, user, profile.into_update()).await
}

pub async fn change_my_password(
    State(state): State<SharedState>,
    auth: AuthUser,
    JsonBody(body): JsonBody<ChangePassword>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let (current, new) = body.validate()?;

    let user = db::users::find_by_id(&state.pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    let valid = password::verify(&current, &user.password_hash).map_err(AppError::Internal)?;
    if !valid {
        return Err(FieldErrors::single("current_password", "Current password is incorrect.").into());
    }

    let hash = password::hash(&new).map_err(AppError::Internal)?;
    db::users::update_password(&state.pool, user.id, &hash).await?;
    db::refresh_tokens::revoke_all_for_user(&state.pool, user.id).await?;

    audit::record(
        &state.pool,
        &auth,
        "user.password_changed",
        "user",
        Some(user.id),
        None,
    )
    .await;

    let session = issue_session(&state, user.id).await?;
    let mut body = session.body(&state.config);
    body["message"] = json!("Password changed successfully");
    Ok((session.cookies(&state.config), Json(body)))
}

pub async fn delete(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Value>, AppError> {
    let user = load_user(&state, id).await?;
    auth.authorize(Action::Delete, target(&user))?;

    db::users::set_active(&state.pool, id, false).await?;
    let revoked = db::refresh_tokens::revoke_all_for_user(&state.pool, id).await?;

    audit::record(
        &state.pool,
        &auth,
        "user.deactivated",
        "user",
        Some(id),
        Some(json!({ "sessions_revoked": revoked })),
    )
    .await;

    Ok(Json(json!({ "message": "User deactivated successfully" })))
}

pub async fn activate(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Value>, AppError> {
    let user = load_user(&state, id).await?;
    auth.authorize(Action::Activate, target(&user))?;

    if user.user.is_active {
        return Ok(Json(json!({ "message": "User is already active", "user": user })));
    }

    db::users::set_active(&state.pool, id, true).await?;
    audit::record(&state.pool, &auth, "user.activated", "user", Some(id), None).await;

    let user = load_user(&state, id).await?;
    Ok(Json(json!({ "message": "User activated successfully", "user": user })))
}

pub async fn assign_company_role(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<AssignCompanyRole>,
) -> Result<Json<Value>, AppError> {
    let user = load_user(&state, id).await?;
    auth.authorize(Action::AssignCompanyRole, target(&user))?;
    let (company_id, role_id) = body.validate()?;

    ensure_active_company(&state, company_id).await?;
    let role = match role_id {
        Some(role_id) => assignable_role(&state, &auth, role_id).await?,
        None => default_role(&state)
            .await?
            .ok_or_else(|| FieldErrors::single("role_id", "No default role is configured."))?,
    };

    db::users::assign_company_role(&state.pool, id, company_id, role.id).await?;

    audit::record(
        &state.pool,
        &auth,
        "user.company_role_assigned",
        "user",
        Some(id),
        Some(json!({ "company_id": company_id, "role_id": role.id })),
    )
    .await;

    let user = load_user(&state, id).await?;
    Ok(Json(json!({
        "message": "Company and role assigned successfully",
        "user": single_view(&state, user).await?,
    })))
}

pub async fn reset_password(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<ResetPassword>,
) -> Result<Json<Value>, AppError> {
    let user = load_user(&state, id).await?;
    auth.authorize(Action::ResetPassword, target(&user))?;
    let new = body.validate()?;

    let hash = password::hash(&new).map_err(AppError::Internal)?;
    db::users::update_password(&state.pool, id, &hash).await?;
    db::refresh_tokens::revoke_all_for_user(&state.pool, id).await?;

    audit::record(&state.pool, &auth, "user.password_reset", "user", Some(id), None).await;

    Ok(Json(json!({ "message": "Password reset successfully" })))
}
