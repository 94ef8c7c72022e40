pub mod audit;
pub mod auth;
pub mod companies;
pub mod health;
pub mod permissions;
pub mod roles;
pub mod users;

use axum::routing::{get, post, put};
use axum::Router;

use crate::state::SharedState;

pub fn health_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::liveness))
        .route("/api/v1/health", get(health::status))
        .route("/api/v1/health/detailed", get(health::detailed))
}

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Auth
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/auth/me", get(auth::me))
        // Users
        .route("/api/v1/users", get(users::list).post(users::create))
        .route("/api/v1/users/me", get(users::get_me).put(users::update_me))
        .route("/api/v1/users/me/password", put(users::change_my_password))
        .route(
            "/api/v1/users/{id}",
            get(users::get).put(users::update).delete(users::delete),
        )
        .route("/api/v1/users/{id}/activate", post(users::activate))
        .route(
            "/api/v1/users/{id}/assign-company-role",
            post(users::assign_company_role),
        )
        .route("/api/v1/users/{id}/reset-password", post(users::reset_password))
        // Companies
        .route(
            "/api/v1/companies",
            get(companies::list).post(companies::create),
        )
        .route(
            "/api/v1/companies/{id}",
            get(companies::get)
                .put(companies::update)
                .delete(companies::delete),
        )
        .route("/api/v1/companies/{id}/activate", post(companies::activate))
        // Roles
        .route("/api/v1/roles", get(roles::list).post(roles::create))
        .route("/api/v1/roles/stats", get(roles::stats))
        .route(
            "/api/v1/roles/{id}",
            get(roles::get).put(roles::update).delete(roles::delete),
        )
        .route("/api/v1/roles/{id}/activate", post(roles::activate))
        .route(
            "/api/v1/roles/{id}/assign-permissions",
            post(roles::assign_permissions),
        )
        // Permissions
        .route(
            "/api/v1/permissions",
            get(permissions::list).post(permissions::create),
        )
        .route("/api/v1/permissions/stats", get(permissions::stats))
        .route("/api/v1/permissions/categories", get(permissions::categories))
        .route(
            "/api/v1/permissions/bulk",
            post(permissions::bulk_create).put(permissions::bulk_update),
        )
        .route(
            "/api/v1/permissions/{id}",
            get(permissions::get)
                .put(permissions::update)
                .delete(permissions::delete),
        )
        .route("/api/v1/permissions/{id}/activate", post(permissions::activate))
        // Audit
        .route("/api/v1/audit-events", get(audit::list))
}
