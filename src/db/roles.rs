use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{Role, RoleWithCounts};
use crate::pagination::{like_pattern, PageRequest};
use crate::schemas::role::{NewRole, UpdateRole};

const WITH_COUNTS_SELECT: &str = "SELECT r.*,
        (SELECT COUNT(*) FROM users u WHERE u.role_id = r.id AND u.is_active) AS users_count,
        (SELECT COUNT(*) FROM permissions p WHERE p.role_id = r.id AND p.is_active) AS permissions_count
     FROM roles r";

const SEARCH_COLUMNS: [&str; 3] = ["r.name", "r.display_name", "r.description"];

pub const DEFAULT_ROLE_CONSTRAINT: &str = "uq_roles_single_default";

#[derive(Debug, Clone, Default)]
pub struct RoleFilter {
    pub search: Option<String>,
    pub access_level: Option<i32>,
    pub is_active: Option<bool>,
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &RoleFilter) {
    if let Some(level) = filter.access_level {
        qb.push(" AND r.access_level = ").push_bind(level);
    }
    if let Some(is_active) = filter.is_active {
        qb.push(" AND r.is_active = ").push_bind(is_active);
    }
    if let Some(term) = &filter.search {
        super::push_search(qb, &SEARCH_COLUMNS, &like_pattern(term));
    }
}

pub async fn list(
    pool: &PgPool,
    filter: &RoleFilter,
    page: PageRequest,
) -> Result<(Vec<RoleWithCounts>, i64), sqlx::Error> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM roles r WHERE TRUE");
    push_filters(&mut count, filter);
    let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Postgres>::new(WITH_COUNTS_SELECT);
    qb.push(" WHERE TRUE");
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY r.access_level, r.name LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let roles = qb.build_query_as::<RoleWithCounts>().fetch_all(pool).await?;

    Ok((roles, total))
}

pub async fn find_by_id<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<Option<Role>, sqlx::Error> {
    sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn find_with_counts(pool: &PgPool, id: Uuid) -> Result<Option<RoleWithCounts>, sqlx::Error> {
    sqlx::query_as::<_, RoleWithCounts>(&format!("{WITH_COUNTS_SELECT} WHERE r.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_active<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<Option<Role>, sqlx::Error> {
    sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1 AND is_active")
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Role>, sqlx::Error> {
    sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
}

/// The role flagged as default, ignoring `exclude`.
pub async fn find_default(pool: &PgPool, exclude: Option<Uuid>) -> Result<Option<Role>, sqlx::Error> {
    sqlx::query_as::<_, Role>(
        "SELECT * FROM roles WHERE is_default AND ($1::uuid IS NULL OR id <> $1)",
    )
    .bind(exclude)
    .fetch_optional(pool)
    .await
}

pub async fn create(pool: &PgPool, new: &NewRole) -> Result<Role, sqlx::Error> {
    sqlx::query_as::<_, Role>(
        "INSERT INTO roles (name, display_name, description, access_level, is_active, is_default)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(&new.name)
    .bind(&new.display_name)
    .bind(&new.description)
    .bind(new.access_level)
    .bind(new.is_active)
    .bind(new.is_default)
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &PgPool, id: Uuid, changes: &UpdateRole) -> Result<Role, sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE roles SET updated_at = now()");
    if let Some(name) = &changes.name {
        qb.push(", name = ").push_bind(name.clone());
    }
    if let Some(display_name) = &changes.display_name {
        qb.push(", display_name = ").push_bind(display_name.clone());
    }
    if let Some(description) = &changes.description {
        qb.push(", description = ").push_bind(description.clone());
    }
    if let Some(level) = changes.access_level {
        qb.push(", access_level = ").push_bind(level);
    }
    if let Some(is_active) = changes.is_active {
        qb.push(", is_active = ").push_bind(is_active);
        qb.push(if is_active {
            ", deleted_at = NULL"
        } else {
            ", deleted_at = COALESCE(deleted_at, now())"
        });
    }
    if let Some(is_default) = changes.is_default {
        qb.push(", is_default = ").push_bind(is_default);
    }
    qb.push(" WHERE id = ").push_bind(id).push(" RETURNING *");
    qb.build_query_as::<Role>().fetch_one(pool).await
}

pub async fn soft_delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE roles SET is_active = false, deleted_at = now(), updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn activate(pool: &PgPool, id: Uuid) -> Result<Role, sqlx::Error> {
    sqlx::query_as::<_, Role>(
        "UPDATE roles SET is_active = true, deleted_at = NULL, updated_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_one(pool)
    .await
}

#[derive(Debug, Serialize)]
pub struct RoleStats {
    pub total_roles: i64,
    pub active_roles: i64,
    pub inactive_roles: i64,
    /// Active roles per access level, keyed by the level as a string.
    pub roles_by_level: BTreeMap<String, i64>,
    pub default_role: Option<Role>,
    pub role_details: Vec<RoleWithCounts>,
    pub system_roles: Vec<String>,
}

pub async fn stats(pool: &PgPool) -> Result<RoleStats, sqlx::Error> {
    let (total_roles, active_roles): (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active) FROM roles")
            .fetch_one(pool)
            .await?;

    let levels: Vec<(i32, i64)> = sqlx::query_as(
        "SELECT access_level, COUNT(*) FROM roles WHERE is_active
         GROUP BY access_level ORDER BY access_level",
    )
    .fetch_all(pool)
    .await?;

    let default_role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE is_default")
        .fetch_optional(pool)
        .await?;

    let role_details = sqlx::query_as::<_, RoleWithCounts>(&format!(
        "{WITH_COUNTS_SELECT} WHERE r.is_active ORDER BY r.access_level, r.name"
    ))
    .fetch_all(pool)
    .await?;

    let system_roles: Vec<String> =
        sqlx::query_scalar("SELECT name FROM roles WHERE is_system ORDER BY access_level")
            .fetch_all(pool)
            .await?;

    Ok(RoleStats {
        total_roles,
        active_roles,
        inactive_roles: total_roles - active_roles,
        roles_by_level: levels
            .into_iter()
            .map(|(level, count)| (level.to_string(), count))
            .collect(),
        default_role,
        role_details,
        system_roles,
    })
}
