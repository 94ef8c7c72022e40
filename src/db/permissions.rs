use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::permission::CATEGORIES;
use crate::models::{Permission, PermissionDetail};
use crate::pagination::{like_pattern, PageRequest};
use crate::schemas::permission::{NewPermission, UpdatePermission};

const DETAIL_SELECT: &str = "SELECT p.*,
        r.name AS role_name,
        r.display_name AS role_display_name,
        r.access_level AS role_access_level,
        r.is_system AS role_is_system
     FROM permissions p
     JOIN roles r ON r.id = p.role_id";

const SEARCH_COLUMNS: [&str; 5] = [
    "p.name",
    "p.display_name",
    "p.description",
    "r.name",
    "r.display_name",
];

#[derive(Debug, Clone, Default)]
pub struct PermissionFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    pub role_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &PermissionFilter) {
    if let Some(category) = &filter.category {
        qb.push(" AND p.category = ").push_bind(category.clone());
    }
    if let Some(role_id) = filter.role_id {
        qb.push(" AND p.role_id = ").push_bind(role_id);
    }
    if let Some(is_active) = filter.is_active {
        qb.push(" AND p.is_active = ").push_bind(is_active);
    }
    if let Some(term) = &filter.search {
        super::push_search(qb, &SEARCH_COLUMNS, &like_pattern(term));
    }
}

pub async fn list(
    pool: &PgPool,
    filter: &PermissionFilter,
    page: PageRequest,
) -> Result<(Vec<PermissionDetail>, i64), sqlx::Error> {
    let mut count = QueryBuilder::<Postgres>::new(
        "SELECT COUNT(*) FROM permissions p JOIN roles r ON r.id = p.role_id WHERE TRUE",
    );
    push_filters(&mut count, filter);
    let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Postgres>::new(DETAIL_SELECT);
    qb.push(" WHERE TRUE");
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY p.category, r.access_level, p.name, p.id LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let permissions = qb.build_query_as::<PermissionDetail>().fetch_all(pool).await?;

    Ok((permissions, total))
}

pub async fn find_by_id<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<Option<Permission>, sqlx::Error> {
    sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn find_detail(pool: &PgPool, id: Uuid) -> Result<Option<PermissionDetail>, sqlx::Error> {
    sqlx::query_as::<_, PermissionDetail>(&format!("{DETAIL_SELECT} WHERE p.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_role_and_name<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    role_id: Uuid,
    name: &str,
) -> Result<Option<Permission>, sqlx::Error> {
    sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE role_id = $1 AND name = $2")
        .bind(role_id)
        .bind(name)
        .fetch_optional(executor)
        .await
}

pub async fn find_many<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    ids: &[Uuid],
) -> Result<Vec<Permission>, sqlx::Error> {
    sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE id = ANY($1) ORDER BY name")
        .bind(ids)
        .fetch_all(executor)
        .await
}

pub async fn list_active_for_role(pool: &PgPool, role_id: Uuid) -> Result<Vec<Permission>, sqlx::Error> {
    sqlx::query_as::<_, Permission>(
        "SELECT * FROM permissions WHERE role_id = $1 AND is_active ORDER BY category, name",
    )
    .bind(role_id)
    .fetch_all(pool)
    .await
}

/// Active permission names per role, for the given roles.
pub async fn active_names_by_role(
    pool: &PgPool,
    role_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<String>>, sqlx::Error> {
    let rows: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT role_id, name FROM permissions
         WHERE role_id = ANY($1) AND is_active ORDER BY name",
    )
    .bind(role_ids)
    .fetch_all(pool)
    .await?;

    let mut names: HashMap<Uuid, Vec<String>> = HashMap::new();
    for (role_id, name) in rows {
        names.entry(role_id).or_default().push(name);
    }
    Ok(names)
}

pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    new: &NewPermission,
) -> Result<Permission, sqlx::Error> {
    sqlx::query_as::<_, Permission>(
        "INSERT INTO permissions (role_id, name, display_name, description, category, is_active)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(new.role_id)
    .bind(&new.name)
    .bind(&new.display_name)
    .bind(&new.description)
    .bind(&new.category)
    .bind(new.is_active)
    .fetch_one(executor)
    .await
}

pub async fn update<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    changes: &UpdatePermission,
) -> Result<Permission, sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE permissions SET updated_at = now()");
    if let Some(name) = &changes.name {
        qb.push(", name = ").push_bind(name.clone());
    }
    if let Some(display_name) = &changes.display_name {
        qb.push(", display_name = ").push_bind(display_name.clone());
    }
    if let Some(description) = &changes.description {
        qb.push(", description = ").push_bind(description.clone());
    }
    if let Some(category) = &changes.category {
        qb.push(", category = ").push_bind(category.clone());
    }
    if let Some(is_active) = changes.is_active {
        qb.push(", is_active = ").push_bind(is_active);
        qb.push(if is_active {
            ", deleted_at = NULL"
        } else {
            ", deleted_at = COALESCE(deleted_at, now())"
        });
    }
    qb.push(" WHERE id = ").push_bind(id).push(" RETURNING *");
    qb.build_query_as::<Permission>().fetch_one(executor).await
}

pub async fn soft_delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE permissions SET is_active = false, deleted_at = now(), updated_at = now()
         WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn activate(pool: &PgPool, id: Uuid) -> Result<Permission, sqlx::Error> {
    sqlx::query_as::<_, Permission>(
        "UPDATE permissions SET is_active = true, deleted_at = NULL, updated_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_one(pool)
    .await
}

pub async fn move_to_role<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    ids: &[Uuid],
    role_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE permissions SET role_id = $2, updated_at = now() WHERE id = ANY($1)")
        .bind(ids)
        .bind(role_id)
        .execute(executor)
        .await?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct CategoryStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub roles_with_permissions: i64,
}

#[derive(Debug, Serialize)]
pub struct RolePermissionCount {
    pub role_id: Uuid,
    pub display_name: String,
    pub permissions_count: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct NamePattern {
    pub pattern: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct PermissionStats {
    pub total_permissions: i64,
    pub active_permissions: i64,
    pub inactive_permissions: i64,
    pub categories_count: usize,
    pub category_stats: BTreeMap<String, CategoryStats>,
    /// Keyed by role name.
    pub permissions_by_role: BTreeMap<String, RolePermissionCount>,
    /// Most frequent name prefixes (the part before the first dot) among active permissions.
    pub common_permission_patterns: Vec<NamePattern>,
    pub available_categories: Vec<String>,
}

pub async fn stats(pool: &PgPool) -> Result<PermissionStats, sqlx::Error> {
    let (total_permissions, active_permissions): (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active) FROM permissions")
            .fetch_one(pool)
            .await?;

    let categories: Vec<(String, i64, i64, i64)> = sqlx::query_as(
        "SELECT category, COUNT(*), COUNT(*) FILTER (WHERE is_active),
                COUNT(DISTINCT role_id) FILTER (WHERE is_active)
         FROM permissions GROUP BY category ORDER BY category",
    )
    .fetch_all(pool)
    .await?;

    let by_role: Vec<(Uuid, String, String, i64)> = sqlx::query_as(
        "SELECT r.id, r.name, r.display_name, COUNT(p.id)
         FROM roles r LEFT JOIN permissions p ON p.role_id = r.id
         GROUP BY r.id ORDER BY r.access_level, r.name",
    )
    .fetch_all(pool)
    .await?;

    let common_permission_patterns = sqlx::query_as::<_, NamePattern>(
        "SELECT split_part(name, '.', 1) AS pattern, COUNT(*) AS count
         FROM permissions WHERE is_active
         GROUP BY 1 ORDER BY 2 DESC, 1 LIMIT 10",
    )
    .fetch_all(pool)
    .await?;

    let available_categories: Vec<String> = categories.iter().map(|c| c.0.clone()).collect();
    let category_stats = categories
        .into_iter()
        .map(|(category, total, active, roles)| {
            (
                category,
                CategoryStats {
                    total,
                    active,
                    inactive: total - active,
                    roles_with_permissions: roles,
                },
            )
        })
        .collect();
    let permissions_by_role = by_role
        .into_iter()
        .map(|(role_id, name, display_name, permissions_count)| {
            (
                name,
                RolePermissionCount {
                    role_id,
                    display_name,
                    permissions_count,
                },
            )
        })
        .collect();

    Ok(PermissionStats {
        total_permissions,
        active_permissions,
        inactive_permissions: total_permissions - active_permissions,
        categories_count: available_categories.len(),
        category_stats,
        permissions_by_role,
        common_permission_patterns,
        available_categories,
    })
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CategoryCount {
    pub name: String,
    pub total_permissions: i64,
    pub active_permissions: i64,
    pub inactive_permissions: i64,
}

/// Every known category with its permission counts, in declaration order.
pub async fn category_counts(pool: &PgPool) -> Result<Vec<CategoryCount>, sqlx::Error> {
    let categories: Vec<String> = CATEGORIES.iter().map(|c| c.to_string()).collect();
    sqlx::query_as::<_, CategoryCount>(
        "SELECT c.name,
                COUNT(p.id) AS total_permissions,
                COUNT(p.id) FILTER (WHERE p.is_active) AS active_permissions,
                COUNT(p.id) FILTER (WHERE NOT p.is_active) AS inactive_permissions
         FROM unnest($1::text[]) WITH ORDINALITY AS c(name, ord)
         LEFT JOIN permissions p ON p.category = c.name
         GROUP BY c.name, c.ord ORDER BY c.ord",
    )
    .bind(categories)
    .fetch_all(pool)
    .await
}
