use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{User, UserDetail};
use crate::pagination::{like_pattern, PageRequest};
use crate::policy::UserScope;
use crate::schemas::user::{NewUser, UpdateUser};

const DETAIL_SELECT: &str = "SELECT u.*,
        CASE WHEN u.first_name IS NOT NULL AND u.last_name IS NOT NULL
             THEN u.first_name || ' ' || u.last_name
             ELSE u.username END AS full_name,
        COALESCE(c.legal_name, c.name) AS company_name,
        r.display_name AS role_name,
        COALESCE(CASE WHEN r.is_active THEN r.access_level END, 999) AS access_level
     FROM users u
     LEFT JOIN companies c ON c.id = u.company_id
     LEFT JOIN roles r ON r.id = u.role_id";

const SEARCH_COLUMNS: [&str; 4] = ["u.email", "u.username", "u.first_name", "u.last_name"];

#[derive(Debug, Clone)]
pub struct UserFilter {
    pub scope: UserScope,
    pub search: Option<String>,
    pub company_id: Option<Uuid>,
    pub role_id: Option<Uuid>,
    pub is_active: bool,
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    match filter.scope {
        UserScope::All => {}
        UserScope::Company(company_id) => {
            qb.push(" AND u.company_id = ").push_bind(company_id);
        }
        UserScope::OnlySelf(user_id) => {
            qb.push(" AND u.id = ").push_bind(user_id);
        }
    }
    if let Some(company_id) = filter.company_id {
        qb.push(" AND u.company_id = ").push_bind(company_id);
    }
    if let Some(role_id) = filter.role_id {
        qb.push(" AND u.role_id = ").push_bind(role_id);
    }
    qb.push(" AND u.is_active = ").push_bind(filter.is_active);
    if let Some(term) = &filter.search {
        super::push_search(qb, &SEARCH_COLUMNS, &like_pattern(term));
    }
}

pub async fn list(
    pool: &PgPool,
    filter: &UserFilter,
    page: PageRequest,
) -> Result<(Vec<UserDetail>, i64), sqlx::Error> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users u WHERE TRUE");
    push_filters(&mut count, filter);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Postgres>::new(DETAIL_SELECT);
    qb.push(" WHERE TRUE");
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY u.created_at DESC, u.id LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let users = qb.build_query_as::<UserDetail>().fetch_all(pool).await?;

    Ok((users, total))
}

pub async fn find_detail_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserDetail>, sqlx::Error> {
    sqlx::query_as::<_, UserDetail>(&format!("{DETAIL_SELECT} WHERE u.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = lower($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn count_all<'e, E: sqlx::PgExecutor<'e>>(executor: E) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(executor)
        .await?;
    Ok(row.0)
}

pub async fn count_active_by_role<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    role_id: Uuid,
) -> Result<i64, sqlx::Error> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM users WHERE role_id = $1 AND is_active")
            .bind(role_id)
            .fetch_one(executor)
            .await?;
    Ok(row.0)
}

pub async fn count_active_by_company(pool: &PgPool, company_id: Uuid) -> Result<i64, sqlx::Error> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM users WHERE company_id = $1 AND is_active")
            .bind(company_id)
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}

pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    new: &NewUser,
    password_hash: &str,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (email, username, password_hash, first_name, last_name, avatar_url,
                            company_id, role_id, is_active, email_verified)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
    )
    .bind(&new.email)
    .bind(&new.username)
    .bind(password_hash)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(&new.avatar_url)
    .bind(new.company_id)
    .bind(new.role_id)
    .bind(new.is_active)
    .bind(new.email_verified)
    .fetch_one(executor)
    .await
}

/// Applies the fields present in `changes`; absent fields are left untouched.
pub async fn update(pool: &PgPool, id: Uuid, changes: &UpdateUser) -> Result<User, sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET updated_at = now()");
    if let Some(email) = &changes.email {
        qb.push(", email = ").push_bind(email.clone());
    }
    if let Some(username) = &changes.username {
        qb.push(", username = ").push_bind(username.clone());
    }
    if let Some(first_name) = &changes.first_name {
        qb.push(", first_name = ").push_bind(first_name.clone());
    }
    if let Some(last_name) = &changes.last_name {
        qb.push(", last_name = ").push_bind(last_name.clone());
    }
    if let Some(avatar_url) = &changes.avatar_url {
        qb.push(", avatar_url = ").push_bind(avatar_url.clone());
    }
    if let Some(company_id) = changes.company_id {
        qb.push(", company_id = ").push_bind(company_id);
    }
    if let Some(role_id) = changes.role_id {
        qb.push(", role_id = ").push_bind(role_id);
    }
    if let Some(is_active) = changes.is_active {
        qb.push(", is_active = ").push_bind(is_active);
    }
    if let Some(email_verified) = changes.email_verified {
        qb.push(", email_verified = ").push_bind(email_verified);
    }
    qb.push(" WHERE id = ").push_bind(id).push(" RETURNING *");
    qb.build_query_as::<User>().fetch_one(pool).await
}

pub async fn set_active(pool: &PgPool, id: Uuid, is_active: bool) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET is_active = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(is_active)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_password(
    pool: &PgPool,
    id: Uuid,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn touch_last_login(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn assign_company_role(
    pool: &PgPool,
    id: Uuid,
    company_id: Uuid,
    role_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users SET company_id = $2, role_id = $3, updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .bind(company_id)
    .bind(role_id)
    .execute(pool)
    .await?;
    Ok(())
}
