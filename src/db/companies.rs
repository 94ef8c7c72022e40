use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::Company;
use crate::pagination::{like_pattern, PageRequest};
use crate::policy::CompanyScope;
use crate::schemas::company::{NewCompany, UpdateCompany};

const SEARCH_COLUMNS: [&str; 4] = ["c.name", "c.legal_name", "c.vat_number", "c.tax_code"];

#[derive(Debug, Clone)]
pub struct CompanyFilter {
    pub scope: CompanyScope,
    pub search: Option<String>,
    pub is_active: bool,
}

/// `None` when the scope can match nothing.
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &CompanyFilter) -> Option<()> {
    match filter.scope {
        CompanyScope::All => {}
        CompanyScope::Own(company_id) => {
            qb.push(" AND c.id = ").push_bind(company_id);
        }
        CompanyScope::Nothing => return None,
    }
    qb.push(" AND c.is_active = ").push_bind(filter.is_active);
    if let Some(term) = &filter.search {
        super::push_search(qb, &SEARCH_COLUMNS, &like_pattern(term));
    }
    Some(())
}

/// Companies with their active-user counts.
pub async fn list(
    pool: &PgPool,
    filter: &CompanyFilter,
    page: PageRequest,
) -> Result<(Vec<(Company, i64)>, i64), sqlx::Error> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM companies c WHERE TRUE");
    if push_filters(&mut count, filter).is_none() {
        return Ok((Vec::new(), 0));
    }
    let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Postgres>::new("SELECT c.* FROM companies c WHERE TRUE");
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY c.name, c.id LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let companies = qb.build_query_as::<Company>().fetch_all(pool).await?;

    let ids: Vec<Uuid> = companies.iter().map(|c| c.id).collect();
    let counts: Vec<(Uuid, i64)> = sqlx::query_as(
        "SELECT company_id, COUNT(*) FROM users
         WHERE company_id = ANY($1) AND is_active GROUP BY company_id",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let with_counts = companies
        .into_iter()
        .map(|c| {
            let n = counts
                .iter()
                .find(|(id, _)| *id == c.id)
                .map(|(_, n)| *n)
                .unwrap_or(0);
            (c, n)
        })
        .collect();

    Ok((with_counts, total))
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Company>, sqlx::Error> {
    sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_active(pool: &PgPool, id: Uuid) -> Result<Option<Company>, sqlx::Error> {
    sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1 AND is_active")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn create(pool: &PgPool, new: &NewCompany) -> Result<Company, sqlx::Error> {
    sqlx::query_as::<_, Company>(
        "INSERT INTO companies (name, legal_name, vat_number, tax_code, email, phone, website,
                                address, city, province, postal_code, country)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING *",
    )
    .bind(&new.name)
    .bind(&new.legal_name)
    .bind(&new.vat_number)
    .bind(&new.tax_code)
    .bind(&new.email)
    .bind(&new.phone)
    .bind(&new.website)
    .bind(&new.address)
    .bind(&new.city)
    .bind(&new.province)
    .bind(&new.postal_code)
    .bind(&new.country)
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &PgPool, id: Uuid, changes: &UpdateCompany) -> Result<Company, sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE companies SET updated_at = now()");
    if let Some(name) = &changes.name {
        qb.push(", name = ").push_bind(name.clone());
    }
    let nullable = [
        ("legal_name", &changes.legal_name),
        ("vat_number", &changes.vat_number),
        ("tax_code", &changes.tax_code),
        ("email", &changes.email),
        ("phone", &changes.phone),
        ("website", &changes.website),
        ("address", &changes.address),
        ("city", &changes.city),
        ("province", &changes.province),
        ("postal_code", &changes.postal_code),
    ];
    for (column, value) in nullable {
        if let Some(value) = value {
            qb.push(format!(", {column} = ")).push_bind(value.clone());
        }
    }
    if let Some(country) = &changes.country {
        qb.push(", country = ").push_bind(country.clone());
    }
    if let Some(is_active) = changes.is_active {
        qb.push(", is_active = ").push_bind(is_active);
    }
    qb.push(" WHERE id = ").push_bind(id).push(" RETURNING *");
    qb.build_query_as::<Company>().fetch_one(pool).await
}

pub async fn set_active(pool: &PgPool, id: Uuid, is_active: bool) -> Result<Company, sqlx::Error> {
    sqlx::query_as::<_, Company>(
        "UPDATE companies SET is_active = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(is_active)
    .fetch_one(pool)
    .await
}
