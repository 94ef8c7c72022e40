use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::db::companies::CompanyFilter;
use crate::error::{unique_violation_constraint, AppError};
use crate::extract::{JsonBody, PathParam, QueryParams};
use crate::middleware::audit;
use crate::models::{Company, CompanyView};
use crate::pagination::{search_term, PageMeta, PageRequest};
use crate::policy::{self, Action, Target};
use crate::schemas::company::{CompanyListQuery, CreateCompany, UpdateCompany};
use crate::state::{AppState, SharedState};

async fn load_company(state: &AppState, id: Uuid) -> Result<Company, AppError> {
    db::companies::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Company not found".to_string()))
}

async fn view(state: &AppState, company: Company) -> Result<CompanyView, AppError> {
    let users_count = db::users::count_active_by_company(&state.pool, company.id).await?;
    Ok(CompanyView::new(company, Some(users_count)))
}

fn company_conflict(err: sqlx::Error) -> AppError {
    match unique_violation_constraint(&err).as_deref() {
        Some("uq_companies_vat_number_active") => {
            AppError::Conflict("An active company with this VAT number already exists".to_string())
        }
        Some("uq_companies_tax_code_active") => {
            AppError::Conflict("An active company with this tax code already exists".to_string())
        }
        Some(_) => AppError::Conflict("Company already exists".to_string()),
        None => AppError::Database(err),
    }
}

pub async fn list(
    State(state): State<SharedState>,
    auth: AuthUser,
    QueryParams(query): QueryParams<CompanyListQuery>,
) -> Result<Json<Value>, AppError> {
    let scope = policy::company_scope(&auth)?;
    let page = PageRequest::new(query.page, query.per_page)?;
    let filter = CompanyFilter {
        scope,
        search: search_term(query.search.as_deref())?,
        is_active: query.is_active.unwrap_or(true),
    };

    let (companies, total) = db::companies::list(&state.pool, &filter, page).await?;
    let companies: Vec<CompanyView> = companies
        .into_iter()
        .map(|(company, users_count)| {
            CompanyView::new(company, query.include_stats.then_some(users_count))
        })
        .collect();

    Ok(Json(json!({
        "companies": companies,
        "pagination": PageMeta::new(page, total),
    })))
}

pub async fn get(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Read, Target::Company(id))?;
    let company = load_company(&state, id).await?;
    Ok(Json(json!({ "company": view(&state, company).await? })))
}

pub async fn create(
    State(state): State<SharedState>,
    auth: AuthUser,
    JsonBody(body): JsonBody<CreateCompany>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    auth.authorize(Action::Create, Target::Companies)?;
    let new = body.validate()?;

    let company = db::companies::create(&state.pool, &new)
        .await
        .map_err(company_conflict)?;

    audit::record(
        &state.pool,
        &auth,
        "company.created",
        "company",
        Some(company.id),
        Some(json!({ "name": company.name })),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Company created successfully",
            "company": CompanyView::new(company, Some(0)),
        })),
    ))
}

pub async fn update(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(mut changes): JsonBody<UpdateCompany>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Update, Target::Company(id))?;
    load_company(&state, id).await?;
    changes.validate()?;

    let company = db::companies::update(&state.pool, id, &changes)
        .await
        .map_err(company_conflict)?;

    audit::record(
        &state.pool,
        &auth,
        "company.updated",
        "company",
        Some(id),
        Some(json!({ "tax_identifiers_changed": changes.touches_tax_identifiers() })),
    )
    .await;

    Ok(Json(json!({
        "message": "Company updated successfully",
        "company": view(&state, company).await?,
    })))
}

pub async fn delete(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Delete, Target::Company(id))?;
    load_company(&state, id).await?;

    db::companies::set_active(&state.pool, id, false).await?;
    audit::record(&state.pool, &auth, "company.deactivated", "company", Some(id), None).await;

    Ok(Json(json!({ "message": "Company deleted successfully" })))
}

pub async fn activate(
    State(state): State<SharedState>,
    auth: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Value>, AppError> {
    auth.authorize(Action::Activate, Target::Company(id))?;
    let company = load_company(&state, id).await?;

    if company.is_active {
        return Ok(Json(json!({
            "message": "Company is already active",
            "company": view(&state, company).await?,
        })));
    }

    let company = db::companies::set_active(&state.pool, id, true)
        .await
        .map_err(company_conflict)?;
    audit::record(&state.pool, &auth, "company.activated", "company", Some(id), None).await;

    Ok(Json(json!({
        "message": "Company activated successfully",
        "company": view(&state, company).await?,
    })))
}
