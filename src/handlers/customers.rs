use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::millis;
use crate::{
    audit::{AuditContext, Operator},
    catalog, db,
    error::{AppError, AppResult},
    models::{AuditLogEntry, CreateCustomer, Customer, CustomerFilters, UpdateCustomer},
    reconciliation::{self, Detach},
    AppState,
};

// ── List ──────────────────────────────────────────────────────────────────────

pub async fn list_customers(
    State(state): State<AppState>,
    Query(filters): Query<CustomerFilters>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let start = Instant::now();
    let customers = db::customers::fetch_all_customers(&state.db, &filters).await?;
    let elapsed = start.elapsed();

    info!(count = customers.len(), elapsed_ms = elapsed.as_millis(), "Listed customers");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "data": customers,
            "count": customers.len(),
            "query_time_ms": millis(elapsed),
        })),
    ))
}

// ── Get by ID ─────────────────────────────────────────────────────────────────

pub async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let customer = load_customer(&state, id).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "data": customer }))))
}

// ── Create ────────────────────────────────────────────────────────────────────

pub async fn create_customer(
    State(state): State<AppState>,
    operator: Operator,
    Json(payload): Json<CreateCustomer>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let ctx = AuditContext::new(&operator, Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();
    let customer = catalog::create_customer(&payload, &ctx, &mut log)?;

    let db_start = Instant::now();
    db::with_retry(state.config.persist_retries, || {
        insert_once(&state, &customer, &log)
    })
    .await?;
    let db_elapsed = db_start.elapsed();

    info!(id = %customer.id, name = %customer.name, "Created customer");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "data": customer,
            "db_time_ms": millis(db_elapsed),
        })),
    ))
}

async fn insert_once(state: &AppState, customer: &Customer, log: &[AuditLogEntry]) -> AppResult<()> {
    let mut tx = state.db.begin().await?;
    db::customers::insert_customer(&mut tx, customer).await?;
    db::audit::insert_entries(&mut tx, log).await?;
    tx.commit().await?;
    Ok(())
}

// ── Update ────────────────────────────────────────────────────────────────────

pub async fn update_customer(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCustomer>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let (customer, changed) = db::with_retry(state.config.persist_retries, || {
        update_once(&state, &operator, id, &payload)
    })
    .await?;

    info!(id = %id, changed, "Updated customer");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "data": customer, "changed": changed })),
    ))
}

async fn update_once(
    state: &AppState,
    operator: &Operator,
    id: Uuid,
    payload: &UpdateCustomer,
) -> AppResult<(Customer, bool)> {
    let mut customer = load_customer(state, id).await?;
    let ctx = AuditContext::new(operator, Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();
    if !catalog::update_customer(&mut customer, payload, &ctx, &mut log)? {
        return Ok((customer, false));
    }

    let mut tx = state.db.begin().await?;
    db::customers::save_customer(&mut tx, &customer).await?;
    db::audit::insert_entries(&mut tx, &log).await?;
    tx.commit().await?;
    Ok((customer, true))
}

// ── Delete ────────────────────────────────────────────────────────────────────

pub async fn delete_customer(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let detached =
        db::with_retry(state.config.persist_retries, || delete_once(&state, &operator, id)).await?;

    info!(id = %id, detached, operator = %operator.user_id, "Deleted customer");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Customer deleted",
            "id": id,
            "detached_requests": detached,
        })),
    ))
}

/// Clears the customer from its requests (each audited and version-bumped),
/// then deletes the row. Returns how many requests were detached.
async fn delete_once(state: &AppState, operator: &Operator, id: Uuid) -> AppResult<usize> {
    let customer = load_customer(state, id).await?;
    let ctx = AuditContext::new(operator, Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();

    let mut tx = state.db.begin().await?;
    let mut requests = db::requests::lock_requests_for_customer(&mut tx, id).await?;
    let mut detached = 0;
    for request in &mut requests {
        if reconciliation::detach_reference(request, Detach::Customer(id), &ctx, &mut log)? {
            db::requests::save_request(&mut tx, request).await?;
            detached += 1;
        }
    }
    catalog::delete_customer(&customer, &ctx, &mut log);
    db::customers::delete_customer(&mut tx, id).await?;
    db::audit::insert_entries(&mut tx, &log).await?;
    tx.commit().await?;
    Ok(detached)
}

async fn load_customer(state: &AppState, id: Uuid) -> AppResult<Customer> {
    db::customers::fetch_customer(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Customer {} not found", id)))
}
