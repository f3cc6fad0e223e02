use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::millis;
use crate::{
    audit::{AuditContext, Operator},
    db,
    error::{AppError, AppResult},
    export, filters,
    filters::RequestFilter,
    models::{
        AuditLogEntry, BatchDeleteInput, BatchUpdateInput, CreateRequestBatch, NewRequest,
        OutOfStockRequest, RequestChanges, RequestRecord, RequestView, StatusChange,
    },
    reconciliation::{self, BatchOutcome},
    AppState,
};

// ── Read ──────────────────────────────────────────────────────────────────────

async fn load_candidates(state: &AppState, filter: &RequestFilter) -> AppResult<Vec<RequestRecord>> {
    db::requests::fetch_records(&state.db, filter).await
}

pub(crate) async fn fetch_view(state: &AppState, id: Uuid) -> AppResult<serde_json::Value> {
    let record = db::requests::fetch_record(&state.db, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    serde_json::to_value(RequestView::from(&record)).map_err(|e| AppError::Internal(e.into()))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Query(filter): Query<RequestFilter>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let start = Instant::now();
    let records = load_candidates(&state, &filter).await?;
    let elapsed = start.elapsed();

    let matched = filters::filter_records(&records, &filter);
    let views: Vec<RequestView> = matched.into_iter().map(RequestView::from).collect();
    info!(count = views.len(), elapsed_ms = elapsed.as_millis(), "Listed requests");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "data": views,
            "count": views.len(),
            "query_time_ms": millis(elapsed),
        })),
    ))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let view = fetch_view(&state, id).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "data": view }))))
}

pub async fn grouped_requests(
    State(state): State<AppState>,
    Query(filter): Query<RequestFilter>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let records = load_candidates(&state, &filter).await?;
    let matched = filters::filter_records(&records, &filter);
    let groups = filters::group_by_customer(matched.iter().copied());

    info!(groups = groups.len(), requests = matched.len(), "Grouped requests by customer");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "data": groups, "count": groups.len() })),
    ))
}

pub async fn request_summary(
    State(state): State<AppState>,
    Query(filter): Query<RequestFilter>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let records = load_candidates(&state, &filter).await?;
    let summary = filters::summarize(filters::filter_records(&records, &filter));
    Ok((StatusCode::OK, Json(serde_json::json!({ "data": summary }))))
}

pub async fn export_csv(
    State(state): State<AppState>,
    Query(filter): Query<RequestFilter>,
) -> AppResult<Response> {
    let records = load_candidates(&state, &filter).await?;
    let matched = filters::filter_records(&records, &filter);
    let csv = export::requests_to_csv(matched.iter().copied())?;
    let filename = format!("out_of_stock_{}.csv", Utc::now().format("%Y%m%d_%H%M%S"));

    info!(rows = matched.len(), %filename, "Exported requests");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        csv,
    )
        .into_response())
}

// ── Create ────────────────────────────────────────────────────────────────────

pub async fn create_request(
    State(state): State<AppState>,
    operator: Operator,
    Json(payload): Json<NewRequest>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    check_size(&state, payload.product_id, payload.product_size_id).await?;

    let ctx = AuditContext::new(&operator, Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();
    let request = reconciliation::create_request(&payload, &ctx, &mut log)?;

    let db_start = Instant::now();
    db::with_retry(state.config.persist_retries, || {
        insert_requests(&state, std::slice::from_ref(&request), &log)
    })
    .await?;
    let db_elapsed = db_start.elapsed();

    info!(
        id = %request.id,
        quantity = request.quantity,
        operator = %operator.user_id,
        "Created out-of-stock request"
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "data": fetch_view(&state, request.id).await?,
            "db_time_ms": millis(db_elapsed),
        })),
    ))
}

pub async fn create_request_batch(
    State(state): State<AppState>,
    operator: Operator,
    Json(payload): Json<CreateRequestBatch>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    if payload.requests.is_empty() {
        return Err(AppError::BadRequest("requests must not be empty".to_string()));
    }
    let size_ids: Vec<Uuid> = payload
        .requests
        .iter()
        .filter_map(|r| r.product_size_id)
        .collect();
    let size_owners = db::products::fetch_size_owners(&state.db, &size_ids).await?;

    let ctx = AuditContext::new(&operator, Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();
    let (created, outcome) =
        reconciliation::create_batch(&payload.requests, &size_owners, &ctx, &mut log);

    if !created.is_empty() {
        db::with_retry(state.config.persist_retries, || {
            insert_requests(&state, &created, &log)
        })
        .await?;
    }

    info!(
        created = created.len(),
        skipped = outcome.skipped.len(),
        batch_id = ?outcome.batch_id,
        "Created out-of-stock request batch"
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "data": created, "outcome": outcome })),
    ))
}

async fn insert_requests(
    state: &AppState,
    requests: &[OutOfStockRequest],
    log: &[AuditLogEntry],
) -> AppResult<()> {
    let mut tx = state.db.begin().await?;
    for request in requests {
        db::requests::insert_request(&mut tx, request).await?;
    }
    db::audit::insert_entries(&mut tx, log).await?;
    tx.commit().await?;
    Ok(())
}

// ── Update ────────────────────────────────────────────────────────────────────

pub async fn update_request(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<Uuid>,
    Json(changes): Json<RequestChanges>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let changed = db::with_retry(state.config.persist_retries, || {
        update_once(&state, &operator, id, &changes)
    })
    .await?;

    info!(id = %id, changed = ?changed, "Updated out-of-stock request");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "data": fetch_view(&state, id).await?,
            "changed_fields": changed,
        })),
    ))
}

async fn update_once(
    state: &AppState,
    operator: &Operator,
    id: Uuid,
    changes: &RequestChanges,
) -> AppResult<Vec<String>> {
    let mut request = load_request(state, id).await?;
    if let Some(expected) = changes.expected_version {
        if expected != request.version {
            return Err(AppError::Conflict(format!(
                "Request {} is at version {}, not {}",
                id, request.version, expected
            )));
        }
    }

    if changes.product_id.is_some() || changes.product_size_id.is_some() {
        check_size(
            state,
            changes.product_id.unwrap_or(request.product_id),
            changes.product_size_id.unwrap_or(request.product_size_id),
        )
        .await?;
    }

    let ctx = AuditContext::new(operator, Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();
    let changed = reconciliation::update_fields(&mut request, changes, &ctx, &mut log)?;
    if changed.is_empty() {
        return Ok(changed);
    }

    save_requests(state, &[&request], &log).await?;
    Ok(changed)
}

pub async fn change_status(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusChange>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let changed = db::with_retry(state.config.persist_retries, || {
        status_once(&state, &operator, id, &payload)
    })
    .await?;

    info!(id = %id, status = %payload.status, force = payload.force, changed, "Changed request status");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "data": fetch_view(&state, id).await?,
            "changed": changed,
        })),
    ))
}

async fn status_once(
    state: &AppState,
    operator: &Operator,
    id: Uuid,
    payload: &StatusChange,
) -> AppResult<bool> {
    let mut request = load_request(state, id).await?;
    let ctx = AuditContext::new(operator, Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();
    let changed =
        reconciliation::change_status(&mut request, payload.status, payload.force, &ctx, &mut log)?;
    if changed {
        save_requests(state, &[&request], &log).await?;
    }
    Ok(changed)
}

pub async fn batch_update(
    State(state): State<AppState>,
    operator: Operator,
    Json(payload): Json<BatchUpdateInput>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    if payload.request_ids.is_empty() {
        return Err(AppError::BadRequest("request_ids must not be empty".to_string()));
    }
    let outcome = db::with_retry(state.config.persist_retries, || {
        batch_update_once(&state, &operator, &payload)
    })
    .await?;

    info!(
        applied = outcome.applied.len(),
        unchanged = outcome.unchanged.len(),
        skipped = outcome.skipped.len(),
        batch_id = ?outcome.batch_id,
        "Applied batch update"
    );

    Ok((StatusCode::OK, Json(serde_json::json!({ "data": outcome }))))
}

async fn batch_update_once(
    state: &AppState,
    operator: &Operator,
    payload: &BatchUpdateInput,
) -> AppResult<BatchOutcome> {
    let mut requests = load_requests(state, &payload.request_ids).await?;
    let ctx = AuditContext::new(operator, Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();
    let outcome = reconciliation::apply_batch_update(
        &mut requests,
        &payload.request_ids,
        &payload.change,
        &ctx,
        &mut log,
    );

    if !outcome.applied.is_empty() {
        let applied: Vec<&OutOfStockRequest> =
            outcome.applied.iter().map(|id| &requests[id]).collect();
        save_requests(state, &applied, &log).await?;
    }
    Ok(outcome)
}

// ── Delete ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub expected_version: Option<i64>,
}

pub async fn delete_request(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<Uuid>,
    Query(params): Query<DeleteParams>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    db::with_retry(state.config.persist_retries, || {
        delete_once(&state, &operator, id, params.expected_version)
    })
    .await?;

    info!(id = %id, operator = %operator.user_id, "Deleted out-of-stock request");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": "Request deleted", "id": id })),
    ))
}

async fn delete_once(
    state: &AppState,
    operator: &Operator,
    id: Uuid,
    expected_version: Option<i64>,
) -> AppResult<()> {
    let request = load_request(state, id).await?;
    let version = expected_version.unwrap_or(request.version);
    let ctx = AuditContext::new(operator, Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();
    reconciliation::delete_request(&request, &ctx, &mut log);

    let mut tx = state.db.begin().await?;
    db::requests::delete_request(&mut tx, id, version).await?;
    db::audit::insert_entries(&mut tx, &log).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn batch_delete(
    State(state): State<AppState>,
    operator: Operator,
    Json(payload): Json<BatchDeleteInput>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    if payload.request_ids.is_empty() {
        return Err(AppError::BadRequest("request_ids must not be empty".to_string()));
    }
    let outcome = db::with_retry(state.config.persist_retries, || {
        batch_delete_once(&state, &operator, &payload.request_ids)
    })
    .await?;

    info!(
        deleted = outcome.applied.len(),
        skipped = outcome.skipped.len(),
        batch_id = ?outcome.batch_id,
        "Deleted request batch"
    );

    Ok((StatusCode::OK, Json(serde_json::json!({ "data": outcome }))))
}

async fn batch_delete_once(
    state: &AppState,
    operator: &Operator,
    ids: &[Uuid],
) -> AppResult<BatchOutcome> {
    let requests = load_requests(state, ids).await?;
    let ctx = AuditContext::new(operator, Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();
    let outcome = reconciliation::delete_batch(&requests, ids, &ctx, &mut log);

    if !outcome.applied.is_empty() {
        let mut tx = state.db.begin().await?;
        for id in &outcome.applied {
            db::requests::delete_request(&mut tx, *id, requests[id].version).await?;
        }
        db::audit::insert_entries(&mut tx, &log).await?;
        tx.commit().await?;
    }
    Ok(outcome)
}

// ── Shared ────────────────────────────────────────────────────────────────────

pub(crate) fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Request {} not found", id))
}

pub(crate) async fn load_request(state: &AppState, id: Uuid) -> AppResult<OutOfStockRequest> {
    db::requests::fetch_request(&state.db, id)
        .await?
        .ok_or_else(|| not_found(id))
}

pub(crate) async fn load_requests(
    state: &AppState,
    ids: &[Uuid],
) -> AppResult<IndexMap<Uuid, OutOfStockRequest>> {
    let requests = db::requests::fetch_requests_by_ids(&state.db, ids).await?;
    Ok(requests.into_iter().map(|r| (r.id, r)).collect())
}

/// Rejects a size that belongs to another product.
async fn check_size(
    state: &AppState,
    product_id: Option<Uuid>,
    size_id: Option<Uuid>,
) -> AppResult<()> {
    let Some(size) = size_id else {
        return Ok(());
    };
    let owners = db::products::fetch_size_owners(&state.db, &[size]).await?;
    reconciliation::check_size(product_id, size_id, owners.get(&size).copied())?;
    Ok(())
}

/// Saves the mutated requests and their audit entries in one transaction.
pub(crate) async fn save_requests(
    state: &AppState,
    requests: &[&OutOfStockRequest],
    log: &[AuditLogEntry],
) -> AppResult<()> {
    let mut tx = state.db.begin().await?;
    for request in requests {
        db::requests::save_request(&mut tx, *request).await?;
    }
    db::audit::insert_entries(&mut tx, log).await?;
    tx.commit().await?;
    Ok(())
}
