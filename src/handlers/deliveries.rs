use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::{
    millis,
    requests::{fetch_view, load_request, load_requests, save_requests},
};
use crate::{
    audit::{AuditContext, Operator},
    db,
    error::{AppError, AppResult},
    models::{AuditLogEntry, BatchDeliveryInput, DeliveryInput, OutOfStockRequest},
    reconciliation::{self, BatchOutcome},
    AppState,
};

// ── Single delivery ───────────────────────────────────────────────────────────

pub async fn apply_delivery(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeliveryInput>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let db_start = Instant::now();
    db::with_retry(state.config.persist_retries, || {
        delivery_once(&state, &operator, id, &payload)
    })
    .await?;
    let db_elapsed = db_start.elapsed();

    info!(
        id = %id,
        quantity = payload.quantity,
        operator = %operator.user_id,
        "Recorded delivery"
    );

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "data": fetch_view(&state, id).await?,
            "db_time_ms": millis(db_elapsed),
        })),
    ))
}

async fn delivery_once(
    state: &AppState,
    operator: &Operator,
    id: Uuid,
    payload: &DeliveryInput,
) -> AppResult<()> {
    let mut request = load_request(state, id).await?;
    let ctx = AuditContext::new(operator, Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();
    reconciliation::apply_delivery(
        &mut request,
        payload.quantity,
        payload.notes.as_deref(),
        &ctx,
        &mut log,
    )?;
    save_requests(state, &[&request], &log).await
}

// ── Batch delivery ────────────────────────────────────────────────────────────

pub async fn apply_batch(
    State(state): State<AppState>,
    operator: Operator,
    Json(payload): Json<BatchDeliveryInput>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    if payload.items.is_empty() {
        return Err(AppError::BadRequest("items must not be empty".to_string()));
    }

    let db_start = Instant::now();
    let outcome = db::with_retry(state.config.persist_retries, || {
        batch_once(&state, &operator, &payload)
    })
    .await?;
    let db_elapsed = db_start.elapsed();

    info!(
        applied = outcome.applied.len(),
        skipped = outcome.skipped.len(),
        batch_id = ?outcome.batch_id,
        "Processed delivery batch"
    );

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "data": outcome,
            "db_time_ms": millis(db_elapsed),
        })),
    ))
}

async fn batch_once(
    state: &AppState,
    operator: &Operator,
    payload: &BatchDeliveryInput,
) -> AppResult<BatchOutcome> {
    let ids: Vec<Uuid> = payload.items.iter().map(|item| item.request_id).collect();
    let mut requests = load_requests(state, &ids).await?;

    let ctx = AuditContext::new(operator, Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();
    let outcome = reconciliation::apply_batch(&mut requests, &payload.items, &ctx, &mut log);

    if !outcome.applied.is_empty() {
        let applied: Vec<&OutOfStockRequest> =
            outcome.applied.iter().map(|id| &requests[id]).collect();
        save_requests(state, &applied, &log).await?;
    }
    Ok(outcome)
}
