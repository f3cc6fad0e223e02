use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;

use super::millis;
use crate::{db, error::AppResult, models::AuditLogFilters, AppState};

pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(filters): Query<AuditLogFilters>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let start = Instant::now();
    let entries = db::audit::fetch_entries(&state.db, &filters).await?;
    let elapsed = start.elapsed();

    info!(count = entries.len(), elapsed_ms = elapsed.as_millis(), "Listed audit entries");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "data": entries,
            "count": entries.len(),
            "query_time_ms": millis(elapsed),
        })),
    ))
}

pub async fn entity_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let entries = db::audit::fetch_entity_history(&state.db, id).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "data": entries, "count": entries.len() })),
    ))
}
