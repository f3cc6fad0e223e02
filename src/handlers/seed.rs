use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use super::millis;
use crate::{
    audit::Operator,
    db,
    error::AppResult,
    seed::{self, SeedCounts},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct SeedParams {
    pub customers: Option<usize>,
    pub products: Option<usize>,
    pub requests: Option<usize>,
}

impl SeedParams {
    fn counts(&self) -> SeedCounts {
        SeedCounts {
            customers: self.customers.unwrap_or(20).min(1_000),
            products: self.products.unwrap_or(15).min(500),
            requests: self.requests.unwrap_or(200).min(10_000),
        }
    }
}

/// POST /api/seed?customers=20&products=15&requests=200
pub async fn seed_data(
    State(state): State<AppState>,
    operator: Operator,
    Query(params): Query<SeedParams>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let counts = params.counts();
    let start = Instant::now();
    let summary = db::with_retry(state.config.persist_retries, || {
        seed::seed_demo_data(&state.db, &operator, counts)
    })
    .await?;
    let elapsed = start.elapsed();

    let total = db::requests::count_requests(&state.db).await?;
    info!(seeded = summary.requests, total, "Seed complete");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "seeded": summary,
            "total_requests_in_db": total,
            "elapsed_ms": millis(elapsed),
        })),
    ))
}
