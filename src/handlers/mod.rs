pub mod audit;
pub mod customers;
pub mod deliveries;
pub mod operator;
pub mod products;
pub mod requests;
pub mod seed;

use std::time::Duration;

use axum::{http::StatusCode, Json};
use serde_json::json;

pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok", "service": "oos-service" })))
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}
