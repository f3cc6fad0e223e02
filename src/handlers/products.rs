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
    models::{
        AuditLogEntry, CreateProduct, Product, ProductFilters, ProductWithSizes, UpdateProduct,
    },
    reconciliation::{self, Detach},
    AppState,
};

// ── List ──────────────────────────────────────────────────────────────────────

pub async fn list_products(
    State(state): State<AppState>,
    Query(filters): Query<ProductFilters>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let start = Instant::now();
    let products = db::products::fetch_all_products(&state.db, &filters).await?;
    let elapsed = start.elapsed();

    info!(
        count = products.len(),
        elapsed_ms = elapsed.as_millis(),
        "Listed products"
    );

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "data": products,
            "count": products.len(),
            "query_time_ms": millis(elapsed),
        })),
    ))
}

// ── Create ────────────────────────────────────────────────────────────────────

pub async fn create_product(
    State(state): State<AppState>,
    operator: Operator,
    Json(payload): Json<CreateProduct>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let ctx = AuditContext::new(&operator, Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();
    let product = catalog::create_product(&payload, &ctx, &mut log)?;
    let sizes = catalog::clean_labels(&payload.sizes);

    let db_start = Instant::now();
    let created = db::with_retry(state.config.persist_retries, || {
        insert_once(&state, &product, &sizes, &log)
    })
    .await?;
    let db_elapsed = db_start.elapsed();

    info!(
        id = %product.id,
        name = %product.name,
        sizes = created.sizes.len(),
        "Created product"
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "data": created,
            "db_time_ms": millis(db_elapsed),
        })),
    ))
}

async fn insert_once(
    state: &AppState,
    product: &Product,
    sizes: &[String],
    log: &[AuditLogEntry],
) -> AppResult<ProductWithSizes> {
    let mut tx = state.db.begin().await?;
    db::products::insert_product(&mut tx, product).await?;
    let sizes = db::products::insert_sizes(&mut tx, product.id, sizes).await?;
    db::audit::insert_entries(&mut tx, log).await?;
    tx.commit().await?;
    Ok(ProductWithSizes {
        product: product.clone(),
        sizes,
    })
}

// ── Get by ID ─────────────────────────────────────────────────────────────────

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let start = Instant::now();
    let product = db::products::fetch_product_with_sizes(&state.db, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    let elapsed = start.elapsed();

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "data": product,
            "query_time_ms": millis(elapsed),
        })),
    ))
}

// ── Update ────────────────────────────────────────────────────────────────────

pub async fn update_product(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProduct>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let changed = db::with_retry(state.config.persist_retries, || {
        update_once(&state, &operator, id, &payload)
    })
    .await?;

    let product = db::products::fetch_product_with_sizes(&state.db, id)
        .await?
        .ok_or_else(|| not_found(id))?;

    info!(id = %id, changed, "Updated product");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "data": product, "changed": changed })),
    ))
}

async fn update_once(
    state: &AppState,
    operator: &Operator,
    id: Uuid,
    payload: &UpdateProduct,
) -> AppResult<bool> {
    let mut product = load_product(state, id).await?;
    let ctx = AuditContext::new(operator, Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();
    if !catalog::update_product(&mut product, payload, &ctx, &mut log)? {
        return Ok(false);
    }

    let mut tx = state.db.begin().await?;
    db::products::save_product(&mut tx, &product).await?;
    db::audit::insert_entries(&mut tx, &log).await?;
    tx.commit().await?;
    Ok(true)
}

// ── Delete ────────────────────────────────────────────────────────────────────

pub async fn delete_product(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let detached =
        db::with_retry(state.config.persist_retries, || delete_once(&state, &operator, id)).await?;

    info!(id = %id, detached, operator = %operator.user_id, "Deleted product");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Product deleted",
            "id": id,
            "detached_requests": detached,
        })),
    ))
}

/// Clears the product and its sizes from every request (each audited and
/// version-bumped), then deletes the row. Returns how many requests were detached.
async fn delete_once(state: &AppState, operator: &Operator, id: Uuid) -> AppResult<usize> {
    let product = load_product(state, id).await?;
    let size_ids: Vec<Uuid> = db::products::fetch_sizes_for(&state.db, &[id])
        .await?
        .into_iter()
        .map(|size| size.id)
        .collect();
    let ctx = AuditContext::new(operator, Utc::now());
    let mut log: Vec<AuditLogEntry> = Vec::new();
    let detach = Detach::Product {
        id,
        size_ids: &size_ids,
    };

    let mut tx = state.db.begin().await?;
    let mut requests = db::requests::lock_requests_for_product(&mut tx, id, &size_ids).await?;
    let mut detached = 0;
    for request in &mut requests {
        if reconciliation::detach_reference(request, detach, &ctx, &mut log)? {
            db::requests::save_request(&mut tx, request).await?;
            detached += 1;
        }
    }
    catalog::delete_product(&product, &ctx, &mut log);
    db::products::delete_product(&mut tx, id).await?;
    db::audit::insert_entries(&mut tx, &log).await?;
    tx.commit().await?;
    Ok(detached)
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Product {} not found", id))
}

async fn load_product(state: &AppState, id: Uuid) -> AppResult<Product> {
    db::products::fetch_product(&state.db, id)
        .await?
        .ok_or_else(|| not_found(id))
}
