use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::filters::RequestFilter;
use crate::models::{OutOfStockRequest, RequestRecord};

const COLUMNS: &str = "id, customer_id, product_id, product_size_id, quantity, delivery_quantity, \
     status, priority, request_date, notes, delivery_date, delivery_notes, created_by, version, \
     created_at, updated_at";

const RECORD_SELECT: &str = r#"
    SELECT r.id, r.customer_id, r.product_id, r.product_size_id, r.quantity, r.delivery_quantity,
           r.status, r.priority, r.request_date, r.notes, r.delivery_date, r.delivery_notes,
           r.created_by, r.version, r.created_at, r.updated_at,
           c.name AS customer_name, c.address AS customer_address,
           p.name AS product_name, s.label AS size_label
    FROM out_of_stock_requests r
    LEFT JOIN customers c ON c.id = r.customer_id
    LEFT JOIN products p ON p.id = r.product_id
    LEFT JOIN product_sizes s ON s.id = r.product_size_id
"#;

// ── Reads ─────────────────────────────────────────────────────────────────────

pub async fn fetch_request(pool: &PgPool, id: Uuid) -> AppResult<Option<OutOfStockRequest>> {
    let request = sqlx::query_as::<_, OutOfStockRequest>(&format!(
        "SELECT {COLUMNS} FROM out_of_stock_requests WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(request)
}

/// Rows come back in no particular order; missing ids are simply absent.
pub async fn fetch_requests_by_ids(pool: &PgPool, ids: &[Uuid]) -> AppResult<Vec<OutOfStockRequest>> {
    let requests = sqlx::query_as::<_, OutOfStockRequest>(&format!(
        "SELECT {COLUMNS} FROM out_of_stock_requests WHERE id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(pool)
    .await?;
    Ok(requests)
}

pub async fn fetch_record(pool: &PgPool, id: Uuid) -> AppResult<Option<RequestRecord>> {
    let record = sqlx::query_as::<_, RequestRecord>(&format!("{RECORD_SELECT} WHERE r.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(record)
}

/// Every record matching `filter`, newest first. All filter fields are applied
/// here, so grouping, summaries and export see the complete result.
pub async fn fetch_records(pool: &PgPool, filter: &RequestFilter) -> AppResult<Vec<RequestRecord>> {
    let records = sqlx::query_as::<_, RequestRecord>(&format!(
        r#"
        {RECORD_SELECT}
        WHERE ($1::uuid IS NULL OR r.customer_id = $1)
          AND ($2::uuid IS NULL OR r.product_id = $2)
          AND ($3::request_status IS NULL OR r.status = $3)
          AND ($4::request_priority IS NULL OR r.priority = $4)
          AND ($5::timestamptz IS NULL OR r.request_date >= $5)
          AND ($6::timestamptz IS NULL OR r.request_date <= $6)
          AND ($7::text IS NULL OR c.address ILIKE $7)
          AND ($8::text IS NULL
               OR c.name ILIKE $8
               OR p.name ILIKE $8
               OR c.address ILIKE $8
               OR r.notes ILIKE $8)
          AND (NOT $9::boolean OR (r.quantity > r.delivery_quantity AND r.status <> 'cancelled'))
        ORDER BY r.request_date DESC, r.id ASC
        "#
    ))
    .bind(filter.customer_id)
    .bind(filter.product_id)
    .bind(filter.status)
    .bind(filter.priority)
    .bind(filter.from)
    .bind(filter.to)
    .bind(filter.address_pattern())
    .bind(filter.search_pattern())
    .bind(filter.needs_delivery_only)
    .fetch_all(pool)
    .await?;
    Ok(records)
}

/// Requests pointing at a customer, locked until the transaction ends.
pub async fn lock_requests_for_customer(
    conn: &mut PgConnection,
    customer_id: Uuid,
) -> AppResult<Vec<OutOfStockRequest>> {
    let requests = sqlx::query_as::<_, OutOfStockRequest>(&format!(
        "SELECT {COLUMNS} FROM out_of_stock_requests WHERE customer_id = $1 FOR UPDATE"
    ))
    .bind(customer_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(requests)
}

/// Requests pointing at a product or one of its sizes, locked until the
/// transaction ends.
pub async fn lock_requests_for_product(
    conn: &mut PgConnection,
    product_id: Uuid,
    size_ids: &[Uuid],
) -> AppResult<Vec<OutOfStockRequest>> {
    let requests = sqlx::query_as::<_, OutOfStockRequest>(&format!(
        r#"
        SELECT {COLUMNS} FROM out_of_stock_requests
        WHERE product_id = $1 OR product_size_id = ANY($2)
        FOR UPDATE
        "#
    ))
    .bind(product_id)
    .bind(size_ids)
    .fetch_all(&mut *conn)
    .await?;
    Ok(requests)
}

pub async fn count_requests(pool: &PgPool) -> AppResult<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM out_of_stock_requests")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

// ── Writes ────────────────────────────────────────────────────────────────────

pub async fn insert_request(conn: &mut PgConnection, request: &OutOfStockRequest) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO out_of_stock_requests
            (id, customer_id, product_id, product_size_id, quantity, delivery_quantity,
             status, priority, request_date, notes, delivery_date, delivery_notes,
             created_by, version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(request.id)
    .bind(request.customer_id)
    .bind(request.product_id)
    .bind(request.product_size_id)
    .bind(request.quantity)
    .bind(request.delivery_quantity)
    .bind(request.status)
    .bind(request.priority)
    .bind(request.request_date)
    .bind(&request.notes)
    .bind(request.delivery_date)
    .bind(&request.delivery_notes)
    .bind(&request.created_by)
    .bind(request.version)
    .bind(request.created_at)
    .bind(request.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Writes every mutable column if the row is still at `request.version`,
/// bumping the stored version. A lost race is a [`AppError::Conflict`].
pub async fn save_request(conn: &mut PgConnection, request: &OutOfStockRequest) -> AppResult<i64> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE out_of_stock_requests
        SET customer_id       = $3,
            product_id        = $4,
            product_size_id   = $5,
            quantity          = $6,
            delivery_quantity = $7,
            status            = $8,
            priority          = $9,
            request_date      = $10,
            notes             = $11,
            delivery_date     = $12,
            delivery_notes    = $13,
            updated_at        = $14,
            version           = version + 1
        WHERE id = $1 AND version = $2
        RETURNING version
        "#,
    )
    .bind(request.id)
    .bind(request.version)
    .bind(request.customer_id)
    .bind(request.product_id)
    .bind(request.product_size_id)
    .bind(request.quantity)
    .bind(request.delivery_quantity)
    .bind(request.status)
    .bind(request.priority)
    .bind(request.request_date)
    .bind(&request.notes)
    .bind(request.delivery_date)
    .bind(&request.delivery_notes)
    .bind(request.updated_at)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|(version,)| version).ok_or_else(|| stale(request.id))
}

pub async fn delete_request(conn: &mut PgConnection, id: Uuid, version: i64) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM out_of_stock_requests WHERE id = $1 AND version = $2")
        .bind(id)
        .bind(version)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(stale(id));
    }
    Ok(())
}

fn stale(id: Uuid) -> AppError {
    AppError::Conflict(format!(
        "Request {} was changed or removed by someone else; reload and retry",
        id
    ))
}
