use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Customer, CustomerFilters};

const COLUMNS: &str = "id, name, address, phone, created_at, updated_at";

pub async fn fetch_all_customers(pool: &PgPool, filters: &CustomerFilters) -> AppResult<Vec<Customer>> {
    let (limit, offset) = super::page(filters.limit, filters.offset, 1000, 10_000);

    let customers = sqlx::query_as::<_, Customer>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM customers
        WHERE ($1::text IS NULL
               OR name ILIKE '%' || $1 || '%'
               OR address ILIKE '%' || $1 || '%')
        ORDER BY name ASC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(customers)
}

pub async fn fetch_customer(pool: &PgPool, id: Uuid) -> AppResult<Option<Customer>> {
    let customer = sqlx::query_as::<_, Customer>(&format!("SELECT {COLUMNS} FROM customers WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(customer)
}

pub async fn insert_customer(conn: &mut PgConnection, customer: &Customer) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO customers (id, name, address, phone, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(customer.id)
    .bind(&customer.name)
    .bind(&customer.address)
    .bind(&customer.phone)
    .bind(customer.created_at)
    .bind(customer.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn save_customer(conn: &mut PgConnection, customer: &Customer) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE customers
        SET name = $2, address = $3, phone = $4, updated_at = $5
        WHERE id = $1
        "#,
    )
    .bind(customer.id)
    .bind(&customer.name)
    .bind(&customer.address)
    .bind(&customer.phone)
    .bind(customer.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Customer {} not found", customer.id)));
    }
    Ok(())
}

/// Requests keep their rows; their customer reference becomes NULL.
pub async fn delete_customer(conn: &mut PgConnection, id: Uuid) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM customers WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Customer {} not found", id)));
    }
    Ok(())
}
