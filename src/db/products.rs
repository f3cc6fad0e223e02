use std::collections::HashMap;

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Product, ProductFilters, ProductSize, ProductWithSizes};

const COLUMNS: &str = "id, name, description, category, colors, created_at, updated_at";

// ── Products ──────────────────────────────────────────────────────────────────

pub async fn fetch_all_products(pool: &PgPool, filters: &ProductFilters) -> AppResult<Vec<ProductWithSizes>> {
    let (limit, offset) = super::page(filters.limit, filters.offset, 1000, 10_000);

    let products = sqlx::query_as::<_, Product>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM products
        WHERE ($1::text IS NULL OR category = $1)
          AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%')
        ORDER BY name ASC
        LIMIT $3 OFFSET $4
        "#
    ))
    .bind(filters.category.as_deref())
    .bind(filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
    let mut sizes_by_product: HashMap<Uuid, Vec<ProductSize>> = HashMap::new();
    for size in fetch_sizes_for(pool, &ids).await? {
        sizes_by_product.entry(size.product_id).or_default().push(size);
    }

    Ok(products
        .into_iter()
        .map(|product| {
            let sizes = sizes_by_product.remove(&product.id).unwrap_or_default();
            ProductWithSizes { product, sizes }
        })
        .collect())
}

pub async fn fetch_product(pool: &PgPool, id: Uuid) -> AppResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(&format!("SELECT {COLUMNS} FROM products WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(product)
}

pub async fn fetch_product_with_sizes(pool: &PgPool, id: Uuid) -> AppResult<Option<ProductWithSizes>> {
    let Some(product) = fetch_product(pool, id).await? else {
        return Ok(None);
    };
    let sizes = fetch_sizes_for(pool, &[id]).await?;
    Ok(Some(ProductWithSizes { product, sizes }))
}

pub async fn insert_product(conn: &mut PgConnection, product: &Product) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO products (id, name, description, category, colors, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(product.id)
    .bind(&product.name)
    .bind(&product.description)
    .bind(&product.category)
    .bind(&product.colors)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn save_product(conn: &mut PgConnection, product: &Product) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE products
        SET name = $2, description = $3, category = $4, colors = $5, updated_at = $6
        WHERE id = $1
        "#,
    )
    .bind(product.id)
    .bind(&product.name)
    .bind(&product.description)
    .bind(&product.category)
    .bind(&product.colors)
    .bind(product.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Product {} not found", product.id)));
    }
    Ok(())
}

/// Sizes cascade; requests keep their rows with NULL product and size references.
pub async fn delete_product(conn: &mut PgConnection, id: Uuid) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Product {} not found", id)));
    }
    Ok(())
}

// ── Sizes ─────────────────────────────────────────────────────────────────────

pub async fn fetch_sizes_for(pool: &PgPool, product_ids: &[Uuid]) -> AppResult<Vec<ProductSize>> {
    let sizes = sqlx::query_as::<_, ProductSize>(
        "SELECT id, product_id, label FROM product_sizes WHERE product_id = ANY($1) ORDER BY label ASC",
    )
    .bind(product_ids)
    .fetch_all(pool)
    .await?;
    Ok(sizes)
}

/// Maps each existing size id to the product it belongs to.
pub async fn fetch_size_owners(pool: &PgPool, size_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Uuid>> {
    if size_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(Uuid, Uuid)> =
        sqlx::query_as("SELECT id, product_id FROM product_sizes WHERE id = ANY($1)")
            .bind(size_ids)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().collect())
}

/// Bulk insert via UNNEST; labels already present for the product are skipped.
pub async fn insert_sizes(
    conn: &mut PgConnection,
    product_id: Uuid,
    labels: &[String],
) -> AppResult<Vec<ProductSize>> {
    if labels.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = labels.iter().map(|_| Uuid::new_v4()).collect();

    let sizes = sqlx::query_as::<_, ProductSize>(
        r#"
        INSERT INTO product_sizes (id, product_id, label)
        SELECT id, $2, label FROM UNNEST($1::uuid[], $3::text[]) AS t(id, label)
        ON CONFLICT (product_id, label) DO NOTHING
        RETURNING id, product_id, label
        "#,
    )
    .bind(&ids)
    .bind(product_id)
    .bind(labels)
    .fetch_all(&mut *conn)
    .await?;
    Ok(sizes)
}
