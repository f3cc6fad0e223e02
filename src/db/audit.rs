use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{AuditLogEntry, AuditLogFilters};

const COLUMNS: &str = "id, operation_type, entity_type, entity_id, entity_description, \
     operator_user_id, operator_name, timestamp, operation_details, batch_id, related_entity_ids";

/// Appends entries. Callers pass the transaction that holds the audited mutation.
pub async fn insert_entries(conn: &mut PgConnection, entries: &[AuditLogEntry]) -> AppResult<()> {
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (id, operation_type, entity_type, entity_id, entity_description,
                 operator_user_id, operator_name, timestamp, operation_details,
                 batch_id, related_entity_ids)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id)
        .bind(entry.operation_type)
        .bind(entry.entity_type)
        .bind(entry.entity_id)
        .bind(&entry.entity_description)
        .bind(&entry.operator_user_id)
        .bind(&entry.operator_name)
        .bind(entry.timestamp)
        .bind(&entry.operation_details)
        .bind(entry.batch_id)
        .bind(&entry.related_entity_ids)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn fetch_entries(pool: &PgPool, filters: &AuditLogFilters) -> AppResult<Vec<AuditLogEntry>> {
    let (limit, offset) = super::page(filters.limit, filters.offset, 200, 5_000);

    let entries = sqlx::query_as::<_, AuditLogEntry>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM audit_logs
        WHERE ($1::audit_operation IS NULL OR operation_type = $1)
          AND ($2::audit_entity IS NULL OR entity_type = $2)
          AND ($3::text IS NULL OR operator_user_id = $3)
          AND ($4::uuid IS NULL OR batch_id = $4)
          AND ($5::timestamptz IS NULL OR timestamp >= $5)
          AND ($6::timestamptz IS NULL OR timestamp <= $6)
        ORDER BY timestamp DESC, id ASC
        LIMIT $7 OFFSET $8
        "#
    ))
    .bind(filters.operation_type)
    .bind(filters.entity_type)
    .bind(filters.operator_user_id.as_deref())
    .bind(filters.batch_id)
    .bind(filters.from)
    .bind(filters.to)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

/// Entries about one entity, including batch summaries that list it.
pub async fn fetch_entity_history(pool: &PgPool, entity_id: Uuid) -> AppResult<Vec<AuditLogEntry>> {
    let entries = sqlx::query_as::<_, AuditLogEntry>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM audit_logs
        WHERE entity_id = $1 OR $1 = ANY(related_entity_ids)
        ORDER BY timestamp DESC, id ASC
        "#
    ))
    .bind(entity_id)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}
