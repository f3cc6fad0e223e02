use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Customer, OutOfStockRequest, Priority, Product, RequestStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_operation", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Update,
    Delete,
    StatusChange,
    ReturnProcess,
    BatchUpdate,
    BatchDelete,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
            OperationType::StatusChange => "status_change",
            OperationType::ReturnProcess => "return_process",
            OperationType::BatchUpdate => "batch_update",
            OperationType::BatchDelete => "batch_delete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_entity", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    OutOfStockRequest,
    Customer,
    Product,
}

/// A single attribute value captured in an update diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(Option<String>),
    Quantity(i32),
    Reference(Option<Uuid>),
    Priority(Priority),
    Status(RequestStatus),
    Timestamp(DateTime<Utc>),
}

/// Full copy of an entity at creation or deletion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum EntitySnapshot {
    OutOfStockRequest(OutOfStockRequest),
    Customer(Customer),
    Product(Product),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Delivery,
    Status,
    Priority,
    Delete,
}

/// Operation-specific payload of an audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationDetails {
    Create {
        snapshot: EntitySnapshot,
    },
    Update {
        changed_fields: Vec<String>,
        /// Values of the changed fields before the edit.
        before: BTreeMap<String, FieldValue>,
        after: BTreeMap<String, FieldValue>,
    },
    Delete {
        snapshot: EntitySnapshot,
    },
    StatusChange {
        from: RequestStatus,
        to: RequestStatus,
        forced: bool,
        remaining_quantity: i32,
    },
    ReturnProcess {
        quantity: i32,
        notes: Option<String>,
        delivered_before: i32,
        delivered_after: i32,
        status_before: RequestStatus,
        status_after: RequestStatus,
    },
    BatchOperation {
        batch_kind: BatchKind,
        affected_ids: Vec<Uuid>,
        skipped_ids: Vec<Uuid>,
    },
}

impl OperationDetails {
    /// The operation type an entry carrying this payload is filed under.
    pub fn operation_type(&self) -> OperationType {
        match self {
            OperationDetails::Create { .. } => OperationType::Create,
            OperationDetails::Update { .. } => OperationType::Update,
            OperationDetails::Delete { .. } => OperationType::Delete,
            OperationDetails::StatusChange { .. } => OperationType::StatusChange,
            OperationDetails::ReturnProcess { .. } => OperationType::ReturnProcess,
            OperationDetails::BatchOperation { batch_kind, .. } => match batch_kind {
                BatchKind::Delete => OperationType::BatchDelete,
                _ => OperationType::BatchUpdate,
            },
        }
    }
}

/// Append-only record of one mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub operation_type: OperationType,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub entity_description: String,
    pub operator_user_id: String,
    pub operator_name: String,
    pub timestamp: DateTime<Utc>,
    pub operation_details: sqlx::types::Json<OperationDetails>,
    pub batch_id: Option<Uuid>,
    pub related_entity_ids: Vec<Uuid>,
}

impl AuditLogEntry {
    pub fn details(&self) -> &OperationDetails {
        &self.operation_details.0
    }
}

// ── Query parameters ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct AuditLogFilters {
    pub operation_type: Option<OperationType>,
    pub entity_type: Option<EntityType>,
    pub operator_user_id: Option<String>,
    pub batch_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_kind_selects_operation_type() {
        let details = |batch_kind| OperationDetails::BatchOperation {
            batch_kind,
            affected_ids: vec![],
            skipped_ids: vec![],
        };
        assert_eq!(details(BatchKind::Delete).operation_type(), OperationType::BatchDelete);
        assert_eq!(details(BatchKind::Delivery).operation_type(), OperationType::BatchUpdate);
        assert_eq!(details(BatchKind::Priority).operation_type(), OperationType::BatchUpdate);
    }

    #[test]
    fn details_decode_without_casting() {
        let raw = r#"{
            "kind": "update",
            "changed_fields": ["quantity"],
            "before": {"quantity": {"type": "quantity", "value": 5}},
            "after": {"quantity": {"type": "quantity", "value": 8}}
        }"#;
        let details: OperationDetails = serde_json::from_str(raw).unwrap();
        match details {
            OperationDetails::Update { changed_fields, before, after } => {
                assert_eq!(changed_fields, vec!["quantity".to_string()]);
                assert_eq!(before["quantity"], FieldValue::Quantity(5));
                assert_eq!(after["quantity"], FieldValue::Quantity(8));
            }
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[test]
    fn operation_type_display_matches_wire_name() {
        assert_eq!(OperationType::ReturnProcess.to_string(), "return_process");
        assert_eq!(
            serde_json::to_string(&OperationType::StatusChange).unwrap(),
            "\"status_change\""
        );
    }
}
