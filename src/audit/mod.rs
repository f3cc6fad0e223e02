use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{AuditLogEntry, EntityType, FieldValue, OperationDetails};

/// The authenticated salesperson performing a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operator {
    pub user_id: String,
    pub name: String,
}

/// Receives audit entries produced by mutating operations.
pub trait AuditSink {
    fn record(&mut self, entry: AuditLogEntry);
}

/// Collecting sink: the HTTP layer drains it into the same transaction as the mutation.
impl AuditSink for Vec<AuditLogEntry> {
    fn record(&mut self, entry: AuditLogEntry) {
        self.push(entry);
    }
}

/// Who, when, and (for batch operations) which batch an entry belongs to.
#[derive(Debug, Clone)]
pub struct AuditContext<'a> {
    pub operator: &'a Operator,
    pub now: DateTime<Utc>,
    pub batch_id: Option<Uuid>,
}

impl<'a> AuditContext<'a> {
    pub fn new(operator: &'a Operator, now: DateTime<Utc>) -> Self {
        Self {
            operator,
            now,
            batch_id: None,
        }
    }

    /// Same operator and clock, tagged with a fresh batch id.
    pub fn for_batch(&self) -> Self {
        Self {
            operator: self.operator,
            now: self.now,
            batch_id: Some(Uuid::new_v4()),
        }
    }

    pub fn entry(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        entity_description: String,
        details: OperationDetails,
    ) -> AuditLogEntry {
        self.entry_with_related(entity_type, entity_id, entity_description, details, Vec::new())
    }

    pub fn entry_with_related(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        entity_description: String,
        details: OperationDetails,
        related_entity_ids: Vec<Uuid>,
    ) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            operation_type: details.operation_type(),
            entity_type,
            entity_id,
            entity_description,
            operator_user_id: self.operator.user_id.clone(),
            operator_name: self.operator.name.clone(),
            timestamp: self.now,
            operation_details: sqlx::types::Json(details),
            batch_id: self.batch_id,
            related_entity_ids,
        }
    }
}

/// Before/after values of the fields an edit actually changes.
#[derive(Debug, Default)]
pub struct FieldDiff {
    changed: Vec<String>,
    before: BTreeMap<String, FieldValue>,
    after: BTreeMap<String, FieldValue>,
}

impl FieldDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares `old` with a proposed value; records the pair only when they differ.
    /// Returns whether the field changed.
    pub fn compare<T, F>(&mut self, name: &str, old: &T, new: Option<&T>, to_value: F) -> bool
    where
        T: PartialEq + Clone,
        F: Fn(T) -> FieldValue,
    {
        match new {
            Some(new) if new != old => {
                self.changed.push(name.to_string());
                self.before.insert(name.to_string(), to_value(old.clone()));
                self.after.insert(name.to_string(), to_value(new.clone()));
                true
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn changed_fields(&self) -> &[String] {
        &self.changed
    }

    pub fn into_details(self) -> OperationDetails {
        OperationDetails::Update {
            changed_fields: self.changed,
            before: self.before,
            after: self.after,
        }
    }
}
