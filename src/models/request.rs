use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::double_option;

/// Lifecycle of an out-of-stock request. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "request_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Confirmed,
    InProduction,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 5] = [
        RequestStatus::Pending,
        RequestStatus::Confirmed,
        RequestStatus::InProduction,
        RequestStatus::Completed,
        RequestStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Confirmed => "confirmed",
            RequestStatus::InProduction => "in_production",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl Default for RequestStatus {
    fn default() -> Self {
        RequestStatus::Pending
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "request_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of a request has been handed over, derived from the quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryProgress {
    None,
    Partial,
    Full,
}

impl DeliveryProgress {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryProgress::None => "none",
            DeliveryProgress::Partial => "partial",
            DeliveryProgress::Full => "full",
        }
    }
}

/// A customer's request for a product that was out of stock at order time.
///
/// `delivery_quantity` is the cumulative amount already delivered (returned)
/// to the customer and never exceeds `quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutOfStockRequest {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub product_size_id: Option<Uuid>,
    pub quantity: i32,
    pub delivery_quantity: i32,
    pub status: RequestStatus,
    pub priority: Priority,
    pub request_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub delivery_notes: Option<String>,
    pub created_by: String,
    /// Optimistic concurrency counter, bumped by every successful save.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutOfStockRequest {
    pub fn remaining_quantity(&self) -> i32 {
        (self.quantity - self.delivery_quantity).max(0)
    }

    pub fn needs_delivery(&self) -> bool {
        self.remaining_quantity() > 0 && self.status != RequestStatus::Cancelled
    }

    pub fn has_partial_delivery(&self) -> bool {
        self.delivery_quantity > 0 && self.delivery_quantity < self.quantity
    }

    pub fn is_fully_delivered(&self) -> bool {
        self.quantity > 0 && self.delivery_quantity == self.quantity
    }

    pub fn delivery_progress(&self) -> DeliveryProgress {
        if self.is_fully_delivered() {
            DeliveryProgress::Full
        } else if self.has_partial_delivery() {
            DeliveryProgress::Partial
        } else {
            DeliveryProgress::None
        }
    }

    pub fn description(&self) -> String {
        format!(
            "Out-of-stock request {} ({} of {} delivered)",
            self.id, self.delivery_quantity, self.quantity
        )
    }
}

/// Request joined with the display data of its references.
///
/// A `None` name means the referenced record is absent, not unknown.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RequestRecord {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub request: OutOfStockRequest,
    pub customer_name: Option<String>,
    pub customer_address: Option<String>,
    pub product_name: Option<String>,
    pub size_label: Option<String>,
}

/// API representation: the record plus its derived quantities.
#[derive(Debug, Serialize)]
pub struct RequestView<'a> {
    #[serde(flatten)]
    pub record: &'a RequestRecord,
    pub remaining_quantity: i32,
    pub needs_delivery: bool,
    pub has_partial_delivery: bool,
    pub is_fully_delivered: bool,
    pub delivery_progress: DeliveryProgress,
}

impl<'a> From<&'a RequestRecord> for RequestView<'a> {
    fn from(record: &'a RequestRecord) -> Self {
        let request = &record.request;
        Self {
            record,
            remaining_quantity: request.remaining_quantity(),
            needs_delivery: request.needs_delivery(),
            has_partial_delivery: request.has_partial_delivery(),
            is_fully_delivered: request.is_fully_delivered(),
            delivery_progress: request.delivery_progress(),
        }
    }
}

// ── Request payloads ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NewRequest {
    pub customer_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub product_size_id: Option<Uuid>,
    pub quantity: i32,
    #[serde(default)]
    pub priority: Priority,
    /// Defaults to the creation time.
    pub request_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRequestBatch {
    pub requests: Vec<NewRequest>,
}

/// Partial edit of a request. Absent fields are left alone; `null` clears a
/// nullable field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestChanges {
    #[serde(default, deserialize_with = "double_option")]
    pub customer_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub product_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub product_size_id: Option<Option<Uuid>>,
    pub quantity: Option<i32>,
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    pub request_date: Option<DateTime<Utc>>,
    /// Version the client last saw; a mismatch is a conflict.
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    pub status: RequestStatus,
    /// Allows completion while quantity is still outstanding.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryInput {
    #[serde(alias = "return_quantity")]
    pub quantity: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchDeliveryItem {
    pub request_id: Uuid,
    #[serde(alias = "return_quantity")]
    pub quantity: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchDeliveryInput {
    pub items: Vec<BatchDeliveryItem>,
}

/// One change applied uniformly to many requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchChange {
    Status {
        status: RequestStatus,
        #[serde(default)]
        force: bool,
    },
    Priority {
        priority: Priority,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchUpdateInput {
    pub request_ids: Vec<Uuid>,
    pub change: BatchChange,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchDeleteInput {
    pub request_ids: Vec<Uuid>,
}
