//! Filtering and aggregation over request records. Pure and order-preserving.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Priority, RequestRecord, RequestStatus};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestFilter {
    pub customer_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    /// Case-insensitive substring of the customer address.
    pub address: Option<String>,
    pub status: Option<RequestStatus>,
    pub priority: Option<Priority>,
    /// Inclusive lower bound on `request_date`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `request_date`.
    pub to: Option<DateTime<Utc>>,
    /// Case-insensitive match on customer name, product name, address, or notes.
    pub search: Option<String>,
    #[serde(default)]
    pub needs_delivery_only: bool,
}

impl RequestFilter {
    pub fn matches(&self, record: &RequestRecord) -> bool {
        let request = &record.request;

        if self.customer_id.is_some() && request.customer_id != self.customer_id {
            return false;
        }
        if self.product_id.is_some() && request.product_id != self.product_id {
            return false;
        }
        if let Some(status) = self.status {
            if request.status != status {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if request.priority != priority {
                return false;
            }
        }
        if self.from.is_some_and(|from| request.request_date < from) {
            return false;
        }
        if self.to.is_some_and(|to| request.request_date > to) {
            return false;
        }
        if self.needs_delivery_only && !request.needs_delivery() {
            return false;
        }
        if let Some(needle) = normalized(self.address.as_deref()) {
            if !contains_ci(record.customer_address.as_deref(), &needle) {
                return false;
            }
        }
        if let Some(needle) = normalized(self.search.as_deref()) {
            let hit = [
                record.customer_name.as_deref(),
                record.product_name.as_deref(),
                record.customer_address.as_deref(),
                request.notes.as_deref(),
            ]
            .into_iter()
            .any(|field| contains_ci(field, &needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

impl RequestFilter {
    /// `ILIKE` pattern for the address filter.
    pub fn address_pattern(&self) -> Option<String> {
        like_pattern(self.address.as_deref())
    }

    /// `ILIKE` pattern for the free-text search.
    pub fn search_pattern(&self) -> Option<String> {
        like_pattern(self.search.as_deref())
    }
}

/// Substring pattern with `%`, `_` and `\` escaped, so SQL matches the same
/// literal text as [`RequestFilter::matches`].
fn like_pattern(text: Option<&str>) -> Option<String> {
    let text = text.map(str::trim).filter(|t| !t.is_empty())?;
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    Some(pattern)
}

pub fn filter_records<'a>(records: &'a [RequestRecord], filter: &RequestFilter) -> Vec<&'a RequestRecord> {
    records.iter().filter(|r| filter.matches(r)).collect()
}

/// Requests of one customer. `customer_id == None` collects requests without a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerGroup {
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub customer_address: Option<String>,
    pub request_ids: Vec<Uuid>,
    pub total_quantity: i64,
    /// Still to deliver, over requests that need delivery.
    pub returnable_quantity: i64,
    /// Already delivered.
    pub returned_quantity: i64,
}

/// One group per distinct customer id, in first-seen order.
pub fn group_by_customer<'a, I>(records: I) -> Vec<CustomerGroup>
where
    I: IntoIterator<Item = &'a RequestRecord>,
{
    let mut groups: IndexMap<Option<Uuid>, CustomerGroup> = IndexMap::new();

    for record in records {
        let request = &record.request;
        let group = groups
            .entry(request.customer_id)
            .or_insert_with(|| CustomerGroup {
                customer_id: request.customer_id,
                customer_name: record.customer_name.clone(),
                customer_address: record.customer_address.clone(),
                request_ids: Vec::new(),
                total_quantity: 0,
                returnable_quantity: 0,
                returned_quantity: 0,
            });

        group.request_ids.push(request.id);
        group.total_quantity += i64::from(request.quantity);
        group.returned_quantity += i64::from(request.delivery_quantity);
        if request.needs_delivery() {
            group.returnable_quantity += i64::from(request.remaining_quantity());
        }
    }

    groups.into_values().collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestSummary {
    pub total_requests: usize,
    pub by_status: IndexMap<RequestStatus, usize>,
    pub needs_delivery: usize,
    pub partially_delivered: usize,
    pub total_quantity: i64,
    pub delivered_quantity: i64,
    pub outstanding_quantity: i64,
}

/// Dashboard counts over a set of records.
pub fn summarize<'a, I>(records: I) -> RequestSummary
where
    I: IntoIterator<Item = &'a RequestRecord>,
{
    let mut summary = RequestSummary {
        by_status: RequestStatus::ALL.iter().map(|s| (*s, 0)).collect(),
        ..Default::default()
    };

    for record in records {
        let request = &record.request;
        summary.total_requests += 1;
        *summary.by_status.entry(request.status).or_insert(0) += 1;
        if request.needs_delivery() {
            summary.needs_delivery += 1;
            summary.outstanding_quantity += i64::from(request.remaining_quantity());
        }
        if request.has_partial_delivery() {
            summary.partially_delivered += 1;
        }
        summary.total_quantity += i64::from(request.quantity);
        summary.delivered_quantity += i64::from(request.delivery_quantity);
    }

    summary
}

fn normalized(text: Option<&str>) -> Option<String> {
    text.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty())
}

fn contains_ci(field: Option<&str>, needle: &str) -> bool {
    field.is_some_and(|f| f.to_lowercase().contains(needle))
}
