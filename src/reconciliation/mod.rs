//! Quantity reconciliation for out-of-stock requests.
//!
//! Every function here validates before it mutates: a `Rejection` means the
//! request is untouched and nothing was recorded. Every successful mutation
//! records exactly one audit entry on the supplied sink.

mod batch;

pub use batch::*;

use uuid::Uuid;

use crate::audit::{AuditContext, AuditSink, FieldDiff};
use crate::models::{
    EntitySnapshot, EntityType, FieldValue, NewRequest, OperationDetails, OutOfStockRequest,
    RequestChanges, RequestStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(i32),

    #[error("quantity {requested} exceeds the remaining {remaining}")]
    ExceedsRemaining { requested: i32, remaining: i32 },

    #[error("quantity {quantity} is below the {delivered} already delivered")]
    BelowDelivered { quantity: i32, delivered: i32 },

    #[error("request is cancelled")]
    Cancelled,

    #[error("cannot change status from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("cannot complete with {remaining} still outstanding")]
    Outstanding { remaining: i32 },

    #[error("quantity of a {status} request cannot change")]
    Closed { status: RequestStatus },

    #[error("size {size_id} belongs to product {owner}, not {product_id:?}")]
    SizeMismatch {
        size_id: Uuid,
        owner: Uuid,
        product_id: Option<Uuid>,
    },

    #[error("request {0} not found")]
    NotFound(Uuid),
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::NonPositiveQuantity(_) => "NON_POSITIVE_QUANTITY",
            Rejection::ExceedsRemaining { .. } => "EXCEEDS_REMAINING",
            Rejection::BelowDelivered { .. } => "BELOW_DELIVERED",
            Rejection::Cancelled => "REQUEST_CANCELLED",
            Rejection::InvalidTransition { .. } => "INVALID_TRANSITION",
            Rejection::Outstanding { .. } => "QUANTITY_OUTSTANDING",
            Rejection::Closed { .. } => "REQUEST_CLOSED",
            Rejection::SizeMismatch { .. } => "SIZE_MISMATCH",
            Rejection::NotFound(_) => "NOT_FOUND",
        }
    }
}

/// Builds a new request and records its `create` entry.
pub fn create_request(
    new: &NewRequest,
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> Result<OutOfStockRequest, Rejection> {
    if new.quantity <= 0 {
        return Err(Rejection::NonPositiveQuantity(new.quantity));
    }

    let request = OutOfStockRequest {
        id: Uuid::new_v4(),
        customer_id: new.customer_id,
        product_id: new.product_id,
        product_size_id: new.product_size_id,
        quantity: new.quantity,
        delivery_quantity: 0,
        status: RequestStatus::Pending,
        priority: new.priority,
        request_date: new.request_date.unwrap_or(ctx.now),
        notes: non_empty(new.notes.as_deref()),
        delivery_date: None,
        delivery_notes: None,
        created_by: ctx.operator.user_id.clone(),
        version: 0,
        created_at: ctx.now,
        updated_at: ctx.now,
    };

    sink.record(ctx.entry(
        EntityType::OutOfStockRequest,
        request.id,
        request.description(),
        OperationDetails::Create {
            snapshot: EntitySnapshot::OutOfStockRequest(request.clone()),
        },
    ));
    Ok(request)
}

/// Records `quantity` more units as delivered to the customer.
///
/// Accepts `0 < quantity <= remaining_quantity` on a request that is not
/// cancelled. Reaching the full quantity completes the request.
pub fn apply_delivery(
    request: &mut OutOfStockRequest,
    quantity: i32,
    notes: Option<&str>,
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> Result<(), Rejection> {
    validate_delivery(request, quantity)?;

    let delivered_before = request.delivery_quantity;
    let status_before = request.status;
    let notes = non_empty(notes);

    request.delivery_quantity += quantity;
    request.delivery_date = Some(ctx.now);
    if let Some(text) = &notes {
        request.delivery_notes = Some(match request.delivery_notes.take() {
            Some(previous) if !previous.is_empty() => format!("{previous}\n{text}"),
            _ => text.clone(),
        });
    }
    if request.is_fully_delivered() {
        request.status = RequestStatus::Completed;
    }
    request.updated_at = ctx.now;

    sink.record(ctx.entry(
        EntityType::OutOfStockRequest,
        request.id,
        request.description(),
        OperationDetails::ReturnProcess {
            quantity,
            notes,
            delivered_before,
            delivered_after: request.delivery_quantity,
            status_before,
            status_after: request.status,
        },
    ));
    Ok(())
}

pub fn validate_delivery(request: &OutOfStockRequest, quantity: i32) -> Result<(), Rejection> {
    if quantity <= 0 {
        return Err(Rejection::NonPositiveQuantity(quantity));
    }
    if request.status == RequestStatus::Cancelled {
        return Err(Rejection::Cancelled);
    }
    let remaining = request.remaining_quantity();
    if quantity > remaining {
        return Err(Rejection::ExceedsRemaining {
            requested: quantity,
            remaining,
        });
    }
    Ok(())
}

/// Checks that a size reference belongs to the referenced product.
///
/// `size_owner` is the product the size row belongs to, when the size exists.
/// Unknown sizes are left to the foreign key.
pub fn check_size(
    product_id: Option<Uuid>,
    size_id: Option<Uuid>,
    size_owner: Option<Uuid>,
) -> Result<(), Rejection> {
    match (size_id, size_owner) {
        (Some(size_id), Some(owner)) if product_id != Some(owner) => Err(Rejection::SizeMismatch {
            size_id,
            owner,
            product_id,
        }),
        _ => Ok(()),
    }
}

/// Applies the differing fields of `changes` and returns their names.
///
/// Quantity is frozen once the request is completed or cancelled. Lowering it
/// to the delivered amount completes the request, and the status change is
/// part of the same `update` entry.
///
/// Nothing is recorded, and `updated_at` is left alone, when no field differs.
pub fn update_fields(
    request: &mut OutOfStockRequest,
    changes: &RequestChanges,
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> Result<Vec<String>, Rejection> {
    if let Some(quantity) = changes.quantity {
        if quantity < 0 {
            return Err(Rejection::NonPositiveQuantity(quantity));
        }
        if quantity != request.quantity && request.status.is_terminal() {
            return Err(Rejection::Closed {
                status: request.status,
            });
        }
        if quantity < request.delivery_quantity {
            return Err(Rejection::BelowDelivered {
                quantity,
                delivered: request.delivery_quantity,
            });
        }
    }

    let notes = changes.notes.as_ref().map(|n| non_empty(n.as_deref()));
    let status = changes
        .quantity
        .filter(|q| *q > 0 && *q == request.delivery_quantity && !request.status.is_terminal())
        .map(|_| RequestStatus::Completed);

    let mut diff = FieldDiff::new();
    diff.compare(
        "customer",
        &request.customer_id,
        changes.customer_id.as_ref(),
        FieldValue::Reference,
    );
    diff.compare(
        "product",
        &request.product_id,
        changes.product_id.as_ref(),
        FieldValue::Reference,
    );
    diff.compare(
        "product_size",
        &request.product_size_id,
        changes.product_size_id.as_ref(),
        FieldValue::Reference,
    );
    diff.compare(
        "quantity",
        &request.quantity,
        changes.quantity.as_ref(),
        FieldValue::Quantity,
    );
    diff.compare(
        "priority",
        &request.priority,
        changes.priority.as_ref(),
        FieldValue::Priority,
    );
    diff.compare("notes", &request.notes, notes.as_ref(), FieldValue::Text);
    diff.compare(
        "request_date",
        &request.request_date,
        changes.request_date.as_ref(),
        FieldValue::Timestamp,
    );
    diff.compare("status", &request.status, status.as_ref(), FieldValue::Status);

    if diff.is_empty() {
        return Ok(Vec::new());
    }

    if let Some(customer_id) = changes.customer_id {
        request.customer_id = customer_id;
    }
    if let Some(product_id) = changes.product_id {
        request.product_id = product_id;
    }
    if let Some(size_id) = changes.product_size_id {
        request.product_size_id = size_id;
    }
    if let Some(quantity) = changes.quantity {
        request.quantity = quantity;
    }
    if let Some(priority) = changes.priority {
        request.priority = priority;
    }
    if let Some(notes) = notes {
        request.notes = notes;
    }
    if let Some(request_date) = changes.request_date {
        request.request_date = request_date;
    }
    if let Some(status) = status {
        request.status = status;
    }
    request.updated_at = ctx.now;

    let changed = diff.changed_fields().to_vec();
    sink.record(ctx.entry(
        EntityType::OutOfStockRequest,
        request.id,
        request.description(),
        diff.into_details(),
    ));
    Ok(changed)
}

/// A catalog row about to be deleted. A product takes its sizes with it.
#[derive(Debug, Clone, Copy)]
pub enum Detach<'a> {
    Customer(Uuid),
    Product { id: Uuid, size_ids: &'a [Uuid] },
}

/// Clears the request's references to a catalog row that is being deleted,
/// recording the change as an ordinary `update`. Returns whether anything changed.
pub fn detach_reference(
    request: &mut OutOfStockRequest,
    detach: Detach<'_>,
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> Result<bool, Rejection> {
    let changes = match detach {
        Detach::Customer(id) => RequestChanges {
            customer_id: (request.customer_id == Some(id)).then_some(None),
            ..Default::default()
        },
        Detach::Product { id, size_ids } => RequestChanges {
            product_id: (request.product_id == Some(id)).then_some(None),
            product_size_id: request
                .product_size_id
                .filter(|size| size_ids.contains(size))
                .map(|_| None),
            ..Default::default()
        },
    };
    update_fields(request, &changes, ctx, sink).map(|changed| !changed.is_empty())
}

/// Moves the request to `target`.
///
/// Terminal states accept no transition. Completion with quantity still
/// outstanding needs `force`. Returns `false` (nothing recorded) when the
/// request is already in `target`.
pub fn change_status(
    request: &mut OutOfStockRequest,
    target: RequestStatus,
    force: bool,
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> Result<bool, Rejection> {
    let from = request.status;
    if from == target {
        return Ok(false);
    }
    if from.is_terminal() {
        return Err(Rejection::InvalidTransition { from, to: target });
    }
    let remaining = request.remaining_quantity();
    if target == RequestStatus::Completed && remaining > 0 && !force {
        return Err(Rejection::Outstanding { remaining });
    }

    request.status = target;
    request.updated_at = ctx.now;

    sink.record(ctx.entry(
        EntityType::OutOfStockRequest,
        request.id,
        request.description(),
        OperationDetails::StatusChange {
            from,
            to: target,
            forced: target == RequestStatus::Completed && remaining > 0,
            remaining_quantity: remaining,
        },
    ));
    Ok(true)
}

/// Records the `delete` entry for a request about to be removed.
pub fn delete_request(
    request: &OutOfStockRequest,
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) {
    sink.record(ctx.entry(
        EntityType::OutOfStockRequest,
        request.id,
        request.description(),
        OperationDetails::Delete {
            snapshot: EntitySnapshot::OutOfStockRequest(request.clone()),
        },
    ));
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::audit::Operator;
    use crate::models::{AuditLogEntry, OperationType, Priority};

    pub(crate) fn operator() -> Operator {
        Operator {
            user_id: "u-1".to_string(),
            name: "Mei".to_string(),
        }
    }

    pub(crate) fn request(quantity: i32, delivered: i32) -> OutOfStockRequest {
        let now = Utc::now();
        OutOfStockRequest {
            id: Uuid::new_v4(),
            customer_id: Some(Uuid::new_v4()),
            product_id: Some(Uuid::new_v4()),
            product_size_id: None,
            quantity,
            delivery_quantity: delivered,
            status: RequestStatus::Confirmed,
            priority: Priority::Medium,
            request_date: now - Duration::days(3),
            notes: None,
            delivery_date: None,
            delivery_notes: None,
            created_by: "u-0".to_string(),
            version: 1,
            created_at: now - Duration::days(3),
            updated_at: now - Duration::days(3),
        }
    }

    #[test]
    fn create_requires_positive_quantity() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let new = NewRequest {
            customer_id: None,
            product_id: None,
            product_size_id: None,
            quantity: 0,
            priority: Priority::High,
            request_date: None,
            notes: None,
        };
        assert_eq!(
            create_request(&new, &ctx, &mut log),
            Err(Rejection::NonPositiveQuantity(0))
        );
        assert!(log.is_empty());
    }

    #[test]
    fn create_records_snapshot_and_creator() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let new = NewRequest {
            customer_id: None,
            product_id: None,
            product_size_id: None,
            quantity: 12,
            priority: Priority::High,
            request_date: None,
            notes: Some("  ".to_string()),
        };
        let created = create_request(&new, &ctx, &mut log).unwrap();
        assert_eq!(created.created_by, "u-1");
        assert_eq!(created.request_date, ctx.now);
        assert_eq!(created.notes, None);
        assert_eq!(created.status, RequestStatus::Pending);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].operation_type, OperationType::Create);
        assert_eq!(
            log[0].details(),
            &OperationDetails::Create {
                snapshot: EntitySnapshot::OutOfStockRequest(created.clone())
            }
        );
    }

    #[test]
    fn delivery_outside_bounds_is_rejected_without_mutation() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let mut r = request(10, 4);
        let before = r.clone();

        for bad in [0, -3, 7] {
            assert!(apply_delivery(&mut r, bad, Some("x"), &ctx, &mut log).is_err());
        }
        assert_eq!(
            apply_delivery(&mut r, 7, None, &ctx, &mut log),
            Err(Rejection::ExceedsRemaining {
                requested: 7,
                remaining: 6
            })
        );
        assert_eq!(r, before);
        assert!(log.is_empty());
    }

    #[test]
    fn delivery_on_cancelled_request_is_rejected() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let mut r = request(10, 0);
        r.status = RequestStatus::Cancelled;
        assert_eq!(
            apply_delivery(&mut r, 1, None, &ctx, &mut log),
            Err(Rejection::Cancelled)
        );
        assert!(log.is_empty());
    }

    #[test]
    fn partial_then_full_delivery() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let mut r = request(50, 0);

        apply_delivery(&mut r, 20, Some("first truck"), &ctx, &mut log).unwrap();
        assert_eq!(r.remaining_quantity(), 30);
        assert!(r.has_partial_delivery());
        assert!(!r.is_fully_delivered());
        assert_eq!(r.status, RequestStatus::Confirmed);
        assert_eq!(r.delivery_date, Some(ctx.now));

        apply_delivery(&mut r, 30, Some("second truck"), &ctx, &mut log).unwrap();
        assert_eq!(r.remaining_quantity(), 0);
        assert!(r.is_fully_delivered());
        assert!(!r.needs_delivery());
        assert_eq!(r.status, RequestStatus::Completed);
        assert_eq!(r.delivery_notes.as_deref(), Some("first truck\nsecond truck"));

        assert_eq!(log.len(), 2);
        assert!(log
            .iter()
            .all(|e| e.operation_type == OperationType::ReturnProcess && e.batch_id.is_none()));
        assert_eq!(
            log[1].details(),
            &OperationDetails::ReturnProcess {
                quantity: 30,
                notes: Some("second truck".to_string()),
                delivered_before: 20,
                delivered_after: 50,
                status_before: RequestStatus::Confirmed,
                status_after: RequestStatus::Completed,
            }
        );
    }

    #[test]
    fn delivering_whole_remainder_fully_delivers() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        for (quantity, delivered) in [(1, 0), (9, 8), (40, 13)] {
            let mut r = request(quantity, delivered);
            let remaining = r.remaining_quantity();
            apply_delivery(&mut r, remaining, None, &ctx, &mut log).unwrap();
            assert!(r.is_fully_delivered());
            assert!(!r.needs_delivery());
        }
    }

    #[test]
    fn update_without_differences_records_nothing() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let mut r = request(10, 2);
        let before = r.clone();
        let changes = RequestChanges {
            customer_id: Some(r.customer_id),
            quantity: Some(10),
            priority: Some(Priority::Medium),
            notes: Some(None),
            ..Default::default()
        };
        let changed = update_fields(&mut r, &changes, &ctx, &mut log).unwrap();
        assert!(changed.is_empty());
        assert!(log.is_empty());
        assert_eq!(r, before);
    }

    #[test]
    fn update_lists_exactly_the_changed_fields() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let mut r = request(10, 2);
        let old_customer = r.customer_id;
        let new_customer = Uuid::new_v4();
        let changes = RequestChanges {
            customer_id: Some(Some(new_customer)),
            product_id: Some(r.product_id),
            quantity: Some(15),
            priority: Some(Priority::High),
            ..Default::default()
        };
        let changed = update_fields(&mut r, &changes, &ctx, &mut log).unwrap();
        assert_eq!(changed, vec!["customer", "quantity", "priority"]);
        assert_eq!(r.customer_id, Some(new_customer));
        assert_eq!(r.quantity, 15);
        assert_eq!(r.updated_at, ctx.now);

        assert_eq!(log.len(), 1);
        match log[0].details() {
            OperationDetails::Update {
                changed_fields,
                before,
                ..
            } => {
                assert_eq!(changed_fields, &changed);
                assert_eq!(before.len(), 3);
                assert_eq!(before["customer"], FieldValue::Reference(old_customer));
                assert_eq!(before["quantity"], FieldValue::Quantity(10));
                assert_eq!(before["priority"], FieldValue::Priority(Priority::Medium));
            }
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[test]
    fn update_can_clear_a_reference() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let mut r = request(10, 0);
        let changes = RequestChanges {
            product_id: Some(None),
            ..Default::default()
        };
        let changed = update_fields(&mut r, &changes, &ctx, &mut log).unwrap();
        assert_eq!(changed, vec!["product"]);
        assert_eq!(r.product_id, None);
    }

    #[test]
    fn update_rejects_quantity_below_delivered() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let mut r = request(10, 6);
        let changes = RequestChanges {
            quantity: Some(5),
            notes: Some(Some("lower".to_string())),
            ..Default::default()
        };
        assert_eq!(
            update_fields(&mut r, &changes, &ctx, &mut log),
            Err(Rejection::BelowDelivered {
                quantity: 5,
                delivered: 6
            })
        );
        assert_eq!(r.notes, None);
        assert!(log.is_empty());
    }

    #[test]
    fn quantity_of_a_completed_request_is_frozen() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let mut r = request(10, 0);
        apply_delivery(&mut r, 10, None, &ctx, &mut log).unwrap();
        assert_eq!(r.status, RequestStatus::Completed);
        let before = r.clone();

        let changes = RequestChanges {
            quantity: Some(15),
            ..Default::default()
        };
        assert_eq!(
            update_fields(&mut r, &changes, &ctx, &mut log),
            Err(Rejection::Closed {
                status: RequestStatus::Completed
            })
        );
        assert_eq!(r, before);
        assert!(!r.needs_delivery());
        assert_eq!(log.len(), 1);

        // Other fields stay editable.
        let notes = RequestChanges {
            notes: Some(Some("picked up".to_string())),
            ..Default::default()
        };
        assert_eq!(update_fields(&mut r, &notes, &ctx, &mut log).unwrap(), vec!["notes"]);
    }

    #[test]
    fn lowering_quantity_to_delivered_completes_in_one_entry() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let mut r = request(10, 6);
        let changes = RequestChanges {
            quantity: Some(6),
            ..Default::default()
        };
        let changed = update_fields(&mut r, &changes, &ctx, &mut log).unwrap();
        assert_eq!(changed, vec!["quantity", "status"]);
        assert_eq!(r.status, RequestStatus::Completed);
        assert!(r.is_fully_delivered());
        assert!(!r.needs_delivery());

        assert_eq!(log.len(), 1);
        match log[0].details() {
            OperationDetails::Update { before, after, .. } => {
                assert_eq!(before["status"], FieldValue::Status(RequestStatus::Confirmed));
                assert_eq!(after["status"], FieldValue::Status(RequestStatus::Completed));
                assert_eq!(after["quantity"], FieldValue::Quantity(6));
            }
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[test]
    fn detaching_a_customer_audits_and_clears_only_that_reference() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let mut r = request(10, 0);
        let customer = r.customer_id.unwrap();
        let product = r.product_id;

        assert!(!detach_reference(&mut r, Detach::Customer(Uuid::new_v4()), &ctx, &mut log).unwrap());
        assert!(log.is_empty());

        assert!(detach_reference(&mut r, Detach::Customer(customer), &ctx, &mut log).unwrap());
        assert_eq!(r.customer_id, None);
        assert_eq!(r.product_id, product);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].operation_type, OperationType::Update);
        assert_eq!(log[0].entity_id, r.id);
    }

    #[test]
    fn detaching_a_product_clears_its_sizes_even_on_closed_requests() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let size = Uuid::new_v4();
        let mut r = request(4, 0);
        r.product_size_id = Some(size);
        r.status = RequestStatus::Cancelled;
        let product = r.product_id.unwrap();

        let detach = Detach::Product {
            id: product,
            size_ids: &[size],
        };
        assert!(detach_reference(&mut r, detach, &ctx, &mut log).unwrap());
        assert_eq!((r.product_id, r.product_size_id), (None, None));
        assert_eq!(
            log[0].details().clone(),
            OperationDetails::Update {
                changed_fields: vec!["product".to_string(), "product_size".to_string()],
                before: [
                    ("product".to_string(), FieldValue::Reference(Some(product))),
                    ("product_size".to_string(), FieldValue::Reference(Some(size))),
                ]
                .into_iter()
                .collect(),
                after: [
                    ("product".to_string(), FieldValue::Reference(None)),
                    ("product_size".to_string(), FieldValue::Reference(None)),
                ]
                .into_iter()
                .collect(),
            }
        );
    }

    #[test]
    fn size_must_belong_to_the_product() {
        let product = Uuid::new_v4();
        let other = Uuid::new_v4();
        let size = Uuid::new_v4();

        assert_eq!(check_size(Some(product), Some(size), Some(product)), Ok(()));
        assert_eq!(check_size(Some(product), None, None), Ok(()));
        assert_eq!(check_size(Some(product), Some(size), None), Ok(()));
        assert_eq!(
            check_size(Some(product), Some(size), Some(other)),
            Err(Rejection::SizeMismatch {
                size_id: size,
                owner: other,
                product_id: Some(product),
            })
        );
        assert_eq!(
            check_size(None, Some(size), Some(other)).map_err(|r| r.code()),
            Err("SIZE_MISMATCH")
        );
    }

    #[test]
    fn completion_with_outstanding_quantity_needs_force() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let mut r = request(10, 4);

        assert_eq!(
            change_status(&mut r, RequestStatus::Completed, false, &ctx, &mut log),
            Err(Rejection::Outstanding { remaining: 6 })
        );
        assert!(log.is_empty());

        assert_eq!(
            change_status(&mut r, RequestStatus::Completed, true, &ctx, &mut log),
            Ok(true)
        );
        assert_eq!(r.status, RequestStatus::Completed);
        assert_eq!(
            log[0].details(),
            &OperationDetails::StatusChange {
                from: RequestStatus::Confirmed,
                to: RequestStatus::Completed,
                forced: true,
                remaining_quantity: 6,
            }
        );
    }

    #[test]
    fn terminal_states_are_final() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let mut r = request(10, 0);
        change_status(&mut r, RequestStatus::Cancelled, false, &ctx, &mut log).unwrap();
        assert_eq!(
            change_status(&mut r, RequestStatus::Pending, false, &ctx, &mut log),
            Err(Rejection::InvalidTransition {
                from: RequestStatus::Cancelled,
                to: RequestStatus::Pending
            })
        );
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn same_status_is_a_silent_no_op() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let mut r = request(10, 0);
        assert_eq!(
            change_status(&mut r, RequestStatus::Confirmed, false, &ctx, &mut log),
            Ok(false)
        );
        assert!(log.is_empty());
    }

    #[test]
    fn delete_records_full_snapshot() {
        let op = operator();
        let ctx = AuditContext::new(&op, Utc::now());
        let mut log: Vec<AuditLogEntry> = Vec::new();
        let r = request(3, 1);
        delete_request(&r, &ctx, &mut log);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].operation_type, OperationType::Delete);
        assert_eq!(
            log[0].details(),
            &OperationDetails::Delete {
                snapshot: EntitySnapshot::OutOfStockRequest(r)
            }
        );
    }
}
