//! Best-effort batch operations.
//!
//! Items are processed in order, each one validated and applied on its own.
//! A rejected item is reported and left untouched; it never undoes the items
//! applied before it. Per-item entries share the batch id, and one summary
//! entry is added when at least one item changed.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

use super::{
    apply_delivery, change_status, check_size, create_request, delete_request, update_fields,
    Rejection,
};
use crate::audit::{AuditContext, AuditSink};
use crate::models::{
    BatchChange, BatchDeliveryItem, BatchKind, EntityType, NewRequest, OperationDetails,
    OutOfStockRequest, RequestChanges,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    /// Position of the item in the submitted list.
    pub index: usize,
    pub request_id: Option<Uuid>,
    pub code: &'static str,
    pub reason: String,
    #[serde(skip)]
    pub rejection: Rejection,
}

impl BatchFailure {
    fn new(index: usize, request_id: Option<Uuid>, rejection: Rejection) -> Self {
        Self {
            index,
            request_id,
            code: rejection.code(),
            reason: rejection.to_string(),
            rejection,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub batch_id: Option<Uuid>,
    pub applied: Vec<Uuid>,
    /// Items that needed no change (already in the target state).
    pub unchanged: Vec<Uuid>,
    pub skipped: Vec<BatchFailure>,
}

impl BatchOutcome {
    fn new(batch_id: Option<Uuid>) -> Self {
        Self {
            batch_id,
            ..Default::default()
        }
    }

    fn skipped_ids(&self) -> Vec<Uuid> {
        self.skipped.iter().filter_map(|f| f.request_id).collect()
    }
}

/// Applies several deliveries, each against its own request.
pub fn apply_batch(
    requests: &mut IndexMap<Uuid, OutOfStockRequest>,
    items: &[BatchDeliveryItem],
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> BatchOutcome {
    let ctx = ctx.for_batch();
    let mut outcome = BatchOutcome::new(ctx.batch_id);

    for (index, item) in items.iter().enumerate() {
        let Some(request) = requests.get_mut(&item.request_id) else {
            outcome.skipped.push(BatchFailure::new(
                index,
                Some(item.request_id),
                Rejection::NotFound(item.request_id),
            ));
            continue;
        };
        match apply_delivery(request, item.quantity, item.notes.as_deref(), &ctx, sink) {
            Ok(()) => {
                if !outcome.applied.contains(&item.request_id) {
                    outcome.applied.push(item.request_id);
                }
            }
            Err(rejection) => {
                outcome
                    .skipped
                    .push(BatchFailure::new(index, Some(item.request_id), rejection));
            }
        }
    }

    record_summary(&ctx, BatchKind::Delivery, &outcome, sink);
    outcome
}

/// Applies one status or priority change to every listed request.
pub fn apply_batch_update(
    requests: &mut IndexMap<Uuid, OutOfStockRequest>,
    request_ids: &[Uuid],
    change: &BatchChange,
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> BatchOutcome {
    let ctx = ctx.for_batch();
    let mut outcome = BatchOutcome::new(ctx.batch_id);

    for (index, id) in request_ids.iter().enumerate() {
        let Some(request) = requests.get_mut(id) else {
            outcome
                .skipped
                .push(BatchFailure::new(index, Some(*id), Rejection::NotFound(*id)));
            continue;
        };
        let result = match change {
            BatchChange::Status { status, force } => {
                change_status(request, *status, *force, &ctx, sink)
            }
            BatchChange::Priority { priority } => {
                let changes = RequestChanges {
                    priority: Some(*priority),
                    ..Default::default()
                };
                update_fields(request, &changes, &ctx, sink).map(|changed| !changed.is_empty())
            }
        };
        match result {
            Ok(true) => outcome.applied.push(*id),
            Ok(false) => outcome.unchanged.push(*id),
            Err(rejection) => outcome
                .skipped
                .push(BatchFailure::new(index, Some(*id), rejection)),
        }
    }

    let kind = match change {
        BatchChange::Status { .. } => BatchKind::Status,
        BatchChange::Priority { .. } => BatchKind::Priority,
    };
    record_summary(&ctx, kind, &outcome, sink);
    outcome
}

/// Records `delete` entries for the listed requests that exist. The caller
/// removes the rows listed in `applied`.
pub fn delete_batch(
    requests: &IndexMap<Uuid, OutOfStockRequest>,
    request_ids: &[Uuid],
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> BatchOutcome {
    let ctx = ctx.for_batch();
    let mut outcome = BatchOutcome::new(ctx.batch_id);

    for (index, id) in request_ids.iter().enumerate() {
        if outcome.applied.contains(id) {
            continue;
        }
        match requests.get(id) {
            Some(request) => {
                delete_request(request, &ctx, sink);
                outcome.applied.push(*id);
            }
            None => outcome
                .skipped
                .push(BatchFailure::new(index, Some(*id), Rejection::NotFound(*id))),
        }
    }

    record_summary(&ctx, BatchKind::Delete, &outcome, sink);
    outcome
}

/// Creates several requests in one go. Invalid items are reported by index.
///
/// `size_owners` maps each known size id to the product it belongs to.
pub fn create_batch(
    new_requests: &[NewRequest],
    size_owners: &HashMap<Uuid, Uuid>,
    ctx: &AuditContext<'_>,
    sink: &mut impl AuditSink,
) -> (Vec<OutOfStockRequest>, BatchOutcome) {
    let ctx = ctx.for_batch();
    let mut outcome = BatchOutcome::new(ctx.batch_id);
    let mut created = Vec::with_capacity(new_requests.len());

    for (index, new) in new_requests.iter().enumerate() {
        let owner = new.product_size_id.and_then(|id| size_owners.get(&id).copied());
        let created_request = check_size(new.product_id, new.product_size_id, owner)
            .and_then(|()| create_request(new, &ctx, sink));
        match created_request {
            Ok(request) => {
                outcome.applied.push(request.id);
                created.push(request);
            }
            Err(rejection) => outcome.skipped.push(BatchFailure::new(index, None, rejection)),
        }
    }

    (created, outcome)
}

fn record_summary(
    ctx: &AuditContext<'_>,
    batch_kind: BatchKind,
    outcome: &BatchOutcome,
    sink: &mut impl AuditSink,
) {
    let Some(batch_id) = ctx.batch_id else {
        return;
    };
    if outcome.applied.is_empty() {
        return;
    }
    sink.record(ctx.entry_with_related(
        EntityType::OutOfStockRequest,
        batch_id,
        format!("Batch of {} out-of-stock requests", outcome.applied.len()),
        OperationDetails::BatchOperation {
            batch_kind,
            affected_ids: outcome.applied.clone(),
            skipped_ids: outcome.skipped_ids(),
        },
        outcome.applied.clone(),
    ));
}
