//! Hopper operation records, drafts, filters, and pagination types.

use serde::{Deserialize, Serialize};

use crate::{
    sync::SyncStatus,
    types::{HopperId, IngredientId, MachineId, OperationId, OperationType, OperatorId},
};

/// Reconciled quantity triple for a quantity-bearing operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantities {
    /// Amount in the hopper before the action.
    pub before: f64,
    /// Amount added by the action.
    pub added: f64,
    /// Amount in the hopper after the action.
    pub after: f64,
}

/// Fully materialized, accepted operation record.
///
/// Immutable after acceptance except for `sync`; corrections are recorded
/// as new compensating operations, never as edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopperOperation {
    /// Stable record identifier.
    pub id: OperationId,
    /// Target hopper.
    pub hopper_id: HopperId,
    /// Recorded action kind.
    pub operation_type: OperationType,
    /// Ingredient involved; `None` for clean operations.
    pub ingredient_id: Option<IngredientId>,
    /// Reconciled quantities; `None` exactly for clean operations.
    pub quantities: Option<Quantities>,
    /// Acting user, already authenticated upstream.
    pub operator_id: OperatorId,
    /// Denormalized machine reference for query convenience.
    pub machine_id: Option<MachineId>,
    /// Ordered opaque photo-store references.
    pub photos: Vec<String>,
    /// Free-text note.
    pub notes: Option<String>,
    /// Acceptance timestamp in milliseconds since epoch.
    pub created_at_ms: u64,
    /// Per-channel acknowledgment flags.
    pub sync: SyncStatus,
}

/// Submission payload used to create a new [`HopperOperation`].
///
/// Quantity fields are raw caller input; the quantity model reconciles them
/// into [`Quantities`] at acceptance time.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDraft {
    /// Target hopper.
    pub hopper_id: HopperId,
    /// Action kind.
    pub operation_type: OperationType,
    /// Ingredient involved; omit for clean operations.
    pub ingredient_id: Option<IngredientId>,
    /// Measured amount before the action.
    pub quantity_before: Option<f64>,
    /// Amount added by the action.
    pub quantity_added: Option<f64>,
    /// Caller-computed amount after the action, cross-checked when present.
    pub quantity_after: Option<f64>,
    /// Acting user.
    pub operator_id: OperatorId,
    /// Machine the hopper belongs to.
    pub machine_id: Option<MachineId>,
    /// Photo-store references, in capture order.
    pub photos: Vec<String>,
    /// Free-text note.
    pub notes: Option<String>,
}

/// Conjunctive record filter; `None` fields match everything.
///
/// The timestamp range is half-open: `created_from_ms <= t < created_to_ms`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OperationFilter {
    /// Restrict to one hopper.
    pub hopper_id: Option<HopperId>,
    /// Restrict to one operator.
    pub operator_id: Option<OperatorId>,
    /// Restrict to one action kind.
    pub operation_type: Option<OperationType>,
    /// Inclusive lower timestamp bound.
    pub created_from_ms: Option<u64>,
    /// Exclusive upper timestamp bound.
    pub created_to_ms: Option<u64>,
}

impl OperationFilter {
    /// Returns whether `rec` satisfies every set field.
    pub fn matches(&self, rec: &HopperOperation) -> bool {
        self.hopper_id.is_none_or(|h| rec.hopper_id == h)
            && self.operator_id.is_none_or(|o| rec.operator_id == o)
            && self.operation_type.is_none_or(|t| rec.operation_type == t)
            && self.created_from_ms.is_none_or(|from| rec.created_at_ms >= from)
            && self.created_to_ms.is_none_or(|to| rec.created_at_ms < to)
    }
}

/// Resumption point for paginated queries: the `(created_at_ms, id)` of the
/// last record already returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Timestamp component of the sort key.
    pub created_at_ms: u64,
    /// Id tie-break component of the sort key.
    pub id: OperationId,
}

/// One page of query results plus the cursor for the next page.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    /// Matching records in `(created_at_ms, id)` ascending order.
    pub records: Vec<HopperOperation>,
    /// Cursor to resume after this page; `None` when exhausted.
    pub next: Option<Cursor>,
}
