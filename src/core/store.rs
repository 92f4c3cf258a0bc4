use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::LedgerError,
    op::{Op, StoredOp},
    operation::{Cursor, HopperOperation, OperationDraft, OperationFilter, QueryPage},
    quantity,
    types::{Channel, HopperId, MachineId, OpSeq, OperationId},
};

use super::indices::VecIndex;

/// Serializable full-state snapshot of a [`LedgerStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshotV1 {
    /// Next record id to assign.
    pub next_id: OperationId,
    /// Next journal sequence to assign.
    pub next_op_seq: OpSeq,
    /// Highest acceptance timestamp assigned so far.
    pub last_created_at_ms: u64,
    /// Record ids in acceptance order.
    pub order: Vec<OperationId>,
    /// Records in acceptance order.
    pub records: Vec<HopperOperation>,
}

/// Authoritative in-memory operation ledger.
///
/// Append-mostly: records are immutable after acceptance except for their
/// sync flags, which only ever gain acknowledgments. All mutation goes
/// through `&mut self`, so the single-writer runtime loop is the
/// serialization point for id and timestamp assignment.
#[derive(Debug, Default)]
pub struct LedgerStore {
    records: HashMap<OperationId, HopperOperation>,
    order: Vec<OperationId>,
    by_hopper: VecIndex<HopperId>,
    by_machine: VecIndex<MachineId>,
    pending_ops: Vec<StoredOp>,
    next_op_seq: OpSeq,
    next_id: OperationId,
    last_created_at_ms: u64,
}

impl LedgerStore {
    /// Creates an empty store with ids and sequences starting at 1.
    pub fn new() -> Self {
        Self {
            next_op_seq: 1,
            next_id: 1,
            ..Self::default()
        }
    }

    /// Rebuilds a store from an exported snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshotV1) -> Result<Self, LedgerError> {
        let mut store = Self {
            next_id: snapshot.next_id,
            next_op_seq: snapshot.next_op_seq,
            last_created_at_ms: snapshot.last_created_at_ms,
            order: snapshot.order,
            ..Self::default()
        };

        for rec in snapshot.records {
            store.insert_indices(&rec);
            store.records.insert(rec.id, rec);
        }

        Ok(store)
    }

    /// Exports full state for snapshotting.
    pub fn export_snapshot(&self) -> StoreSnapshotV1 {
        let records = self
            .order
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect();

        StoreSnapshotV1 {
            next_id: self.next_id,
            next_op_seq: self.next_op_seq,
            last_created_at_ms: self.last_created_at_ms,
            order: self.order.clone(),
            records,
        }
    }

    /// Validates and accepts `draft` with the current wall clock.
    pub fn submit(&mut self, draft: OperationDraft) -> Result<(OperationId, StoredOp), LedgerError> {
        self.submit_at(draft, now_ms())
    }

    /// Validates and accepts `draft`, stamping it relative to `now_ms`.
    ///
    /// Validation completes before any state change; a rejected draft
    /// leaves the store untouched. The assigned timestamp never moves
    /// backwards across the store, so append order and `(created_at_ms,
    /// id)` order coincide.
    pub fn submit_at(
        &mut self,
        draft: OperationDraft,
        now_ms: u64,
    ) -> Result<(OperationId, StoredOp), LedgerError> {
        let quantities = quantity::resolve(
            draft.operation_type,
            draft.quantity_before,
            draft.quantity_added,
            draft.quantity_after,
        )?;
        if draft.operation_type == crate::types::OperationType::Clean
            && draft.ingredient_id.is_some()
        {
            return Err(LedgerError::InvariantViolation(
                "clean operations carry no ingredient".to_string(),
            ));
        }

        let id = self.next_id;
        self.next_id += 1;
        let created_at_ms = now_ms.max(self.last_created_at_ms);
        self.last_created_at_ms = created_at_ms;

        let operation = HopperOperation {
            id,
            hopper_id: draft.hopper_id,
            operation_type: draft.operation_type,
            ingredient_id: draft.ingredient_id,
            quantities,
            operator_id: draft.operator_id,
            machine_id: draft.machine_id,
            photos: draft.photos,
            notes: draft.notes,
            created_at_ms,
            sync: crate::sync::SyncStatus::default(),
        };

        let seq = self.take_next_op_seq();
        self.insert_indices(&operation);
        self.order.push(id);
        self.records.insert(id, operation.clone());

        let stored = StoredOp {
            seq,
            ts_ms: created_at_ms,
            op: Op::Record { operation },
        };
        self.pending_ops.push(stored.clone());
        Ok((id, stored))
    }

    /// Marks `channel` acknowledged for record `id`.
    ///
    /// Idempotent: a repeated acknowledgment changes nothing and queues no
    /// journal op. The returned flag reports whether the record is now
    /// fully synced across all channels.
    pub fn acknowledge(
        &mut self,
        id: OperationId,
        channel: Channel,
    ) -> Result<(bool, Option<StoredOp>), LedgerError> {
        let rec = self.records.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        if !rec.sync.acknowledge(channel) {
            return Ok((rec.sync.fully_synced(), None));
        }
        let fully = rec.sync.fully_synced();

        let seq = self.take_next_op_seq();
        let stored = StoredOp {
            seq,
            ts_ms: now_ms(),
            op: Op::Acknowledge { id, channel },
        };
        self.pending_ops.push(stored.clone());
        Ok((fully, Some(stored)))
    }

    /// Re-applies a journal op during replay, preserving its sequence.
    pub fn apply_replayed_op(&mut self, stored: StoredOp) -> Result<(), LedgerError> {
        let seq = stored.seq;
        match stored.op {
            Op::Record { operation } => {
                if self.records.contains_key(&operation.id) {
                    return Err(LedgerError::InvariantViolation(format!(
                        "operation {} already recorded",
                        operation.id
                    )));
                }
                let id = operation.id;
                self.next_id = self.next_id.max(id.saturating_add(1));
                self.last_created_at_ms = self.last_created_at_ms.max(operation.created_at_ms);
                self.insert_indices(&operation);
                self.order.push(id);
                self.records.insert(id, operation);
            }
            Op::Acknowledge { id, channel } => {
                let rec = self.records.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
                rec.sync.acknowledge(channel);
            }
        }
        self.bump_next_seq_from(seq);
        Ok(())
    }

    /// Looks up a record by id.
    pub fn get(&self, id: OperationId) -> Option<&HopperOperation> {
        self.records.get(&id)
    }

    /// Cloning variant of [`LedgerStore::get`].
    pub fn get_cloned(&self, id: OperationId) -> Option<HopperOperation> {
        self.get(id).cloned()
    }

    /// Lazy scan over records matching `filter`, in ascending
    /// `(created_at_ms, id)` order.
    pub fn query<'a>(
        &'a self,
        filter: &'a OperationFilter,
    ) -> impl Iterator<Item = &'a HopperOperation> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .filter(|rec| filter.matches(rec))
    }

    /// Cloning variant of [`LedgerStore::query`].
    pub fn query_cloned(&self, filter: &OperationFilter) -> Vec<HopperOperation> {
        self.query(filter).cloned().collect()
    }

    /// One page of at most `limit` matches strictly after `cursor`.
    ///
    /// Resumes by binary search on the global `(created_at_ms, id)` order,
    /// so pagination never rescans earlier pages.
    pub fn page(
        &self,
        filter: &OperationFilter,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> QueryPage {
        let start = match cursor {
            Some(c) => self.order.partition_point(|id| {
                self.records
                    .get(id)
                    .is_some_and(|rec| (rec.created_at_ms, rec.id) <= (c.created_at_ms, c.id))
            }),
            None => 0,
        };

        let records: Vec<HopperOperation> = self.order[start..]
            .iter()
            .filter_map(|id| self.records.get(id))
            .filter(|rec| filter.matches(rec))
            .take(limit)
            .cloned()
            .collect();

        let next = if records.len() == limit {
            records.last().map(|rec| Cursor {
                created_at_ms: rec.created_at_ms,
                id: rec.id,
            })
        } else {
            None
        };

        QueryPage { records, next }
    }

    /// All records for one hopper, in acceptance order.
    pub fn by_hopper(&self, hopper_id: HopperId) -> Vec<&HopperOperation> {
        self.by_hopper
            .get(&hopper_id)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    /// All records for one machine, in acceptance order.
    pub fn by_machine(&self, machine_id: MachineId) -> Vec<&HopperOperation> {
        self.by_machine
            .get(&machine_id)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    /// Record ids in acceptance order.
    pub fn ordered_ids(&self) -> &[OperationId] {
        &self.order
    }

    /// Takes ops queued since the last drain, for persistence.
    pub fn drain_pending_ops(&mut self) -> Vec<StoredOp> {
        std::mem::take(&mut self.pending_ops)
    }

    /// Highest journal sequence assigned so far.
    pub fn latest_op_seq(&self) -> OpSeq {
        self.next_op_seq.saturating_sub(1)
    }

    fn insert_indices(&mut self, rec: &HopperOperation) {
        self.by_hopper.entry(rec.hopper_id).or_default().push(rec.id);
        if let Some(machine_id) = rec.machine_id {
            self.by_machine.entry(machine_id).or_default().push(rec.id);
        }
    }

    fn take_next_op_seq(&mut self) -> OpSeq {
        let seq = self.next_op_seq;
        self.next_op_seq += 1;
        seq
    }

    fn bump_next_seq_from(&mut self, seq: OpSeq) {
        self.next_op_seq = self.next_op_seq.max(seq.saturating_add(1));
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
