//! Journal op model and persistence wrappers.

use serde::{Deserialize, Serialize};

use crate::{
    operation::HopperOperation,
    types::{Channel, OpSeq, OperationId},
};

/// Version number for serialized [`StoredOpEnvelope`] payloads.
pub const OP_FORMAT_VERSION: u16 = 1;

/// Immutable operation appended to the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Accept a fully validated operation record.
    Record {
        /// Accepted record, sync flags all pending.
        operation: HopperOperation,
    },
    /// Mark one channel of a record acknowledged.
    Acknowledge {
        /// Record to mutate.
        id: OperationId,
        /// Acknowledging channel.
        channel: Channel,
    },
}

/// Journal row metadata plus op payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOp {
    /// Monotonic journal sequence.
    pub seq: OpSeq,
    /// Journal timestamp in milliseconds.
    pub ts_ms: u64,
    /// Op body.
    pub op: Op,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOpEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped op.
    pub stored: StoredOp,
}

impl StoredOpEnvelope {
    /// Constructs an envelope using [`OP_FORMAT_VERSION`].
    pub fn new(stored: StoredOp) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            stored,
        }
    }
}
