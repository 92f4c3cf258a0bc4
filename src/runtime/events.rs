//! Ledger event stream payloads.

use crate::types::{Channel, OpSeq, OperationId};

/// Events emitted from the single-writer service loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// A new operation was accepted into the ledger.
    Recorded {
        /// Accepted operation id.
        id: OperationId,
    },
    /// One channel acknowledged an operation.
    Acknowledged {
        /// Acknowledged operation id.
        id: OperationId,
        /// Acknowledging channel.
        channel: Channel,
    },
    /// All three channels have acknowledged an operation.
    FullySynced {
        /// Fully synced operation id.
        id: OperationId,
    },
    /// Persistence has reached at least this journal sequence.
    DurableUpTo {
        /// Highest sequence known durable.
        op_seq: OpSeq,
    },
}
