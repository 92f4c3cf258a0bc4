//! Persistence abstraction over the op journal.

/// SQLite sink implementation.
pub mod sqlite;

use crate::{core::store::StoreSnapshotV1, op::StoredOp, types::OpSeq};

/// Failure writing to or reading from the journal sink.
#[derive(Debug)]
pub enum PersistError {
    /// Underlying SQLite failure.
    Sqlite(rusqlite::Error),
    /// Payload (de)serialization failure.
    Serde(serde_json::Error),
    /// Any other sink failure.
    Message(String),
}

impl From<rusqlite::Error> for PersistError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

impl From<crate::error::LedgerError> for PersistError {
    fn from(value: crate::error::LedgerError) -> Self {
        Self::Message(format!("ledger error: {value:?}"))
    }
}

/// Result alias for sink operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Durable destination for journal ops.
pub trait OpSink: Send {
    /// Appends a batch of ops; returns the highest sequence written.
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq>;
    /// Forces buffered writes to durable storage.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
    /// Records a full-state snapshot covering `last_seq`.
    fn write_snapshot(&mut self, _snapshot: &StoreSnapshotV1, _last_seq: OpSeq) -> PersistResult<()> {
        Ok(())
    }
    /// Drops journal ops at or below `seq`; returns the count removed.
    fn compact_through(&mut self, _seq: OpSeq) -> PersistResult<usize> {
        Ok(0)
    }
}
