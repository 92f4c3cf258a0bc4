//! Shared validation and lookup error taxonomy.

use crate::types::OperationId;

/// Errors surfaced by validation and read paths.
///
/// All variants indicate caller input problems or normal miss outcomes and
/// are never retried by the ledger itself.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// A negative or missing quantity was supplied.
    InvalidQuantity(String),
    /// Supplied quantities disagree with the operation-type formula.
    InvariantViolation(String),
    /// A filter or analysis parameter is out of range.
    InvalidArgument(String),
    /// No record exists for the given id.
    NotFound(OperationId),
}
