//! In-memory authoritative ledger store and index helpers.

/// Helper index aliases.
pub mod indices;
/// Authoritative operation store and query engine.
pub mod store;
