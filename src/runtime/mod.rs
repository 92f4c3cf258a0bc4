//! Single-writer async ledger service and event stream APIs.

/// Event stream types emitted by the service loop.
pub mod events;
/// Handle and command loop implementation.
pub mod handle;
