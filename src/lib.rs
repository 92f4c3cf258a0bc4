//! Authoritative in-memory hopper operation ledger with append-only SQLite
//! journaling.
//!
//! Records physical inventory actions on vending-machine ingredient hoppers
//! (fill, install, remove, clean), reconciles quantities at acceptance,
//! tracks per-channel acknowledgment state, and derives consumption-rate
//! analytics from the recorded history.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::LedgerStore`]:
//! ```
//! use hopperlog::{
//!     core::store::LedgerStore,
//!     operation::OperationDraft,
//!     types::OperationType,
//! };
//!
//! let mut store = LedgerStore::new();
//! let (id, _op) = store.submit(OperationDraft {
//!     hopper_id: 1,
//!     operation_type: OperationType::Fill,
//!     ingredient_id: Some(5),
//!     quantity_before: Some(2.0),
//!     quantity_added: Some(3.0),
//!     quantity_after: None,
//!     operator_id: 1,
//!     machine_id: Some(1),
//!     photos: vec![],
//!     notes: None,
//! }).expect("submit");
//! assert_eq!(id, 1);
//! assert_eq!(store.get(id).unwrap().quantities.unwrap().after, 5.0);
//! ```
//!
//! Service usage with SQLite sink:
//! ```no_run
//! use hopperlog::{
//!     core::store::LedgerStore,
//!     operation::OperationDraft,
//!     persist::sqlite::SqliteOpSink,
//!     runtime::handle::{spawn_ledger, RuntimeConfig},
//!     types::{Channel, OperationType},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = SqliteOpSink::open("ledger.db").expect("open sqlite");
//! let handle = spawn_ledger(LedgerStore::new(), Some(Box::new(sink)), RuntimeConfig::default());
//! let id = handle.submit(OperationDraft {
//!     hopper_id: 1,
//!     operation_type: OperationType::Clean,
//!     ingredient_id: None,
//!     quantity_before: None,
//!     quantity_added: None,
//!     quantity_after: None,
//!     operator_id: 1,
//!     machine_id: None,
//!     photos: vec![],
//!     notes: None,
//! }).await.expect("submit");
//! let _ = handle.acknowledge(id, Channel::Web).await.expect("ack");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Windowed consumption-rate analytics.
pub mod analysis;
/// In-memory authoritative store and index helpers.
pub mod core;
/// Shared validation and lookup error taxonomy.
pub mod error;
/// Journal op model and persistence wrapper types.
pub mod op;
/// Operation records, drafts, filters, and pagination.
pub mod operation;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// Quantity reconciliation rules.
pub mod quantity;
/// Single-writer service handle and events.
pub mod runtime;
/// Per-channel acknowledgment state.
pub mod sync;
/// Shared primitive types and enums.
pub mod types;
