//! Shared primitive IDs and ledger enums.

use serde::{Deserialize, Serialize};

/// Monotonic operation record identifier.
pub type OperationId = u64;
/// Monotonic journal sequence number.
pub type OpSeq = u64;
/// Hopper (ingredient container) identifier.
pub type HopperId = u64;
/// Ingredient identifier.
pub type IngredientId = u64;
/// Vending machine identifier.
pub type MachineId = u64;
/// Operator (acting user) identifier.
pub type OperatorId = u32;

/// Physical action recorded against a hopper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    /// Top up an installed hopper with more ingredient.
    Fill,
    /// Place a loaded hopper into an empty slot.
    Install,
    /// Take a hopper out, emptying it.
    Remove,
    /// Clean a hopper; no quantities involved.
    Clean,
}

/// Originating interface of a submission or acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Chat-bot adapter.
    Telegram,
    /// Web console adapter.
    Web,
    /// Mobile app adapter.
    Mobile,
}

impl Channel {
    /// The fixed set of known channels.
    pub const ALL: [Channel; 3] = [Channel::Telegram, Channel::Web, Channel::Mobile];
}
