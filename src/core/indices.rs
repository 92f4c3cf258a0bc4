use hashbrown::HashMap;

use crate::types::OperationId;

/// Secondary index from a key to record ids in append order.
pub type VecIndex<K> = HashMap<K, Vec<OperationId>>;
