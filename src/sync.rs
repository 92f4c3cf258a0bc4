//! Per-channel acknowledgment state carried on every record.

use serde::{Deserialize, Serialize};

use crate::types::Channel;

/// Acknowledged-flags for the three known channels.
///
/// Every record starts with all channels pending. A channel flag only ever
/// moves from pending to acknowledged; there is no transition back and no
/// recorded failure state (delivery retries belong to the channel adapters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncStatus {
    /// Chat-bot view is up to date.
    pub telegram: bool,
    /// Web console view is up to date.
    pub web: bool,
    /// Mobile app view is up to date.
    pub mobile: bool,
}

impl SyncStatus {
    /// Returns whether `channel` has acknowledged.
    pub fn is_acknowledged(&self, channel: Channel) -> bool {
        match channel {
            Channel::Telegram => self.telegram,
            Channel::Web => self.web,
            Channel::Mobile => self.mobile,
        }
    }

    /// Marks `channel` acknowledged. Returns `false` when the flag was
    /// already set (idempotent no-op).
    pub fn acknowledge(&mut self, channel: Channel) -> bool {
        let flag = match channel {
            Channel::Telegram => &mut self.telegram,
            Channel::Web => &mut self.web,
            Channel::Mobile => &mut self.mobile,
        };
        let changed = !*flag;
        *flag = true;
        changed
    }

    /// True when every known channel has acknowledged.
    pub fn fully_synced(&self) -> bool {
        Channel::ALL.iter().all(|c| self.is_acknowledged(*c))
    }
}
