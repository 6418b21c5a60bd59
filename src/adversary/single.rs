//! Adversary sitting on the first path used towards each destination.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::Adversary;
use crate::endpoint::SendTarget;
use crate::error::Result;
use crate::path::{Path, PathFingerprint};
use crate::types::DestinationKey;

/// Blocks the first path observed per destination, forever.
///
/// The first datagram to a destination is dropped and its path recorded;
/// later datagrams are dropped iff they use the recorded path. Path-set
/// updates do not move the adversary.
#[derive(Debug, Default)]
pub struct SingleDestinationBlock {
    blocked: Mutex<HashMap<DestinationKey, PathFingerprint>>,
}

impl SingleDestinationBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path blocked for `destination`, once observed.
    pub fn blocked_path(&self, destination: &DestinationKey) -> Option<PathFingerprint> {
        self.blocked.lock().get(destination).copied()
    }
}

#[async_trait]
impl Adversary for SingleDestinationBlock {
    fn name(&self) -> &'static str {
        "single-destination"
    }

    fn decide(&self, target: &SendTarget<'_>, _datagram: &[u8]) -> Result<bool> {
        let fp = target.fingerprint();
        let mut blocked = self.blocked.lock();
        match blocked.entry(target.key()) {
            Entry::Vacant(slot) => {
                debug!(
                    destination = %target.destination,
                    path = %fp.short(),
                    "blocking first observed path"
                );
                slot.insert(fp);
                Ok(true)
            }
            Entry::Occupied(slot) => Ok(*slot.get() == fp),
        }
    }

    async fn on_path_set_changed(
        &self,
        _destination: &DestinationKey,
        _paths: &[Path],
    ) -> Result<()> {
        Ok(())
    }
}
