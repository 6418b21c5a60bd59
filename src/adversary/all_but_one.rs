//! Adversary blocking every path but one per destination.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::Adversary;
use crate::endpoint::SendTarget;
use crate::error::{Error, Result};
use crate::path::{self, Path, PathFingerprint};
use crate::probe::{choose_safe_path, ProberFactory};
use crate::types::DestinationKey;

/// Blocking state for one destination.
///
/// Every known path but `safe` is in `blocked`. `safe` is `None` only while
/// a replacement is being probed; the previous safe path is blocked by then.
/// `generation` identifies the update that last touched the record.
#[derive(Debug, Default, Clone)]
struct BlockingRecord {
    blocked: HashSet<PathFingerprint>,
    safe: Option<PathFingerprint>,
    generation: u64,
}

impl BlockingRecord {
    fn block_all(&mut self, paths: &[PathFingerprint]) {
        self.blocked.extend(paths.iter().copied());
    }

    /// Block the current safe path until a replacement is chosen.
    fn close(&mut self) {
        if let Some(old) = self.safe.take() {
            self.blocked.insert(old);
        }
    }

    fn open(&mut self, safe: PathFingerprint) {
        self.close();
        self.blocked.remove(&safe);
        self.safe = Some(safe);
    }
}

#[derive(Debug, Default)]
struct Records {
    by_destination: HashMap<DestinationKey, BlockingRecord>,
    next_generation: u64,
}

impl Records {
    /// Record for `destination`, stamped with a fresh generation.
    fn begin_update(&mut self, destination: DestinationKey) -> (&mut BlockingRecord, u64) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let record = self.by_destination.entry(destination).or_default();
        record.generation = generation;
        (record, generation)
    }

    /// Record for `destination` if no later update has touched it.
    fn current(
        &mut self,
        destination: &DestinationKey,
        generation: u64,
    ) -> Option<&mut BlockingRecord> {
        self.by_destination
            .get_mut(destination)
            .filter(|record| record.generation == generation)
    }
}

/// Blocks every path towards a destination except one "safe" path.
///
/// Per destination the state is either unknown (no record: everything is
/// dropped) or tracking (`blocked` set plus one safe path). Path-set updates
/// keep the current safe path when it is still offered; otherwise a new one
/// is chosen by probing. A failed probe resets the destination to unknown.
///
/// Probing runs without the records lock. When updates for one destination
/// overlap, only the result of the latest one is applied.
pub struct AllButOneBlock {
    prober: Arc<dyn ProberFactory>,
    deadline: Duration,
    records: Mutex<Records>,
}

impl AllButOneBlock {
    pub fn new(prober: Arc<dyn ProberFactory>, deadline: Duration) -> Self {
        Self {
            prober,
            deadline,
            records: Mutex::new(Records::default()),
        }
    }

    /// Safe path for `destination`, if tracked.
    pub fn safe_path(&self, destination: &DestinationKey) -> Option<PathFingerprint> {
        self.records
            .lock()
            .by_destination
            .get(destination)
            .and_then(|r| r.safe)
    }

    /// Blocked paths for `destination`, if tracked.
    pub fn blocked_paths(&self, destination: &DestinationKey) -> Option<HashSet<PathFingerprint>> {
        self.records
            .lock()
            .by_destination
            .get(destination)
            .map(|r| r.blocked.clone())
    }

    pub fn is_tracking(&self, destination: &DestinationKey) -> bool {
        self.records.lock().by_destination.contains_key(destination)
    }
}

impl std::fmt::Debug for AllButOneBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllButOneBlock")
            .field("deadline", &self.deadline)
            .field("destinations", &self.records.lock().by_destination.len())
            .finish()
    }
}

#[async_trait]
impl Adversary for AllButOneBlock {
    fn name(&self) -> &'static str {
        "all-but-one"
    }

    fn decide(&self, target: &SendTarget<'_>, _datagram: &[u8]) -> Result<bool> {
        let records = self.records.lock();
        let Some(record) = records.by_destination.get(&target.key()) else {
            return Ok(true);
        };
        Ok(record.blocked.contains(&target.fingerprint()))
    }

    async fn on_path_set_changed(
        &self,
        destination: &DestinationKey,
        paths: &[Path],
    ) -> Result<()> {
        let fingerprints: Vec<PathFingerprint> = paths.iter().map(Path::fingerprint).collect();

        let generation = {
            let mut records = self.records.lock();
            let (record, generation) = records.begin_update(*destination);
            record.block_all(&fingerprints);

            if let Some(safe) = record.safe.filter(|fp| path::contains(paths, fp)) {
                record.blocked.remove(&safe);
                debug!(
                    %destination,
                    safe = %safe.short(),
                    paths = paths.len(),
                    "safe path still offered"
                );
                return Ok(());
            }

            // New destination or safe path gone: everything stays blocked
            // until probing picks a replacement.
            record.close();
            generation
        };

        let chosen =
            choose_safe_path(self.prober.as_ref(), destination.ia(), paths, self.deadline).await;

        let mut records = self.records.lock();
        let Some(record) = records.current(destination, generation) else {
            debug!(%destination, "path set superseded while probing, discarding result");
            return Ok(());
        };

        match chosen {
            Ok(Some(path)) => {
                let safe = path.fingerprint();
                record.open(safe);
                info!(
                    %destination,
                    safe = %safe.short(),
                    blocked = record.blocked.len(),
                    "safe path selected"
                );
                Ok(())
            }
            Ok(None) => {
                records.by_destination.remove(destination);
                warn!(%destination, "no usable path, blocking everything");
                Err(Error::NoUsablePath {
                    destination: *destination,
                })
            }
            Err(e) => {
                records.by_destination.remove(destination);
                warn!(%destination, "probing failed, blocking everything: {}", e);
                Err(e)
            }
        }
    }
}
