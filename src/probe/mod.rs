//! Path liveness probing.
//!
//! The probing algorithm itself belongs to the path-aware network; this
//! module defines its boundary ([`ProberFactory`], [`PathProber`]) and the
//! deadline-bounded safe-path choice built on it.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProbeError, Result};
use crate::path::{Path, PathFingerprint};
use crate::types::IsdAsn;

/// Liveness classification of a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathStatus {
    /// Probe answered within the deadline.
    Alive,
    /// No answer before the deadline.
    Timeout,
    /// An on-path router reported the destination unreachable.
    Unreachable,
    /// The prober could not say anything about the path.
    Unknown,
}

impl PathStatus {
    /// Preference when picking a path to leave open. `None` means never pick.
    fn rank(self) -> Option<u8> {
        match self {
            Self::Alive => Some(2),
            Self::Timeout => Some(1),
            Self::Unknown => Some(0),
            Self::Unreachable => None,
        }
    }
}

impl std::fmt::Display for PathStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alive => write!(f, "alive"),
            Self::Timeout => write!(f, "timeout"),
            Self::Unreachable => write!(f, "unreachable"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Probing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Time budget for prober setup plus classification.
    #[serde(default = "default_deadline", with = "humantime_serde")]
    pub deadline: Duration,
}

fn default_deadline() -> Duration {
    Duration::from_secs(1)
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            deadline: default_deadline(),
        }
    }
}

/// Classifies a set of paths towards one destination network.
#[async_trait]
pub trait PathProber: Send + Sync {
    async fn classify(
        &self,
        paths: &[Path],
        deadline: Duration,
    ) -> Result<HashMap<PathFingerprint, PathStatus>>;
}

/// Creates probers for a destination network.
#[async_trait]
pub trait ProberFactory: Send + Sync {
    async fn new_prober(&self, dst: IsdAsn) -> Result<Box<dyn PathProber>>;
}

/// Probe `paths` and pick the one to leave unblocked.
///
/// Preference is alive, then timeout, then unknown; ties go to the earlier
/// path in `paths`. Unreachable paths are never picked. Returns `Ok(None)`
/// when nothing was classified or nothing is eligible. Prober setup and
/// classification together are bounded by `deadline`.
pub async fn choose_safe_path(
    factory: &dyn ProberFactory,
    dst: IsdAsn,
    paths: &[Path],
    deadline: Duration,
) -> Result<Option<Path>> {
    if paths.is_empty() {
        return Ok(None);
    }

    let classification = tokio::time::timeout(deadline, async {
        let prober = factory.new_prober(dst).await?;
        prober.classify(paths, deadline).await
    })
    .await
    .map_err(|_| ProbeError::Timeout(deadline))??;

    if classification.is_empty() {
        debug!(%dst, "prober returned no classification");
        return Ok(None);
    }

    let mut best: Option<(u8, &Path)> = None;
    for path in paths {
        let status = classification
            .get(&path.fingerprint())
            .copied()
            .unwrap_or(PathStatus::Unknown);
        debug!(%dst, path = %path.fingerprint().short(), %status, "path classified");

        let Some(rank) = status.rank() else { continue };
        if best.map_or(true, |(best_rank, _)| rank > best_rank) {
            best = Some((rank, path));
        }
    }

    Ok(best.map(|(_, path)| path.clone()))
}
