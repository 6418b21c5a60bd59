//! Simulated on-path adversaries.
//!
//! An [`Adversary`] is consulted for every outgoing datagram and decides
//! whether it is silently dropped. Policies that block paths keep their
//! state per [`DestinationKey`] and track path-set changes through
//! [`Adversary::on_path_set_changed`].
//!
//! Lock discipline:
//! - `decide` runs while the sender holds the endpoint lock. It only sees a
//!   borrowed [`SendTarget`] and takes no lock but the adversary's own.
//! - `on_path_set_changed` is never called with an endpoint lock held, and
//!   no adversary lock is held while it awaits the prober.
//!
//! Policies compose by holding the wrapped policy as a field:
//!
//! ```text
//! PassThrough
//! SingleDestinationBlock ── Lazy
//! AllButOneBlock ─┬─ AllButOneLossy
//!                 └─ AllButOneHandshakeAware
//! ```

mod all_but_one;
mod handshake;
mod lazy;
mod lossy;
mod passthrough;
mod single;

pub use all_but_one::AllButOneBlock;
pub use handshake::{
    AllButOneHandshakeAware, HandshakeSizes, MESSAGE_COOKIE_REPLY_SIZE, MESSAGE_INITIATION_SIZE,
    MESSAGE_RESPONSE_SIZE,
};
pub use lazy::{Lazy, DEFAULT_WAKE_UP};
pub use lossy::AllButOneLossy;
pub use passthrough::PassThrough;
pub use single::SingleDestinationBlock;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::endpoint::SendTarget;
use crate::error::{Error, Result};
use crate::path::Path;
use crate::probe::{ProbeConfig, ProberFactory};
use crate::types::DestinationKey;

/// Drop policy applied to outgoing datagrams.
#[async_trait]
pub trait Adversary: Send + Sync {
    /// Short policy name for logs.
    fn name(&self) -> &'static str;

    /// Whether the datagram to `target` gets dropped.
    fn decide(&self, target: &SendTarget<'_>, datagram: &[u8]) -> Result<bool>;

    /// The full set of paths to `destination` is now `paths`.
    async fn on_path_set_changed(&self, destination: &DestinationKey, paths: &[Path]) -> Result<()>;
}

/// Adversary selection, fixed for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum AdversaryKind {
    /// Lets everything through.
    #[default]
    PassThrough,
    /// Blocks the first path seen per destination.
    SingleDestination,
    /// Blocks every path but one per destination.
    AllButOne,
    /// As all-but-one, and loses the first datagram on the open path.
    AllButOneLossy,
    /// As single-destination, after letting the first datagrams through.
    Lazy,
    /// As all-but-one, but never drops handshake-sized datagrams.
    AllButOneHandshakeAware,
}

impl AdversaryKind {
    pub const ALL: [Self; 6] = [
        Self::PassThrough,
        Self::SingleDestination,
        Self::AllButOne,
        Self::AllButOneLossy,
        Self::Lazy,
        Self::AllButOneHandshakeAware,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PassThrough => "pass-through",
            Self::SingleDestination => "single-destination",
            Self::AllButOne => "all-but-one",
            Self::AllButOneLossy => "all-but-one-lossy",
            Self::Lazy => "lazy",
            Self::AllButOneHandshakeAware => "all-but-one-handshake-aware",
        }
    }

    /// Whether the policy needs a prober.
    pub fn probes(self) -> bool {
        matches!(
            self,
            Self::AllButOne | Self::AllButOneLossy | Self::AllButOneHandshakeAware
        )
    }
}

impl fmt::Display for AdversaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdversaryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown adversary {s:?}")))
    }
}

/// Adversary configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdversaryConfig {
    /// Policy to run.
    #[serde(default)]
    pub kind: AdversaryKind,

    /// Datagrams the lazy adversary lets through before blocking.
    #[serde(default = "default_wake_up")]
    pub lazy_wake_up: usize,

    /// Handshake message sizes exempted by the handshake-aware adversary.
    #[serde(default)]
    pub handshake_sizes: HandshakeSizes,
}

fn default_wake_up() -> usize {
    DEFAULT_WAKE_UP
}

impl Default for AdversaryConfig {
    fn default() -> Self {
        Self {
            kind: AdversaryKind::default(),
            lazy_wake_up: default_wake_up(),
            handshake_sizes: HandshakeSizes::default(),
        }
    }
}

impl AdversaryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kind == AdversaryKind::Lazy && self.lazy_wake_up == 0 {
            return Err(Error::InvalidConfig(
                "lazy adversary needs lazy_wake_up > 0".into(),
            ));
        }
        if self.kind == AdversaryKind::AllButOneHandshakeAware && self.handshake_sizes.is_empty() {
            return Err(Error::InvalidConfig(
                "handshake-aware adversary needs handshake_sizes".into(),
            ));
        }
        Ok(())
    }
}

/// Build the configured adversary. `prober` is only used by the
/// all-but-one family.
pub fn build_adversary(
    config: &AdversaryConfig,
    probe: &ProbeConfig,
    prober: Arc<dyn ProberFactory>,
) -> Arc<dyn Adversary> {
    let all_but_one = || AllButOneBlock::new(Arc::clone(&prober), probe.deadline);

    match config.kind {
        AdversaryKind::PassThrough => Arc::new(PassThrough),
        AdversaryKind::SingleDestination => Arc::new(SingleDestinationBlock::new()),
        AdversaryKind::AllButOne => Arc::new(all_but_one()),
        AdversaryKind::AllButOneLossy => Arc::new(AllButOneLossy::new(all_but_one())),
        AdversaryKind::Lazy => Arc::new(Lazy::new(
            SingleDestinationBlock::new(),
            config.lazy_wake_up,
        )),
        AdversaryKind::AllButOneHandshakeAware => Arc::new(AllButOneHandshakeAware::new(
            all_but_one(),
            config.handshake_sizes.clone(),
        )),
    }
}
