//! All-but-one adversary that also loses one datagram on the safe path.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{Adversary, AllButOneBlock};
use crate::endpoint::SendTarget;
use crate::error::Result;
use crate::path::Path;
use crate::types::DestinationKey;

/// Wraps [`AllButOneBlock`]; the first datagram it would let through is
/// dropped anyway, simulating one lost packet on the open path.
///
/// The loss happens once per instance and is not re-armed when the safe
/// path changes.
#[derive(Debug)]
pub struct AllButOneLossy {
    inner: AllButOneBlock,
    had_loss: Mutex<bool>,
}

impl AllButOneLossy {
    pub fn new(inner: AllButOneBlock) -> Self {
        Self {
            inner,
            had_loss: Mutex::new(false),
        }
    }

    pub fn inner(&self) -> &AllButOneBlock {
        &self.inner
    }

    pub fn had_loss(&self) -> bool {
        *self.had_loss.lock()
    }
}

#[async_trait]
impl Adversary for AllButOneLossy {
    fn name(&self) -> &'static str {
        "all-but-one-lossy"
    }

    fn decide(&self, target: &SendTarget<'_>, datagram: &[u8]) -> Result<bool> {
        // Lock order: ours, then the wrapped adversary's.
        let mut had_loss = self.had_loss.lock();
        let drop = self.inner.decide(target, datagram)?;
        if !drop && !*had_loss {
            *had_loss = true;
            debug!(
                destination = %target.destination,
                path = %target.fingerprint().short(),
                "losing first datagram on safe path"
            );
            return Ok(true);
        }
        Ok(drop)
    }

    async fn on_path_set_changed(
        &self,
        destination: &DestinationKey,
        paths: &[Path],
    ) -> Result<()> {
        self.inner.on_path_set_changed(destination, paths).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::adversary::test_utils::{key, path, peer_a, target};
    use crate::probe::test_utils::FixedProber;
    use crate::probe::PathStatus;

    #[tokio::test]
    async fn test_first_pass_becomes_drop() {
        let paths = vec![path(1), path(2)];
        let prober = FixedProber::with(&[(&paths[1], PathStatus::Alive)]);
        let adversary =
            AllButOneLossy::new(AllButOneBlock::new(Arc::new(prober), Duration::from_secs(1)));
        let a = peer_a();

        adversary.on_path_set_changed(&key(&a), &paths).await.unwrap();

        // Blocked path: dropped, does not consume the loss.
        assert!(adversary.decide(&target(&a, &paths[0]), b"x").unwrap());
        assert!(!adversary.had_loss());

        // Safe path: lost once, then open.
        assert!(adversary.decide(&target(&a, &paths[1]), b"x").unwrap());
        assert!(adversary.had_loss());
        assert!(!adversary.decide(&target(&a, &paths[1]), b"x").unwrap());
        assert!(!adversary.decide(&target(&a, &paths[1]), b"x").unwrap());
        assert!(adversary.decide(&target(&a, &paths[0]), b"x").unwrap());
    }

    #[tokio::test]
    async fn test_loss_not_rearmed_on_safe_path_change() {
        let first = vec![path(1), path(2)];
        let second = vec![path(2), path(3)];
        let prober =
            FixedProber::with(&[(&first[0], PathStatus::Alive), (&second[1], PathStatus::Alive)]);
        let adversary =
            AllButOneLossy::new(AllButOneBlock::new(Arc::new(prober), Duration::from_secs(1)));
        let a = peer_a();
        let dst = key(&a);

        adversary.on_path_set_changed(&dst, &first).await.unwrap();
        assert!(adversary.decide(&target(&a, &first[0]), b"x").unwrap());
        assert!(!adversary.decide(&target(&a, &first[0]), b"x").unwrap());

        adversary.on_path_set_changed(&dst, &second).await.unwrap();
        assert_eq!(adversary.inner().safe_path(&dst), Some(second[1].fingerprint()));
        assert!(!adversary.decide(&target(&a, &second[1]), b"x").unwrap());
    }
}
