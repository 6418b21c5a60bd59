//! Single-destination adversary that wakes up late.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{Adversary, SingleDestinationBlock};
use crate::endpoint::SendTarget;
use crate::error::Result;
use crate::path::Path;
use crate::types::DestinationKey;

/// Datagrams let through before a lazy adversary starts blocking.
pub const DEFAULT_WAKE_UP: usize = 3;

/// Lets the first `wake_up` datagrams through regardless of destination or
/// path, then behaves like a fresh [`SingleDestinationBlock`].
#[derive(Debug)]
pub struct Lazy {
    inner: SingleDestinationBlock,
    wake_up: usize,
    passed: Mutex<usize>,
}

impl Lazy {
    pub fn new(inner: SingleDestinationBlock, wake_up: usize) -> Self {
        Self {
            inner,
            wake_up,
            passed: Mutex::new(0),
        }
    }

    pub fn is_awake(&self) -> bool {
        *self.passed.lock() >= self.wake_up
    }
}

#[async_trait]
impl Adversary for Lazy {
    fn name(&self) -> &'static str {
        "lazy"
    }

    fn decide(&self, target: &SendTarget<'_>, datagram: &[u8]) -> Result<bool> {
        {
            let mut passed = self.passed.lock();
            if *passed < self.wake_up {
                *passed += 1;
                if *passed == self.wake_up {
                    debug!(after = self.wake_up, "lazy adversary waking up");
                }
                return Ok(false);
            }
        }
        self.inner.decide(target, datagram)
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
    use crate::adversary::test_utils::{path, peer_a, target};

    #[test]
    fn test_wakes_up_after_n() {
        let adversary = Lazy::new(SingleDestinationBlock::new(), 2);
        let a = peer_a();
        let (p1, p2) = (path(1), path(2));

        assert!(!adversary.decide(&target(&a, &p1), b"x").unwrap());
        assert!(!adversary.decide(&target(&a, &p1), b"x").unwrap());
        assert!(adversary.is_awake());

        // Call N+1 is the single-destination adversary's first observation.
        assert!(adversary.decide(&target(&a, &p2), b"x").unwrap());
        assert!(!adversary.decide(&target(&a, &p1), b"x").unwrap());
        assert!(adversary.decide(&target(&a, &p2), b"x").unwrap());
    }

    #[test]
    fn test_default_wake_up() {
        let adversary = Lazy::new(SingleDestinationBlock::new(), DEFAULT_WAKE_UP);
        let a = peer_a();
        let p = path(1);
        for _ in 0..DEFAULT_WAKE_UP {
            assert!(!adversary.decide(&target(&a, &p), b"x").unwrap());
        }
        assert!(adversary.decide(&target(&a, &p), b"x").unwrap());
    }
}
