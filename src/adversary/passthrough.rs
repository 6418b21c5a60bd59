//! Adversary that never interferes.

use async_trait::async_trait;

use super::Adversary;
use crate::endpoint::SendTarget;
use crate::error::Result;
use crate::path::Path;
use crate::types::DestinationKey;

/// Lets every datagram through; behaves like running without an adversary.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

#[async_trait]
impl Adversary for PassThrough {
    fn name(&self) -> &'static str {
        "pass-through"
    }

    fn decide(&self, _target: &SendTarget<'_>, _datagram: &[u8]) -> Result<bool> {
        Ok(false)
    }

    async fn on_path_set_changed(
        &self,
        _destination: &DestinationKey,
        _paths: &[Path],
    ) -> Result<()> {
        Ok(())
    }
}
