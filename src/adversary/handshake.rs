//! All-but-one adversary that lets handshake messages through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Adversary, AllButOneBlock};
use crate::endpoint::SendTarget;
use crate::error::Result;
use crate::path::Path;
use crate::types::DestinationKey;

/// Handshake initiation message size of the tunnel protocol.
pub const MESSAGE_INITIATION_SIZE: usize = 148;
/// Handshake response message size.
pub const MESSAGE_RESPONSE_SIZE: usize = 92;
/// Cookie reply message size.
pub const MESSAGE_COOKIE_REPLY_SIZE: usize = 64;

/// Exact datagram sizes identifying handshake messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandshakeSizes(Vec<usize>);

impl HandshakeSizes {
    pub fn new(sizes: Vec<usize>) -> Self {
        Self(sizes)
    }

    pub fn contains(&self, len: usize) -> bool {
        self.0.contains(&len)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for HandshakeSizes {
    fn default() -> Self {
        Self(vec![
            MESSAGE_INITIATION_SIZE,
            MESSAGE_RESPONSE_SIZE,
            MESSAGE_COOKIE_REPLY_SIZE,
        ])
    }
}

/// Wraps [`AllButOneBlock`] but never drops a datagram whose length is a
/// handshake message size.
#[derive(Debug)]
pub struct AllButOneHandshakeAware {
    inner: AllButOneBlock,
    sizes: HandshakeSizes,
}

impl AllButOneHandshakeAware {
    pub fn new(inner: AllButOneBlock, sizes: HandshakeSizes) -> Self {
        Self { inner, sizes }
    }

    pub fn inner(&self) -> &AllButOneBlock {
        &self.inner
    }
}

#[async_trait]
impl Adversary for AllButOneHandshakeAware {
    fn name(&self) -> &'static str {
        "all-but-one-handshake-aware"
    }

    fn decide(&self, target: &SendTarget<'_>, datagram: &[u8]) -> Result<bool> {
        if self.sizes.contains(datagram.len()) {
            return Ok(false);
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
