//! Path-aware datagram transport.
//!
//! The underlying path-aware network (socket creation, path discovery) sits
//! behind the [`PathNetwork`] and [`PathConn`] traits. [`Binding`] layers the
//! tunnel's send semantics on top: default-path resolution, the adversary's
//! drop decision, explicit-path sends and receive with transient-error retry.

pub mod sim;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::adversary::Adversary;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::path::Path;
use crate::types::{IsdAsn, ScionAddr};

/// Binding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Local port (0 = ephemeral).
    #[serde(default)]
    pub port: u16,

    /// Receive buffer size in bytes.
    #[serde(default = "default_recv_buffer")]
    pub recv_buffer_size: usize,
}

fn default_recv_buffer() -> usize {
    64 * 1024
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            port: 0,
            recv_buffer_size: default_recv_buffer(),
        }
    }
}

/// A bound datagram socket on the path-aware network.
#[async_trait]
pub trait PathConn: Send + Sync {
    /// Local address including the actually bound port.
    fn local_addr(&self) -> ScionAddr;

    /// Send a datagram to `dst` over `path`.
    async fn send_to(&self, data: &[u8], dst: &ScionAddr, path: &Path) -> Result<usize>;

    /// Receive a datagram. Returns its length, the sender and the reply path
    /// (already reversed), if the datagram crossed AS boundaries.
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, ScionAddr, Option<Path>)>;

    /// Close the socket. Pending and later receives fail with
    /// [`TransportError::Closed`](crate::error::TransportError::Closed).
    async fn close(&self) -> Result<()>;
}

/// Socket factory and path lookup of the path-aware network.
#[async_trait]
pub trait PathNetwork: Send + Sync {
    /// Bind a socket on `port` (0 = ephemeral).
    async fn listen(&self, port: u16) -> Result<Box<dyn PathConn>>;

    /// All paths currently known towards `dst`.
    async fn query_paths(&self, dst: IsdAsn) -> Result<Vec<Path>>;

    /// Path used when the caller did not pick one.
    async fn default_path(&self, dst: IsdAsn) -> Result<Path> {
        self.query_paths(dst)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Discovery(format!("no paths to {dst}")))
    }
}

/// Binding counters.
#[derive(Debug, Default)]
pub struct BindingStats {
    pub datagrams_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub datagrams_dropped: AtomicU64,
    pub datagrams_received: AtomicU64,
    pub transient_errors: AtomicU64,
}

/// Point-in-time copy of [`BindingStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingStatsSnapshot {
    pub datagrams_sent: u64,
    pub bytes_sent: u64,
    pub datagrams_dropped: u64,
    pub datagrams_received: u64,
    pub transient_errors: u64,
}

impl BindingStats {
    pub fn snapshot(&self) -> BindingStatsSnapshot {
        BindingStatsSnapshot {
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            datagrams_dropped: self.datagrams_dropped.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            transient_errors: self.transient_errors.load(Ordering::Relaxed),
        }
    }
}

/// Tunnel-facing socket over the path-aware network.
pub struct Binding {
    conn: Box<dyn PathConn>,
    network: Arc<dyn PathNetwork>,
    stats: BindingStats,
    recv_buffer_size: usize,
}

impl Binding {
    /// Bind on the configured port. Returns the binding and the port actually
    /// bound, which differs from the configured one when that was 0.
    pub async fn bind(
        network: Arc<dyn PathNetwork>,
        config: &BindingConfig,
    ) -> Result<(Self, u16)> {
        let conn = network.listen(config.port).await?;
        let port = conn.local_addr().port();
        debug!(local = %conn.local_addr(), "binding opened");

        Ok((
            Self {
                conn,
                network,
                stats: BindingStats::default(),
                recv_buffer_size: config.recv_buffer_size,
            },
            port,
        ))
    }

    pub fn local_addr(&self) -> ScionAddr {
        self.conn.local_addr()
    }

    /// Zeroed buffer of the configured receive size, for [`receive`](Self::receive).
    pub fn recv_buffer(&self) -> Vec<u8> {
        vec![0u8; self.recv_buffer_size]
    }

    pub fn port(&self) -> u16 {
        self.conn.local_addr().port()
    }

    pub fn network(&self) -> &dyn PathNetwork {
        self.network.as_ref()
    }

    pub fn stats(&self) -> BindingStatsSnapshot {
        self.stats.snapshot()
    }

    /// Send `data` to `endpoint` over its selected path, subject to
    /// `adversary`.
    ///
    /// A dropped datagram is reported as a successful send.
    pub async fn send(
        &self,
        data: &[u8],
        endpoint: &Endpoint,
        adversary: &dyn Adversary,
    ) -> Result<()> {
        if !endpoint.has_path() {
            self.resolve_default_path(endpoint).await?;
        }

        let (dst, path, verdict) = endpoint.with_target(|target| {
            trace!(
                destination = %target.destination,
                path = %target.fingerprint().short(),
                "sending datagram"
            );
            let verdict = adversary.decide(&target, data);
            (*target.destination, target.path.clone(), verdict)
        })?;

        if verdict? {
            self.stats.datagrams_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                adversary = adversary.name(),
                destination = %dst,
                path = %path.fingerprint().short(),
                len = data.len(),
                "adversary dropped datagram"
            );
            return Ok(());
        }

        self.transmit(data, &dst, &path).await
    }

    /// Send `data` to `endpoint`'s destination over `path`, bypassing the
    /// endpoint's stored path and the adversary.
    pub async fn send_over(&self, data: &[u8], endpoint: &Endpoint, path: &Path) -> Result<()> {
        let dst = endpoint.destination();
        trace!(
            destination = %dst,
            path = %path.fingerprint().short(),
            "sending over explicit path"
        );
        self.transmit(data, &dst, path).await
    }

    /// Wait for the next datagram. Transient path-transport errors are
    /// retried here and never surfaced.
    pub async fn receive(&self, buf: &mut [u8]) -> Result<(usize, Endpoint)> {
        loop {
            match self.conn.recv_from(buf).await {
                Ok((len, sender, reply_path)) => {
                    self.stats.datagrams_received.fetch_add(1, Ordering::Relaxed);
                    let endpoint = Endpoint::from_received(sender, self.local_addr(), reply_path);
                    return Ok((len, endpoint));
                }
                Err(e) if e.is_transient() => {
                    self.stats.transient_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("transient receive error, retrying: {}", e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Replace `endpoint`'s path with the network's default path to its
    /// destination.
    pub async fn set_default_path(&self, endpoint: &Endpoint) -> Result<Path> {
        let dst = endpoint.destination();
        let path = self.network.default_path(dst.ia).await?;
        endpoint.set_current_path(path.clone());
        debug!(destination = %dst, path = %path.fingerprint().short(), "default path set");
        Ok(path)
    }

    pub async fn close(&self) -> Result<()> {
        debug!(local = %self.local_addr(), "binding closed");
        self.conn.close().await
    }

    async fn resolve_default_path(&self, endpoint: &Endpoint) -> Result<()> {
        let dst = endpoint.destination();
        let path = self.network.default_path(dst.ia).await?;
        if endpoint.set_path_if_unset(path.clone()) {
            debug!(destination = %dst, path = %path.fingerprint().short(), "using default path");
        }
        Ok(())
    }

    async fn transmit(&self, data: &[u8], dst: &ScionAddr, path: &Path) -> Result<()> {
        let sent = self.conn.send_to(data, dst, path).await?;
        self.stats.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
        Ok(())
    }
}
