//! Multipath sending towards one peer.
//!
//! [`PeerPaths`] is the caller side of the adversary contract: it learns the
//! current path set for a peer, reports it through
//! [`Adversary::on_path_set_changed`] and fans datagrams (typically handshake
//! initiations) out over every path.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::adversary::Adversary;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::path::Path;
use crate::transport::Binding;

/// Path set tracking for one peer endpoint.
pub struct PeerPaths {
    endpoint: Arc<Endpoint>,
    paths: RwLock<Vec<Path>>,
}

impl PeerPaths {
    pub fn new(endpoint: Arc<Endpoint>) -> Self {
        Self {
            endpoint,
            paths: RwLock::new(Vec::new()),
        }
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    /// Paths learned by the last [`refresh`](Self::refresh).
    pub fn known_paths(&self) -> Vec<Path> {
        self.paths.read().clone()
    }

    /// Re-query the peer's path set and report it to `adversary`.
    ///
    /// The path set is kept even if the adversary fails to track it.
    pub async fn refresh(&self, binding: &Binding, adversary: &dyn Adversary) -> Result<Vec<Path>> {
        let paths = self.endpoint.query_available_paths(binding.network()).await?;
        *self.paths.write() = paths.clone();
        debug!(peer = %self.endpoint.destination(), paths = paths.len(), "path set refreshed");

        let key = self.endpoint.destination_key();
        if let Err(e) = adversary.on_path_set_changed(&key, &paths).await {
            warn!(
                peer = %key,
                adversary = adversary.name(),
                "adversary could not track path set: {}",
                e
            );
            return Err(e);
        }
        Ok(paths)
    }

    /// Send `data` once over every known path, each through `adversary`.
    /// Returns the number of paths used.
    pub async fn send_all(
        &self,
        binding: &Binding,
        adversary: &dyn Adversary,
        data: &[u8],
    ) -> Result<usize> {
        let paths = self.known_paths();
        for path in &paths {
            let pinned = self.endpoint.over(path.clone());
            binding.send(data, &pinned, adversary).await?;
        }
        Ok(paths.len())
    }

    /// Send `data` over the endpoint's own path (default path if unset).
    pub async fn send(
        &self,
        binding: &Binding,
        adversary: &dyn Adversary,
        data: &[u8],
    ) -> Result<()> {
        binding.send(data, &self.endpoint, adversary).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    use crate::adversary::PassThrough;
    use crate::transport::sim::SimNetwork;
    use crate::transport::BindingConfig;
    use crate::types::{IsdAsn, ScionAddr};

    #[tokio::test]
    async fn test_refresh_and_fan_out() {
        let ia_a: IsdAsn = "1-ff00:0:110".parse().unwrap();
        let ia_b: IsdAsn = "1-ff00:0:111".parse().unwrap();
        let net = SimNetwork::new();
        net.connect(ia_a, ia_b, 3);

        let host_a = net.host(ia_a, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        let host_b = net.host(ia_b, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        let config = BindingConfig::default();
        let (binding_a, _) = Binding::bind(Arc::new(host_a), &config).await.unwrap();
        let (binding_b, port_b) = Binding::bind(Arc::new(host_b), &config).await.unwrap();

        let peer = PeerPaths::new(Arc::new(Endpoint::new(ScionAddr::new(
            ia_b,
            (Ipv4Addr::new(10, 0, 0, 2), port_b).into(),
        ))));

        let paths = peer.refresh(&binding_a, &PassThrough).await.unwrap();
        assert_eq!(paths.len(), 3);
        assert_eq!(peer.send_all(&binding_a, &PassThrough, b"hello").await.unwrap(), 3);
        // Fan-out leaves the endpoint's own path alone.
        assert!(!peer.endpoint().has_path());

        let mut buf = [0u8; 16];
        for _ in 0..3 {
            let (len, from) = binding_b.receive(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], b"hello");
            assert_eq!(from.destination(), binding_a.local_addr());
        }
    }
}
