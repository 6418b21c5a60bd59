//! Adversary policy tests over the simulated path network.
//!
//! Each test wires an initiator and a responder in different ASes, fans
//! datagrams out over every path through one adversary and checks which
//! paths the responder actually heard from.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use pathwarden::adversary::{
    build_adversary, Adversary, AdversaryConfig, AdversaryKind, MESSAGE_INITIATION_SIZE,
};
use pathwarden::endpoint::Endpoint;
use pathwarden::error::{Error, ProbeError};
use pathwarden::multipath::PeerPaths;
use pathwarden::path::{Path, PathFingerprint};
use pathwarden::probe::{PathStatus, ProbeConfig};
use pathwarden::transport::sim::{SimHost, SimNetwork};
use pathwarden::transport::{Binding, BindingConfig};
use pathwarden::types::IsdAsn;

// ============================================================================
// Test Infrastructure
// ============================================================================

const QUIET: Duration = Duration::from_millis(100);

fn ia(s: &str) -> IsdAsn {
    s.parse().unwrap()
}

struct Harness {
    net: SimNetwork,
    paths: Vec<Path>,
    local: SimHost,
    initiator: Binding,
    responder: Binding,
    peer: PeerPaths,
}

impl Harness {
    async fn new(path_count: usize) -> Self {
        let (ia_local, ia_remote) = (ia("1-ff00:0:110"), ia("1-ff00:0:111"));
        let net = SimNetwork::new();
        let paths = net.connect(ia_local, ia_remote, path_count);

        let local = net.host(ia_local, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        let remote = net.host(ia_remote, IpAddr::V4(Ipv4Addr::new(10, 0, 1, 1)));
        let (initiator, _) = Binding::bind(Arc::new(local.clone()), &BindingConfig::default())
            .await
            .unwrap();
        let (responder, _) = Binding::bind(Arc::new(remote), &BindingConfig::default())
            .await
            .unwrap();
        let peer = PeerPaths::new(Arc::new(Endpoint::new(responder.local_addr())));

        Self {
            net,
            paths,
            local,
            initiator,
            responder,
            peer,
        }
    }

    fn kill(&self, index: usize) {
        self.net.set_status(&self.paths[index], PathStatus::Unreachable);
        self.net.set_link_down(&self.paths[index], true);
    }

    fn adversary(&self, kind: AdversaryKind) -> Arc<dyn Adversary> {
        self.adversary_with(
            AdversaryConfig {
                kind,
                ..Default::default()
            },
            ProbeConfig::default(),
        )
    }

    fn adversary_with(&self, config: AdversaryConfig, probe: ProbeConfig) -> Arc<dyn Adversary> {
        build_adversary(&config, &probe, Arc::new(self.local.clone()))
    }

    async fn fan_out(&self, adversary: &dyn Adversary, rounds: usize, size: usize) {
        let datagram = vec![0u8; size];
        for _ in 0..rounds {
            let used = self
                .peer
                .send_all(&self.initiator, adversary, &datagram)
                .await
                .unwrap();
            assert_eq!(used, self.peer.known_paths().len());
        }
    }

    /// Datagrams received per forward path until the network goes quiet.
    async fn received(&self) -> HashMap<PathFingerprint, usize> {
        let mut counts = HashMap::new();
        let mut buf = [0u8; 2048];
        while let Ok(result) = tokio::time::timeout(QUIET, self.responder.receive(&mut buf)).await {
            let (_, from) = result.unwrap();
            let reply = from.current_path().expect("inter-AS datagram carries a reply path");
            *counts.entry(reply.reversed().fingerprint()).or_insert(0) += 1;
        }
        counts
    }

    fn count(&self, counts: &HashMap<PathFingerprint, usize>, index: usize) -> usize {
        counts.get(&self.paths[index].fingerprint()).copied().unwrap_or(0)
    }
}

// ============================================================================
// Policies
// ============================================================================

#[tokio::test]
async fn test_pass_through_delivers_everywhere() {
    let h = Harness::new(3).await;
    let adversary = h.adversary(AdversaryKind::PassThrough);

    h.peer.refresh(&h.initiator, adversary.as_ref()).await.unwrap();
    h.fan_out(adversary.as_ref(), 2, 32).await;

    let counts = h.received().await;
    for i in 0..3 {
        assert_eq!(h.count(&counts, i), 2);
    }
    assert_eq!(h.initiator.stats().datagrams_dropped, 0);
}

#[tokio::test]
async fn test_single_destination_blocks_first_path_forever() {
    let h = Harness::new(3).await;
    let adversary = h.adversary(AdversaryKind::SingleDestination);

    h.peer.refresh(&h.initiator, adversary.as_ref()).await.unwrap();
    h.fan_out(adversary.as_ref(), 3, 32).await;

    let counts = h.received().await;
    assert_eq!(h.count(&counts, 0), 0);
    assert_eq!(h.count(&counts, 1), 3);
    assert_eq!(h.count(&counts, 2), 3);
    assert_eq!(h.initiator.stats().datagrams_dropped, 3);
}

#[tokio::test]
async fn test_all_but_one_leaves_single_live_path() {
    let h = Harness::new(4).await;
    h.kill(0);
    let adversary = h.adversary(AdversaryKind::AllButOne);

    h.peer.refresh(&h.initiator, adversary.as_ref()).await.unwrap();
    h.fan_out(adversary.as_ref(), 2, 32).await;

    let counts = h.received().await;
    // Ties between alive paths go to the earliest one.
    assert_eq!(h.count(&counts, 1), 2);
    assert_eq!(counts.len(), 1);
    assert_eq!(h.initiator.stats().datagrams_dropped, 6);
    assert_eq!(h.net.lost(), 0);
}

#[tokio::test]
async fn test_all_but_one_prefers_alive_over_timeout() {
    let h = Harness::new(3).await;
    h.net.set_status(&h.paths[0], PathStatus::Timeout);
    h.net.set_status(&h.paths[1], PathStatus::Timeout);
    let adversary = h.adversary(AdversaryKind::AllButOne);

    h.peer.refresh(&h.initiator, adversary.as_ref()).await.unwrap();
    h.fan_out(adversary.as_ref(), 1, 32).await;

    let counts = h.received().await;
    assert_eq!(h.count(&counts, 2), 1);
    assert_eq!(counts.len(), 1);
}

#[tokio::test]
async fn test_all_but_one_drops_before_first_update() {
    let h = Harness::new(2).await;
    let adversary = h.adversary(AdversaryKind::AllButOne);

    // Nothing is tracked for the peer yet, so every send is dropped.
    let endpoint = h.peer.endpoint().over(h.paths[0].clone());
    h.initiator.send(b"early", &endpoint, adversary.as_ref()).await.unwrap();

    assert!(h.received().await.is_empty());
    assert_eq!(h.initiator.stats().datagrams_dropped, 1);
    assert_eq!(h.initiator.stats().datagrams_sent, 0);
}

#[tokio::test]
async fn test_all_but_one_follows_path_set_change() {
    let h = Harness::new(3).await;
    let adversary = h.adversary(AdversaryKind::AllButOne);
    h.peer.refresh(&h.initiator, adversary.as_ref()).await.unwrap();

    // The safe path (the first) disappears; two new paths show up.
    let (ia_local, ia_remote) = (ia("1-ff00:0:110"), ia("1-ff00:0:111"));
    let replacement = vec![
        h.paths[1].clone(),
        h.paths[2].clone(),
        Path::from_raw(vec![0x51, 0x01]),
        Path::from_raw(vec![0x51, 0x02]),
    ];
    h.net.set_status(&replacement[0], PathStatus::Timeout);
    h.net.set_status(&replacement[1], PathStatus::Unreachable);
    h.net.set_paths(ia_local, ia_remote, replacement.clone());

    h.peer.refresh(&h.initiator, adversary.as_ref()).await.unwrap();
    h.fan_out(adversary.as_ref(), 1, 32).await;

    let counts = h.received().await;
    assert_eq!(counts.len(), 1);
    assert_eq!(counts.get(&replacement[2].fingerprint()), Some(&1));

    // The old safe path is blocked should it be used again.
    let old = h.peer.endpoint().over(h.paths[0].clone());
    h.initiator.send(b"stale", &old, adversary.as_ref()).await.unwrap();
    assert!(h.received().await.is_empty());
}

#[tokio::test]
async fn test_all_but_one_lossy_loses_first_datagram_only() {
    let h = Harness::new(3).await;
    let adversary = h.adversary(AdversaryKind::AllButOneLossy);

    h.peer.refresh(&h.initiator, adversary.as_ref()).await.unwrap();
    h.fan_out(adversary.as_ref(), 3, 32).await;

    let counts = h.received().await;
    assert_eq!(h.count(&counts, 0), 2);
    assert_eq!(counts.len(), 1);
}

#[tokio::test]
async fn test_lazy_lets_first_datagrams_through() {
    let h = Harness::new(3).await;
    let adversary = h.adversary_with(
        AdversaryConfig {
            kind: AdversaryKind::Lazy,
            lazy_wake_up: 2,
            ..Default::default()
        },
        ProbeConfig::default(),
    );

    h.peer.refresh(&h.initiator, adversary.as_ref()).await.unwrap();
    h.fan_out(adversary.as_ref(), 2, 32).await;

    // Round one: paths 0 and 1 pass while asleep, path 2 is the first path
    // seen awake and gets blocked for good.
    let counts = h.received().await;
    assert_eq!(h.count(&counts, 0), 2);
    assert_eq!(h.count(&counts, 1), 2);
    assert_eq!(h.count(&counts, 2), 0);
}

#[tokio::test]
async fn test_handshake_aware_spares_handshakes() {
    let h = Harness::new(3).await;
    let adversary = h.adversary(AdversaryKind::AllButOneHandshakeAware);

    h.peer.refresh(&h.initiator, adversary.as_ref()).await.unwrap();
    h.fan_out(adversary.as_ref(), 1, MESSAGE_INITIATION_SIZE).await;
    let counts = h.received().await;
    assert_eq!(counts.len(), 3);

    h.fan_out(adversary.as_ref(), 1, 200).await;
    let counts = h.received().await;
    assert_eq!(h.count(&counts, 0), 1);
    assert_eq!(counts.len(), 1);
}

// ============================================================================
// Probing failures
// ============================================================================

#[tokio::test]
async fn test_probe_failure_fails_closed_then_recovers() {
    let h = Harness::new(3).await;
    let adversary = h.adversary(AdversaryKind::AllButOne);

    h.net.set_probe_failure(Some(ProbeError::Failed("daemon unreachable".into())));
    let err = h.peer.refresh(&h.initiator, adversary.as_ref()).await.unwrap_err();
    assert!(err.is_probe_failure());
    // The path set is still known so the caller can keep sending.
    assert_eq!(h.peer.known_paths().len(), 3);

    h.fan_out(adversary.as_ref(), 1, 32).await;
    assert!(h.received().await.is_empty());

    h.net.set_probe_failure(None);
    h.peer.refresh(&h.initiator, adversary.as_ref()).await.unwrap();
    h.fan_out(adversary.as_ref(), 1, 32).await;
    assert_eq!(h.received().await.len(), 1);
}

#[tokio::test]
async fn test_probe_deadline_exceeded() {
    let h = Harness::new(2).await;
    h.net.set_probe_latency(Duration::from_secs(5));
    let adversary = h.adversary_with(
        AdversaryConfig {
            kind: AdversaryKind::AllButOne,
            ..Default::default()
        },
        ProbeConfig {
            deadline: Duration::from_millis(50),
        },
    );

    let err = h.peer.refresh(&h.initiator, adversary.as_ref()).await.unwrap_err();
    assert!(matches!(err, Error::Probe(ProbeError::Timeout(_))));

    h.fan_out(adversary.as_ref(), 1, 32).await;
    assert!(h.received().await.is_empty());
}

#[tokio::test]
async fn test_all_paths_unreachable_is_no_usable_path() {
    let h = Harness::new(2).await;
    h.kill(0);
    h.kill(1);
    let adversary = h.adversary(AdversaryKind::AllButOne);

    let err = h.peer.refresh(&h.initiator, adversary.as_ref()).await.unwrap_err();
    assert!(matches!(err, Error::NoUsablePath { .. }));
}

#[tokio::test]
async fn test_destinations_are_tracked_independently() {
    let h = Harness::new(2).await;

    // A second peer in another AS whose paths are all unreachable.
    let ia_other = ia("1-ff00:0:112");
    let other_paths = h.net.connect(ia("1-ff00:0:110"), ia_other, 2);
    for path in &other_paths {
        h.net.set_status(path, PathStatus::Unreachable);
    }
    let other_host = h.net.host(ia_other, IpAddr::V4(Ipv4Addr::new(10, 0, 2, 1)));
    let (other, _) = Binding::bind(Arc::new(other_host), &BindingConfig::default())
        .await
        .unwrap();
    let other_peer = PeerPaths::new(Arc::new(Endpoint::new(other.local_addr())));

    let adversary = h.adversary(AdversaryKind::AllButOne);
    h.peer.refresh(&h.initiator, adversary.as_ref()).await.unwrap();
    assert!(other_peer.refresh(&h.initiator, adversary.as_ref()).await.is_err());

    h.fan_out(adversary.as_ref(), 1, 32).await;
    assert_eq!(h.received().await.len(), 1);

    other_peer
        .send_all(&h.initiator, adversary.as_ref(), b"blocked")
        .await
        .unwrap();
    let mut buf = [0u8; 64];
    assert!(tokio::time::timeout(QUIET, other.receive(&mut buf)).await.is_err());
}
