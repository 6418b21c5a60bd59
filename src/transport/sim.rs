//! In-process path-aware network.
//!
//! Hosts live in ASes connected by an explicit list of paths per AS pair.
//! Individual paths can be taken down (datagrams silently lost) and given a
//! liveness classification that the simulated prober reports. Used by the
//! integration tests and by `pathwarden simulate`.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::trace;

use super::{PathConn, PathNetwork};
use crate::error::{Error, ProbeError, Result, TransportError};
use crate::path::{Path, PathFingerprint};
use crate::probe::{PathProber, PathStatus, ProberFactory};
use crate::types::{IsdAsn, ScionAddr};

/// Range used for ephemeral ports.
const EPHEMERAL_PORTS: std::ops::Range<u16> = 32768..61000;

enum Delivery {
    Datagram {
        data: Bytes,
        from: ScionAddr,
        reply_path: Option<Path>,
    },
    Error(TransportError),
}

#[derive(Default)]
struct SimInner {
    mailboxes: DashMap<ScionAddr, mpsc::UnboundedSender<Delivery>>,
    paths: RwLock<HashMap<(IsdAsn, IsdAsn), Vec<Path>>>,
    liveness: RwLock<HashMap<PathFingerprint, PathStatus>>,
    down: RwLock<HashSet<PathFingerprint>>,
    probe_latency: RwLock<Duration>,
    probe_failure: RwLock<Option<ProbeError>>,
    delivered: AtomicU64,
    lost: AtomicU64,
}

/// Shared simulated network. Cheap to clone.
#[derive(Clone, Default)]
pub struct SimNetwork {
    inner: Arc<SimInner>,
}

impl SimNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `paths` from `src` to `dst`; the reverse direction gets the
    /// reversed paths.
    pub fn set_paths(&self, src: IsdAsn, dst: IsdAsn, paths: Vec<Path>) {
        let reverse = paths.iter().map(Path::reversed).collect();
        let mut table = self.inner.paths.write();
        table.insert((src, dst), paths);
        table.insert((dst, src), reverse);
    }

    /// Create `count` distinct paths between two ASes and register them.
    pub fn connect(&self, src: IsdAsn, dst: IsdAsn, count: usize) -> Vec<Path> {
        let paths: Vec<Path> = (0..count)
            .map(|i| {
                let mut raw = Vec::with_capacity(8 + 4 + 8);
                raw.extend_from_slice(&src.to_be_bytes());
                raw.extend_from_slice(&(i as u32).to_be_bytes());
                raw.extend_from_slice(&dst.to_be_bytes());
                Path::from_raw(raw)
            })
            .collect();
        self.set_paths(src, dst, paths.clone());
        paths
    }

    /// Liveness reported by the simulated prober (default: alive).
    pub fn set_status(&self, path: &Path, status: PathStatus) {
        self.inner.liveness.write().insert(path.fingerprint(), status);
    }

    /// Take a path down or bring it back up. Datagrams over a down path
    /// are silently lost.
    pub fn set_link_down(&self, path: &Path, down: bool) {
        let mut set = self.inner.down.write();
        if down {
            set.insert(path.fingerprint());
        } else {
            set.remove(&path.fingerprint());
        }
    }

    /// Time the simulated prober spends before answering.
    pub fn set_probe_latency(&self, latency: Duration) {
        *self.inner.probe_latency.write() = latency;
    }

    /// Make every subsequent probe fail (or succeed again with `None`).
    pub fn set_probe_failure(&self, failure: Option<ProbeError>) {
        *self.inner.probe_failure.write() = failure;
    }

    /// Queue a transport error for the socket bound at `addr`.
    pub fn inject_receive_error(&self, addr: &ScionAddr, error: TransportError) -> bool {
        self.inner
            .mailboxes
            .get(addr)
            .map_or(false, |tx| tx.send(Delivery::Error(error)).is_ok())
    }

    pub fn host(&self, ia: IsdAsn, ip: IpAddr) -> SimHost {
        SimHost {
            net: self.clone(),
            ia,
            ip,
        }
    }

    pub fn delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    pub fn lost(&self) -> u64 {
        self.inner.lost.load(Ordering::Relaxed)
    }

    fn known_path(&self, src: IsdAsn, dst: IsdAsn, path: &Path) -> bool {
        if src == dst {
            return path.is_empty();
        }
        let fp = path.fingerprint();
        self.inner
            .paths
            .read()
            .get(&(src, dst))
            .map_or(false, |paths| paths.iter().any(|p| p.fingerprint() == fp))
    }

    fn deliver(&self, from: ScionAddr, dst: &ScionAddr, path: &Path, data: &[u8]) -> Result<usize> {
        if !self.known_path(from.ia, dst.ia, path) {
            return Err(TransportError::SendFailed {
                addr: *dst,
                reason: format!("no route over {path}"),
            }
            .into());
        }

        if self.inner.down.read().contains(&path.fingerprint()) {
            trace!(%dst, %path, "link down, datagram lost");
            self.inner.lost.fetch_add(1, Ordering::Relaxed);
            return Ok(data.len());
        }

        let reply_path = (from.ia != dst.ia).then(|| path.reversed());
        let delivered = self.inner.mailboxes.get(dst).map_or(false, |tx| {
            tx.send(Delivery::Datagram {
                data: Bytes::copy_from_slice(data),
                from,
                reply_path,
            })
            .is_ok()
        });

        if delivered {
            self.inner.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            trace!(%dst, "no listener, datagram lost");
            self.inner.lost.fetch_add(1, Ordering::Relaxed);
        }
        Ok(data.len())
    }
}

/// One host's view of a [`SimNetwork`].
#[derive(Clone)]
pub struct SimHost {
    net: SimNetwork,
    ia: IsdAsn,
    ip: IpAddr,
}

impl SimHost {
    pub fn ia(&self) -> IsdAsn {
        self.ia
    }

    fn addr(&self, port: u16) -> ScionAddr {
        ScionAddr::new(self.ia, (self.ip, port).into())
    }
}

#[async_trait]
impl PathNetwork for SimHost {
    async fn listen(&self, port: u16) -> Result<Box<dyn PathConn>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mailboxes = &self.net.inner.mailboxes;

        let local = if port == 0 {
            let mut rng = rand::thread_rng();
            loop {
                let addr = self.addr(rng.gen_range(EPHEMERAL_PORTS));
                if let dashmap::mapref::entry::Entry::Vacant(slot) = mailboxes.entry(addr) {
                    slot.insert(tx);
                    break addr;
                }
            }
        } else {
            let addr = self.addr(port);
            match mailboxes.entry(addr) {
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(tx);
                }
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    return Err(Error::Bind {
                        port,
                        reason: "address in use".into(),
                    });
                }
            }
            addr
        };

        Ok(Box::new(SimConn {
            net: self.net.clone(),
            local,
            rx: AsyncMutex::new(rx),
            closed: AtomicBool::new(false),
        }))
    }

    async fn query_paths(&self, dst: IsdAsn) -> Result<Vec<Path>> {
        if dst == self.ia {
            return Ok(vec![Path::default()]);
        }
        match self.net.inner.paths.read().get(&(self.ia, dst)) {
            Some(paths) if !paths.is_empty() => Ok(paths.clone()),
            _ => Err(Error::Discovery(format!("no paths from {} to {dst}", self.ia))),
        }
    }
}

#[async_trait]
impl ProberFactory for SimHost {
    async fn new_prober(&self, _dst: IsdAsn) -> Result<Box<dyn PathProber>> {
        Ok(Box::new(SimProber {
            net: self.net.clone(),
        }))
    }
}

struct SimProber {
    net: SimNetwork,
}

#[async_trait]
impl PathProber for SimProber {
    async fn classify(
        &self,
        paths: &[Path],
        _deadline: Duration,
    ) -> Result<HashMap<PathFingerprint, PathStatus>> {
        let latency = *self.net.inner.probe_latency.read();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(failure) = self.net.inner.probe_failure.read().clone() {
            return Err(failure.into());
        }

        let liveness = self.net.inner.liveness.read();
        Ok(paths
            .iter()
            .map(|p| {
                let fp = p.fingerprint();
                (fp, liveness.get(&fp).copied().unwrap_or(PathStatus::Alive))
            })
            .collect())
    }
}

struct SimConn {
    net: SimNetwork,
    local: ScionAddr,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Delivery>>,
    closed: AtomicBool,
}

#[async_trait]
impl PathConn for SimConn {
    fn local_addr(&self) -> ScionAddr {
        self.local
    }

    async fn send_to(&self, data: &[u8], dst: &ScionAddr, path: &Path) -> Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed.into());
        }
        self.net.deliver(self.local, dst, path, data)
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, ScionAddr, Option<Path>)> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(Delivery::Datagram {
                data,
                from,
                reply_path,
            }) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok((len, from, reply_path))
            }
            Some(Delivery::Error(e)) => Err(e.into()),
            None => Err(TransportError::Closed.into()),
        }
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.net.inner.mailboxes.remove(&self.local);
        }
        Ok(())
    }
}

impl Drop for SimConn {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.net.inner.mailboxes.remove(&self.local);
        }
    }
}
