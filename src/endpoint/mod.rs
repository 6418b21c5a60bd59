//! Peer endpoints with an explicitly selected path.
//!
//! An [`Endpoint`] is one peer's network identity as seen from this process:
//! destination and source address plus the path currently used to reach the
//! destination. All accessors take the endpoint's own lock for the duration
//! of the read or write only; it is never held across an await point.

use std::fmt;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Error, Result};
use crate::path::{Path, PathFingerprint};
use crate::transport::PathNetwork;
use crate::types::{DestinationKey, ScionAddr};

#[derive(Debug, Default)]
struct EndpointState {
    dst: ScionAddr,
    src: ScionAddr,
    /// `None` means "resolve the default path on next send".
    path: Option<Path>,
}

/// Immutable view of an endpoint handed to adversaries while the endpoint
/// lock is held by the sender.
///
/// It borrows from the locked state, so it cannot outlive the send decision
/// and gives no way back to the endpoint's lock.
#[derive(Debug, Clone, Copy)]
pub struct SendTarget<'a> {
    pub destination: &'a ScionAddr,
    pub path: &'a Path,
}

impl SendTarget<'_> {
    pub fn key(&self) -> DestinationKey {
        DestinationKey::from(self.destination)
    }

    pub fn fingerprint(&self) -> PathFingerprint {
        self.path.fingerprint()
    }
}

/// Thread-safe handle for one peer.
#[derive(Default)]
pub struct Endpoint {
    state: Mutex<EndpointState>,
}

impl Endpoint {
    /// Create an endpoint for `dst` with no path selected.
    pub fn new(dst: ScionAddr) -> Self {
        Self {
            state: Mutex::new(EndpointState {
                dst,
                ..Default::default()
            }),
        }
    }

    /// Parse `1-ff00:0:110,[10.0.0.1]:4500` into an endpoint.
    pub fn parse(s: &str) -> Result<Self> {
        Ok(Self::new(s.parse()?))
    }

    /// Endpoint created for a datagram received from `sender`.
    ///
    /// The datagram's sender becomes our destination; the path it arrived on
    /// (already reversed) becomes the reply path.
    pub fn from_received(sender: ScionAddr, local: ScionAddr, reply_path: Option<Path>) -> Self {
        Self {
            state: Mutex::new(EndpointState {
                dst: sender,
                src: local,
                path: reply_path,
            }),
        }
    }

    /// A fresh endpoint to the same destination pinned to `path`.
    ///
    /// The current endpoint's stored path is left untouched.
    pub fn over(&self, path: Path) -> Self {
        let state = self.state.lock();
        Self {
            state: Mutex::new(EndpointState {
                dst: state.dst,
                src: state.src,
                path: Some(path),
            }),
        }
    }

    pub fn destination(&self) -> ScionAddr {
        self.state.lock().dst
    }

    pub fn source(&self) -> ScionAddr {
        self.state.lock().src
    }

    pub fn destination_key(&self) -> DestinationKey {
        DestinationKey::from(self.state.lock().dst)
    }

    /// Replace the destination, e.g. when a peer roams. The path is reset
    /// since it belonged to the old destination.
    pub fn set_destination(&self, dst: ScionAddr) {
        let mut state = self.state.lock();
        if state.dst != dst {
            state.dst = dst;
            state.path = None;
        }
    }

    pub fn set_source(&self, src: ScionAddr) {
        self.state.lock().src = src;
    }

    pub fn current_path(&self) -> Option<Path> {
        self.state.lock().path.clone()
    }

    pub fn set_current_path(&self, path: Path) {
        let mut state = self.state.lock();
        trace!(destination = %state.dst, path = %path, "pinning endpoint path");
        state.path = Some(path);
    }

    /// Set `path` unless a path was selected concurrently. Returns whether
    /// `path` was installed.
    pub(crate) fn set_path_if_unset(&self, path: Path) -> bool {
        let mut state = self.state.lock();
        if state.path.is_some() {
            return false;
        }
        state.path = Some(path);
        true
    }

    pub fn has_path(&self) -> bool {
        self.state.lock().path.is_some()
    }

    /// All paths currently known to the destination's network.
    ///
    /// Only the destination identity is read under the lock; discovery runs
    /// without it.
    pub async fn query_available_paths(&self, network: &dyn PathNetwork) -> Result<Vec<Path>> {
        let ia = self.state.lock().dst.ia;
        network.query_paths(ia).await
    }

    /// Stable encoding of the destination identity; excludes the path.
    pub fn serialize_destination(&self) -> Vec<u8> {
        self.state.lock().dst.to_bytes()
    }

    pub fn clear_destination(&self) {
        let mut state = self.state.lock();
        state.dst = ScionAddr::default();
        state.path = None;
    }

    pub fn clear_source(&self) {
        self.state.lock().src = ScionAddr::default();
    }

    /// Run `f` with the endpoint locked and a path selected.
    ///
    /// `f` must not touch this endpoint; the lock is not reentrant.
    pub(crate) fn with_target<R>(&self, f: impl FnOnce(SendTarget<'_>) -> R) -> Result<R> {
        let state = self.state.lock();
        let path = state.path.as_ref().ok_or(Error::PathUnset)?;
        Ok(f(SendTarget {
            destination: &state.dst,
            path,
        }))
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Endpoint")
            .field("dst", &state.dst.to_string())
            .field("src", &state.src.to_string())
            .field("path", &state.path)
            .finish()
    }
}
