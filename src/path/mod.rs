//! Opaque forwarding paths and their fingerprints.
//!
//! A [`Path`] is handed to us by the path-discovery layer and never
//! interpreted. Two path values describe the same route exactly when their
//! [`PathFingerprint`]s are equal; `Path` deliberately has no `PartialEq`.

use std::fmt;

use bytes::Bytes;
use sha2::{Digest, Sha256};

/// Size of a path fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 32;

/// Content identity of a path: SHA-256 over its raw encoding.
///
/// Used as a map key only; no security property is expected from it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathFingerprint([u8; FINGERPRINT_LEN]);

impl PathFingerprint {
    pub fn of(raw: &[u8]) -> Self {
        Self(Sha256::digest(raw).into())
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// First 8 hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for PathFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PathFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathFingerprint({})", self.short())
    }
}

/// Opaque route descriptor between two hosts.
#[derive(Clone, Default)]
pub struct Path {
    raw: Bytes,
}

impl Path {
    pub fn from_raw(raw: impl Into<Bytes>) -> Self {
        Self { raw: raw.into() }
    }

    /// Raw encoding as produced by the path layer.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Empty paths are used for intra-AS traffic.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn fingerprint(&self) -> PathFingerprint {
        PathFingerprint::of(&self.raw)
    }

    /// Reply path for a datagram that arrived over `self`.
    ///
    /// The raw encoding of the reverse route is the forward encoding with its
    /// segments in reverse order; with opaque paths we model that by
    /// reversing the byte sequence.
    pub fn reversed(&self) -> Self {
        let mut raw = self.raw.to_vec();
        raw.reverse();
        Self { raw: raw.into() }
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Path")
            .field("fingerprint", &self.fingerprint())
            .field("len", &self.raw.len())
            .finish()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path[{}]", self.fingerprint().short())
    }
}

/// True if `paths` contains a path with fingerprint `fp`.
pub fn contains(paths: &[Path], fp: &PathFingerprint) -> bool {
    paths.iter().any(|p| p.fingerprint() == *fp)
}
