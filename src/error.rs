//! Error types for Pathwarden.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::types::{DestinationKey, ScionAddr};

/// Result type alias for Pathwarden operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Pathwarden.
#[derive(Error, Debug)]
pub enum Error {
    // Transport errors
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("bind failed on port {port}: {reason}")]
    Bind { port: u16, reason: String },

    // Path errors
    #[error("path discovery failed: {0}")]
    Discovery(String),

    #[error("endpoint has no path selected")]
    PathUnset,

    #[error("no usable path to {destination}")]
    NoUsablePath { destination: DestinationKey },

    // Probing errors
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),

    // Address errors
    #[error("address error: {0}")]
    Address(#[from] AddressError),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Transport layer errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("send to {addr} failed: {reason}")]
    SendFailed { addr: ScionAddr, reason: String },

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("binding closed")]
    Closed,

    /// Control-message error reported by the path transport, e.g. an expired
    /// hop field. The datagram is lost but the socket is still usable.
    #[error("SCMP error {code}: {reason}")]
    Scmp { code: u8, reason: String },

    #[error("unknown destination: {0}")]
    UnknownDestination(ScionAddr),
}

/// Path liveness probing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("probing exceeded deadline of {0:?}")]
    Timeout(Duration),

    #[error("probing failed: {0}")]
    Failed(String),

    #[error("prober unavailable: {0}")]
    ProberUnavailable(String),
}

/// Address parsing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid ISD-AS {0:?}")]
    InvalidIsdAsn(String),

    #[error("invalid host address {0:?}")]
    InvalidHost(String),

    #[error("missing ',' between ISD-AS and host in {0:?}")]
    MissingSeparator(String),
}

impl Error {
    /// Transient errors are internal to the path transport and do not
    /// invalidate the socket.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Scmp { .. }))
    }

    /// Check if error came from the liveness prober.
    pub fn is_probe_failure(&self) -> bool {
        matches!(self, Error::Probe(_) | Error::NoUsablePath { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let scmp: Error = TransportError::Scmp {
            code: 1,
            reason: "hop expired".into(),
        }
        .into();
        assert!(scmp.is_transient());

        let closed: Error = TransportError::Closed.into();
        assert!(!closed.is_transient());
        assert!(!Error::PathUnset.is_transient());
    }

    #[test]
    fn test_probe_failure_classification() {
        let err: Error = ProbeError::Timeout(Duration::from_secs(1)).into();
        assert!(err.is_probe_failure());
        assert!(!Error::Discovery("no paths".into()).is_probe_failure());
    }
}
