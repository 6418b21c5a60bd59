//! # Pathwarden
//!
//! Path-aware datagram transport with simulated on-path adversaries.
//!
//! Pathwarden lets a tunnel send datagrams over explicitly chosen network
//! paths and puts a configurable adversary in front of every send. The
//! adversaries block paths per destination so that multipath handshake
//! logic can be tested against a network that only leaves one path open.
//!
//! ## Architecture
//!
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Tunnel / PeerPaths (multipath fan-out)          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                 Binding (send, send_over, receive)              │
//! │          ┌──────────────┐          ┌────────────────┐           │
//! │          │   Endpoint   │─────────▶│   Adversary    │           │
//! │          │ dst/src/path │  decide  │ per-destination│           │
//! │          └──────────────┘          └───────┬────────┘           │
//! │                                            │ probe              │
//! ├────────────────────────────────────────────┼────────────────────┤
//! │        PathNetwork / PathConn              │  PathProber        │
//! │        (path-aware sockets, discovery)     │  (liveness)        │
//! └─────────────────────────────────────────────────────────────────┘

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]              // ASCII diagrams in docs
#![allow(clippy::unreadable_literal)]
#![allow(clippy::cast_possible_truncation)]  // ISD/ASN packing
#![allow(clippy::significant_drop_tightening)] // Lock ordering is intentional
#![allow(clippy::option_if_let_else)]
#![allow(clippy::use_self)]
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::future_not_send)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::return_self_not_must_use)]

pub mod adversary;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod multipath;
pub mod path;
pub mod probe;
pub mod transport;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adversary::{build_adversary, Adversary, AdversaryConfig, AdversaryKind};
    pub use crate::config::Config;
    pub use crate::endpoint::Endpoint;
    pub use crate::error::{Error, Result};
    pub use crate::multipath::PeerPaths;
    pub use crate::path::{Path, PathFingerprint};
    pub use crate::probe::{PathProber, PathStatus, ProberFactory};
    pub use crate::transport::{Binding, BindingConfig, PathConn, PathNetwork};
    pub use crate::types::*;
}
