//! Core types used throughout Pathwarden.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// Bits of an [`IsdAsn`] used by the AS number.
const ASN_BITS: u32 = 48;
const ASN_MASK: u64 = (1 << ASN_BITS) - 1;

/// Largest AS number rendered in decimal (BGP compatible range).
const MAX_BGP_ASN: u64 = u32::MAX as u64;

/// Network identity of a path-aware network: isolation domain plus AS number.
///
/// Rendered as `1-ff00:0:110` (hex groups) or `1-64512` (BGP range).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IsdAsn(pub u64);

impl IsdAsn {
    /// Wildcard identity.
    pub const WILDCARD: Self = Self(0);

    pub fn new(isd: u16, asn: u64) -> Self {
        Self((u64::from(isd) << ASN_BITS) | (asn & ASN_MASK))
    }

    pub fn isd(self) -> u16 {
        (self.0 >> ASN_BITS) as u16
    }

    pub fn asn(self) -> u64 {
        self.0 & ASN_MASK
    }

    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for IsdAsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let asn = self.asn();
        if asn <= MAX_BGP_ASN {
            return write!(f, "{}-{}", self.isd(), asn);
        }
        write!(
            f,
            "{}-{:x}:{:x}:{:x}",
            self.isd(),
            (asn >> 32) & 0xffff,
            (asn >> 16) & 0xffff,
            asn & 0xffff
        )
    }
}

impl FromStr for IsdAsn {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressError::InvalidIsdAsn(s.to_string());

        let (isd, asn) = s.split_once('-').ok_or_else(invalid)?;
        let isd: u16 = isd.parse().map_err(|_| invalid())?;

        let asn = if asn.contains(':') {
            let groups: Vec<&str> = asn.split(':').collect();
            if groups.len() != 3 {
                return Err(invalid());
            }
            groups.iter().try_fold(0u64, |acc, group| {
                u16::from_str_radix(group, 16)
                    .map(|g| (acc << 16) | u64::from(g))
                    .map_err(|_| invalid())
            })?
        } else {
            let asn: u64 = asn.parse().map_err(|_| invalid())?;
            if asn > MAX_BGP_ASN {
                return Err(invalid());
            }
            asn
        };

        Ok(Self::new(isd, asn))
    }
}

impl TryFrom<String> for IsdAsn {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IsdAsn> for String {
    fn from(ia: IsdAsn) -> Self {
        ia.to_string()
    }
}

/// Host address inside a path-aware network: network identity, IP and port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScionAddr {
    pub ia: IsdAsn,
    pub host: SocketAddr,
}

impl ScionAddr {
    pub fn new(ia: IsdAsn, host: SocketAddr) -> Self {
        Self { ia, host }
    }

    pub fn ip(&self) -> IpAddr {
        self.host.ip()
    }

    pub fn port(&self) -> u16 {
        self.host.port()
    }

    /// Stable byte encoding: ISD-AS (8 bytes BE), IP octets (4 or 16), port (2 bytes BE).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 16 + 2);
        out.extend_from_slice(&self.ia.to_be_bytes());
        match self.host.ip() {
            IpAddr::V4(ip) => out.extend_from_slice(&ip.octets()),
            IpAddr::V6(ip) => out.extend_from_slice(&ip.octets()),
        }
        out.extend_from_slice(&self.host.port().to_be_bytes());
        out
    }
}

impl Default for ScionAddr {
    fn default() -> Self {
        Self {
            ia: IsdAsn::WILDCARD,
            host: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        }
    }
}

impl fmt::Display for ScionAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},[{}]:{}", self.ia, self.host.ip(), self.host.port())
    }
}

impl FromStr for ScionAddr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ia, host) = s
            .split_once(',')
            .ok_or_else(|| AddressError::MissingSeparator(s.to_string()))?;
        let ia: IsdAsn = ia.parse()?;
        Ok(Self::new(ia, parse_host(host)?))
    }
}

/// Accepts `10.0.0.1:4500`, `[10.0.0.1]:4500` and `[::1]:4500`.
fn parse_host(host: &str) -> Result<SocketAddr, AddressError> {
    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let invalid = || AddressError::InvalidHost(host.to_string());
    let rest = host.strip_prefix('[').ok_or_else(invalid)?;
    let (ip, port) = rest.split_once("]:").ok_or_else(invalid)?;
    let ip: IpAddr = ip.parse().map_err(|_| invalid())?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    Ok(SocketAddr::new(ip, port))
}

impl TryFrom<String> for ScionAddr {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ScionAddr> for String {
    fn from(addr: ScionAddr) -> Self {
        addr.to_string()
    }
}

/// Identity of a remote peer, independent of the path used to reach it.
///
/// Adversaries partition their blocking state by this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestinationKey(ScionAddr);

impl DestinationKey {
    pub fn ia(&self) -> IsdAsn {
        self.0.ia
    }

    pub fn addr(&self) -> &ScionAddr {
        &self.0
    }
}

impl From<ScionAddr> for DestinationKey {
    fn from(addr: ScionAddr) -> Self {
        Self(addr)
    }
}

impl From<&ScionAddr> for DestinationKey {
    fn from(addr: &ScionAddr) -> Self {
        Self(*addr)
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
