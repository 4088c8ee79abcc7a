//! IPv4 CIDR arithmetic.
//!
//! Subnets are handled as `(network address, prefix length)` pairs of plain
//! integers so overlap checks stay cheap and total. Anything that fails to
//! parse is treated as conflicting with everything else.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// A parsed IPv4 CIDR block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    base: u32,
    prefix: u8,
}

impl Subnet {
    /// Build a subnet, masking host bits off the address
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Option<Self> {
        if prefix > 32 {
            return None;
        }
        Some(Subnet {
            base: u32::from(addr) & prefix_mask(prefix),
            prefix,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base)
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn mask(&self) -> u32 {
        prefix_mask(self.prefix)
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & self.mask() == self.base
    }

    /// Conventional gateway: first host of the block
    pub fn default_gateway(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base.wrapping_add(1))
    }

    /// Whether two blocks share at least one address
    pub fn overlaps(&self, other: &Subnet) -> bool {
        let coarser = prefix_mask(self.prefix.min(other.prefix));
        (self.base & coarser) == (other.base & coarser)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}

impl FromStr for Subnet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("'{}' is not in CIDR notation", s))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| format!("'{}' has an invalid IPv4 address", s))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| format!("'{}' has an invalid prefix length", s))?;
        Subnet::new(addr, prefix).ok_or_else(|| format!("'{}' has a prefix longer than 32", s))
    }
}

fn prefix_mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

/// Check whether two CIDR strings overlap.
///
/// Each side is masked with its own prefix and the resulting network addresses
/// are compared under the shorter of the two prefixes. Exact duplicates and
/// subset relationships both count as overlap. Unparsable input returns `true`.
///
/// # Examples
/// ```
/// use besunet::ip::subnets_overlap;
///
/// assert!(subnets_overlap("172.20.0.0/16", "172.20.5.0/24"));
/// assert!(!subnets_overlap("172.20.0.0/24", "172.21.0.0/24"));
/// assert!(subnets_overlap("not-a-subnet", "10.0.0.0/8"));
/// ```
pub fn subnets_overlap(a: &str, b: &str) -> bool {
    match (a.parse::<Subnet>(), b.parse::<Subnet>()) {
        (Ok(a), Ok(b)) => a.overlaps(&b),
        _ => {
            log::debug!("Treating unparsable subnet pair ({}, {}) as overlapping", a, b);
            true
        }
    }
}
