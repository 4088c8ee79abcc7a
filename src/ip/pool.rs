//! Host address pools for `/24` networks.
//!
//! A pool holds the usable host addresses `.10` through `.250` of a `/24`
//! subnet. Any other prefix length yields an empty pool.

use super::subnet::Subnet;
use crate::error::{OrchestratorError, Result};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// First host octet handed out from a pool
pub const POOL_FIRST_HOST: u8 = 10;
/// Last host octet handed out from a pool
pub const POOL_LAST_HOST: u8 = 250;

/// Set of free host addresses; allocation always hands out the lowest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpPool {
    free: BTreeSet<Ipv4Addr>,
}

impl IpPool {
    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.free.contains(&ip)
    }

    /// Remove an address that is already in use elsewhere
    pub fn reserve(&mut self, ip: Ipv4Addr) -> bool {
        self.free.remove(&ip)
    }
}

/// Build the pool of assignable hosts for a subnet.
///
/// # Examples
/// ```
/// use besunet::ip::generate_ip_pool;
///
/// assert_eq!(generate_ip_pool("172.20.0.0/24").len(), 241);
/// assert!(generate_ip_pool("172.20.0.0/16").is_empty());
/// ```
pub fn generate_ip_pool(subnet: &str) -> IpPool {
    let subnet: Subnet = match subnet.parse() {
        Ok(subnet) => subnet,
        Err(e) => {
            log::warn!("Cannot build IP pool: {}", e);
            return IpPool::default();
        }
    };
    if subnet.prefix() != 24 {
        log::debug!("IP pools are only generated for /24 subnets, got {}", subnet);
        return IpPool::default();
    }

    let [a, b, c, _] = subnet.network().octets();
    let free = (POOL_FIRST_HOST..=POOL_LAST_HOST)
        .map(|host| Ipv4Addr::new(a, b, c, host))
        .collect();
    IpPool { free }
}

/// Take the lowest free address out of the pool
pub fn allocate_ip(pool: &mut IpPool, network_id: &str) -> Result<Ipv4Addr> {
    let ip = pool.free.pop_first().ok_or_else(|| OrchestratorError::Exhaustion {
        network_id: network_id.to_string(),
        resource: "IP address".to_string(),
    })?;
    log::debug!("Allocated {} for network {}", ip, network_id);
    Ok(ip)
}

/// Return an address to the pool
pub fn free_ip(pool: &mut IpPool, ip: Ipv4Addr) {
    pool.free.insert(ip);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashSet;

    #[test]
    fn test_pool_bounds() {
        let pool = generate_ip_pool("172.20.0.0/24");
        assert_eq!(pool.len(), 241);
        assert!(pool.contains(Ipv4Addr::new(172, 20, 0, 10)));
        assert!(pool.contains(Ipv4Addr::new(172, 20, 0, 250)));
        assert!(!pool.contains(Ipv4Addr::new(172, 20, 0, 9)));
        assert!(!pool.contains(Ipv4Addr::new(172, 20, 0, 251)));
    }

    #[test]
    fn test_non_24_prefix_yields_empty_pool() {
        assert!(generate_ip_pool("172.20.0.0/16").is_empty());
        assert!(generate_ip_pool("172.20.0.0/25").is_empty());
        assert!(generate_ip_pool("nonsense").is_empty());
    }

    #[test]
    fn test_allocate_until_exhausted() {
        let mut pool = generate_ip_pool("10.1.2.0/24");
        let size = pool.len();
        let mut seen = HashSet::new();
        for _ in 0..size {
            let ip = allocate_ip(&mut pool, "net-a").unwrap();
            assert!(seen.insert(ip), "duplicate allocation {}", ip);
        }
        assert_eq!(seen.len(), size);

        let err = allocate_ip(&mut pool, "net-a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Exhaustion);
        assert!(err.to_string().contains("net-a"));
    }

    #[test]
    fn test_free_ip_makes_address_reusable() {
        let mut pool = generate_ip_pool("10.1.2.0/24");
        let first = allocate_ip(&mut pool, "net").unwrap();
        assert_eq!(first, Ipv4Addr::new(10, 1, 2, 10));
        assert!(!pool.contains(first));

        free_ip(&mut pool, first);
        assert!(pool.contains(first));
        assert_eq!(allocate_ip(&mut pool, "net").unwrap(), first);
    }

    #[test]
    fn test_reserve_removes_used_address() {
        let mut pool = generate_ip_pool("10.1.2.0/24");
        assert!(pool.reserve(Ipv4Addr::new(10, 1, 2, 10)));
        assert_eq!(allocate_ip(&mut pool, "net").unwrap(), Ipv4Addr::new(10, 1, 2, 11));
    }
}
