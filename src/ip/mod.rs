//! Address and port resource pools.
//!
//! This module holds the pure arithmetic behind conflict checking: CIDR
//! overlap, `/24` host pools, and the host port footprint of a network.

pub mod subnet;
pub mod pool;
pub mod ports;

// Re-export commonly used types
pub use subnet::{subnets_overlap, Subnet};
pub use pool::{allocate_ip, free_ip, generate_ip_pool, IpPool};
pub use ports::{network_port_ranges, next_free_port, occupied_ports, port_ranges_overlap, PortRange};
