//! Network-related modules: wire-format codec, reply construction, and
//! the virtual-interface seam.

pub mod codec;
pub mod response;
pub mod tun;

pub use codec::DnsQuery;
pub use tun::{FdTun, FdTunProvider, TunConfig, TunInterface, TunProvider};
