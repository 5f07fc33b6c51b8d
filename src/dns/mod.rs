//! DNS-related modules.

pub mod matcher;
pub mod relay;

pub use matcher::{BlockRule, RuleSet};
pub use relay::{DnsRelay, UpstreamRelay};
