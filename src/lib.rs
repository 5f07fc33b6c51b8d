//! Focusdns - the DNS interception engine behind a focus session.
//!
//! Focusdns sits behind a platform-provided virtual network interface,
//! inspects every outgoing DNS query, and answers queries for blocked
//! domains with a locally fabricated sinkhole response. Everything else
//! is forwarded to a real resolver over a tunnel-exempted socket and the
//! reply is re-framed for the original sender, byte-for-byte compatible
//! with what a real DNS server would have returned.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: Configuration loading and validation
//! - [`dns`]: Blocking rules and the upstream relay
//! - [`network`]: Wire-format codec, reply construction, interface seam
//! - [`engine`]: The per-packet interception loop
//! - [`session`]: Session lifecycle, expiry, and teardown
//! - [`error`]: Error types
//!
//! # Testing
//!
//! The interface and the upstream relay sit behind traits so the whole
//! pipeline runs against in-memory fakes:
//!
//! ```rust
//! use focusdns::dns::{BlockRule, RuleSet};
//!
//! let rules = RuleSet::new([
//!     BlockRule::parse("instagram.com").unwrap(),
//!     BlockRule::parse("*.youtube.com").unwrap(),
//! ]);
//! assert!(rules.is_blocked("www.instagram.com"));
//! assert!(rules.is_blocked("music.youtube.com"));
//! ```

pub mod config;
pub mod dns;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod network;
pub mod session;

pub use config::Config;
pub use error::{Error, Result};
