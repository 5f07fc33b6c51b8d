//! The interception loop: read, decode, decide, respond.
//!
//! One task owns the interface and drives the per-packet pipeline for
//! the lifetime of a session. Per-packet failures are absorbed here:
//! a malformed datagram or a dead upstream must never take down DNS
//! resolution for the whole device.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, trace, warn};

use crate::dns::matcher::RuleSet;
use crate::dns::relay::DnsRelay;
use crate::network::codec;
use crate::network::response;
use crate::network::tun::TunInterface;
use crate::session::SessionState;

/// Timing knobs for the read loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    /// Pause between reads when the interface has no data.
    pub poll_interval: Duration,
    /// Pause after a transient read error before retrying.
    pub error_backoff: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            error_backoff: Duration::from_millis(100),
        }
    }
}

/// Drive the interception loop until the session stops.
///
/// The interface handle has no blocking-with-cancellation read, so the
/// loop polls: an empty read pauses for `poll_interval` and retries,
/// which also bounds how long a stop request can go unnoticed. On exit
/// the relay socket is released before the interface handle.
pub async fn run_loop<T, R>(
    mut tun: T,
    relay: R,
    rules: RuleSet,
    state: Arc<SessionState>,
    settings: LoopSettings,
) where
    T: TunInterface,
    R: DnsRelay,
{
    if state.begin_running() {
        while state.is_running() {
            match tun.read_packet() {
                Ok(Some(packet)) => process_packet(&mut tun, &relay, &rules, &packet).await,
                Ok(None) => tokio::time::sleep(settings.poll_interval).await,
                Err(err) => {
                    if !state.is_running() {
                        break;
                    }
                    warn!(error = %err, "interface read failed, retrying");
                    tokio::time::sleep(settings.error_backoff).await;
                }
            }
        }
    }

    // Teardown order: forwarding socket first, then the interface.
    drop(relay);
    drop(tun);
}

/// Run one packet through decode → match → sinkhole-or-forward → write.
///
/// Every failure mode ends in a dropped packet, not an error: the
/// querying process retries on its own UDP timeout if it cares.
pub async fn process_packet<T, R>(tun: &mut T, relay: &R, rules: &RuleSet, packet: &[u8])
where
    T: TunInterface,
    R: DnsRelay,
{
    let Some(query) = codec::decode(packet) else {
        // The tunnel routes only DNS-gateway traffic here, so this is
        // either a malformed query or a stray we cannot answer.
        trace!("dropping undecodable packet");
        counter!("focusdns_packets_dropped").increment(1);
        return;
    };

    if rules.is_blocked(&query.hostname) {
        debug!(hostname = %query.hostname, "query sinkholed");
        counter!("focusdns_queries_blocked").increment(1);
        let reply = response::build_block_response(packet, &query);
        write_reply(tun, &reply);
        return;
    }

    match relay.relay(&packet[query.dns_offset..]).await {
        Ok(upstream_reply) => {
            counter!("focusdns_queries_forwarded").increment(1);
            let reply = response::rebuild_forwarded_reply(packet, &query, &upstream_reply);
            write_reply(tun, &reply);
        }
        Err(err) => {
            debug!(hostname = %query.hostname, error = %err, "upstream relay failed, dropping query");
            counter!("focusdns_relay_failures").increment(1);
        }
    }
}

fn write_reply<T: TunInterface>(tun: &mut T, packet: &[u8]) {
    if let Err(err) = tun.write_packet(packet) {
        warn!(error = %err, "failed to write reply to interface");
    }
}
