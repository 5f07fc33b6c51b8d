//! Reply packet construction for both response paths.
//!
//! Blocked queries get a locally fabricated sinkhole answer; allowed
//! queries get the upstream resolver's reply re-framed for the original
//! sender. Both paths reuse the query's own IPv4/UDP framing and finish
//! with the shared header rewrite from [`codec`].

use crate::network::codec::{self, DnsQuery};

/// TTL of the synthetic sinkhole answer, in seconds.
///
/// Kept short so the poisoned entry ages out of resolver caches quickly
/// once the focus session ends.
pub const SINKHOLE_TTL_SECS: u32 = 30;

/// Address the sinkhole answer resolves blocked names to.
const SINKHOLE_ADDR: [u8; 4] = [0, 0, 0, 0];

/// Fabricate a sinkhole response for a blocked query.
///
/// The query's bytes are kept up to the end of its question section,
/// the DNS header is flipped to a no-error response carrying exactly one
/// answer, and a single A record is appended: a compression pointer back
/// to the question name, class IN, TTL [`SINKHOLE_TTL_SECS`], RDATA
/// 0.0.0.0. Deterministic for a given query.
pub fn build_block_response(packet: &[u8], query: &DnsQuery) -> Vec<u8> {
    let dns = query.dns_offset;

    let mut response = Vec::with_capacity(query.question_end + 16);
    response.extend_from_slice(&packet[..query.question_end]);

    // QR=1, opcode QUERY, recursion desired + available, RCODE 0.
    response[dns + 2] = 0x81;
    response[dns + 3] = 0x80;
    // QDCOUNT is preserved; one answer, no authority/additional records
    // (anything after the question, e.g. an EDNS OPT, was cut above).
    response[dns + 6..dns + 8].copy_from_slice(&1u16.to_be_bytes());
    response[dns + 8..dns + 12].fill(0);

    response.extend_from_slice(&[0xC0, 0x0C]); // pointer to the question name
    response.extend_from_slice(&1u16.to_be_bytes()); // TYPE A
    response.extend_from_slice(&1u16.to_be_bytes()); // CLASS IN
    response.extend_from_slice(&SINKHOLE_TTL_SECS.to_be_bytes());
    response.extend_from_slice(&4u16.to_be_bytes()); // RDLENGTH
    response.extend_from_slice(&SINKHOLE_ADDR);

    codec::finalize_response(&mut response, query.ip_header_len);
    response
}

/// Re-frame an upstream reply as a response to the original sender.
///
/// The query's IPv4 and UDP headers are reused as-is, the reply bytes
/// become the new payload verbatim, and the shared rewrite fixes
/// addressing, lengths, and the checksum.
pub fn rebuild_forwarded_reply(packet: &[u8], query: &DnsQuery, reply: &[u8]) -> Vec<u8> {
    let mut response = Vec::with_capacity(query.dns_offset + reply.len());
    response.extend_from_slice(&packet[..query.dns_offset]);
    response.extend_from_slice(reply);

    codec::finalize_response(&mut response, query.ip_header_len);
    response
}
