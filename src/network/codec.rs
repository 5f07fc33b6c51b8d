//! IPv4/UDP/DNS wire-format decoding and in-place header rewriting.
//!
//! The virtual interface hands us raw IPv4 datagrams with no link-layer
//! framing. This module picks the DNS queries out of that stream and owns
//! the header arithmetic both reply paths share: address/port swapping,
//! length rewriting, and the IPv4 header checksum.

// DNS-over-UDP packets are small (the interface read buffer caps them far
// below u16::MAX), so these usize-to-u16 casts never truncate.
#![allow(clippy::cast_possible_truncation)]

use std::net::Ipv4Addr;

/// Minimum plausible DNS query: IPv4 (20) + UDP (8) + DNS header (12).
pub const MIN_QUERY_SIZE: usize = 40;
/// Minimum IPv4 header length in bytes.
pub const IPV4_MIN_HEADER_SIZE: usize = 20;
/// UDP header size in bytes.
pub const UDP_HEADER_SIZE: usize = 8;
/// DNS header size in bytes.
pub const DNS_HEADER_SIZE: usize = 12;
/// UDP port DNS queries are addressed to.
pub const DNS_PORT: u16 = 53;

const IPPROTO_UDP: u8 = 17;

/// A decoded view over one DNS query packet.
///
/// Offsets index into the raw packet the view was decoded from; the view
/// lives for a single pipeline pass and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuery {
    /// IPv4 header length in bytes (IHL field × 4).
    pub ip_header_len: usize,
    /// Offset of the DNS message (`ip_header_len` + UDP header).
    pub dns_offset: usize,
    pub source_addr: Ipv4Addr,
    pub dest_addr: Ipv4Addr,
    pub source_port: u16,
    pub dest_port: u16,
    /// Question name, lowercase, labels joined with `.`.
    pub hostname: String,
    /// Offset one past the question section (name + QTYPE + QCLASS).
    pub question_end: usize,
}

/// Decode a raw IPv4 datagram into a DNS query view.
///
/// Returns `None` for anything that is not a well-formed UDP DNS query
/// addressed to port 53: too short, not IPv4, not UDP, wrong port, or a
/// question name whose labels run past the end of the buffer. Only the
/// first question is read; stub resolvers send exactly one.
pub fn decode(packet: &[u8]) -> Option<DnsQuery> {
    if packet.len() < MIN_QUERY_SIZE {
        return None;
    }

    let version = packet[0] >> 4;
    if version != 4 {
        return None;
    }

    let ip_header_len = usize::from(packet[0] & 0x0F) * 4;
    if ip_header_len < IPV4_MIN_HEADER_SIZE || packet.len() < ip_header_len + UDP_HEADER_SIZE {
        return None;
    }

    if packet[9] != IPPROTO_UDP {
        return None;
    }

    let source_port = u16::from_be_bytes([packet[ip_header_len], packet[ip_header_len + 1]]);
    let dest_port = u16::from_be_bytes([packet[ip_header_len + 2], packet[ip_header_len + 3]]);
    if dest_port != DNS_PORT {
        return None;
    }

    let dns_offset = ip_header_len + UDP_HEADER_SIZE;
    if packet.len() < dns_offset + DNS_HEADER_SIZE {
        return None;
    }

    let (hostname, question_end) = parse_question(packet, dns_offset + DNS_HEADER_SIZE)?;

    Some(DnsQuery {
        ip_header_len,
        dns_offset,
        source_addr: Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]),
        dest_addr: Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]),
        source_port,
        dest_port,
        hostname,
        question_end,
    })
}

/// Walk the length-prefixed labels of the first question name.
///
/// Returns the dotted lowercase hostname and the offset one past the
/// question's QTYPE/QCLASS. A label that overruns the buffer, a missing
/// terminator, or a truncated QTYPE/QCLASS all yield `None`.
fn parse_question(packet: &[u8], name_start: usize) -> Option<(String, usize)> {
    let mut labels: Vec<&str> = Vec::new();
    let mut pos = name_start;

    loop {
        let len = usize::from(*packet.get(pos)?);
        if len == 0 {
            pos += 1;
            break;
        }
        if pos + 1 + len > packet.len() {
            return None;
        }
        labels.push(std::str::from_utf8(&packet[pos + 1..pos + 1 + len]).ok()?);
        pos += 1 + len;
    }

    if labels.is_empty() {
        return None;
    }

    // QTYPE + QCLASS close out the question section.
    let question_end = pos + 4;
    if question_end > packet.len() {
        return None;
    }

    Some((labels.join(".").to_ascii_lowercase(), question_end))
}

/// Standard one's-complement IPv4 header checksum.
///
/// Sums the header as big-endian 16-bit words, folds the carries, and
/// complements the low 16 bits. The checksum field itself must be zeroed
/// by the caller before computing; recomputing over a header prepared
/// that way is idempotent.
pub fn ip_checksum(packet: &[u8], header_len: usize) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;
    while i + 1 < header_len {
        sum += u32::from(u16::from_be_bytes([packet[i], packet[i + 1]]));
        i += 2;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Swap IPv4 source/destination addresses and UDP source/destination
/// ports in place. Applying the swap twice restores the original
/// addressing.
pub fn swap_addressing(packet: &mut [u8], ip_header_len: usize) {
    for i in 0..4 {
        packet.swap(12 + i, 16 + i);
    }
    for i in 0..2 {
        packet.swap(ip_header_len + i, ip_header_len + 2 + i);
    }
}

/// The header rewrite shared by both reply paths.
///
/// Turns a buffer that still carries the query's addressing into a valid
/// reply-to-sender packet: swaps addresses and ports, rewrites the IPv4
/// total length and UDP length for the buffer's current size, and
/// recomputes the IPv4 header checksum. The UDP checksum is left zero,
/// which UDP over IPv4 permits.
pub fn finalize_response(packet: &mut [u8], ip_header_len: usize) {
    swap_addressing(packet, ip_header_len);

    let total_len = packet.len() as u16;
    packet[2..4].copy_from_slice(&total_len.to_be_bytes());

    let udp_len = (packet.len() - ip_header_len) as u16;
    packet[ip_header_len + 4..ip_header_len + 6].copy_from_slice(&udp_len.to_be_bytes());

    packet[10] = 0;
    packet[11] = 0;
    packet[ip_header_len + 6] = 0;
    packet[ip_header_len + 7] = 0;

    let checksum = ip_checksum(packet, ip_header_len);
    packet[10..12].copy_from_slice(&checksum.to_be_bytes());
}
