//! Benchmarks for wire-format decoding and reply construction.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::net::Ipv4Addr;
use std::str::FromStr;

use hickory_proto::op::{Message, Query};
use hickory_proto::rr::{Name, RecordType};
use hickory_proto::serialize::binary::BinEncodable;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::MutableIpv4Packet;
use pnet::packet::udp::MutableUdpPacket;

use focusdns::network::codec::{self, decode};
use focusdns::network::response;

fn query_packet(domain: &str) -> Vec<u8> {
    let mut query = Query::new();
    query.set_name(Name::from_str(domain).unwrap());
    query.set_query_type(RecordType::A);

    let mut message = Message::new();
    message.set_id(0x1234);
    message.set_recursion_desired(true);
    message.add_query(query);
    let payload = message.to_bytes().unwrap();

    let total_len = 20 + 8 + payload.len();
    let mut buffer = vec![0u8; total_len];

    {
        let mut udp = MutableUdpPacket::new(&mut buffer[20..]).unwrap();
        udp.set_source(51512);
        udp.set_destination(53);
        udp.set_length((8 + payload.len()) as u16);
        udp.set_payload(&payload);
    }

    {
        let mut ipv4 = MutableIpv4Packet::new(&mut buffer).unwrap();
        ipv4.set_version(4);
        ipv4.set_header_length(5);
        ipv4.set_total_length(total_len as u16);
        ipv4.set_ttl(64);
        ipv4.set_next_level_protocol(IpNextHeaderProtocols::Udp);
        ipv4.set_source(Ipv4Addr::new(10, 0, 0, 2));
        ipv4.set_destination(Ipv4Addr::new(10, 0, 0, 1));
        ipv4.set_checksum(pnet::packet::ipv4::checksum(&ipv4.to_immutable()));
    }

    buffer
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_decode");

    let short = query_packet("x.io");
    let long = query_packet("a.very.deeply.nested.subdomain.of.example.com");

    group.bench_function("short_name", |b| {
        b.iter(|| decode(black_box(&short)));
    });
    group.bench_function("long_name", |b| {
        b.iter(|| decode(black_box(&long)));
    });

    group.finish();
}

fn bench_checksum(c: &mut Criterion) {
    let mut packet = query_packet("example.com");
    packet[10] = 0;
    packet[11] = 0;

    c.bench_function("ip_checksum", |b| {
        b.iter(|| codec::ip_checksum(black_box(&packet), 20));
    });
}

fn bench_reply_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("reply_construction");

    let packet = query_packet("instagram.com");
    let query = decode(&packet).unwrap();
    let upstream_reply = vec![0u8; 128];

    group.bench_function("sinkhole", |b| {
        b.iter(|| response::build_block_response(black_box(&packet), black_box(&query)));
    });
    group.bench_function("forwarded", |b| {
        b.iter(|| {
            response::rebuild_forwarded_reply(
                black_box(&packet),
                black_box(&query),
                black_box(&upstream_reply),
            )
        });
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_checksum, bench_reply_construction);
criterion_main!(benches);
