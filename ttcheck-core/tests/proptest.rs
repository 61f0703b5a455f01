//! Property-based tests using proptest

use bytes::Bytes;
use proptest::prelude::*;
use std::net::Ipv6Addr;
use ttcheck_core::constants::{ipproto, linktype};
use ttcheck_core::iphc::{self, ContextEntry, ContextTable, IidContext};
use ttcheck_core::pcap::PcapWriter;
use ttcheck_core::wire::ieee802154::MacAddress;
use ttcheck_core::wire::ip::Ipv6Header;
use ttcheck_core::wire::udp::{ipv6_datagram, UdpHeader};
use ttcheck_core::wire::{Layer, Packet};
use ttcheck_core::{filter_frames, Capture, Frame, Protocol, Verdict, VerdictValue};

fn contexts() -> ContextTable {
    let entry: ContextEntry = "0=2001:db8::/64".parse().unwrap();
    ContextTable::new().activate(&[entry])
}

fn link_iids() -> IidContext {
    IidContext::from_link(
        Some(MacAddress::Short([0x00, 0x01]).into()),
        Some(MacAddress::Short([0x00, 0x02]).into()),
    )
}

fn unicast() -> impl Strategy<Value = Ipv6Addr> {
    prop_oneof![
        Just("fe80::ff:fe00:1".parse().unwrap()),
        Just("fe80::ff:fe00:2".parse().unwrap()),
        any::<u64>().prop_map(|iid| Ipv6Addr::from((0xfe80u128 << 112) | iid as u128)),
        any::<u64>().prop_map(|iid| Ipv6Addr::from((0x2001_0db8u128 << 96) | iid as u128)),
        any::<u128>().prop_map(|a| Ipv6Addr::from(a & !(0xffu128 << 120))),
    ]
}

fn any_dst() -> impl Strategy<Value = Ipv6Addr> {
    prop_oneof![
        unicast(),
        Just("ff02::1".parse().unwrap()),
        Just("ff02::1:2".parse().unwrap()),
        any::<u32>().prop_map(|g| Ipv6Addr::from((0xff05u128 << 112) | g as u128)),
    ]
}

/// Overwrite traffic class, flow label and hop limit of an emitted packet
fn with_ip_fields(mut packet: Vec<u8>, tc: u8, flow: u32, hlim: u8) -> Vec<u8> {
    let mut ip = Ipv6Header::parse(&packet).unwrap();
    ip.traffic_class = tc;
    ip.flow_label = flow;
    ip.hop_limit = hlim;
    packet[..Ipv6Header::LEN].copy_from_slice(&ip.emit());
    packet
}

proptest! {
    #[test]
    fn prop_iphc_round_trip_udp(
        src in unicast(),
        dst in any_dst(),
        sport in any::<u16>(),
        dport in any::<u16>(),
        tc in any::<u8>(),
        flow in 0u32..(1 << 20),
        hlim in any::<u8>(),
        payload in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let packet = with_ip_fields(ipv6_datagram(src, dst, sport, dport, &payload), tc, flow, hlim);
        let (ctx, iids) = (contexts(), link_iids());

        let lowpan = iphc::compress_packet(&packet, &ctx, &iids).unwrap();
        let restored = iphc::decompress_packet(&lowpan, &ctx, &iids).unwrap();

        prop_assert_eq!(restored, packet);
    }

    #[test]
    fn prop_iphc_round_trip_inline_next_header(
        src in unicast(),
        dst in any_dst(),
        tc in any::<u8>(),
        flow in 0u32..(1 << 20),
        hlim in any::<u8>(),
        payload in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let ip = Ipv6Header {
            traffic_class: tc,
            flow_label: flow,
            payload_len: payload.len() as u16,
            next_header: 58,
            hop_limit: hlim,
            src,
            dst,
        };
        let mut packet = ip.emit().to_vec();
        packet.extend_from_slice(&payload);
        let (ctx, iids) = (contexts(), link_iids());

        let lowpan = iphc::compress_packet(&packet, &ctx, &iids).unwrap();
        let restored = iphc::decompress_packet(&lowpan, &ctx, &iids).unwrap();

        prop_assert_eq!(restored, packet);
    }

    #[test]
    fn prop_iphc_round_trip_encapsulated(
        outer_src in unicast(),
        outer_dst in any_dst(),
        src in unicast(),
        dst in any_dst(),
        sport in any::<u16>(),
        dport in any::<u16>(),
        hlim in any::<u8>(),
        payload in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let inner = ipv6_datagram(src, dst, sport, dport, &payload);
        let outer = Ipv6Header {
            traffic_class: 0,
            flow_label: 0,
            payload_len: inner.len() as u16,
            next_header: ipproto::IPV6,
            hop_limit: hlim,
            src: outer_src,
            dst: outer_dst,
        };
        let mut packet = outer.emit().to_vec();
        packet.extend_from_slice(&inner);
        let (ctx, iids) = (contexts(), link_iids());

        let lowpan = iphc::compress_packet(&packet, &ctx, &iids).unwrap();
        let restored = iphc::decompress_packet(&lowpan, &ctx, &iids).unwrap();

        prop_assert_eq!(restored, packet);
    }

    #[test]
    fn prop_iphc_decompress_never_panics(
        data in prop::collection::vec(any::<u8>(), 0..128)
    ) {
        let mut data = data;
        if let Some(first) = data.first_mut() {
            *first = 0x60 | (*first & 0x1f);
        }
        let _ = iphc::decompress_packet(&data, &contexts(), &link_iids());
    }

    #[test]
    fn prop_verdict_is_max(
        updates in prop::collection::vec(0usize..6, 0..32)
    ) {
        let mut v = Verdict::new();
        for (i, u) in updates.iter().enumerate() {
            v.update(VerdictValue::ALL[*u], format!("step {}", i));
        }
        let max = updates.iter().map(|u| VerdictValue::ALL[*u]).max().unwrap_or_default();
        prop_assert_eq!(v.value(), max);
        prop_assert_eq!(v.history().len(), updates.len());
    }

    #[test]
    fn prop_filter_partition(
        stacks in prop::collection::vec(prop::collection::vec(0u8..3, 0..4), 0..20)
    ) {
        let frames: Vec<Frame> = stacks
            .iter()
            .enumerate()
            .map(|(i, stack)| {
                let layers = stack
                    .iter()
                    .map(|k| match k {
                        0 => Layer::Udp(UdpHeader { src_port: 1, dst_port: 2, length: 8, checksum: 0 }),
                        1 => Layer::Raw(Bytes::from_static(b"x")),
                        _ => Layer::Ipv6(Ipv6Header::parse(&[0x60; 40]).unwrap()),
                    })
                    .collect();
                Frame::new(i + 1, i as f64, Packet::new(layers), None)
            })
            .collect();

        let (yes, no) = filter_frames(&frames, Protocol::Udp);

        prop_assert_eq!(yes.len() + no.len(), frames.len());
        prop_assert!(yes.iter().all(|f| f.contains(Protocol::Udp)));
        prop_assert!(no.iter().all(|f| !f.contains(Protocol::Udp)));
        prop_assert!(yes.windows(2).all(|w| w[0].id() < w[1].id()));
        prop_assert!(no.windows(2).all(|w| w[0].id() < w[1].id()));
    }

    #[test]
    fn prop_frame_numbering(
        records in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..80), 0..30)
    ) {
        let mut w = PcapWriter::new(Vec::new(), linktype::RAW).unwrap();
        for r in &records {
            w.write_record(0.0, r).unwrap();
        }
        let cap = Capture::from_bytes("p", Bytes::from(w.into_inner().unwrap())).unwrap();

        let ids: Vec<usize> = cap.frames().iter().map(Frame::id).collect();
        prop_assert_eq!(ids, (1..=records.len()).collect::<Vec<_>>());
        prop_assert!(std::ptr::eq(cap.frames(), cap.frames()));
    }
}
