use super::*;
use smoltcp::wire::{IpAddress, Ipv4Address, Ipv4Packet, Ipv6Address, UdpPacket};

// Header from RFC 1071 style worked examples: checksum 0xb861.
const SAMPLE_IPV4_HEADER: [u8; 20] = [
    0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0xb8, 0x61, 0xc0, 0xa8, 0x00,
    0x01, 0xc0, 0xa8, 0x00, 0xc7,
];

fn sample_udp_datagram(payload: &[u8]) -> Vec<u8> {
    let len = (8 + payload.len()) as u16;
    let mut datagram = vec![0x30, 0x39, 0x00, 0x35];
    datagram.extend_from_slice(&len.to_be_bytes());
    datagram.extend_from_slice(&[0, 0]);
    datagram.extend_from_slice(payload);
    datagram
}

#[test]
fn ipv4_header_ignores_existing_checksum_field() {
    assert_eq!(ipv4_header(&SAMPLE_IPV4_HEADER), Some(0xb861));
    let mut zeroed = SAMPLE_IPV4_HEADER;
    zeroed[10] = 0;
    zeroed[11] = 0;
    assert_eq!(ipv4_header(&zeroed), Some(0xb861));
}

#[test]
fn ipv4_header_passes_independent_verification() {
    let mut header = SAMPLE_IPV4_HEADER;
    header[8] = 17;
    header[12..16].copy_from_slice(&[10, 1, 2, 3]);
    let checksum = ipv4_header(&header).unwrap();
    header[10..12].copy_from_slice(&checksum.to_be_bytes());
    assert!(Ipv4Packet::new_unchecked(&header[..]).verify_checksum());
}

#[test]
fn ipv4_header_with_options_is_covered() {
    let mut header = vec![0u8; 24];
    header[..20].copy_from_slice(&SAMPLE_IPV4_HEADER);
    header[0] = 0x46;
    header[20..24].copy_from_slice(&[0x01, 0x01, 0x01, 0x00]);
    let checksum = ipv4_header(&header).unwrap();
    header[10..12].copy_from_slice(&checksum.to_be_bytes());
    assert!(Ipv4Packet::new_unchecked(&header[..]).verify_checksum());
}

#[test]
fn ipv4_header_rejects_out_of_range_lengths() {
    assert_eq!(ipv4_header(&[0u8; 19]), None);
    assert_eq!(ipv4_header(&[0u8; 64]), None);
}

#[test]
fn udp_ipv6_matches_independent_verifier() {
    let src: Ipv6Addr = "2001:db8::1".parse().unwrap();
    let dst: Ipv6Addr = "2001:db8::53".parse().unwrap();
    for payload in [&b"odd"[..], &b"even"[..], &[0xffu8; 101][..]] {
        let mut datagram = sample_udp_datagram(payload);
        let checksum = udp_ipv6(src, dst, &datagram).unwrap();
        datagram[6..8].copy_from_slice(&checksum.to_be_bytes());
        let packet = UdpPacket::new_unchecked(&datagram[..]);
        assert!(packet.verify_checksum(
            &IpAddress::Ipv6(Ipv6Address::from_bytes(&src.octets())),
            &IpAddress::Ipv6(Ipv6Address::from_bytes(&dst.octets())),
        ));
    }
}

#[test]
fn udp_ipv6_zero_result_is_sent_as_all_ones() {
    let src: Ipv6Addr = "fe80::1".parse().unwrap();
    let dst: Ipv6Addr = "fe80::2".parse().unwrap();
    let mut datagram = sample_udp_datagram(&[0, 0]);
    let balancing = udp_ipv6(src, dst, &datagram).unwrap();
    // A payload word equal to the complement of the rest makes the sum 0xFFFF.
    datagram[8..10].copy_from_slice(&balancing.to_be_bytes());
    assert_eq!(udp_ipv6(src, dst, &datagram), Some(0xFFFF));
}

#[test]
fn udp_ipv4_matches_independent_verifier() {
    let src = Ipv4Addr::new(192, 0, 2, 1);
    let dst = Ipv4Addr::new(198, 51, 100, 53);
    let mut datagram = sample_udp_datagram(b"question");
    let checksum = udp_ipv4(src, dst, &datagram).unwrap();
    assert_ne!(checksum, 0);
    datagram[6..8].copy_from_slice(&checksum.to_be_bytes());
    let packet = UdpPacket::new_unchecked(&datagram[..]);
    assert!(packet.verify_checksum(
        &IpAddress::Ipv4(Ipv4Address::from_bytes(&src.octets())),
        &IpAddress::Ipv4(Ipv4Address::from_bytes(&dst.octets())),
    ));
}

#[test]
fn udp_checksum_refuses_datagrams_past_ceiling() {
    let src: Ipv6Addr = "::1".parse().unwrap();
    let datagram = vec![0u8; MAX_UDP_CHECKSUM_LEN + 1];
    assert_eq!(udp_ipv6(src, src, &datagram), None);
    assert!(udp_ipv6(src, src, &datagram[..MAX_UDP_CHECKSUM_LEN]).is_some());
}

#[test]
fn fold_collapses_carries() {
    assert_eq!(fold(0x0001_FFFF), 0x0001);
    assert_eq!(fold(0xFFFF_FFFF), 0xFFFF);
    assert_eq!(fold(0x1234), 0x1234);
}
