//! Frame builders shared by the unit tests.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const CLIENT_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
pub const SERVER_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];
pub const CLIENT_PORT: u16 = 40_000;
pub const CLIENT_V4: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 10);
pub const SERVER_V4: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 53);
pub const CLIENT_V6: Ipv6Addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0x10);
pub const SERVER_V6: Ipv6Addr = Ipv6Addr::new(0x2001, 0xdb8, 0x53, 0, 0, 0, 0, 0x53);
pub const TUNNEL_SRC_V4: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 1);
pub const TUNNEL_DST_V4: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 2);
pub const TUNNEL_SRC_V6: Ipv6Addr = Ipv6Addr::new(0x2001, 0xdb8, 0xffff, 0, 0, 0, 0, 1);
pub const TUNNEL_DST_V6: Ipv6Addr = Ipv6Addr::new(0x2001, 0xdb8, 0xffff, 0, 0, 0, 0, 2);

/// Wire form of a dotted name, terminator included.
pub fn encode_name(name: &str) -> Vec<u8> {
    let mut encoded = Vec::new();
    for label in name.trim_end_matches('.').split('.').filter(|l| !l.is_empty()) {
        encoded.push(label.len() as u8);
        encoded.extend_from_slice(label.as_bytes());
    }
    encoded.push(0);
    encoded
}

/// Single-question query with RD set; `with_opt` appends an OPT record
/// advertising a 4096 byte payload.
pub fn dns_query(id: u16, name: &str, qtype: u16, with_opt: bool) -> Vec<u8> {
    let mut message = Vec::new();
    message.extend_from_slice(&id.to_be_bytes());
    message.extend_from_slice(&[0x01, 0x00]); // RD
    message.extend_from_slice(&[0x00, 0x01]); // qdcount
    message.extend_from_slice(&[0x00, 0x00]); // ancount
    message.extend_from_slice(&[0x00, 0x00]); // nscount
    message.extend_from_slice(&u16::from(with_opt).to_be_bytes());
    message.extend_from_slice(&encode_name(name));
    message.extend_from_slice(&qtype.to_be_bytes());
    message.extend_from_slice(&[0x00, 0x01]); // IN
    if with_opt {
        message.extend_from_slice(&[0x00, 0x00, 0x29, 0x10, 0x00, 0, 0, 0, 0, 0x00, 0x00]);
    }
    message
}

#[derive(Debug, Clone, Copy)]
pub struct IpPair {
    pub src: IpAddr,
    pub dst: IpAddr,
}

impl IpPair {
    pub fn v4(src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }

    pub fn v6(src: Ipv6Addr, dst: Ipv6Addr) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }
}

/// Describes an Ethernet frame around a DNS message.
#[derive(Debug, Clone)]
pub struct FrameSpec {
    pub vlans: Vec<u16>,
    pub outer: Option<IpPair>,
    pub inner: IpPair,
    pub dst_port: u16,
    /// IPv4 option bytes on the inner header; must be a multiple of 4.
    pub ipv4_options: Vec<u8>,
}

impl FrameSpec {
    pub fn v4() -> Self {
        Self::with_inner(IpPair::v4(CLIENT_V4, SERVER_V4))
    }

    pub fn v6() -> Self {
        Self::with_inner(IpPair::v6(CLIENT_V6, SERVER_V6))
    }

    pub fn with_inner(inner: IpPair) -> Self {
        Self {
            vlans: Vec::new(),
            outer: None,
            inner,
            dst_port: 53,
            ipv4_options: Vec::new(),
        }
    }

    pub fn vlan(mut self, tci: u16) -> Self {
        self.vlans.push(tci);
        self
    }

    pub fn tunnel(mut self, outer: IpPair) -> Self {
        self.outer = Some(outer);
        self
    }

    pub fn build(&self, dns: &[u8]) -> Vec<u8> {
        let mut udp = Vec::with_capacity(8 + dns.len());
        udp.extend_from_slice(&CLIENT_PORT.to_be_bytes());
        udp.extend_from_slice(&self.dst_port.to_be_bytes());
        udp.extend_from_slice(&((8 + dns.len()) as u16).to_be_bytes());
        udp.extend_from_slice(&[0, 0]);
        udp.extend_from_slice(dns);

        let packet = ip_packet(self.inner, IPPROTO_UDP, &self.ipv4_options, &udp);
        let (packet, family) = match self.outer {
            Some(outer) => {
                let protocol = if self.inner.dst.is_ipv4() { 4 } else { 41 };
                (ip_packet(outer, protocol, &[], &packet), outer.dst)
            }
            None => (packet, self.inner.dst),
        };

        let mut frame = Vec::new();
        frame.extend_from_slice(&SERVER_MAC);
        frame.extend_from_slice(&CLIENT_MAC);
        for tci in &self.vlans {
            frame.extend_from_slice(&0x8100u16.to_be_bytes());
            frame.extend_from_slice(&tci.to_be_bytes());
        }
        let ethertype: u16 = if family.is_ipv4() { 0x0800 } else { 0x86DD };
        frame.extend_from_slice(&ethertype.to_be_bytes());
        frame.extend_from_slice(&packet);
        frame
    }
}

const IPPROTO_UDP: u8 = 17;

fn ip_packet(pair: IpPair, protocol: u8, options: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::new();
    match (pair.src, pair.dst) {
        (IpAddr::V4(src), IpAddr::V4(dst)) => {
            let header_len = 20 + options.len();
            packet.push(0x40 | (header_len / 4) as u8);
            packet.push(0);
            packet.extend_from_slice(&((header_len + payload.len()) as u16).to_be_bytes());
            packet.extend_from_slice(&[0x12, 0x34, 0x40, 0x00]); // id, DF
            packet.push(64);
            packet.push(protocol);
            packet.extend_from_slice(&[0, 0]);
            packet.extend_from_slice(&src.octets());
            packet.extend_from_slice(&dst.octets());
            packet.extend_from_slice(options);
            let checksum = crate::checksum::ipv4_header(&packet).unwrap_or(0);
            packet[10..12].copy_from_slice(&checksum.to_be_bytes());
        }
        (IpAddr::V6(src), IpAddr::V6(dst)) => {
            packet.extend_from_slice(&[0x60, 0, 0, 0]);
            packet.extend_from_slice(&(payload.len() as u16).to_be_bytes());
            packet.push(protocol);
            packet.push(64);
            packet.extend_from_slice(&src.octets());
            packet.extend_from_slice(&dst.octets());
        }
        _ => panic!("mixed address families in one header"),
    }
    packet.extend_from_slice(payload);
    packet
}

/// Copies `frame` into a zeroed window with `tailroom` spare bytes.
pub fn window(frame: &[u8], tailroom: usize) -> Vec<u8> {
    let mut window = vec![0u8; frame.len() + tailroom];
    window[..frame.len()].copy_from_slice(frame);
    window
}
