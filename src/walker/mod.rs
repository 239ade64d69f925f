//! Top-down header walk: Ethernet, up to two VLAN tags, IPv4/IPv6, at most
//! one level of IP-in-IP, then UDP. Stops with the cursor on the DNS header.

use crate::error::{ParseError, ProcessError};
use crate::frame::{Cursor, Ethernet, Header, IpFamily, Ipv4, Ipv6, Udp, VlanTag};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const ETH_P_IPV4: u16 = 0x0800;
pub const ETH_P_IPV6: u16 = 0x86DD;
pub const ETH_P_8021Q: u16 = 0x8100;
pub const ETH_P_8021AD: u16 = 0x88A8;

pub const IPPROTO_IPIP: u8 = 4;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_IPV6: u8 = 41;

pub const MAX_VLAN_TAGS: usize = 2;

const ETHERTYPE_OFFSET: usize = 12;
const IPV4_FRAGMENT_MASK: u16 = 0x3FFF;

/// Location of one IP header inside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpLayer {
    pub family: IpFamily,
    pub offset: usize,
    /// IHL*4 for IPv4, 40 for IPv6.
    pub header_len: usize,
}

impl IpLayer {
    pub fn address_len(&self) -> usize {
        match self.family {
            IpFamily::V4 => 4,
            IpFamily::V6 => 16,
        }
    }

    pub fn source_offset(&self) -> usize {
        match self.family {
            IpFamily::V4 => self.offset + 12,
            IpFamily::V6 => self.offset + 8,
        }
    }

    pub fn destination_offset(&self) -> usize {
        match self.family {
            IpFamily::V4 => self.offset + 16,
            IpFamily::V6 => self.offset + 24,
        }
    }

    pub fn end(&self) -> usize {
        self.offset + self.header_len
    }

    pub fn source(&self, data: &[u8]) -> IpAddr {
        self.address_at(data, self.source_offset())
    }

    pub fn destination(&self, data: &[u8]) -> IpAddr {
        self.address_at(data, self.destination_offset())
    }

    fn address_at(&self, data: &[u8], at: usize) -> IpAddr {
        match self.family {
            IpFamily::V4 => IpAddr::V4(Ipv4Addr::new(
                data[at],
                data[at + 1],
                data[at + 2],
                data[at + 3],
            )),
            IpFamily::V6 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&data[at..at + 16]);
                IpAddr::V6(Ipv6Addr::from(octets))
            }
        }
    }
}

/// The encapsulation combinations the walker accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encapsulation {
    None,
    Ipv4InIpv4,
    Ipv6InIpv6,
    Ipv4InIpv6,
}

/// Offsets of every layer the rewriter touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layers {
    /// Ethernet header plus VLAN tags.
    pub l2_len: usize,
    /// Offset of the innermost ethertype field.
    pub ethertype_offset: usize,
    pub outer: Option<IpLayer>,
    /// The IP layer carrying the UDP datagram.
    pub inner: IpLayer,
    pub udp: usize,
    pub dns: usize,
}

impl Layers {
    pub fn encapsulation(&self) -> Encapsulation {
        match (self.outer.map(|outer| outer.family), self.inner.family) {
            (None, _) => Encapsulation::None,
            (Some(IpFamily::V4), _) => Encapsulation::Ipv4InIpv4,
            (Some(IpFamily::V6), IpFamily::V6) => Encapsulation::Ipv6InIpv6,
            (Some(IpFamily::V6), IpFamily::V4) => Encapsulation::Ipv4InIpv6,
        }
    }

    /// Bytes the rewriter removes in front of the inner IP header. Only an
    /// IPv6 outer around an IPv4 inner keeps its outer header.
    pub fn strip_len(&self) -> usize {
        match self.outer {
            Some(outer) if self.encapsulation() != Encapsulation::Ipv4InIpv6 => outer.header_len,
            _ => 0,
        }
    }

    /// Effective destination: the inner address for encapsulated frames.
    pub fn destination(&self, data: &[u8]) -> IpAddr {
        self.inner.destination(data)
    }
}

/// Walks `data` down to the DNS header. On success the cursor sits on the
/// first DNS byte with `encap` and `payload` filled in.
pub fn walk(data: &[u8], dns_port: u16) -> Result<(Layers, Cursor), ProcessError> {
    let mut cursor = Cursor::new(data);

    let eth = cursor.read_header::<Ethernet>(data)?;
    let mut ethertype = eth.be16(ETHERTYPE_OFFSET);
    let mut ethertype_offset = ETHERTYPE_OFFSET;
    for _ in 0..MAX_VLAN_TAGS {
        if ethertype != ETH_P_8021Q && ethertype != ETH_P_8021AD {
            break;
        }
        let tag = cursor.read_header::<VlanTag>(data)?;
        ethertype = tag.be16(2);
        ethertype_offset = tag.offset + 2;
    }
    let l2_len = cursor.position();

    let (first, protocol) = match ethertype {
        ETH_P_IPV4 => read_ipv4(&mut cursor, data)?,
        ETH_P_IPV6 => read_ipv6(&mut cursor, data)?,
        other => return Err(ParseError::UnsupportedEthertype(other).into()),
    };

    let (outer, inner, protocol) = match (first.family, protocol) {
        (_, IPPROTO_UDP) => (None, first, protocol),
        (IpFamily::V4, IPPROTO_IPIP) | (IpFamily::V6, IPPROTO_IPIP) => {
            let (inner, protocol) = read_ipv4(&mut cursor, data)?;
            (Some(first), inner, protocol)
        }
        (IpFamily::V6, IPPROTO_IPV6) => {
            let (inner, protocol) = read_ipv6(&mut cursor, data)?;
            (Some(first), inner, protocol)
        }
        (IpFamily::V4, IPPROTO_IPV6) => {
            return Err(ProcessError::UnsupportedEncapsulation("ipv6 in ipv4"))
        }
        (_, other) => return Err(ParseError::NotUdp(other).into()),
    };

    match protocol {
        IPPROTO_UDP => {}
        IPPROTO_IPIP | IPPROTO_IPV6 if outer.is_some() => {
            return Err(ProcessError::UnsupportedEncapsulation("nested tunnel"))
        }
        other => return Err(ParseError::NotUdp(other).into()),
    }

    let udp = cursor.read_header::<Udp>(data)?;
    let port = udp.be16(2);
    if port != dns_port {
        return Err(ParseError::NotDnsPort(port).into());
    }

    cursor.encap = outer.map(|layer| layer.family);
    cursor.payload = Some(inner.family);
    let layers = Layers {
        l2_len,
        ethertype_offset,
        outer,
        inner,
        udp: udp.offset,
        dns: cursor.position(),
    };
    Ok((layers, cursor))
}

fn read_ipv4(cursor: &mut Cursor, data: &[u8]) -> Result<(IpLayer, u8), ParseError> {
    let ip = cursor.read_header::<Ipv4>(data)?;
    if ip.bytes[0] >> 4 != 4 {
        return Err(ParseError::MalformedIpv4Header);
    }
    let header_len = usize::from(ip.bytes[0] & 0x0F) * 4;
    if header_len < Ipv4::LEN {
        return Err(ParseError::MalformedIpv4Header);
    }
    if ip.be16(6) & IPV4_FRAGMENT_MASK != 0 {
        return Err(ParseError::Fragmented);
    }
    let layer = IpLayer {
        family: IpFamily::V4,
        offset: ip.offset,
        header_len,
    };
    let protocol = ip.bytes[9];
    cursor.skip(data, header_len - Ipv4::LEN)?;
    Ok((layer, protocol))
}

fn read_ipv6(cursor: &mut Cursor, data: &[u8]) -> Result<(IpLayer, u8), ParseError> {
    let ip = cursor.read_header::<Ipv6>(data)?;
    if ip.bytes[0] >> 4 != 6 {
        return Err(ParseError::MalformedIpv6Header);
    }
    let layer = IpLayer {
        family: IpFamily::V6,
        offset: ip.offset,
        header_len: Ipv6::LEN,
    };
    Ok((layer, ip.bytes[6]))
}
