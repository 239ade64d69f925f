//! One's-complement checksums for the IPv4 header and the UDP pseudo-header.
//!
//! Every loop here has a compile-time ceiling: headers and datagrams longer
//! than the ceilings are rejected instead of being summed partially.

use std::net::{Ipv4Addr, Ipv6Addr};

/// IHL is a 4-bit count of 32-bit words.
pub const MAX_IPV4_HEADER_LEN: usize = 60;
/// Largest UDP datagram (header + payload) the checksum walks.
pub const MAX_UDP_CHECKSUM_LEN: usize = 1480;
/// Carry folds applied before complementing; two suffice for a `u32` sum.
pub const MAX_CARRY_FOLDS: usize = 4;

const IPV4_CHECKSUM_OFFSET: usize = 10;
const UDP_PROTOCOL: u16 = 17;

/// Adds the big-endian 16-bit words of `bytes` to `sum`. An odd trailing
/// byte is padded with a zero low byte.
fn sum_words(mut sum: u32, bytes: &[u8]) -> u32 {
    let mut chunks = bytes.chunks_exact(2);
    for chunk in &mut chunks {
        sum = sum.wrapping_add(u32::from(u16::from_be_bytes([chunk[0], chunk[1]])));
    }
    if let Some(&byte) = chunks.remainder().first() {
        sum = sum.wrapping_add(u32::from(u16::from_be_bytes([byte, 0])));
    }
    sum
}

/// Folds carries back into the low 16 bits.
pub fn fold(mut sum: u32) -> u16 {
    for _ in 0..MAX_CARRY_FOLDS {
        if sum >> 16 == 0 {
            break;
        }
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

/// IPv4 header checksum. The checksum field itself is treated as zero, so
/// the caller does not have to clear it first. Returns `None` for headers
/// outside `20..=60` bytes.
pub fn ipv4_header(header: &[u8]) -> Option<u16> {
    if header.len() < 20 || header.len() > MAX_IPV4_HEADER_LEN {
        return None;
    }
    let sum = sum_words(0, &header[..IPV4_CHECKSUM_OFFSET]);
    let sum = sum_words(sum, &header[IPV4_CHECKSUM_OFFSET + 2..]);
    Some(!fold(sum))
}

/// UDP checksum over the IPv6 pseudo-header (RFC 8200 §8.1) and `datagram`,
/// whose checksum field must already be zero.
///
/// The pseudo-header contributes both addresses, the UDP length and a word
/// holding the next-header value. A computed zero is sent as `0xFFFF`
/// because zero on the wire means "no checksum".
pub fn udp_ipv6(src: Ipv6Addr, dst: Ipv6Addr, datagram: &[u8]) -> Option<u16> {
    if datagram.len() > MAX_UDP_CHECKSUM_LEN {
        return None;
    }
    let mut sum = sum_words(0, &src.octets());
    sum = sum_words(sum, &dst.octets());
    sum = sum.wrapping_add(datagram.len() as u32);
    sum = sum.wrapping_add(u32::from(UDP_PROTOCOL));
    sum = sum_words(sum, datagram);
    Some(finish_udp(sum))
}

/// UDP checksum over the IPv4 pseudo-header and `datagram`, with the same
/// zero remapping as [`udp_ipv6`].
pub fn udp_ipv4(src: Ipv4Addr, dst: Ipv4Addr, datagram: &[u8]) -> Option<u16> {
    if datagram.len() > MAX_UDP_CHECKSUM_LEN {
        return None;
    }
    let mut sum = sum_words(0, &src.octets());
    sum = sum_words(sum, &dst.octets());
    sum = sum.wrapping_add(u32::from(UDP_PROTOCOL));
    sum = sum.wrapping_add(datagram.len() as u32);
    sum = sum_words(sum, datagram);
    Some(finish_udp(sum))
}

fn finish_udp(sum: u32) -> u16 {
    match !fold(sum) {
        0 => 0xFFFF,
        checksum => checksum,
    }
}

#[cfg(test)]
mod tests;
