//! Turns a query frame into its response in place.
//!
//! Work is split in two: [`plan`] checks every size, offset and checksum
//! ceiling against the untouched frame, and only a successful plan is
//! applied. A rejected frame is therefore still byte-identical.

use crate::checksum::{self, MAX_UDP_CHECKSUM_LEN};
use crate::config::{ResponderConfig, TunnelReturn, Udp4Checksum};
use crate::dns::DNS_HEADER_LEN;
use crate::error::ProcessError;
use crate::frame::{Frame, IpFamily};
use crate::response::Synthesis;
use crate::walker::{IpLayer, Layers, ETH_P_IPV4, ETH_P_IPV6};
use std::net::{Ipv4Addr, Ipv6Addr};

const MAC_LEN: usize = 6;

/// Bytes the tail must grow by so the answer ends exactly at the new frame
/// end. Fails when the answer would start past the frame or leave bytes
/// behind, since the frame is never shrunk.
pub fn tail_delta(
    frame_len: usize,
    answer_start: usize,
    response_len: usize,
) -> Result<usize, ProcessError> {
    if answer_start > frame_len {
        return Err(ProcessError::BoundsViolation("answer starts past frame end"));
    }
    let answer_end = answer_start + response_len;
    answer_end
        .checked_sub(frame_len)
        .ok_or(ProcessError::BoundsViolation("response would shrink frame"))
}

/// Validated rewrite, with offsets relative to the frame after stripping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub strip: usize,
    pub grow: usize,
    pub layers: Layers,
    pub answer_start: usize,
    pub new_len: usize,
}

pub fn plan(
    frame: &Frame<'_>,
    layers: &Layers,
    response_len: usize,
    query_length: usize,
    config: &ResponderConfig,
) -> Result<Plan, ProcessError> {
    let answer_start = layers.dns + DNS_HEADER_LEN + query_length;
    let grow = tail_delta(frame.len(), answer_start, response_len)?;
    if grow > frame.tailroom() {
        return Err(ProcessError::BoundsViolation("no tailroom for answer"));
    }

    let strip = layers.strip_len();
    let shifted = Layers {
        outer: if strip > 0 { None } else { layers.outer },
        inner: IpLayer {
            offset: layers.inner.offset - strip,
            ..layers.inner
        },
        udp: layers.udp - strip,
        dns: layers.dns - strip,
        ..*layers
    };
    let new_len = frame.len() + grow - strip;

    let udp_len = new_len - shifted.udp;
    fits_u16(udp_len)?;
    let checksummed = match shifted.inner.family {
        IpFamily::V6 => true,
        IpFamily::V4 => config.udp4_checksum == Udp4Checksum::Compute,
    };
    if checksummed && udp_len > MAX_UDP_CHECKSUM_LEN {
        return Err(ProcessError::BoundsViolation(
            "datagram exceeds checksum ceiling",
        ));
    }
    fits_u16(new_len - shifted.inner.offset)?;
    if let Some(outer) = shifted.outer {
        fits_u16(new_len - outer.offset)?;
    }

    Ok(Plan {
        strip,
        grow,
        layers: shifted,
        answer_start: answer_start - strip,
        new_len,
    })
}

fn fits_u16(value: usize) -> Result<u16, ProcessError> {
    u16::try_from(value).map_err(|_| ProcessError::BoundsViolation("length field overflow"))
}

/// Plans and applies the rewrite. On error the frame is untouched.
pub fn rewrite(
    frame: &mut Frame<'_>,
    layers: &Layers,
    synthesis: &Synthesis,
    query_length: usize,
    config: &ResponderConfig,
) -> Result<(), ProcessError> {
    let plan = plan(frame, layers, synthesis.scratch.len(), query_length, config)?;
    apply(frame, &plan, synthesis, config)
}

fn apply(
    frame: &mut Frame<'_>,
    plan: &Plan,
    synthesis: &Synthesis,
    config: &ResponderConfig,
) -> Result<(), ProcessError> {
    let layers = &plan.layers;

    if plan.strip > 0 {
        // Slide Ethernet and VLAN tags over the outer IP header.
        frame
            .as_mut_slice()
            .copy_within(0..layers.l2_len, plan.strip);
        frame.advance_head(plan.strip)?;
        let ethertype = match layers.inner.family {
            IpFamily::V4 => ETH_P_IPV4,
            IpFamily::V6 => ETH_P_IPV6,
        };
        write_be16(frame.as_mut_slice(), layers.ethertype_offset, ethertype);
    }
    frame.extend_tail(plan.grow)?;

    let data = frame.as_mut_slice();
    let answer = synthesis.scratch.as_slice();
    data[plan.answer_start..plan.answer_start + answer.len()].copy_from_slice(answer);
    data[layers.dns..layers.dns + DNS_HEADER_LEN].copy_from_slice(&synthesis.header.to_bytes());

    let udp_len = plan.new_len - layers.udp;
    write_be16(data, layers.udp + 4, udp_len as u16);
    write_be16(data, layers.udp + 6, 0);
    write_ip_length(data, &layers.inner, plan.new_len);
    if let Some(outer) = layers.outer {
        write_ip_length(data, &outer, plan.new_len);
    }

    swap_endpoints(data, layers);
    if let (Some(outer), TunnelReturn::Endpoint(endpoint)) = (layers.outer, config.tunnel_return) {
        if outer.family == IpFamily::V6 {
            let at = outer.destination_offset();
            data[at..at + 16].copy_from_slice(&endpoint.octets());
        }
    }

    if layers.inner.family == IpFamily::V4 {
        let header = &data[layers.inner.offset..layers.inner.end()];
        let sum = checksum::ipv4_header(header)
            .ok_or(ProcessError::BoundsViolation("ipv4 header length"))?;
        write_be16(data, layers.inner.offset + 10, sum);
    }
    if let Some(sum) = udp_checksum(data, layers, config)? {
        write_be16(data, layers.udp + 6, sum);
    }
    Ok(())
}

fn udp_checksum(
    data: &[u8],
    layers: &Layers,
    config: &ResponderConfig,
) -> Result<Option<u16>, ProcessError> {
    let datagram = &data[layers.udp..];
    let inner = &layers.inner;
    let src = inner.source_offset();
    let dst = inner.destination_offset();
    let sum = match inner.family {
        IpFamily::V6 => checksum::udp_ipv6(
            Ipv6Addr::from(octets16(&data[src..src + 16])),
            Ipv6Addr::from(octets16(&data[dst..dst + 16])),
            datagram,
        ),
        IpFamily::V4 if config.udp4_checksum == Udp4Checksum::Compute => checksum::udp_ipv4(
            Ipv4Addr::new(data[src], data[src + 1], data[src + 2], data[src + 3]),
            Ipv4Addr::new(data[dst], data[dst + 1], data[dst + 2], data[dst + 3]),
            datagram,
        ),
        IpFamily::V4 => return Ok(None),
    };
    sum.map(Some)
        .ok_or(ProcessError::BoundsViolation("datagram exceeds checksum ceiling"))
}

fn octets16(bytes: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(bytes);
    out
}

fn write_ip_length(data: &mut [u8], layer: &IpLayer, frame_len: usize) {
    match layer.family {
        IpFamily::V4 => write_be16(data, layer.offset + 2, (frame_len - layer.offset) as u16),
        IpFamily::V6 => write_be16(
            data,
            layer.offset + 4,
            (frame_len - layer.offset - layer.header_len) as u16,
        ),
    }
}

fn write_be16(data: &mut [u8], at: usize, value: u16) {
    data[at..at + 2].copy_from_slice(&value.to_be_bytes());
}

/// Exchanges source and destination at every layer: MACs, each IP header
/// present and the UDP ports. Applying it twice restores the frame.
pub fn swap_endpoints(data: &mut [u8], layers: &Layers) {
    swap_adjacent(data, 0, MAC_LEN);
    if let Some(outer) = layers.outer {
        swap_adjacent(data, outer.source_offset(), outer.address_len());
    }
    swap_adjacent(data, layers.inner.source_offset(), layers.inner.address_len());
    swap_adjacent(data, layers.udp, 2);
}

/// Swaps `data[at..at+len]` with the `len` bytes right after it.
fn swap_adjacent(data: &mut [u8], at: usize, len: usize) {
    let (first, second) = data[at..at + 2 * len].split_at_mut(len);
    first.swap_with_slice(second);
}
