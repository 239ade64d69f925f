//! Responder configuration: static settings fixed at construction and the
//! small runtime option table that may change between frames.

use crate::dns::QnamePolicy;
use bitflags::bitflags;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

bitflags! {
    /// Header bits applied to every synthesized response.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ResponseFlags: u32 {
        /// AA=1, RA=0.
        const AUTHORITATIVE       = 0b0001;
        /// AA=0, RA=1. Wins over AUTHORITATIVE when both are set.
        const RECURSION_AVAILABLE = 0b0010;
        /// Sets the reserved Z bit so responses from this engine stand out.
        const MARK_RESERVED       = 0b0100;
    }
}

/// UDP checksum policy for responses carried over IPv4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Udp4Checksum {
    /// Zero, meaning "no checksum" on IPv4.
    #[default]
    Zero,
    Compute,
}

/// Destination of the outer IPv6 header when answering IPv4-in-IPv6.
///
/// Deployments behind an IPv6 load balancer that tunnels IPv4 queries use
/// `Endpoint`: answers leave through the balancer's decapsulation address
/// instead of going back to the tunnel source. `Reflect` suits a plain
/// point-to-point tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TunnelReturn {
    /// Swap outer source and destination like every other layer.
    #[default]
    Reflect,
    /// Swap, then send to this fixed decapsulation endpoint.
    Endpoint(Ipv6Addr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponderConfig {
    pub response_flags: ResponseFlags,
    pub random_ttl: bool,
    pub metrics_enabled: bool,
    pub capture_enabled: bool,
    /// Value of [`RuntimeOption::DryRun`] while its slot is unset.
    pub dry_run: bool,
    /// Append an OPT record when the request carried one.
    pub edns_echo: bool,
    pub qname_policy: QnamePolicy,
    pub dns_port: u16,
    pub udp4_checksum: Udp4Checksum,
    pub tunnel_return: TunnelReturn,
    pub edns_udp_payload_size: u16,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            response_flags: ResponseFlags::empty(),
            random_ttl: false,
            metrics_enabled: true,
            capture_enabled: true,
            dry_run: false,
            edns_echo: false,
            qname_policy: QnamePolicy::BoundsAware,
            dns_port: 53,
            udp4_checksum: Udp4Checksum::Zero,
            tunnel_return: TunnelReturn::Reflect,
            edns_udp_payload_size: 512,
        }
    }
}

pub const RUNTIME_SLOTS: usize = 16;
/// Slot value meaning "fall back to the static default".
pub const UNSET: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RuntimeOption {
    DryRun = 0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("runtime option id {0} out of range")]
    UnknownOption(u32),
}

/// Option-id to value table read once per frame and written out of band.
pub struct RuntimeConfig {
    slots: [AtomicU32; RUNTIME_SLOTS],
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicU32::new(UNSET)),
        }
    }

    pub fn set(&self, option: RuntimeOption, value: u32) {
        self.slots[option as usize].store(value, Ordering::Relaxed);
    }

    pub fn set_bool(&self, option: RuntimeOption, value: bool) {
        self.set(option, u32::from(value));
    }

    /// Stores `value` under a raw id as received over the C ABI.
    pub fn set_raw(&self, id: u32, value: u32) -> Result<(), ConfigError> {
        let slot = self
            .slots
            .get(id as usize)
            .ok_or(ConfigError::UnknownOption(id))?;
        slot.store(value, Ordering::Relaxed);
        Ok(())
    }

    pub fn clear(&self, option: RuntimeOption) {
        self.set(option, UNSET);
    }

    pub fn get(&self, option: RuntimeOption) -> Option<u32> {
        match self.slots[option as usize].load(Ordering::Relaxed) {
            UNSET => None,
            value => Some(value),
        }
    }

    /// Non-zero is true; an unset slot yields `default`.
    pub fn get_bool(&self, option: RuntimeOption, default: bool) -> bool {
        self.get(option).map_or(default, |value| value != 0)
    }
}
