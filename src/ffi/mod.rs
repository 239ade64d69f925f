use crate::config::{ResponderConfig, ResponseFlags, TunnelReturn, Udp4Checksum};
use crate::dns::QnamePolicy;
use crate::metrics::{MetricsSnapshot, HISTOGRAM_BUCKETS};
use std::ffi::{c_char, c_void};
use std::net::Ipv6Addr;

/// Mirror of `ResponderConfig` for C callers; declared in `include/dns_fastpath.h`.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct FastpathConfig {
    /// Bitwise OR of the `ResponseFlags` bits.
    pub response_flags: u32,
    pub random_ttl: bool,
    pub metrics_enabled: bool,
    pub capture_enabled: bool,
    pub dry_run: bool,
    pub edns_echo: bool,
    /// 0 walks bytes to the terminator, 1 walks length-prefixed labels.
    pub qname_policy: u32,
    pub dns_port: u16,
    pub edns_udp_payload_size: u16,
    /// Compute the UDP checksum on IPv4 instead of sending zero.
    pub udp4_checksum: bool,
    /// When set, IPv4-in-IPv6 answers go to `tunnel_endpoint`.
    pub tunnel_endpoint_enabled: bool,
    pub tunnel_endpoint: [u8; 16],
}

impl Default for FastpathConfig {
    fn default() -> Self {
        Self::from(ResponderConfig::default())
    }
}

impl From<ResponderConfig> for FastpathConfig {
    fn from(config: ResponderConfig) -> Self {
        let (tunnel_endpoint_enabled, tunnel_endpoint) = match config.tunnel_return {
            TunnelReturn::Reflect => (false, [0; 16]),
            TunnelReturn::Endpoint(address) => (true, address.octets()),
        };
        Self {
            response_flags: config.response_flags.bits(),
            random_ttl: config.random_ttl,
            metrics_enabled: config.metrics_enabled,
            capture_enabled: config.capture_enabled,
            dry_run: config.dry_run,
            edns_echo: config.edns_echo,
            qname_policy: config.qname_policy as u32,
            dns_port: config.dns_port,
            edns_udp_payload_size: config.edns_udp_payload_size,
            udp4_checksum: config.udp4_checksum == Udp4Checksum::Compute,
            tunnel_endpoint_enabled,
            tunnel_endpoint,
        }
    }
}

impl From<FastpathConfig> for ResponderConfig {
    fn from(config: FastpathConfig) -> Self {
        Self {
            response_flags: ResponseFlags::from_bits_truncate(config.response_flags),
            random_ttl: config.random_ttl,
            metrics_enabled: config.metrics_enabled,
            capture_enabled: config.capture_enabled,
            dry_run: config.dry_run,
            edns_echo: config.edns_echo,
            qname_policy: match config.qname_policy {
                1 => QnamePolicy::LengthPrefixed,
                _ => QnamePolicy::BoundsAware,
            },
            dns_port: config.dns_port,
            udp4_checksum: if config.udp4_checksum {
                Udp4Checksum::Compute
            } else {
                Udp4Checksum::Zero
            },
            tunnel_return: if config.tunnel_endpoint_enabled {
                TunnelReturn::Endpoint(Ipv6Addr::from(config.tunnel_endpoint))
            } else {
                TunnelReturn::Reflect
            },
            edns_udp_payload_size: config.edns_udp_payload_size,
        }
    }
}

#[repr(C)]
pub struct FastpathLogSink {
    pub log: Option<
        unsafe extern "C" fn(
            level: *const c_char,
            message: *const c_char,
            breadcrumbs: u32,
            context: *mut c_void,
        ),
    >,
    pub context: *mut c_void,
    pub enabled_breadcrumbs: u32,
}

/// Outcome counters and latency aggregates, merged across shards.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct FastpathMetrics {
    pub received: u64,
    pub transmitted: u64,
    pub passed: u64,
    pub errored: u64,
    pub time_min_ns: u64,
    pub time_max_ns: u64,
    pub time_sum_ns: u64,
    pub time_count: u64,
    /// Bucket `i` counts frames that took `[2^i, 2^(i+1))` nanoseconds.
    pub histogram: [u64; HISTOGRAM_BUCKETS],
}

impl Default for FastpathMetrics {
    fn default() -> Self {
        Self::from(MetricsSnapshot::default())
    }
}

impl From<MetricsSnapshot> for FastpathMetrics {
    fn from(snapshot: MetricsSnapshot) -> Self {
        Self {
            received: snapshot.received,
            transmitted: snapshot.transmitted,
            passed: snapshot.passed,
            errored: snapshot.errored,
            time_min_ns: snapshot.time_min,
            time_max_ns: snapshot.time_max,
            time_sum_ns: snapshot.time_sum,
            time_count: snapshot.time_count,
            histogram: snapshot.histogram,
        }
    }
}
