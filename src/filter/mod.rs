//! Served destination prefixes. A frame is only decoded when its effective
//! destination falls inside one of these networks.

use arc_swap::ArcSwap;
use ipnetwork::{IpNetwork, IpNetworkError, Ipv4Network, Ipv6Network};
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;

/// Entries per family; lookups scan at most this many networks.
pub const MAX_PREFIXES: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrefixError {
    #[error("invalid prefix: {0}")]
    Invalid(#[from] IpNetworkError),
    #[error("prefix table full ({MAX_PREFIXES} entries)")]
    Full,
}

#[derive(Default, Clone)]
struct PrefixSnapshot {
    v4: Vec<Ipv4Network>,
    v6: Vec<Ipv6Network>,
}

/// Two longest-prefix-match sets, one per family. Entries are kept ordered
/// from most to least specific so the first hit is the longest match.
///
/// Lookups read the published snapshot lock-free. Writers serialize on
/// `writer` and swap in a rebuilt snapshot.
#[derive(Default)]
pub struct ServedPrefixes {
    snapshot: ArcSwap<PrefixSnapshot>,
    writer: Mutex<()>,
}

impl ServedPrefixes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `network` with its host bits cleared. Returns `false` when the
    /// same network was already present.
    pub fn insert(&self, network: IpNetwork) -> Result<bool, PrefixError> {
        let _guard = self.writer.lock();
        let mut next = PrefixSnapshot::clone(&self.snapshot.load());
        let added = match network {
            IpNetwork::V4(net) => {
                let net = Ipv4Network::new(net.network(), net.prefix())?;
                insert_sorted(&mut next.v4, net, |n| n.prefix())?
            }
            IpNetwork::V6(net) => {
                let net = Ipv6Network::new(net.network(), net.prefix())?;
                insert_sorted(&mut next.v6, net, |n| n.prefix())?
            }
        };
        if added {
            self.snapshot.store(Arc::new(next));
        }
        Ok(added)
    }

    pub fn insert_cidr(&self, cidr: &str) -> Result<bool, PrefixError> {
        let network: IpNetwork = cidr.trim().parse()?;
        self.insert(network)
    }

    pub fn remove(&self, network: IpNetwork) -> bool {
        let _guard = self.writer.lock();
        let mut next = PrefixSnapshot::clone(&self.snapshot.load());
        let removed = match network {
            IpNetwork::V4(net) => {
                let before = next.v4.len();
                next.v4
                    .retain(|n| !(n.network() == net.network() && n.prefix() == net.prefix()));
                next.v4.len() != before
            }
            IpNetwork::V6(net) => {
                let before = next.v6.len();
                next.v6
                    .retain(|n| !(n.network() == net.network() && n.prefix() == net.prefix()));
                next.v6.len() != before
            }
        };
        if removed {
            self.snapshot.store(Arc::new(next));
        }
        removed
    }

    /// Most specific served network containing `address`.
    pub fn longest_match(&self, address: IpAddr) -> Option<IpNetwork> {
        let snapshot = self.snapshot.load();
        match address {
            IpAddr::V4(addr) => snapshot
                .v4
                .iter()
                .take(MAX_PREFIXES)
                .find(|n| n.contains(addr))
                .map(|n| IpNetwork::V4(*n)),
            IpAddr::V6(addr) => snapshot
                .v6
                .iter()
                .take(MAX_PREFIXES)
                .find(|n| n.contains(addr))
                .map(|n| IpNetwork::V6(*n)),
        }
    }

    pub fn served(&self, address: IpAddr) -> bool {
        self.longest_match(address).is_some()
    }

    pub fn len(&self) -> usize {
        let snapshot = self.snapshot.load();
        snapshot.v4.len() + snapshot.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<IpNetwork> {
        let snapshot = self.snapshot.load();
        let mut out: Vec<IpNetwork> = snapshot.v4.iter().map(|n| IpNetwork::V4(*n)).collect();
        out.extend(snapshot.v6.iter().map(|n| IpNetwork::V6(*n)));
        out
    }
}

fn insert_sorted<N: PartialEq + Copy>(
    table: &mut Vec<N>,
    net: N,
    prefix: impl Fn(&N) -> u8,
) -> Result<bool, PrefixError> {
    if table.contains(&net) {
        return Ok(false);
    }
    if table.len() >= MAX_PREFIXES {
        return Err(PrefixError::Full);
    }
    let position = table
        .iter()
        .position(|existing| prefix(existing) < prefix(&net))
        .unwrap_or(table.len());
    table.insert(position, net);
    Ok(true)
}
