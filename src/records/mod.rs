//! Record tables and the matcher that turns a decoded key into an answer.

use crate::dns::{QueryKey, RecordType};
use crate::error::ProcessError;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ARecord {
    pub address: Ipv4Addr,
    pub ttl: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AaaaRecord {
    pub address: Ipv6Addr,
    pub ttl: u32,
}

/// Read side of the record store. Lookups hand back copies.
pub trait RecordStore: Send + Sync {
    fn get_a(&self, key: &QueryKey) -> Option<ARecord>;
    fn get_aaaa(&self, key: &QueryKey) -> Option<AaaaRecord>;
}

/// In-process store. Each record type lives in an immutable map published
/// through an `ArcSwap`; lookups load the current snapshot without taking a
/// lock. Writers are serialized on `writer`, copy the map, change the copy
/// and swap it in, so a lookup never waits on an administrative write.
#[derive(Default)]
pub struct RecordTable {
    a: ArcSwap<FxHashMap<QueryKey, ARecord>>,
    aaaa: ArcSwap<FxHashMap<QueryKey, AaaaRecord>>,
    writer: Mutex<()>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any previous A record for `key`'s name.
    pub fn insert_a(&self, key: QueryKey, record: ARecord) -> Option<ARecord> {
        let _guard = self.writer.lock();
        update(&self.a, |map| map.insert(key, record))
    }

    pub fn insert_aaaa(&self, key: QueryKey, record: AaaaRecord) -> Option<AaaaRecord> {
        let _guard = self.writer.lock();
        update(&self.aaaa, |map| map.insert(key, record))
    }

    /// Removes the entry for `key` from the table its type selects.
    pub fn remove(&self, key: &QueryKey) -> bool {
        let _guard = self.writer.lock();
        match key.record_type() {
            RecordType::A => update(&self.a, |map| map.remove(key)).is_some(),
            RecordType::Aaaa => update(&self.aaaa, |map| map.remove(key)).is_some(),
            RecordType::Other(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.a.load().len() + self.aaaa.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let _guard = self.writer.lock();
        self.a.store(Arc::default());
        self.aaaa.store(Arc::default());
    }
}

/// Copies the published map, applies `change` and publishes the copy.
/// Callers hold the writer lock.
fn update<V: Clone, R>(
    slot: &ArcSwap<FxHashMap<QueryKey, V>>,
    change: impl FnOnce(&mut FxHashMap<QueryKey, V>) -> R,
) -> R {
    let mut next: FxHashMap<QueryKey, V> = (**slot.load()).clone();
    let result = change(&mut next);
    slot.store(Arc::new(next));
    result
}

impl RecordStore for RecordTable {
    fn get_a(&self, key: &QueryKey) -> Option<ARecord> {
        self.a.load().get(key).copied()
    }

    fn get_aaaa(&self, key: &QueryKey) -> Option<AaaaRecord> {
        self.aaaa.load().get(key).copied()
    }
}

/// Matched record with its TTL already adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    A { address: Ipv4Addr, ttl: u32 },
    Aaaa { address: Ipv6Addr, ttl: u32 },
}

impl Answer {
    pub fn ttl(&self) -> u32 {
        match self {
            Answer::A { ttl, .. } | Answer::Aaaa { ttl, .. } => *ttl,
        }
    }
}

/// With `random` set, maps `ttl` into `[ttl/2, ttl/2 + ttl/2)` keyed by the
/// request id. TTLs below 2 have no such window and pass through.
pub fn effective_ttl(ttl: u32, request_id: u16, random: bool) -> u32 {
    if !random || ttl < 2 {
        return ttl;
    }
    let half = ttl / 2;
    u32::from(request_id) % half + half
}

/// Looks the key up in the table its QTYPE selects.
pub fn match_record(
    store: &dyn RecordStore,
    key: &QueryKey,
    request_id: u16,
    random_ttl: bool,
) -> Result<Answer, ProcessError> {
    match key.record_type() {
        RecordType::A => store
            .get_a(key)
            .map(|record| Answer::A {
                address: record.address,
                ttl: effective_ttl(record.ttl, request_id, random_ttl),
            })
            .ok_or(ProcessError::RecordNotFound),
        RecordType::Aaaa => store
            .get_aaaa(key)
            .map(|record| Answer::Aaaa {
                address: record.address,
                ttl: effective_ttl(record.ttl, request_id, random_ttl),
            })
            .ok_or(ProcessError::RecordNotFound),
        RecordType::Other(qtype) => Err(ProcessError::UnsupportedType(qtype)),
    }
}

#[cfg(test)]
mod tests;
