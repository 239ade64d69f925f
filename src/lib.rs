#![deny(unsafe_op_in_unsafe_fn)]

pub mod capture;
pub mod checksum;
pub mod config;
pub mod dns;
pub mod error;
pub mod ffi;
pub mod filter;
pub mod frame;
pub mod logger;
pub mod metrics;
pub mod pipeline;
pub mod records;
pub mod response;
pub mod rewrite;
pub mod walker;

#[cfg(test)]
mod testutil;

use crate::capture::CaptureHook;
use crate::config::{ResponderConfig, RuntimeConfig};
use crate::dns::{KeyError, QueryKey, RecordType, TYPE_A, TYPE_AAAA};
use crate::ffi::{FastpathConfig, FastpathLogSink, FastpathMetrics};
use crate::filter::{PrefixError, ServedPrefixes};
use crate::frame::{Frame, FrameError};
use crate::logger::{BreadcrumbFlags, ErrorCategory};
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{Action, Pipeline};
use crate::records::{ARecord, AaaaRecord, RecordStore, RecordTable};
use std::ffi::CStr;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::os::raw::c_char;
use std::ptr::NonNull;
use std::slice;
use std::sync::Arc;

/// Opaque responder handle shared with the host datapath.
///
/// Owns the record tables, served prefixes, runtime options and metrics.
/// Every method takes `&self`, so one handle serves any number of packet
/// threads while a control thread administers it.
pub struct Fastpath {
    pipeline: Pipeline,
    records: Arc<RecordTable>,
}

impl Fastpath {
    pub fn new(config: ResponderConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_capture(config: ResponderConfig, hook: Arc<dyn CaptureHook>) -> Self {
        Self::build(config, Some(hook))
    }

    fn build(config: ResponderConfig, hook: Option<Arc<dyn CaptureHook>>) -> Self {
        let records = Arc::new(RecordTable::new());
        let store: Arc<dyn RecordStore> = Arc::clone(&records) as Arc<dyn RecordStore>;
        let mut pipeline = Pipeline::new(config, store, Arc::new(ServedPrefixes::new()));
        if let Some(hook) = hook {
            pipeline = pipeline.with_capture(hook);
        }

        logger::info(format!(
            "dns-fastpath ready (port={}, policy={:?}, dry_run={}, tunnel_return={:?})",
            config.dns_port, config.qname_policy, config.dry_run, config.tunnel_return
        ));
        Self { pipeline, records }
    }

    pub fn config(&self) -> &ResponderConfig {
        self.pipeline.config()
    }

    pub fn records(&self) -> &RecordTable {
        &self.records
    }

    pub fn prefixes(&self) -> &ServedPrefixes {
        self.pipeline.prefixes()
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        self.pipeline.runtime()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.pipeline.metrics().snapshot()
    }

    pub fn reset_metrics(&self) {
        let metrics = self.pipeline.metrics();
        if logger::breadcrumbs_enabled(BreadcrumbFlags::METRICS) {
            let before = metrics.snapshot();
            logger::breadcrumb(
                BreadcrumbFlags::METRICS,
                format!(
                    "metrics reset (received={}, transmitted={}, passed={}, errored={})",
                    before.received, before.transmitted, before.passed, before.errored
                ),
            );
        }
        metrics.reset();
    }

    pub fn insert_a(&self, name: &str, address: Ipv4Addr, ttl: u32) -> Result<(), KeyError> {
        let key = QueryKey::from_name(name, RecordType::A)?;
        self.records.insert_a(key, ARecord { address, ttl });
        Ok(())
    }

    pub fn insert_aaaa(&self, name: &str, address: Ipv6Addr, ttl: u32) -> Result<(), KeyError> {
        let key = QueryKey::from_name(name, RecordType::Aaaa)?;
        self.records.insert_aaaa(key, AaaaRecord { address, ttl });
        Ok(())
    }

    pub fn remove_record(&self, name: &str, record_type: RecordType) -> Result<bool, KeyError> {
        let key = QueryKey::from_name(name, record_type)?;
        Ok(self.records.remove(&key))
    }

    pub fn serve(&self, cidr: &str) -> Result<bool, PrefixError> {
        self.prefixes().insert_cidr(cidr)
    }

    pub fn process(&self, frame: &mut Frame<'_>) -> Action {
        self.pipeline.process(frame)
    }

    /// Processes the frame at `[*head, *head + *len)` of `window` and
    /// writes back where it ended up.
    pub fn process_window(
        &self,
        window: &mut [u8],
        head: &mut usize,
        len: &mut usize,
    ) -> Result<Action, FrameError> {
        let mut frame = Frame::with_headroom(window, *head, *len)?;
        let action = self.pipeline.process(&mut frame);
        *head = frame.head();
        *len = frame.len();
        Ok(action)
    }
}

unsafe fn str_arg<'a>(value: *const c_char) -> Option<&'a str> {
    if value.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(value) }.to_str().ok()
}

#[no_mangle]
pub unsafe extern "C" fn FastpathNew(config: *const FastpathConfig) -> *mut Fastpath {
    let config = if let Some(cfg) = NonNull::new(config as *mut FastpathConfig) {
        unsafe { *cfg.as_ptr() }
    } else {
        logger::breadcrumb(BreadcrumbFlags::FFI, "FastpathNew without config, using defaults");
        FastpathConfig::default()
    };
    Box::into_raw(Box::new(Fastpath::new(config.into())))
}

#[no_mangle]
pub unsafe extern "C" fn FastpathFree(fastpath: *mut Fastpath) {
    if let Some(fastpath) = NonNull::new(fastpath) {
        logger::breadcrumb(BreadcrumbFlags::FFI, "FastpathFree");
        unsafe {
            drop(Box::from_raw(fastpath.as_ptr()));
        }
    }
}

/// Returns 0 (pass) or 1 (transmit). On transmit `*head_in_out` and
/// `*len_in_out` describe the response inside `window`. Negative values
/// report bad arguments and leave the frame untouched.
#[no_mangle]
pub unsafe extern "C" fn FastpathProcessFrame(
    fastpath: *mut Fastpath,
    window: *mut u8,
    capacity: usize,
    head_in_out: *mut usize,
    len_in_out: *mut usize,
) -> i32 {
    let Some(fastpath) = NonNull::new(fastpath) else {
        return -1;
    };
    if window.is_null() || capacity == 0 {
        return -2;
    }
    let (Some(head), Some(len)) = (unsafe { head_in_out.as_mut() }, unsafe { len_in_out.as_mut() })
    else {
        return -3;
    };
    // Safety: caller guarantees `window` points to `capacity` writable bytes
    // that nobody else touches for the duration of the call.
    let window = unsafe { slice::from_raw_parts_mut(window, capacity) };
    match unsafe { fastpath.as_ref() }.process_window(window, head, len) {
        Ok(action) => action as i32,
        Err(error) => {
            logger::rate_limited_error(
                ErrorCategory::CallbackError,
                format!("FastpathProcessFrame rejected window: {error}"),
            );
            -4
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn FastpathInsertA(
    fastpath: *mut Fastpath,
    name: *const c_char,
    address: *const u8,
    ttl: u32,
) -> bool {
    let Some(fastpath) = NonNull::new(fastpath) else {
        return false;
    };
    let Some(name) = (unsafe { str_arg(name) }) else {
        return false;
    };
    if address.is_null() {
        return false;
    }
    let mut octets = [0u8; 4];
    let len = octets.len();
    octets.copy_from_slice(unsafe { slice::from_raw_parts(address, len) });
    match unsafe { fastpath.as_ref() }.insert_a(name, Ipv4Addr::from(octets), ttl) {
        Ok(()) => true,
        Err(error) => {
            logger::rate_limited_error(ErrorCategory::InvalidRecord, format!("{name}: {error}"));
            false
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn FastpathInsertAaaa(
    fastpath: *mut Fastpath,
    name: *const c_char,
    address: *const u8,
    ttl: u32,
) -> bool {
    let Some(fastpath) = NonNull::new(fastpath) else {
        return false;
    };
    let Some(name) = (unsafe { str_arg(name) }) else {
        return false;
    };
    if address.is_null() {
        return false;
    }
    let mut octets = [0u8; 16];
    let len = octets.len();
    octets.copy_from_slice(unsafe { slice::from_raw_parts(address, len) });
    match unsafe { fastpath.as_ref() }.insert_aaaa(name, Ipv6Addr::from(octets), ttl) {
        Ok(()) => true,
        Err(error) => {
            logger::rate_limited_error(ErrorCategory::InvalidRecord, format!("{name}: {error}"));
            false
        }
    }
}

/// `qtype` is the DNS wire value (1 for A, 28 for AAAA).
#[no_mangle]
pub unsafe extern "C" fn FastpathRemoveRecord(
    fastpath: *mut Fastpath,
    name: *const c_char,
    qtype: u16,
) -> bool {
    let Some(fastpath) = NonNull::new(fastpath) else {
        return false;
    };
    let Some(name) = (unsafe { str_arg(name) }) else {
        return false;
    };
    if qtype != TYPE_A && qtype != TYPE_AAAA {
        return false;
    }
    unsafe { fastpath.as_ref() }
        .remove_record(name, RecordType::from(qtype))
        .unwrap_or(false)
}

#[no_mangle]
pub unsafe extern "C" fn FastpathAddServedPrefix(
    fastpath: *mut Fastpath,
    cidr: *const c_char,
) -> bool {
    let Some(fastpath) = NonNull::new(fastpath) else {
        return false;
    };
    let Some(cidr) = (unsafe { str_arg(cidr) }) else {
        return false;
    };
    match unsafe { fastpath.as_ref() }.serve(cidr) {
        Ok(_) => true,
        Err(error) => {
            logger::rate_limited_error(ErrorCategory::InvalidRecord, format!("{cidr}: {error}"));
            false
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn FastpathSetRuntimeOption(
    fastpath: *mut Fastpath,
    option: u32,
    value: u32,
) -> bool {
    let Some(fastpath) = NonNull::new(fastpath) else {
        return false;
    };
    unsafe { fastpath.as_ref() }
        .runtime()
        .set_raw(option, value)
        .is_ok()
}

#[no_mangle]
pub unsafe extern "C" fn FastpathCopyMetrics(
    fastpath: *mut Fastpath,
    out: *mut FastpathMetrics,
) -> bool {
    let Some(fastpath) = NonNull::new(fastpath) else {
        return false;
    };
    let Some(out) = (unsafe { out.as_mut() }) else {
        return false;
    };
    *out = unsafe { fastpath.as_ref() }.metrics().into();
    true
}

#[no_mangle]
pub unsafe extern "C" fn FastpathResetMetrics(fastpath: *mut Fastpath) {
    if let Some(fastpath) = NonNull::new(fastpath) {
        unsafe { fastpath.as_ref() }.reset_metrics();
    }
}

#[no_mangle]
pub unsafe extern "C" fn FastpathSetLogSink(
    sink: *const FastpathLogSink,
    level: *const c_char,
) -> bool {
    let sink_ref = unsafe { sink.as_ref() };
    let level_str = unsafe { str_arg(level) };
    crate::logger::install_sink(sink_ref, level_str).is_ok()
}

#[no_mangle]
pub extern "C" fn FastpathSetBreadcrumbMask(mask: u32) {
    crate::logger::set_breadcrumb_mask(mask);
}

#[cfg(test)]
mod tests;
