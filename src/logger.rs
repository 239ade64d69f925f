use crate::ffi::FastpathLogSink;
use bitflags::bitflags;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::ffi::{c_void, CString};
use std::os::raw::c_char;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

type LogCallback = unsafe extern "C" fn(
    level: *const c_char,
    message: *const c_char,
    breadcrumbs: u32,
    context: *mut c_void,
);

static LOGGER: Lazy<LogManager> = Lazy::new(LogManager::new);

pub fn warn(message: impl Into<String>) {
    LOGGER.log(LogLevel::Warn, message.into());
}

pub fn info(message: impl Into<String>) {
    LOGGER.log(LogLevel::Info, message.into());
}

pub fn breadcrumb(flag: BreadcrumbFlags, message: impl Into<String>) {
    LOGGER.breadcrumb(flag, message.into());
}

/// Whether a sink listens for `flag`. Lock-free, so the packet path can
/// skip formatting a breadcrumb nobody will read.
pub fn breadcrumbs_enabled(flag: BreadcrumbFlags) -> bool {
    LOGGER.active.load(Ordering::Relaxed) & flag.bits() != 0
}

pub fn install_sink(
    sink: Option<&FastpathLogSink>,
    level: Option<&str>,
) -> Result<(), &'static str> {
    LOGGER.install_sink(sink, level)
}

pub fn set_breadcrumb_mask(mask: u32) {
    LOGGER.set_breadcrumb_mask(mask);
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BreadcrumbFlags: u32 {
        const WALK    = 0b0000_0001;
        const FILTER  = 0b0000_0010;
        const DNS     = 0b0000_0100;
        const MATCH   = 0b0000_1000;
        const REWRITE = 0b0001_0000;
        const METRICS = 0b0010_0000;
        const FFI     = 0b0100_0000;
        const CAPTURE = 0b1000_0000;
        const ALL     = u32::MAX;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "error" | "err" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" | "dbg" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Clone, Copy)]
struct LogSinkInner {
    callback: LogCallback,
    context: *mut c_void,
    breadcrumbs: BreadcrumbFlags,
    min_level: LogLevel,
}

unsafe impl Send for LogSinkInner {}
unsafe impl Sync for LogSinkInner {}

struct LogManager {
    sink: Mutex<Option<LogSinkInner>>,
    /// Breadcrumb mask of the installed sink, zero without one.
    active: AtomicU32,
    prefix: String,
}

impl LogManager {
    fn new() -> Self {
        let pid = std::process::id();
        Self {
            sink: Mutex::new(None),
            active: AtomicU32::new(0),
            prefix: format!("[dnsfp-p{pid}]"),
        }
    }

    fn install_sink(
        &self,
        sink: Option<&FastpathLogSink>,
        level: Option<&str>,
    ) -> Result<(), &'static str> {
        let mut guard = self.sink.lock();
        if let Some(sink) = sink {
            let callback = match sink.log {
                Some(cb) => cb,
                None => return Err("log callback missing"),
            };
            let min_level = level.map(LogLevel::from_str).unwrap_or(LogLevel::Info);
            let breadcrumbs = BreadcrumbFlags::from_bits_truncate(sink.enabled_breadcrumbs);
            *guard = Some(LogSinkInner {
                callback,
                context: sink.context,
                breadcrumbs,
                min_level,
            });
            self.active.store(breadcrumbs.bits(), Ordering::Relaxed);
        } else {
            *guard = None;
            self.active.store(0, Ordering::Relaxed);
        }
        Ok(())
    }

    fn set_breadcrumb_mask(&self, mask: u32) {
        if let Some(inner) = self.sink.lock().as_mut() {
            inner.breadcrumbs = BreadcrumbFlags::from_bits_truncate(mask);
            self.active.store(inner.breadcrumbs.bits(), Ordering::Relaxed);
        }
    }

    fn log(&self, level: LogLevel, message: String) {
        if message.is_empty() {
            return;
        }
        self.dispatch(level, BreadcrumbFlags::empty(), message);
    }

    fn breadcrumb(&self, flag: BreadcrumbFlags, message: String) {
        if message.is_empty() || flag.is_empty() {
            return;
        }
        self.dispatch(LogLevel::Debug, flag, message);
    }

    fn dispatch(&self, level: LogLevel, breadcrumbs: BreadcrumbFlags, message: String) {
        let sink = {
            let guard = self.sink.lock();
            *guard
        };
        let Some(inner) = sink else { return };
        if level > inner.min_level && breadcrumbs.is_empty() {
            return;
        }
        if !breadcrumbs.is_empty() && !inner.breadcrumbs.intersects(breadcrumbs) {
            return;
        }

        let formatted = if !breadcrumbs.is_empty() {
            let label = label_for(breadcrumbs);
            format!("{} [{}] {}", self.prefix, label, message)
        } else {
            format!("{} {}", self.prefix, message)
        };

        let level_c = match CString::new(level.as_str()) {
            Ok(val) => val,
            Err(_) => return,
        };
        let msg_c = match CString::new(formatted) {
            Ok(val) => val,
            Err(_) => return,
        };
        unsafe {
            (inner.callback)(
                level_c.as_ptr(),
                msg_c.as_ptr(),
                breadcrumbs.bits(),
                inner.context,
            );
        }
    }
}

fn label_for(flags: BreadcrumbFlags) -> &'static str {
    const LABELS: [(BreadcrumbFlags, &str); 8] = [
        (BreadcrumbFlags::WALK, "WALK"),
        (BreadcrumbFlags::FILTER, "FILTER"),
        (BreadcrumbFlags::DNS, "DNS"),
        (BreadcrumbFlags::MATCH, "MATCH"),
        (BreadcrumbFlags::REWRITE, "REWRITE"),
        (BreadcrumbFlags::METRICS, "METRICS"),
        (BreadcrumbFlags::FFI, "FFI"),
        (BreadcrumbFlags::CAPTURE, "CAPTURE"),
    ];
    LABELS
        .iter()
        .find(|(flag, _)| flags.contains(*flag))
        .map(|(_, label)| *label)
        .unwrap_or("LOG")
}

// ============================================================================
// Rate-Limited Error Logging
// ============================================================================
// Errors raised per frame could flood the sink at line rate. Each category
// gets its own limiter so a noisy category cannot hide a quiet one.

/// Minimum interval between logs of the same error category (in milliseconds).
const RATE_LIMIT_INTERVAL_MS: u64 = 1000;

/// Error categories for rate-limited logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A rewrite step would leave the frame window or shrink the frame.
    BoundsViolation,
    /// The capture hook refused a frame.
    CaptureFailed,
    /// A record or prefix handed to the control plane was rejected.
    InvalidRecord,
    /// FFI/callback errors
    CallbackError,
}

impl ErrorCategory {
    fn index(self) -> usize {
        match self {
            Self::BoundsViolation => 0,
            Self::CaptureFailed => 1,
            Self::InvalidRecord => 2,
            Self::CallbackError => 3,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::BoundsViolation => "BOUNDS_VIOLATION",
            Self::CaptureFailed => "CAPTURE_FAILED",
            Self::InvalidRecord => "INVALID_RECORD",
            Self::CallbackError => "CALLBACK_ERROR",
        }
    }
}

/// Lock-free limiter keyed by category.
struct RateLimitedLogger {
    /// Last log time (unix millis) for each error category.
    last_log_times: [AtomicU64; 4],
}

impl RateLimitedLogger {
    const fn new() -> Self {
        Self {
            last_log_times: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
        }
    }

    /// Returns true if the log was emitted, false if rate-limited.
    fn try_log(&self, category: ErrorCategory, message: &str) -> bool {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let idx = category.index();
        let last = self.last_log_times[idx].load(Ordering::Relaxed);

        if now_ms.saturating_sub(last) < RATE_LIMIT_INTERVAL_MS {
            return false;
        }

        // Only the thread that wins the swap emits.
        if self.last_log_times[idx]
            .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            let formatted = format!("[{}] {}", category.label(), message);
            warn(formatted);
            true
        } else {
            false
        }
    }
}

static RATE_LIMITER: RateLimitedLogger = RateLimitedLogger::new();

/// Log an error with rate limiting to prevent log flooding.
/// Only one log per category per second will be emitted.
/// Returns true if the log was emitted, false if suppressed.
pub fn rate_limited_error(category: ErrorCategory, message: impl Into<String>) -> bool {
    RATE_LIMITER.try_log(category, &message.into())
}
