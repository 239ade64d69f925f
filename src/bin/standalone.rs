use anyhow::Context;
use crossbeam_channel::{bounded, unbounded};
use dns_fastpath::config::ResponseFlags;
use dns_fastpath::dns::{TYPE_A, TYPE_AAAA};
use dns_fastpath::ffi::{FastpathConfig, FastpathLogSink, FastpathMetrics};
use dns_fastpath::{
    FastpathAddServedPrefix, FastpathCopyMetrics, FastpathFree, FastpathInsertA,
    FastpathInsertAaaa, FastpathNew, FastpathProcessFrame, FastpathSetBreadcrumbMask,
    FastpathSetLogSink,
};
use std::env;
use std::ffi::{c_char, c_void, CStr, CString};
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::ptr;
use std::thread;

/// Spare bytes after each frame for the appended answer.
const TAILROOM: usize = 256;

#[derive(Clone, Copy)]
struct FastpathHandle(*mut dns_fastpath::Fastpath);

impl FastpathHandle {
    fn as_ptr(self) -> *mut dns_fastpath::Fastpath {
        self.0
    }
}

unsafe impl Send for FastpathHandle {}
unsafe impl Sync for FastpathHandle {}

fn main() -> anyhow::Result<()> {
    let settings = Settings::parse()?;
    install_log_sink(settings.verbose)?;

    let config = FastpathConfig {
        response_flags: if settings.authoritative {
            ResponseFlags::AUTHORITATIVE.bits()
        } else {
            0
        },
        random_ttl: settings.random_ttl,
        dry_run: settings.dry_run,
        edns_echo: settings.edns,
        ..FastpathConfig::default()
    };
    let handle = FastpathHandle(unsafe { FastpathNew(&config) });
    if handle.as_ptr().is_null() {
        anyhow::bail!("FastpathNew returned null");
    }

    let result = run(handle, &settings);
    unsafe {
        FastpathFree(handle.as_ptr());
    }
    result
}

fn run(handle: FastpathHandle, settings: &Settings) -> anyhow::Result<()> {
    for cidr in &settings.serve {
        let c_cidr = CString::new(cidr.as_str())?;
        if !unsafe { FastpathAddServedPrefix(handle.as_ptr(), c_cidr.as_ptr()) } {
            anyhow::bail!("invalid served prefix {cidr}");
        }
    }

    let records = fs::read_to_string(&settings.records)
        .with_context(|| format!("reading {}", settings.records))?;
    let loaded = load_records(handle, &records)?;
    eprintln!(
        "[standalone] loaded {loaded} records, serving {} prefixes",
        settings.serve.len()
    );

    let frames_text = fs::read_to_string(&settings.frames)
        .with_context(|| format!("reading {}", settings.frames))?;
    let frames = parse_frames(&frames_text)?;

    let (job_tx, job_rx) = bounded::<(usize, Vec<u8>)>(settings.workers * 4);
    let (out_tx, out_rx) = unbounded::<(usize, i32, Vec<u8>)>();
    let workers: Vec<_> = (0..settings.workers)
        .map(|index| {
            let job_rx = job_rx.clone();
            let out_tx = out_tx.clone();
            thread::Builder::new()
                .name(format!("fastpath-{index}"))
                .spawn(move || {
                    for (position, frame) in job_rx {
                        let (status, bytes) = process(handle, &frame);
                        if out_tx.send((position, status, bytes)).is_err() {
                            break;
                        }
                    }
                })
        })
        .collect::<Result<_, _>>()?;
    drop(job_rx);
    drop(out_tx);

    let total = frames.len();
    for job in frames.into_iter().enumerate() {
        job_tx.send(job)?;
    }
    drop(job_tx);

    let mut results: Vec<_> = out_rx.iter().collect();
    for worker in workers {
        worker
            .join()
            .map_err(|_| anyhow::anyhow!("worker thread panicked"))?;
    }
    results.sort_by_key(|(position, _, _)| *position);
    if results.len() != total {
        anyhow::bail!("processed {} of {total} frames", results.len());
    }

    for (position, status, bytes) in &results {
        let action = match status {
            0 => "pass",
            1 => "transmit",
            _ => "invalid",
        };
        println!("{position} {action} {} {}", bytes.len(), hex::encode(bytes));
    }

    let mut metrics = FastpathMetrics::default();
    if unsafe { FastpathCopyMetrics(handle.as_ptr(), &mut metrics) } {
        let mean = metrics.time_sum_ns.checked_div(metrics.time_count).unwrap_or(0);
        println!(
            "metrics received={} transmitted={} passed={} errored={} min_ns={} max_ns={} mean_ns={}",
            metrics.received,
            metrics.transmitted,
            metrics.passed,
            metrics.errored,
            metrics.time_min_ns,
            metrics.time_max_ns,
            mean
        );
    }
    Ok(())
}

fn process(handle: FastpathHandle, frame: &[u8]) -> (i32, Vec<u8>) {
    let mut window = vec![0u8; frame.len() + TAILROOM];
    window[..frame.len()].copy_from_slice(frame);
    let (mut head, mut len) = (0usize, frame.len());
    let status = unsafe {
        FastpathProcessFrame(
            handle.as_ptr(),
            window.as_mut_ptr(),
            window.len(),
            &mut head,
            &mut len,
        )
    };
    (status, window[head..head + len].to_vec())
}

/// `<name> <ttl> IN <A|AAAA> <address>` per line; `#` starts a comment.
fn load_records(handle: FastpathHandle, text: &str) -> anyhow::Result<usize> {
    let mut loaded = 0;
    for (number, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [name, ttl, class, kind, address] = fields[..] else {
            anyhow::bail!("line {}: expected 5 fields, got {}", number + 1, fields.len());
        };
        if !class.eq_ignore_ascii_case("IN") {
            anyhow::bail!("line {}: unsupported class {class}", number + 1);
        }
        let ttl: u32 = ttl
            .parse()
            .with_context(|| format!("line {}: invalid ttl", number + 1))?;
        let c_name = CString::new(name)?;
        let inserted = match kind.to_ascii_uppercase().parse::<RecordKind>()? {
            RecordKind::A => {
                let address: Ipv4Addr = address
                    .parse()
                    .with_context(|| format!("line {}: invalid IPv4 address", number + 1))?;
                unsafe {
                    FastpathInsertA(handle.as_ptr(), c_name.as_ptr(), address.octets().as_ptr(), ttl)
                }
            }
            RecordKind::Aaaa => {
                let address: Ipv6Addr = address
                    .parse()
                    .with_context(|| format!("line {}: invalid IPv6 address", number + 1))?;
                unsafe {
                    FastpathInsertAaaa(
                        handle.as_ptr(),
                        c_name.as_ptr(),
                        address.octets().as_ptr(),
                        ttl,
                    )
                }
            }
        };
        if !inserted {
            anyhow::bail!("line {}: rejected record {name}", number + 1);
        }
        loaded += 1;
    }
    Ok(loaded)
}

enum RecordKind {
    A,
    Aaaa,
}

impl std::str::FromStr for RecordKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "A" => Ok(Self::A),
            "AAAA" => Ok(Self::Aaaa),
            other => anyhow::bail!(
                "unsupported record type {other} (only {TYPE_A}/A and {TYPE_AAAA}/AAAA)"
            ),
        }
    }
}

fn parse_frames(text: &str) -> anyhow::Result<Vec<Vec<u8>>> {
    text.lines()
        .enumerate()
        .map(|(number, line)| (number, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(number, line)| {
            decode_hex(line).with_context(|| format!("frame on line {}", number + 1))
        })
        .collect()
}

fn decode_hex(text: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    hex::decode(&digits).context("invalid hex frame")
}

#[derive(Debug)]
struct Settings {
    records: String,
    frames: String,
    serve: Vec<String>,
    workers: usize,
    dry_run: bool,
    random_ttl: bool,
    authoritative: bool,
    edns: bool,
    verbose: bool,
}

impl Settings {
    fn parse() -> anyhow::Result<Self> {
        let mut records = None;
        let mut frames = None;
        let mut serve = Vec::new();
        let mut workers = 1usize;
        let mut dry_run = false;
        let mut random_ttl = false;
        let mut authoritative = false;
        let mut edns = false;
        let mut verbose = false;
        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--records" => {
                    records = Some(
                        args.next()
                            .ok_or_else(|| anyhow::anyhow!("--records requires a value"))?,
                    );
                }
                "--frames" => {
                    frames = Some(
                        args.next()
                            .ok_or_else(|| anyhow::anyhow!("--frames requires a value"))?,
                    );
                }
                "--serve" => {
                    serve.push(
                        args.next()
                            .ok_or_else(|| anyhow::anyhow!("--serve requires a value"))?,
                    );
                }
                "--workers" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--workers requires a value"))?;
                    workers = value
                        .parse()
                        .map_err(|_| anyhow::anyhow!("invalid worker count"))?;
                    if workers == 0 {
                        anyhow::bail!("--workers must be at least 1");
                    }
                }
                "--dry-run" => dry_run = true,
                "--random-ttl" => random_ttl = true,
                "--authoritative" => authoritative = true,
                "--edns" => edns = true,
                "--verbose" => verbose = true,
                other => {
                    anyhow::bail!(
                        "unknown argument {other}. usage: standalone --records FILE --serve CIDR \
                         [--serve CIDR ..] --frames FILE [--workers N] [--dry-run] \
                         [--random-ttl] [--authoritative] [--edns] [--verbose]"
                    );
                }
            }
        }
        Ok(Self {
            records: records.ok_or_else(|| anyhow::anyhow!("--records is required"))?,
            frames: frames.ok_or_else(|| anyhow::anyhow!("--frames is required"))?,
            serve,
            workers,
            dry_run,
            random_ttl,
            authoritative,
            edns,
            verbose,
        })
    }
}

fn install_log_sink(verbose: bool) -> anyhow::Result<()> {
    unsafe extern "C" fn log_sink(
        level: *const c_char,
        message: *const c_char,
        _breadcrumbs: u32,
        _context: *mut c_void,
    ) {
        if message.is_null() {
            return;
        }
        let entry = unsafe { CStr::from_ptr(message) }.to_string_lossy();
        let level = if level.is_null() {
            "info".into()
        } else {
            unsafe { CStr::from_ptr(level) }.to_string_lossy()
        };
        eprintln!("[fastpath][{level}] {entry}");
    }

    let sink = FastpathLogSink {
        log: Some(log_sink),
        context: ptr::null_mut(),
        enabled_breadcrumbs: if verbose { u32::MAX } else { 0 },
    };
    let level = CString::new(if verbose { "debug" } else { "warn" })?;
    if !unsafe { FastpathSetLogSink(&sink, level.as_ptr()) } {
        anyhow::bail!("FastpathSetLogSink rejected the sink");
    }
    FastpathSetBreadcrumbMask(sink.enabled_breadcrumbs);
    Ok(())
}
