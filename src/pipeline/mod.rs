//! Per-frame orchestration: walk, filter, decode, match, synthesize and
//! rewrite, with every received frame accounted in exactly one outcome.

use crate::capture::CaptureHook;
use crate::config::{ResponderConfig, RuntimeConfig, RuntimeOption};
use crate::dns::{decode_query, opt_follows_question, DnsHeader, DNS_HEADER_LEN};
use crate::error::{ParseError, ProcessError};
use crate::filter::ServedPrefixes;
use crate::frame::{Dns, Frame, FrameError};
use crate::logger::{self, BreadcrumbFlags, ErrorCategory};
use crate::metrics::{Metrics, Outcome};
use crate::records::{match_record, RecordStore};
use crate::response::synthesize;
use crate::rewrite::rewrite;
use crate::walker::walk;
use std::sync::Arc;
use std::time::Instant;

/// Decision handed back to the datapath. Discriminants are the C ABI values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Action {
    /// Let the regular network stack have the frame.
    Pass = 0,
    /// Send the rewritten frame back out of the receiving interface.
    Transmit = 1,
}

enum Verdict {
    Transmit,
    /// Matched, but the runtime table asked for no mutation.
    DryRun,
}

pub struct Pipeline {
    config: ResponderConfig,
    records: Arc<dyn RecordStore>,
    prefixes: Arc<ServedPrefixes>,
    runtime: Arc<RuntimeConfig>,
    metrics: Arc<Metrics>,
    capture: Option<Arc<dyn CaptureHook>>,
}

impl Pipeline {
    pub fn new(
        config: ResponderConfig,
        records: Arc<dyn RecordStore>,
        prefixes: Arc<ServedPrefixes>,
    ) -> Self {
        Self {
            config,
            records,
            prefixes,
            runtime: Arc::new(RuntimeConfig::new()),
            metrics: Arc::new(Metrics::new()),
            capture: None,
        }
    }

    pub fn with_runtime(mut self, runtime: Arc<RuntimeConfig>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_capture(mut self, hook: Arc<dyn CaptureHook>) -> Self {
        self.capture = Some(hook);
        self
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    pub fn prefixes(&self) -> &Arc<ServedPrefixes> {
        &self.prefixes
    }

    pub fn runtime(&self) -> &Arc<RuntimeConfig> {
        &self.runtime
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Runs one frame to a decision. On [`Action::Pass`] the frame is
    /// byte-identical to what was handed in.
    pub fn process(&self, frame: &mut Frame<'_>) -> Action {
        let started = Instant::now();
        let mut received = false;
        let result = self.respond(frame, &mut received);
        let action = self.account(result, received, started);
        if action == Action::Transmit {
            self.capture(frame);
        }
        action
    }

    fn respond(&self, frame: &mut Frame<'_>, received: &mut bool) -> Result<Verdict, ProcessError> {
        let data = frame.as_slice();
        let (layers, mut cursor) = walk(data, self.config.dns_port)?;

        let destination = layers.destination(data);
        if !self.prefixes.served(destination) {
            return Err(ProcessError::NotServed);
        }

        let view = cursor.read_header::<Dns>(data)?;
        let request = DnsHeader::parse(view.bytes).ok_or(FrameError::OutOfBounds {
            offset: view.offset,
            size: DNS_HEADER_LEN,
            end: cursor.end(),
        })?;
        *received = true;
        if self.config.metrics_enabled {
            self.metrics.increment(Outcome::Received);
        }

        if !request.is_standard_query() {
            return Err(ParseError::NotQuery.into());
        }
        if request.qdcount == 0 {
            return Err(ParseError::MissingQuestion.into());
        }

        let query = decode_query(data, cursor.position(), self.config.qname_policy)?;
        cursor.query_length = query.consumed;
        if logger::breadcrumbs_enabled(BreadcrumbFlags::DNS) {
            logger::breadcrumb(
                BreadcrumbFlags::DNS,
                format!("query id={} {} to {}", request.id, query.key, destination),
            );
        }

        let answer = match_record(
            self.records.as_ref(),
            &query.key,
            request.id,
            self.config.random_ttl,
        )?;

        if self
            .runtime
            .get_bool(RuntimeOption::DryRun, self.config.dry_run)
        {
            return Ok(Verdict::DryRun);
        }

        let echo_opt = self.config.edns_echo
            && request.arcount > 0
            && opt_follows_question(data, cursor.position() + query.consumed);
        let synthesis = synthesize(
            &request,
            &answer,
            echo_opt.then_some(self.config.edns_udp_payload_size),
            self.config.response_flags,
        )?;
        cursor.response_length = synthesis.scratch.len();

        rewrite(frame, &layers, &synthesis, cursor.query_length, &self.config)?;
        if logger::breadcrumbs_enabled(BreadcrumbFlags::REWRITE) {
            logger::breadcrumb(
                BreadcrumbFlags::REWRITE,
                format!(
                    "answered id={} ttl={} with {} bytes, frame now {}",
                    request.id,
                    answer.ttl(),
                    cursor.response_length,
                    frame.len()
                ),
            );
        }
        Ok(Verdict::Transmit)
    }

    fn account(
        &self,
        result: Result<Verdict, ProcessError>,
        received: bool,
        started: Instant,
    ) -> Action {
        let counting = self.config.metrics_enabled;
        let action = match result {
            Ok(Verdict::Transmit) => {
                if counting {
                    self.metrics.increment(Outcome::Transmitted);
                }
                Action::Transmit
            }
            Ok(Verdict::DryRun) => {
                if counting {
                    self.metrics.increment(Outcome::Transmitted);
                }
                Action::Pass
            }
            Err(err) => {
                if counting && err.counts_as_passed() {
                    self.metrics.increment(Outcome::Passed);
                }
                if err.counts_as_error() {
                    if counting {
                        self.metrics.increment(Outcome::Errored);
                    }
                    logger::rate_limited_error(ErrorCategory::BoundsViolation, err.to_string());
                }
                let flag = breadcrumb_for(&err);
                if logger::breadcrumbs_enabled(flag) {
                    logger::breadcrumb(flag, format!("pass: {err}"));
                }
                Action::Pass
            }
        };
        if counting && received {
            let elapsed = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
            self.metrics.observe_latency(elapsed);
        }
        action
    }

    fn capture(&self, frame: &Frame<'_>) {
        if !self.config.capture_enabled {
            return;
        }
        let Some(hook) = self.capture.as_ref() else {
            return;
        };
        if let Err(err) = hook.capture(Action::Transmit, frame.as_slice()) {
            logger::rate_limited_error(ErrorCategory::CaptureFailed, err.to_string());
        } else if logger::breadcrumbs_enabled(BreadcrumbFlags::CAPTURE) {
            logger::breadcrumb(BreadcrumbFlags::CAPTURE, format!("captured {} bytes", frame.len()));
        }
    }
}

fn breadcrumb_for(err: &ProcessError) -> BreadcrumbFlags {
    match err {
        ProcessError::Parse(
            ParseError::NotQuery
            | ParseError::MissingQuestion
            | ParseError::UnterminatedName
            | ParseError::InvalidLabel(_),
        ) => BreadcrumbFlags::DNS,
        ProcessError::Parse(_) | ProcessError::UnsupportedEncapsulation(_) => BreadcrumbFlags::WALK,
        ProcessError::NotServed => BreadcrumbFlags::FILTER,
        ProcessError::UnsupportedType(_) | ProcessError::RecordNotFound => BreadcrumbFlags::MATCH,
        ProcessError::BoundsViolation(_) => BreadcrumbFlags::REWRITE,
    }
}
