//! Error taxonomy shared by the walker, the query decoder and the pipeline.

use crate::frame::FrameError;
use thiserror::Error;

/// Reasons a frame could not be parsed far enough to be answered.
///
/// None of these are failures of the engine: every variant resolves to a
/// pass-through so the general network stack gets to see the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("truncated frame: {0}")]
    Truncated(#[from] FrameError),
    #[error("unsupported ethertype 0x{0:04x}")]
    UnsupportedEthertype(u16),
    #[error("malformed IPv4 header")]
    MalformedIpv4Header,
    #[error("malformed IPv6 header")]
    MalformedIpv6Header,
    #[error("IPv4 fragment")]
    Fragmented,
    #[error("transport protocol {0} is not UDP")]
    NotUdp(u8),
    #[error("UDP destination port {0} is not the DNS port")]
    NotDnsPort(u16),
    #[error("not a standard query")]
    NotQuery,
    #[error("query carries no question")]
    MissingQuestion,
    #[error("query name has no terminator within the supported length")]
    UnterminatedName,
    #[error("invalid label length {0}")]
    InvalidLabel(u8),
}

impl ParseError {
    /// Returns a brief description for logging.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Truncated(_) => "truncated frame",
            Self::UnsupportedEthertype(_) => "unsupported ethertype",
            Self::MalformedIpv4Header => "malformed IPv4 header",
            Self::MalformedIpv6Header => "malformed IPv6 header",
            Self::Fragmented => "IPv4 fragment",
            Self::NotUdp(_) => "not UDP",
            Self::NotDnsPort(_) => "not DNS port",
            Self::NotQuery => "not a standard query",
            Self::MissingQuestion => "missing question",
            Self::UnterminatedName => "unterminated name",
            Self::InvalidLabel(_) => "invalid label",
        }
    }
}

/// Outcome of a frame that did not end in a transmit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("parse failure: {0}")]
    Parse(#[from] ParseError),
    #[error("unsupported encapsulation: {0}")]
    UnsupportedEncapsulation(&'static str),
    #[error("destination is not a served prefix")]
    NotServed,
    #[error("unsupported query type {0}")]
    UnsupportedType(u16),
    #[error("no record matches the query")]
    RecordNotFound,
    #[error("bounds violation: {0}")]
    BoundsViolation(&'static str),
}

impl From<FrameError> for ProcessError {
    fn from(error: FrameError) -> Self {
        Self::Parse(ParseError::Truncated(error))
    }
}

impl ProcessError {
    /// Whether the frame is accounted in the "passed" counter.
    pub fn counts_as_passed(&self) -> bool {
        matches!(self, Self::RecordNotFound)
    }

    /// Whether the frame is accounted in the "errored" counter.
    pub fn counts_as_error(&self) -> bool {
        matches!(self, Self::BoundsViolation(_))
    }
}
