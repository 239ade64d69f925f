//! Answer synthesis into a fixed scratch buffer, plus the response header.

use crate::config::ResponseFlags;
use crate::dns::{
    DnsHeader, CLASS_IN, FLAG_AA, FLAG_AD, FLAG_CD, FLAG_QR, FLAG_RA, FLAG_TC, FLAG_Z,
    OPT_RECORD_LEN, TYPE_A, TYPE_AAAA, TYPE_OPT,
};
use crate::error::ProcessError;
use crate::records::Answer;

pub const SCRATCH_CAPACITY: usize = 128;
/// Compression pointer to offset 12, where the only question's name sits.
pub const NAME_POINTER: u16 = 0xC00C;
/// Pointer, TYPE, CLASS, TTL and RDLENGTH.
pub const ANSWER_FIXED_LEN: usize = 12;

pub const A_RESPONSE_LEN: usize = ANSWER_FIXED_LEN + 4;
pub const AAAA_RESPONSE_LEN: usize = ANSWER_FIXED_LEN + 16;
pub const A_WITH_OPT_LEN: usize = A_RESPONSE_LEN + OPT_RECORD_LEN;
pub const AAAA_WITH_OPT_LEN: usize = AAAA_RESPONSE_LEN + OPT_RECORD_LEN;

const RCODE_MASK: u16 = 0x000F;

/// Per-frame staging area for the answer bytes. Lives on the stack and is
/// only copied into the frame by the rewriter.
pub struct ScratchBuffer {
    bytes: [u8; SCRATCH_CAPACITY],
    len: usize,
}

impl Default for ScratchBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScratchBuffer {
    pub fn new() -> Self {
        Self {
            bytes: [0u8; SCRATCH_CAPACITY],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    fn push(&mut self, data: &[u8]) -> Result<(), ProcessError> {
        let end = self.len + data.len();
        let slot = self
            .bytes
            .get_mut(self.len..end)
            .ok_or(ProcessError::BoundsViolation("scratch buffer full"))?;
        slot.copy_from_slice(data);
        self.len = end;
        Ok(())
    }
}

/// Header of the response to `request`.
///
/// QR is set; TC, AD and CD are cleared since nothing is truncated or
/// validated; RD is echoed. Exactly one question and one answer are
/// announced, with one additional record only when an OPT is appended.
pub fn response_header(request: &DnsHeader, flags: ResponseFlags, with_opt: bool) -> DnsHeader {
    let mut bits = (request.flags | FLAG_QR) & !(FLAG_TC | FLAG_AD | FLAG_CD | RCODE_MASK);
    if flags.contains(ResponseFlags::MARK_RESERVED) {
        bits |= FLAG_Z;
    }
    if flags.contains(ResponseFlags::AUTHORITATIVE) {
        bits = (bits | FLAG_AA) & !FLAG_RA;
    }
    if flags.contains(ResponseFlags::RECURSION_AVAILABLE) {
        bits = (bits | FLAG_RA) & !FLAG_AA;
    }
    DnsHeader {
        id: request.id,
        flags: bits,
        qdcount: 1,
        ancount: 1,
        nscount: 0,
        arcount: u16::from(with_opt),
    }
}

#[derive(Default)]
pub struct Synthesis {
    pub header: DnsHeader,
    pub scratch: ScratchBuffer,
}

/// Builds the answer record for `answer` and, when `opt_payload_size` is
/// given, an OPT record advertising it.
pub fn synthesize(
    request: &DnsHeader,
    answer: &Answer,
    opt_payload_size: Option<u16>,
    flags: ResponseFlags,
) -> Result<Synthesis, ProcessError> {
    let mut scratch = ScratchBuffer::new();
    scratch.push(&NAME_POINTER.to_be_bytes())?;
    match answer {
        Answer::A { address, ttl } => {
            scratch.push(&TYPE_A.to_be_bytes())?;
            scratch.push(&CLASS_IN.to_be_bytes())?;
            scratch.push(&ttl.to_be_bytes())?;
            scratch.push(&4u16.to_be_bytes())?;
            scratch.push(&address.octets())?;
        }
        Answer::Aaaa { address, ttl } => {
            scratch.push(&TYPE_AAAA.to_be_bytes())?;
            scratch.push(&CLASS_IN.to_be_bytes())?;
            scratch.push(&ttl.to_be_bytes())?;
            scratch.push(&16u16.to_be_bytes())?;
            scratch.push(&address.octets())?;
        }
    }
    if let Some(payload_size) = opt_payload_size {
        scratch.push(&[0])?;
        scratch.push(&TYPE_OPT.to_be_bytes())?;
        scratch.push(&payload_size.to_be_bytes())?;
        scratch.push(&[0, 0, 0, 0])?;
        scratch.push(&[0, 0])?;
    }
    Ok(Synthesis {
        header: response_header(request, flags, opt_payload_size.is_some()),
        scratch,
    })
}
