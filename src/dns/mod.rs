//! DNS wire helpers: the fixed header, the lookup key and the first-question
//! decoder.

use crate::error::ParseError;
use std::fmt;
use thiserror::Error;

pub const DNS_HEADER_LEN: usize = 12;
/// Capacity of the key's name buffer; the terminator must appear within it.
pub const QNAME_CAPACITY: usize = 48;
/// Longest name (wire bytes, terminator excluded) that can be decoded.
pub const MAX_NAME_LEN: usize = QNAME_CAPACITY - 1;
pub const MAX_LABEL_LEN: usize = 63;
/// Terminator + QTYPE + QCLASS.
pub const QUESTION_TRAILER_LEN: usize = 5;

pub const CLASS_IN: u16 = 1;
pub const TYPE_A: u16 = 1;
pub const TYPE_AAAA: u16 = 28;
pub const TYPE_OPT: u16 = 41;

pub const FLAG_QR: u16 = 0x8000;
pub const FLAG_OPCODE: u16 = 0x7800;
pub const FLAG_AA: u16 = 0x0400;
pub const FLAG_TC: u16 = 0x0200;
pub const FLAG_RD: u16 = 0x0100;
pub const FLAG_RA: u16 = 0x0080;
pub const FLAG_Z: u16 = 0x0040;
pub const FLAG_AD: u16 = 0x0020;
pub const FLAG_CD: u16 = 0x0010;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DnsHeader {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl DnsHeader {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < DNS_HEADER_LEN {
            return None;
        }
        let word = |at: usize| u16::from_be_bytes([bytes[at], bytes[at + 1]]);
        Some(Self {
            id: word(0),
            flags: word(2),
            qdcount: word(4),
            ancount: word(6),
            nscount: word(8),
            arcount: word(10),
        })
    }

    pub fn to_bytes(&self) -> [u8; DNS_HEADER_LEN] {
        let mut out = [0u8; DNS_HEADER_LEN];
        for (slot, value) in [
            self.id,
            self.flags,
            self.qdcount,
            self.ancount,
            self.nscount,
            self.arcount,
        ]
        .iter()
        .enumerate()
        {
            out[slot * 2..slot * 2 + 2].copy_from_slice(&value.to_be_bytes());
        }
        out
    }

    /// QR clear and OPCODE 0 (QUERY).
    pub fn is_standard_query(&self) -> bool {
        self.flags & (FLAG_QR | FLAG_OPCODE) == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Aaaa,
    Other(u16),
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            TYPE_A => RecordType::A,
            TYPE_AAAA => RecordType::Aaaa,
            other => RecordType::Other(other),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => TYPE_A,
            RecordType::Aaaa => TYPE_AAAA,
            RecordType::Other(other) => other,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => f.write_str("A"),
            RecordType::Aaaa => f.write_str("AAAA"),
            RecordType::Other(value) => write!(f, "TYPE{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("empty label in {0:?}")]
    EmptyLabel(String),
    #[error("label of {0} bytes exceeds {MAX_LABEL_LEN}")]
    LabelTooLong(usize),
    #[error("name of {0} wire bytes exceeds {MAX_NAME_LEN}")]
    NameTooLong(usize),
}

/// Lookup key: the question name exactly as the client sent it (length
/// prefixed labels, no terminator, zero padded) plus type and class.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub qtype: u16,
    pub qclass: u16,
    pub qname: [u8; QNAME_CAPACITY],
}

impl QueryKey {
    /// Packs a dotted name. A trailing dot is ignored; "." and "" give the
    /// root name.
    pub fn from_name(name: &str, qtype: RecordType) -> Result<Self, KeyError> {
        let mut qname = [0u8; QNAME_CAPACITY];
        let trimmed = name.strip_suffix('.').unwrap_or(name);
        let mut position = 0;
        if !trimmed.is_empty() {
            for label in trimmed.split('.') {
                if label.is_empty() {
                    return Err(KeyError::EmptyLabel(name.to_string()));
                }
                if label.len() > MAX_LABEL_LEN {
                    return Err(KeyError::LabelTooLong(label.len()));
                }
                let next = position + 1 + label.len();
                if next > MAX_NAME_LEN {
                    return Err(KeyError::NameTooLong(wire_len(trimmed)));
                }
                qname[position] = label.len() as u8;
                qname[position + 1..next].copy_from_slice(label.as_bytes());
                position = next;
            }
        }
        Ok(Self {
            qtype: qtype.into(),
            qclass: CLASS_IN,
            qname,
        })
    }

    pub fn record_type(&self) -> RecordType {
        RecordType::from(self.qtype)
    }

    /// Dotted form of the stored name. Stops at the first zero length byte
    /// or at a label running past the buffer.
    pub fn name(&self) -> String {
        let mut out = String::new();
        let mut position = 0;
        while position < QNAME_CAPACITY {
            let len = usize::from(self.qname[position]);
            if len == 0 || position + 1 + len > QNAME_CAPACITY {
                break;
            }
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(&String::from_utf8_lossy(
                &self.qname[position + 1..position + 1 + len],
            ));
            position += 1 + len;
        }
        if out.is_empty() {
            out.push('.');
        }
        out
    }
}

impl fmt::Debug for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryKey")
            .field("qname", &self.name())
            .field("qtype", &self.record_type())
            .field("qclass", &self.qclass)
            .finish()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), self.record_type())
    }
}

fn wire_len(dotted: &str) -> usize {
    dotted.split('.').map(|label| label.len() + 1).sum()
}

/// How the question name is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum QnamePolicy {
    /// Byte by byte until a zero byte, copying whatever it sees.
    #[default]
    BoundsAware = 0,
    /// Label by label using the length bytes; a length above 63 is invalid.
    LengthPrefixed = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedQuery {
    pub key: QueryKey,
    /// Name bytes + terminator + QTYPE + QCLASS.
    pub consumed: usize,
}

/// Decodes the first question starting at `start`; `data` ends at the
/// frame's parse end.
///
/// When fewer than five bytes follow the name, QTYPE/QCLASS default to
/// 0/IN and the consumed length is still reported as if they were present.
pub fn decode_query(
    data: &[u8],
    start: usize,
    policy: QnamePolicy,
) -> Result<DecodedQuery, ParseError> {
    let mut key = QueryKey {
        qtype: 0,
        qclass: CLASS_IN,
        qname: [0u8; QNAME_CAPACITY],
    };

    let name_len = match policy {
        QnamePolicy::BoundsAware => scan_bytes(data, start, &mut key.qname)?,
        QnamePolicy::LengthPrefixed => scan_labels(data, start, &mut key.qname)?,
    };

    let trailer = start + name_len;
    if let Some(bytes) = data.get(trailer..trailer + QUESTION_TRAILER_LEN) {
        key.qtype = u16::from_be_bytes([bytes[1], bytes[2]]);
        key.qclass = u16::from_be_bytes([bytes[3], bytes[4]]);
    }

    Ok(DecodedQuery {
        key,
        consumed: name_len + QUESTION_TRAILER_LEN,
    })
}

fn scan_bytes(
    data: &[u8],
    start: usize,
    qname: &mut [u8; QNAME_CAPACITY],
) -> Result<usize, ParseError> {
    for (index, slot) in qname.iter_mut().enumerate() {
        match data.get(start + index) {
            None => break,
            Some(0) => return Ok(index),
            Some(&byte) => *slot = byte,
        }
    }
    Err(ParseError::UnterminatedName)
}

fn scan_labels(
    data: &[u8],
    start: usize,
    qname: &mut [u8; QNAME_CAPACITY],
) -> Result<usize, ParseError> {
    let mut label_left = 0usize;
    for (index, slot) in qname.iter_mut().enumerate() {
        let Some(&byte) = data.get(start + index) else {
            break;
        };
        if label_left == 0 {
            if byte == 0 {
                return Ok(index);
            }
            if usize::from(byte) > MAX_LABEL_LEN {
                return Err(ParseError::InvalidLabel(byte));
            }
            label_left = usize::from(byte);
        } else {
            label_left -= 1;
        }
        *slot = byte;
    }
    Err(ParseError::UnterminatedName)
}

/// Whether the record right after the question is an OPT pseudo-record
/// (root owner name, TYPE 41) that fits inside `data`.
pub fn opt_follows_question(data: &[u8], at: usize) -> bool {
    match data.get(at..at + OPT_RECORD_LEN) {
        Some(record) => record[0] == 0 && u16::from_be_bytes([record[1], record[2]]) == TYPE_OPT,
        None => false,
    }
}

/// Root name, TYPE, CLASS (payload size), TTL (ext-rcode, version, flags)
/// and RDLENGTH with no options.
pub const OPT_RECORD_LEN: usize = 11;
