//! Fixed memory window holding one frame, and the bounds-checked cursor every
//! parse step goes through.
//!
//! A [`Frame`] never reallocates. Its bytes live in a caller-provided window;
//! the frame may give up bytes at its head (decapsulation) and may grow into
//! the tailroom, but an already-written region is never truncated.

use std::marker::PhantomData;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("{size} byte read at offset {offset} passes end {end}")]
    OutOfBounds {
        offset: usize,
        size: usize,
        end: usize,
    },
    #[error("growing by {requested} bytes exceeds tailroom of {available}")]
    NoTailroom { requested: usize, available: usize },
    #[error("cannot advance head by {by} bytes in a {len} byte frame")]
    HeadOverrun { by: usize, len: usize },
    #[error("frame [{head}, {head}+{len}) does not fit a {capacity} byte window")]
    InvalidWindow {
        head: usize,
        len: usize,
        capacity: usize,
    },
}

/// Address family of an IP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

pub struct Frame<'a> {
    window: &'a mut [u8],
    head: usize,
    tail: usize,
}

impl<'a> Frame<'a> {
    /// Frame occupying the first `len` bytes of `window`.
    pub fn new(window: &'a mut [u8], len: usize) -> Result<Self, FrameError> {
        Self::with_headroom(window, 0, len)
    }

    pub fn with_headroom(window: &'a mut [u8], head: usize, len: usize) -> Result<Self, FrameError> {
        let capacity = window.len();
        match head.checked_add(len) {
            Some(tail) if tail <= capacity => Ok(Self { window, head, tail }),
            _ => Err(FrameError::InvalidWindow {
                head,
                len,
                capacity,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.tail - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.tail == self.head
    }

    /// Offset of the first frame byte inside the window.
    pub fn head(&self) -> usize {
        self.head
    }

    pub fn tailroom(&self) -> usize {
        self.window.len() - self.tail
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.window[self.head..self.tail]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.window[self.head..self.tail]
    }

    /// Grows the frame by `by` zeroed bytes taken from the tailroom. This is
    /// the only way a frame gets longer.
    pub fn extend_tail(&mut self, by: usize) -> Result<(), FrameError> {
        let available = self.tailroom();
        if by > available {
            return Err(FrameError::NoTailroom {
                requested: by,
                available,
            });
        }
        let new_tail = self.tail + by;
        self.window[self.tail..new_tail].fill(0);
        self.tail = new_tail;
        Ok(())
    }

    /// Drops `by` bytes from the front of the frame (they become headroom).
    pub fn advance_head(&mut self, by: usize) -> Result<(), FrameError> {
        let len = self.len();
        if by > len {
            return Err(FrameError::HeadOverrun { by, len });
        }
        self.head += by;
        Ok(())
    }
}

/// Fixed-size protocol header consumed by [`Cursor::read_header`].
pub trait Header {
    const LEN: usize;
}

pub struct Ethernet;
pub struct VlanTag;
pub struct Ipv4;
pub struct Ipv6;
pub struct Udp;
pub struct Dns;

impl Header for Ethernet {
    const LEN: usize = 14;
}

impl Header for VlanTag {
    const LEN: usize = 4;
}

impl Header for Ipv4 {
    const LEN: usize = 20;
}

impl Header for Ipv6 {
    const LEN: usize = 40;
}

impl Header for Udp {
    const LEN: usize = 8;
}

impl Header for Dns {
    const LEN: usize = 12;
}

/// Borrowed view of one header inside the frame. Holds the offset so later
/// stages can address the same bytes mutably.
pub struct View<'d, H> {
    pub offset: usize,
    pub bytes: &'d [u8],
    _header: PhantomData<H>,
}

impl<H: Header> View<'_, H> {
    pub fn end(&self) -> usize {
        self.offset + H::LEN
    }

    pub fn be16(&self, at: usize) -> u16 {
        u16::from_be_bytes([self.bytes[at], self.bytes[at + 1]])
    }
}

/// Sequential reader over `[position, end)` of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    position: usize,
    end: usize,
    /// Outer family when the payload arrived inside IP-in-IP.
    pub encap: Option<IpFamily>,
    /// Family of the IP layer carrying the DNS datagram.
    pub payload: Option<IpFamily>,
    /// Bytes of QNAME + terminator + QTYPE + QCLASS.
    pub query_length: usize,
    /// Bytes synthesized into the scratch buffer.
    pub response_length: usize,
}

impl Cursor {
    pub fn new(data: &[u8]) -> Self {
        Self {
            position: 0,
            end: data.len(),
            encap: None,
            payload: None,
            query_length: 0,
            response_length: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn remaining(&self) -> usize {
        self.end - self.position
    }

    /// Consumes `H::LEN` bytes, failing without moving if they pass `end`.
    pub fn read_header<'d, H: Header>(&mut self, data: &'d [u8]) -> Result<View<'d, H>, FrameError> {
        let offset = self.position;
        let bytes = self.take(data, H::LEN)?;
        Ok(View {
            offset,
            bytes,
            _header: PhantomData,
        })
    }

    /// Consumes `size` bytes without interpreting them (IPv4 options).
    pub fn skip(&mut self, data: &[u8], size: usize) -> Result<(), FrameError> {
        self.take(data, size).map(|_| ())
    }

    fn take<'d>(&mut self, data: &'d [u8], size: usize) -> Result<&'d [u8], FrameError> {
        let out_of_bounds = FrameError::OutOfBounds {
            offset: self.position,
            size,
            end: self.end,
        };
        let stop = self.position.checked_add(size).ok_or(out_of_bounds)?;
        if stop > self.end {
            return Err(out_of_bounds);
        }
        let bytes = data.get(self.position..stop).ok_or(out_of_bounds)?;
        self.position = stop;
        Ok(bytes)
    }
}
