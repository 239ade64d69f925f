//! Optional out-of-band observer of transmitted frames.

use crate::pipeline::Action;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("capture queue full")]
    Full,
    #[error("capture receiver disconnected")]
    Disconnected,
}

/// Receives the decision and the final frame bytes after a transmit. A
/// failing hook never changes the decision.
pub trait CaptureHook: Send + Sync {
    fn capture(&self, action: Action, frame: &[u8]) -> Result<(), CaptureError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub action: Action,
    pub bytes: Vec<u8>,
}

/// Copies captured frames into a bounded channel without blocking the
/// packet path.
pub struct ChannelCapture {
    tx: Sender<CapturedFrame>,
}

impl ChannelCapture {
    pub fn new(capacity: usize) -> (Self, Receiver<CapturedFrame>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }
}

impl CaptureHook for ChannelCapture {
    fn capture(&self, action: Action, frame: &[u8]) -> Result<(), CaptureError> {
        let captured = CapturedFrame {
            action,
            bytes: frame.to_vec(),
        };
        self.tx.try_send(captured).map_err(|err| match err {
            TrySendError::Full(_) => CaptureError::Full,
            TrySendError::Disconnected(_) => CaptureError::Disconnected,
        })
    }
}
