//! Frame codec and the byte-by-byte frame assembler.

use heapless::Vec;

use crate::{ProtocolError, HOST_MAX_PAYLOAD};

/// Two byte header `[marker, length]` for `payload`.
pub fn encode_header(marker: u8, payload: &[u8]) -> Result<[u8; 2], ProtocolError> {
    if payload.len() > HOST_MAX_PAYLOAD {
        return Err(ProtocolError::PayloadTooLong(payload.len()));
    }
    Ok([marker, payload.len() as u8])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitMarker,
    AwaitLength,
    AwaitPayload { remaining: u8 },
}

/// What the assembler did with the last byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Still hunting for a marker, the byte was dropped.
    Idle,
    /// Inside a frame, more bytes are needed.
    InFrame,
    /// A whole frame is assembled, see [`FrameAssembler::payload`].
    Complete,
}

/// Assembles frames opened by `marker`, keeping at most `N` payload bytes.
///
/// Bytes seen while waiting for the marker are discarded, which is the only
/// resynchronization mechanism the protocol has. Payload bytes beyond `N` are
/// still consumed so the stream stays aligned on frame boundaries.
#[derive(Debug)]
pub struct FrameAssembler<const N: usize> {
    marker: u8,
    state: State,
    payload: Vec<u8, N>,
}

impl<const N: usize> FrameAssembler<N> {
    pub const fn new(marker: u8) -> Self {
        Self {
            marker,
            state: State::AwaitMarker,
            payload: Vec::new(),
        }
    }

    pub fn push(&mut self, byte: u8) -> Progress {
        match self.state {
            State::AwaitMarker => {
                if byte != self.marker {
                    return Progress::Idle;
                }
                self.payload.clear();
                self.state = State::AwaitLength;
                Progress::InFrame
            }
            State::AwaitLength => {
                if byte == 0 {
                    self.state = State::AwaitMarker;
                    return Progress::Complete;
                }
                self.state = State::AwaitPayload { remaining: byte };
                Progress::InFrame
            }
            State::AwaitPayload { remaining } => {
                // overflow is dropped
                let _ = self.payload.push(byte);
                if remaining == 1 {
                    self.state = State::AwaitMarker;
                    Progress::Complete
                } else {
                    self.state = State::AwaitPayload {
                        remaining: remaining - 1,
                    };
                    Progress::InFrame
                }
            }
        }
    }

    /// True once a marker has been seen and the frame is not complete yet.
    pub fn in_frame(&self) -> bool {
        self.state != State::AwaitMarker
    }

    /// Payload of the last completed frame.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn reset(&mut self) {
        self.state = State::AwaitMarker;
        self.payload.clear();
    }
}
