//! Request/response transport with timeouts and whole-frame resends.

use std::io;
use std::time::Duration;

use log::debug;
use powerstrip::{encode_header, FrameAssembler, Progress, ACK_MARKER, HOST_MAX_PAYLOAD, START_MARKER};
use thiserror::Error;

use crate::link::Link;

/// Per byte receive timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
/// Sends of one request before giving up, the first one included.
pub const DEFAULT_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send to client invalid message length {0}")]
    InvalidLength(usize),
    /// The link refused a write, nothing sensible can be retried.
    #[error("send: {0}")]
    Write(#[source] io::Error),
    #[error("recv: {0}")]
    Receive(#[source] io::Error),
    #[error("can not reach client")]
    Unreachable { attempts: u32 },
}

impl TransportError {
    /// The session cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::InvalidLength(_))
    }
}

pub struct Transport<L> {
    link: L,
    timeout: Duration,
    attempts: u32,
    assembler: FrameAssembler<HOST_MAX_PAYLOAD>,
    /// Resend numbers not yet reported to the console.
    retries: Vec<u32>,
}

impl<L: Link> Transport<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            timeout: DEFAULT_TIMEOUT,
            attempts: DEFAULT_ATTEMPTS,
            assembler: FrameAssembler::new(ACK_MARKER),
            retries: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Sends `payload` framed and waits for the device's reply payload.
    ///
    /// A timeout anywhere in the reply resends the whole request.
    pub fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        if payload.is_empty() {
            return Err(TransportError::InvalidLength(0));
        }
        let header = encode_header(START_MARKER, payload)
            .map_err(|_| TransportError::InvalidLength(payload.len()))?;

        for attempt in 0..self.attempts {
            if attempt > 0 {
                debug!("resend, attempt {}", attempt + 1);
                self.retries.push(attempt);
            }
            self.link.send(&header).map_err(TransportError::Write)?;
            self.link.send(payload).map_err(TransportError::Write)?;
            if let Some(reply) = self.receive()? {
                return Ok(reply);
            }
        }
        Err(TransportError::Unreachable {
            attempts: self.attempts,
        })
    }

    fn receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        self.assembler.reset();
        loop {
            let byte = match self
                .link
                .recv_byte(self.timeout)
                .map_err(TransportError::Receive)?
            {
                Some(byte) => byte,
                None => {
                    debug!("reply timed out, in frame: {}", self.assembler.in_frame());
                    return Ok(None);
                }
            };
            if self.assembler.push(byte) == Progress::Complete {
                return Ok(Some(self.assembler.payload().to_vec()));
            }
        }
    }

    /// Resends made since the last call, numbered from 1 per request.
    pub fn take_retries(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.retries)
    }

    /// Drops whatever is pending on the link, returns the number of bytes.
    pub fn flush(&mut self, timeout: Duration) -> Result<usize, TransportError> {
        let mut count = 0;
        while self
            .link
            .recv_byte(timeout)
            .map_err(TransportError::Receive)?
            .is_some()
        {
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Link replaying canned bytes and recording everything sent.
    #[derive(Default)]
    pub(crate) struct ScriptedLink {
        pub rx: VecDeque<u8>,
        pub sent: Vec<Vec<u8>>,
        pub fail_writes: bool,
        /// Receive calls that time out before `rx` is served.
        pub silences: u32,
    }

    impl ScriptedLink {
        pub fn replying(bytes: &[u8]) -> Self {
            Self {
                rx: bytes.iter().copied().collect(),
                ..Default::default()
            }
        }
    }

    impl Link for ScriptedLink {
        fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
            if self.fail_writes {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            self.sent.push(bytes.to_vec());
            Ok(())
        }

        fn recv_byte(&mut self, _timeout: Duration) -> io::Result<Option<u8>> {
            if self.silences > 0 {
                self.silences -= 1;
                return Ok(None);
            }
            Ok(self.rx.pop_front())
        }
    }

    #[test]
    fn request_is_sent_as_header_then_payload() {
        let mut transport = Transport::new(ScriptedLink::replying(&[ACK_MARKER, 0]));
        let reply = transport.send(&[28]).unwrap();
        assert!(reply.is_empty());
        assert_eq!(transport.link().sent, vec![vec![START_MARKER, 1], vec![28]]);
    }

    #[test]
    fn noise_before_the_ack_is_ignored() {
        let mut transport = Transport::new(ScriptedLink::replying(&[b'*', b'H', ACK_MARKER, 2, 5, 6]));
        assert_eq!(transport.send(&[28]).unwrap(), vec![5, 6]);
    }

    #[test]
    fn silent_device_gets_exactly_five_sends() {
        let mut transport = Transport::new(ScriptedLink::default());
        let err = transport.send(&[29, 0, 1]).unwrap_err();
        assert!(matches!(err, TransportError::Unreachable { attempts: 5 }));
        assert!(err.is_fatal());
        let sent = &transport.link().sent;
        assert_eq!(sent.len(), 10);
        assert!(sent.chunks(2).all(|c| c[0] == [START_MARKER, 3] && c[1] == [29, 0, 1]));
        assert_eq!(transport.take_retries(), vec![1, 2, 3, 4]);
        assert!(transport.take_retries().is_empty());
    }

    #[test]
    fn reply_cut_short_is_retried() {
        // the reply announces three bytes but only one arrives
        let link = ScriptedLink::replying(&[ACK_MARKER, 3, 9]);
        let mut transport = Transport::new(link).with_attempts(2);
        let err = transport.send(&[28]).unwrap_err();
        assert!(matches!(err, TransportError::Unreachable { attempts: 2 }));
        assert_eq!(transport.link().sent.len(), 4);
    }

    #[test]
    fn write_failure_is_not_retried() {
        let link = ScriptedLink {
            fail_writes: true,
            ..Default::default()
        };
        let mut transport = Transport::new(link);
        assert!(matches!(
            transport.send(&[28]),
            Err(TransportError::Write(_))
        ));
    }

    #[test]
    fn length_is_checked_before_sending() {
        let mut transport = Transport::new(ScriptedLink::default());
        assert!(matches!(
            transport.send(&[]),
            Err(TransportError::InvalidLength(0))
        ));
        assert!(matches!(
            transport.send(&[0u8; 256]),
            Err(TransportError::InvalidLength(256))
        ));
        assert!(transport.link().sent.is_empty());
    }

    #[test]
    fn flush_counts_stray_bytes() {
        let mut transport = Transport::new(ScriptedLink::replying(b"*HELLO*"));
        assert_eq!(transport.flush(Duration::ZERO).unwrap(), 7);
        assert_eq!(transport.flush(Duration::ZERO).unwrap(), 0);
    }
}
