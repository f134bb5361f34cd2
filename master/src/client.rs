//! Typed commands on top of the [`Transport`].

use std::time::Duration;

use log::info;
use powerstrip::command::{ENERGY_REPLY_LEN, STATUS_REPLY_LEN};
use powerstrip::{Command, EnergyReply, ProtocolError, StatusReply};
use thiserror::Error;

use crate::link::Link;
use crate::transport::{Transport, TransportError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed reply: {0}")]
    Malformed(ProtocolError),
    #[error("reply of {got} bytes, expected {expected}")]
    ShortReply { got: usize, expected: usize },
}

impl ClientError {
    pub fn is_fatal(&self) -> bool {
        match self {
            ClientError::Transport(err) => err.is_fatal(),
            _ => false,
        }
    }
}

pub struct Client<L> {
    transport: Transport<L>,
}

impl<L: Link> Client<L> {
    pub fn new(transport: Transport<L>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Transport<L> {
        &self.transport
    }

    pub fn take_retries(&mut self) -> Vec<u32> {
        self.transport.take_retries()
    }

    fn request(&mut self, cmd: Command) -> Result<Vec<u8>, ClientError> {
        let payload = cmd.encode().map_err(ClientError::Malformed)?;
        info!("request {:?}", cmd);
        Ok(self.transport.send(&payload)?)
    }

    /// Switches socket `socket` (0 based).
    pub fn toggle_socket(&mut self, socket: u8, on: bool) -> Result<(), ClientError> {
        self.request(Command::ToggleSocket { socket, on })?;
        Ok(())
    }

    pub fn status(&mut self) -> Result<StatusReply, ClientError> {
        let reply = self.request(Command::RequestStatus)?;
        expect_len(&reply, STATUS_REPLY_LEN)?;
        StatusReply::decode(&reply).map_err(ClientError::Malformed)
    }

    pub fn set_time(&mut self, unix: i64) -> Result<(), ClientError> {
        self.request(Command::SetTime {
            unix: unix_to_wire(unix),
        })?;
        Ok(())
    }

    /// Energy used in `[start, end)`, unix seconds.
    pub fn energy(&mut self, start: i64, end: i64) -> Result<EnergyReply, ClientError> {
        let reply = self.request(Command::EnergyQuery {
            start: unix_to_wire(start),
            end: unix_to_wire(end),
        })?;
        expect_len(&reply, ENERGY_REPLY_LEN)?;
        EnergyReply::decode(&reply).map_err(ClientError::Malformed)
    }

    pub fn flush(&mut self, timeout: Duration) -> Result<usize, ClientError> {
        Ok(self.transport.flush(timeout)?)
    }
}

fn expect_len(reply: &[u8], expected: usize) -> Result<(), ClientError> {
    if reply.len() < expected {
        return Err(ClientError::ShortReply {
            got: reply.len(),
            expected,
        });
    }
    Ok(())
}

/// Timestamps travel as `i32`, clamp instead of wrapping.
fn unix_to_wire(unix: i64) -> i32 {
    unix.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::ScriptedLink;
    use powerstrip::{ACK_MARKER, START_MARKER};

    fn client(reply: &[u8]) -> Client<ScriptedLink> {
        Client::new(Transport::new(ScriptedLink::replying(reply)))
    }

    #[test]
    fn status_is_decoded() {
        let mut client = client(&[ACK_MARKER, 9, 0b011, 100, 0, 0, 0, 0xe8, 3, 0, 0]);
        let status = client.status().unwrap();
        assert!(status.is_on(0) && status.is_on(1) && !status.is_on(2));
        assert_eq!(status.currents, [100, 0, 1000, 0]);
        assert_eq!(
            client.transport().link().sent,
            vec![vec![START_MARKER, 1], vec![28]]
        );
    }

    #[test]
    fn energy_query_sends_both_bounds() {
        let mut reply = vec![ACK_MARKER, 16];
        reply.extend_from_slice(&43_200u32.to_le_bytes());
        reply.extend_from_slice(&[0; 12]);
        let mut client = client(&reply);
        let energy = client.energy(1000, 4600).unwrap();
        assert_eq!(energy.joules, [43_200, 0, 0, 0]);
        let sent = &client.transport().link().sent;
        assert_eq!(sent[1], vec![26, 0xe8, 3, 0, 0, 0xf8, 0x11, 0, 0]);
    }

    #[test]
    fn short_status_reply_is_not_fatal() {
        let mut client = client(&[ACK_MARKER, 2, 1, 2]);
        let err = client.status().unwrap_err();
        assert!(matches!(err, ClientError::ShortReply { got: 2, expected: 9 }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn toggle_payload() {
        let mut client = client(&[ACK_MARKER, 0]);
        client.toggle_socket(1, false).unwrap();
        assert_eq!(client.transport().link().sent[1], vec![29, 1, 0]);
    }

    #[test]
    fn far_timestamps_are_clamped() {
        assert_eq!(unix_to_wire(1 << 40), i32::MAX);
        assert_eq!(unix_to_wire(-(1 << 40)), i32::MIN);
    }
}
