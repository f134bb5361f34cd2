//! Commands carried in host frames and the replies carried in device frames.
//!
//! The first payload byte of a host frame is the command code, the fixed
//! layout body follows. All multi-byte fields are little endian.

use heapless::Vec;
use serde_derive::{Deserialize, Serialize};

use crate::error::unmarshal;
use crate::{ProtocolError, SOCKETS};

pub const CODE_TOGGLE_SOCKET: u8 = 29;
pub const CODE_REQUEST_STATUS: u8 = 28;
pub const CODE_SET_TIME: u8 = 27;
pub const CODE_ENERGY_QUERY: u8 = 26;

/// Longest command payload, code byte included.
pub const MAX_COMMAND_LEN: usize = 9;
pub const STATUS_REPLY_LEN: usize = 9;
pub const ENERGY_REPLY_LEN: usize = 16;

const TOGGLE_BODY_LEN: usize = 2;
const TIME_BODY_LEN: usize = 4;
const RANGE_BODY_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Switch one relay. Only indices 0..=2 are acted upon by the device.
    ToggleSocket { socket: u8, on: bool },
    RequestStatus,
    /// Set the device real time clock, unix seconds.
    SetTime { unix: i32 },
    /// Energy used in `[start, end)`, unix seconds.
    EnergyQuery { start: i32, end: i32 },
}

#[derive(Debug, Serialize, Deserialize)]
struct ToggleBody {
    socket: u8,
    state: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct TimeBody {
    unix: i32,
}

#[derive(Debug, Serialize, Deserialize)]
struct RangeBody {
    start: i32,
    end: i32,
}

impl Command {
    pub fn code(&self) -> u8 {
        match self {
            Command::ToggleSocket { .. } => CODE_TOGGLE_SOCKET,
            Command::RequestStatus => CODE_REQUEST_STATUS,
            Command::SetTime { .. } => CODE_SET_TIME,
            Command::EnergyQuery { .. } => CODE_ENERGY_QUERY,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8, MAX_COMMAND_LEN>, ProtocolError> {
        let mut buf = [0u8; MAX_COMMAND_LEN];
        buf[0] = self.code();
        let body = &mut buf[1..];
        let n = match *self {
            Command::ToggleSocket { socket, on } => ssmarshal::serialize(
                body,
                &ToggleBody {
                    socket,
                    state: on as u8,
                },
            )?,
            Command::RequestStatus => 0,
            Command::SetTime { unix } => ssmarshal::serialize(body, &TimeBody { unix })?,
            Command::EnergyQuery { start, end } => {
                ssmarshal::serialize(body, &RangeBody { start, end })?
            }
        };
        // never longer than MAX_COMMAND_LEN
        Ok(Vec::from_slice(&buf[..1 + n]).unwrap_or_default())
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let (&code, body) = payload.split_first().ok_or(ProtocolError::Empty)?;
        let cmd = match code {
            CODE_TOGGLE_SOCKET => {
                let b: ToggleBody = unmarshal(body, TOGGLE_BODY_LEN)?;
                Command::ToggleSocket {
                    socket: b.socket,
                    on: b.state != 0,
                }
            }
            CODE_REQUEST_STATUS => Command::RequestStatus,
            CODE_SET_TIME => {
                let b: TimeBody = unmarshal(body, TIME_BODY_LEN)?;
                Command::SetTime { unix: b.unix }
            }
            CODE_ENERGY_QUERY => {
                let b: RangeBody = unmarshal(body, RANGE_BODY_LEN)?;
                Command::EnergyQuery {
                    start: b.start,
                    end: b.end,
                }
            }
            other => return Err(ProtocolError::UnknownCommand(other)),
        };
        Ok(cmd)
    }
}

/// Reply to [`Command::RequestStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusReply {
    /// Bit `k` set when socket `k + 1` is switched on.
    pub sockets: u8,
    /// Smoothed current per socket, milliamps.
    pub currents: [u16; SOCKETS],
}

impl StatusReply {
    pub fn is_on(&self, socket: usize) -> bool {
        self.sockets & (1 << socket) != 0
    }

    pub fn encode(&self) -> Result<[u8; STATUS_REPLY_LEN], ProtocolError> {
        let mut buf = [0u8; STATUS_REPLY_LEN];
        ssmarshal::serialize(&mut buf, self)?;
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        unmarshal(payload, STATUS_REPLY_LEN)
    }
}

/// Reply to [`Command::EnergyQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnergyReply {
    /// Energy per socket, joules.
    pub joules: [u32; SOCKETS],
}

impl EnergyReply {
    pub fn encode(&self) -> Result<[u8; ENERGY_REPLY_LEN], ProtocolError> {
        let mut buf = [0u8; ENERGY_REPLY_LEN];
        ssmarshal::serialize(&mut buf, self)?;
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        unmarshal(payload, ENERGY_REPLY_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_layout() {
        let cmd = Command::ToggleSocket { socket: 2, on: true };
        assert_eq!(&cmd.encode().unwrap()[..], &[CODE_TOGGLE_SOCKET, 2, 1]);
    }

    #[test]
    fn status_request_is_a_bare_code() {
        assert_eq!(
            &Command::RequestStatus.encode().unwrap()[..],
            &[CODE_REQUEST_STATUS]
        );
    }

    #[test]
    fn energy_query_layout_is_little_endian() {
        let cmd = Command::EnergyQuery {
            start: 0x0102_0304,
            end: -1,
        };
        assert_eq!(
            &cmd.encode().unwrap()[..],
            &[CODE_ENERGY_QUERY, 4, 3, 2, 1, 0xff, 0xff, 0xff, 0xff]
        );
        assert_eq!(Command::decode(&cmd.encode().unwrap()).unwrap(), cmd);
    }

    #[test]
    fn set_time_decodes() {
        let payload = [CODE_SET_TIME, 0x80, 0x51, 0x01, 0x00];
        assert_eq!(
            Command::decode(&payload).unwrap(),
            Command::SetTime { unix: 86_400 }
        );
    }

    #[test]
    fn any_nonzero_state_switches_on() {
        let cmd = Command::decode(&[CODE_TOGGLE_SOCKET, 0, 7]).unwrap();
        assert_eq!(cmd, Command::ToggleSocket { socket: 0, on: true });
    }

    #[test]
    fn short_or_unknown_payloads_are_rejected() {
        assert!(matches!(Command::decode(&[]), Err(ProtocolError::Empty)));
        assert!(matches!(
            Command::decode(&[CODE_ENERGY_QUERY, 1, 2]),
            Err(ProtocolError::Short {
                got: 2,
                expected: 8
            })
        ));
        assert!(matches!(
            Command::decode(&[99]),
            Err(ProtocolError::UnknownCommand(99))
        ));
    }

    #[test]
    fn status_reply_layout() {
        let reply = StatusReply {
            sockets: 0b0101,
            currents: [1000, 0, 0x0203, 0],
        };
        let bytes = reply.encode().unwrap();
        assert_eq!(bytes, [0b0101, 0xe8, 0x03, 0, 0, 3, 2, 0, 0]);
        let back = StatusReply::decode(&bytes).unwrap();
        assert!(back.is_on(0) && !back.is_on(1) && back.is_on(2) && !back.is_on(3));
        assert_eq!(back, reply);
    }

    #[test]
    fn energy_reply_layout() {
        let reply = EnergyReply {
            joules: [43_200, 0, 1, u32::MAX],
        };
        let bytes = reply.encode().unwrap();
        assert_eq!(&bytes[..4], &[0xc0, 0xa8, 0, 0]);
        assert_eq!(&bytes[12..], &[0xff; 4]);
        assert!(EnergyReply::decode(&bytes[..15]).is_err());
    }

    #[test]
    fn truncated_bodies_are_short_not_a_panic() {
        for payload in [
            &[CODE_TOGGLE_SOCKET][..],
            &[CODE_TOGGLE_SOCKET, 1],
            &[CODE_SET_TIME, 0, 0, 0],
            &[CODE_ENERGY_QUERY, 0, 0, 0, 0, 0, 0, 0],
        ] {
            match Command::decode(payload) {
                Err(ProtocolError::Short { got, .. }) => assert_eq!(got, payload.len() - 1),
                other => panic!("{:?} decoded to {:?}", payload, other),
            }
        }
        assert!(matches!(
            StatusReply::decode(&[0; STATUS_REPLY_LEN - 1]),
            Err(ProtocolError::Short {
                got: 8,
                expected: STATUS_REPLY_LEN
            })
        ));
        assert!(matches!(
            EnergyReply::decode(&[]),
            Err(ProtocolError::Short { got: 0, .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        assert_eq!(
            Command::decode(&[CODE_TOGGLE_SOCKET, 1, 0, 9, 9]).unwrap(),
            Command::ToggleSocket {
                socket: 1,
                on: false
            }
        );
    }
}
