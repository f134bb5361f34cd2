//! Fixed layout records the device keeps on its storage card.

use serde_derive::{Deserialize, Serialize};

use crate::error::unmarshal;
use crate::{ProtocolError, SOCKETS};

pub const SAMPLE_LEN: usize = 12;
pub const STATE_RECORD_LEN: usize = 7;

/// One logged current sample, `[timestamp:i32][current:u16; 4]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sample {
    /// Unix seconds.
    pub timestamp: i32,
    /// Milliamps per socket.
    pub currents: [u16; SOCKETS],
}

impl Sample {
    pub fn encode(&self) -> Result<[u8; SAMPLE_LEN], ProtocolError> {
        let mut buf = [0u8; SAMPLE_LEN];
        ssmarshal::serialize(&mut buf, self)?;
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        unmarshal(bytes, SAMPLE_LEN)
    }
}

/// Persisted device state, one byte per field.
///
/// Relay bytes are taken as "on" when nonzero, setting bytes by their
/// lowest bit, which is how the firmware restores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateRecord {
    pub sockets: [u8; SOCKETS],
    pub zero_cross: u8,
    pub logging: u8,
    pub current_limiter: u8,
}

impl StateRecord {
    pub fn encode(&self) -> Result<[u8; STATE_RECORD_LEN], ProtocolError> {
        let mut buf = [0u8; STATE_RECORD_LEN];
        ssmarshal::serialize(&mut buf, self)?;
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        unmarshal(bytes, STATE_RECORD_LEN)
    }

    pub fn socket_on(&self, socket: usize) -> bool {
        self.sockets[socket] != 0
    }

    pub fn zero_cross_enabled(&self) -> bool {
        self.zero_cross % 2 == 1
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging % 2 == 1
    }

    pub fn limiter_level(&self) -> u8 {
        self.current_limiter % 2
    }
}
