use core::fmt;

use serde::de::DeserializeOwned;

/// Errors raised while building or reading protocol payloads.
#[derive(Debug)]
pub enum ProtocolError {
    /// Payload does not fit the single length byte of a frame.
    PayloadTooLong(usize),
    /// Command code not known to this protocol version.
    UnknownCommand(u8),
    /// Empty payload, there is no command code to read.
    Empty,
    /// Fewer bytes than the fixed layout being read.
    Short { got: usize, expected: usize },
    /// Fixed layout (de)serialization failed.
    Marshal(ssmarshal::Error),
}

impl From<ssmarshal::Error> for ProtocolError {
    fn from(err: ssmarshal::Error) -> Self {
        ProtocolError::Marshal(err)
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::PayloadTooLong(len) => {
                write!(f, "payload of {} bytes does not fit a frame", len)
            }
            ProtocolError::UnknownCommand(code) => write!(f, "unknown command code {}", code),
            ProtocolError::Empty => write!(f, "empty payload"),
            ProtocolError::Short { got, expected } => {
                write!(f, "short payload, {} of {} bytes", got, expected)
            }
            ProtocolError::Marshal(err) => write!(f, "malformed payload: {:?}", err),
        }
    }
}

/// Reads a `len` byte fixed layout from the front of `bytes`.
///
/// The length is checked up front, ssmarshal asserts on running out of
/// input in debug builds.
pub(crate) fn unmarshal<T: DeserializeOwned>(
    bytes: &[u8],
    len: usize,
) -> Result<T, ProtocolError> {
    if bytes.len() < len {
        return Err(ProtocolError::Short {
            got: bytes.len(),
            expected: len,
        });
    }
    Ok(ssmarshal::deserialize::<T>(&bytes[..len])?.0)
}
