#![cfg_attr(not(test), no_std)]

//! Wire protocol shared by the power strip host (`master`) and the
//! micro-controller (`servant`).
//!
//! Every exchange is one request frame from the host followed by one reply
//! frame from the device:
//!
//! ```text
//! [marker:1][length:1][payload:length]
//! ```
//!
//! The host marks its frames with [`START_MARKER`], the device with
//! [`ACK_MARKER`]. There is no escaping and no checksum, so a marker valued
//! byte inside a payload looks like the start of a frame to a receiver that is
//! hunting for one.

pub mod command;
pub mod error;
pub mod frame;
pub mod record;
pub mod units;

pub use command::{Command, EnergyReply, StatusReply};
pub use error::ProtocolError;
pub use frame::{encode_header, FrameAssembler, Progress};
pub use record::{Sample, StateRecord};

/// Marker opening a host -> device frame.
pub const START_MARKER: u8 = 31;
/// Marker opening a device -> host frame.
pub const ACK_MARKER: u8 = 30;

/// Largest payload the host can put in a frame.
pub const HOST_MAX_PAYLOAD: usize = 255;
/// Receive buffer of the device, longer payloads are truncated.
pub const DEVICE_MAX_PAYLOAD: usize = 32;

/// Relays on the strip.
pub const SOCKETS: usize = 4;
/// Sockets with a current sensor, the fourth relay has none.
pub const SENSED_SOCKETS: usize = 3;

/// Seconds between two logged samples.
pub const LOG_CADENCE_SECS: i32 = 10;
pub const MAINS_VOLTAGE_RMS: u32 = 120;
pub const JOULES_PER_KWH: u32 = 3_600_000;
pub const SECONDS_PER_DAY: i64 = 86_400;
