//! Device side of the framing: assemble host requests, write replies.

use heapless::Vec;
use log::{error, trace};
use nb::block;
use powerstrip::{encode_header, FrameAssembler, Progress, ACK_MARKER, DEVICE_MAX_PAYLOAD, START_MARKER};

use crate::hal::serial;

/// Payload of one received request.
pub type Request = Vec<u8, DEVICE_MAX_PAYLOAD>;

pub struct SerialLink<S> {
    serial: S,
    assembler: FrameAssembler<DEVICE_MAX_PAYLOAD>,
}

impl<S> SerialLink<S>
where
    S: serial::Read<u8> + serial::Write<u8>,
{
    pub fn new(serial: S) -> Self {
        Self {
            serial,
            assembler: FrameAssembler::new(START_MARKER),
        }
    }

    pub fn serial(&mut self) -> &mut S {
        &mut self.serial
    }

    /// Returns a request if one is complete.
    ///
    /// While no frame is open this only takes bytes that are already there.
    /// Once the start marker is seen it blocks until the frame is complete.
    pub fn poll_request(&mut self) -> Option<Request> {
        loop {
            let byte = if self.assembler.in_frame() {
                match block!(self.serial.read()) {
                    Ok(byte) => byte,
                    Err(_) => return self.read_failed(),
                }
            } else {
                match self.serial.read() {
                    Ok(byte) => byte,
                    Err(nb::Error::WouldBlock) => return None,
                    Err(nb::Error::Other(_)) => return self.read_failed(),
                }
            };
            trace!("rx {}", byte);
            if self.assembler.push(byte) == Progress::Complete {
                // payload is at most DEVICE_MAX_PAYLOAD long
                return Vec::from_slice(self.assembler.payload()).ok();
            }
        }
    }

    fn read_failed(&mut self) -> Option<Request> {
        error!("serial read failed, frame dropped");
        self.assembler.reset();
        None
    }

    /// Writes `payload` behind an ack header.
    pub fn reply(&mut self, payload: &[u8]) {
        let header = match encode_header(ACK_MARKER, payload) {
            Ok(header) => header,
            Err(err) => {
                error!("reply not sent: {}", err);
                return;
            }
        };
        for byte in header.iter().chain(payload) {
            if block!(self.serial.write(*byte)).is_err() {
                error!("serial write failed, reply dropped");
                return;
            }
        }
        if block!(self.serial.flush()).is_err() {
            error!("serial flush failed");
        }
    }
}
