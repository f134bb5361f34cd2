//! Peripherals the firmware needs from a board.
//!
//! Serial and delays use the `embedded-hal` traits, everything a stock HAL
//! has no trait for is declared here.

pub use embedded_hal::blocking::delay::DelayUs;
pub use embedded_hal::serial;

/// Relay outputs, one per socket.
pub trait RelayBank {
    fn set(&mut self, socket: usize, on: bool);
    fn is_on(&self, socket: usize) -> bool;
}

/// Raw samples of the current sensors, 13 bit, mid scale at zero current.
pub trait CurrentAdc {
    fn read(&mut self, channel: usize) -> u16;
}

pub trait RealTimeClock {
    /// Unix seconds.
    fn now(&mut self) -> i64;
    fn set(&mut self, unix: i64);
}

/// Direction of a mains zero crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

pub trait ZeroCrossDetector {
    /// `Some` when the mains voltage is crossing zero right now.
    fn poll(&mut self) -> Option<Edge>;
}

/// Inputs used by the optional behaviors.
pub trait AuxInputs {
    /// Light sensor reading, higher is brighter.
    fn light_level(&mut self) -> u16;
    /// External control pin `pin` (0..=2).
    fn ext_pin(&mut self, pin: usize) -> bool;
}

/// Sequential reads from an open file.
pub trait FileRead {
    type Error: core::fmt::Debug;

    /// Reads into `buf`, `Ok(0)` at end of file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Fills `buf` completely, `Ok(false)` if the file ends first.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<bool, Self::Error> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..])? {
                0 => return Ok(false),
                n => filled += n,
            }
        }
        Ok(true)
    }
}

/// Named files on durable storage (the SD card).
///
/// Files are opened per call and closed before returning, except for readers
/// which close when dropped.
pub trait Storage {
    type Error: core::fmt::Debug;
    type Reader<'a>: FileRead<Error = Self::Error>
    where
        Self: 'a;

    fn exists(&mut self, name: &str) -> bool;
    fn open_read(&mut self, name: &str) -> Result<Self::Reader<'_>, Self::Error>;
    /// Appends to `name`, creating it if needed.
    fn append(&mut self, name: &str, bytes: &[u8]) -> Result<(), Self::Error>;
    /// Writes `bytes` at the start of `name`, creating it if needed.
    fn overwrite(&mut self, name: &str, bytes: &[u8]) -> Result<(), Self::Error>;
    fn remove(&mut self, name: &str) -> Result<(), Self::Error>;
}

/// The set of peripherals a device runs on.
pub trait Board {
    type Serial: serial::Read<u8> + serial::Write<u8>;
    type Relays: RelayBank;
    type ZeroCross: ZeroCrossDetector;
    type Rtc: RealTimeClock;
    type Storage: Storage;
    type Aux: AuxInputs;
    type Delay: DelayUs<u16>;
}

/// Peripherals handed over to [`Device::new`](crate::Device::new).
pub struct Parts<B: Board> {
    pub serial: B::Serial,
    pub relays: B::Relays,
    pub zero_cross: B::ZeroCross,
    pub rtc: B::Rtc,
    pub storage: B::Storage,
    pub aux: B::Aux,
    pub delay: B::Delay,
}
