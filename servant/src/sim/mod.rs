//! Running the device on a PC.
//!
//! [`TcpBoard`] serves the serial line over TCP, the way the WiFi bridge of
//! the strip does, and keeps the storage card in a directory. [`BenchBoard`]
//! is fully scripted and meant for tests.

mod board;
mod storage;

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

pub use board::{
    BenchClock, BenchDelay, BenchZeroCross, MainsZeroCross, ScriptedSerial, SimAdc, SimAux,
    SimRelays, StdDelay, SystemClock, TcpSerial,
};
pub use storage::{FsStorage, MemError, MemReader, MemStorage};

use crate::hal::{Board, Parts};
use crate::Device;

/// Pause between loop turns, keeps an idle simulation off the CPU.
pub const IDLE: Duration = Duration::from_millis(1);

pub struct TcpBoard;

impl Board for TcpBoard {
    type Serial = TcpSerial;
    type Relays = SimRelays;
    type ZeroCross = MainsZeroCross;
    type Rtc = SystemClock;
    type Storage = FsStorage;
    type Aux = SimAux;
    type Delay = StdDelay;
}

impl TcpBoard {
    pub fn parts(serial: TcpSerial, relays: SimRelays, storage: FsStorage) -> Parts<Self> {
        Parts {
            serial,
            relays,
            zero_cross: MainsZeroCross::default(),
            rtc: SystemClock::default(),
            storage,
            aux: SimAux::default(),
            delay: StdDelay,
        }
    }
}

pub struct BenchBoard;

impl Board for BenchBoard {
    type Serial = ScriptedSerial;
    type Relays = SimRelays;
    type ZeroCross = BenchZeroCross;
    type Rtc = BenchClock;
    type Storage = MemStorage;
    type Aux = SimAux;
    type Delay = BenchDelay;
}

impl BenchBoard {
    pub fn parts(now: i64, storage: MemStorage) -> Parts<Self> {
        Parts {
            serial: ScriptedSerial::default(),
            relays: SimRelays::default(),
            zero_cross: BenchZeroCross::default(),
            rtc: BenchClock::new(now),
            storage,
            aux: SimAux::default(),
            delay: BenchDelay::default(),
        }
    }
}

/// Polls `device` until `stop` is set.
pub fn run<B: Board>(device: &mut Device<'_, B>, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        device.poll();
        thread::sleep(IDLE);
    }
}
