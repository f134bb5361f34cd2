//! Simulated peripherals.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::f64::consts::{PI, SQRT_2};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{info, warn};
use powerstrip::{SENSED_SOCKETS, SOCKETS};

use crate::hal::{serial, AuxInputs, CurrentAdc, DelayUs, Edge, RealTimeClock, RelayBank, ZeroCrossDetector};
use crate::sampling::{Calibration, BURST_LEN};

/// Serial port of the device as a TCP server, one host at a time.
///
/// A host that hangs up is replaced by the next one that connects.
pub struct TcpSerial {
    listener: TcpListener,
    stream: Option<TcpStream>,
}

impl TcpSerial {
    pub fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            stream: None,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn stream(&mut self) -> io::Result<Option<&mut TcpStream>> {
        if self.stream.is_none() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!("host connected from {}", peer);
                    stream.set_nonblocking(true)?;
                    stream.set_nodelay(true)?;
                    self.stream = Some(stream);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {}
                Err(err) => return Err(err),
            }
        }
        Ok(self.stream.as_mut())
    }

    fn hang_up(&mut self) {
        if self.stream.take().is_some() {
            info!("host disconnected");
        }
    }
}

impl serial::Read<u8> for TcpSerial {
    type Error = io::Error;

    fn read(&mut self) -> nb::Result<u8, io::Error> {
        let Some(stream) = self.stream().map_err(nb::Error::Other)? else {
            return Err(nb::Error::WouldBlock);
        };
        let mut byte = [0u8; 1];
        match stream.read(&mut byte) {
            Ok(0) => {
                self.hang_up();
                Err(nb::Error::WouldBlock)
            }
            Ok(_) => Ok(byte[0]),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Err(nb::Error::WouldBlock),
            Err(err) => {
                self.hang_up();
                Err(nb::Error::Other(err))
            }
        }
    }
}

impl serial::Write<u8> for TcpSerial {
    type Error = io::Error;

    /// Bytes written with no host connected are lost, as on a real line.
    fn write(&mut self, word: u8) -> nb::Result<(), io::Error> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        match stream.write(&[word]) {
            Ok(0) => Err(nb::Error::WouldBlock),
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Err(nb::Error::WouldBlock),
            Err(err) => {
                self.hang_up();
                Err(nb::Error::Other(err))
            }
        }
    }

    fn flush(&mut self) -> nb::Result<(), io::Error> {
        match self.stream.as_mut().map(|s| s.flush()) {
            Some(Err(err)) if err.kind() == ErrorKind::WouldBlock => Err(nb::Error::WouldBlock),
            Some(Err(err)) => Err(nb::Error::Other(err)),
            _ => Ok(()),
        }
    }
}

/// Serial port fed from a test, collecting what the device writes.
#[derive(Debug, Default)]
pub struct ScriptedSerial {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

impl ScriptedSerial {
    pub fn feed(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx)
    }
}

impl serial::Read<u8> for ScriptedSerial {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Infallible> {
        self.rx.pop_front().ok_or(nb::Error::WouldBlock)
    }
}

impl serial::Write<u8> for ScriptedSerial {
    type Error = Infallible;

    fn write(&mut self, word: u8) -> nb::Result<(), Infallible> {
        self.tx.push(word);
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Infallible> {
        Ok(())
    }
}

/// Relay states, shared with [`SimAdc`] so only switched on loads draw
/// current.
#[derive(Debug, Clone, Default)]
pub struct SimRelays {
    state: Arc<[AtomicBool; SOCKETS]>,
    switches: [u32; SOCKETS],
}

impl SimRelays {
    /// Times `socket` actually changed state.
    pub fn switches(&self, socket: usize) -> u32 {
        self.switches[socket]
    }
}

impl RelayBank for SimRelays {
    fn set(&mut self, socket: usize, on: bool) {
        if self.state[socket].swap(on, Ordering::Relaxed) != on {
            self.switches[socket] += 1;
        }
    }

    fn is_on(&self, socket: usize) -> bool {
        self.state[socket].load(Ordering::Relaxed)
    }
}

/// Current sensors seeing a 60 Hz sine for each switched on load.
pub struct SimAdc {
    relays: SimRelays,
    loads_ma: Arc<[AtomicU16; SENSED_SOCKETS]>,
    calibration: Calibration,
    step: [usize; SENSED_SOCKETS],
}

impl SimAdc {
    pub fn new(relays: &SimRelays, calibration: Calibration) -> Self {
        Self {
            relays: relays.clone(),
            loads_ma: Arc::default(),
            calibration,
            step: [0; SENSED_SOCKETS],
        }
    }

    pub fn set_load(&self, channel: usize, milliamps: u16) {
        self.loads_ma[channel].store(milliamps, Ordering::Relaxed);
    }

    /// Peak in counts of a sine with an RMS of `milliamps`.
    fn amplitude(&self, milliamps: u16) -> f64 {
        let c = &self.calibration;
        milliamps as f64 / 1000.0 * c.full_scale / c.span_amps * SQRT_2
    }
}

impl CurrentAdc for SimAdc {
    fn read(&mut self, channel: usize) -> u16 {
        let step = self.step[channel];
        self.step[channel] = (step + 1) % BURST_LEN;
        let load = if self.relays.is_on(channel) {
            self.loads_ma[channel].load(Ordering::Relaxed)
        } else {
            0
        };
        let phase = 2.0 * PI * step as f64 / BURST_LEN as f64;
        let raw = self.calibration.zero + self.amplitude(load) * phase.sin();
        raw.round().clamp(0.0, u16::MAX as f64) as u16
    }
}

/// Wall clock with an adjustable offset.
#[derive(Debug, Default)]
pub struct SystemClock {
    offset: i64,
}

impl RealTimeClock for SystemClock {
    fn now(&mut self) -> i64 {
        Utc::now().timestamp() + self.offset
    }

    fn set(&mut self, unix: i64) {
        self.offset = unix - Utc::now().timestamp();
        info!("clock set to {}", unix);
    }
}

/// Clock advancing one second per read.
#[derive(Debug)]
pub struct BenchClock {
    now: i64,
}

impl BenchClock {
    pub fn new(now: i64) -> Self {
        Self { now }
    }
}

impl RealTimeClock for BenchClock {
    fn now(&mut self) -> i64 {
        let now = self.now;
        self.now += 1;
        now
    }

    fn set(&mut self, unix: i64) {
        self.now = unix;
    }
}

/// Zero crossings of 60 Hz mains, by the wall clock.
#[derive(Debug)]
pub struct MainsZeroCross {
    last: Instant,
    rising: bool,
}

const HALF_CYCLE: Duration = Duration::from_micros(8333);

impl Default for MainsZeroCross {
    fn default() -> Self {
        Self {
            last: Instant::now(),
            rising: true,
        }
    }
}

impl ZeroCrossDetector for MainsZeroCross {
    fn poll(&mut self) -> Option<Edge> {
        if self.last.elapsed() < HALF_CYCLE {
            return None;
        }
        self.last += HALF_CYCLE;
        if self.last.elapsed() >= HALF_CYCLE {
            // fell behind, resync
            self.last = Instant::now();
        }
        self.rising = !self.rising;
        Some(if self.rising { Edge::Rising } else { Edge::Falling })
    }
}

/// Reports a crossing on every second poll.
#[derive(Debug, Default)]
pub struct BenchZeroCross {
    polls: u32,
}

impl BenchZeroCross {
    pub fn polls(&self) -> u32 {
        self.polls
    }
}

impl ZeroCrossDetector for BenchZeroCross {
    fn poll(&mut self) -> Option<Edge> {
        self.polls += 1;
        (self.polls % 2 == 0).then_some(Edge::Rising)
    }
}

#[derive(Debug, Clone)]
pub struct SimAux {
    pub light: u16,
    pub pins: [bool; 3],
}

impl Default for SimAux {
    fn default() -> Self {
        Self {
            light: 1023,
            pins: [false; 3],
        }
    }
}

impl AuxInputs for SimAux {
    fn light_level(&mut self) -> u16 {
        self.light
    }

    fn ext_pin(&mut self, pin: usize) -> bool {
        match self.pins.get(pin) {
            Some(on) => *on,
            None => {
                warn!("no external pin {}", pin);
                false
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl DelayUs<u16> for StdDelay {
    fn delay_us(&mut self, us: u16) {
        thread::sleep(Duration::from_micros(us as u64));
    }
}

/// Records delays instead of waiting.
#[derive(Debug, Default)]
pub struct BenchDelay {
    waited: Vec<u32>,
}

impl BenchDelay {
    pub fn waited(&self) -> &[u32] {
        &self.waited
    }
}

impl DelayUs<u16> for BenchDelay {
    fn delay_us(&mut self, us: u16) {
        self.waited.push(us as u32);
    }
}
