//! Byte links from the host to the power strip.
//!
//! The strip is normally reached through a WiFi-to-serial bridge listening on
//! [`PORT`]; a direct serial cable works the same way.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serial2::SerialPort;

/// Link-local address of the WiFi bridge.
pub const DEFAULT_ADDR: &str = "169.254.1.1";
pub const PORT: u16 = 2000;

const POLL_INTERVAL: Duration = Duration::from_millis(1);
const BAUD: u32 = 9600;
const WRITE_TIME_OUT: Duration = Duration::from_millis(1000);

/// A reliable byte stream to the device.
pub trait Link {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Next byte from the device, `Ok(None)` if nothing arrived in `timeout`.
    fn recv_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>>;
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).send(bytes)
    }

    fn recv_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        (**self).recv_byte(timeout)
    }
}

/// TCP link, polled without blocking against a wall clock deadline.
#[derive(Debug)]
pub struct TcpLink {
    stream: TcpStream,
}

impl TcpLink {
    /// Connects to the first address `host` resolves to that accepts.
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    stream.set_nonblocking(true)?;
                    stream.set_nodelay(true)?;
                    return Ok(Self { stream });
                }
                Err(err) => {
                    warn!("connect {}: {}", addr, err);
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(ErrorKind::NotFound, format!("{} did not resolve", host))
        }))
    }

    pub fn peer(&self) -> String {
        self.stream
            .peer_addr()
            .map(|a| a.ip().to_string())
            .unwrap_or_else(|_| "?".into())
    }
}

impl Link for TcpLink {
    fn send(&mut self, mut bytes: &[u8]) -> io::Result<()> {
        while !bytes.is_empty() {
            match self.stream.write(bytes) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => bytes = &bytes[n..],
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                    thread::sleep(POLL_INTERVAL)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn recv_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        let deadline = Instant::now() + timeout;
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte) {
                Ok(1) => return Ok(Some(byte[0])),
                Ok(_) => {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "device closed the connection",
                    ))
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Direct serial uplink.
pub struct SerialLink {
    port: SerialPort,
}

impl SerialLink {
    pub fn open(path: &str) -> io::Result<Self> {
        let mut port = SerialPort::open(path, BAUD)?;
        // Needed for windows, but should not hurt on Linux
        port.set_dtr(true)?;
        port.set_rts(true)?;
        port.set_write_timeout(WRITE_TIME_OUT)?;
        debug!("opened {} at {} bps", path, BAUD);
        Ok(Self { port })
    }
}

impl Link for SerialLink {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn recv_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        self.port.set_read_timeout(timeout)?;
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Ok(Some(byte[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
