//! The host command loop: read a line, run it against the device, print.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeZone, Utc};
use log::debug;
use powerstrip::SOCKETS;
use thiserror::Error;

use crate::client::{Client, ClientError};
use crate::console::{self, Input, SPAN_HINT, USAGE};
use crate::link::Link;
use crate::report;

const STARTUP_FLUSH: Duration = Duration::from_secs(3);
const DEBUG_FLUSH: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("console: {0}")]
    Io(#[from] io::Error),
}

enum Flow {
    Continue,
    Quit,
}

pub struct Session<L> {
    client: Client<L>,
    cents_per_kwh: f64,
    now: fn() -> i64,
}

fn wall_clock() -> i64 {
    Utc::now().timestamp()
}

impl<L: Link> Session<L> {
    pub fn new(client: Client<L>, cents_per_kwh: f64) -> Self {
        Self {
            client,
            cents_per_kwh,
            now: wall_clock,
        }
    }

    /// Replaces the wall clock, unix seconds.
    pub fn with_clock(mut self, now: fn() -> i64) -> Self {
        self.now = now;
        self
    }

    pub fn client(&self) -> &Client<L> {
        &self.client
    }

    /// Drains the bridge's greeting and anything left from an earlier session.
    pub fn start<W: Write>(&mut self, out: &mut W) -> Result<(), SessionError> {
        writeln!(out, "Flushing receive buffer...")?;
        self.flush(STARTUP_FLUSH, out)?;
        writeln!(out, "Ready.")?;
        Ok(())
    }

    /// Runs until `q`, end of input, or a communication failure.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, out: &mut W) -> Result<(), SessionError> {
        let mut line = String::new();
        loop {
            write!(out, "$: ")?;
            out.flush()?;
            line.clear();
            if input.read_line(&mut line)? == 0 {
                return Ok(());
            }
            let flow = self.execute(console::parse(&line), out);
            for attempt in self.client.take_retries() {
                writeln!(out, "send command timeout, retry #{}", attempt)?;
            }
            match flow {
                Ok(Flow::Quit) => return Ok(()),
                Ok(Flow::Continue) => {}
                Err(SessionError::Client(err)) if !err.is_fatal() => writeln!(out, "{}", err)?,
                Err(err) => return Err(err),
            }
        }
    }

    fn execute<W: Write>(&mut self, input: Input, out: &mut W) -> Result<Flow, SessionError> {
        debug!("input {:?}", input);
        match input {
            Input::Quit => return Ok(Flow::Quit),
            Input::Toggle { socket, on } => self.client.toggle_socket(socket, on)?,
            Input::Status => {
                let status = self.client.status()?;
                for line in report::status_lines(&status) {
                    writeln!(out, "{}", line)?;
                }
            }
            // the fourth socket is sent too, the device ignores it
            Input::AllOn | Input::AllOff => {
                let on = input == Input::AllOn;
                for socket in 0..SOCKETS as u8 {
                    self.client.toggle_socket(socket, on)?;
                }
            }
            Input::SetTime => self.client.set_time((self.now)())?,
            Input::Trailing { count, span } => {
                writeln!(out, "{}", report::trailing_heading(count, span.name()))?;
                let now = (self.now)();
                let start = now.saturating_sub(span.secs().saturating_mul(count as i64));
                self.energy(start, now, out)?;
            }
            Input::UnknownSpan(unit) => {
                writeln!(out, "'{}'? I don't know what that is.", unit)?;
                writeln!(out, "{}", SPAN_HINT)?;
            }
            Input::Between { start, end } => match (local_unix(start), local_unix(end)) {
                (Some(start), Some(end)) => self.energy(start, end, out)?,
                _ => write!(out, "{}", USAGE)?,
            },
            Input::Flush => self.flush(DEBUG_FLUSH, out)?,
            Input::Usage => write!(out, "{}", USAGE)?,
        }
        Ok(Flow::Continue)
    }

    fn energy<W: Write>(&mut self, start: i64, end: i64, out: &mut W) -> Result<(), SessionError> {
        let energy = self.client.energy(start, end)?;
        for line in report::energy_lines(&energy, self.cents_per_kwh) {
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }

    fn flush<W: Write>(&mut self, timeout: Duration, out: &mut W) -> Result<(), SessionError> {
        let count = self.client.flush(timeout)?;
        if count > 0 {
            writeln!(out, "flushed {} bytes", count)?;
        }
        Ok(())
    }
}

/// Local wall time to unix seconds, the earlier instant on a DST fold.
fn local_unix(at: NaiveDateTime) -> Option<i64> {
    Local.from_local_datetime(&at).earliest().map(|t| t.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::ScriptedLink;
    use crate::transport::Transport;
    use powerstrip::ACK_MARKER;

    fn session(reply: &[u8]) -> Session<ScriptedLink> {
        Session::new(
            Client::new(Transport::new(ScriptedLink::replying(reply))),
            report::DEFAULT_CENTS_PER_KWH,
        )
        .with_clock(|| 1_000_000)
    }

    fn run(session: &mut Session<ScriptedLink>, input: &str) -> (Result<(), SessionError>, String) {
        let mut out = Vec::new();
        let result = session.run(input.as_bytes(), &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn all_on_sends_four_toggles() {
        let acks: Vec<u8> = [ACK_MARKER, 0].repeat(4);
        let mut session = session(&acks);
        let (result, _) = run(&mut session, "a1\nq\n");
        assert!(result.is_ok());
        let sent = &session.client().transport().link().sent;
        let payloads: Vec<&Vec<u8>> = sent.iter().skip(1).step_by(2).collect();
        assert_eq!(payloads, vec![&vec![29, 0, 1], &vec![29, 1, 1], &vec![29, 2, 1], &vec![29, 3, 1]]);
    }

    #[test]
    fn trailing_hour_asks_for_the_last_3600_seconds() {
        let mut reply = vec![ACK_MARKER, 16];
        reply.extend_from_slice(&[0; 16]);
        let mut session = session(&reply);
        let (result, out) = run(&mut session, "e1h\n");
        assert!(result.is_ok());
        assert!(out.contains("energy used during the past 1 hour:"));
        assert!(out.contains("   Total: 0.0000kWh, $0.0000"));
        let sent = &session.client().transport().link().sent;
        let mut expected = vec![26];
        expected.extend_from_slice(&(1_000_000i32 - 3600).to_le_bytes());
        expected.extend_from_slice(&1_000_000i32.to_le_bytes());
        assert_eq!(sent[1], expected);
    }

    #[test]
    fn bad_input_prints_usage_and_keeps_going() {
        let mut session = session(&[]);
        let (result, out) = run(&mut session, "xyz\ne5q\n");
        assert!(result.is_ok());
        assert!(out.contains("usage:"));
        assert!(out.contains("'q'? I don't know what that is."));
        assert!(session.client().transport().link().sent.is_empty());
    }

    #[test]
    fn unreachable_device_ends_the_session() {
        let mut session = session(&[]);
        let (result, out) = run(&mut session, "ss\nss\n");
        assert!(matches!(result, Err(SessionError::Client(_))));
        assert!(out.contains("send command timeout, retry #1\n"));
        assert!(out.contains("send command timeout, retry #4\n"));
        assert!(!out.contains("retry #5"));
        // five attempts of the first request, the second is never sent
        assert_eq!(session.client().transport().link().sent.len(), 10);
    }

    #[test]
    fn retry_notice_is_printed_with_the_command_output() {
        let link = ScriptedLink {
            silences: 1,
            ..ScriptedLink::replying(&[ACK_MARKER, 9, 0b0001, 0xe8, 0x03, 0, 0, 0, 0, 0, 0])
        };
        let mut session = Session::new(
            Client::new(Transport::new(link)),
            report::DEFAULT_CENTS_PER_KWH,
        );
        let (result, out) = run(&mut session, "ss\n");
        assert!(result.is_ok());
        assert!(out.contains("send command timeout, retry #1\n"));
        assert!(!out.contains("retry #2"));
        assert_eq!(session.client().transport().link().sent.len(), 4);
    }

    #[test]
    fn startup_flush_reports_greeting() {
        let mut session = session(b"*HELLO*");
        let mut out = Vec::new();
        session.start(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("flushed 7 bytes"));
        assert!(out.ends_with("Ready.\n"));
    }
}
