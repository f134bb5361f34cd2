//! Day files of logged current samples.
//!
//! One file per device-local calendar day, named `YYYYMMDD`, holding
//! 12 byte [`Sample`] records in the order they were appended. Files are only
//! open for the duration of one append, or for as long as a [`DayScan`] lives.

use core::fmt::Write;

use chrono::{DateTime, Datelike, NaiveDate};
use heapless::String;
use log::{debug, error};
use powerstrip::record::SAMPLE_LEN;
use powerstrip::{Sample, SOCKETS};

use crate::hal::{FileRead, Storage};

pub type DayFileName = String<8>;

/// Calendar date of `timestamp` shifted by `utc_offset` seconds.
pub fn local_date(timestamp: i64, utc_offset: i32) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp.checked_add(utc_offset as i64)?, 0).map(|t| t.date_naive())
}

pub fn day_file_name(date: NaiveDate) -> DayFileName {
    let mut name = DayFileName::new();
    // four digit years only, which covers every i32 timestamp
    let _ = write!(name, "{:04}{:02}{:02}", date.year(), date.month(), date.day());
    name
}

pub struct LogStore<'a, S> {
    storage: &'a mut S,
    utc_offset: i32,
}

impl<'a, S: Storage> LogStore<'a, S> {
    pub fn new(storage: &'a mut S, utc_offset: i32) -> Self {
        Self {
            storage,
            utc_offset,
        }
    }

    /// The day file `timestamp` belongs to.
    pub fn day_of(&self, timestamp: i64) -> Option<NaiveDate> {
        local_date(timestamp, self.utc_offset)
    }

    /// Appends one sample to the file of its day. Failures are logged and
    /// the sample is lost.
    pub fn append(&mut self, timestamp: i64, currents: [u16; SOCKETS]) -> bool {
        let (Some(day), Ok(timestamp)) = (self.day_of(timestamp), i32::try_from(timestamp)) else {
            error!("sample at {} can not be logged", timestamp);
            return false;
        };
        let bytes = match (Sample { timestamp, currents }).encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("sample at {}: {}", timestamp, err);
                return false;
            }
        };
        let name = day_file_name(day);
        match self.storage.append(&name, &bytes) {
            Ok(()) => {
                debug!("{}: logged {} {:?}", name, timestamp, currents);
                true
            }
            Err(err) => {
                error!("{}: append failed: {:?}", name, err);
                false
            }
        }
    }

    /// Samples of `day` in file order, `None` when nothing was logged that day.
    pub fn scan(&mut self, day: NaiveDate) -> Result<Option<DayScan<S::Reader<'_>>>, S::Error> {
        let name = day_file_name(day);
        if !self.storage.exists(&name) {
            return Ok(None);
        }
        let reader = self.storage.open_read(&name)?;
        Ok(Some(DayScan {
            reader,
            done: false,
        }))
    }
}

/// Lazy reader of one day file. Stops at the end of the file, at a trailing
/// partial record, or at the first read error.
pub struct DayScan<R> {
    reader: R,
    done: bool,
}

impl<R: FileRead> Iterator for DayScan<R> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        if self.done {
            return None;
        }
        let mut buf = [0u8; SAMPLE_LEN];
        match self.reader.read_full(&mut buf) {
            Ok(true) => match Sample::decode(&buf) {
                Ok(sample) => return Some(sample),
                Err(err) => error!("bad sample: {}", err),
            },
            Ok(false) => {}
            Err(err) => error!("day file read failed: {:?}", err),
        }
        self.done = true;
        None
    }
}

/// Fires once per multiple of `period` seconds.
#[derive(Debug, Clone)]
pub struct CadenceTimer {
    period: i64,
    last: i64,
}

impl CadenceTimer {
    /// A timer that will not fire for `now` itself.
    pub fn new(period: i64, now: i64) -> Self {
        Self {
            period: period.max(1),
            last: now,
        }
    }

    pub fn expired(&mut self, now: i64) -> bool {
        if now.rem_euclid(self.period) == 0 && now != self.last {
            self.last = now;
            true
        } else {
            false
        }
    }
}
