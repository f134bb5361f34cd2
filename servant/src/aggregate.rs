//! Energy used between two instants, integrated from the day files.

use log::{error, info};
use powerstrip::units::joules_from_milliamp_seconds;
use powerstrip::{Sample, SOCKETS};

use crate::hal::Storage;
use crate::logstore::LogStore;

/// Left Riemann sum over consecutive samples.
#[derive(Debug, Default)]
struct Integrator {
    max_gap: i64,
    milliamp_seconds: [u64; SOCKETS],
    prev: Option<Sample>,
}

impl Integrator {
    /// Adds `prev` held for `dt` seconds if the pair is close enough.
    fn hold(&mut self, prev: &Sample, gap: i64, dt: i64) {
        if !(0..=self.max_gap).contains(&gap) {
            return;
        }
        for (sum, current) in self.milliamp_seconds.iter_mut().zip(prev.currents) {
            *sum = sum.saturating_add(current as u64 * dt as u64);
        }
    }

    fn push(&mut self, sample: Sample) {
        if let Some(prev) = self.prev {
            let gap = sample.timestamp as i64 - prev.timestamp as i64;
            self.hold(&prev, gap, gap);
        }
        self.prev = Some(sample);
    }

    /// `next` is the first sample at or past `end`.
    fn close(&mut self, next: &Sample, end: i64) {
        if let Some(prev) = self.prev {
            let gap = next.timestamp as i64 - prev.timestamp as i64;
            self.hold(&prev, gap, end - prev.timestamp as i64);
        }
    }

    /// No sample at or past `end` was logged, the last one is held until
    /// `end` if that is within the gap limit.
    fn close_open(&mut self, end: i64) {
        if let Some(prev) = self.prev {
            let gap = end - prev.timestamp as i64;
            self.hold(&prev, gap, gap);
        }
    }

    fn joules(&self) -> [u32; SOCKETS] {
        self.milliamp_seconds.map(joules_from_milliamp_seconds)
    }
}

/// Joules per socket used in `[start, end)`.
///
/// Pairs of samples further apart than `max_gap` seconds count as no data.
/// A day file that can not be read ends the query with what was summed so far.
pub fn energy_between<S: Storage>(
    store: &mut LogStore<'_, S>,
    start: i64,
    end: i64,
    max_gap: i64,
) -> [u32; SOCKETS] {
    let mut integrator = Integrator {
        max_gap,
        ..Default::default()
    };
    if start > end {
        return integrator.joules();
    }
    let (Some(mut day), Some(last)) = (store.day_of(start), store.day_of(end)) else {
        return integrator.joules();
    };
    'days: loop {
        match store.scan(day) {
            Ok(Some(samples)) => {
                for sample in samples {
                    let t = sample.timestamp as i64;
                    if t < start {
                        continue;
                    }
                    if t >= end {
                        integrator.close(&sample, end);
                        break 'days;
                    }
                    integrator.push(sample);
                }
            }
            Ok(None) => {}
            Err(err) => {
                error!("{}: open failed: {:?}", day, err);
                break 'days;
            }
        }
        match day.succ_opt() {
            Some(next) if day < last => day = next,
            _ => {
                integrator.close_open(end);
                break;
            }
        }
    }
    let joules = integrator.joules();
    info!("energy {}..{}: {:?} J", start, end, joules);
    joules
}
