//! Conversions between the integer quantities on the wire and physical units.
//!
//! Power is computed from current alone, the mains voltage is taken as a
//! constant [`MAINS_VOLTAGE_RMS`](crate::MAINS_VOLTAGE_RMS).

use crate::{JOULES_PER_KWH, MAINS_VOLTAGE_RMS};

/// `(mA*s / 1000) * V`, exact in integers, saturating at `u32::MAX`.
pub fn joules_from_milliamp_seconds(milliamp_seconds: u64) -> u32 {
    let joules = milliamp_seconds.saturating_mul(MAINS_VOLTAGE_RMS as u64) / 1000;
    u32::try_from(joules).unwrap_or(u32::MAX)
}

pub fn amps(milliamps: u16) -> f64 {
    milliamps as f64 / 1000.0
}

pub fn watts(milliamps: u16) -> f64 {
    amps(milliamps) * MAINS_VOLTAGE_RMS as f64
}

pub fn kwh(joules: u32) -> f64 {
    joules as f64 / JOULES_PER_KWH as f64
}

/// Cost in dollars of `kwh` at `cents_per_kwh`.
pub fn cost_dollars(kwh: f64, cents_per_kwh: f64) -> f64 {
    kwh * cents_per_kwh / 100.0
}
