//! Current sensing: ADC bursts to smoothed RMS milliamps.
//!
//! Every tick captures one burst of [`BURST_LEN`] samples per sensed channel,
//! spaced [`SAMPLE_SPACING_US`] apart so a burst covers about one 60 Hz mains
//! cycle. The burst's own mean is taken as the DC bias, the RMS of what is left
//! goes through the sensor calibration and into a 10 slot rolling mean.

use core::sync::atomic::{AtomicU16, Ordering};

use powerstrip::{SENSED_SOCKETS, SOCKETS};

use crate::hal::{CurrentAdc, DelayUs};

pub const BURST_LEN: usize = 83;
pub const SAMPLE_SPACING_US: u16 = 200;
pub const SMOOTHING_SLOTS: usize = 10;
/// Period the sampling tick is meant to be run at.
pub const TICK_PERIOD_MS: u64 = 300;

/// Linear fit from burst RMS (ADC counts) to amperes,
/// `((zero + rms) / full_scale) * span - bias`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub zero: f64,
    pub full_scale: f64,
    pub span_amps: f64,
    pub bias_amps: f64,
}

impl Calibration {
    /// +-25 A hall sensor on a 13 bit converter.
    pub const HALL_25A_13BIT: Calibration = Calibration {
        zero: 4096.0,
        full_scale: 8192.0,
        span_amps: 50.0,
        bias_amps: 25.0,
    };

    pub fn amps(&self, rms: f64) -> f64 {
        ((self.zero + rms) / self.full_scale) * self.span_amps - self.bias_amps
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::HALL_25A_13BIT
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorConfig {
    pub calibration: Calibration,
    /// Subtracted from a channel's reading, clamped at zero.
    pub offset_amps: [f64; SENSED_SOCKETS],
    /// Readings at or below this are reported as zero.
    pub noise_floor_amps: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            calibration: Calibration::default(),
            offset_amps: [0.06, 0.0, 0.0],
            noise_floor_amps: 0.06,
        }
    }
}

impl SensorConfig {
    pub fn milliamps(&self, channel: usize, rms: f64) -> u16 {
        let mut amps = self.calibration.amps(rms);
        let offset = self.offset_amps[channel];
        if offset != 0.0 {
            amps = if amps - offset < 0.0 { 0.0 } else { amps - offset };
        }
        if amps <= self.noise_floor_amps {
            0
        } else {
            // saturating float to int conversion
            (amps * 1000.0) as u16
        }
    }
}

/// RMS of a burst around its own (integer) mean.
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as i64;
    let mean = samples.iter().map(|s| *s as i64).sum::<i64>() / n;
    let square_sum: i64 = samples
        .iter()
        .map(|s| {
            let d = *s as i64 - mean;
            d * d
        })
        .sum();
    libm::sqrt(square_sum as f64 / n as f64)
}

/// Unweighted mean over the last `N` values, zero filled at start.
#[derive(Debug, Clone)]
pub struct RollingMean<const N: usize> {
    slots: [u16; N],
    index: usize,
}

impl<const N: usize> RollingMean<N> {
    pub const fn new() -> Self {
        Self {
            slots: [0; N],
            index: 0,
        }
    }

    pub fn push(&mut self, value: u16) {
        self.index = (self.index + 1) % N;
        self.slots[self.index] = value;
    }

    pub fn mean(&self) -> u16 {
        let sum: u32 = self.slots.iter().map(|v| *v as u32).sum();
        (sum / N as u32) as u16
    }
}

impl<const N: usize> Default for RollingMean<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Latest readings, written by the sampling context and read by everyone
/// else. Each value is atomic on its own, a reader may see a mix of two
/// consecutive ticks.
#[derive(Debug)]
pub struct CurrentSnapshot {
    milliamps: [AtomicU16; SOCKETS],
}

impl CurrentSnapshot {
    pub const fn new() -> Self {
        Self {
            milliamps: [
                AtomicU16::new(0),
                AtomicU16::new(0),
                AtomicU16::new(0),
                AtomicU16::new(0),
            ],
        }
    }

    pub fn store(&self, readings: &[u16; SOCKETS]) {
        for (cell, value) in self.milliamps.iter().zip(readings) {
            cell.store(*value, Ordering::Relaxed);
        }
    }

    pub fn load(&self) -> [u16; SOCKETS] {
        let mut readings = [0; SOCKETS];
        for (value, cell) in readings.iter_mut().zip(&self.milliamps) {
            *value = cell.load(Ordering::Relaxed);
        }
        readings
    }
}

impl Default for CurrentSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SamplingEngine<A, D> {
    adc: A,
    delay: D,
    config: SensorConfig,
    burst: [[i16; BURST_LEN]; SENSED_SOCKETS],
    smoothing: [RollingMean<SMOOTHING_SLOTS>; SENSED_SOCKETS],
}

impl<A: CurrentAdc, D: DelayUs<u16>> SamplingEngine<A, D> {
    pub fn new(adc: A, delay: D, config: SensorConfig) -> Self {
        Self {
            adc,
            delay,
            config,
            burst: [[0; BURST_LEN]; SENSED_SOCKETS],
            smoothing: Default::default(),
        }
    }

    fn capture(&mut self) {
        for i in 0..BURST_LEN {
            for (channel, burst) in self.burst.iter_mut().enumerate() {
                burst[i] = self.adc.read(channel) as i16;
            }
            self.delay.delay_us(SAMPLE_SPACING_US);
        }
    }

    /// Milliamps of one fresh burst per channel, before smoothing.
    pub fn burst_estimate(&mut self) -> [u16; SENSED_SOCKETS] {
        self.capture();
        let mut estimate = [0; SENSED_SOCKETS];
        for (channel, value) in estimate.iter_mut().enumerate() {
            *value = self.config.milliamps(channel, rms(&self.burst[channel]));
        }
        estimate
    }

    /// One sampling period: burst, smooth, publish. Returns what was published.
    pub fn tick(&mut self, snapshot: &CurrentSnapshot) -> [u16; SOCKETS] {
        let estimate = self.burst_estimate();
        let mut readings = [0; SOCKETS];
        for channel in 0..SENSED_SOCKETS {
            self.smoothing[channel].push(estimate[channel]);
            readings[channel] = self.smoothing[channel].mean();
        }
        snapshot.store(&readings);
        readings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use core::f64::consts::{PI, SQRT_2};

    /// Sine of `amplitude` counts per channel, one period per burst.
    struct SineAdc {
        amplitude: [f64; SENSED_SOCKETS],
        step: [usize; SENSED_SOCKETS],
    }

    impl SineAdc {
        fn new(amplitude: [f64; SENSED_SOCKETS]) -> Self {
            Self {
                amplitude,
                step: [0; SENSED_SOCKETS],
            }
        }
    }

    impl CurrentAdc for SineAdc {
        fn read(&mut self, channel: usize) -> u16 {
            let phase = 2.0 * PI * self.step[channel] as f64 / BURST_LEN as f64;
            self.step[channel] = (self.step[channel] + 1) % BURST_LEN;
            (4096.0 + self.amplitude[channel] * phase.sin()).round() as u16
        }
    }

    struct NoDelay;

    impl DelayUs<u16> for NoDelay {
        fn delay_us(&mut self, _us: u16) {}
    }

    fn expected_milliamps(amplitude: f64) -> f64 {
        (amplitude / SQRT_2) * 50.0 / 8192.0 * 1000.0
    }

    #[test]
    fn sine_burst_maps_to_calibrated_current() {
        let mut engine = SamplingEngine::new(
            SineAdc::new([1000.0, 1000.0, 2500.0]),
            NoDelay,
            SensorConfig::default(),
        );
        let estimate = engine.burst_estimate();
        assert_abs_diff_eq!(estimate[0] as f64, expected_milliamps(1000.0) - 60.0, epsilon = 10.0);
        assert_abs_diff_eq!(estimate[1] as f64, expected_milliamps(1000.0), epsilon = 10.0);
        assert_abs_diff_eq!(estimate[2] as f64, expected_milliamps(2500.0), epsilon = 10.0);
    }

    #[test]
    fn flat_and_tiny_signals_read_zero() {
        let mut engine =
            SamplingEngine::new(SineAdc::new([0.0, 10.0, 0.0]), NoDelay, SensorConfig::default());
        assert_eq!(engine.burst_estimate(), [0, 0, 0]);
    }

    #[test]
    fn dc_bias_is_removed() {
        let samples = [100i16, 300, 100, 300];
        assert_abs_diff_eq!(rms(&samples), 100.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn rolling_mean_converges_after_ten_pushes() {
        let mut mean = RollingMean::<SMOOTHING_SLOTS>::new();
        mean.push(1234);
        assert_eq!(mean.mean(), 123);
        for _ in 1..SMOOTHING_SLOTS {
            mean.push(1234);
        }
        assert_eq!(mean.mean(), 1234);
    }

    #[test]
    fn ticks_publish_smoothed_readings() {
        let snapshot = CurrentSnapshot::new();
        let mut engine = SamplingEngine::new(
            SineAdc::new([0.0, 1000.0, 0.0]),
            NoDelay,
            SensorConfig::default(),
        );
        let single = engine.burst_estimate()[1];
        let mut engine = SamplingEngine::new(
            SineAdc::new([0.0, 1000.0, 0.0]),
            NoDelay,
            SensorConfig::default(),
        );
        for _ in 0..SMOOTHING_SLOTS {
            engine.tick(&snapshot);
        }
        assert_eq!(snapshot.load(), [0, single, 0, 0]);
    }

    #[test]
    fn calibration_is_replaceable() {
        let config = SensorConfig {
            calibration: Calibration {
                zero: 0.0,
                full_scale: 1.0,
                span_amps: 0.001,
                bias_amps: 0.0,
            },
            offset_amps: [0.0; SENSED_SOCKETS],
            noise_floor_amps: 0.0,
        };
        assert_eq!(config.milliamps(2, 1500.0), 1500);
    }
}
