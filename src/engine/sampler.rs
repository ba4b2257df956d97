//! Echo-pulse timing to calibrated distance samples.
//!
//! The ultrasonic driver reports the rise and fall ticks of each echo pulse
//! from a free-running microsecond timer. The sampler converts the pulse width
//! to centimeters and pins the first reading(s) as the no-obstruction
//! baseline. The baseline is never updated automatically afterwards; drift
//! compensation is an explicit [`DistanceSampler::recalibrate`] call.

use std::time::SystemTime;
use tracing::info;

/// Centimeters of one-way travel per microsecond of echo round trip, at the
/// 20 °C reference temperature (speed of sound 343.21 m/s).
pub const CM_PER_US: f64 = 34_321.0 / 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSample {
    pub at: SystemTime,
    pub distance_cm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub distance_cm: f64,
    pub variance_limit_cm: f64,
}

impl Baseline {
    /// Whether a reading falls within the no-obstruction tolerance band.
    pub fn contains(&self, distance_cm: f64) -> bool {
        (distance_cm - self.distance_cm).abs() <= self.variance_limit_cm
    }
}

#[derive(Debug)]
pub struct DistanceSampler {
    variance_limit_cm: f64,
    baseline_pulses: u32,
    warmup: Vec<f64>,
    baseline: Option<Baseline>,
    last: Option<DistanceSample>,
}

impl DistanceSampler {
    pub fn new(variance_limit_cm: f64, baseline_pulses: u32) -> Self {
        Self {
            variance_limit_cm,
            baseline_pulses: baseline_pulses.max(1),
            warmup: Vec::new(),
            baseline: None,
            last: None,
        }
    }

    pub fn baseline(&self) -> Option<Baseline> {
        self.baseline
    }

    pub fn last_sample(&self) -> Option<DistanceSample> {
        self.last
    }

    /// Drops the baseline so the next pulse(s) establish a fresh one.
    pub fn recalibrate(&mut self) {
        info!("Dropping distance baseline for recalibration");
        self.baseline = None;
        self.warmup.clear();
        self.last = None;
    }

    /// Converts one echo pulse into a distance sample.
    ///
    /// Returns `None` while the baseline is still being established; there is
    /// no detection decision until a baseline exists. Edge arithmetic is done
    /// with wrapping subtraction since the timer free-runs over `u32`.
    pub fn ingest(
        &mut self,
        rise_tick_us: u32,
        fall_tick_us: u32,
        at: SystemTime,
    ) -> Option<DistanceSample> {
        let echo_us = fall_tick_us.wrapping_sub(rise_tick_us);
        let distance_cm = f64::from(echo_us) / 2.0 * CM_PER_US;

        if self.baseline.is_none() {
            self.warmup.push(distance_cm);
            if self.warmup.len() as u32 >= self.baseline_pulses {
                let sum: f64 = self.warmup.iter().sum();
                let mean = sum / self.warmup.len() as f64;
                self.baseline = Some(Baseline {
                    distance_cm: mean,
                    variance_limit_cm: self.variance_limit_cm,
                });
                self.warmup.clear();
                info!(baseline_cm = mean, "Baseline distance established");
            }
            return None;
        }

        let sample = DistanceSample { at, distance_cm };
        self.last = Some(sample);
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn ticks_for_cm(cm: f64) -> u32 {
        (cm * 2.0 / CM_PER_US).round() as u32
    }

    #[test]
    fn first_pulse_becomes_baseline_without_a_sample() {
        let mut sampler = DistanceSampler::new(30.0, 1);

        let sample = sampler.ingest(0, ticks_for_cm(50.0), UNIX_EPOCH);

        assert!(sample.is_none());
        let baseline = sampler.baseline().expect("baseline set");
        assert!((baseline.distance_cm - 50.0).abs() < 0.1);
        assert_eq!(baseline.variance_limit_cm, 30.0);
    }

    #[test]
    fn subsequent_pulses_emit_samples_and_keep_baseline() {
        let mut sampler = DistanceSampler::new(30.0, 1);
        sampler.ingest(0, ticks_for_cm(50.0), UNIX_EPOCH);

        let at = UNIX_EPOCH + Duration::from_millis(500);
        let sample = sampler.ingest(0, ticks_for_cm(85.0), at).expect("sample");

        assert!((sample.distance_cm - 85.0).abs() < 0.1);
        assert_eq!(sample.at, at);
        let baseline = sampler.baseline().expect("baseline kept");
        assert!((baseline.distance_cm - 50.0).abs() < 0.1);
        assert_eq!(sampler.last_sample(), Some(sample));
    }

    #[test]
    fn baseline_averages_configured_warmup_pulses() {
        let mut sampler = DistanceSampler::new(30.0, 3);

        assert!(sampler.ingest(0, ticks_for_cm(48.0), UNIX_EPOCH).is_none());
        assert!(sampler.ingest(0, ticks_for_cm(50.0), UNIX_EPOCH).is_none());
        assert!(sampler.ingest(0, ticks_for_cm(52.0), UNIX_EPOCH).is_none());

        let baseline = sampler.baseline().expect("baseline set");
        assert!((baseline.distance_cm - 50.0).abs() < 0.1);
    }

    #[test]
    fn echo_timing_survives_timer_wraparound() {
        let mut sampler = DistanceSampler::new(30.0, 1);
        sampler.ingest(0, ticks_for_cm(50.0), UNIX_EPOCH);

        let width = ticks_for_cm(60.0);
        let rise = u32::MAX - width / 2;
        let fall = rise.wrapping_add(width);
        let sample = sampler.ingest(rise, fall, UNIX_EPOCH).expect("sample");

        assert!((sample.distance_cm - 60.0).abs() < 0.1);
    }

    #[test]
    fn recalibrate_requires_a_new_baseline() {
        let mut sampler = DistanceSampler::new(30.0, 1);
        sampler.ingest(0, ticks_for_cm(50.0), UNIX_EPOCH);
        sampler.ingest(0, ticks_for_cm(85.0), UNIX_EPOCH);

        sampler.recalibrate();

        assert!(sampler.baseline().is_none());
        assert!(sampler.ingest(0, ticks_for_cm(70.0), UNIX_EPOCH).is_none());
        let baseline = sampler.baseline().expect("new baseline");
        assert!((baseline.distance_cm - 70.0).abs() < 0.1);
    }

    #[test]
    fn baseline_tolerance_band_is_inclusive() {
        let baseline = Baseline {
            distance_cm: 50.0,
            variance_limit_cm: 30.0,
        };

        assert!(baseline.contains(80.0));
        assert!(baseline.contains(20.0));
        assert!(!baseline.contains(80.1));
    }
}
