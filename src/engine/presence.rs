//! Hysteresis over distance samples.
//!
//! A single out-of-baseline reading is noise as often as it is a passenger
//! (reflections, airflow). Entry into `PersonPresent` requires a configured
//! run of consecutive out-of-baseline samples; return to `Idle` requires a
//! fixed run of three in-baseline samples, so one body passing through the
//! beam counts once.

use crate::engine::sampler::{Baseline, DistanceSample};
use std::time::SystemTime;

/// Consecutive in-baseline samples required to clear a detection.
pub const PERSON_CLEARED_PULSES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Idle,
    PersonPresent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PresenceEvent {
    PersonDetected { at: SystemTime, distance_cm: f64 },
    PersonCleared { at: SystemTime },
}

#[derive(Debug)]
pub struct PresenceDetector {
    detect_pulses: u32,
    state: PresenceState,
    out_of_baseline: u32,
    back_to_baseline: u32,
}

impl PresenceDetector {
    pub fn new(detect_pulses: u32) -> Self {
        Self {
            detect_pulses: detect_pulses.max(1),
            state: PresenceState::Idle,
            out_of_baseline: 0,
            back_to_baseline: 0,
        }
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    /// Returns the detector to `Idle` with cleared counters. Called when a new
    /// boarding session starts so a stale mid-crossing state cannot leak into
    /// the next cycle.
    pub fn reset(&mut self) {
        self.state = PresenceState::Idle;
        self.out_of_baseline = 0;
        self.back_to_baseline = 0;
    }

    /// Feeds one sample, emitting at most one event.
    pub fn observe(&mut self, sample: DistanceSample, baseline: Baseline) -> Option<PresenceEvent> {
        let in_baseline = baseline.contains(sample.distance_cm);
        match self.state {
            PresenceState::Idle => {
                if in_baseline {
                    self.out_of_baseline = 0;
                    return None;
                }
                self.out_of_baseline = self.out_of_baseline.saturating_add(1);
                if self.out_of_baseline >= self.detect_pulses {
                    self.state = PresenceState::PersonPresent;
                    self.out_of_baseline = 0;
                    self.back_to_baseline = 0;
                    return Some(PresenceEvent::PersonDetected {
                        at: sample.at,
                        distance_cm: sample.distance_cm,
                    });
                }
                None
            }
            PresenceState::PersonPresent => {
                if !in_baseline {
                    self.back_to_baseline = 0;
                    return None;
                }
                self.back_to_baseline = self.back_to_baseline.saturating_add(1);
                if self.back_to_baseline >= PERSON_CLEARED_PULSES {
                    self.state = PresenceState::Idle;
                    self.back_to_baseline = 0;
                    self.out_of_baseline = 0;
                    return Some(PresenceEvent::PersonCleared { at: sample.at });
                }
                None
            }
        }
    }
}
