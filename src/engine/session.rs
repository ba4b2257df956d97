//! Per-door boarding-session lifecycle.
//!
//! A session spans one confirmed door-open to the matching confirmed close.
//! Passenger crossings land in the open session; at close the session either
//! finalizes into a record for the uplink or is discarded as a false-positive
//! cycle.

use crate::config::EngineSettings;
use crate::state::DoorId;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnTimeStatus {
    Yes,
    No,
    #[serde(rename = "N/A")]
    NotApplicable,
}

#[derive(Debug, Clone)]
pub struct BoardingSession {
    pub door_id: DoorId,
    pub opened_at: SystemTime,
    /// Samples before this point are the door mechanism itself, not people.
    pub activation_at: SystemTime,
    pub turnaround: Option<Duration>,
    pub people_count: u32,
    pub passenger_times: Vec<SystemTime>,
    pub first_passenger: Option<SystemTime>,
}

/// The finalized aggregate handed to the uplink, one per non-discarded cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedSession {
    pub door_id: DoorId,
    pub opened_at: SystemTime,
    pub closed_at: SystemTime,
    pub open_duration: Duration,
    pub passengers: u32,
    pub boarding_started_at: Option<SystemTime>,
    pub boarding_ended_at: Option<SystemTime>,
    pub boarding_duration: Option<Duration>,
    pub on_time: OnTimeStatus,
    pub turnaround: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    Finalized(FinalizedSession),
    /// Open interval was shorter than the false-positive threshold.
    Discarded { open_for: Duration },
}

#[derive(Debug)]
pub struct SessionManager {
    door_id: DoorId,
    settings: EngineSettings,
    current: Option<BoardingSession>,
    last_close: Option<SystemTime>,
}

impl SessionManager {
    pub fn new(door_id: DoorId, settings: EngineSettings) -> Self {
        Self {
            door_id,
            settings,
            current: None,
            last_close: None,
        }
    }

    pub fn door_id(&self) -> DoorId {
        self.door_id
    }

    pub fn current(&self) -> Option<&BoardingSession> {
        self.current.as_ref()
    }

    /// Whether distance samples taken at `at` should count passengers: a
    /// session is open and its activation delay has elapsed.
    pub fn is_active_at(&self, at: SystemTime) -> bool {
        self.current
            .as_ref()
            .is_some_and(|session| at >= session.activation_at)
    }

    /// Starts a new session on a confirmed open. A prior session that never
    /// closed is discarded with a warning, never merged.
    pub fn handle_open(&mut self, at: SystemTime) -> &BoardingSession {
        if let Some(stale) = self.current.take() {
            warn!(
                door_id = self.door_id,
                people_count = stale.people_count,
                "Door opened with an unterminated session; discarding stale session"
            );
        }

        let turnaround = self
            .last_close
            .and_then(|closed| at.duration_since(closed).ok())
            .filter(|t| *t < self.settings.turnaround_reset);
        if let Some(turnaround) = turnaround {
            info!(
                door_id = self.door_id,
                turnaround_secs = turnaround.as_secs_f64(),
                "Turnaround time"
            );
        }

        self.current.insert(BoardingSession {
            door_id: self.door_id,
            opened_at: at,
            activation_at: at + self.settings.initial_door_open_delay,
            turnaround,
            people_count: 0,
            passenger_times: Vec::new(),
            first_passenger: None,
        })
    }

    /// Records one confirmed passenger crossing. Returns the new count, or
    /// `None` when no session is open.
    pub fn record_person(&mut self, at: SystemTime) -> Option<u32> {
        let settings = &self.settings;
        let session = self.current.as_mut()?;

        if session.passenger_times.last().is_some_and(|last| at <= *last) {
            warn!(
                door_id = session.door_id,
                "Non-increasing passenger timestamp dropped"
            );
            return Some(session.people_count);
        }

        session.people_count += 1;
        session.passenger_times.push(at);
        debug!(
            door_id = session.door_id,
            people_count = session.people_count,
            "Person detected"
        );

        // Sliding-window boarding-start confirmation: the rush begins with the
        // first of `boarding_start_persons` crossings that land inside the
        // window. Isolated stragglers never set it, and once set it is final
        // for the session.
        if session.first_passenger.is_none() {
            let times = &session.passenger_times;
            let persons = settings.boarding_start_persons.max(1);
            if times.len() >= persons {
                let window_start = times[times.len() - persons];
                let span = at.duration_since(window_start).unwrap_or_default();
                if span <= settings.boarding_start_time_window {
                    session.first_passenger = Some(window_start);
                    info!(
                        door_id = session.door_id,
                        "Boarding confirmed; first passenger pinned"
                    );
                }
            }
        }

        Some(session.people_count)
    }

    /// Closes the open session. `None` when no session was open (close seen
    /// while already idle); otherwise either a finalized record or a discard.
    ///
    /// The close time feeds the next cycle's turnaround either way, matching
    /// the deployed behavior for discarded cycles.
    pub fn handle_close(&mut self, at: SystemTime) -> Option<CloseOutcome> {
        let session = self.current.take()?;
        self.last_close = Some(at);

        let open_for = at.duration_since(session.opened_at).unwrap_or_default();
        if open_for < self.settings.false_positive_door_opening {
            warn!(
                door_id = session.door_id,
                open_secs = open_for.as_secs_f64(),
                "Door cycle below false-positive threshold; session discarded"
            );
            return Some(CloseOutcome::Discarded { open_for });
        }

        let boarding_started_at = session.first_passenger;
        let boarding_ended_at = boarding_started_at
            .and_then(|_| session.passenger_times.last().copied());
        let boarding_duration = match (boarding_started_at, boarding_ended_at) {
            (Some(start), Some(end)) => end.duration_since(start).ok(),
            _ => None,
        };
        let boarding_latency = boarding_started_at
            .and_then(|start| start.duration_since(session.opened_at).ok());

        let finalized = FinalizedSession {
            door_id: session.door_id,
            opened_at: session.opened_at,
            closed_at: at,
            open_duration: open_for,
            // The beam clears once more as the door shuts; the trailing
            // detection is excluded from the emitted count.
            passengers: session.people_count.saturating_sub(1),
            boarding_started_at,
            boarding_ended_at,
            boarding_duration,
            on_time: classify_on_time(
                boarding_latency,
                session.turnaround,
                self.settings.on_time_determination_limit,
                self.settings.turnaround_reset,
            ),
            turnaround: session.turnaround,
        };
        info!(
            door_id = finalized.door_id,
            open_secs = finalized.open_duration.as_secs_f64(),
            passengers = finalized.passengers,
            "Boarding session finalized"
        );
        Some(CloseOutcome::Finalized(finalized))
    }
}

/// On-time policy: `Yes` when boarding began strictly later than the latency
/// limit after open and the prior turnaround strictly exceeded the reset
/// threshold (or none exists); `No` when boarding began within the limit and
/// the prior turnaround met or exceeded the threshold (or none exists);
/// otherwise `N/A`. An early boarding after a short turnaround therefore
/// never classifies as late.
fn classify_on_time(
    boarding_latency: Option<Duration>,
    turnaround: Option<Duration>,
    latency_limit: Duration,
    turnaround_reset: Duration,
) -> OnTimeStatus {
    let Some(latency) = boarding_latency else {
        return OnTimeStatus::NotApplicable;
    };
    let turnaround_exceeded = turnaround.is_none_or(|t| t > turnaround_reset);
    let turnaround_met = turnaround.is_none_or(|t| t >= turnaround_reset);
    if latency > latency_limit && turnaround_exceeded {
        OnTimeStatus::Yes
    } else if latency <= latency_limit && turnaround_met {
        OnTimeStatus::No
    } else {
        OnTimeStatus::NotApplicable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn settings() -> EngineSettings {
        EngineSettings {
            initial_door_open_delay: Duration::from_secs(3),
            false_positive_door_opening: Duration::from_secs(10),
            boarding_start_persons: 3,
            boarding_start_time_window: Duration::from_secs(60),
            turnaround_reset: Duration::from_secs(20 * 60),
            on_time_determination_limit: Duration::from_secs(120),
            ..EngineSettings::default()
        }
    }

    fn at(ms: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(ms)
    }

    fn finalized(outcome: Option<CloseOutcome>) -> FinalizedSession {
        match outcome {
            Some(CloseOutcome::Finalized(session)) => session,
            other => panic!("expected finalized session, got {other:?}"),
        }
    }

    #[test]
    fn boarding_scenario_pins_first_passenger_and_duration() {
        let mut manager = SessionManager::new(1, settings());
        manager.handle_open(at(0));

        manager.record_person(at(5_000));
        manager.record_person(at(5_200));
        manager.record_person(at(5_400));

        let session = manager.current().expect("session open");
        assert_eq!(session.first_passenger, Some(at(5_000)));

        let record = finalized(manager.handle_close(at(40_000)));
        assert_eq!(record.open_duration, Duration::from_secs(40));
        assert_eq!(record.boarding_started_at, Some(at(5_000)));
        assert_eq!(record.boarding_ended_at, Some(at(5_400)));
        assert_eq!(record.boarding_duration, Some(Duration::from_millis(400)));
        // Three detections minus the trailing beam-clear artifact.
        assert_eq!(record.passengers, 2);
    }

    #[test]
    fn emitted_count_is_detections_minus_one_clamped() {
        let mut manager = SessionManager::new(1, settings());
        manager.handle_open(at(0));
        let record = finalized(manager.handle_close(at(30_000)));
        assert_eq!(record.passengers, 0);

        manager.handle_open(at(60_000));
        manager.record_person(at(65_000));
        let record = finalized(manager.handle_close(at(90_000)));
        assert_eq!(record.passengers, 0);
    }

    #[test]
    fn first_passenger_is_idempotent_within_a_session() {
        let mut manager = SessionManager::new(1, settings());
        manager.handle_open(at(0));
        manager.record_person(at(5_000));
        manager.record_person(at(5_200));
        manager.record_person(at(5_400));
        assert_eq!(
            manager.current().unwrap().first_passenger,
            Some(at(5_000))
        );

        // A later, denser rush must not move the confirmation.
        manager.record_person(at(20_000));
        manager.record_person(at(20_100));
        manager.record_person(at(20_200));

        assert_eq!(
            manager.current().unwrap().first_passenger,
            Some(at(5_000))
        );
    }

    #[test]
    fn stragglers_outside_the_window_do_not_confirm_boarding() {
        let mut manager = SessionManager::new(1, settings());
        manager.handle_open(at(0));

        // Two isolated crossings, then a real rush much later.
        manager.record_person(at(1_000));
        manager.record_person(at(120_000));
        manager.record_person(at(300_000));
        assert_eq!(manager.current().unwrap().first_passenger, None);

        manager.record_person(at(310_000));
        manager.record_person(at(320_000));
        // Window is the last three crossings: 300s..320s fits in 60s.
        assert_eq!(
            manager.current().unwrap().first_passenger,
            Some(at(300_000))
        );
    }

    #[test]
    fn short_cycle_is_discarded_but_still_feeds_turnaround() {
        let mut manager = SessionManager::new(1, settings());
        manager.handle_open(at(0));

        let outcome = manager.handle_close(at(3_000));
        assert!(matches!(
            outcome,
            Some(CloseOutcome::Discarded { open_for }) if open_for == Duration::from_secs(3)
        ));

        // Next open measures turnaround from the discarded cycle's close.
        let session = manager.handle_open(at(63_000));
        assert_eq!(session.turnaround, Some(Duration::from_secs(60)));
    }

    #[test]
    fn first_session_has_no_turnaround() {
        let mut manager = SessionManager::new(1, settings());
        let session = manager.handle_open(at(0));
        assert_eq!(session.turnaround, None);
    }

    #[test]
    fn turnaround_above_reset_ceiling_is_not_applicable() {
        let mut manager = SessionManager::new(1, settings());
        manager.handle_open(at(0));
        manager.handle_close(at(30_000));

        // 21 minutes later: above the 20 minute ceiling.
        let session = manager.handle_open(at(30_000 + 21 * 60 * 1_000));
        assert_eq!(session.turnaround, None);

        manager.handle_close(at(30_000 + 21 * 60 * 1_000 + 30_000));
        // 5 minutes later: a real turnaround.
        let reopened_at = 30_000 + 21 * 60 * 1_000 + 30_000 + 5 * 60 * 1_000;
        let session = manager.handle_open(at(reopened_at));
        assert_eq!(session.turnaround, Some(Duration::from_secs(5 * 60)));
    }

    #[test]
    fn close_without_open_yields_nothing() {
        let mut manager = SessionManager::new(1, settings());
        assert_eq!(manager.handle_close(at(1_000)), None);
    }

    #[test]
    fn reopen_discards_stale_session() {
        let mut manager = SessionManager::new(1, settings());
        manager.handle_open(at(0));
        manager.record_person(at(5_000));

        let session = manager.handle_open(at(60_000));

        assert_eq!(session.people_count, 0);
        assert!(session.passenger_times.is_empty());
        // The stale session never closed, so no turnaround exists.
        assert_eq!(session.turnaround, None);
    }

    #[test]
    fn activation_delay_gates_sample_validity() {
        let mut manager = SessionManager::new(1, settings());
        assert!(!manager.is_active_at(at(0)));

        manager.handle_open(at(0));
        assert!(!manager.is_active_at(at(2_999)));
        assert!(manager.is_active_at(at(3_000)));

        manager.handle_close(at(30_000));
        assert!(!manager.is_active_at(at(31_000)));
    }

    #[test]
    fn non_increasing_passenger_timestamps_are_dropped() {
        let mut manager = SessionManager::new(1, settings());
        manager.handle_open(at(0));
        assert_eq!(manager.record_person(at(5_000)), Some(1));
        assert_eq!(manager.record_person(at(5_000)), Some(1));
        assert_eq!(manager.record_person(at(4_000)), Some(1));
        assert_eq!(manager.record_person(at(6_000)), Some(2));
    }

    #[test]
    fn no_confirmed_boarding_yields_not_applicable() {
        let mut manager = SessionManager::new(1, settings());
        manager.handle_open(at(0));
        manager.record_person(at(5_000));

        let record = finalized(manager.handle_close(at(30_000)));

        assert_eq!(record.on_time, OnTimeStatus::NotApplicable);
        assert_eq!(record.boarding_duration, None);
        assert_eq!(record.boarding_started_at, None);
    }

    #[test]
    fn on_time_policy_matrix() {
        let limit = Duration::from_secs(120);
        let reset = Duration::from_secs(20 * 60);

        // Late boarding, no prior turnaround: on time.
        assert_eq!(
            classify_on_time(Some(Duration::from_secs(180)), None, limit, reset),
            OnTimeStatus::Yes
        );
        // Early boarding, no prior turnaround: not on time.
        assert_eq!(
            classify_on_time(Some(Duration::from_secs(30)), None, limit, reset),
            OnTimeStatus::No
        );
        // Early boarding after a short turnaround: treated as on schedule.
        assert_eq!(
            classify_on_time(
                Some(Duration::from_secs(30)),
                Some(Duration::from_secs(300)),
                limit,
                reset
            ),
            OnTimeStatus::NotApplicable
        );
        // Late boarding after a short turnaround: indeterminate.
        assert_eq!(
            classify_on_time(
                Some(Duration::from_secs(180)),
                Some(Duration::from_secs(300)),
                limit,
                reset
            ),
            OnTimeStatus::NotApplicable
        );
        // Boundary: latency exactly at the limit counts as within it.
        assert_eq!(
            classify_on_time(Some(limit), None, limit, reset),
            OnTimeStatus::No
        );
        // No boarding confirmation at all.
        assert_eq!(classify_on_time(None, None, limit, reset), OnTimeStatus::NotApplicable);
    }
}
