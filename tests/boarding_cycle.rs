use gateflow::config::{EngineSettings, OpenLevel};
use gateflow::engine::door::DEBOUNCE_WINDOW;
use gateflow::engine::sampler::CM_PER_US;
use gateflow::engine::{Engine, InputEvent};
use gateflow::state::{AppState, DoorLiveState};
use gateflow::upstream::UplinkCommand;
use std::sync::mpsc;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

struct Rig {
    engine: Engine,
    commands: mpsc::Receiver<UplinkCommand>,
    state: Arc<RwLock<AppState>>,
    base: Instant,
}

impl Rig {
    fn new(settings: EngineSettings) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut app_state = AppState::new();
        app_state
            .set_doors(vec![DoorLiveState::closed(1)])
            .expect("seed doors");
        let state = Arc::new(RwLock::new(app_state));
        let mut rig = Self {
            engine: Engine::new(
                settings,
                5,
                vec![(1, OpenLevel::High)],
                &[],
                1,
                tx,
                Arc::clone(&state),
            ),
            commands: rx,
            state,
            base: Instant::now(),
        };
        rig.door_level(false, 0);
        rig.drain();
        rig
    }

    fn at(ms: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(ms)
    }

    fn door_level(&mut self, is_high: bool, ms: u64) {
        let now = self.base + Duration::from_millis(ms);
        self.engine.handle(
            InputEvent::DoorLevel {
                door_id: 1,
                is_high,
            },
            now,
            Self::at(ms),
        );
        self.engine.poll(
            now + DEBOUNCE_WINDOW,
            Self::at(ms + DEBOUNCE_WINDOW.as_millis() as u64),
        );
    }

    fn pulse_cm(&mut self, cm: f64, ms: u64) {
        let fall_tick_us = (cm * 2.0 / CM_PER_US).round() as u32;
        self.engine.handle(
            InputEvent::EchoPulse {
                rise_tick_us: 0,
                fall_tick_us,
            },
            self.base + Duration::from_millis(ms),
            Self::at(ms),
        );
    }

    /// One complete crossing: out-of-baseline at `ms`, then three clearing
    /// samples.
    fn crossing(&mut self, ms: u64) {
        self.pulse_cm(85.0, ms);
        for step in 1..=3 {
            self.pulse_cm(50.0, ms + 50 * step);
        }
    }

    fn drain(&mut self) -> Vec<UplinkCommand> {
        self.commands.try_iter().collect()
    }
}

fn settings() -> EngineSettings {
    EngineSettings {
        person_detected_pulses: 1,
        initial_door_open_delay: Duration::ZERO,
        boarding_start_persons: 3,
        boarding_start_time_window: Duration::from_secs(60),
        false_positive_door_opening: Duration::from_secs(10),
        ..EngineSettings::default()
    }
}

fn records(commands: &[UplinkCommand]) -> Vec<gateflow::engine::session::FinalizedSession> {
    commands
        .iter()
        .filter_map(|c| match c {
            UplinkCommand::BoardingComplete(complete) => Some(complete.records.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

#[test]
fn boarding_rush_produces_a_finalized_record() {
    let mut rig = Rig::new(settings());

    rig.door_level(true, 0);
    rig.pulse_cm(50.0, 500); // establishes the baseline
    rig.crossing(5_000);
    rig.crossing(5_200);
    rig.crossing(5_400);
    rig.door_level(false, 40_000);

    let commands = rig.drain();
    let emitted = records(&commands);
    assert_eq!(emitted.len(), 1);
    let record = &emitted[0];

    // Door settled open at 100 ms and closed at 40 100 ms.
    assert_eq!(record.open_duration, Duration::from_secs(40));
    // Three crossings inside the window pin boarding start to the first one.
    assert_eq!(record.boarding_started_at, Some(Rig::at(5_000)));
    assert_eq!(record.boarding_ended_at, Some(Rig::at(5_400)));
    assert_eq!(record.boarding_duration, Some(Duration::from_millis(400)));
    // Three detections minus the trailing beam-clear artifact.
    assert_eq!(record.passengers, 2);
    assert_eq!(record.turnaround, None);

    // Live counters saw the count climb and the door close.
    let counts: Vec<u32> = commands
        .iter()
        .filter_map(|c| match c {
            UplinkCommand::ActiveCount { count, .. } => Some(*count),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![0, 1, 2, 3]);
    let guard = rig.state.read().expect("state lock");
    assert!(!guard.doors()[0].open);
    assert_eq!(guard.doors()[0].active_count, 3);
}

#[test]
fn hysteresis_counts_one_person_per_qualifying_run() {
    let mut rig = Rig::new(EngineSettings {
        person_detected_pulses: 3,
        initial_door_open_delay: Duration::ZERO,
        ..EngineSettings::default()
    });

    rig.door_level(true, 0);
    // Property scenario: baseline 50, then [50, 50, 85, 86, 84, 50, 50, 50].
    rig.pulse_cm(50.0, 500);
    for (index, cm) in [50.0, 50.0, 85.0, 86.0, 84.0, 50.0, 50.0, 50.0]
        .iter()
        .enumerate()
    {
        rig.pulse_cm(*cm, 1_000 + 500 * index as u64);
    }

    let commands = rig.drain();
    let detections = commands
        .iter()
        .filter(|c| matches!(c, UplinkCommand::PersonDetected { .. }))
        .count();
    assert_eq!(detections, 1);
}

#[test]
fn short_cycle_is_suppressed_but_door_state_tracks() {
    let mut rig = Rig::new(settings());

    rig.door_level(true, 0);
    rig.door_level(false, 3_000);

    let commands = rig.drain();
    assert!(records(&commands).is_empty());
    assert!(commands.iter().any(|c| matches!(
        c,
        UplinkCommand::DoorState {
            door_id: 1,
            open: false
        }
    )));
    let guard = rig.state.read().expect("state lock");
    assert!(!guard.doors()[0].open);
}

#[test]
fn turnaround_spans_consecutive_cycles() {
    let mut rig = Rig::new(settings());

    rig.door_level(true, 0);
    rig.door_level(false, 40_000);
    rig.door_level(true, 100_000);
    rig.door_level(false, 140_000);

    let emitted = records(&rig.drain());
    assert_eq!(emitted.len(), 2);
    assert_eq!(emitted[0].turnaround, None);
    // Close settled at 40 100 ms, reopen settled at 100 100 ms.
    assert_eq!(emitted[1].turnaround, Some(Duration::from_secs(60)));
}
