//! The boarding-session engine.
//!
//! One thread drains an ordered event queue fed by the hardware sources. All
//! per-door state machines live here, so no event is ever processed
//! concurrently with another and none of the components need locking. The
//! only deferred work is the contact debounce deadline, which the run loop
//! services between events via `recv_timeout`.
//!
//! Everything leaving the engine is a fire-and-forget [`UplinkCommand`]; the
//! engine never waits on a collaborator.

use crate::config::{EngineSettings, OpenLevel};
use crate::state::{AppState, DoorId};
use crate::upstream::UplinkCommand;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

pub mod coordinator;
pub mod door;
pub mod presence;
pub mod sampler;
pub mod session;

use coordinator::DoorCoordinator;
use door::{DoorDebouncer, DoorTransition};
use presence::{PresenceDetector, PresenceEvent};
use sampler::DistanceSampler;
use session::CloseOutcome;

/// Raw inputs from the hardware sources, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// One completed ultrasonic echo, as free-running microsecond ticks.
    EchoPulse { rise_tick_us: u32, fall_tick_us: u32 },
    /// Raw contact-switch level.
    DoorLevel { door_id: DoorId, is_high: bool },
    /// Operator request to re-establish the distance baseline.
    Recalibrate,
}

struct DoorMonitor {
    debouncer: DoorDebouncer,
    sessions: session::SessionManager,
    open: bool,
}

pub struct Engine {
    settings: EngineSettings,
    dock_number: u32,
    axis_index: usize,
    sampler: DistanceSampler,
    presence: PresenceDetector,
    doors: Vec<DoorMonitor>,
    coordinator: DoorCoordinator,
    sessions_since_kpi: u32,
    uplink: Sender<UplinkCommand>,
    state: Arc<RwLock<AppState>>,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        dock_number: u32,
        doors: Vec<(DoorId, OpenLevel)>,
        pairs: &[(DoorId, DoorId)],
        axis_door: DoorId,
        uplink: Sender<UplinkCommand>,
        state: Arc<RwLock<AppState>>,
    ) -> Self {
        let monitors: Vec<DoorMonitor> = doors
            .iter()
            .map(|(door_id, open_level)| DoorMonitor {
                debouncer: DoorDebouncer::new(*door_id, *open_level),
                sessions: session::SessionManager::new(*door_id, settings.clone()),
                open: false,
            })
            .collect();
        let axis_index = monitors
            .iter()
            .position(|m| m.debouncer.door_id() == axis_door)
            .unwrap_or_else(|| {
                warn!(
                    axis_door = axis_door,
                    "Ultrasonic axis door not configured; falling back to first door"
                );
                0
            });
        Self {
            sampler: DistanceSampler::new(
                settings.baseline_variance_limit_cm,
                settings.baseline_detected_pulses,
            ),
            presence: PresenceDetector::new(settings.person_detected_pulses),
            coordinator: DoorCoordinator::new(pairs),
            settings,
            dock_number,
            axis_index,
            doors: monitors,
            sessions_since_kpi: 0,
            uplink,
            state,
        }
    }

    /// Processes one input event. `now` orders debounce deadlines; `at` stamps
    /// sessions and records.
    pub fn handle(&mut self, event: InputEvent, now: Instant, at: SystemTime) {
        match event {
            InputEvent::EchoPulse {
                rise_tick_us,
                fall_tick_us,
            } => self.on_pulse(rise_tick_us, fall_tick_us, at),
            InputEvent::DoorLevel { door_id, is_high } => {
                match self
                    .doors
                    .iter_mut()
                    .find(|m| m.debouncer.door_id() == door_id)
                {
                    Some(monitor) => monitor.debouncer.level_change(is_high, now),
                    None => warn!(door_id = door_id, "Level change for unconfigured door ignored"),
                }
            }
            InputEvent::Recalibrate => {
                self.sampler.recalibrate();
                self.presence.reset();
            }
        }
    }

    /// Earliest pending debounce deadline across all doors.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.doors
            .iter()
            .filter_map(|m| m.debouncer.next_deadline())
            .min()
    }

    /// Fires every debounce deadline that is due.
    pub fn poll(&mut self, now: Instant, at: SystemTime) {
        loop {
            let mut fired = None;
            for monitor in &mut self.doors {
                if let Some(transition) = monitor.debouncer.poll(now) {
                    fired = Some(transition);
                    break;
                }
            }
            match fired {
                Some(transition) => self.on_transition(transition, at),
                None => break,
            }
        }
    }

    fn on_pulse(&mut self, rise_tick_us: u32, fall_tick_us: u32, at: SystemTime) {
        let Some(sample) = self.sampler.ingest(rise_tick_us, fall_tick_us, at) else {
            return;
        };
        let Some(baseline) = self.sampler.baseline() else {
            return;
        };
        if !self.doors[self.axis_index].sessions.is_active_at(sample.at) {
            return;
        }
        if let Some(event) = self.presence.observe(sample, baseline) {
            self.on_presence(event);
        }
    }

    fn on_presence(&mut self, event: PresenceEvent) {
        match event {
            PresenceEvent::PersonDetected { at, distance_cm } => {
                let door_id = self.doors[self.axis_index].debouncer.door_id();
                let Some(count) = self.doors[self.axis_index].sessions.record_person(at) else {
                    return;
                };
                self.set_live_count(door_id, count);
                self.emit(UplinkCommand::ActiveCount { door_id, count });
                self.emit(UplinkCommand::PersonDetected {
                    door_id,
                    distance_cm,
                });
            }
            PresenceEvent::PersonCleared { .. } => {
                debug!("Person has passed");
            }
        }
    }

    fn on_transition(&mut self, transition: DoorTransition, at: SystemTime) {
        let door_id = transition.door_id();
        let Some(index) = self
            .doors
            .iter()
            .position(|m| m.debouncer.door_id() == door_id)
        else {
            return;
        };

        match transition {
            DoorTransition::Opened(_) => {
                info!(door_id = door_id, "Door open confirmed");
                self.doors[index].open = true;
                self.doors[index].sessions.handle_open(at);
                if index == self.axis_index {
                    self.presence.reset();
                }
                self.set_live_door(door_id, true);
                self.set_live_count(door_id, 0);
                self.emit(UplinkCommand::DoorState {
                    door_id,
                    open: true,
                });
                self.emit(UplinkCommand::ActiveCount { door_id, count: 0 });
                self.emit(UplinkCommand::StatusMessage(format!(
                    "Door {door_id} (Dock {}) opened.",
                    self.dock_number
                )));
            }
            DoorTransition::Closed(_) => {
                info!(door_id = door_id, "Door close confirmed");
                self.doors[index].open = false;
                let outcome = self.doors[index].sessions.handle_close(at);
                self.set_live_door(door_id, false);
                self.emit(UplinkCommand::DoorState {
                    door_id,
                    open: false,
                });
                self.emit(UplinkCommand::StatusMessage(format!(
                    "Door {door_id} (Dock {}) closed.",
                    self.dock_number
                )));

                match outcome {
                    Some(CloseOutcome::Finalized(record)) => {
                        let partner_open = self
                            .coordinator
                            .partner_of(door_id)
                            .and_then(|partner| {
                                self.doors
                                    .iter()
                                    .find(|m| m.debouncer.door_id() == partner)
                            })
                            .is_some_and(|m| m.open);
                        if let Some(complete) =
                            self.coordinator.session_finalized(record, partner_open)
                        {
                            self.emit(UplinkCommand::BoardingComplete(complete));
                        }
                        self.count_finalized_session();
                    }
                    _ => {
                        if let Some(complete) = self.coordinator.door_closed_without_record(door_id)
                        {
                            self.emit(UplinkCommand::BoardingComplete(complete));
                        }
                    }
                }
            }
        }
    }

    fn count_finalized_session(&mut self) {
        self.sessions_since_kpi += 1;
        let trigger = self.settings.door_cycle_trigger;
        if trigger > 0 && self.sessions_since_kpi >= trigger {
            self.sessions_since_kpi = 0;
            info!(trigger = trigger, "Door cycle trigger reached; requesting KPI recompute");
            self.emit(UplinkCommand::RecomputeKpis);
        }
    }

    fn set_live_door(&self, door_id: DoorId, open: bool) {
        match self.state.write() {
            Ok(mut guard) => {
                if let Err(err) = guard.set_door_open(door_id, open) {
                    warn!(door_id = door_id, error = %err, "Failed to update live door state");
                }
            }
            Err(_) => warn!("State lock poisoned while updating door state"),
        }
    }

    fn set_live_count(&self, door_id: DoorId, count: u32) {
        match self.state.write() {
            Ok(mut guard) => {
                if let Err(err) = guard.set_active_count(door_id, count) {
                    warn!(door_id = door_id, error = %err, "Failed to update live count");
                }
            }
            Err(_) => warn!("State lock poisoned while updating live count"),
        }
    }

    fn emit(&self, command: UplinkCommand) {
        if self.uplink.send(command).is_err() {
            warn!("Uplink channel closed; dropping update");
        }
    }
}

/// Spawns the single worker that drains the event queue. Exits when the event
/// channel disconnects or `stop` is raised.
pub fn spawn_engine_thread(
    mut engine: Engine,
    events: Receiver<InputEvent>,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        const IDLE_POLL: Duration = Duration::from_millis(50);
        while !stop.load(Ordering::Relaxed) {
            let now = Instant::now();
            let timeout = engine
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(now))
                .unwrap_or(IDLE_POLL)
                .min(IDLE_POLL);
            match events.recv_timeout(timeout) {
                Ok(event) => engine.handle(event, Instant::now(), SystemTime::now()),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Event channel closed; engine thread exiting");
                    break;
                }
            }
            engine.poll(Instant::now(), SystemTime::now());
        }
    })
}
