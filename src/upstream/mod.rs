//! Collaborator stores and the uplink worker.
//!
//! The engine never talks to the network: it pushes [`UplinkCommand`]s onto an
//! unbounded channel and moves on. The uplink thread drains the channel and
//! performs the actual record-store, telemetry, and indicator calls. Delivery
//! failures are logged and dropped; they never reach back into the engine.

use crate::engine::coordinator::BoardingComplete;
use crate::gpio::lights::IndicatorLights;
use crate::state::{AppState, DoorId};
use crate::upstream::records::SessionRecord;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{info, warn};

pub mod http;
pub mod kpi;
pub mod mock;
pub mod records;
pub mod rest;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("dns error: {0}")]
    Dns(String),
    #[error("connect error: {0}")]
    Connect(std::io::Error),
    #[error("io error: {0}")]
    Io(std::io::Error),
    #[error("http status {0} ({1})")]
    Http(u16, String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record error: {0}")]
    Record(#[from] records::RecordError),
}

/// Record-oriented datastore holding one row per finalized session.
pub trait RecordStore: Send {
    fn append_session(&mut self, record: &SessionRecord) -> Result<(), UpstreamError>;
    fn recent_sessions(&mut self, since: SystemTime) -> Result<Vec<SessionRecord>, UpstreamError>;
}

/// Realtime key-value store backing the live display.
pub trait TelemetryStore: Send {
    fn set_door_open(&mut self, door_id: DoorId, open: bool) -> Result<(), UpstreamError>;
    fn set_active_count(&mut self, door_id: DoorId, count: u32) -> Result<(), UpstreamError>;
    fn set_status_message(&mut self, message: &str) -> Result<(), UpstreamError>;
    fn publish_last_session(&mut self, record: &SessionRecord) -> Result<(), UpstreamError>;
    fn publish_kpis(&mut self, summary: &kpi::KpiSummary) -> Result<(), UpstreamError>;
    fn push_log(&mut self, message: &str) -> Result<(), UpstreamError>;
}

/// Stand-in for deployments with no record store configured.
pub struct NoopRecordStore;

impl RecordStore for NoopRecordStore {
    fn append_session(&mut self, _record: &SessionRecord) -> Result<(), UpstreamError> {
        Ok(())
    }

    fn recent_sessions(
        &mut self,
        _since: SystemTime,
    ) -> Result<Vec<SessionRecord>, UpstreamError> {
        Ok(Vec::new())
    }
}

/// Stand-in for deployments with no telemetry store configured.
pub struct NoopTelemetryStore;

impl TelemetryStore for NoopTelemetryStore {
    fn set_door_open(&mut self, _door_id: DoorId, _open: bool) -> Result<(), UpstreamError> {
        Ok(())
    }

    fn set_active_count(&mut self, _door_id: DoorId, _count: u32) -> Result<(), UpstreamError> {
        Ok(())
    }

    fn set_status_message(&mut self, _message: &str) -> Result<(), UpstreamError> {
        Ok(())
    }

    fn publish_last_session(&mut self, _record: &SessionRecord) -> Result<(), UpstreamError> {
        Ok(())
    }

    fn publish_kpis(&mut self, _summary: &kpi::KpiSummary) -> Result<(), UpstreamError> {
        Ok(())
    }

    fn push_log(&mut self, _message: &str) -> Result<(), UpstreamError> {
        Ok(())
    }
}

/// Everything the engine asks the uplink to do, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum UplinkCommand {
    DoorState { door_id: DoorId, open: bool },
    ActiveCount { door_id: DoorId, count: u32 },
    StatusMessage(String),
    PersonDetected { door_id: DoorId, distance_cm: f64 },
    BoardingComplete(BoardingComplete),
    RecomputeKpis,
}

pub struct Uplink {
    records: Box<dyn RecordStore>,
    telemetry: Box<dyn TelemetryStore>,
    lights: Box<dyn IndicatorLights>,
    state: Arc<RwLock<AppState>>,
    dock_number: u32,
}

impl Uplink {
    pub fn new(
        records: Box<dyn RecordStore>,
        telemetry: Box<dyn TelemetryStore>,
        lights: Box<dyn IndicatorLights>,
        state: Arc<RwLock<AppState>>,
        dock_number: u32,
    ) -> Self {
        Self {
            records,
            telemetry,
            lights,
            state,
            dock_number,
        }
    }

    /// Applies one command. Every failure is contained here.
    pub fn handle(&mut self, command: UplinkCommand) {
        match command {
            UplinkCommand::DoorState { door_id, open } => {
                let lights_result = if open {
                    self.lights.door_open()
                } else {
                    self.lights.door_closed()
                };
                if let Err(err) = lights_result {
                    warn!(door_id = door_id, error = %err, "Indicator update failed");
                }
                if let Err(err) = self.telemetry.set_door_open(door_id, open) {
                    warn!(door_id = door_id, error = %err, "Door state telemetry failed");
                }
            }
            UplinkCommand::ActiveCount { door_id, count } => {
                if let Err(err) = self.telemetry.set_active_count(door_id, count) {
                    warn!(door_id = door_id, error = %err, "Active count telemetry failed");
                }
            }
            UplinkCommand::StatusMessage(message) => {
                if let Err(err) = self.telemetry.set_status_message(&message) {
                    warn!(error = %err, "Status message telemetry failed");
                }
                if let Err(err) = self.telemetry.push_log(&message) {
                    warn!(error = %err, "Running log push failed");
                }
            }
            UplinkCommand::PersonDetected { door_id, distance_cm } => {
                info!(
                    door_id = door_id,
                    distance_cm = distance_cm,
                    "Person detected"
                );
                if let Err(err) = self.lights.flash_person() {
                    warn!(error = %err, "Indicator flash failed");
                }
            }
            UplinkCommand::BoardingComplete(complete) => {
                for session in &complete.records {
                    let record = match SessionRecord::from_finalized(session, self.dock_number) {
                        Ok(record) => record,
                        Err(err) => {
                            warn!(
                                door_id = session.door_id,
                                error = %err,
                                "Dropping unformattable session record"
                            );
                            continue;
                        }
                    };
                    match self.state.write() {
                        Ok(mut guard) => {
                            if let Err(err) = guard.set_last_session(record.clone()) {
                                warn!(error = %err, "Failed to store last session in state");
                            }
                        }
                        Err(_) => warn!("State lock poisoned while storing last session"),
                    }
                    if let Err(err) = self.records.append_session(&record) {
                        warn!(
                            door_id = record.door_number,
                            error = %err,
                            "Record store append failed"
                        );
                    }
                    if let Err(err) = self.telemetry.publish_last_session(&record) {
                        warn!(
                            door_id = record.door_number,
                            error = %err,
                            "Last session telemetry failed"
                        );
                    }
                }
            }
            UplinkCommand::RecomputeKpis => {
                if let Err(err) = kpi::recompute(
                    self.records.as_mut(),
                    self.telemetry.as_mut(),
                    SystemTime::now(),
                ) {
                    warn!(error = %err, "KPI recomputation failed");
                }
            }
        }
    }
}

/// Drains uplink commands until the engine drops its sender.
pub fn spawn_uplink_thread(
    mut uplink: Uplink,
    commands: Receiver<UplinkCommand>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while let Ok(command) = commands.recv() {
            uplink.handle(command);
        }
        info!("Uplink channel closed; uplink thread exiting");
    })
}
