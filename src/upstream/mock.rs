//! In-memory stores for tests.
//!
//! The uplink consumes its stores as boxed trait objects, so the mocks write
//! through shared handles that the test keeps for inspection.

use crate::state::DoorId;
use crate::upstream::kpi::KpiSummary;
use crate::upstream::records::SessionRecord;
use crate::upstream::{RecordStore, TelemetryStore, UpstreamError};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Debug, Default)]
struct RecordsInner {
    appended: Vec<SessionRecord>,
    recent: Vec<SessionRecord>,
    fail_append: bool,
    fail_recent: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SharedRecords(Arc<Mutex<RecordsInner>>);

impl SharedRecords {
    pub fn appended(&self) -> Vec<SessionRecord> {
        self.0.lock().expect("records mock lock").appended.clone()
    }

    pub fn set_recent(&self, recent: Vec<SessionRecord>) {
        self.0.lock().expect("records mock lock").recent = recent;
    }

    pub fn set_fail_append(&self, fail: bool) {
        self.0.lock().expect("records mock lock").fail_append = fail;
    }

    pub fn set_fail_recent(&self, fail: bool) {
        self.0.lock().expect("records mock lock").fail_recent = fail;
    }
}

pub struct MockRecordStore {
    shared: SharedRecords,
}

impl MockRecordStore {
    pub fn new(shared: SharedRecords) -> Self {
        Self { shared }
    }
}

impl RecordStore for MockRecordStore {
    fn append_session(&mut self, record: &SessionRecord) -> Result<(), UpstreamError> {
        let mut inner = self.shared.0.lock().expect("records mock lock");
        if inner.fail_append {
            return Err(UpstreamError::Http(503, "mock append failure".to_string()));
        }
        inner.appended.push(record.clone());
        Ok(())
    }

    fn recent_sessions(
        &mut self,
        _since: SystemTime,
    ) -> Result<Vec<SessionRecord>, UpstreamError> {
        let inner = self.shared.0.lock().expect("records mock lock");
        if inner.fail_recent {
            return Err(UpstreamError::Http(503, "mock query failure".to_string()));
        }
        Ok(inner.recent.clone())
    }
}

#[derive(Debug, Default)]
struct TelemetryInner {
    door_states: Vec<(DoorId, bool)>,
    counts: Vec<(DoorId, u32)>,
    messages: Vec<String>,
    last_sessions: Vec<SessionRecord>,
    kpis: Vec<KpiSummary>,
    logs: Vec<String>,
    fail_all: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SharedTelemetry(Arc<Mutex<TelemetryInner>>);

impl SharedTelemetry {
    pub fn door_states(&self) -> Vec<(DoorId, bool)> {
        self.0.lock().expect("telemetry mock lock").door_states.clone()
    }

    pub fn counts(&self) -> Vec<(DoorId, u32)> {
        self.0.lock().expect("telemetry mock lock").counts.clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.lock().expect("telemetry mock lock").messages.clone()
    }

    pub fn last_sessions(&self) -> Vec<SessionRecord> {
        self.0
            .lock()
            .expect("telemetry mock lock")
            .last_sessions
            .clone()
    }

    pub fn kpis(&self) -> Vec<KpiSummary> {
        self.0.lock().expect("telemetry mock lock").kpis.clone()
    }

    pub fn logs(&self) -> Vec<String> {
        self.0.lock().expect("telemetry mock lock").logs.clone()
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.0.lock().expect("telemetry mock lock").fail_all = fail;
    }
}

pub struct MockTelemetryStore {
    shared: SharedTelemetry,
}

impl MockTelemetryStore {
    pub fn new(shared: SharedTelemetry) -> Self {
        Self { shared }
    }

    fn with_inner(
        &mut self,
        apply: impl FnOnce(&mut TelemetryInner),
    ) -> Result<(), UpstreamError> {
        let mut inner = self.shared.0.lock().expect("telemetry mock lock");
        if inner.fail_all {
            return Err(UpstreamError::Http(503, "mock telemetry failure".to_string()));
        }
        apply(&mut inner);
        Ok(())
    }
}

impl TelemetryStore for MockTelemetryStore {
    fn set_door_open(&mut self, door_id: DoorId, open: bool) -> Result<(), UpstreamError> {
        self.with_inner(|inner| inner.door_states.push((door_id, open)))
    }

    fn set_active_count(&mut self, door_id: DoorId, count: u32) -> Result<(), UpstreamError> {
        self.with_inner(|inner| inner.counts.push((door_id, count)))
    }

    fn set_status_message(&mut self, message: &str) -> Result<(), UpstreamError> {
        let message = message.to_string();
        self.with_inner(|inner| inner.messages.push(message))
    }

    fn publish_last_session(&mut self, record: &SessionRecord) -> Result<(), UpstreamError> {
        let record = record.clone();
        self.with_inner(|inner| inner.last_sessions.push(record))
    }

    fn publish_kpis(&mut self, summary: &KpiSummary) -> Result<(), UpstreamError> {
        let summary = summary.clone();
        self.with_inner(|inner| inner.kpis.push(summary))
    }

    fn push_log(&mut self, message: &str) -> Result<(), UpstreamError> {
        let message = message.to_string();
        self.with_inner(|inner| inner.logs.push(message))
    }
}
