use crate::error::AppError;
use crate::upstream::records::SessionRecord;
use tokio::sync::watch;

pub type DoorId = u32;

/// Live per-door counters surfaced to the API and the telemetry uplink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoorLiveState {
    pub door_id: DoorId,
    pub open: bool,
    pub active_count: u32,
}

impl DoorLiveState {
    pub fn closed(door_id: DoorId) -> Self {
        Self {
            door_id,
            open: false,
            active_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverStatus {
    Ready,
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    pub name: String,
    pub status: DriverStatus,
}

#[derive(Debug)]
pub struct AppState {
    doors: Vec<DoorLiveState>,
    doors_tx: watch::Sender<Vec<DoorLiveState>>,
    _doors_rx: watch::Receiver<Vec<DoorLiveState>>,
    last_session: Option<SessionRecord>,
    last_session_tx: watch::Sender<Option<SessionRecord>>,
    _last_session_rx: watch::Receiver<Option<SessionRecord>>,
    status_message: String,
    status_message_tx: watch::Sender<String>,
    _status_message_rx: watch::Receiver<String>,
    drivers: Vec<DriverInfo>,
    drivers_tx: watch::Sender<Vec<DriverInfo>>,
    _drivers_rx: watch::Receiver<Vec<DriverInfo>>,
}

impl AppState {
    pub fn new() -> Self {
        let (doors_tx, doors_rx) = watch::channel(Vec::new());
        let (last_session_tx, last_session_rx) = watch::channel(None);
        let (status_message_tx, status_message_rx) = watch::channel(String::new());
        let (drivers_tx, drivers_rx) = watch::channel(Vec::new());
        Self {
            doors: Vec::new(),
            doors_tx,
            _doors_rx: doors_rx,
            last_session: None,
            last_session_tx,
            _last_session_rx: last_session_rx,
            status_message: String::new(),
            status_message_tx,
            _status_message_rx: status_message_rx,
            drivers: Vec::new(),
            drivers_tx,
            _drivers_rx: drivers_rx,
        }
    }

    pub fn doors(&self) -> &[DoorLiveState] {
        &self.doors
    }

    pub fn subscribe_doors(&self) -> watch::Receiver<Vec<DoorLiveState>> {
        self.doors_tx.subscribe()
    }

    pub fn set_doors(&mut self, doors: Vec<DoorLiveState>) -> Result<(), AppError> {
        self.doors = doors.clone();
        self.doors_tx.send(doors).map_err(|_| AppError::WatchSend)
    }

    pub fn set_door_open(&mut self, door_id: DoorId, open: bool) -> Result<(), AppError> {
        let door = self
            .doors
            .iter_mut()
            .find(|d| d.door_id == door_id)
            .ok_or(AppError::UnknownDoor(door_id))?;
        door.open = open;
        self.doors_tx
            .send(self.doors.clone())
            .map_err(|_| AppError::WatchSend)
    }

    pub fn set_active_count(&mut self, door_id: DoorId, count: u32) -> Result<(), AppError> {
        let door = self
            .doors
            .iter_mut()
            .find(|d| d.door_id == door_id)
            .ok_or(AppError::UnknownDoor(door_id))?;
        door.active_count = count;
        self.doors_tx
            .send(self.doors.clone())
            .map_err(|_| AppError::WatchSend)
    }

    pub fn last_session(&self) -> Option<&SessionRecord> {
        self.last_session.as_ref()
    }

    pub fn subscribe_last_session(&self) -> watch::Receiver<Option<SessionRecord>> {
        self.last_session_tx.subscribe()
    }

    pub fn set_last_session(&mut self, record: SessionRecord) -> Result<(), AppError> {
        self.last_session = Some(record.clone());
        self.last_session_tx
            .send(Some(record))
            .map_err(|_| AppError::WatchSend)
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn subscribe_status_message(&self) -> watch::Receiver<String> {
        self.status_message_tx.subscribe()
    }

    pub fn set_status_message(&mut self, message: String) -> Result<(), AppError> {
        self.status_message = message.clone();
        self.status_message_tx
            .send(message)
            .map_err(|_| AppError::WatchSend)
    }

    pub fn drivers(&self) -> &[DriverInfo] {
        &self.drivers
    }

    pub fn subscribe_drivers(&self) -> watch::Receiver<Vec<DriverInfo>> {
        self.drivers_tx.subscribe()
    }

    pub fn set_drivers(&mut self, drivers: Vec<DriverInfo>) -> Result<(), AppError> {
        self.drivers = drivers.clone();
        self.drivers_tx
            .send(drivers)
            .map_err(|_| AppError::WatchSend)
    }

    /// Updates (or registers) the health entry for one driver.
    pub fn set_driver_status(&mut self, name: &str, status: DriverStatus) -> Result<(), AppError> {
        match self.drivers.iter_mut().find(|d| d.name == name) {
            Some(driver) => driver.status = status,
            None => self.drivers.push(DriverInfo {
                name: name.to_string(),
                status,
            }),
        }
        self.drivers_tx
            .send(self.drivers.clone())
            .map_err(|_| AppError::WatchSend)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
