use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("event channel closed")]
    EventSend,
    #[error("watch channel send failed")]
    WatchSend,
    #[error("unknown door id: {0}")]
    UnknownDoor(u32),
}
