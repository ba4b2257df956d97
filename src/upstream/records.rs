//! The flat session record delivered to the record store.

use crate::engine::session::{FinalizedSession, OnTimeStatus};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("timestamp format error: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// One finalized, non-discarded boarding cycle as a flat key/value structure.
/// Optional fields are omitted entirely rather than sent unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub dock_number: u32,
    pub door_number: u32,
    pub door_open: String,
    pub door_close: String,
    pub door_open_duration_secs: f64,
    pub passengers_counted: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boarding_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boarding_stop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boarding_duration_secs: Option<f64>,
    pub on_time: OnTimeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turnaround_secs: Option<f64>,
}

impl SessionRecord {
    pub fn from_finalized(
        session: &FinalizedSession,
        dock_number: u32,
    ) -> Result<Self, RecordError> {
        Ok(Self {
            dock_number,
            door_number: session.door_id,
            door_open: format_timestamp(session.opened_at)?,
            door_close: format_timestamp(session.closed_at)?,
            door_open_duration_secs: session.open_duration.as_secs_f64(),
            passengers_counted: session.passengers,
            boarding_start: session
                .boarding_started_at
                .map(format_timestamp)
                .transpose()?,
            boarding_stop: session
                .boarding_ended_at
                .map(format_timestamp)
                .transpose()?,
            boarding_duration_secs: session.boarding_duration.map(|d| d.as_secs_f64()),
            on_time: session.on_time,
            turnaround_secs: session.turnaround.map(|d| d.as_secs_f64()),
        })
    }
}

pub fn format_timestamp(timestamp: SystemTime) -> Result<String, RecordError> {
    let datetime = OffsetDateTime::from(timestamp);
    Ok(datetime.format(&Rfc3339)?)
}
