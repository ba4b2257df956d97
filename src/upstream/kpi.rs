//! Rolling KPIs recomputed from the record store.
//!
//! Triggered by the engine every `door_cycle_trigger` finalized sessions. The
//! engine only raises the request; fetching, averaging, and publishing all
//! happen here on the uplink thread.

use crate::engine::session::OnTimeStatus;
use crate::upstream::records::SessionRecord;
use crate::upstream::{RecordStore, TelemetryStore, UpstreamError};
use serde::Serialize;
use std::time::{Duration, SystemTime};
use tracing::info;

pub const KPI_LOOKBACK_DAYS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoorTurnaround {
    pub door_number: u32,
    pub average_turnaround_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub sessions: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_boarding_duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_passengers: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_time_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_turnaround_secs: Option<f64>,
    pub per_door_turnaround: Vec<DoorTurnaround>,
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0u32;
    for value in values {
        sum += value;
        count += 1;
    }
    (count > 0).then(|| sum / f64::from(count))
}

pub fn summarize(records: &[SessionRecord]) -> KpiSummary {
    let average_boarding_duration_secs =
        average(records.iter().filter_map(|r| r.boarding_duration_secs));
    let average_passengers = average(records.iter().map(|r| f64::from(r.passengers_counted)));
    let average_turnaround_secs = average(records.iter().filter_map(|r| r.turnaround_secs));

    // N/A sessions carry no verdict and are excluded from the percentage.
    let decided = records
        .iter()
        .filter(|r| r.on_time != OnTimeStatus::NotApplicable)
        .count() as u32;
    let on_time = records
        .iter()
        .filter(|r| r.on_time == OnTimeStatus::Yes)
        .count() as u32;
    let on_time_percent =
        (decided > 0).then(|| f64::from(on_time) / f64::from(decided) * 100.0);

    let mut per_door_turnaround = Vec::new();
    let mut door_numbers: Vec<u32> = records.iter().map(|r| r.door_number).collect();
    door_numbers.sort_unstable();
    door_numbers.dedup();
    for door_number in door_numbers {
        if let Some(avg) = average(
            records
                .iter()
                .filter(|r| r.door_number == door_number)
                .filter_map(|r| r.turnaround_secs),
        ) {
            per_door_turnaround.push(DoorTurnaround {
                door_number,
                average_turnaround_secs: avg,
            });
        }
    }

    KpiSummary {
        sessions: records.len() as u32,
        average_boarding_duration_secs,
        average_passengers,
        on_time_percent,
        average_turnaround_secs,
        per_door_turnaround,
    }
}

pub fn recompute(
    records: &mut dyn RecordStore,
    telemetry: &mut dyn TelemetryStore,
    now: SystemTime,
) -> Result<(), UpstreamError> {
    let since = now
        .checked_sub(Duration::from_secs(KPI_LOOKBACK_DAYS * 24 * 60 * 60))
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let recent = records.recent_sessions(since)?;
    let summary = summarize(&recent);
    info!(
        sessions = summary.sessions,
        on_time_percent = summary.on_time_percent,
        "Publishing recomputed KPIs"
    );
    telemetry.publish_kpis(&summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::mock::{MockRecordStore, MockTelemetryStore, SharedRecords, SharedTelemetry};

    fn record(
        door_number: u32,
        passengers: u32,
        boarding_secs: Option<f64>,
        turnaround_secs: Option<f64>,
        on_time: OnTimeStatus,
    ) -> SessionRecord {
        SessionRecord {
            dock_number: 1,
            door_number,
            door_open: "2026-08-01T10:00:00Z".to_string(),
            door_close: "2026-08-01T10:05:00Z".to_string(),
            door_open_duration_secs: 300.0,
            passengers_counted: passengers,
            boarding_start: None,
            boarding_stop: None,
            boarding_duration_secs: boarding_secs,
            on_time,
            turnaround_secs,
        }
    }

    #[test]
    fn empty_history_yields_empty_summary() {
        let summary = summarize(&[]);

        assert_eq!(summary.sessions, 0);
        assert_eq!(summary.average_boarding_duration_secs, None);
        assert_eq!(summary.average_passengers, None);
        assert_eq!(summary.on_time_percent, None);
        assert_eq!(summary.average_turnaround_secs, None);
        assert!(summary.per_door_turnaround.is_empty());
    }

    #[test]
    fn averages_skip_missing_values() {
        let records = vec![
            record(1, 10, Some(120.0), Some(300.0), OnTimeStatus::Yes),
            record(1, 20, None, None, OnTimeStatus::NotApplicable),
            record(2, 30, Some(60.0), Some(600.0), OnTimeStatus::No),
        ];

        let summary = summarize(&records);

        assert_eq!(summary.sessions, 3);
        assert_eq!(summary.average_boarding_duration_secs, Some(90.0));
        assert_eq!(summary.average_passengers, Some(20.0));
        assert_eq!(summary.average_turnaround_secs, Some(450.0));
        // One Yes out of two decided sessions.
        assert_eq!(summary.on_time_percent, Some(50.0));
    }

    #[test]
    fn per_door_turnaround_is_grouped_and_sorted() {
        let records = vec![
            record(2, 1, None, Some(100.0), OnTimeStatus::NotApplicable),
            record(1, 1, None, Some(300.0), OnTimeStatus::NotApplicable),
            record(2, 1, None, Some(200.0), OnTimeStatus::NotApplicable),
            record(3, 1, None, None, OnTimeStatus::NotApplicable),
        ];

        let summary = summarize(&records);

        assert_eq!(
            summary.per_door_turnaround,
            vec![
                DoorTurnaround {
                    door_number: 1,
                    average_turnaround_secs: 300.0
                },
                DoorTurnaround {
                    door_number: 2,
                    average_turnaround_secs: 150.0
                },
            ]
        );
    }

    #[test]
    fn recompute_publishes_summary_from_store() {
        let shared_records = SharedRecords::default();
        shared_records.set_recent(vec![record(
            1,
            5,
            Some(90.0),
            Some(240.0),
            OnTimeStatus::Yes,
        )]);
        let shared_telemetry = SharedTelemetry::default();
        let mut store = MockRecordStore::new(shared_records);
        let mut telemetry = MockTelemetryStore::new(shared_telemetry.clone());

        recompute(&mut store, &mut telemetry, SystemTime::now()).expect("recompute");

        let published = shared_telemetry.kpis();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].sessions, 1);
        assert_eq!(published[0].on_time_percent, Some(100.0));
    }

    #[test]
    fn recompute_propagates_store_failure() {
        let shared_records = SharedRecords::default();
        shared_records.set_fail_recent(true);
        let shared_telemetry = SharedTelemetry::default();
        let mut store = MockRecordStore::new(shared_records);
        let mut telemetry = MockTelemetryStore::new(shared_telemetry.clone());

        let result = recompute(&mut store, &mut telemetry, SystemTime::now());

        assert!(result.is_err());
        assert!(shared_telemetry.kpis().is_empty());
    }
}
