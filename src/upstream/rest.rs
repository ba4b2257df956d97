//! HTTP implementations of the collaborator stores.
//!
//! The record store speaks a base/table REST dialect: rows are appended with
//! `POST <endpoint>/<table>` wrapping the flat record in
//! `{"records":[{"fields":{...}}]}`, and queried with
//! `GET <endpoint>/<table>?since=<rfc3339>`. The telemetry store is a
//! realtime-database dialect: `PUT <base>/<path>.json` replaces a node,
//! `POST` appends to a list node.

use crate::state::DoorId;
use crate::upstream::http::send_json;
use crate::upstream::kpi::KpiSummary;
use crate::upstream::records::{SessionRecord, format_timestamp};
use crate::upstream::{RecordStore, TelemetryStore, UpstreamError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, SystemTime};

pub struct RestRecordStore {
    endpoint: String,
    table: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RestRecordStore {
    pub fn new(
        endpoint: String,
        table: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint,
            table,
            api_key,
            timeout,
        }
    }

    fn table_url(&self) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), self.table)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordRow {
    fields: SessionRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordPage {
    records: Vec<RecordRow>,
}

impl RecordStore for RestRecordStore {
    fn append_session(&mut self, record: &SessionRecord) -> Result<(), UpstreamError> {
        let payload = serde_json::to_string(&json!({
            "records": [{ "fields": record }]
        }))?;
        send_json(
            "POST",
            &self.table_url(),
            self.api_key.as_deref(),
            Some(&payload),
            self.timeout,
        )?;
        Ok(())
    }

    fn recent_sessions(&mut self, since: SystemTime) -> Result<Vec<SessionRecord>, UpstreamError> {
        let since = format_timestamp(since).map_err(UpstreamError::Record)?;
        let url = format!("{}?since={since}", self.table_url());
        let body = send_json("GET", &url, self.api_key.as_deref(), None, self.timeout)?;
        let page: RecordPage = serde_json::from_str(&body)?;
        Ok(page.records.into_iter().map(|row| row.fields).collect())
    }
}

pub struct RtdbTelemetryStore {
    base: String,
    timeout: Duration,
}

impl RtdbTelemetryStore {
    pub fn new(base: String, timeout: Duration) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn put(&self, path: &str, body: String) -> Result<(), UpstreamError> {
        let url = format!("{}/{path}.json", self.base);
        send_json("PUT", &url, None, Some(&body), self.timeout)?;
        Ok(())
    }

    fn post(&self, path: &str, body: String) -> Result<(), UpstreamError> {
        let url = format!("{}/{path}.json", self.base);
        send_json("POST", &url, None, Some(&body), self.timeout)?;
        Ok(())
    }

    fn now_stamp() -> String {
        format_timestamp(SystemTime::now()).unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }
}

impl TelemetryStore for RtdbTelemetryStore {
    fn set_door_open(&mut self, door_id: DoorId, open: bool) -> Result<(), UpstreamError> {
        self.put(&format!("doors/door{door_id}/open"), open.to_string())
    }

    fn set_active_count(&mut self, door_id: DoorId, count: u32) -> Result<(), UpstreamError> {
        self.put(
            &format!("doors/door{door_id}/active_count"),
            count.to_string(),
        )
    }

    fn set_status_message(&mut self, message: &str) -> Result<(), UpstreamError> {
        let payload = serde_json::to_string(&json!({
            "main": message,
            "updated": Self::now_stamp(),
        }))?;
        self.put("message", payload)
    }

    fn publish_last_session(&mut self, record: &SessionRecord) -> Result<(), UpstreamError> {
        self.put("last_transaction", serde_json::to_string(record)?)
    }

    fn publish_kpis(&mut self, summary: &KpiSummary) -> Result<(), UpstreamError> {
        self.put("stats", serde_json::to_string(summary)?)
    }

    fn push_log(&mut self, message: &str) -> Result<(), UpstreamError> {
        let payload = serde_json::to_string(&json!({
            "message": message,
            "timestamp": Self::now_stamp(),
        }))?;
        self.post("running_log", payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::session::OnTimeStatus;

    #[test]
    fn table_url_joins_endpoint_and_table() {
        let store = RestRecordStore::new(
            "http://records.local/v0/base/".to_string(),
            "door-log".to_string(),
            None,
            Duration::from_secs(5),
        );

        assert_eq!(store.table_url(), "http://records.local/v0/base/door-log");
    }

    #[test]
    fn record_page_parses_rows() {
        let body = r#"{
            "records": [
                { "fields": {
                    "dock_number": 7,
                    "door_number": 1,
                    "door_open": "2026-08-01T10:00:00Z",
                    "door_close": "2026-08-01T10:05:00Z",
                    "door_open_duration_secs": 300.0,
                    "passengers_counted": 18,
                    "on_time": "Yes",
                    "turnaround_secs": 240.0
                } }
            ]
        }"#;

        let page: RecordPage = serde_json::from_str(body).expect("parse page");

        assert_eq!(page.records.len(), 1);
        let record = &page.records[0].fields;
        assert_eq!(record.passengers_counted, 18);
        assert_eq!(record.on_time, OnTimeStatus::Yes);
        assert_eq!(record.boarding_duration_secs, None);
    }
}
