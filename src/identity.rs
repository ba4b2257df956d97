//! Device-to-location assignment.
//!
//! Every unit is bolted to one dock; running with an unknown location would
//! attribute records to the wrong door, so an unresolved assignment is fatal
//! at startup. Resolution is either static config or an HTTP lookup keyed by
//! the unit's MAC address.

use crate::config::Config;
use crate::state::DoorId;
use crate::upstream::UpstreamError;
use crate::upstream::http::send_json;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub dock_number: u32,
    pub door_numbers: Vec<DoorId>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no assignment configured: set [assignment] endpoint or a static dock/doors pair")]
    NotConfigured,
    #[error("failed to read mac address from {path}: {source}")]
    Mac {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("assignment lookup failed: {0}")]
    Lookup(#[from] UpstreamError),
    #[error("no assignment found for mac {0}")]
    NotFound(String),
    #[error("assignment response invalid: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct AssignmentResponse {
    dock_number: u32,
    door_numbers: Vec<DoorId>,
}

/// Resolves this unit's dock and door numbers. Static config wins; otherwise
/// the configured endpoint is queried with the unit's MAC address.
pub fn resolve(config: &Config) -> Result<Assignment, IdentityError> {
    if let Some((dock_number, door_numbers)) = config.static_assignment() {
        info!(
            dock = dock_number,
            doors = ?door_numbers,
            "Using static assignment from config"
        );
        return Ok(Assignment {
            dock_number,
            door_numbers,
        });
    }

    let Some(endpoint) = config.assignment_endpoint() else {
        return Err(IdentityError::NotConfigured);
    };
    let mac = read_mac_address(config.assignment_interface())?;
    info!(mac = mac.as_str(), "Looking up door assignment");

    let url = format!("{endpoint}?mac={mac}");
    let body = send_json("GET", &url, None, None, config.upstream_timeout())?;
    parse_assignment(&body, &mac)
}

fn parse_assignment(body: &str, mac: &str) -> Result<Assignment, IdentityError> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Err(IdentityError::NotFound(mac.to_string()));
    }
    let response: AssignmentResponse = serde_json::from_str(trimmed)
        .map_err(|err| IdentityError::Invalid(err.to_string()))?;
    if response.door_numbers.is_empty() {
        return Err(IdentityError::Invalid(
            "assignment carries no door numbers".to_string(),
        ));
    }
    info!(
        dock = response.dock_number,
        doors = ?response.door_numbers,
        "Door assignment resolved"
    );
    Ok(Assignment {
        dock_number: response.dock_number,
        door_numbers: response.door_numbers,
    })
}

fn read_mac_address(interface: &str) -> Result<String, IdentityError> {
    let path = PathBuf::from(format!("/sys/class/net/{interface}/address"));
    let mac = std::fs::read_to_string(&path).map_err(|source| IdentityError::Mac {
        path: path.clone(),
        source,
    })?;
    Ok(mac.trim().to_string())
}
