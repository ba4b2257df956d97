use crate::api::responses::{
    DoorStatusEntry, HealthErrorCode, HealthErrorResponse, HealthStatus, HealthSuccessResponse,
    RecalibrateResponse, RecalibrateStatus, SessionErrorCode, SessionErrorResponse,
    SessionSuccessResponse, StatusErrorCode, StatusErrorResponse, StatusSuccessResponse,
};
use crate::api::ApiContext;
use crate::engine::InputEvent;
use crate::state::{AppState, DriverInfo, DriverStatus};
use crate::upstream::records::format_timestamp;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

pub enum StatusResponse {
    Success(StatusSuccessResponse),
    Error {
        status: StatusCode,
        body: StatusErrorResponse,
    },
}

impl IntoResponse for StatusResponse {
    fn into_response(self) -> Response {
        match self {
            StatusResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            StatusResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_status(State(context): State<ApiContext>) -> impl IntoResponse {
    build_status_response(context.state, SystemTime::now())
}

pub enum SessionResponse {
    Success(SessionSuccessResponse),
    Error {
        status: StatusCode,
        body: SessionErrorResponse,
    },
}

impl IntoResponse for SessionResponse {
    fn into_response(self) -> Response {
        match self {
            SessionResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            SessionResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_session(State(context): State<ApiContext>) -> impl IntoResponse {
    build_session_response(context.state, SystemTime::now())
}

pub enum HealthResponse {
    Success {
        status: StatusCode,
        body: HealthSuccessResponse,
    },
    Error {
        status: StatusCode,
        body: HealthErrorResponse,
    },
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        match self {
            HealthResponse::Success { status, body } => (status, Json(body)).into_response(),
            HealthResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(context): State<ApiContext>) -> impl IntoResponse {
    build_health_response(context.state, SystemTime::now())
}

/// Queues a baseline recalibration onto the engine's event queue.
pub async fn post_recalibrate(State(context): State<ApiContext>) -> impl IntoResponse {
    let sent = match context.events.lock() {
        Ok(sender) => sender.send(InputEvent::Recalibrate).is_ok(),
        Err(_) => false,
    };
    let timestamp = fallback_timestamp();
    if sent {
        (
            StatusCode::ACCEPTED,
            Json(RecalibrateResponse {
                status: RecalibrateStatus::Accepted,
                timestamp,
            }),
        )
    } else {
        error!("Recalibrate request dropped; engine event channel unavailable");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(RecalibrateResponse {
                status: RecalibrateStatus::Failed,
                timestamp,
            }),
        )
    }
}

fn build_status_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> StatusResponse {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return status_internal_error("state lock poisoned while reading door status");
        }
    };
    let doors: Vec<DoorStatusEntry> = guard
        .doors()
        .iter()
        .map(|door| DoorStatusEntry {
            door_id: door.door_id,
            open: door.open,
            active_count: door.active_count,
        })
        .collect();
    let status_message = guard.status_message().to_string();
    drop(guard);

    match format_timestamp(now) {
        Ok(timestamp) => StatusResponse::Success(StatusSuccessResponse {
            doors,
            status_message,
            timestamp,
        }),
        Err(_) => status_internal_error("timestamp formatting failure"),
    }
}

fn build_session_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> SessionResponse {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return session_internal_error("state lock poisoned while reading last session");
        }
    };
    let session = guard.last_session().cloned();
    drop(guard);

    let timestamp = match format_timestamp(now) {
        Ok(timestamp) => timestamp,
        Err(_) => {
            return session_internal_error("timestamp formatting failure");
        }
    };

    match session {
        Some(session) => SessionResponse::Success(SessionSuccessResponse { session, timestamp }),
        None => SessionResponse::Error {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: SessionErrorResponse {
                error_code: SessionErrorCode::NoData,
                error_message: "No finalized session available".to_string(),
                timestamp,
            },
        },
    }
}

fn build_health_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> HealthResponse {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return health_internal_error("state lock poisoned while reading drivers");
        }
    };
    let status = derive_health_status(guard.drivers());
    drop(guard);

    let timestamp = match format_timestamp(now) {
        Ok(timestamp) => timestamp,
        Err(_) => {
            return health_internal_error("timestamp formatting failure");
        }
    };

    let status_code = match status {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    HealthResponse::Success {
        status: status_code,
        body: HealthSuccessResponse { status, timestamp },
    }
}

fn derive_health_status(drivers: &[DriverInfo]) -> HealthStatus {
    if drivers.is_empty() {
        return HealthStatus::Ko;
    }

    let mut has_ready = false;
    let mut has_error = false;
    for driver in drivers {
        match driver.status {
            DriverStatus::Ready => has_ready = true,
            DriverStatus::Error { .. } => has_error = true,
        }
    }

    match (has_ready, has_error) {
        (true, true) => HealthStatus::Degraded,
        (true, false) => HealthStatus::Ok,
        (false, _) => HealthStatus::Ko,
    }
}

fn status_internal_error(message: &str) -> StatusResponse {
    error!(message = message, "Internal error while handling /api/status");
    StatusResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: StatusErrorResponse {
            error_code: StatusErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: fallback_timestamp(),
        },
    }
}

fn session_internal_error(message: &str) -> SessionResponse {
    error!(message = message, "Internal error while handling /api/session");
    SessionResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: SessionErrorResponse {
            error_code: SessionErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: fallback_timestamp(),
        },
    }
}

fn health_internal_error(message: &str) -> HealthResponse {
    error!(message = message, "Internal error while handling /api/health");
    HealthResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: HealthErrorResponse {
            error_code: HealthErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: fallback_timestamp(),
        },
    }
}

fn fallback_timestamp() -> String {
    format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    })
}
