use crate::engine::InputEvent;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, RwLock};

pub mod handlers;
pub mod responses;

/// Shared handler context: live state plus a handle onto the engine's event
/// queue for operator actions.
#[derive(Clone)]
pub struct ApiContext {
    pub state: Arc<RwLock<AppState>>,
    pub events: Arc<Mutex<Sender<InputEvent>>>,
}

pub fn router(state: Arc<RwLock<AppState>>, events: Sender<InputEvent>) -> Router {
    let context = ApiContext {
        state,
        events: Arc::new(Mutex::new(events)),
    };
    Router::new()
        .route("/api/status", get(handlers::get_status))
        .route("/api/session", get(handlers::get_session))
        .route("/api/health", get(handlers::get_health))
        .route("/api/recalibrate", post(handlers::post_recalibrate))
        .with_state(context)
}
