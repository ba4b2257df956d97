//! Hardware event sources.
//!
//! Each source owns its pins and a thread, and delivers raw input events onto
//! the engine's queue. Ordering within the engine is preserved by the single
//! consumer; sources never touch engine state directly.

use crate::engine::InputEvent;
use crate::error::AppError;
use crate::state::{AppState, DriverStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

pub mod lights;
pub mod mock;

#[cfg(target_os = "linux")]
pub mod contact;
#[cfg(target_os = "linux")]
pub mod hcsr04;

pub trait EventSource: Send {
    fn name(&self) -> String;
    /// Runs until `stop` is raised or the event channel closes.
    fn run(&mut self, events: &Sender<InputEvent>, stop: &AtomicBool) -> Result<(), AppError>;
}

/// Spawns one thread per source and tracks driver health in shared state.
pub fn spawn_sources(
    sources: Vec<Box<dyn EventSource>>,
    events: Sender<InputEvent>,
    stop: Arc<AtomicBool>,
    state: &Arc<RwLock<AppState>>,
) -> Vec<std::thread::JoinHandle<()>> {
    let mut handles = Vec::with_capacity(sources.len());
    for mut source in sources {
        let name = source.name();
        set_driver_status(state, &name, DriverStatus::Ready);
        info!(driver = name.as_str(), "Starting event source");

        let events = events.clone();
        let stop = Arc::clone(&stop);
        let state = Arc::clone(state);
        handles.push(std::thread::spawn(move || {
            if let Err(err) = source.run(&events, &stop) {
                warn!(driver = name.as_str(), error = %err, "Event source stopped with error");
                set_driver_status(
                    &state,
                    &name,
                    DriverStatus::Error {
                        message: err.to_string(),
                    },
                );
            } else if !stop.load(Ordering::Relaxed) {
                info!(driver = name.as_str(), "Event source finished");
            }
        }));
    }
    handles
}

fn set_driver_status(state: &Arc<RwLock<AppState>>, name: &str, status: DriverStatus) {
    match state.write() {
        Ok(mut guard) => {
            if let Err(err) = guard.set_driver_status(name, status) {
                warn!(driver = name, error = %err, "Failed to record driver status");
            }
        }
        Err(_) => warn!(driver = name, "State lock poisoned while recording driver status"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::mock::{ScriptStep, ScriptedSource};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn scripted_source_delivers_events_and_reports_ready() {
        let state = Arc::new(RwLock::new(AppState::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let source = ScriptedSource::new(
            "mock-contact",
            vec![
                ScriptStep {
                    after: Duration::ZERO,
                    event: InputEvent::DoorLevel {
                        door_id: 1,
                        is_high: false,
                    },
                },
                ScriptStep {
                    after: Duration::from_millis(5),
                    event: InputEvent::DoorLevel {
                        door_id: 1,
                        is_high: true,
                    },
                },
            ],
        );

        let handles = spawn_sources(vec![Box::new(source)], tx, Arc::clone(&stop), &state);
        for handle in handles {
            handle.join().expect("source thread join");
        }

        let received: Vec<InputEvent> = rx.try_iter().collect();
        assert_eq!(received.len(), 2);

        let guard = state.read().expect("state lock");
        assert_eq!(guard.drivers().len(), 1);
        assert_eq!(guard.drivers()[0].name, "mock-contact");
        assert_eq!(guard.drivers()[0].status, DriverStatus::Ready);
    }
}
