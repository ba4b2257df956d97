//! Scripted event source for tests and bench runs without hardware.

use crate::engine::InputEvent;
use crate::error::AppError;
use crate::gpio::EventSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ScriptStep {
    /// Delay before this event, relative to the previous step.
    pub after: Duration,
    pub event: InputEvent,
}

pub struct ScriptedSource {
    name: String,
    steps: Vec<ScriptStep>,
}

impl ScriptedSource {
    pub fn new(name: impl Into<String>, steps: Vec<ScriptStep>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }
}

impl EventSource for ScriptedSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn run(&mut self, events: &Sender<InputEvent>, stop: &AtomicBool) -> Result<(), AppError> {
        for step in &self.steps {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            if !step.after.is_zero() {
                std::thread::sleep(step.after);
            }
            events
                .send(step.event.clone())
                .map_err(|_| AppError::EventSend)?;
        }
        Ok(())
    }
}
