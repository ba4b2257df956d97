//! Magnetic contact-switch source.
//!
//! Polls the door pins and reports raw level changes; debouncing happens in
//! the engine so the window stays cancelable and re-armable there. Initial
//! levels are reported once at startup so the engine can settle door state
//! without fabricating a transition.

use crate::engine::InputEvent;
use crate::error::AppError;
use crate::gpio::EventSource;
use crate::state::DoorId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

struct ContactPin {
    door_id: DoorId,
    pin: rppal::gpio::InputPin,
    last_high: Option<bool>,
}

pub struct ContactSource {
    pins: Vec<ContactPin>,
}

impl ContactSource {
    /// `doors` maps door id to BCM pin number; switches are wired to ground
    /// with the internal pull-up enabled.
    pub fn new(doors: &[(DoorId, u8)]) -> Result<Self, AppError> {
        let gpio = rppal::gpio::Gpio::new().map_err(|err| AppError::Gpio(err.to_string()))?;
        let mut pins = Vec::with_capacity(doors.len());
        for (door_id, pin_number) in doors {
            let pin = gpio
                .get(*pin_number)
                .map_err(|err| AppError::Gpio(err.to_string()))?
                .into_input_pullup();
            pins.push(ContactPin {
                door_id: *door_id,
                pin,
                last_high: None,
            });
        }
        Ok(Self { pins })
    }
}

impl EventSource for ContactSource {
    fn name(&self) -> String {
        "contact".to_string()
    }

    fn run(&mut self, events: &Sender<InputEvent>, stop: &AtomicBool) -> Result<(), AppError> {
        while !stop.load(Ordering::Relaxed) {
            for contact in &mut self.pins {
                let is_high = contact.pin.is_high();
                if contact.last_high != Some(is_high) {
                    contact.last_high = Some(is_high);
                    events
                        .send(InputEvent::DoorLevel {
                            door_id: contact.door_id,
                            is_high,
                        })
                        .map_err(|_| AppError::EventSend)?;
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }
}
