//! HC-SR04 ultrasonic driver.
//!
//! Fires a 10 µs trigger pulse every sample interval and times the echo line
//! by polling. Edge ticks are reported on a free-running microsecond timer
//! that wraps over `u32`; the sampler is responsible for wrapping arithmetic.

use crate::engine::InputEvent;
use crate::error::AppError;
use crate::gpio::EventSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use tracing::debug;

const TRIGGER_PULSE: Duration = Duration::from_micros(10);
/// HC-SR04 echoes return within ~38 ms; anything later is a lost pulse.
const ECHO_TIMEOUT: Duration = Duration::from_millis(60);
const POLL_STEP: Duration = Duration::from_micros(20);

pub struct Hcsr04Source {
    trigger: rppal::gpio::OutputPin,
    echo: rppal::gpio::InputPin,
    interval: Duration,
}

impl Hcsr04Source {
    pub fn new(trigger_pin: u8, echo_pin: u8, interval: Duration) -> Result<Self, AppError> {
        let gpio = rppal::gpio::Gpio::new().map_err(|err| AppError::Gpio(err.to_string()))?;
        let mut trigger = gpio
            .get(trigger_pin)
            .map_err(|err| AppError::Gpio(err.to_string()))?
            .into_output();
        trigger.set_low();
        let echo = gpio
            .get(echo_pin)
            .map_err(|err| AppError::Gpio(err.to_string()))?
            .into_input();
        Ok(Self {
            trigger,
            echo,
            interval,
        })
    }

    fn fire_trigger(&mut self) {
        self.trigger.set_high();
        let armed = Instant::now();
        while armed.elapsed() < TRIGGER_PULSE {
            std::hint::spin_loop();
        }
        self.trigger.set_low();
    }

    fn wait_for_level(&self, high: bool, deadline: Instant) -> Option<Instant> {
        loop {
            if self.echo.is_high() == high {
                return Some(Instant::now());
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(POLL_STEP);
        }
    }
}

fn tick_us(epoch: Instant, at: Instant) -> u32 {
    at.duration_since(epoch).as_micros() as u32
}

impl EventSource for Hcsr04Source {
    fn name(&self) -> String {
        "hcsr04".to_string()
    }

    fn run(&mut self, events: &Sender<InputEvent>, stop: &AtomicBool) -> Result<(), AppError> {
        let epoch = Instant::now();
        while !stop.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();
            self.fire_trigger();

            let echo_deadline = Instant::now() + ECHO_TIMEOUT;
            match self.wait_for_level(true, echo_deadline) {
                Some(rise_at) => match self.wait_for_level(false, echo_deadline) {
                    Some(fall_at) => {
                        events
                            .send(InputEvent::EchoPulse {
                                rise_tick_us: tick_us(epoch, rise_at),
                                fall_tick_us: tick_us(epoch, fall_at),
                            })
                            .map_err(|_| AppError::EventSend)?;
                    }
                    None => debug!("Echo fall edge timed out"),
                },
                None => debug!("Echo rise edge timed out"),
            }

            let elapsed = cycle_start.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        Ok(())
    }
}
