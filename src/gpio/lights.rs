//! Status indicator lights.
//!
//! The engine only emits semantic events; this trait maps them to the
//! red/yellow/green LEDs on the unit. Deployments without lights use
//! [`NullLights`].

use crate::error::AppError;
use std::time::Duration;

/// Yellow stays lit this long for each detected crossing.
pub const PERSON_FLASH: Duration = Duration::from_millis(100);

pub trait IndicatorLights: Send {
    /// Door confirmed open: green on, red off.
    fn door_open(&mut self) -> Result<(), AppError>;
    /// Door confirmed closed: red on, green off.
    fn door_closed(&mut self) -> Result<(), AppError>;
    /// Brief yellow flash for a passenger crossing.
    fn flash_person(&mut self) -> Result<(), AppError>;
    fn all_off(&mut self) -> Result<(), AppError>;
}

pub struct NullLights;

impl IndicatorLights for NullLights {
    fn door_open(&mut self) -> Result<(), AppError> {
        Ok(())
    }

    fn door_closed(&mut self) -> Result<(), AppError> {
        Ok(())
    }

    fn flash_person(&mut self) -> Result<(), AppError> {
        Ok(())
    }

    fn all_off(&mut self) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
pub struct GpioLights {
    red: rppal::gpio::OutputPin,
    yellow: rppal::gpio::OutputPin,
    green: rppal::gpio::OutputPin,
}

#[cfg(target_os = "linux")]
impl GpioLights {
    pub fn new(red_pin: u8, yellow_pin: u8, green_pin: u8) -> Result<Self, AppError> {
        let gpio = rppal::gpio::Gpio::new().map_err(|err| AppError::Gpio(err.to_string()))?;
        let get_output = |pin: u8| -> Result<rppal::gpio::OutputPin, AppError> {
            Ok(gpio
                .get(pin)
                .map_err(|err| AppError::Gpio(err.to_string()))?
                .into_output())
        };
        Ok(Self {
            red: get_output(red_pin)?,
            yellow: get_output(yellow_pin)?,
            green: get_output(green_pin)?,
        })
    }
}

#[cfg(target_os = "linux")]
impl IndicatorLights for GpioLights {
    fn door_open(&mut self) -> Result<(), AppError> {
        self.red.set_low();
        self.green.set_high();
        Ok(())
    }

    fn door_closed(&mut self) -> Result<(), AppError> {
        self.green.set_low();
        self.red.set_high();
        Ok(())
    }

    fn flash_person(&mut self) -> Result<(), AppError> {
        self.yellow.set_high();
        std::thread::sleep(PERSON_FLASH);
        self.yellow.set_low();
        Ok(())
    }

    fn all_off(&mut self) -> Result<(), AppError> {
        self.red.set_low();
        self.yellow.set_low();
        self.green.set_low();
        Ok(())
    }
}
