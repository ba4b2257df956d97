use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_ASSIGNMENT_INTERFACE: &str = "wlan0";

pub const DEFAULT_BASELINE_DETECTED_PULSES: u32 = 1;
pub const DEFAULT_BASELINE_VARIANCE_LIMIT_CM: f64 = 30.0;
pub const DEFAULT_PERSON_DETECTED_PULSES: u32 = 3;
pub const DEFAULT_BOARDING_START_PERSONS: usize = 3;
pub const DEFAULT_BOARDING_START_TIME_WINDOW_MS: u64 = 60_000;
pub const DEFAULT_INITIAL_DOOR_OPEN_DELAY_MS: u64 = 3_000;
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 500;
pub const DEFAULT_TURNAROUND_RESET_MINUTES: u64 = 20;
pub const DEFAULT_DOOR_CYCLE_TRIGGER: u32 = 5;
pub const DEFAULT_FALSE_POSITIVE_DOOR_OPENING_SECS: u64 = 10;
pub const DEFAULT_ON_TIME_DETERMINATION_LIMIT_MS: u64 = 120_000;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub engine: Option<EngineSection>,
    #[serde(default)]
    pub doors: Vec<DoorSection>,
    #[serde(default)]
    pub ultrasonic: Option<UltrasonicSection>,
    #[serde(default)]
    pub lights: Option<LightsSection>,
    #[serde(default)]
    pub assignment: Option<AssignmentSection>,
    #[serde(default)]
    pub upstream: Option<UpstreamSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineSection {
    pub baseline_detected_pulses: Option<u32>,
    pub baseline_variance_limit_cm: Option<f64>,
    pub person_detected_pulses: Option<u32>,
    pub boarding_start_persons: Option<usize>,
    pub boarding_start_time_window_ms: Option<u64>,
    pub initial_door_open_delay_ms: Option<u64>,
    pub sample_interval_ms: Option<u64>,
    pub turnaround_reset_minutes: Option<u64>,
    pub door_cycle_trigger: Option<u32>,
    pub false_positive_door_opening_secs: Option<u64>,
    pub on_time_determination_limit_ms: Option<u64>,
}

/// Raw contact-switch level that corresponds to a physically open door.
/// Normally-closed and normally-open switch wiring both occur in the field.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OpenLevel {
    High,
    Low,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DoorSection {
    pub id: u32,
    pub pin: u8,
    pub open_level: Option<OpenLevel>,
    /// Companion door id when two doors serve the same boarding bay.
    pub pair: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UltrasonicSection {
    pub trigger_pin: u8,
    pub echo_pin: u8,
    /// Door the ultrasonic axis watches (default: the first configured door).
    pub door: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LightsSection {
    pub red_pin: u8,
    pub yellow_pin: u8,
    pub green_pin: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssignmentSection {
    pub endpoint: Option<String>,
    pub interface: Option<String>,
    pub dock: Option<u32>,
    pub doors: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamSection {
    pub records_endpoint: Option<String>,
    pub records_api_key: Option<String>,
    pub records_table: Option<String>,
    pub telemetry_base: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

/// Engine tuning with every default applied. Built once at startup via
/// [`Config::engine_settings`] and handed to the engine by value.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub baseline_detected_pulses: u32,
    pub baseline_variance_limit_cm: f64,
    pub person_detected_pulses: u32,
    pub boarding_start_persons: usize,
    pub boarding_start_time_window: Duration,
    pub initial_door_open_delay: Duration,
    pub sample_interval: Duration,
    pub turnaround_reset: Duration,
    pub door_cycle_trigger: u32,
    pub false_positive_door_opening: Duration,
    pub on_time_determination_limit: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            baseline_detected_pulses: DEFAULT_BASELINE_DETECTED_PULSES,
            baseline_variance_limit_cm: DEFAULT_BASELINE_VARIANCE_LIMIT_CM,
            person_detected_pulses: DEFAULT_PERSON_DETECTED_PULSES,
            boarding_start_persons: DEFAULT_BOARDING_START_PERSONS,
            boarding_start_time_window: Duration::from_millis(DEFAULT_BOARDING_START_TIME_WINDOW_MS),
            initial_door_open_delay: Duration::from_millis(DEFAULT_INITIAL_DOOR_OPEN_DELAY_MS),
            sample_interval: Duration::from_millis(DEFAULT_SAMPLE_INTERVAL_MS),
            turnaround_reset: Duration::from_secs(DEFAULT_TURNAROUND_RESET_MINUTES * 60),
            door_cycle_trigger: DEFAULT_DOOR_CYCLE_TRIGGER,
            false_positive_door_opening: Duration::from_secs(
                DEFAULT_FALSE_POSITIVE_DOOR_OPENING_SECS,
            ),
            on_time_determination_limit: Duration::from_millis(
                DEFAULT_ON_TIME_DETERMINATION_LIMIT_MS,
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        for door in &self.doors {
            if let Some(pair) = door.pair {
                if pair == door.id {
                    return Err(ConfigError::Invalid(format!(
                        "door {} is paired with itself",
                        door.id
                    )));
                }
                if !self.doors.iter().any(|d| d.id == pair) {
                    return Err(ConfigError::Invalid(format!(
                        "door {} is paired with unknown door {pair}",
                        door.id
                    )));
                }
            }
        }
        if let Some(ultrasonic) = &self.ultrasonic
            && let Some(axis) = ultrasonic.door
            && !self.doors.iter().any(|d| d.id == axis)
        {
            return Err(ConfigError::Invalid(format!(
                "ultrasonic axis references unknown door {axis}"
            )));
        }
        Ok(())
    }

    /// Returns engine tuning with defaults applied for any omitted key.
    pub fn engine_settings(&self) -> EngineSettings {
        let defaults = EngineSettings::default();
        let Some(section) = &self.engine else {
            return defaults;
        };
        EngineSettings {
            baseline_detected_pulses: section
                .baseline_detected_pulses
                .unwrap_or(defaults.baseline_detected_pulses),
            baseline_variance_limit_cm: section
                .baseline_variance_limit_cm
                .unwrap_or(defaults.baseline_variance_limit_cm),
            person_detected_pulses: section
                .person_detected_pulses
                .unwrap_or(defaults.person_detected_pulses),
            boarding_start_persons: section
                .boarding_start_persons
                .unwrap_or(defaults.boarding_start_persons),
            boarding_start_time_window: section
                .boarding_start_time_window_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.boarding_start_time_window),
            initial_door_open_delay: section
                .initial_door_open_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_door_open_delay),
            sample_interval: section
                .sample_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.sample_interval),
            turnaround_reset: section
                .turnaround_reset_minutes
                .map(|minutes| Duration::from_secs(minutes * 60))
                .unwrap_or(defaults.turnaround_reset),
            door_cycle_trigger: section
                .door_cycle_trigger
                .unwrap_or(defaults.door_cycle_trigger),
            false_positive_door_opening: section
                .false_positive_door_opening_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.false_positive_door_opening),
            on_time_determination_limit: section
                .on_time_determination_limit_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.on_time_determination_limit),
        }
    }

    /// Door the ultrasonic axis belongs to (default: first configured door).
    pub fn axis_door(&self) -> Option<u32> {
        self.ultrasonic
            .as_ref()
            .and_then(|u| u.door)
            .or_else(|| self.doors.first().map(|d| d.id))
    }

    /// Deduplicated door pairs, each reported once with the lower id first.
    pub fn door_pairs(&self) -> Vec<(u32, u32)> {
        let mut pairs = Vec::new();
        for door in &self.doors {
            if let Some(pair) = door.pair {
                let key = (door.id.min(pair), door.id.max(pair));
                if !pairs.contains(&key) {
                    pairs.push(key);
                }
            }
        }
        pairs
    }

    /// Indicator LED pins as (red, yellow, green), when lights are fitted.
    pub fn lights_pins(&self) -> Option<(u8, u8, u8)> {
        self.lights
            .as_ref()
            .map(|l| (l.red_pin, l.yellow_pin, l.green_pin))
    }

    pub fn assignment_interface(&self) -> &str {
        self.assignment
            .as_ref()
            .and_then(|a| a.interface.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_ASSIGNMENT_INTERFACE)
    }

    pub fn assignment_endpoint(&self) -> Option<&str> {
        self.assignment
            .as_ref()
            .and_then(|a| a.endpoint.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Static assignment from config, when both dock and door list are present.
    pub fn static_assignment(&self) -> Option<(u32, Vec<u32>)> {
        let section = self.assignment.as_ref()?;
        let dock = section.dock?;
        let doors = section.doors.clone().filter(|doors| !doors.is_empty())?;
        Some((dock, doors))
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn upstream_timeout(&self) -> Duration {
        let secs = self
            .upstream
            .as_ref()
            .and_then(|u| u.timeout_secs)
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }
}
