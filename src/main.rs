use gateflow::engine::{Engine, spawn_engine_thread};
use gateflow::gpio::lights::{IndicatorLights, NullLights};
use gateflow::state::{AppState, DoorLiveState};
use gateflow::upstream::rest::{RestRecordStore, RtdbTelemetryStore};
use gateflow::upstream::{
    NoopRecordStore, NoopTelemetryStore, RecordStore, TelemetryStore, Uplink, spawn_uplink_thread,
};
use gateflow::{api, config, gpio, identity};
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::sync::{Arc, RwLock};

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt().with_target(false).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        "gateflow starting"
    );
    let config = config::load_default()?;

    // A unit with an unknown location must not run.
    let assignment = match identity::resolve(&config) {
        Ok(assignment) => assignment,
        Err(err) => {
            tracing::error!(error = %err, "Door assignment resolution failed; refusing to start");
            return Err(err.into());
        }
    };
    for door in &config.doors {
        if !assignment.door_numbers.contains(&door.id) {
            tracing::warn!(
                door_id = door.id,
                "Configured door is not part of this unit's assignment"
            );
        }
    }

    let mut app_state = AppState::new();
    app_state.set_doors(
        config
            .doors
            .iter()
            .map(|door| DoorLiveState::closed(door.id))
            .collect(),
    )?;
    let state = Arc::new(RwLock::new(app_state));

    let (events_tx, events_rx) = mpsc::channel();
    let (uplink_tx, uplink_rx) = mpsc::channel();

    let settings = config.engine_settings();
    let doors: Vec<_> = config
        .doors
        .iter()
        .map(|door| {
            (
                door.id,
                door.open_level.unwrap_or(config::OpenLevel::High),
            )
        })
        .collect();
    let axis_door = config.axis_door().ok_or("no doors configured")?;
    let engine = Engine::new(
        settings,
        assignment.dock_number,
        doors,
        &config.door_pairs(),
        axis_door,
        uplink_tx,
        Arc::clone(&state),
    );

    let stop = Arc::new(AtomicBool::new(false));
    let _engine_handle = spawn_engine_thread(engine, events_rx, Arc::clone(&stop));

    let uplink = Uplink::new(
        build_record_store(&config),
        build_telemetry_store(&config),
        build_lights(&config),
        Arc::clone(&state),
        assignment.dock_number,
    );
    let _uplink_handle = spawn_uplink_thread(uplink, uplink_rx);

    let sources = build_sources(&config);
    let _source_handles = if sources.is_empty() {
        tracing::warn!("No hardware event sources available");
        Vec::new()
    } else {
        gpio::spawn_sources(sources, events_tx.clone(), Arc::clone(&stop), &state)
    };

    let app = api::router(Arc::clone(&state), events_tx);
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    // Signal worker threads to stop
    stop.store(true, std::sync::atomic::Ordering::Relaxed);

    Ok(())
}

fn build_record_store(config: &config::Config) -> Box<dyn RecordStore> {
    let section = config.upstream.as_ref();
    let endpoint = section
        .and_then(|u| u.records_endpoint.clone())
        .filter(|s| !s.is_empty());
    match endpoint {
        Some(endpoint) => {
            let table = section
                .and_then(|u| u.records_table.clone())
                .unwrap_or_else(|| "door-log".to_string());
            tracing::info!(endpoint = endpoint.as_str(), table = table.as_str(), "Record store configured");
            Box::new(RestRecordStore::new(
                endpoint,
                table,
                section.and_then(|u| u.records_api_key.clone()),
                config.upstream_timeout(),
            ))
        }
        None => {
            tracing::warn!("No record store configured; finalized sessions will not be persisted");
            Box::new(NoopRecordStore)
        }
    }
}

fn build_telemetry_store(config: &config::Config) -> Box<dyn TelemetryStore> {
    let base = config
        .upstream
        .as_ref()
        .and_then(|u| u.telemetry_base.clone())
        .filter(|s| !s.is_empty());
    match base {
        Some(base) => {
            tracing::info!(base = base.as_str(), "Telemetry store configured");
            Box::new(RtdbTelemetryStore::new(base, config.upstream_timeout()))
        }
        None => {
            tracing::warn!("No telemetry store configured; live counters stay local");
            Box::new(NoopTelemetryStore)
        }
    }
}

fn build_lights(config: &config::Config) -> Box<dyn IndicatorLights> {
    #[cfg(target_os = "linux")]
    {
        use gateflow::gpio::lights::GpioLights;

        if let Some((red, yellow, green)) = config.lights_pins() {
            match GpioLights::new(red, yellow, green) {
                Ok(mut lights) => {
                    if let Err(err) = lights.all_off() {
                        tracing::warn!(error = %err, "Failed to clear indicator lights");
                    }
                    return Box::new(lights);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to initialize indicator lights");
                }
            }
        }
    }

    let _ = config;
    Box::new(NullLights)
}

fn build_sources(config: &config::Config) -> Vec<Box<dyn gpio::EventSource>> {
    #[cfg(target_os = "linux")]
    {
        use gateflow::gpio::contact::ContactSource;
        use gateflow::gpio::hcsr04::Hcsr04Source;

        let mut sources: Vec<Box<dyn gpio::EventSource>> = Vec::new();

        let door_pins: Vec<(u32, u8)> = config.doors.iter().map(|d| (d.id, d.pin)).collect();
        if door_pins.is_empty() {
            tracing::warn!("No door contacts configured");
        } else {
            match ContactSource::new(&door_pins) {
                Ok(source) => sources.push(Box::new(source)),
                Err(err) => tracing::error!(error = %err, "Failed to initialize contact source"),
            }
        }

        match &config.ultrasonic {
            Some(ultrasonic) => {
                match Hcsr04Source::new(
                    ultrasonic.trigger_pin,
                    ultrasonic.echo_pin,
                    config.engine_settings().sample_interval,
                ) {
                    Ok(source) => sources.push(Box::new(source)),
                    Err(err) => {
                        tracing::error!(error = %err, "Failed to initialize ultrasonic source")
                    }
                }
            }
            None => tracing::warn!("No ultrasonic sensor configured; passenger counting disabled"),
        }

        sources
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = config;
        tracing::warn!("Hardware sources require Linux/Raspberry Pi - skipping");
        Vec::new()
    }
}
