//! ChargePilot Firmware — Main Entry Point
//!
//! Hexagonal architecture with event-driven execution.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter   LogEventSink   NvsAdapter   MqttAdapter     │
//! │  (Sensor+Actuator) (EventSink)    (State+Cfg)  (Sync+EventSink)│
//! │  WifiAdapter       Esp32TimeAdapter                            │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  Safety latch · Mode machine · Fan control             │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Event queue (SPSC) · Tach ISR (atomic counter)                │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Module declarations ───────────────────────────────────────
pub mod charge;
pub mod config;
mod error;
mod events;
mod pins;
mod safety;

pub mod app;
mod adapters;
mod control;
mod drivers;
mod sensors;

// ── Imports ───────────────────────────────────────────────────
use anyhow::Result;
use log::{info, warn};

use adapters::device_id;
use adapters::hardware::HardwareAdapter;
use adapters::log_sink::LogEventSink;
use adapters::mqtt::{MqttAdapter, MqttSettings, SyncPort};
use adapters::nvs::NvsAdapter;
use adapters::wifi::{ConnectivityPort, WifiAdapter};
use app::events::AppEvent;
use app::ports::{ConfigPort, EventSink, StatePort};
use app::service::AppService;
use config::SystemConfig;
use drivers::charge_switch::ChargeSwitch;
use drivers::fan::FanDriver;
use events::Event;
#[cfg(not(target_os = "espidf"))]
use events::push_event;
use sensors::voltage::VoltChannel;

// ── Compile-time secrets (injected via CHARGEPILOT_* env vars) ─

const WIFI_SSID: &str = match option_env!("CHARGEPILOT_WIFI_SSID") {
    Some(s) => s,
    None => "",
};
const WIFI_PASS: &str = match option_env!("CHARGEPILOT_WIFI_PASS") {
    Some(s) => s,
    None => "",
};
const MQTT_HOST: &str = match option_env!("CHARGEPILOT_MQTT_HOST") {
    Some(s) => s,
    None => "",
};
const MQTT_USER: &str = match option_env!("CHARGEPILOT_MQTT_USER") {
    Some(s) => s,
    None => "",
};
const MQTT_PASS: &str = match option_env!("CHARGEPILOT_MQTT_PASS") {
    Some(s) => s,
    None => "",
};
const MQTT_PORT: u16 = 8883;

// ── Fan-out sink: every event goes to serial AND the broker ───

struct Sinks<'a> {
    log: &'a mut LogEventSink,
    mqtt: &'a mut MqttAdapter,
}

impl EventSink for Sinks<'_> {
    fn emit(&mut self, event: &AppEvent) {
        self.log.emit(event);
        self.mqtt.emit(event);
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("ChargePilot v{}", env!("CARGO_PKG_VERSION"));

    // ── 1b. Initialise hardware peripherals ───────────────────
    if let Err(e) = drivers::hw_init::init_peripherals() {
        // Peripheral init failure is critical — log and halt.
        // In production this triggers the watchdog reset after timeout.
        log::error!("HAL init failed: {} — halting", e);
        #[allow(clippy::empty_loop)]
        loop {}
    }
    if let Err(e) = drivers::hw_init::init_isr_service() {
        log::error!("ISR service init failed: {} — continuing without tach", e);
    }
    let watchdog = drivers::watchdog::Watchdog::new();

    // ── 2. Load config + persisted runtime state from NVS ─────
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults and no persistence", e);
            // Continue without NVS — state will not be persisted this
            // session. On next reboot, NVS should self-heal.
            NvsAdapter::default()
        }
    };
    let config = match ConfigPort::load(&nvs) {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };
    let persisted = StatePort::load(&nvs, &config);

    drivers::hw_timer::start_timers(
        config.control_loop_interval_ms,
        config.telemetry_interval_ms,
    );

    // ── 3. Construct adapters ─────────────────────────────────
    let sensor_hub = sensors::SensorHub::new(
        sensors::voltage::VoltageSensor::new(VoltChannel::Psu, pins::PSU_VOLT_ADC_GPIO),
        sensors::voltage::VoltageSensor::new(VoltChannel::Battery, pins::BAT_VOLT_ADC_GPIO),
        sensors::current::CurrentSensor::new(pins::CURRENT_ADC_GPIO),
        sensors::temperature::TemperatureSensor::new(pins::TEMP_ADC_GPIO),
        sensors::tacho::TachoSensor::new(pins::FAN_TACH_GPIO),
    );
    let mut hw = HardwareAdapter::new(sensor_hub, FanDriver::new(), ChargeSwitch::new());
    let mut log_sink = LogEventSink::new();

    // ── Device identity ───────────────────────────────────────
    let mac = device_id::read_mac();
    info!("Device ID: {}", device_id::device_id(&mac));

    // ── WiFi station adapter (bounded attempts) ───────────────
    let mut wifi = WifiAdapter::new(config.wifi_max_attempts);
    match wifi.set_credentials(WIFI_SSID, WIFI_PASS) {
        Ok(()) => {
            if let Err(e) = wifi.connect() {
                warn!("WiFi: initial connect failed ({}) — retrying in background", e);
            }
        }
        Err(e) => warn!("WiFi: no usable credentials ({}) — running local-only", e),
    }

    // ── MQTT sync channel ─────────────────────────────────────
    let mut mqtt = MqttAdapter::new(
        MqttSettings::new(
            MQTT_HOST,
            MQTT_PORT,
            MQTT_USER,
            MQTT_PASS,
            config.mqtt_reconnect_secs,
        ),
        mac,
        persisted.mode,
        persisted.cutoff_v,
    );
    if wifi.is_connected() {
        if let Err(e) = mqtt.connect() {
            warn!("MQTT: initial connect failed ({}) — reconnect loop armed", e);
        }
    }

    // ── 4. Construct app service ──────────────────────────────
    let mut app = AppService::new(&config, persisted);
    app.start(&mut Sinks {
        log: &mut log_sink,
        mqtt: &mut mqtt,
    });

    info!("System ready. Entering event loop.");

    // ── 5. Event loop ─────────────────────────────────────────
    #[cfg(not(target_os = "espidf"))]
    let telemetry_every =
        u64::from((config.telemetry_interval_ms / config.control_loop_interval_ms).max(1));
    #[cfg(not(target_os = "espidf"))]
    let mut sim_tick: u64 = 0;

    loop {
        // Simulate timer interrupts via sleep on non-espidf targets.
        // On real hardware, esp_timer callbacks push these events and
        // the CPU idles between them.
        #[cfg(not(target_os = "espidf"))]
        {
            std::thread::sleep(std::time::Duration::from_millis(u64::from(
                config.control_loop_interval_ms,
            )));
            push_event(Event::ControlTick);
            sim_tick += 1;
            if sim_tick % telemetry_every == 0 {
                push_event(Event::TelemetryTick);
            }
        }

        // Process all pending events.
        events::drain_events(|event| match event {
            Event::ControlTick => {
                app.tick(
                    &mut hw,
                    &nvs,
                    &mut Sinks {
                        log: &mut log_sink,
                        mqtt: &mut mqtt,
                    },
                );
            }

            Event::TelemetryTick => {
                let t = app.build_telemetry();
                let mut sinks = Sinks {
                    log: &mut log_sink,
                    mqtt: &mut mqtt,
                };
                sinks.emit(&AppEvent::Telemetry(t));
            }

            Event::CommandReceived => {
                // Commands are drained below on every iteration; the
                // event only wakes the loop early on espidf targets.
            }

            Event::LinkLost => warn!("Sync channel lost — local control continues"),
            Event::LinkRestored => info!("Sync channel restored"),
        });

        // Apply every pending remote command (at-most-once each).
        while let Some(cmd) = mqtt.next_command() {
            match cmd {
                Ok(c) => app.handle_command(
                    c,
                    &mut hw,
                    &nvs,
                    &mut Sinks {
                        log: &mut log_sink,
                        mqtt: &mut mqtt,
                    },
                ),
                Err(e) => app.note_rejected_command(
                    e,
                    &mut Sinks {
                        log: &mut log_sink,
                        mqtt: &mut mqtt,
                    },
                ),
            }
        }

        // Connectivity supervision: WiFi first, then the MQTT session.
        wifi.poll();
        if wifi.is_connected() {
            mqtt.poll();
        }

        // Feed watchdog on every iteration.
        watchdog.feed();
    }
}
