//! Integration tests for the MQTT sync contract: handshake ordering,
//! retained-state convergence across reconnects, and the full
//! command → control-loop → retained-mirror round trip.

use crate::mock_hw::{JournalSink, MockHardware, MockState};

use chargepilot::adapters::device_id::read_mac;
use chargepilot::adapters::mqtt::{MqttAdapter, MqttSettings, SyncPort};
use chargepilot::app::commands::{
    TOPIC_CMD_CUTOFF, TOPIC_CMD_MODE, TOPIC_STATE_CUTOFF, TOPIC_STATE_MODE, TOPIC_STATUS,
};
use chargepilot::app::ports::{EventSink, PersistedState};
use chargepilot::app::service::AppService;
use chargepilot::charge::ChargeMode;
use chargepilot::config::SystemConfig;

const RECONNECT_SECS: u32 = 5;

fn make_mqtt(mode: ChargeMode, cutoff_v: f32) -> MqttAdapter {
    MqttAdapter::new(
        MqttSettings::new("broker.local", 8883, "charger", "secret", RECONNECT_SECS),
        read_mac(),
        mode,
        cutoff_v,
    )
}

fn make_app(mode: ChargeMode, cutoff_v: f32) -> (AppService, MockHardware, MockState) {
    let config = SystemConfig::default();
    let app = AppService::new(&config, PersistedState { mode, cutoff_v });
    (app, MockHardware::new(), MockState::new(mode, cutoff_v))
}

/// Drain inbound commands through the service the way main() does.
fn pump_commands(
    mqtt: &mut MqttAdapter,
    app: &mut AppService,
    hw: &mut MockHardware,
    state: &MockState,
    log: &mut JournalSink,
) {
    while let Some(cmd) = mqtt.next_command() {
        match cmd {
            Ok(c) => {
                app.handle_command(c, hw, state, log);
                // main() fans every event out to the MQTT sink too; the
                // last events in `log` mirror what just happened.
                if let Some(event) = log.events.last() {
                    mqtt.emit(event);
                }
            }
            Err(e) => app.note_rejected_command(e, log),
        }
    }
}

fn reconnect(mqtt: &mut MqttAdapter) {
    mqtt.sim_restore_link();
    for _ in 0..=RECONNECT_SECS {
        mqtt.poll();
    }
    assert!(mqtt.is_connected(), "expected reconnect after backoff");
}

// ── Handshake contract ────────────────────────────────────────

#[test]
fn connect_handshake_publishes_in_contract_order() {
    let mut mqtt = make_mqtt(ChargeMode::Auto, 13.8);
    mqtt.connect().unwrap();

    // A freshly-connecting observer sees the full retained picture.
    assert_eq!(mqtt.sim_retained(TOPIC_STATUS), Some("online"));
    assert_eq!(mqtt.sim_retained(TOPIC_STATE_MODE), Some("AUTO"));
    assert_eq!(mqtt.sim_retained(TOPIC_STATE_CUTOFF), Some("13.80"));

    // Status precedes the state mirror on the wire.
    let topics: Vec<&str> = mqtt
        .sim_published()
        .iter()
        .map(|m| m.topic.as_str())
        .collect();
    let status_idx = topics.iter().position(|t| *t == TOPIC_STATUS).unwrap();
    let mode_idx = topics.iter().position(|t| *t == TOPIC_STATE_MODE).unwrap();
    assert!(status_idx < mode_idx);
}

// ── Retained AUTO survives a reconnect ────────────────────────

#[test]
fn round_trip_auto_retained_across_reconnect_without_recommand() {
    let (mut app, mut hw, state) = make_app(ChargeMode::Off, 12.0);
    let mut log = JournalSink::new();
    let mut mqtt = make_mqtt(ChargeMode::Off, 12.0);
    mqtt.connect().unwrap();

    // Phone publishes AUTO.
    mqtt.sim_inject(TOPIC_CMD_MODE, "AUTO");
    pump_commands(&mut mqtt, &mut app, &mut hw, &state, &mut log);
    assert_eq!(app.mode(), ChargeMode::Auto);
    assert_eq!(mqtt.sim_retained(TOPIC_STATE_MODE), Some("AUTO"));

    // Unclean drop, then reconnect. No repeated command anywhere.
    mqtt.sim_drop_link();
    mqtt.poll();
    assert!(!mqtt.is_connected());
    reconnect(&mut mqtt);

    assert_eq!(
        mqtt.sim_retained(TOPIC_STATE_MODE),
        Some("AUTO"),
        "state topic must report AUTO after reconnect with no re-command"
    );
    assert_eq!(mqtt.sim_retained(TOPIC_STATUS), Some("online"));
}

#[test]
fn lwt_reports_offline_after_unclean_drop() {
    let mut mqtt = make_mqtt(ChargeMode::Off, 12.0);
    mqtt.connect().unwrap();
    assert_eq!(mqtt.sim_retained(TOPIC_STATUS), Some("online"));

    mqtt.sim_drop_link();
    assert_eq!(
        mqtt.sim_retained(TOPIC_STATUS),
        Some("offline"),
        "broker delivers the last-will payload"
    );
}

// ── Cutoff crossing publishes OFF exactly once ────────────────

#[test]
fn auto_cutoff_publishes_off_exactly_once_on_the_wire() {
    let (mut app, mut hw, state) = make_app(ChargeMode::Auto, 14.4);
    let mut log = JournalSink::new();
    let mut mqtt = make_mqtt(ChargeMode::Auto, 14.4);
    mqtt.connect().unwrap();
    mqtt.sim_clear_published();

    // Two cycles: 14.3 then 14.41, mirroring events to the broker sink.
    for v_bat in [14.3_f32, 14.41] {
        hw.frame.v_bat = v_bat;
        let before = log.events.len();
        app.tick(&mut hw, &state, &mut log);
        for event in log.events[before..].iter() {
            mqtt.emit(event);
        }
    }

    let off_publishes: Vec<_> = mqtt
        .sim_published()
        .iter()
        .filter(|m| m.topic == TOPIC_STATE_MODE && m.payload == "OFF")
        .collect();
    assert_eq!(off_publishes.len(), 1, "exactly one OFF on the state topic");
    assert!(off_publishes[0].retained);
    assert_eq!(app.mode(), ChargeMode::Off);
}

// ── Cutoff echo policy ────────────────────────────────────────

#[test]
fn accepted_cutoff_is_echoed_on_the_retained_mirror() {
    let (mut app, mut hw, state) = make_app(ChargeMode::Off, 12.0);
    let mut log = JournalSink::new();
    let mut mqtt = make_mqtt(ChargeMode::Off, 12.0);
    mqtt.connect().unwrap();

    mqtt.sim_inject(TOPIC_CMD_CUTOFF, "14.4");
    pump_commands(&mut mqtt, &mut app, &mut hw, &state, &mut log);

    assert_eq!(mqtt.sim_retained(TOPIC_STATE_CUTOFF), Some("14.40"));
    assert_eq!(state.saved_cutoffs.borrow().as_slice(), &[14.4]);
}

#[test]
fn cutoff_mirror_survives_reconnect() {
    let (mut app, mut hw, state) = make_app(ChargeMode::Off, 12.0);
    let mut log = JournalSink::new();
    let mut mqtt = make_mqtt(ChargeMode::Off, 12.0);
    mqtt.connect().unwrap();

    mqtt.sim_inject(TOPIC_CMD_CUTOFF, "13.6");
    pump_commands(&mut mqtt, &mut app, &mut hw, &state, &mut log);

    mqtt.sim_drop_link();
    mqtt.poll();
    reconnect(&mut mqtt);

    assert_eq!(mqtt.sim_retained(TOPIC_STATE_CUTOFF), Some("13.60"));
}

// ── Hardened command validation on the wire path ──────────────

#[test]
fn invalid_mode_string_is_rejected_not_adopted() {
    let (mut app, mut hw, state) = make_app(ChargeMode::On, 12.0);
    let mut log = JournalSink::new();
    let mut mqtt = make_mqtt(ChargeMode::On, 12.0);
    mqtt.connect().unwrap();

    mqtt.sim_inject(TOPIC_CMD_MODE, "TURBO");
    pump_commands(&mut mqtt, &mut app, &mut hw, &state, &mut log);

    assert_eq!(app.mode(), ChargeMode::On, "garbage must not become state");
    assert_eq!(mqtt.sim_retained(TOPIC_STATE_MODE), Some("ON"));
    assert_eq!(app.rejected_commands(), 1);
    assert!(state.saved_modes.borrow().is_empty());
}

#[test]
fn unknown_topic_is_rejected() {
    let (mut app, mut hw, state) = make_app(ChargeMode::Off, 12.0);
    let mut log = JournalSink::new();
    let mut mqtt = make_mqtt(ChargeMode::Off, 12.0);
    mqtt.connect().unwrap();

    mqtt.sim_inject("charger/cmd/reboot", "1");
    pump_commands(&mut mqtt, &mut app, &mut hw, &state, &mut log);

    assert_eq!(app.rejected_commands(), 1);
}

// ── Channel loss never touches local control ──────────────────

#[test]
fn control_loop_runs_fine_with_the_channel_down() {
    let (mut app, mut hw, state) = make_app(ChargeMode::On, 14.4);
    let mut log = JournalSink::new();
    let mut mqtt = make_mqtt(ChargeMode::On, 14.4);
    mqtt.connect().unwrap();
    mqtt.sim_drop_link();
    mqtt.poll();

    // Overheat + recovery with no channel: interlocks still work.
    hw.frame.temp_c = 80.0;
    app.tick(&mut hw, &state, &mut log);
    for event in log.events.iter() {
        mqtt.emit(event); // goes nowhere — link is down
    }
    assert!(!hw.charging());
    assert_eq!(hw.last_fan_duty(), Some(255));

    hw.frame.temp_c = 58.0;
    app.tick(&mut hw, &state, &mut log);
    assert!(hw.charging(), "recovery does not depend on the channel");
}

#[test]
fn mode_changed_while_down_converges_on_reconnect() {
    let (mut app, mut hw, state) = make_app(ChargeMode::Auto, 14.4);
    let mut log = JournalSink::new();
    let mut mqtt = make_mqtt(ChargeMode::Auto, 14.4);
    mqtt.connect().unwrap();
    mqtt.sim_drop_link();
    mqtt.poll();

    // Auto-cutoff fires while the link is down.
    hw.frame.v_bat = 14.5;
    let before = log.events.len();
    app.tick(&mut hw, &state, &mut log);
    for event in log.events[before..].iter() {
        mqtt.emit(event);
    }
    assert_eq!(app.mode(), ChargeMode::Off);

    reconnect(&mut mqtt);
    assert_eq!(
        mqtt.sim_retained(TOPIC_STATE_MODE),
        Some("OFF"),
        "handshake republish carries the change made while offline"
    );
}
