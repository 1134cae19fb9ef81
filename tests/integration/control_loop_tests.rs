//! Integration tests for the AppService control pipeline:
//! sample → safety latch → auto-cutoff → fan → actuators.

use crate::mock_hw::{healthy_frame, new_journal, JournalSink, MockHardware, MockState};

use chargepilot::app::commands::RemoteCommand;
use chargepilot::app::events::AppEvent;
use chargepilot::app::ports::PersistedState;
use chargepilot::app::service::AppService;
use chargepilot::charge::{ChargeMode, ModeChangeCause};
use chargepilot::config::SystemConfig;
use chargepilot::error::CommandError;

fn make_app(mode: ChargeMode, cutoff_v: f32) -> (AppService, MockHardware, JournalSink) {
    let config = SystemConfig::default();
    let app = AppService::new(&config, PersistedState { mode, cutoff_v });
    (app, MockHardware::new(), JournalSink::new())
}

// ── Overheat interlock: 78 °C with mode ON ────────────────────

#[test]
fn overheat_forces_charge_off_and_full_fan_regardless_of_mode() {
    let (mut app, mut hw, mut sink) = make_app(ChargeMode::On, 14.4);
    let state = MockState::new(ChargeMode::On, 14.4);

    // Healthy tick first: charging runs.
    app.tick(&mut hw, &state, &mut sink);
    assert!(hw.charging(), "mode ON with cool board must charge");

    // 78 °C ≥ 75 critical → latch sets this very tick.
    hw.frame.temp_c = 78.0;
    app.tick(&mut hw, &state, &mut sink);

    assert!(app.is_overheated());
    assert!(!hw.charging(), "latch must open the charge path");
    assert_eq!(hw.last_fan_duty(), Some(255));
    assert_eq!(hw.safety_shutdowns(), 1, "shutdown must carry a reason");
    assert_eq!(app.mode(), ChargeMode::On, "stored mode must survive the latch");
    assert_eq!(
        sink.count_matching(|e| matches!(e, AppEvent::OverheatSet(_))),
        1
    );
}

#[test]
fn overheat_does_not_republish_mode() {
    let (mut app, mut hw, mut sink) = make_app(ChargeMode::On, 14.4);
    let state = MockState::new(ChargeMode::On, 14.4);

    hw.frame.temp_c = 80.0;
    app.tick(&mut hw, &state, &mut sink);

    // No mode value changed, so nothing may hit the retained mirror.
    assert!(sink.mode_changes().is_empty());
    assert!(state.saved_modes.borrow().is_empty());
}

#[test]
fn recovery_resumes_charging_without_recommand() {
    let (mut app, mut hw, mut sink) = make_app(ChargeMode::On, 14.4);
    let state = MockState::new(ChargeMode::On, 14.4);

    hw.frame.temp_c = 80.0;
    app.tick(&mut hw, &state, &mut sink);
    assert!(!hw.charging());

    // Inside the hysteresis band: still latched.
    hw.frame.temp_c = 65.0;
    app.tick(&mut hw, &state, &mut sink);
    assert!(!hw.charging());

    // At recovery: latch clears, stored ON resumes on the same tick.
    hw.frame.temp_c = 60.0;
    app.tick(&mut hw, &state, &mut sink);
    assert!(!app.is_overheated());
    assert!(hw.charging());
    assert_eq!(
        sink.count_matching(|e| matches!(e, AppEvent::OverheatCleared(_))),
        1
    );
}

// ── Auto cutoff at 14.4 V ─────────────────────────────────────

#[test]
fn auto_cutoff_fires_exactly_once_on_the_crossing_cycle() {
    let (mut app, mut hw, mut sink) = make_app(ChargeMode::Auto, 14.4);
    let state = MockState::new(ChargeMode::Auto, 14.4);

    hw.frame.v_bat = 14.3;
    app.tick(&mut hw, &state, &mut sink);
    assert_eq!(app.mode(), ChargeMode::Auto);
    assert!(hw.charging());

    hw.frame.v_bat = 14.41;
    app.tick(&mut hw, &state, &mut sink);
    assert_eq!(app.mode(), ChargeMode::Off);
    assert!(!hw.charging());
    assert_eq!(state.saved_modes.borrow().as_slice(), &[ChargeMode::Off]);
    assert_eq!(sink.mode_changes(), vec![(ChargeMode::Auto, ChargeMode::Off)]);

    // Battery stays high: no further transitions, no re-publish.
    for _ in 0..5 {
        hw.frame.v_bat = 14.5;
        app.tick(&mut hw, &state, &mut sink);
    }
    assert_eq!(state.saved_modes.borrow().len(), 1);
    assert_eq!(sink.mode_changes().len(), 1);
}

#[test]
fn auto_cutoff_is_persisted_before_republish() {
    let journal = new_journal();
    let (mut app, mut hw, _) = make_app(ChargeMode::Auto, 14.4);
    let state = MockState::with_journal(ChargeMode::Auto, 14.4, journal.clone());
    let mut sink = JournalSink::with_journal(journal.clone());

    hw.frame.v_bat = 14.41;
    app.tick(&mut hw, &state, &mut sink);

    let entries = journal.borrow();
    let persist_idx = entries.iter().position(|e| e == "persist:mode=OFF");
    let publish_idx = entries.iter().position(|e| e == "event:mode=OFF");
    assert!(
        persist_idx.unwrap() < publish_idx.unwrap(),
        "persist must precede republish: {entries:?}"
    );
}

#[test]
fn cutoff_marks_the_edge_as_designed_not_a_fault() {
    let (mut app, mut hw, mut sink) = make_app(ChargeMode::Auto, 14.4);
    let state = MockState::new(ChargeMode::Auto, 14.4);

    hw.frame.v_bat = 14.5;
    app.tick(&mut hw, &state, &mut sink);

    assert_eq!(
        sink.count_matching(|e| matches!(
            e,
            AppEvent::ModeChanged {
                cause: ModeChangeCause::AutoCutoff,
                ..
            }
        )),
        1
    );
}

#[test]
fn manual_on_ignores_cutoff_voltage() {
    let (mut app, mut hw, mut sink) = make_app(ChargeMode::On, 13.0);
    let state = MockState::new(ChargeMode::On, 13.0);

    hw.frame.v_bat = 15.0;
    for _ in 0..3 {
        app.tick(&mut hw, &state, &mut sink);
    }
    assert_eq!(app.mode(), ChargeMode::On);
    assert!(hw.charging(), "cutoff only governs AUTO");
}

// ── Remote commands ───────────────────────────────────────────

#[test]
fn remote_mode_command_applies_persists_and_republishes() {
    let (mut app, mut hw, mut sink) = make_app(ChargeMode::Off, 12.0);
    let state = MockState::new(ChargeMode::Off, 12.0);

    app.handle_command(
        RemoteCommand::SetMode(ChargeMode::Auto),
        &mut hw,
        &state,
        &mut sink,
    );

    assert_eq!(app.mode(), ChargeMode::Auto);
    assert!(hw.charging(), "command takes effect without waiting a tick");
    assert_eq!(state.saved_modes.borrow().as_slice(), &[ChargeMode::Auto]);
    assert_eq!(sink.mode_changes(), vec![(ChargeMode::Off, ChargeMode::Auto)]);
}

#[test]
fn remote_command_cannot_override_the_latch() {
    let (mut app, mut hw, mut sink) = make_app(ChargeMode::Off, 12.0);
    let state = MockState::new(ChargeMode::Off, 12.0);

    hw.frame.temp_c = 80.0;
    app.tick(&mut hw, &state, &mut sink);
    assert!(app.is_overheated());

    app.handle_command(
        RemoteCommand::SetMode(ChargeMode::On),
        &mut hw,
        &state,
        &mut sink,
    );

    assert_eq!(app.mode(), ChargeMode::On, "mode value is accepted");
    assert!(!hw.charging(), "output stays off while latched");

    // Latch clears → the already-stored ON begins charging.
    hw.frame.temp_c = 55.0;
    app.tick(&mut hw, &state, &mut sink);
    assert!(hw.charging());
}

#[test]
fn cutoff_command_persists_and_echoes() {
    let journal = new_journal();
    let (mut app, mut hw, _) = make_app(ChargeMode::Off, 12.0);
    let state = MockState::with_journal(ChargeMode::Off, 12.0, journal.clone());
    let mut sink = JournalSink::with_journal(journal.clone());

    app.handle_command(RemoteCommand::SetCutoff(14.4), &mut hw, &state, &mut sink);

    assert!((app.cutoff_v() - 14.4).abs() < f32::EPSILON);
    assert_eq!(state.saved_cutoffs.borrow().as_slice(), &[14.4]);
    assert_eq!(
        sink.count_matching(|e| matches!(e, AppEvent::CutoffChanged(_))),
        1,
        "echo policy: every accepted cutoff is acknowledged"
    );

    let entries = journal.borrow();
    let persist_idx = entries.iter().position(|e| e == "persist:cutoff=14.40");
    let publish_idx = entries.iter().position(|e| e == "event:cutoff=14.40");
    assert!(persist_idx.unwrap() < publish_idx.unwrap());
}

#[test]
fn new_cutoff_governs_the_next_tick() {
    let (mut app, mut hw, mut sink) = make_app(ChargeMode::Auto, 14.4);
    let state = MockState::new(ChargeMode::Auto, 14.4);

    hw.frame.v_bat = 13.9;
    app.tick(&mut hw, &state, &mut sink);
    assert_eq!(app.mode(), ChargeMode::Auto);

    // Lower the cutoff below the present battery voltage.
    app.handle_command(RemoteCommand::SetCutoff(13.8), &mut hw, &state, &mut sink);
    app.tick(&mut hw, &state, &mut sink);
    assert_eq!(app.mode(), ChargeMode::Off, "cutoff applies on the next cycle");
}

#[test]
fn rejected_commands_are_surfaced_and_counted() {
    let (mut app, _hw, mut sink) = make_app(ChargeMode::Off, 12.0);

    app.note_rejected_command(CommandError::InvalidMode, &mut sink);
    app.note_rejected_command(CommandError::UnknownTopic, &mut sink);

    assert_eq!(app.rejected_commands(), 2);
    assert_eq!(
        sink.count_matching(|e| matches!(e, AppEvent::CommandRejected(_))),
        2
    );
    assert_eq!(app.mode(), ChargeMode::Off, "rejected input never mutates state");
}

#[test]
fn persistence_failure_does_not_stall_the_loop() {
    let (mut app, mut hw, mut sink) = make_app(ChargeMode::Off, 12.0);
    let mut state = MockState::new(ChargeMode::Off, 12.0);
    state.fail_writes = true;

    app.handle_command(
        RemoteCommand::SetMode(ChargeMode::On),
        &mut hw,
        &state,
        &mut sink,
    );
    // The value still applies in memory and the mirror still publishes;
    // the write error is logged. Nothing is fatal in this system.
    assert_eq!(app.mode(), ChargeMode::On);
    assert_eq!(sink.mode_changes().len(), 1);

    app.tick(&mut hw, &state, &mut sink);
    assert!(hw.charging());
}

// ── Fan behaviour through the service ─────────────────────────

#[test]
fn stall_kick_runs_through_the_service() {
    let (mut app, mut hw, mut sink) = make_app(ChargeMode::Off, 12.0);
    let state = MockState::new(ChargeMode::Off, 12.0);

    // Prime with a healthy window.
    app.tick(&mut hw, &state, &mut sink);

    hw.frame.fan_rpm = 0.0;
    app.tick(&mut hw, &state, &mut sink);
    assert_eq!(hw.last_fan_duty(), Some(255), "kick starts");
    assert_eq!(
        sink.count_matching(|e| matches!(e, AppEvent::StallKickStarted { .. })),
        1
    );

    // Full 5 s window at 255 (4 more ticks), still only one kick event.
    for _ in 0..4 {
        app.tick(&mut hw, &state, &mut sink);
        assert_eq!(hw.last_fan_duty(), Some(255));
    }
    assert_eq!(
        sink.count_matching(|e| matches!(e, AppEvent::StallKickStarted { .. })),
        1
    );

    // Fan came back: post-kick tick reverts to the curve duty.
    hw.frame.fan_rpm = 1500.0;
    app.tick(&mut hw, &state, &mut sink);
    let floor = SystemConfig::default().fan_min_duty;
    assert_eq!(hw.last_fan_duty(), Some(floor));
}

#[test]
fn fan_tracks_temperature_curve() {
    let (mut app, mut hw, mut sink) = make_app(ChargeMode::On, 14.4);
    let state = MockState::new(ChargeMode::On, 14.4);
    let cfg = SystemConfig::default();

    hw.frame = healthy_frame();
    hw.frame.temp_c = 25.0;
    app.tick(&mut hw, &state, &mut sink);
    assert_eq!(hw.last_fan_duty(), Some(cfg.fan_min_duty));

    hw.frame.temp_c = cfg.fan_temp_full_c + 1.0;
    app.tick(&mut hw, &state, &mut sink);
    assert_eq!(hw.last_fan_duty(), Some(255));
}

// ── Telemetry assembly ────────────────────────────────────────

#[test]
fn telemetry_mirrors_the_live_decision() {
    let (mut app, mut hw, mut sink) = make_app(ChargeMode::On, 14.4);
    let state = MockState::new(ChargeMode::On, 14.4);

    hw.frame.temp_c = 80.0;
    app.tick(&mut hw, &state, &mut sink);

    let t = app.build_telemetry();
    assert_eq!(t.mode, ChargeMode::On);
    assert!(t.overheated);
    assert!(!t.charging, "telemetry must show the override, not the mode");
    assert_eq!(t.fan_duty, 255);
    assert!((t.temp_c - 80.0).abs() < f32::EPSILON);
    assert!((t.cutoff_v - 14.4).abs() < f32::EPSILON);
}

#[test]
fn startup_announces_restored_mode() {
    let (mut app, _hw, mut sink) = make_app(ChargeMode::Auto, 13.8);
    app.start(&mut sink);
    assert_eq!(
        sink.count_matching(|e| matches!(e, AppEvent::Started(ChargeMode::Auto))),
        1
    );
}
