//! Application service — the hexagonal core.
//!
//! [`AppService`] owns the mode machine, safety supervisor, and fan
//! controller.  It exposes a clean, hardware-agnostic API.  All I/O flows
//! through port traits injected at call sites, making the entire service
//! testable with mock adapters.
//!
//! ```text
//!  SensorPort ──▶ ┌─────────────────────────────┐ ──▶ EventSink
//!                 │         AppService          │
//! ActuatorPort ◀──│  Safety · Mode · Fan        │ ──▶ StatePort
//!                 └─────────────────────────────┘
//! ```
//!
//! Per-tick order matters and is fixed: sample → safety latch →
//! auto-cutoff → fan → actuators.  The latch is evaluated before the
//! charge decision so an overheat discovered this tick opens the charge
//! path this tick.

use log::{error, warn};

use crate::charge::{ChargeMode, ModeMachine};
use crate::config::SystemConfig;
use crate::control::fan::FanController;
use crate::safety::{LatchEdge, SafetySupervisor};

use super::commands::RemoteCommand;
use super::events::{AppEvent, TelemetryData};
use super::ports::{ActuatorPort, EventSink, PersistedState, SensorPort, StatePort};
use crate::sensors::SensorFrame;

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService {
    machine: ModeMachine,
    safety: SafetySupervisor,
    fan: FanController,
    /// Seconds per control tick (derived from config).
    tick_secs: f32,
    tick_count: u64,
    /// Last frame, kept for telemetry assembly between ticks.
    last_frame: SensorFrame,
    /// Last commanded fan duty.
    fan_duty: u8,
    /// Rejected-command counter (surfaced in logs; never resets).
    rejected_commands: u32,
}

impl AppService {
    /// Construct the service from configuration and the state restored
    /// from persistence at boot.
    pub fn new(config: &SystemConfig, persisted: PersistedState) -> Self {
        Self {
            machine: ModeMachine::new(persisted.mode, persisted.cutoff_v),
            safety: SafetySupervisor::new(config),
            fan: FanController::new(config),
            tick_secs: config.control_loop_interval_ms as f32 / 1000.0,
            tick_count: 0,
            last_frame: SensorFrame::default(),
            fan_duty: 0,
            rejected_commands: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Announce startup with the restored mode.
    pub fn start(&mut self, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Started(self.machine.mode()));
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control cycle: read sensors → safety → mode →
    /// fan → actuators.
    ///
    /// The `hw` parameter satisfies **both** [`SensorPort`] and
    /// [`ActuatorPort`] — this avoids a double mutable borrow while
    /// keeping the port boundary explicit.  `state` is needed because an
    /// auto-cutoff transition must persist before it is republished.
    pub fn tick(
        &mut self,
        hw: &mut (impl SensorPort + ActuatorPort),
        state: &impl StatePort,
        sink: &mut impl EventSink,
    ) {
        self.tick_count += 1;

        // 1. Acquire the frame via SensorPort.
        let frame = hw.sample(self.tick_secs);
        self.last_frame = frame;

        // 2. Overheat latch.
        match self.safety.evaluate(&frame) {
            Some(LatchEdge::Set) => sink.emit(&AppEvent::OverheatSet(frame.temp_c)),
            Some(LatchEdge::Cleared) => sink.emit(&AppEvent::OverheatCleared(frame.temp_c)),
            None => {}
        }

        // 3. Auto-cutoff: one-shot Auto→Off on the crossing cycle.
        if self.machine.mode() == ChargeMode::Auto
            && self.safety.cutoff_reached(&frame, self.machine.cutoff_v())
        {
            if let Some(change) = self.machine.auto_cutoff() {
                self.persist_mode(state, change.to);
                sink.emit(&AppEvent::ModeChanged {
                    from: change.from,
                    to: change.to,
                    cause: change.cause,
                });
            }
        }

        // 4. Fan duty (uses the previous window's RPM, by construction).
        self.fan_duty = self.fan.update(&frame, self.safety.is_overheated());
        if self.fan.kick_started() {
            sink.emit(&AppEvent::StallKickStarted { rpm: frame.fan_rpm });
        }

        // 5. Apply actuator commands via ActuatorPort.
        self.apply_actuators(hw);
    }

    // ── Command handling ──────────────────────────────────────

    /// Process one remote command (at-most-once, within the receiving
    /// cycle).  Persist-then-republish ordering: the new value hits the
    /// StatePort before the event that mirrors it goes out.
    pub fn handle_command(
        &mut self,
        cmd: RemoteCommand,
        hw: &mut impl ActuatorPort,
        state: &impl StatePort,
        sink: &mut impl EventSink,
    ) {
        match cmd {
            RemoteCommand::SetMode(mode) => {
                let change = self.machine.apply_remote_mode(mode);
                self.persist_mode(state, change.to);
                sink.emit(&AppEvent::ModeChanged {
                    from: change.from,
                    to: change.to,
                    cause: change.cause,
                });
                // Take effect immediately rather than on the next tick.
                self.apply_actuators(hw);
            }
            RemoteCommand::SetCutoff(volts) => {
                let stored = self.machine.apply_remote_cutoff(volts);
                if let Err(e) = state.save_cutoff(stored) {
                    error!("PERSIST: cutoff write failed ({e}) — retrying next change");
                }
                // Echo policy: always acknowledge on the retained mirror.
                sink.emit(&AppEvent::CutoffChanged(stored));
            }
        }
    }

    /// Record a command the parser rejected, for surfacing.
    pub fn note_rejected_command(
        &mut self,
        err: crate::error::CommandError,
        sink: &mut impl EventSink,
    ) {
        self.rejected_commands = self.rejected_commands.saturating_add(1);
        warn!(
            "CMD: rejected ({err}) — {} total since boot",
            self.rejected_commands
        );
        sink.emit(&AppEvent::CommandRejected(err));
    }

    // ── Queries ───────────────────────────────────────────────

    /// Build a telemetry snapshot from the current context.
    pub fn build_telemetry(&self) -> TelemetryData {
        TelemetryData {
            v_psu: self.last_frame.v_psu,
            v_bat: self.last_frame.v_bat,
            current_a: self.last_frame.current_a,
            power_w: self.last_frame.power_w,
            temp_c: self.last_frame.temp_c,
            fan_duty: self.fan_duty,
            fan_rpm: self.last_frame.fan_rpm,
            mode: self.machine.mode(),
            cutoff_v: self.machine.cutoff_v(),
            charging: self.charge_decision(),
            overheated: self.safety.is_overheated(),
        }
    }

    /// Current charge mode.
    pub fn mode(&self) -> ChargeMode {
        self.machine.mode()
    }

    /// Current cutoff voltage.
    pub fn cutoff_v(&self) -> f32 {
        self.machine.cutoff_v()
    }

    /// Whether the overheat latch is set.
    pub fn is_overheated(&self) -> bool {
        self.safety.is_overheated()
    }

    /// Last commanded fan duty.
    pub fn fan_duty(&self) -> u8 {
        self.fan_duty
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Commands rejected since boot.
    pub fn rejected_commands(&self) -> u32 {
        self.rejected_commands
    }

    // ── Internal ──────────────────────────────────────────────

    /// The single-bit charge decision: mode requests it AND the latch
    /// permits it.  The latch wins every conflict.
    fn charge_decision(&self) -> bool {
        self.machine.mode().requests_charge() && self.safety.charge_permitted()
    }

    /// Translate the current decision into port calls.
    fn apply_actuators(&self, hw: &mut impl ActuatorPort) {
        hw.set_fan(self.fan_duty);

        if self.charge_decision() {
            hw.enable_charge();
        } else if hw.is_charging() && self.safety.is_overheated() {
            hw.safety_shutdown_charge("overheat latch");
        } else {
            hw.disable_charge();
        }
    }

    fn persist_mode(&self, state: &impl StatePort, mode: ChargeMode) {
        if let Err(e) = state.save_mode(mode) {
            error!("PERSIST: mode write failed ({e}) — retrying next change");
        }
    }
}
