//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them — log to serial, publish retained
//! MQTT state, both.
//!
//! Safety overrides (`ModeChanged { cause: AutoCutoff }`, `OverheatSet`)
//! ride the same channel as everything else but carry their cause, so
//! an observer can always tell a designed transition from a fault.

use crate::charge::{ChargeMode, ModeChangeCause};
use crate::error::CommandError;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Periodic telemetry snapshot.
    Telemetry(TelemetryData),

    /// The charge mode changed (remote command or auto-cutoff).
    /// Emitted *after* the new value was persisted.
    ModeChanged {
        from: ChargeMode,
        to: ChargeMode,
        cause: ModeChangeCause,
    },

    /// The cutoff voltage changed by remote command (persisted first).
    CutoffChanged(f32),

    /// The overheat latch set at the given temperature.
    OverheatSet(f32),

    /// The overheat latch cleared at the given temperature.
    OverheatCleared(f32),

    /// The fan controller began a stall kick-start pulse.
    StallKickStarted { rpm: f32 },

    /// A remote command was rejected (surfaced, never applied).
    CommandRejected(CommandError),

    /// The application service has started (carries the restored mode).
    Started(ChargeMode),
}

/// A point-in-time telemetry snapshot suitable for logging or transmission.
#[derive(Debug, Clone)]
pub struct TelemetryData {
    pub v_psu: f32,
    pub v_bat: f32,
    pub current_a: f32,
    pub power_w: f32,
    pub temp_c: f32,
    pub fan_duty: u8,
    pub fan_rpm: f32,
    pub mode: ChargeMode,
    pub cutoff_v: f32,
    pub charging: bool,
    pub overheated: bool,
}
