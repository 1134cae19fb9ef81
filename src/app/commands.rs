//! Inbound remote commands and the closed topic namespace.
//!
//! The sync channel delivers raw `(topic, payload)` pairs; this module
//! turns them into typed [`RemoteCommand`]s or a
//! [`CommandError`](crate::error::CommandError).  Parsing lives here —
//! not in the transport adapter — so the validation rules are the same
//! for every transport and testable without one.
//!
//! Unknown topics and malformed payloads are **rejected and surfaced**,
//! never applied.  (An earlier controller generation adopted any mode
//! string verbatim; a typo in the app could park the charger in an
//! undefined mode until the next reboot.)

use crate::charge::ChargeMode;
use crate::error::CommandError;
use log::warn;

// ───────────────────────────────────────────────────────────────
// Topic namespace
// ───────────────────────────────────────────────────────────────

/// Wildcard the channel subscribes to on every (re)connect.
pub const TOPIC_CMD_WILDCARD: &str = "charger/cmd/#";
/// Inbound: mode command (`OFF` / `ON` / `AUTO`).
pub const TOPIC_CMD_MODE: &str = "charger/cmd/mode";
/// Inbound: cutoff-voltage command (decimal volts).
pub const TOPIC_CMD_CUTOFF: &str = "charger/cmd/cutoff";

/// Outbound, retained: authoritative mode mirror.
pub const TOPIC_STATE_MODE: &str = "charger/state/mode";
/// Outbound, retained: authoritative cutoff mirror.
pub const TOPIC_STATE_CUTOFF: &str = "charger/state/cutoff";
/// Outbound, retained: liveness (`online`, or `offline` via last-will).
pub const TOPIC_STATUS: &str = "charger/status";

/// Outbound telemetry, one value per topic, not retained.
pub const TOPIC_TELEMETRY_V_PSU: &str = "charger/telemetry/v_psu";
pub const TOPIC_TELEMETRY_V_BAT: &str = "charger/telemetry/v_bat";
pub const TOPIC_TELEMETRY_CURRENT: &str = "charger/telemetry/current";
pub const TOPIC_TELEMETRY_POWER: &str = "charger/telemetry/power";
pub const TOPIC_TELEMETRY_TEMP: &str = "charger/telemetry/temp";

/// Payloads published on [`TOPIC_STATUS`].
pub const STATUS_ONLINE: &str = "online";
pub const STATUS_OFFLINE: &str = "offline";

/// Sanity range for remote cutoff values (volts). Wide enough for 6 V
/// through 48 V banks, tight enough to reject garbage.
pub const CUTOFF_MIN_V: f32 = 1.0;
pub const CUTOFF_MAX_V: f32 = 60.0;

// ───────────────────────────────────────────────────────────────
// RemoteCommand
// ───────────────────────────────────────────────────────────────

/// A validated remote command, consumed at most once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteCommand {
    /// Unconditional mode transition.
    SetMode(ChargeMode),
    /// Update the auto-cutoff voltage.
    SetCutoff(f32),
}

impl RemoteCommand {
    /// Parse a raw `(topic, payload)` pair from the sync channel.
    ///
    /// Rejections are logged here with the offending payload, so the
    /// caller only sees the typed error.
    pub fn parse(topic: &str, payload: &str) -> Result<Self, CommandError> {
        match topic {
            TOPIC_CMD_MODE => match payload.parse::<ChargeMode>() {
                Ok(mode) => Ok(Self::SetMode(mode)),
                Err(e) => {
                    warn!("CMD: rejected mode payload {payload:?} — {e}");
                    Err(e)
                }
            },
            TOPIC_CMD_CUTOFF => {
                let volts: f32 = payload.trim().parse().map_err(|_| {
                    warn!("CMD: rejected cutoff payload {payload:?} — not a number");
                    CommandError::InvalidPayload
                })?;
                if !(CUTOFF_MIN_V..=CUTOFF_MAX_V).contains(&volts) {
                    warn!("CMD: rejected cutoff {volts} — outside {CUTOFF_MIN_V}..{CUTOFF_MAX_V} V");
                    return Err(CommandError::InvalidPayload);
                }
                Ok(Self::SetCutoff(volts))
            }
            other => {
                warn!("CMD: unknown topic {other:?}");
                Err(CommandError::UnknownTopic)
            }
        }
    }
}
