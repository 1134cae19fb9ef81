//! Charge mode state machine.
//!
//! [`ModeMachine`] is the single owner of the two persisted runtime values:
//! the charge mode and the auto-cutoff voltage.  It is a plain owned struct
//! injected into the control loop and the command handler (never a
//! file-scope global), so the whole decision path is testable without a
//! live transport.
//!
//! Transitions:
//! - remote `mode` command → unconditional move to the commanded mode
//!   (invalid wire strings are rejected upstream at parse and never reach
//!   this type);
//! - auto-cutoff edge → one-shot Auto→Off, consumed by the caller for
//!   persistence and retained republish;
//! - overheat → **no transition here**. The latch gates the actuator
//!   output only; the stored mode survives so charging resumes when the
//!   latch clears.

use core::fmt;
use core::str::FromStr;

use log::info;

use crate::error::CommandError;

// ---------------------------------------------------------------------------
// ChargeMode
// ---------------------------------------------------------------------------

/// The commanded charge mode. Wire strings are `OFF` / `ON` / `AUTO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChargeMode {
    /// Charge output disabled.
    #[default]
    Off,
    /// Charge output enabled unconditionally (still subject to the latch).
    On,
    /// Charge output enabled until battery voltage reaches the cutoff.
    Auto,
}

impl ChargeMode {
    /// Wire / persistence representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
            Self::Auto => "AUTO",
        }
    }

    /// Whether this mode asks for charge current at all.
    pub const fn requests_charge(self) -> bool {
        matches!(self, Self::On | Self::Auto)
    }
}

impl FromStr for ChargeMode {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OFF" => Ok(Self::Off),
            "ON" => Ok(Self::On),
            "AUTO" => Ok(Self::Auto),
            _ => Err(CommandError::InvalidMode),
        }
    }
}

impl fmt::Display for ChargeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Transition bookkeeping
// ---------------------------------------------------------------------------

/// Why a mode transition happened — telemetry and logging must be able to
/// tell a designed safety override apart from an operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChangeCause {
    /// Remote command on the `mode` topic.
    Remote,
    /// Battery voltage reached the cutoff while in Auto.
    AutoCutoff,
}

/// A completed transition, returned to the caller for persist + republish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChange {
    pub from: ChargeMode,
    pub to: ChargeMode,
    pub cause: ModeChangeCause,
}

// ---------------------------------------------------------------------------
// ModeMachine
// ---------------------------------------------------------------------------

/// Owner of the persisted charge mode and cutoff voltage.
pub struct ModeMachine {
    mode: ChargeMode,
    cutoff_v: f32,
}

impl ModeMachine {
    /// Construct from values loaded out of persistence at startup.
    pub fn new(mode: ChargeMode, cutoff_v: f32) -> Self {
        Self { mode, cutoff_v }
    }

    pub fn mode(&self) -> ChargeMode {
        self.mode
    }

    pub fn cutoff_v(&self) -> f32 {
        self.cutoff_v
    }

    /// Apply a remote mode command.  Unconditional — the phone app is the
    /// authority.  Returns the change even when the value is unchanged, so
    /// the caller always re-persists and re-publishes the retained state
    /// mirror (commands are idempotent; acknowledging twice is harmless).
    pub fn apply_remote_mode(&mut self, mode: ChargeMode) -> ModeChange {
        let from = self.mode;
        self.mode = mode;
        info!("MODE: {} -> {} (remote)", from, mode);
        ModeChange {
            from,
            to: mode,
            cause: ModeChangeCause::Remote,
        }
    }

    /// Apply a remote cutoff-voltage update (already range-validated at
    /// the parse boundary). Returns the stored value.
    pub fn apply_remote_cutoff(&mut self, volts: f32) -> f32 {
        self.cutoff_v = volts;
        info!("CUTOFF: set to {:.2}V (remote)", volts);
        volts
    }

    /// Consume the auto-cutoff edge: Auto→Off, one shot.  Returns `None`
    /// in every other mode, so a battery held above the cutoff cannot
    /// re-trigger — re-arming Auto is an explicit remote action.
    pub fn auto_cutoff(&mut self) -> Option<ModeChange> {
        if self.mode != ChargeMode::Auto {
            return None;
        }
        self.mode = ChargeMode::Off;
        info!("MODE: AUTO -> OFF (auto-cutoff at {:.2}V)", self.cutoff_v);
        Some(ModeChange {
            from: ChargeMode::Auto,
            to: ChargeMode::Off,
            cause: ModeChangeCause::AutoCutoff,
        })
    }
}
