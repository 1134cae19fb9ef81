//! Safety supervisor.
//!
//! The supervisor runs **every tick before the charge decision** and owns
//! the overheat latch.  While the latch is set, the charge output is
//! forced off regardless of the commanded mode — the highest-precedence
//! rule in the system.
//!
//! ## Latch lifecycle
//!
//! 1. Temperature reaches `temp_critical_c` → latch sets.
//! 2. Charge output and full fan are forced until recovery.
//! 3. Temperature falls to `temp_recovery_c` → latch clears.
//!
//! The band between the two thresholds is an intentional dead zone:
//! inside it the latch holds whatever state it had, so a temperature
//! hovering near one threshold cannot chatter the charge relay.
//!
//! The supervisor also owns the auto-cutoff predicate (battery voltage at
//! or above the configured cutoff).  The mode machine consumes it as a
//! one-shot Auto→Off edge; the supervisor itself keeps no cutoff state.

use crate::config::SystemConfig;
use crate::sensors::SensorFrame;
use log::{info, warn};

/// Edge reported by [`SafetySupervisor::evaluate`] when the latch moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchEdge {
    /// Temperature reached the critical threshold; charging inhibited.
    Set,
    /// Temperature fell to the recovery threshold; inhibit released.
    Cleared,
}

/// Safety supervisor.
pub struct SafetySupervisor {
    temp_critical_c: f32,
    temp_recovery_c: f32,
    /// Latched overheat condition.
    overheated: bool,
}

impl SafetySupervisor {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            temp_critical_c: config.temp_critical_c,
            temp_recovery_c: config.temp_recovery_c,
            overheated: false,
        }
    }

    /// Evaluate the overheat latch against the latest sensor frame.
    /// Returns the edge if the latch transitioned this tick.
    pub fn evaluate(&mut self, frame: &SensorFrame) -> Option<LatchEdge> {
        if !self.overheated && frame.temp_c >= self.temp_critical_c {
            self.overheated = true;
            warn!(
                "SAFETY: overheat latch SET at {:.1}C (critical {:.1}C) — charge inhibited",
                frame.temp_c, self.temp_critical_c
            );
            return Some(LatchEdge::Set);
        }
        if self.overheated && frame.temp_c <= self.temp_recovery_c {
            self.overheated = false;
            info!(
                "SAFETY: overheat latch cleared at {:.1}C (recovery {:.1}C)",
                frame.temp_c, self.temp_recovery_c
            );
            return Some(LatchEdge::Cleared);
        }
        None
    }

    /// True while the overheat latch is set.
    pub fn is_overheated(&self) -> bool {
        self.overheated
    }

    /// Whether the charge output may be energised at all.
    /// The latch overrides every other rule, including the stored mode.
    pub fn charge_permitted(&self) -> bool {
        !self.overheated
    }

    /// Auto-cutoff predicate: battery at or above the cutoff voltage.
    /// Stateless — the one-shot behaviour lives in the mode machine,
    /// which stops being `Auto` after consuming the first true edge.
    pub fn cutoff_reached(&self, frame: &SensorFrame, cutoff_v: f32) -> bool {
        frame.v_bat >= cutoff_v
    }
}
