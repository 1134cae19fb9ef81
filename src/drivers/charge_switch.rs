//! Charge-enable output driver (MOSFET into the charge relay).
//!
//! A single-bit actuator with one extra wrinkle: a shutdown commanded by
//! the safety supervisor is recorded with its reason, so the state query
//! can distinguish "operator turned it off" from "latch forced it off"
//! in logs and diagnostics.
//!
//! ## Safety contract
//!
//! The switch must never be enabled while the overheat latch is set.
//! Enforced by the app service's gating; this driver is a dumb actuator.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: drives the real enable GPIO via hw_init helpers.
//! On host/test: tracks state in-memory only.

use log::warn;

use crate::drivers::hw_init;
use crate::pins;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Off,
    On,
    /// Forced off by a safety override, with the reason.
    ForcedOff(&'static str),
}

pub struct ChargeSwitch {
    state: SwitchState,
}

impl ChargeSwitch {
    pub fn new() -> Self {
        Self {
            state: SwitchState::Off,
        }
    }

    pub fn enable(&mut self) {
        self.set_hw(true);
        self.state = SwitchState::On;
    }

    pub fn disable(&mut self) {
        self.set_hw(false);
        self.state = SwitchState::Off;
    }

    /// Safety-forced disable; records the reason.
    pub fn safety_shutdown(&mut self, reason: &'static str) {
        self.set_hw(false);
        self.state = SwitchState::ForcedOff(reason);
        warn!("CHARGE: safety shutdown — {}", reason);
    }

    fn set_hw(&self, on: bool) {
        hw_init::gpio_write(pins::CHARGE_EN_GPIO, on);
    }

    pub fn state(&self) -> SwitchState {
        self.state
    }

    pub fn is_on(&self) -> bool {
        matches!(self.state, SwitchState::On)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_disable_roundtrip() {
        let mut sw = ChargeSwitch::new();
        assert!(!sw.is_on());
        sw.enable();
        assert!(sw.is_on());
        sw.disable();
        assert_eq!(sw.state(), SwitchState::Off);
    }

    #[test]
    fn safety_shutdown_records_reason() {
        let mut sw = ChargeSwitch::new();
        sw.enable();
        sw.safety_shutdown("overheat latch");
        assert!(!sw.is_on());
        assert_eq!(sw.state(), SwitchState::ForcedOff("overheat latch"));
    }
}
