//! Cooling fan output driver (4-wire 12 V fan, LEDC PWM).
//!
//! A dumb actuator: the duty it is told is the duty it drives.  The fan
//! curve, idle floor, and stall kick-start live in
//! [`FanController`](crate::control::fan::FanController); this driver only
//! owns the PWM register.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: drives the LEDC fan channel via hw_init helpers.
//! On host/test: tracks state in-memory only.

use crate::drivers::hw_init;

pub struct FanDriver {
    hw_duty: u8,
}

impl FanDriver {
    pub fn new() -> Self {
        Self { hw_duty: 0 }
    }

    /// Drive the fan at `duty` (0–255).
    pub fn set(&mut self, duty: u8) {
        hw_init::ledc_set(hw_init::LEDC_CH_FAN, duty);
        self.hw_duty = duty;
    }

    /// Stop the fan outright (used by all_off on shutdown paths).
    pub fn stop(&mut self) {
        self.set(0);
    }

    pub fn current_duty(&self) -> u8 {
        self.hw_duty
    }
}
