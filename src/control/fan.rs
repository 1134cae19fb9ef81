//! Temperature-to-duty fan controller with stall kick-start.
//!
//! Pure function of {temperature, overheat latch, RPM} → duty, computed
//! once per control tick:
//!
//! ```text
//!  duty
//!  255 ┤                    ┌──────────
//!      │                   /
//!      │                  /   linear
//!      │                 /
//!  min ┼────────────────┘
//!      └────────────────┬───┬─────────▶ temp
//!                    start  full
//! ```
//!
//! The fan never drops below the idle floor while the controller is
//! active: a fan that is allowed to fully stop would read 0 RPM and
//! trip stall detection on every window.
//!
//! ## Stall kick-start
//!
//! A powered fan reading below the stall threshold gets a full-power
//! pulse for the recovery window (static friction needs far more torque
//! than steady rotation).  While the pulse runs, normal duty computation
//! is suspended but nothing blocks — sampling and command processing
//! continue.  After the pulse, one full tach window must be observed
//! before the kick can re-trigger.

use crate::config::SystemConfig;
use crate::sensors::SensorFrame;
use log::warn;

/// Maximum PWM duty (8-bit LEDC resolution).
pub const DUTY_MAX: u8 = 255;

/// Fan controller state.
pub struct FanController {
    temp_start_c: f32,
    temp_full_c: f32,
    min_duty: u8,
    stall_rpm: f32,
    /// Kick pulse length in control ticks.
    kick_ticks: u32,
    /// Remaining ticks of an active kick pulse (0 = not kicking).
    kick_ticks_left: u32,
    /// One post-kick tick during which re-triggering is suppressed, so a
    /// fresh tach window is observed between consecutive pulses.
    post_kick_hold: bool,
    /// False until the first tach window has been consumed — the boot
    /// frame carries no real RPM measurement yet.
    primed: bool,
    /// True only on the tick a kick pulse started (for event emission).
    kick_started: bool,
}

impl FanController {
    pub fn new(config: &SystemConfig) -> Self {
        let tick_ms = config.control_loop_interval_ms.max(1);
        Self {
            temp_start_c: config.fan_temp_start_c,
            temp_full_c: config.fan_temp_full_c,
            min_duty: config.fan_min_duty,
            stall_rpm: config.fan_stall_rpm,
            kick_ticks: (u32::from(config.fan_kick_secs) * 1000).div_ceil(tick_ms),
            kick_ticks_left: 0,
            post_kick_hold: false,
            primed: false,
            kick_started: false,
        }
    }

    /// Compute this tick's duty command.
    pub fn update(&mut self, frame: &SensorFrame, overheated: bool) -> u8 {
        self.kick_started = false;

        // Active kick pulse: hold full power for the whole window.
        if self.kick_ticks_left > 0 {
            self.kick_ticks_left -= 1;
            if self.kick_ticks_left == 0 {
                self.post_kick_hold = true;
            }
            return DUTY_MAX;
        }

        let duty = self.curve_duty(frame.temp_c, overheated);

        if self.post_kick_hold {
            // The RPM in this frame was measured during the pulse; require
            // one further window at normal duty before judging a re-stall.
            self.post_kick_hold = false;
            return duty;
        }

        if !self.primed {
            // First tick after boot: no tach window has completed yet.
            self.primed = true;
            return duty;
        }

        if duty > 0 && frame.fan_rpm < self.stall_rpm {
            warn!(
                "FAN: stall detected ({:.0} RPM at duty {}) — kick-start for {} ticks",
                frame.fan_rpm, duty, self.kick_ticks
            );
            self.kick_ticks_left = self.kick_ticks;
            self.kick_ticks_left -= 1; // this tick is the first of the pulse
            if self.kick_ticks_left == 0 {
                self.post_kick_hold = true;
            }
            self.kick_started = true;
            return DUTY_MAX;
        }

        duty
    }

    /// True only on the tick [`update`] started a kick pulse.
    pub fn kick_started(&self) -> bool {
        self.kick_started
    }

    /// True while a kick pulse is running (including its first tick).
    pub fn kicking(&self) -> bool {
        self.kick_started || self.kick_ticks_left > 0
    }

    // ── Internal ──────────────────────────────────────────────────

    /// The temperature curve alone, ignoring stall state.
    fn curve_duty(&self, temp_c: f32, overheated: bool) -> u8 {
        if overheated || temp_c >= self.temp_full_c {
            return DUTY_MAX;
        }
        if temp_c >= self.temp_start_c {
            let span = self.temp_full_c - self.temp_start_c;
            let frac = (temp_c - self.temp_start_c) / span;
            let range = f32::from(DUTY_MAX - self.min_duty);
            return self.min_duty + (frac * range) as u8;
        }
        self.min_duty
    }
}
