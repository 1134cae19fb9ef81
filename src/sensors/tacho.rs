//! Fan tachometer driver (4-wire fan, open-collector tach output).
//!
//! The fan emits two pulses per revolution.  An ISR increments an atomic
//! counter on each falling edge; once per sampling window the `read`
//! method atomically swaps the counter to zero and converts the pulse
//! count to RPM.
//!
//! Because the ISR and the main loop run in different contexts, the
//! counter is an `AtomicU32` and the read-and-reset is a single `swap` —
//! no pulse can be lost or double-counted across the window boundary,
//! and neither side ever blocks.

use core::sync::atomic::{AtomicU32, Ordering};

/// Tach pulses per fan revolution (standard for 4-wire PC fans).
const PULSES_PER_REV: f32 = 2.0;

/// Global atomic counter incremented by the GPIO ISR.
/// `static` because ISR callbacks in ESP-IDF cannot capture closures.
static TACH_PULSE_COUNT: AtomicU32 = AtomicU32::new(0);

/// Called from the GPIO ISR on each falling edge.
/// Must be `extern "C"` and `#[no_mangle]` compatible when registered
/// via `esp_idf_hal::gpio::PinDriver::set_interrupt`.
pub fn tach_isr_handler() {
    TACH_PULSE_COUNT.fetch_add(1, Ordering::Relaxed);
}

/// Result of a tach window measurement.
#[derive(Debug, Clone, Copy)]
pub struct TachReading {
    /// Pulses counted in the measurement window.
    pub pulse_count: u32,
    /// Calculated fan speed (RPM).
    pub rpm: f32,
}

/// Tachometer driver.
pub struct TachoSensor {
    /// GPIO pin number (stored for diagnostics / re-init).
    _gpio: i32,
}

impl TachoSensor {
    pub fn new(gpio: i32) -> Self {
        Self { _gpio: gpio }
    }

    /// Sample the atomic pulse counter, reset it, and compute RPM.
    ///
    /// `elapsed_secs` is the window length (1.0 s at the 1 Hz control
    /// loop, making RPM = pulses × 30 at 2 pulses/rev).
    pub fn read(&mut self, elapsed_secs: f32) -> TachReading {
        // Atomically swap the counter to zero and read the old value.
        let count = TACH_PULSE_COUNT.swap(0, Ordering::Relaxed);

        let rpm = if elapsed_secs > 0.0 {
            count as f32 / elapsed_secs * 60.0 / PULSES_PER_REV
        } else {
            0.0
        };

        TachReading {
            pulse_count: count,
            rpm,
        }
    }
}
