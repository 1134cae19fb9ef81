//! Sensor subsystem — individual drivers and the aggregating [`SensorHub`].
//!
//! The hub owns every sensor driver and produces one immutable
//! [`SensorFrame`] per control cycle.  The frame is the only sensor data
//! the rest of the system ever sees; the supervisor, fan controller, and
//! telemetry all consume the same snapshot.

pub mod current;
pub mod tacho;
pub mod temperature;
pub mod voltage;

use current::CurrentSensor;
use tacho::TachoSensor;
use temperature::TemperatureSensor;
use voltage::VoltageSensor;

/// Serialises tests that touch the process-global simulation statics
/// (ADC injection points and the tach pulse counter).
#[cfg(test)]
pub(crate) fn sim_test_guard() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A point-in-time snapshot of every sensor in the system.
///
/// Immutable after creation.  `fan_rpm` carries the count of the tach
/// window that just closed, so stall detection inherently sees it one
/// cycle after the pulses happened — acceptable and expected.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorFrame {
    /// Power-supply rail voltage (V).
    pub v_psu: f32,
    /// Battery terminal voltage (V).
    pub v_bat: f32,
    /// Charge current (A), dead-zone denoised.
    pub current_a: f32,
    /// Heatsink temperature (°C); 25.0 fallback on a rail-clamped code.
    pub temp_c: f32,
    /// Charge power (W) = v_psu × current.
    pub power_w: f32,
    /// Fan speed over the last tach window (RPM).
    pub fan_rpm: f32,
}

/// Aggregates all sensor drivers and produces a unified frame.
pub struct SensorHub {
    pub psu: VoltageSensor,
    pub battery: VoltageSensor,
    pub current: CurrentSensor,
    pub temperature: TemperatureSensor,
    pub tacho: TachoSensor,
}

impl SensorHub {
    /// Construct a new hub.  Pass in pre-built drivers (built in main
    /// where peripheral ownership is established).
    pub fn new(
        psu: VoltageSensor,
        battery: VoltageSensor,
        current: CurrentSensor,
        temperature: TemperatureSensor,
        tacho: TachoSensor,
    ) -> Self {
        Self {
            psu,
            battery,
            current,
            temperature,
            tacho,
        }
    }

    /// Read every sensor and return a unified frame.
    ///
    /// Acquisition never fails: the temperature driver substitutes its
    /// fallback on a rail-clamped code and everything else reports
    /// whatever the hardware gave it; downstream consumers apply range
    /// sanity through thresholds rather than rejecting samples.
    ///
    /// `elapsed_secs` is the time since the last call — it is the tach
    /// window length (1.0 s at the 1 Hz control loop).
    pub fn sample(&mut self, elapsed_secs: f32) -> SensorFrame {
        let psu = self.psu.read();
        let bat = self.battery.read();
        let current = self.current.read();
        let temp = self.temperature.read();
        let tach = self.tacho.read(elapsed_secs);

        SensorFrame {
            v_psu: psu.volts,
            v_bat: bat.volts,
            current_a: current.amps,
            temp_c: temp.celsius,
            power_w: psu.volts * current.amps,
            fan_rpm: tach.rpm,
        }
    }
}
