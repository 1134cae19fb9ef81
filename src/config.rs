//! System configuration parameters
//!
//! All tunable parameters for the ChargePilot controller.
//! Values can be overridden via NVS (non-volatile storage).

use serde::{Deserialize, Serialize};

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Thermal safety ---
    /// Temperature (Celsius) at which the overheat latch sets.
    pub temp_critical_c: f32,
    /// Temperature (Celsius) at which the overheat latch clears.
    /// Must be below `temp_critical_c` — the gap is the hysteresis band.
    pub temp_recovery_c: f32,

    // --- Fan curve ---
    /// Temperature (Celsius) at which the fan leaves its idle floor.
    pub fan_temp_start_c: f32,
    /// Temperature (Celsius) at which the fan reaches full duty.
    pub fan_temp_full_c: f32,
    /// Idle floor duty (0-255). The fan never fully stops so the tach
    /// keeps reporting and stall detection stays meaningful.
    pub fan_min_duty: u8,

    // --- Fan stall recovery ---
    /// RPM below which a powered fan is considered stalled.
    pub fan_stall_rpm: f32,
    /// Duration of the full-power kick-start pulse (seconds).
    pub fan_kick_secs: u16,

    // --- Charge control ---
    /// Default auto-cutoff voltage when nothing is persisted yet.
    pub default_cutoff_v: f32,

    // --- Timing ---
    /// Control loop interval (milliseconds). Also the tach window.
    pub control_loop_interval_ms: u32,
    /// Telemetry publish interval (milliseconds).
    pub telemetry_interval_ms: u32,

    // --- Connectivity ---
    /// Fixed MQTT reconnect backoff (seconds).
    pub mqtt_reconnect_secs: u32,
    /// WiFi connection attempts before degrading to local-only operation.
    pub wifi_max_attempts: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Thermal safety
            temp_critical_c: 75.0,
            temp_recovery_c: 60.0,

            // Fan curve
            fan_temp_start_c: 40.0,
            fan_temp_full_c: 65.0,
            fan_min_duty: 80,

            // Stall recovery
            fan_stall_rpm: 50.0,
            fan_kick_secs: 5,

            // Charge control
            default_cutoff_v: 12.0,

            // Timing
            control_loop_interval_ms: 1000, // 1 Hz, matches tach window
            telemetry_interval_ms: 2000,

            // Connectivity
            mqtt_reconnect_secs: 5,
            wifi_max_attempts: 10,
        }
    }
}
