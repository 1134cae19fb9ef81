//! GPIO / peripheral pin assignments for the ChargePilot main board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

// ---------------------------------------------------------------------------
// Charge-enable output (IRLZ44N low-side MOSFET into the charge relay)
// ---------------------------------------------------------------------------

/// Digital output: HIGH = charge current path enabled.
pub const CHARGE_EN_GPIO: i32 = 25;

// ---------------------------------------------------------------------------
// Cooling fan (4-wire 12 V PWM fan)
// ---------------------------------------------------------------------------

/// LEDC PWM channel for fan speed control.
pub const FAN_PWM_GPIO: i32 = 26;
/// Open-collector tachometer output, pulse input with interrupt.
pub const FAN_TACH_GPIO: i32 = 27;

// ---------------------------------------------------------------------------
// Sensors — Analog (ADC1)
// ---------------------------------------------------------------------------

/// Power-supply rail voltage via 47k/10k resistive divider.
/// ADC1 channel 4 (GPIO 32 on ESP32).
pub const PSU_VOLT_ADC_GPIO: i32 = 32;
/// Battery terminal voltage via identical 47k/10k divider.
/// ADC1 channel 5 (GPIO 33 on ESP32).
pub const BAT_VOLT_ADC_GPIO: i32 = 33;
/// ACS712-20A hall current sensor output (mid-rail at zero current).
/// ADC1 channel 6 (GPIO 34 on ESP32).
pub const CURRENT_ADC_GPIO: i32 = 34;
/// NTC thermistor — 10 kΩ @ 25 °C, voltage-divider to ADC.
/// ADC1 channel 7 (GPIO 35 on ESP32).
pub const TEMP_ADC_GPIO: i32 = 35;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// LEDC timer resolution (bits).  8-bit gives 0 – 255 duty levels.
pub const PWM_RESOLUTION_BITS: u32 = 8;
/// LEDC base frequency for the fan (25 kHz — inaudible, Intel 4-wire spec).
pub const FAN_PWM_FREQ_HZ: u32 = 25_000;

// ---------------------------------------------------------------------------
// UART debug
// ---------------------------------------------------------------------------

pub const UART_TX_GPIO: i32 = 1;
pub const UART_RX_GPIO: i32 = 3;
