//! ACS712-20A hall-effect charge-current sensor.
//!
//! The sensor outputs mid-rail at zero current with a fixed sensitivity
//! of 100 mV/A.  Each measurement averages [`SAMPLE_COUNT`] raw reads
//! with a short settle delay between them (the hall output rings after
//! the PWM fan's supply noise), subtracts the calibrated zero-offset
//! error, and dead-zone denoises: anything below the noise floor reports
//! exactly 0.0 A rather than a phantom trickle that would show up as a
//! few hundred milliwatts of imaginary charge power in the app.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: reads the current ADC channel via the oneshot API, with a
//! real inter-sample delay.
//! On host/test: reads from a static AtomicU16 for injection, no delay.

use core::sync::atomic::AtomicU16;
#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::Ordering;

#[cfg(target_os = "espidf")]
use crate::drivers::hw_init;

/// Raw reads averaged per current measurement.
const SAMPLE_COUNT: usize = 20;
/// Settle delay between consecutive raw reads (microseconds).
#[cfg(target_os = "espidf")]
const SETTLE_DELAY_US: u64 = 2_000;

const ADC_MAX: f32 = 4095.0;
const V_REF: f32 = 3.3;
/// ACS712-20A transfer function: 100 mV per ampere.
const SENSITIVITY_V_PER_A: f32 = 0.100;
/// Output at zero current sits at mid-rail.
const ZERO_CURRENT_V: f32 = V_REF / 2.0;
/// Calibrated residual offset of this board's sensor (amperes).
const ZERO_OFFSET_A: f32 = 0.08;
/// Dead-zone threshold: below this the reading is exactly 0.0 A.
const NOISE_FLOOR_A: f32 = 0.15;

static SIM_CURRENT_ADC: AtomicU16 = AtomicU16::new(2048); // mid-rail = 0 A

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_current_adc(raw: u16) {
    SIM_CURRENT_ADC.store(raw, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy)]
pub struct CurrentReading {
    /// Mean of the raw sample burst.
    pub raw_mean: f32,
    /// Denoised charge current (amperes, never negative).
    pub amps: f32,
}

pub struct CurrentSensor {
    _adc_gpio: i32,
}

impl CurrentSensor {
    pub fn new(adc_gpio: i32) -> Self {
        Self {
            _adc_gpio: adc_gpio,
        }
    }

    /// Burst-sample with settle delays, then convert and denoise.
    pub fn read(&self) -> CurrentReading {
        let mut sum: u32 = 0;
        for i in 0..SAMPLE_COUNT {
            if i > 0 {
                self.settle();
            }
            sum += u32::from(self.read_adc());
        }
        let raw_mean = sum as f32 / SAMPLE_COUNT as f32;
        let volts = raw_mean / ADC_MAX * V_REF;
        let amps = (volts - ZERO_CURRENT_V) / SENSITIVITY_V_PER_A - ZERO_OFFSET_A;
        // Dead-zone denoise: small (or negative) residuals are noise, and
        // must read exactly 0.0 — not a small positive remainder.
        let amps = if amps < NOISE_FLOOR_A { 0.0 } else { amps };
        CurrentReading { raw_mean, amps }
    }

    #[cfg(target_os = "espidf")]
    fn settle(&self) {
        std::thread::sleep(std::time::Duration::from_micros(SETTLE_DELAY_US));
    }

    #[cfg(not(target_os = "espidf"))]
    fn settle(&self) {}

    #[cfg(target_os = "espidf")]
    fn read_adc(&self) -> u16 {
        hw_init::adc1_read(hw_init::ADC1_CH_CURRENT)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_adc(&self) -> u16 {
        SIM_CURRENT_ADC.load(Ordering::Relaxed)
    }
}

/// Raw code that produces `amps` through the transfer function (before
/// offset correction) — test helper for electrical scenarios.
#[cfg(not(target_os = "espidf"))]
pub fn amps_to_raw(amps: f32) -> u16 {
    let volts = ZERO_CURRENT_V + (amps + ZERO_OFFSET_A) * SENSITIVITY_V_PER_A;
    (volts / V_REF * ADC_MAX).round() as u16
}
