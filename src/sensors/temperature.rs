//! NTC thermistor temperature sensor (10 kOhm @ 25 C, B = 3950).
//!
//! Wired in a voltage-divider with a fixed 10 kOhm resistor, read via
//! the ESP32 ADC. The simplified Beta (Steinhart-Hart) equation converts
//! resistance to temperature.
//!
//! A raw code pinned at either rail means the thermistor is open or
//! shorted; the driver reports a fixed 25 C fallback instead of
//! propagating a physically absurd extreme into the safety supervisor.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: reads the thermistor ADC channel via the oneshot API.
//! On host/test: reads from a static AtomicU16 for injection.

use core::sync::atomic::AtomicU16;
#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::Ordering;

#[cfg(target_os = "espidf")]
use crate::drivers::hw_init;
use crate::error::SensorError;
use log::warn;

static SIM_TEMP_ADC: AtomicU16 = AtomicU16::new(2048); // ~25 C at balanced divider

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_temp_adc(raw: u16) {
    SIM_TEMP_ADC.store(raw, Ordering::Relaxed);
}

const R25: f32 = 10_000.0;
const BETA: f32 = 3950.0;
const T25_K: f32 = 298.15;
const R_DIVIDER: f32 = 10_000.0;
const ADC_MAX: u16 = 4095;
const V_REF: f32 = 3.3;

/// Substituted when the raw code is rail-clamped (sensor fault).
const FALLBACK_TEMP_C: f32 = 25.0;

#[derive(Debug, Clone, Copy)]
pub struct TemperatureReading {
    pub raw: u16,
    pub celsius: f32,
    /// Set when the fallback was substituted for a rail-clamped code.
    pub fault: Option<SensorError>,
}

pub struct TemperatureSensor {
    _adc_gpio: i32,
}

impl TemperatureSensor {
    pub fn new(adc_gpio: i32) -> Self {
        Self {
            _adc_gpio: adc_gpio,
        }
    }

    pub fn read(&self) -> TemperatureReading {
        let raw = self.read_adc();
        match self.adc_to_celsius(raw) {
            Ok(celsius) => TemperatureReading {
                raw,
                celsius,
                fault: None,
            },
            Err(e) => {
                warn!("TEMP: {e} (raw={raw}) — substituting {FALLBACK_TEMP_C}C");
                TemperatureReading {
                    raw,
                    celsius: FALLBACK_TEMP_C,
                    fault: Some(e),
                }
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn read_adc(&self) -> u16 {
        hw_init::adc1_read(hw_init::ADC1_CH_TEMP)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_adc(&self) -> u16 {
        SIM_TEMP_ADC.load(Ordering::Relaxed)
    }

    fn adc_to_celsius(&self, raw: u16) -> Result<f32, SensorError> {
        if raw == 0 || raw >= ADC_MAX {
            return Err(SensorError::RailClamped);
        }
        let voltage = (raw as f32 / ADC_MAX as f32) * V_REF;
        let r_ntc = R_DIVIDER * voltage / (V_REF - voltage);
        let inv_t = (1.0 / T25_K) + (1.0 / BETA) * (r_ntc / R25).ln();
        if inv_t <= 0.0 {
            return Err(SensorError::OutOfRange);
        }
        Ok((1.0 / inv_t) - 273.15)
    }
}
