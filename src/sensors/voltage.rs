//! Divided-down voltage sensing for the PSU rail and the battery terminal.
//!
//! Both channels use the same 47k/10k resistive divider, so one driver
//! serves both — constructed once per channel.  Each reading is the
//! arithmetic mean of [`SAMPLE_COUNT`] raw ADC codes through a linear
//! calibration; averaging knocks the switching-supply ripple out of the
//! telemetry without a filter capacitor on the board.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: reads the channel's ADC via the oneshot API.
//! On host/test: reads from a per-channel static AtomicU16 for injection.

use core::sync::atomic::AtomicU16;
#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::Ordering;

#[cfg(target_os = "espidf")]
use crate::drivers::hw_init;

/// Raw reads averaged per voltage measurement.
const SAMPLE_COUNT: usize = 15;

const ADC_MAX: f32 = 4095.0;
const V_REF: f32 = 3.3;
/// 47k over 10k divider: V_in = V_adc × (47 + 10) / 10.
const DIVIDER_RATIO: f32 = 5.7;

/// Which divider channel this instance samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltChannel {
    Psu,
    Battery,
}

static SIM_PSU_ADC: AtomicU16 = AtomicU16::new(0);
static SIM_BAT_ADC: AtomicU16 = AtomicU16::new(0);

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_volt_adc(channel: VoltChannel, raw: u16) {
    match channel {
        VoltChannel::Psu => SIM_PSU_ADC.store(raw, Ordering::Relaxed),
        VoltChannel::Battery => SIM_BAT_ADC.store(raw, Ordering::Relaxed),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VoltageReading {
    /// Mean of the raw sample burst.
    pub raw_mean: f32,
    pub volts: f32,
}

pub struct VoltageSensor {
    channel: VoltChannel,
    _adc_gpio: i32,
}

impl VoltageSensor {
    pub fn new(channel: VoltChannel, adc_gpio: i32) -> Self {
        Self {
            channel,
            _adc_gpio: adc_gpio,
        }
    }

    /// Burst-sample the channel and convert the mean through the divider.
    pub fn read(&self) -> VoltageReading {
        let mut sum: u32 = 0;
        for _ in 0..SAMPLE_COUNT {
            sum += u32::from(self.read_adc());
        }
        let raw_mean = sum as f32 / SAMPLE_COUNT as f32;
        let volts = raw_mean / ADC_MAX * V_REF * DIVIDER_RATIO;
        VoltageReading { raw_mean, volts }
    }

    #[cfg(target_os = "espidf")]
    fn read_adc(&self) -> u16 {
        match self.channel {
            VoltChannel::Psu => hw_init::adc1_read(hw_init::ADC1_CH_PSU_VOLT),
            VoltChannel::Battery => hw_init::adc1_read(hw_init::ADC1_CH_BAT_VOLT),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_adc(&self) -> u16 {
        match self.channel {
            VoltChannel::Psu => SIM_PSU_ADC.load(Ordering::Relaxed),
            VoltChannel::Battery => SIM_BAT_ADC.load(Ordering::Relaxed),
        }
    }
}

/// Raw code that produces `volts` on a divider channel — test helper used
/// by the integration suite to drive realistic electrical scenarios.
#[cfg(not(target_os = "espidf"))]
pub fn volts_to_raw(volts: f32) -> u16 {
    (volts / DIVIDER_RATIO / V_REF * ADC_MAX).round() as u16
}
