//! One-shot hardware peripheral initialization.
//!
//! Configures ADC channels, GPIO directions, and the LEDC fan timer
//! using raw ESP-IDF sys calls. Called once from `main()` before the
//! event loop starts.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    AdcInitFailed(i32),
    GpioConfigFailed(i32),
    LedcInitFailed,
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AdcInitFailed(rc) => write!(f, "ADC1 init failed (rc={})", rc),
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::LedcInitFailed => write!(f, "LEDC timer/channel config failed"),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
        }
    }
}

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::pins;

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before event loop; single-threaded.
    unsafe {
        init_adc()?;
        init_gpio()?;
        init_ledc();
    }
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── ADC (oneshot) ─────────────────────────────────────────────

/// ADC1 channel numbers on the classic ESP32: GPIO32..35 map to CH4..CH7.
pub const ADC1_CH_PSU_VOLT: u32 = 4;
pub const ADC1_CH_BAT_VOLT: u32 = 5;
pub const ADC1_CH_CURRENT: u32 = 6;
pub const ADC1_CH_TEMP: u32 = 7;

#[cfg(target_os = "espidf")]
static mut ADC1_HANDLE: adc_oneshot_unit_handle_t = core::ptr::null_mut();

/// SAFETY: Must be called only from the single-threaded init path or the
/// main-loop ADC read path.  No concurrent access is possible because
/// `init_adc()` completes before the event loop starts.
#[cfg(target_os = "espidf")]
unsafe fn adc1_handle() -> adc_oneshot_unit_handle_t {
    unsafe { ADC1_HANDLE }
}

#[cfg(target_os = "espidf")]
unsafe fn init_adc() -> Result<(), HwInitError> {
    let init_cfg = adc_oneshot_unit_init_cfg_t {
        unit_id: adc_unit_t_ADC_UNIT_1,
        ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
        ..Default::default()
    };
    // SAFETY: ADC1_HANDLE is only written here, once at boot.
    let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &raw mut ADC1_HANDLE) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::AdcInitFailed(ret));
    }

    // 12 dB attenuation: full 0 – 3.1 V span for the divider channels.
    let chan_cfg = adc_oneshot_chan_cfg_t {
        atten: adc_atten_t_ADC_ATTEN_DB_12,
        bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
    };

    for channel in [
        ADC1_CH_PSU_VOLT,
        ADC1_CH_BAT_VOLT,
        ADC1_CH_CURRENT,
        ADC1_CH_TEMP,
    ] {
        let ret = unsafe { adc_oneshot_config_channel(adc1_handle(), channel, &chan_cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::AdcInitFailed(ret));
        }
    }

    info!("hw_init: ADC1 configured (CH4=v_psu, CH5=v_bat, CH6=current, CH7=temp)");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn adc1_read(channel: u32) -> u16 {
    let mut raw: i32 = 0;
    // SAFETY: ADC1_HANDLE is written once during init_adc() before this
    // function is called; single-threaded main-loop access guaranteed.
    let ret = unsafe { adc_oneshot_read(adc1_handle(), channel, &mut raw) };
    if ret != ESP_OK as i32 {
        return 0;
    }
    raw.max(0) as u16
}

#[cfg(not(target_os = "espidf"))]
pub fn adc1_read(_channel: u32) -> u16 {
    0
}

// ── GPIO ──────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio() -> Result<(), HwInitError> {
    // Tach input: open-collector, needs the internal pull-up.
    let tach_cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::FAN_TACH_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    let ret = unsafe { gpio_config(&tach_cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }

    // Charge-enable output: driven LOW (charge off) before anything else
    // runs, so a reboot mid-charge fails safe.
    let charge_cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::CHARGE_EN_GPIO,
        mode: gpio_mode_t_GPIO_MODE_OUTPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    let ret = unsafe { gpio_config(&charge_cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }
    unsafe { gpio_set_level(pins::CHARGE_EN_GPIO, 0) };

    info!("hw_init: GPIO configured (tach in, charge_en out low)");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_write(pin: i32, high: bool) {
    // SAFETY: gpio_set_level writes to an already-configured output pin;
    // pin was validated during init_gpio(). Main-loop only.
    unsafe {
        gpio_set_level(pin, if high { 1 } else { 0 });
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_write(_pin: i32, _high: bool) {}

// ── LEDC PWM ─────────────────────────────────────────────────

pub const LEDC_CH_FAN: u32 = 0;

#[cfg(target_os = "espidf")]
unsafe fn init_ledc() {
    // Timer 0: fan (25 kHz, 8-bit)
    // SAFETY: Called from single main-task context via init_peripherals().
    let timer0 = ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        timer_num: ledc_timer_t_LEDC_TIMER_0,
        duty_resolution: ledc_timer_bit_t_LEDC_TIMER_8_BIT,
        freq_hz: pins::FAN_PWM_FREQ_HZ,
        clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
        ..Default::default()
    };
    unsafe {
        ledc_timer_config(&timer0);
    }

    // Channel 0: fan PWM
    unsafe {
        ledc_channel_config(&ledc_channel_config_t {
            speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
            channel: ledc_channel_t_LEDC_CHANNEL_0,
            timer_sel: ledc_timer_t_LEDC_TIMER_0,
            gpio_num: pins::FAN_PWM_GPIO,
            duty: 0,
            hpoint: 0,
            ..Default::default()
        });
    }

    info!("hw_init: LEDC configured (fan=CH0 @ {} Hz)", pins::FAN_PWM_FREQ_HZ);
}

#[cfg(target_os = "espidf")]
pub fn ledc_set(channel: u32, duty: u8) {
    // SAFETY: LEDC channels were configured in init_ledc(); duty register
    // writes are race-free since only main loop calls this function.
    unsafe {
        esp_idf_svc::sys::ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel, duty as u32);
        esp_idf_svc::sys::ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_set(_channel: u32, _duty: u8) {}

// ── GPIO ISR Service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
use crate::sensors::tacho::tach_isr_handler;

#[cfg(target_os = "espidf")]
unsafe extern "C" fn tach_gpio_isr(_arg: *mut core::ffi::c_void) {
    tach_isr_handler();
}

/// Install the GPIO ISR service and register the tach pulse handler.
/// Call after init_peripherals() and before the event loop.
#[cfg(target_os = "espidf")]
pub fn init_isr_service() -> Result<(), HwInitError> {
    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed (acceptable). The tach handler only
    // does an atomic fetch_add.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        // Tach: falling edge (open-collector pulls the line low twice
        // per revolution).
        gpio_set_intr_type(pins::FAN_TACH_GPIO, gpio_int_type_t_GPIO_INTR_NEGEDGE);
        gpio_isr_handler_add(pins::FAN_TACH_GPIO, Some(tach_gpio_isr), core::ptr::null_mut());
        gpio_intr_enable(pins::FAN_TACH_GPIO);

        info!("hw_init: ISR service installed (fan tach)");
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}
