//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StatePort`], [`ConfigPort`], and [`StoragePort`] for the
//! ChargePilot system.
//!
//! Layout:
//! - namespace `charger`: runtime state — key `mode` (UTF-8 wire string)
//!   and key `cutoff` (postcard f32), written on every change, read once
//!   at boot with documented defaults.
//! - namespace `chargepilot`: the [`SystemConfig`] blob (postcard),
//!   range-validated before every write.
//!
//! Atomicity: ESP-IDF NVS commits are atomic per nvs_commit(); the
//! in-memory simulation backend used for host tests is trivially atomic.

use crate::app::ports::{
    ConfigError, ConfigPort, PersistedState, StatePort, StorageError, StoragePort,
};
use crate::charge::ChargeMode;
use crate::config::SystemConfig;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "chargepilot";
const CONFIG_KEY: &str = "syscfg";

const STATE_NAMESPACE: &str = "charger";
const STATE_KEY_MODE: &str = "mode";
const STATE_KEY_CUTOFF: &str = "cutoff";

#[allow(dead_code)]
const MAX_BLOB_SIZE: usize = 4000;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// Returns `Err(ConfigError::IoError)` if flash initialisation fails
    /// unrecoverably. On first boot or after a version mismatch the NVS
    /// partition is erased and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                let ret2 = unsafe { nvs_flash_erase() };
                if ret2 != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                let ret3 = unsafe { nvs_flash_init() };
                if ret3 != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    /// Read a whole blob out of a namespace (espidf path helper).
    #[cfg(target_os = "espidf")]
    fn read_blob(namespace: &str, key: &str) -> Result<Vec<u8>, i32> {
        Self::with_nvs_handle(namespace, false, |handle| {
            let mut key_buf = [0u8; 16];
            let kb = key.as_bytes();
            let kl = kb.len().min(15);
            key_buf[..kl].copy_from_slice(&kb[..kl]);

            let mut size: usize = 0;
            // First call: get size
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    core::ptr::null_mut(),
                    &mut size,
                )
            };
            if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                return Err(ret);
            }

            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    buf.as_mut_ptr() as *mut _,
                    &mut size,
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(buf)
        })
    }

    /// Write a blob into a namespace and commit (espidf path helper).
    #[cfg(target_os = "espidf")]
    fn write_blob(namespace: &str, key: &str, data: &[u8]) -> Result<(), i32> {
        Self::with_nvs_handle(namespace, true, |handle| {
            let mut key_buf = [0u8; 16];
            let kb = key.as_bytes();
            let kl = kb.len().min(15);
            key_buf[..kl].copy_from_slice(&kb[..kl]);

            let ret = unsafe {
                nvs_set_blob(
                    handle,
                    key_buf.as_ptr() as *const _,
                    data.as_ptr() as *const _,
                    data.len(),
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        })
    }

    /// Raw state-key read used by `StatePort::load` on both backends.
    fn state_read(&self, key: &str) -> Option<Vec<u8>> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow()
                .get(&Self::composite_key(STATE_NAMESPACE, key))
                .cloned()
        }

        #[cfg(target_os = "espidf")]
        {
            Self::read_blob(STATE_NAMESPACE, key).ok()
        }
    }

    fn state_write(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .insert(Self::composite_key(STATE_NAMESPACE, key), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            Self::write_blob(STATE_NAMESPACE, key, data).map_err(|rc| {
                warn!("NvsAdapter: state write {key} failed (rc={rc})");
                StorageError::IoError
            })
        }
    }
}

// ── Config validation ──────────────────────────────────────────────

fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    if !(40.0..=120.0).contains(&cfg.temp_critical_c) {
        return Err(ConfigError::ValidationFailed(
            "temp_critical_c must be 40.0–120.0",
        ));
    }
    if cfg.temp_recovery_c >= cfg.temp_critical_c {
        return Err(ConfigError::ValidationFailed(
            "temp_recovery_c must be < temp_critical_c",
        ));
    }
    if cfg.fan_temp_start_c >= cfg.fan_temp_full_c {
        return Err(ConfigError::ValidationFailed(
            "fan_temp_start_c must be < fan_temp_full_c",
        ));
    }
    if cfg.fan_min_duty == 0 {
        return Err(ConfigError::ValidationFailed(
            "fan_min_duty must be nonzero (idle floor keeps the tach alive)",
        ));
    }
    if !(1.0..=5000.0).contains(&cfg.fan_stall_rpm) {
        return Err(ConfigError::ValidationFailed(
            "fan_stall_rpm must be 1.0–5000.0",
        ));
    }
    if !(1..=60).contains(&cfg.fan_kick_secs) {
        return Err(ConfigError::ValidationFailed(
            "fan_kick_secs must be 1–60",
        ));
    }
    if !(1.0..=60.0).contains(&cfg.default_cutoff_v) {
        return Err(ConfigError::ValidationFailed(
            "default_cutoff_v must be 1.0–60.0",
        ));
    }
    if !(100..=5000).contains(&cfg.control_loop_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "control_loop_interval_ms must be 100–5000",
        ));
    }
    if cfg.telemetry_interval_ms < cfg.control_loop_interval_ms {
        return Err(ConfigError::ValidationFailed(
            "telemetry_interval_ms must be >= control_loop_interval_ms",
        ));
    }
    if !(1..=300).contains(&cfg.mqtt_reconnect_secs) {
        return Err(ConfigError::ValidationFailed(
            "mqtt_reconnect_secs must be 1–300",
        ));
    }
    if cfg.wifi_max_attempts == 0 {
        return Err(ConfigError::ValidationFailed(
            "wifi_max_attempts must be nonzero",
        ));
    }
    Ok(())
}

// ── ConfigPort ─────────────────────────────────────────────────────

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            if let Some(bytes) = self.store.borrow().get(&key) {
                let cfg: SystemConfig =
                    postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config from store");
                Ok(cfg)
            } else {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
        }

        #[cfg(target_os = "espidf")]
        {
            match Self::read_blob(CONFIG_NAMESPACE, CONFIG_KEY) {
                Ok(bytes) => {
                    let cfg: SystemConfig =
                        postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                    info!("NvsAdapter: loaded config from NVS ({} bytes)", bytes.len());
                    Ok(cfg)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => {
                    info!("NvsAdapter: no stored config, using defaults");
                    Ok(SystemConfig::default())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS read error {}, using defaults", e);
                    Ok(SystemConfig::default())
                }
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;

        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            self.store.borrow_mut().insert(key, bytes);
            info!("NvsAdapter: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            match Self::write_blob(CONFIG_NAMESPACE, CONFIG_KEY, &bytes) {
                Ok(()) => {
                    info!("NvsAdapter: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}

// ── StatePort ──────────────────────────────────────────────────────

impl StatePort for NvsAdapter {
    fn load(&self, config: &SystemConfig) -> PersistedState {
        let mode = match self.state_read(STATE_KEY_MODE) {
            Some(bytes) => match core::str::from_utf8(&bytes)
                .map_err(|_| ())
                .and_then(|s| s.parse::<ChargeMode>().map_err(|_| ()))
            {
                Ok(mode) => mode,
                Err(()) => {
                    warn!("NvsAdapter: stored mode unreadable, defaulting to OFF");
                    ChargeMode::Off
                }
            },
            None => ChargeMode::Off,
        };

        let cutoff_v = match self.state_read(STATE_KEY_CUTOFF) {
            Some(bytes) => match postcard::from_bytes::<f32>(&bytes) {
                Ok(v) => v,
                Err(_) => {
                    warn!(
                        "NvsAdapter: stored cutoff unreadable, defaulting to {:.1}V",
                        config.default_cutoff_v
                    );
                    config.default_cutoff_v
                }
            },
            None => config.default_cutoff_v,
        };

        info!("NvsAdapter: restored mode={mode} cutoff={cutoff_v:.2}V");
        PersistedState { mode, cutoff_v }
    }

    fn save_mode(&self, mode: ChargeMode) -> Result<(), StorageError> {
        self.state_write(STATE_KEY_MODE, mode.as_str().as_bytes())
    }

    fn save_cutoff(&self, volts: f32) -> Result<(), StorageError> {
        let bytes = postcard::to_allocvec(&volts).map_err(|_| StorageError::IoError)?;
        self.state_write(STATE_KEY_CUTOFF, &bytes)
    }
}

// ── StoragePort ────────────────────────────────────────────────────

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            match self.store.borrow().get(&composite) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            Self::write_blob(namespace, key, data).map_err(|_| StorageError::IoError)
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let ret = unsafe { nvs_erase_key(handle, key_buf.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow().contains_key(&composite)
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let ret = unsafe {
                    nvs_find_key(handle, key_buf.as_ptr() as *const _, core::ptr::null_mut())
                };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}

impl Default for NvsAdapter {
    fn default() -> Self {
        // Only used as a last-resort fallback when flash init failed.
        Self::new().unwrap_or_else(|_| Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation() {
        let cfg = SystemConfig::default();
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn rejects_recovery_above_critical() {
        let cfg = SystemConfig {
            temp_critical_c: 75.0,
            temp_recovery_c: 80.0,
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&cfg),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn rejects_inverted_fan_curve() {
        let cfg = SystemConfig {
            fan_temp_start_c: 70.0,
            fan_temp_full_c: 40.0,
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&cfg),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn rejects_zero_fan_floor() {
        let cfg = SystemConfig {
            fan_min_duty: 0,
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&cfg),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn rejects_absurd_cutoff_default() {
        let cfg = SystemConfig {
            default_cutoff_v: 400.0,
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&cfg),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn config_round_trip() {
        let nvs = NvsAdapter::new().unwrap();
        let mut cfg = SystemConfig::default();
        cfg.fan_min_duty = 96;
        cfg.default_cutoff_v = 13.8;
        nvs.save(&cfg).unwrap();
        let loaded = ConfigPort::load(&nvs).unwrap();
        assert_eq!(loaded.fan_min_duty, 96);
        assert!((loaded.default_cutoff_v - 13.8).abs() < 0.001);
    }

    #[test]
    fn state_defaults_when_empty() {
        let nvs = NvsAdapter::new().unwrap();
        let cfg = SystemConfig::default();
        let state = StatePort::load(&nvs, &cfg);
        assert_eq!(state.mode, ChargeMode::Off);
        assert!((state.cutoff_v - cfg.default_cutoff_v).abs() < 0.001);
    }

    #[test]
    fn state_round_trip() {
        let nvs = NvsAdapter::new().unwrap();
        let cfg = SystemConfig::default();
        nvs.save_mode(ChargeMode::Auto).unwrap();
        nvs.save_cutoff(14.4).unwrap();
        let state = StatePort::load(&nvs, &cfg);
        assert_eq!(state.mode, ChargeMode::Auto);
        assert!((state.cutoff_v - 14.4).abs() < 0.001);
    }

    #[test]
    fn corrupt_mode_falls_back_to_off() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write(STATE_NAMESPACE, STATE_KEY_MODE, b"TURBO").unwrap();
        let state = StatePort::load(&nvs, &SystemConfig::default());
        assert_eq!(state.mode, ChargeMode::Off);
    }

    #[test]
    fn storage_round_trip() {
        let mut nvs = NvsAdapter::new().unwrap();
        let data = b"hello NVS";
        nvs.write("test_ns", "greeting", data).unwrap();
        assert!(nvs.exists("test_ns", "greeting"));

        let mut buf = [0u8; 64];
        let len = nvs.read("test_ns", "greeting", &mut buf).unwrap();
        assert_eq!(&buf[..len], data);

        nvs.delete("test_ns", "greeting").unwrap();
        assert!(!nvs.exists("test_ns", "greeting"));
    }

    #[test]
    fn storage_read_missing_key() {
        let nvs = NvsAdapter::new().unwrap();
        let mut buf = [0u8; 64];
        assert!(matches!(
            nvs.read("ns", "nope", &mut buf),
            Err(StorageError::NotFound)
        ));
    }

    #[test]
    fn namespace_isolation() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write("ns_a", "key", b"alpha").unwrap();
        nvs.write("ns_b", "key", b"bravo").unwrap();

        let mut buf = [0u8; 64];
        let len = nvs.read("ns_a", "key", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"alpha");

        let len = nvs.read("ns_b", "key", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"bravo");
    }
}
