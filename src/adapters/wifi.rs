//! WiFi station-mode adapter.
//!
//! Implements [`ConnectivityPort`] — the hexagonal boundary for network
//! connectivity.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver calls via `esp_idf_svc::wifi`.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## Retry policy
//!
//! Connection attempts are **bounded**: after `max_attempts` failures the
//! adapter enters `LocalOnly` and stays there.  The charger keeps
//! sampling, latching, and driving its outputs with no network at all —
//! loss of connectivity must never disable the safety interlocks or the
//! fan/actuator path.

use core::fmt;
use log::{error, info, warn};

// ───────────────────────────────────────────────────────────────
// Port trait
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
    AlreadyConnected,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(
                f,
                "password invalid (must be 8-64 bytes for WPA2, or empty for open)"
            ),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::AlreadyConnected => write!(f, "already connected to AP"),
        }
    }
}

pub trait ConnectivityPort {
    fn connect(&mut self) -> Result<(), ConnectivityError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    fn poll(&mut self);
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError>;
}

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Retry budget exhausted: network given up for this boot, control
    /// loop continues standalone.
    LocalOnly,
}

/// Polls between consecutive reconnect attempts (~seconds at 1 Hz).
const RETRY_SPACING_TICKS: u32 = 5;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 {
        return Err(ConnectivityError::InvalidSsid);
    }
    if !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    /// Attempts consumed so far; compared against `max_attempts`.
    attempts: u32,
    max_attempts: u32,
    ticks_until_retry: u32,
    /// Simulation: forces platform_connect() failures for tests.
    #[cfg(not(target_os = "espidf"))]
    sim_fail: bool,
}

impl WifiAdapter {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            attempts: 0,
            max_attempts: max_attempts.max(1),
            ticks_until_retry: 0,
            #[cfg(not(target_os = "espidf"))]
            sim_fail: false,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    /// True once the retry budget is gone and the device runs standalone.
    pub fn is_local_only(&self) -> bool {
        self.state == WifiState::LocalOnly
    }

    /// Simulation: make every subsequent connect attempt fail (or not).
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_fail(&mut self, fail: bool) {
        self.sim_fail = fail;
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        // ESP-IDF WiFi STA connection:
        // 1. EspWifi::new(peripherals.modem, sysloop, nvs)
        // 2. wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        //        ssid: self.ssid.as_str().try_into().unwrap(),
        //        password: self.password.as_str().try_into().unwrap(),
        //        auth_method: AuthMethod::WPA2Personal,
        //        ..Default::default()
        //    }))
        // 3. wifi.start()
        // 4. wifi.connect()
        //
        // The EspWifi handle (and the sysloop it needs) will be threaded
        // in from main.rs together with the MQTT client bring-up.
        info!("WiFi(espidf): STA connect deferred until peripheral wiring");
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        if self.sim_fail {
            warn!("WiFi(sim): simulated connect failure (attempt {})", self.attempts);
            return Err(ConnectivityError::ConnectionFailed);
        }
        info!("WiFi(sim): connected to '{}' (attempt {})", self.ssid, self.attempts);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        // wifi.disconnect().ok();
        // wifi.stop().ok();
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        info!("WiFi(sim): disconnected");
    }

    fn platform_is_connected(&self) -> bool {
        self.state == WifiState::Connected
    }
}

// ───────────────────────────────────────────────────────────────
// ConnectivityPort
// ───────────────────────────────────────────────────────────────

impl ConnectivityPort for WifiAdapter {
    fn connect(&mut self) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        if self.state == WifiState::Connected {
            return Err(ConnectivityError::AlreadyConnected);
        }

        info!("WiFi: connecting to '{}'", self.ssid);
        self.state = WifiState::Connecting;
        self.attempts += 1;

        match self.platform_connect() {
            Ok(()) => {
                self.state = WifiState::Connected;
                self.attempts = 0;
                Ok(())
            }
            Err(e) => {
                error!("WiFi: connection failed — {}", e);
                if self.attempts >= self.max_attempts {
                    warn!(
                        "WiFi: {} attempts exhausted — degrading to local-only operation",
                        self.attempts
                    );
                    self.state = WifiState::LocalOnly;
                } else {
                    self.state = WifiState::Reconnecting {
                        attempt: self.attempts,
                    };
                    self.ticks_until_retry = RETRY_SPACING_TICKS;
                }
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        self.platform_disconnect();
        self.state = WifiState::Disconnected;
        self.attempts = 0;
        info!("WiFi: disconnected");
    }

    fn is_connected(&self) -> bool {
        self.platform_is_connected()
    }

    fn poll(&mut self) {
        match self.state {
            WifiState::Reconnecting { attempt } => {
                if self.ticks_until_retry > 1 {
                    self.ticks_until_retry -= 1;
                    return;
                }
                info!("WiFi: reconnect attempt {}/{}", attempt + 1, self.max_attempts);
                self.attempts += 1;
                match self.platform_connect() {
                    Ok(()) => {
                        self.state = WifiState::Connected;
                        self.attempts = 0;
                        info!("WiFi: reconnected");
                    }
                    Err(_) if self.attempts >= self.max_attempts => {
                        warn!(
                            "WiFi: {} attempts exhausted — degrading to local-only operation",
                            self.attempts
                        );
                        self.state = WifiState::LocalOnly;
                    }
                    Err(_) => {
                        self.state = WifiState::Reconnecting {
                            attempt: self.attempts,
                        };
                        self.ticks_until_retry = RETRY_SPACING_TICKS;
                    }
                }
            }
            WifiState::Connected => {
                if !self.platform_is_connected() {
                    warn!("WiFi: connection lost, entering reconnect");
                    self.state = WifiState::Reconnecting { attempt: 0 };
                    self.ticks_until_retry = RETRY_SPACING_TICKS;
                }
            }
            _ => {}
        }
    }

    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid
            .push_str(ssid)
            .map_err(|_| ConnectivityError::InvalidSsid)?;
        self.password.clear();
        self.password
            .push_str(password)
            .map_err(|_| ConnectivityError::InvalidPassword)?;
        info!("WiFi: credentials updated (SSID='{}')", self.ssid);
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
