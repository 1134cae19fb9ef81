//! Device identity derived from the ESP32 factory MAC address.
//!
//! Produces a stable, human-readable device ID in the form `CP-XXYYZZ`
//! (last 3 bytes of the 6-byte MAC in uppercase hex).  The MQTT client
//! identity additionally carries a fresh hex nonce per connection
//! attempt: the broker only requires uniqueness, and a new identity per
//! attempt sidesteps stale-session takeover after an unclean drop.

/// Fixed-size device ID string: "CP-XXYYZZ".
pub type DeviceIdString = heapless::String<16>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Derive the short device ID from the last 3 MAC bytes.
/// Format: `CP-XXYYZZ` (e.g., `CP-EFCAFE`).
pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    use core::fmt::Write;
    let _ = write!(id, "CP-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}

/// Per-attempt MQTT client identity: `chargepilot-xxyyzz-<nonce>`.
pub fn client_id(mac: &MacAddress, nonce: u16) -> heapless::String<32> {
    let mut name = heapless::String::<32>::new();
    use core::fmt::Write;
    let _ = write!(
        name,
        "chargepilot-{:02x}{:02x}{:02x}-{:04x}",
        mac[3], mac[4], mac[5], nonce
    );
    name
}

/// A fresh nonce for each connection attempt.
#[cfg(target_os = "espidf")]
pub fn connect_nonce() -> u16 {
    (unsafe { esp_idf_svc::sys::esp_random() } & 0xFFFF) as u16
}

/// Simulation: derived from the process clock — unique enough per attempt.
#[cfg(not(target_os = "espidf"))]
pub fn connect_nonce() -> u16 {
    (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0)
        & 0xFFFF) as u16
}
