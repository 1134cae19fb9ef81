//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (sensors, actuators, event sinks, storage) implement these
//! traits.  The [`AppService`](super::service::AppService) consumes them via
//! generics, so the domain core never touches hardware directly.

use crate::charge::ChargeMode;
use crate::config::SystemConfig;
use crate::sensors::SensorFrame;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: the domain calls this once per control cycle.
pub trait SensorPort {
    /// Acquire a full sensor frame.  `elapsed_secs` is the time since the
    /// previous call — it doubles as the tach measurement window.
    fn sample(&mut self, elapsed_secs: f32) -> SensorFrame;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: the domain calls this to command actuators.
pub trait ActuatorPort {
    /// Drive the fan at the given duty (0–255).
    fn set_fan(&mut self, duty: u8);

    /// Close the charge current path.
    fn enable_charge(&mut self);

    /// Open the charge current path (normal, commanded).
    fn disable_charge(&mut self);

    /// Open the charge current path because a safety rule demands it.
    fn safety_shutdown_charge(&mut self, reason: &'static str);

    /// Whether the charge path is currently closed.
    fn is_charging(&self) -> bool;

    /// Kill all outputs — safe shutdown.
    fn all_off(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / sync channel)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log, MQTT
/// retained topics, both).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Runtime-state port (domain ↔ persisted mode/cutoff)
// ───────────────────────────────────────────────────────────────

/// The two persisted runtime values, as loaded at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersistedState {
    pub mode: ChargeMode,
    pub cutoff_v: f32,
}

/// Loads and persists the charge mode and cutoff voltage.
///
/// Writes are synchronous and durable on return.  The service writes
/// through this port *before* emitting the matching republish event, so
/// a later-connecting observer always converges to the stored value.
pub trait StatePort {
    /// Load persisted state, with documented defaults when keys are
    /// absent (mode `Off`, cutoff from [`SystemConfig::default_cutoff_v`]).
    fn load(&self, config: &SystemConfig) -> PersistedState;

    /// Persist the mode. Called on every mode change.
    fn save_mode(&self, mode: ChargeMode) -> Result<(), StorageError>;

    /// Persist the cutoff voltage. Called on every cutoff change.
    fn save_cutoff(&self, volts: f32) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped — a remote channel must not be able to disable
/// the thermal latch by writing `temp_critical_c = f32::MAX`.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic — no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; the in-memory
///   simulation achieves it trivially.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] and [`StatePort`] operations.
#[derive(Debug)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
