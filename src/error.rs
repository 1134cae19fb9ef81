//! Unified error types for the ChargePilot firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! top-level control loop's error handling uniform.  All variants are `Copy`
//! so they can be cheaply passed around without allocation.
//!
//! Safety overrides (overheat latch, auto-cutoff) are deliberately *not*
//! errors — they are designed control transitions and travel through
//! [`AppEvent`](crate::app::events::AppEvent) instead.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A sensor returned out-of-range or rail-clamped data.
    Sensor(SensorError),
    /// A remote command could not be applied.
    Command(CommandError),
    /// A communication subsystem failed.
    Comms(CommsError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
            Self::Comms(e) => write!(f, "comms: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

/// Sensor faults are recovered locally (fallback substitution) and never
/// halt the control cycle; the type exists so the substitution site can
/// log *why* a fallback was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Raw ADC code pinned at 0 or full-scale — open or shorted sensor.
    RailClamped,
    /// Reading is outside the physically plausible range.
    OutOfRange,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RailClamped => write!(f, "raw code pinned at ADC rail"),
            Self::OutOfRange => write!(f, "reading out of range"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

/// A remote command that must be surfaced and rejected — never silently
/// adopted as state.  The offending payload is logged at the parse site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Topic outside the closed `charger/cmd/*` set.
    UnknownTopic,
    /// Mode payload is not one of OFF / ON / AUTO.
    InvalidMode,
    /// Payload failed numeric parsing or range validation.
    InvalidPayload,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTopic => write!(f, "unknown command topic"),
            Self::InvalidMode => write!(f, "invalid mode string"),
            Self::InvalidPayload => write!(f, "invalid command payload"),
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Communications errors
// ---------------------------------------------------------------------------

/// Transport failures recover by bounded retry with fixed backoff inside
/// the adapters; they never propagate into the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    WifiConnectFailed,
    WifiDisconnected,
    MqttConnectFailed,
    MqttPublishFailed,
    NotConnected,
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WifiConnectFailed => write!(f, "WiFi connect failed"),
            Self::WifiDisconnected => write!(f, "WiFi disconnected"),
            Self::MqttConnectFailed => write!(f, "MQTT connect failed"),
            Self::MqttPublishFailed => write!(f, "MQTT publish failed"),
            Self::NotConnected => write!(f, "not connected"),
        }
    }
}

impl From<CommsError> for Error {
    fn from(e: CommsError) -> Self {
        Self::Comms(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
