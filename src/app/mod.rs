//! Application core — pure domain logic, zero I/O.
//!
//! This module contains the business rules for the ChargePilot system:
//! safety evaluation, mode transitions, fan control, and telemetry
//! assembly.  All interaction with hardware, persistence, and the sync
//! channel happens through **port traits** defined in [`ports`], keeping
//! this layer fully testable without real peripherals or a live broker.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
