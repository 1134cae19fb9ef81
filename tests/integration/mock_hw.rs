//! Mock adapters for integration tests.
//!
//! `MockHardware` records every actuator call and serves injectable
//! sensor frames, so tests can drive electrical scenarios and assert on
//! the full command history without touching GPIO/PWM registers.
//! `MockState` and `JournalSink` share an ordered journal, which lets
//! tests assert persist-before-republish ordering.

use std::cell::RefCell;
use std::rc::Rc;

use chargepilot::app::events::AppEvent;
use chargepilot::app::ports::{
    ActuatorPort, EventSink, PersistedState, SensorPort, StatePort, StorageError,
};
use chargepilot::charge::ChargeMode;
use chargepilot::config::SystemConfig;
use chargepilot::sensors::SensorFrame;

/// Ordered record of persistence writes and emitted events.
pub type Journal = Rc<RefCell<Vec<String>>>;

pub fn new_journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

// ── Actuator call record ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCall {
    SetFan { duty: u8 },
    EnableCharge,
    DisableCharge,
    SafetyShutdown { reason: &'static str },
    AllOff,
}

// ── MockHardware ──────────────────────────────────────────────

pub struct MockHardware {
    pub calls: Vec<ActuatorCall>,
    /// The frame the next `sample()` returns.
    pub frame: SensorFrame,
    charging: bool,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            frame: healthy_frame(),
            charging: false,
        }
    }

    pub fn last_fan_duty(&self) -> Option<u8> {
        self.calls.iter().rev().find_map(|c| match c {
            ActuatorCall::SetFan { duty } => Some(*duty),
            _ => None,
        })
    }

    pub fn charging(&self) -> bool {
        self.charging
    }

    pub fn safety_shutdowns(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, ActuatorCall::SafetyShutdown { .. }))
            .count()
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

/// A nominal operating point: charging a half-full battery, cool board,
/// fan spinning normally.
pub fn healthy_frame() -> SensorFrame {
    SensorFrame {
        v_psu: 14.2,
        v_bat: 12.6,
        current_a: 5.0,
        temp_c: 35.0,
        power_w: 14.2 * 5.0,
        fan_rpm: 1500.0,
    }
}

impl SensorPort for MockHardware {
    fn sample(&mut self, _elapsed_secs: f32) -> SensorFrame {
        self.frame
    }
}

impl ActuatorPort for MockHardware {
    fn set_fan(&mut self, duty: u8) {
        self.calls.push(ActuatorCall::SetFan { duty });
    }

    fn enable_charge(&mut self) {
        self.charging = true;
        self.calls.push(ActuatorCall::EnableCharge);
    }

    fn disable_charge(&mut self) {
        self.charging = false;
        self.calls.push(ActuatorCall::DisableCharge);
    }

    fn safety_shutdown_charge(&mut self, reason: &'static str) {
        self.charging = false;
        self.calls.push(ActuatorCall::SafetyShutdown { reason });
    }

    fn is_charging(&self) -> bool {
        self.charging
    }

    fn all_off(&mut self) {
        self.charging = false;
        self.calls.push(ActuatorCall::AllOff);
    }
}

// ── MockState ─────────────────────────────────────────────────

pub struct MockState {
    pub initial: PersistedState,
    pub saved_modes: RefCell<Vec<ChargeMode>>,
    pub saved_cutoffs: RefCell<Vec<f32>>,
    journal: Option<Journal>,
    pub fail_writes: bool,
}

#[allow(dead_code)]
impl MockState {
    pub fn new(mode: ChargeMode, cutoff_v: f32) -> Self {
        Self {
            initial: PersistedState { mode, cutoff_v },
            saved_modes: RefCell::new(Vec::new()),
            saved_cutoffs: RefCell::new(Vec::new()),
            journal: None,
            fail_writes: false,
        }
    }

    pub fn with_journal(mode: ChargeMode, cutoff_v: f32, journal: Journal) -> Self {
        Self {
            journal: Some(journal),
            ..Self::new(mode, cutoff_v)
        }
    }
}

impl StatePort for MockState {
    fn load(&self, _config: &SystemConfig) -> PersistedState {
        self.initial
    }

    fn save_mode(&self, mode: ChargeMode) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.saved_modes.borrow_mut().push(mode);
        if let Some(j) = &self.journal {
            j.borrow_mut().push(format!("persist:mode={mode}"));
        }
        Ok(())
    }

    fn save_cutoff(&self, volts: f32) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.saved_cutoffs.borrow_mut().push(volts);
        if let Some(j) = &self.journal {
            j.borrow_mut().push(format!("persist:cutoff={volts:.2}"));
        }
        Ok(())
    }
}

// ── JournalSink ───────────────────────────────────────────────

pub struct JournalSink {
    pub events: Vec<AppEvent>,
    journal: Option<Journal>,
}

#[allow(dead_code)]
impl JournalSink {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            journal: None,
        }
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self {
            events: Vec::new(),
            journal: Some(journal),
        }
    }

    pub fn mode_changes(&self) -> Vec<(ChargeMode, ChargeMode)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::ModeChanged { from, to, .. } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn count_matching(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl Default for JournalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for JournalSink {
    fn emit(&mut self, event: &AppEvent) {
        if let Some(j) = &self.journal {
            let tag = match event {
                AppEvent::ModeChanged { to, .. } => format!("event:mode={to}"),
                AppEvent::CutoffChanged(v) => format!("event:cutoff={v:.2}"),
                other => format!("event:{other:?}"),
            };
            j.borrow_mut().push(tag);
        }
        self.events.push(event.clone());
    }
}
