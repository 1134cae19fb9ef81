//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! The MQTT adapter implements the same trait for the network side; the
//! main loop fans every event out to both.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Telemetry(t) => {
                info!(
                    "TELEM | mode={} | psu={:.2}V bat={:.2}V | {:.2}A {:.0}W | \
                     T={:.1}\u{00b0}C | fan={}/{:.0}rpm | charging={} overheated={}",
                    t.mode,
                    t.v_psu,
                    t.v_bat,
                    t.current_a,
                    t.power_w,
                    t.temp_c,
                    t.fan_duty,
                    t.fan_rpm,
                    t.charging,
                    t.overheated,
                );
            }
            AppEvent::ModeChanged { from, to, cause } => {
                info!("MODE  | {} -> {} ({:?})", from, to, cause);
            }
            AppEvent::CutoffChanged(v) => {
                info!("CUTOFF| {:.2}V", v);
            }
            AppEvent::OverheatSet(temp) => {
                warn!("LATCH | overheated at {:.1}\u{00b0}C", temp);
            }
            AppEvent::OverheatCleared(temp) => {
                info!("LATCH | cleared at {:.1}\u{00b0}C", temp);
            }
            AppEvent::StallKickStarted { rpm } => {
                warn!("FAN   | stall kick-start ({:.0} rpm)", rpm);
            }
            AppEvent::CommandRejected(err) => {
                warn!("CMD   | rejected: {}", err);
            }
            AppEvent::Started(mode) => {
                info!("START | restored mode={}", mode);
            }
        }
    }
}
