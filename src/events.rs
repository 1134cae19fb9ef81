//! Interrupt-driven event system.
//!
//! Events are produced by:
//! - Timer callbacks (control tick, telemetry tick)
//! - The MQTT client task (inbound command arrived)
//! - Software (link state changes)
//!
//! Events are consumed by the main control loop, which drains them once
//! per wakeup.  The fan tachometer ISR does **not** go through this queue
//! — it increments its own atomic counter (see [`crate::sensors::tacho`]),
//! which is the system's single point of cross-context data sharing.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Timer ISR   │────▶│              │     │              │
//! │ MQTT task   │────▶│  Event Queue │────▶│  Main Loop   │
//! │ Software    │────▶│  (lock-free) │     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

/// Maximum number of pending events.
/// Power of 2 for efficient ring buffer modulo.
const EVENT_QUEUE_CAP: usize = 16;

/// System event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    // ── Control ───────────────────────────────────────────
    /// Control loop tick (1 Hz): sample → safety → fan → actuators.
    ControlTick = 0,
    /// Telemetry publish timer fired (2 s).
    TelemetryTick = 1,

    // ── Communication ─────────────────────────────────────
    /// Incoming remote command queued by the MQTT client task.
    CommandReceived = 10,
    /// The sync channel dropped; reconnect backoff is running.
    LinkLost = 11,
    /// The sync channel came (back) up; retained state was republished.
    LinkRestored = 12,
}

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// Producers are the timer task and the MQTT client task; the main loop
// is the single consumer.  Atomic head/tail indices, no locking.

static EVENT_HEAD: AtomicU8 = AtomicU8::new(0);
static EVENT_TAIL: AtomicU8 = AtomicU8::new(0);
// SAFETY: head/tail atomics enforce single-producer-slot/single-consumer
// discipline: a slot is written only between the head load and the head
// store in push_event, and read only between the tail load and the tail
// store in pop_event.
static mut EVENT_BUFFER: [u8; EVENT_QUEUE_CAP] = [0; EVENT_QUEUE_CAP];

/// Push an event into the queue.
/// Safe to call from timer-task context (lock-free).
/// Returns `false` if the queue is full (event dropped).
pub fn push_event(event: Event) -> bool {
    let head = EVENT_HEAD.load(Ordering::Relaxed);
    let tail = EVENT_TAIL.load(Ordering::Acquire);
    let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

    if next_head == tail {
        return false; // Queue full — drop event.
    }

    // SAFETY: slot `head` is unreachable by the consumer until the
    // Release store below publishes it.
    unsafe {
        EVENT_BUFFER[head as usize] = event as u8;
    }

    EVENT_HEAD.store(next_head, Ordering::Release);
    true
}

/// Pop the next event from the queue.
/// Called from the main loop (single consumer).
/// Returns `None` if the queue is empty.
pub fn pop_event() -> Option<Event> {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);

    if tail == head {
        return None; // Empty.
    }

    let raw = unsafe { EVENT_BUFFER[tail as usize] };
    EVENT_TAIL.store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);

    event_from_u8(raw)
}

/// Drain all pending events into a callback, FIFO order.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

/// Check if the event queue is empty.
pub fn queue_is_empty() -> bool {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);
    tail == head
}

// ── Internal ──────────────────────────────────────────────────

fn event_from_u8(raw: u8) -> Option<Event> {
    match raw {
        0 => Some(Event::ControlTick),
        1 => Some(Event::TelemetryTick),
        10 => Some(Event::CommandReceived),
        11 => Some(Event::LinkLost),
        12 => Some(Event::LinkRestored),
        _ => None,
    }
}
