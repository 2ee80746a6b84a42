//! Typed event channel and switch broadcasts.
//!
//! Modem responses, unsolicited notifications, radio-available signals and
//! device condition changes are all delivered as [`CoordinatorEvent`]s on a
//! single channel, which the coordinator drains in order. Outcomes leave the
//! coordinator as [`SwitchEvent`] broadcasts.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use tracing::debug;

use crate::conditions::ConditionChange;
use crate::modem::PhaseResponse;
use crate::raf::RadioAccessFamily;
use crate::session::SessionId;

/// Everything the coordinator reacts to, besides switch requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    StartResponse(PhaseResponse),
    ApplyResponse(PhaseResponse),
    /// Unsolicited capability-changed notification following an APPLY.
    CapabilityChanged(PhaseResponse),
    FinishResponse(PhaseResponse),
    /// Session timer expiry, tagged with the session it was armed for.
    Timeout { session_id: SessionId },
    RadioAvailable { modem: usize },
    Condition(ConditionChange),
}

/// Cloneable producer side of the coordinator's event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<CoordinatorEvent>,
}

impl EventSink {
    pub fn new(tx: Sender<CoordinatorEvent>) -> Self {
        Self { tx }
    }

    /// Queue an event. Returns `false` if the coordinator is gone.
    pub fn post(&self, event: CoordinatorEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                debug!(event = ?e.into_inner(), "coordinator gone, dropping event");
                false
            }
        }
    }
}

/// Create the coordinator event channel.
///
/// Unbounded: modem handles may answer synchronously from inside
/// `send_phase_request`, which runs on the coordinator's own thread.
pub fn channel() -> (EventSink, Receiver<CoordinatorEvent>) {
    let (tx, rx) = unbounded();
    (EventSink::new(tx), rx)
}

// ─── Broadcasts ─────────────────────────────────────────────────────────────

/// Outcome of a capability switch, broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SwitchEvent {
    /// The switch completed; each modem's resulting family, by modem index.
    Done { families: Vec<RadioAccessFamily> },
    /// The switch failed; the configuration is unchanged or reverted.
    Failed,
}

/// Fan-out of [`SwitchEvent`]s to any number of subscribers. Clones share
/// the same subscriber list.
#[derive(Debug, Clone, Default)]
pub struct Broadcaster {
    subscribers: Arc<Mutex<Vec<Sender<SwitchEvent>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SwitchEvent> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber, forgetting dropped ones.
    pub fn publish(&self, event: SwitchEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
