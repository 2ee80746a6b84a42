//! # Modem Handle Contract
//!
//! The coordinator never talks to a baseband directly. Each physical modem
//! is reached through a [`ModemHandle`], which the platform layer implements
//! on top of its radio interface. Requests are fire-and-forget: the handle
//! gets a [`PhaseReply`] and must eventually answer through it, from any
//! thread. Answers land on the coordinator's event channel as typed
//! [`CoordinatorEvent`]s.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::events::{CoordinatorEvent, EventSink};
use crate::raf::RadioAccessFamily;
use crate::session::SessionId;

/// Step of the radio capability commit protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    Apply,
    Finish,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Start => write!(f, "start"),
            Phase::Apply => write!(f, "apply"),
            Phase::Finish => write!(f, "finish"),
        }
    }
}

/// Outcome flag carried on a capability record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityStatus {
    #[default]
    None,
    Success,
    Fail,
}

/// A radio capability record: the payload of every phase request, phase
/// response and capability-changed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioCapability {
    pub modem: usize,
    pub session_id: SessionId,
    pub phase: Phase,
    pub family: RadioAccessFamily,
    pub logical_modem_id: String,
    pub status: CapabilityStatus,
}

impl fmt::Display for RadioCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{modem={} session={} phase={} family={} lm={} status={:?}}}",
            self.modem, self.session_id, self.phase, self.family, self.logical_modem_id, self.status
        )
    }
}

/// Error reported by a modem for a phase request or notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandError {
    /// The radio crashed or is powered off. Retryable once it comes back.
    RadioNotAvailable,
    RequestNotSupported,
    GenericFailure,
    /// The command never reached the modem or the reply was lost.
    Transport(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::RadioNotAvailable => write!(f, "radio not available"),
            CommandError::RequestNotSupported => write!(f, "request not supported"),
            CommandError::GenericFailure => write!(f, "generic failure"),
            CommandError::Transport(msg) => write!(f, "transport: {msg}"),
        }
    }
}

/// A decoded answer from one modem.
///
/// `capability` is `None` when the transport failed before any record could
/// be decoded; such an answer cannot be attributed to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseResponse {
    pub modem: usize,
    pub capability: Option<RadioCapability>,
    pub error: Option<CommandError>,
}

impl PhaseResponse {
    pub fn ok(modem: usize, capability: RadioCapability) -> Self {
        Self {
            modem,
            capability: Some(capability),
            error: None,
        }
    }

    pub fn error(modem: usize, capability: RadioCapability, error: CommandError) -> Self {
        Self {
            modem,
            capability: Some(capability),
            error: Some(error),
        }
    }

    pub fn transport_error(modem: usize, error: CommandError) -> Self {
        Self {
            modem,
            capability: None,
            error: Some(error),
        }
    }

    /// True when the modem (or its transport) reported a failure, either as
    /// an error or as a `Fail` status on the record.
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
            || self
                .capability
                .as_ref()
                .is_some_and(|c| c.status == CapabilityStatus::Fail)
    }
}

// ─── Reply Channels ─────────────────────────────────────────────────────────

/// One-shot reply slot handed to [`ModemHandle::send_phase_request`].
#[derive(Debug)]
pub struct PhaseReply {
    phase: Phase,
    modem: usize,
    sink: EventSink,
}

impl PhaseReply {
    pub fn new(phase: Phase, modem: usize, sink: EventSink) -> Self {
        Self { phase, modem, sink }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn modem(&self) -> usize {
        self.modem
    }

    pub fn respond(self, capability: Option<RadioCapability>, error: Option<CommandError>) {
        let response = PhaseResponse {
            modem: self.modem,
            capability,
            error,
        };
        let event = match self.phase {
            Phase::Start => CoordinatorEvent::StartResponse(response),
            Phase::Apply => CoordinatorEvent::ApplyResponse(response),
            Phase::Finish => CoordinatorEvent::FinishResponse(response),
        };
        self.sink.post(event);
    }

    pub fn ok(self, capability: RadioCapability) {
        self.respond(Some(capability), None);
    }

    pub fn error(self, capability: RadioCapability, error: CommandError) {
        self.respond(Some(capability), Some(error));
    }

    pub fn transport_error(self, error: CommandError) {
        self.respond(None, Some(error));
    }
}

/// Long-lived subscription for unsolicited capability-changed notifications
/// from one modem.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    modem: usize,
    sink: EventSink,
}

impl NotificationSink {
    pub fn new(modem: usize, sink: EventSink) -> Self {
        Self { modem, sink }
    }

    pub fn notify(&self, capability: Option<RadioCapability>, error: Option<CommandError>) {
        self.sink
            .post(CoordinatorEvent::CapabilityChanged(PhaseResponse {
                modem: self.modem,
                capability,
                error,
            }));
    }
}

/// One-shot subscription fired when a modem's radio becomes available.
#[derive(Debug)]
pub struct RadioAvailableSink {
    modem: usize,
    sink: EventSink,
}

impl RadioAvailableSink {
    pub fn new(modem: usize, sink: EventSink) -> Self {
        Self { modem, sink }
    }

    pub fn modem(&self) -> usize {
        self.modem
    }

    pub fn fire(self) {
        self.sink
            .post(CoordinatorEvent::RadioAvailable { modem: self.modem });
    }
}

// ─── Collaborator Traits ────────────────────────────────────────────────────

/// Handle to one physical modem.
pub trait ModemHandle: Send + Sync {
    /// Family the modem currently serves.
    fn current_family(&self) -> RadioAccessFamily;

    fn is_radio_available(&self) -> bool;

    /// Identifier of the logical modem currently bound to this slot.
    fn logical_modem_id(&self) -> String;

    /// Issue one phase request. The handle must eventually answer via
    /// `reply`, or never answer at all (the session timer covers that).
    fn send_phase_request(&self, request: RadioCapability, reply: PhaseReply);

    fn register_for_capability_changed(&self, sink: NotificationSink);

    fn register_for_radio_available(&self, sink: RadioAvailableSink);

    /// Tell the modem layer its capability changed as part of a switch.
    fn notify_capability_updated(&self, capability: &RadioCapability);
}

/// Data connection tracker. A modem that switched capability may have been
/// restarted and forgotten its attach.
pub trait DataAttachController: Send + Sync {
    fn retry_attach(&self, modem: usize);
}

/// Data attach controller for devices without a data stack to poke.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDataAttach;

impl DataAttachController for NoDataAttach {
    fn retry_attach(&self, _modem: usize) {}
}
