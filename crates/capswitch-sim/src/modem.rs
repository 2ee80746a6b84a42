//! Scriptable in-process modem.
//!
//! A [`SimModem`] answers phase requests synchronously from inside
//! [`ModemHandle::send_phase_request`], following a per-phase
//! [`ModemScript`]. It commits the requested family when it reports a
//! successful capability change and restores the old family when told to
//! FINISH with a failure, so a coordinator driving it sees the same family
//! bookkeeping as on hardware.

use std::sync::Mutex;

use capswitch_core::modem::{
    CapabilityStatus, CommandError, ModemHandle, NotificationSink, Phase, PhaseReply,
    RadioAvailableSink, RadioCapability,
};
use capswitch_core::raf::RadioAccessFamily;
use tracing::debug;

/// How a modem answers one phase request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PhaseScript {
    /// Echo the request back as accepted.
    #[default]
    Respond,
    /// Answer with the request record and a per-modem error.
    Fail(CommandError),
    /// Answer with an error and no record, as when the socket to the
    /// baseband goes away.
    TransportError(CommandError),
    /// Never answer.
    Drop,
}

/// How a modem reports the capability change that follows an APPLY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyScript {
    #[default]
    Success,
    Fail,
    Drop,
}

#[derive(Debug, Clone, Default)]
pub struct ModemScript {
    pub start: PhaseScript,
    pub apply: PhaseScript,
    pub notify: NotifyScript,
    pub finish: PhaseScript,
}

impl ModemScript {
    pub fn with_apply(mut self, apply: PhaseScript) -> Self {
        self.apply = apply;
        self
    }

    pub fn with_notify(mut self, notify: NotifyScript) -> Self {
        self.notify = notify;
        self
    }

    pub fn with_start(mut self, start: PhaseScript) -> Self {
        self.start = start;
        self
    }

    pub fn with_finish(mut self, finish: PhaseScript) -> Self {
        self.finish = finish;
        self
    }
}

struct SimState {
    family: RadioAccessFamily,
    logical: String,
    available: bool,
    script: ModemScript,
    requests: Vec<RadioCapability>,
    notifier: Option<NotificationSink>,
    radio_sinks: Vec<RadioAvailableSink>,
    confirmed: Vec<RadioCapability>,
}

/// Things to do once the state lock is released.
enum Action {
    Reply(PhaseReply, PhaseScript, RadioCapability),
    Notify(NotificationSink, RadioCapability),
}

pub struct SimModem {
    index: usize,
    state: Mutex<SimState>,
}

impl SimModem {
    pub fn new(index: usize, family: RadioAccessFamily, logical: impl Into<String>) -> Self {
        Self {
            index,
            state: Mutex::new(SimState {
                family,
                logical: logical.into(),
                available: true,
                script: ModemScript::default(),
                requests: Vec::new(),
                notifier: None,
                radio_sinks: Vec::new(),
                confirmed: Vec::new(),
            }),
        }
    }

    pub fn with_script(self, script: ModemScript) -> Self {
        self.set_script(script);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn set_script(&self, script: ModemScript) {
        self.lock().script = script;
    }

    /// Power the radio on or off. Coming back on fires every pending
    /// radio-available subscription.
    pub fn set_available(&self, available: bool) {
        let sinks = {
            let mut state = self.lock();
            state.available = available;
            if available {
                std::mem::take(&mut state.radio_sinks)
            } else {
                Vec::new()
            }
        };
        debug!(modem = self.index, available, waiting = sinks.len(), "radio availability changed");
        for sink in sinks {
            sink.fire();
        }
    }

    pub fn family(&self) -> RadioAccessFamily {
        self.lock().family
    }

    /// Every phase request received so far.
    pub fn requests(&self) -> Vec<RadioCapability> {
        self.lock().requests.clone()
    }

    pub fn requests_for(&self, phase: Phase) -> Vec<RadioCapability> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.phase == phase)
            .cloned()
            .collect()
    }

    /// Capability updates the coordinator confirmed to this modem.
    pub fn confirmed(&self) -> Vec<RadioCapability> {
        self.lock().confirmed.clone()
    }

    fn plan(&self, request: RadioCapability, reply: PhaseReply) -> Vec<Action> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        let mut actions = Vec::new();

        match request.phase {
            Phase::Start => {
                let script = state.script.start.clone();
                actions.push(Action::Reply(reply, script, request));
            }
            Phase::Apply => {
                let script = state.script.apply.clone();
                let status = match (&script, state.script.notify) {
                    (PhaseScript::Respond, NotifyScript::Success) => Some(CapabilityStatus::Success),
                    (PhaseScript::Respond, NotifyScript::Fail) => Some(CapabilityStatus::Fail),
                    (PhaseScript::Fail(e), notify)
                        if *e != CommandError::RadioNotAvailable && notify != NotifyScript::Drop =>
                    {
                        Some(CapabilityStatus::Fail)
                    }
                    _ => None,
                };
                if matches!(
                    script,
                    PhaseScript::Fail(CommandError::RadioNotAvailable)
                        | PhaseScript::TransportError(CommandError::RadioNotAvailable)
                ) {
                    // The baseband went down mid-switch.
                    state.available = false;
                }
                actions.push(Action::Reply(reply, script, request.clone()));
                if let (Some(status), Some(notifier)) = (status, state.notifier.clone()) {
                    if status == CapabilityStatus::Success {
                        state.family = request.family;
                        state.logical = request.logical_modem_id.clone();
                    }
                    let notification = RadioCapability { status, ..request };
                    actions.push(Action::Notify(notifier, notification));
                }
            }
            Phase::Finish => {
                if request.status == CapabilityStatus::Fail {
                    state.family = request.family;
                    state.logical = request.logical_modem_id.clone();
                }
                let script = state.script.finish.clone();
                actions.push(Action::Reply(reply, script, request));
            }
        }
        actions
    }
}

impl ModemHandle for SimModem {
    fn current_family(&self) -> RadioAccessFamily {
        self.family()
    }

    fn is_radio_available(&self) -> bool {
        self.lock().available
    }

    fn logical_modem_id(&self) -> String {
        self.lock().logical.clone()
    }

    fn send_phase_request(&self, request: RadioCapability, reply: PhaseReply) {
        for action in self.plan(request, reply) {
            match action {
                Action::Reply(reply, script, record) => match script {
                    PhaseScript::Respond => reply.ok(record),
                    PhaseScript::Fail(error) => reply.error(record, error),
                    PhaseScript::TransportError(error) => reply.transport_error(error),
                    PhaseScript::Drop => {
                        debug!(modem = self.index, phase = %reply.phase(), "dropping reply")
                    }
                },
                Action::Notify(notifier, record) => notifier.notify(Some(record), None),
            }
        }
    }

    fn register_for_capability_changed(&self, sink: NotificationSink) {
        self.lock().notifier = Some(sink);
    }

    /// Fires right away when the radio is already up.
    fn register_for_radio_available(&self, sink: RadioAvailableSink) {
        let fire_now = {
            let mut state = self.lock();
            if state.available {
                Some(sink)
            } else {
                state.radio_sinks.push(sink);
                None
            }
        };
        if let Some(sink) = fire_now {
            sink.fire();
        }
    }

    fn notify_capability_updated(&self, capability: &RadioCapability) {
        self.lock().confirmed.push(capability.clone());
    }
}

impl std::fmt::Debug for SimModem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SimModem")
            .field("index", &self.index)
            .field("family", &state.family)
            .field("logical", &state.logical)
            .field("available", &state.available)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capswitch_core::events::{self, CoordinatorEvent};
    use capswitch_core::session::SessionId;

    fn request(phase: Phase, family: RadioAccessFamily, status: CapabilityStatus) -> RadioCapability {
        RadioCapability {
            modem: 0,
            session_id: SessionId(5),
            phase,
            family,
            logical_modem_id: "md-0".into(),
            status,
        }
    }

    #[test]
    fn apply_commits_family_and_notifies() {
        let (sink, rx) = events::channel();
        let modem = SimModem::new(0, RadioAccessFamily::GSM, "md-0");
        modem.register_for_capability_changed(NotificationSink::new(0, sink.clone()));

        let apply = request(Phase::Apply, RadioAccessFamily::LTE, CapabilityStatus::None);
        modem.send_phase_request(apply, PhaseReply::new(Phase::Apply, 0, sink));

        assert!(matches!(rx.try_recv().unwrap(), CoordinatorEvent::ApplyResponse(_)));
        match rx.try_recv().unwrap() {
            CoordinatorEvent::CapabilityChanged(r) => {
                assert_eq!(r.capability.unwrap().status, CapabilityStatus::Success);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(modem.family(), RadioAccessFamily::LTE);
    }

    #[test]
    fn failed_finish_restores_old_family() {
        let (sink, _rx) = events::channel();
        let modem = SimModem::new(0, RadioAccessFamily::LTE, "md-0");
        let finish = request(Phase::Finish, RadioAccessFamily::GSM, CapabilityStatus::Fail);
        modem.send_phase_request(finish, PhaseReply::new(Phase::Finish, 0, sink));
        assert_eq!(modem.family(), RadioAccessFamily::GSM);
    }

    #[test]
    fn radio_not_available_takes_radio_down_until_restored() {
        let (sink, rx) = events::channel();
        let modem = SimModem::new(0, RadioAccessFamily::GSM, "md-0").with_script(
            ModemScript::default().with_apply(PhaseScript::Fail(CommandError::RadioNotAvailable)),
        );
        let apply = request(Phase::Apply, RadioAccessFamily::LTE, CapabilityStatus::None);
        modem.send_phase_request(apply, PhaseReply::new(Phase::Apply, 0, sink.clone()));
        assert!(!modem.is_radio_available());
        assert!(matches!(rx.try_recv().unwrap(), CoordinatorEvent::ApplyResponse(_)));
        assert!(rx.try_recv().is_err(), "no notification after radio loss");

        modem.register_for_radio_available(RadioAvailableSink::new(0, sink));
        assert!(rx.try_recv().is_err());
        modem.set_available(true);
        assert!(matches!(
            rx.try_recv().unwrap(),
            CoordinatorEvent::RadioAvailable { modem: 0 }
        ));
    }
}
