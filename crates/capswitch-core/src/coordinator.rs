//! # Capability Switch Coordinator
//!
//! Owns the single capability switch session and drives it through the
//! commit protocol:
//!
//! ```text
//!   START ──all ok──▶ APPLY ──notifications──▶ FINISH(success) ──▶ DONE
//!     │                 │                          │
//!     │ any fail        │ any fail / timeout       └── responses ──▶ FAILED
//!     └────────────────▶└──────▶ FINISH(fail, old family)
//! ```
//!
//! The coordinator is a plain state machine: it never blocks and never
//! spawns threads. Every input arrives through [`Coordinator::handle_event`]
//! or [`Coordinator::set_radio_capability`]; see
//! [`SwitchRuntime`](crate::runtime::SwitchRuntime) for the threaded host.
//!
//! Cancellation is done exclusively by advancing the current session id.
//! A response, notification or timer carrying any other id is dropped.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::conditions::{CallState, ConditionChange, Conditions};
use crate::config::SwitchConfig;
use crate::error::SwitchError;
use crate::events::{Broadcaster, CoordinatorEvent, EventSink, SwitchEvent};
use crate::gate::{
    self, GateContext, GateDecision, GateState, GateVerdict, PendingRequest, RetryCause,
};
use crate::modem::{
    CapabilityStatus, CommandError, DataAttachController, ModemHandle, NoDataAttach,
    NotificationSink, Phase, PhaseReply, PhaseResponse, RadioAvailableSink, RadioCapability,
};
use crate::policy::{AllowAll, MajorPhonePolicy, OperatorPolicy};
use crate::raf::{RadioAccessFamily, RadioAccessFamilyRequest};
use crate::session::{ModemStatus, SessionId, SessionIdGenerator, StatusTable};
use crate::wakelock::{TrackedWakeLock, WakeLock, WakeLockGuard};

/// Protocol step the active session is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Starting,
    Applying,
    Finishing,
}

struct Session {
    phase: SessionPhase,
    request: Vec<RadioAccessFamilyRequest>,
    old_family: Vec<RadioAccessFamily>,
    new_family: Vec<RadioAccessFamily>,
    current_logical: Vec<String>,
    new_logical: Vec<String>,
    table: StatusTable,
    failed: bool,
    _wake: WakeLockGuard,
}

enum SessionState {
    Idle,
    Active(Session),
}

struct SessionTimer {
    session_id: SessionId,
    deadline: quanta::Instant,
}

/// Serializable view of the coordinator, for diagnostics dumps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub switching: bool,
    pub session_id: SessionId,
    pub phase: Option<SessionPhase>,
    pub statuses: Vec<ModemStatus>,
    pub outstanding: usize,
    pub failed: bool,
    pub families: Vec<RadioAccessFamily>,
    pub retry_cause: Option<RetryCause>,
    pub pending: Option<PendingRequest>,
}

// ─── Construction ───────────────────────────────────────────────────────────

/// Collects the coordinator's collaborators. Everything but the modems and
/// the event sink has a working default.
pub struct CoordinatorBuilder {
    modems: Vec<Arc<dyn ModemHandle>>,
    events: EventSink,
    config: SwitchConfig,
    conditions: Conditions,
    data: Arc<dyn DataAttachController>,
    operator: Box<dyn OperatorPolicy>,
    wake_lock: Arc<dyn WakeLock>,
    clock: quanta::Clock,
    session_seed: u64,
}

impl CoordinatorBuilder {
    pub fn with_config(mut self, config: SwitchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_data_attach(mut self, data: Arc<dyn DataAttachController>) -> Self {
        self.data = data;
        self
    }

    pub fn with_operator_policy(mut self, operator: Box<dyn OperatorPolicy>) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_wake_lock(mut self, wake_lock: Arc<dyn WakeLock>) -> Self {
        self.wake_lock = wake_lock;
        self
    }

    pub fn with_clock(mut self, clock: quanta::Clock) -> Self {
        self.clock = clock;
        self
    }

    /// First session id handed out. See [`SessionIdGenerator::starting_at`].
    pub fn with_session_seed(mut self, seed: u64) -> Self {
        self.session_seed = seed;
        self
    }

    /// Build the coordinator and subscribe it to every modem's
    /// capability-changed notifications.
    pub fn build(self) -> Coordinator {
        for (index, modem) in self.modems.iter().enumerate() {
            modem.register_for_capability_changed(NotificationSink::new(index, self.events.clone()));
        }
        let mut ids = SessionIdGenerator::starting_at(self.session_seed);
        let current_session_id = ids.next();
        Coordinator {
            major: MajorPhonePolicy::new(self.config.major_family),
            config: self.config,
            modems: self.modems,
            data: self.data,
            conditions: self.conditions,
            operator: self.operator,
            wake_lock: self.wake_lock,
            events: self.events,
            broadcaster: Broadcaster::new(),
            clock: self.clock,
            ids,
            current_session_id,
            state: SessionState::Idle,
            gate: GateState::new(),
            timer: None,
        }
    }
}

// ─── Coordinator ────────────────────────────────────────────────────────────

/// Single-writer owner of the capability switch session.
pub struct Coordinator {
    config: SwitchConfig,
    modems: Vec<Arc<dyn ModemHandle>>,
    data: Arc<dyn DataAttachController>,
    conditions: Conditions,
    major: MajorPhonePolicy,
    operator: Box<dyn OperatorPolicy>,
    wake_lock: Arc<dyn WakeLock>,
    events: EventSink,
    broadcaster: Broadcaster,
    clock: quanta::Clock,
    ids: SessionIdGenerator,
    current_session_id: SessionId,
    state: SessionState,
    gate: GateState,
    timer: Option<SessionTimer>,
}

impl Coordinator {
    pub fn builder(modems: Vec<Arc<dyn ModemHandle>>, events: EventSink) -> CoordinatorBuilder {
        CoordinatorBuilder {
            modems,
            events,
            config: SwitchConfig::default(),
            conditions: Conditions::default(),
            data: Arc::new(NoDataAttach),
            operator: Box::new(AllowAll),
            wake_lock: Arc::new(TrackedWakeLock::new()),
            clock: quanta::Clock::new(),
            session_seed: 1,
        }
    }

    /// Submit a switch request.
    ///
    /// `Ok` carries the gate's decision; only malformed requests and
    /// operator vetoes are returned as errors. Everything that goes wrong
    /// after a session is accepted is reported as a
    /// [`SwitchEvent::Failed`] broadcast.
    pub fn set_radio_capability(
        &mut self,
        rafs: &[RadioAccessFamilyRequest],
    ) -> Result<GateDecision, SwitchError> {
        let verdict = {
            let ctx = GateContext {
                config: &self.config,
                modems: &self.modems,
                conditions: &self.conditions,
                major: &self.major,
                operator: self.operator.as_ref(),
                session_active: self.is_capability_switching(),
            };
            gate::evaluate(&ctx, &mut self.gate, rafs)?
        };

        match verdict {
            GateVerdict::Decided(decision) => Ok(decision),
            GateVerdict::SynthesizeSuccess => {
                self.broadcaster.publish(SwitchEvent::Done {
                    families: self.current_families(),
                });
                Ok(GateDecision::NoOp)
            }
            GateVerdict::Proceed { targets, major } => {
                self.gate.clear();
                let world_mode = &self.conditions.world_mode;
                if world_mode.needs_major_phone_notice() {
                    world_mode.notify_major_phone_change(major);
                }
                self.start_session(rafs, targets);
                Ok(GateDecision::Accepted)
            }
        }
    }

    /// Apply one event from the coordinator's channel.
    pub fn handle_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::StartResponse(r) => self.on_start_response(r),
            CoordinatorEvent::ApplyResponse(r) => self.on_apply_response(r),
            CoordinatorEvent::CapabilityChanged(r) => self.on_capability_changed(r),
            CoordinatorEvent::FinishResponse(r) => self.on_finish_response(r),
            CoordinatorEvent::Timeout { session_id } => self.on_timeout(session_id),
            CoordinatorEvent::RadioAvailable { modem } => self.on_radio_available(modem),
            CoordinatorEvent::Condition(change) => self.on_condition(change),
        }
    }

    /// Drain every event currently queued on `rx`. Returns how many were
    /// handled.
    pub fn drain(&mut self, rx: &Receiver<CoordinatorEvent>) -> usize {
        let mut handled = 0;
        while let Ok(event) = rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Fire the session timer if its deadline has passed. Returns `true`
    /// if it fired.
    pub fn poll_timeout(&mut self) -> bool {
        let due = self
            .timer
            .as_ref()
            .filter(|t| t.deadline <= self.clock.now())
            .map(|t| t.session_id);
        match due {
            Some(session_id) => {
                self.timer = None;
                self.on_timeout(session_id);
                true
            }
            None => false,
        }
    }

    /// Time left before the armed session timer fires.
    pub fn time_until_deadline(&self) -> Option<Duration> {
        self.timer
            .as_ref()
            .map(|t| t.deadline.saturating_duration_since(self.clock.now()))
    }

    pub fn is_capability_switching(&self) -> bool {
        matches!(self.state, SessionState::Active(_))
    }

    pub fn current_session_id(&self) -> SessionId {
        self.current_session_id
    }

    pub fn modem_count(&self) -> usize {
        self.modems.len()
    }

    /// Current family of one modem, `UNKNOWN` for an out-of-range index.
    pub fn radio_access_family(&self, modem: usize) -> RadioAccessFamily {
        self.modems
            .get(modem)
            .map(|m| m.current_family())
            .unwrap_or(RadioAccessFamily::UNKNOWN)
    }

    /// Family with the most technologies among the modems.
    pub fn max_raf_supported(&self) -> RadioAccessFamily {
        let mut best: Option<(u32, RadioAccessFamily)> = None;
        for family in self.current_families() {
            let count = family.technology_count();
            if best.map_or(true, |(n, _)| count > n) {
                best = Some((count, family));
            }
        }
        best.map(|(_, f)| f).unwrap_or(RadioAccessFamily::UNKNOWN)
    }

    /// Family with the fewest technologies among the modems.
    pub fn min_raf_supported(&self) -> RadioAccessFamily {
        let mut best: Option<(u32, RadioAccessFamily)> = None;
        for family in self.current_families() {
            let count = family.technology_count();
            if best.map_or(true, |(n, _)| count < n) {
                best = Some((count, family));
            }
        }
        best.map(|(_, f)| f).unwrap_or(RadioAccessFamily::UNKNOWN)
    }

    pub fn subscribe(&self) -> Receiver<SwitchEvent> {
        self.broadcaster.subscribe()
    }

    pub fn broadcaster(&self) -> Broadcaster {
        self.broadcaster.clone()
    }

    pub fn events(&self) -> EventSink {
        self.events.clone()
    }

    pub fn config(&self) -> &SwitchConfig {
        &self.config
    }

    pub fn gate(&self) -> &GateState {
        &self.gate
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        let mut snap = StatusSnapshot {
            switching: false,
            session_id: self.current_session_id,
            phase: None,
            statuses: vec![ModemStatus::Idle; self.modems.len()],
            outstanding: 0,
            failed: false,
            families: self.current_families(),
            retry_cause: self.gate.retry_cause(),
            pending: self.gate.pending().cloned(),
        };
        if let SessionState::Active(session) = &self.state {
            snap.switching = true;
            snap.phase = Some(session.phase);
            snap.statuses = session.table.statuses().to_vec();
            snap.outstanding = session.table.outstanding();
            snap.failed = session.failed;
        }
        snap
    }

    // ─── Session Lifecycle ──────────────────────────────────────────────

    fn current_families(&self) -> Vec<RadioAccessFamily> {
        self.modems.iter().map(|m| m.current_family()).collect()
    }

    /// Logical modem currently serving exactly `family`.
    fn logical_modem_for(&self, family: RadioAccessFamily) -> Option<String> {
        self.modems
            .iter()
            .find(|m| m.current_family() == family)
            .map(|m| m.logical_modem_id())
    }

    fn start_session(&mut self, rafs: &[RadioAccessFamilyRequest], targets: Vec<RadioAccessFamily>) {
        let wake = WakeLockGuard::acquire(self.wake_lock.clone());
        let session_id = self.ids.next();
        self.current_session_id = session_id;

        let old_family = self.current_families();
        let current_logical: Vec<String> =
            self.modems.iter().map(|m| m.logical_modem_id()).collect();
        let new_logical: Vec<String> = targets
            .iter()
            .zip(&current_logical)
            .map(|(family, own)| self.logical_modem_for(*family).unwrap_or_else(|| own.clone()))
            .collect();

        let mut table = StatusTable::new(self.modems.len());
        table.expect_all();
        table.set_all(ModemStatus::Starting);

        self.timer = Some(SessionTimer {
            session_id,
            deadline: self.clock.now() + self.config.session_timeout,
        });

        info!(
            %session_id,
            old = ?old_family,
            new = ?targets,
            "starting capability switch"
        );

        let requests: Vec<RadioCapability> = (0..self.modems.len())
            .map(|i| RadioCapability {
                modem: i,
                session_id,
                phase: Phase::Start,
                family: old_family[i],
                logical_modem_id: current_logical[i].clone(),
                status: CapabilityStatus::None,
            })
            .collect();

        self.state = SessionState::Active(Session {
            phase: SessionPhase::Starting,
            request: rafs.to_vec(),
            old_family,
            new_family: targets,
            current_logical,
            new_logical,
            table,
            failed: false,
            _wake: wake,
        });

        for request in requests {
            self.send(request);
        }
    }

    fn send(&self, request: RadioCapability) {
        let modem = request.modem;
        debug!(modem, session_id = %request.session_id, phase = %request.phase, "sending phase request");
        let reply = PhaseReply::new(request.phase, modem, self.events.clone());
        self.modems[modem].send_phase_request(request, reply);
    }

    fn issue_apply(&mut self) {
        let session_id = self.current_session_id;
        let SessionState::Active(session) = &mut self.state else {
            return;
        };
        session.phase = SessionPhase::Applying;
        session.table.expect_all();
        session.table.set_all(ModemStatus::Applying);
        info!(%session_id, "all modems started, applying");

        let requests: Vec<RadioCapability> = (0..session.table.len())
            .map(|i| RadioCapability {
                modem: i,
                session_id,
                phase: Phase::Apply,
                family: session.new_family[i],
                logical_modem_id: session.new_logical[i].clone(),
                status: CapabilityStatus::None,
            })
            .collect();
        for request in requests {
            self.send(request);
        }
    }

    /// Send FINISH to every modem under `session_id`. A failed session
    /// rolls every modem back to its old family and logical modem.
    fn issue_finish(&mut self, session_id: SessionId) {
        let SessionState::Active(session) = &mut self.state else {
            return;
        };
        session.phase = SessionPhase::Finishing;
        session.table.expect_all();
        let failed = session.failed;
        if failed {
            session.table.set_all(ModemStatus::Fail);
        }
        info!(%session_id, success = !failed, "issuing finish");

        let requests: Vec<RadioCapability> = (0..session.table.len())
            .map(|i| {
                let (family, logical) = if failed {
                    (session.old_family[i], session.current_logical[i].clone())
                } else {
                    (session.new_family[i], session.new_logical[i].clone())
                };
                RadioCapability {
                    modem: i,
                    session_id,
                    phase: Phase::Finish,
                    family,
                    logical_modem_id: logical,
                    status: if failed {
                        CapabilityStatus::Fail
                    } else {
                        CapabilityStatus::Success
                    },
                }
            })
            .collect();
        for request in requests {
            self.send(request);
        }
    }

    /// FINISH fully acknowledged (or abandoned): report the outcome and
    /// return to idle.
    fn complete(&mut self) {
        let SessionState::Active(session) = mem::replace(&mut self.state, SessionState::Idle) else {
            return;
        };
        let finished = self.current_session_id;
        self.current_session_id = self.ids.next();
        self.timer = None;
        let failed = session.failed;
        drop(session);

        if failed {
            warn!(session_id = %finished, "capability switch failed");
            self.broadcaster.publish(SwitchEvent::Failed);
        } else {
            let families = self.current_families();
            info!(session_id = %finished, ?families, "capability switch done");
            self.broadcaster.publish(SwitchEvent::Done { families });
        }
        self.redrive_queued();
    }

    /// Tear the session down without FINISH.
    fn abort(&mut self, reason: &str) {
        let aborted = self.current_session_id;
        self.state = SessionState::Idle;
        self.current_session_id = self.ids.next();
        self.timer = None;
        warn!(session_id = %aborted, reason, "capability switch aborted");
        self.broadcaster.publish(SwitchEvent::Failed);
    }

    /// Resubmit a request that arrived while the previous session ran.
    fn redrive_queued(&mut self) {
        if let Some(pending) = self.gate.take_if(RetryCause::CapabilitySwitching) {
            info!("running request queued behind previous switch");
            self.redrive(pending, true);
        }
    }

    /// Resubmit a parked request exactly once, then discard it whatever the
    /// retry decided. With `loud`, a retry that cannot run is reported as a
    /// failed switch.
    fn redrive(&mut self, pending: PendingRequest, loud: bool) {
        debug!(cause = %pending.cause, "re-driving parked request");
        let outcome = self.set_radio_capability(&pending.rafs);
        if self.gate.pending().is_some() {
            debug!(cause = ?self.gate.retry_cause(), "retry deferred again, discarding it");
        }
        self.gate.discard();
        match outcome {
            Ok(decision) if decision.as_bool() => {}
            Ok(decision) => {
                debug!(?decision, "re-driven request did not run");
                if loud {
                    self.broadcaster.publish(SwitchEvent::Failed);
                }
            }
            Err(e) => {
                warn!(error = %e, "re-driven request rejected");
                if loud {
                    self.broadcaster.publish(SwitchEvent::Failed);
                }
            }
        }
    }

    fn watch_radio(&self, modem: usize) {
        if let Some(handle) = self.modems.get(modem) {
            handle.register_for_radio_available(RadioAvailableSink::new(modem, self.events.clone()));
        }
    }

    // ─── Response Handlers ──────────────────────────────────────────────

    fn on_start_response(&mut self, r: PhaseResponse) {
        let current = self.current_session_id;
        let SessionState::Active(session) = &mut self.state else {
            debug!(modem = r.modem, "start response with no session, ignoring");
            return;
        };
        let Some(cap) = &r.capability else {
            if session.phase == SessionPhase::Starting {
                warn!(modem = r.modem, error = ?r.error, "start transport failure");
                self.abort("start transport failure");
                self.redrive_queued();
            } else {
                debug!(modem = r.modem, "unattributed start response, ignoring");
            }
            return;
        };
        if cap.session_id != current || session.phase != SessionPhase::Starting {
            debug!(modem = r.modem, session_id = %cap.session_id, %current, "stale start response");
            return;
        }
        if !session.table.acknowledge(r.modem) {
            debug!(modem = r.modem, "duplicate start response");
            return;
        }
        if r.is_failure() {
            warn!(modem = r.modem, error = ?r.error, "modem failed start");
            session.table.set(r.modem, ModemStatus::Fail);
            session.failed = true;
        } else {
            debug!(modem = r.modem, "modem started");
            session.table.set(r.modem, ModemStatus::Started);
        }
        if session.table.outstanding() > 0 {
            return;
        }
        if session.failed {
            self.issue_finish(current);
        } else {
            self.issue_apply();
        }
    }

    fn on_apply_response(&mut self, r: PhaseResponse) {
        let current = self.current_session_id;
        let SessionState::Active(session) = &mut self.state else {
            debug!(modem = r.modem, "apply response with no session, ignoring");
            return;
        };
        if session.phase != SessionPhase::Applying {
            debug!(modem = r.modem, "apply response outside apply phase");
            return;
        }
        if let Some(cap) = &r.capability {
            if cap.session_id != current {
                debug!(modem = r.modem, session_id = %cap.session_id, %current, "stale apply response");
                return;
            }
        }
        match &r.error {
            Some(CommandError::RadioNotAvailable) => {
                let request = session.request.clone();
                self.gate.repark(&request, RetryCause::RadioUnavailable);
                self.watch_radio(r.modem);
                self.abort("radio not available during apply");
            }
            Some(error) => {
                warn!(modem = r.modem, %error, "modem failed apply");
                session.table.set(r.modem, ModemStatus::Fail);
                session.failed = true;
            }
            None if r.is_failure() => {
                warn!(modem = r.modem, "modem reported apply failure");
                session.table.set(r.modem, ModemStatus::Fail);
                session.failed = true;
            }
            None => debug!(modem = r.modem, "apply accepted, awaiting notification"),
        }
    }

    fn on_capability_changed(&mut self, r: PhaseResponse) {
        let current = self.current_session_id;
        let SessionState::Active(session) = &mut self.state else {
            debug!(modem = r.modem, "capability notification with no session, ignoring");
            return;
        };
        let Some(cap) = &r.capability else {
            debug!(modem = r.modem, "unattributed capability notification");
            return;
        };
        if cap.session_id != current || session.phase != SessionPhase::Applying {
            debug!(modem = r.modem, session_id = %cap.session_id, %current, "stale capability notification");
            return;
        }
        if !session.table.acknowledge(r.modem) {
            debug!(modem = r.modem, "duplicate capability notification");
            return;
        }
        if r.is_failure() {
            warn!(modem = r.modem, error = ?r.error, "capability change failed");
            session.table.set(r.modem, ModemStatus::Fail);
            session.failed = true;
        } else {
            debug!(modem = r.modem, family = %cap.family, "capability changed");
            session.table.set(r.modem, ModemStatus::Success);
            self.data.retry_attach(r.modem);
            if let Some(modem) = self.modems.get(r.modem) {
                modem.notify_capability_updated(cap);
            }
        }
        if session.table.outstanding() == 0 {
            self.issue_finish(current);
        }
    }

    fn on_finish_response(&mut self, r: PhaseResponse) {
        let current = self.current_session_id;
        let count_unattributed = self.config.count_unattributed_finish_errors;
        let SessionState::Active(session) = &mut self.state else {
            debug!(modem = r.modem, "finish response with no session, ignoring");
            return;
        };
        if session.phase != SessionPhase::Finishing {
            debug!(modem = r.modem, "finish response outside finish phase");
            return;
        }
        match &r.capability {
            None if r.error.is_some() && count_unattributed => {
                debug!(modem = r.modem, error = ?r.error, "counting unattributed finish error");
            }
            None => {
                debug!(modem = r.modem, "unattributed finish response, ignoring");
                return;
            }
            Some(cap) if cap.session_id != current => {
                debug!(modem = r.modem, session_id = %cap.session_id, %current, "stale finish response");
                return;
            }
            Some(_) => {}
        }
        if !session.table.acknowledge(r.modem) {
            debug!(modem = r.modem, "duplicate finish response");
            return;
        }
        if r.is_failure() {
            warn!(modem = r.modem, error = ?r.error, "modem reported finish failure");
        }
        if session.table.outstanding() == 0 {
            self.complete();
        }
    }

    fn on_timeout(&mut self, session_id: SessionId) {
        if session_id != self.current_session_id {
            debug!(%session_id, current = %self.current_session_id, "stale timeout");
            return;
        }
        let SessionState::Active(session) = &mut self.state else {
            return;
        };
        session.failed = true;
        if session.phase == SessionPhase::Finishing {
            warn!(%session_id, outstanding = session.table.outstanding(), "finish timed out");
            self.complete();
            return;
        }
        warn!(
            %session_id,
            phase = ?session.phase,
            outstanding = session.table.outstanding(),
            "capability switch timed out, forcing finish"
        );
        let fresh = self.ids.next();
        self.current_session_id = fresh;
        self.timer = Some(SessionTimer {
            session_id: fresh,
            deadline: self.clock.now() + self.config.session_timeout,
        });
        self.issue_finish(fresh);
    }

    fn on_radio_available(&mut self, modem: usize) {
        match self.gate.take_if(RetryCause::RadioUnavailable) {
            Some(pending) => {
                info!(modem, "radio available, retrying parked request");
                self.redrive(pending, false);
            }
            None => debug!(modem, "radio available, nothing parked"),
        }
    }

    fn on_condition(&mut self, change: ConditionChange) {
        let pending = match change {
            ConditionChange::AirplaneMode { enabled: false } => {
                self.gate.take_if(RetryCause::AirplaneMode)
            }
            ConditionChange::CallState(CallState::Idle) if self.gate.watching_calls() => {
                self.gate.stop_watching_calls();
                self.gate.take_if(RetryCause::InCall)
            }
            ConditionChange::EmergencyStateChanged
                if self.gate.watching_emergency()
                    && !self.conditions.calls.emergency_in_progress() =>
            {
                self.gate.stop_watching_emergency();
                self.gate.take_if(RetryCause::InCall)
            }
            ConditionChange::WorldMode { switching: false } if self.gate.watching_world_mode() => {
                self.gate.stop_watching_world_mode();
                self.gate.take_if(RetryCause::WorldModeSwitching)
            }
            _ => None,
        };
        if let Some(pending) = pending {
            info!(?change, cause = %pending.cause, "blocking condition cleared");
            self.redrive(pending, true);
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("modems", &self.modems.len())
            .field("session_id", &self.current_session_id)
            .field("switching", &self.is_capability_switching())
            .field("gate", &self.gate)
            .finish()
    }
}
