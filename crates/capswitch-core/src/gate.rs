//! # Precondition Gate
//!
//! Decides, before a session is created, whether a switch request can run
//! now, must wait for a blocking condition to clear, or is pointless.
//!
//! Checks run in a fixed order and the first one that decides wins:
//!
//! ```text
//!   disabled ─▶ world-mode ─▶ validate + major phone count ─▶ test mode
//!      ─▶ in call ─▶ airplane ─▶ radio available ─▶ unchanged
//!      ─▶ session active ─▶ same major ─▶ operator policy ─▶ proceed
//! ```
//!
//! A deferred request is parked in a single [`PendingRequest`] slot; a later
//! deferral overwrites it (last writer wins). The coordinator re-drives the
//! parked request once when the matching condition clears and then discards
//! it, whatever the retry decided.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::conditions::{CallState, Conditions};
use crate::config::SwitchConfig;
use crate::error::SwitchError;
use crate::modem::ModemHandle;
use crate::policy::{MajorPhonePolicy, OperatorPolicy, OperatorVerdict};
use crate::raf::{RadioAccessFamily, RadioAccessFamilyRequest};

/// Why a request was parked instead of run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryCause {
    WorldModeSwitching,
    CapabilitySwitching,
    InCall,
    RadioUnavailable,
    AirplaneMode,
}

impl fmt::Display for RetryCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RetryCause::WorldModeSwitching => "world_mode_switching",
            RetryCause::CapabilitySwitching => "capability_switching",
            RetryCause::InCall => "in_call",
            RetryCause::RadioUnavailable => "radio_unavailable",
            RetryCause::AirplaneMode => "airplane_mode",
        };
        f.write_str(s)
    }
}

/// The one parked request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRequest {
    pub rafs: Vec<RadioAccessFamilyRequest>,
    pub cause: RetryCause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// A modem's radio is off or crashed; the caller should retry later.
    RadioUnavailable { modem: usize },
}

/// Result of a switch request that passed input validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// A session was started.
    Accepted,
    /// Nothing needed to happen; reported as success.
    NoOp,
    /// Parked until `cause` clears.
    Deferred(RetryCause),
    Rejected(RejectReason),
}

impl GateDecision {
    /// Boolean answer of the `setRadioCapability` contract. `true` means
    /// "done, nothing to do, or queued behind something that will clear by
    /// itself"; it does not mean a switch happened.
    pub fn as_bool(self) -> bool {
        match self {
            GateDecision::Accepted | GateDecision::NoOp => true,
            GateDecision::Deferred(RetryCause::WorldModeSwitching)
            | GateDecision::Deferred(RetryCause::CapabilitySwitching) => true,
            GateDecision::Deferred(_) | GateDecision::Rejected(_) => false,
        }
    }
}

impl From<GateDecision> for bool {
    fn from(d: GateDecision) -> bool {
        d.as_bool()
    }
}

// ─── Gate State ─────────────────────────────────────────────────────────────

/// Parked request plus the condition listeners the gate is attached to.
#[derive(Debug, Default)]
pub struct GateState {
    pending: Option<PendingRequest>,
    watching_calls: bool,
    watching_emergency: bool,
    watching_world_mode: bool,
}

impl GateState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn retry_cause(&self) -> Option<RetryCause> {
        self.pending.as_ref().map(|p| p.cause)
    }

    pub fn watching_calls(&self) -> bool {
        self.watching_calls
    }

    pub fn watching_emergency(&self) -> bool {
        self.watching_emergency
    }

    pub fn watching_world_mode(&self) -> bool {
        self.watching_world_mode
    }

    pub(crate) fn stop_watching_calls(&mut self) {
        self.watching_calls = false;
    }

    pub(crate) fn stop_watching_emergency(&mut self) {
        self.watching_emergency = false;
    }

    pub(crate) fn stop_watching_world_mode(&mut self) {
        self.watching_world_mode = false;
    }

    /// Park `rafs`, replacing whatever was parked before.
    pub fn defer(&mut self, rafs: &[RadioAccessFamilyRequest], cause: RetryCause) {
        if let Some(old) = &self.pending {
            if old.cause != cause || old.rafs != rafs {
                debug!(old_cause = %old.cause, new_cause = %cause, "replacing parked request");
            }
        }
        self.pending = Some(PendingRequest {
            rafs: rafs.to_vec(),
            cause,
        });
    }

    /// Remove and return the parked request if it waits on `cause`.
    pub fn take_if(&mut self, cause: RetryCause) -> Option<PendingRequest> {
        if self.retry_cause() == Some(cause) {
            self.pending.take()
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// Drop the parked request and detach from every condition.
    pub(crate) fn discard(&mut self) {
        self.pending = None;
        self.watching_calls = false;
        self.watching_emergency = false;
        self.watching_world_mode = false;
    }

    /// Change the cause of the parked request, or park `fallback` under
    /// `cause` if nothing is parked.
    pub fn repark(&mut self, fallback: &[RadioAccessFamilyRequest], cause: RetryCause) {
        match &mut self.pending {
            Some(p) => p.cause = cause,
            None => self.defer(fallback, cause),
        }
    }
}

// ─── Evaluation ─────────────────────────────────────────────────────────────

pub(crate) struct GateContext<'a> {
    pub config: &'a SwitchConfig,
    pub modems: &'a [Arc<dyn ModemHandle>],
    pub conditions: &'a Conditions,
    pub major: &'a MajorPhonePolicy,
    pub operator: &'a dyn OperatorPolicy,
    pub session_active: bool,
}

pub(crate) enum GateVerdict {
    Decided(GateDecision),
    /// Report success to listeners without contacting any modem.
    SynthesizeSuccess,
    Proceed {
        /// Requested family per modem index.
        targets: Vec<RadioAccessFamily>,
        major: usize,
    },
}

pub(crate) fn evaluate(
    ctx: &GateContext<'_>,
    state: &mut GateState,
    rafs: &[RadioAccessFamilyRequest],
) -> Result<GateVerdict, SwitchError> {
    if ctx.config.disabled {
        info!("capability switch disabled, skipping");
        return Ok(GateVerdict::SynthesizeSuccess);
    }

    if ctx.conditions.world_mode.world_mode_switching() {
        info!("world mode switching, parking request");
        state.watching_world_mode = true;
        state.defer(rafs, RetryCause::WorldModeSwitching);
        return Ok(GateVerdict::Decided(GateDecision::Deferred(
            RetryCause::WorldModeSwitching,
        )));
    } else if state.retry_cause() == Some(RetryCause::WorldModeSwitching) {
        state.watching_world_mode = false;
        state.clear();
    }

    let targets = validate(ctx.modems.len(), rafs)?;
    let major = ctx.major.requested_major(rafs)?;

    if ctx.conditions.test_mode.conformance_test_mode() {
        info!("conformance test mode, skipping");
        return Ok(GateVerdict::SynthesizeSuccess);
    }
    if ctx.conditions.test_mode.engineering_switch_disabled() {
        info!("switching disabled from engineering mode, skipping");
        return Ok(GateVerdict::SynthesizeSuccess);
    }

    if ctx.conditions.in_call() {
        let call_state = ctx.conditions.calls.call_state();
        let emergency = ctx.conditions.calls.emergency_in_progress();
        info!(?call_state, emergency, "in call, parking request");
        if call_state != CallState::Idle {
            state.watching_calls = true;
        }
        if emergency {
            state.watching_emergency = true;
        }
        state.defer(rafs, RetryCause::InCall);
        return Ok(GateVerdict::Decided(GateDecision::Deferred(RetryCause::InCall)));
    } else if state.retry_cause() == Some(RetryCause::InCall) {
        state.watching_calls = false;
        state.watching_emergency = false;
        state.clear();
    }

    if ctx.conditions.airplane.airplane_mode_on() {
        info!("airplane mode on, parking request");
        state.defer(rafs, RetryCause::AirplaneMode);
        return Ok(GateVerdict::Decided(GateDecision::Deferred(
            RetryCause::AirplaneMode,
        )));
    }

    if let Some(modem) = ctx.modems.iter().position(|m| !m.is_radio_available()) {
        info!(modem, "radio not available, rejecting request");
        return Ok(GateVerdict::Decided(GateDecision::Rejected(
            RejectReason::RadioUnavailable { modem },
        )));
    }

    let current: Vec<RadioAccessFamily> = ctx.modems.iter().map(|m| m.current_family()).collect();
    if current == targets {
        debug!("already in requested configuration");
        return Ok(GateVerdict::Decided(GateDecision::NoOp));
    }

    if ctx.session_active {
        info!("capability switch in progress, parking request");
        state.defer(rafs, RetryCause::CapabilitySwitching);
        return Ok(GateVerdict::Decided(GateDecision::Deferred(
            RetryCause::CapabilitySwitching,
        )));
    }

    if ctx.major.current_major(&current) == Some(major) {
        info!(major, "major phone unchanged, skipping");
        state.clear();
        return Ok(GateVerdict::SynthesizeSuccess);
    }

    match ctx.operator.check(&current, rafs, major) {
        OperatorVerdict::Proceed => {}
        OperatorVerdict::Skip => {
            info!(major, "operator policy: no switch needed");
            return Ok(GateVerdict::SynthesizeSuccess);
        }
        OperatorVerdict::NotReady => {
            info!(major, "operator policy: SIM info not ready, skipping");
            return Ok(GateVerdict::Decided(GateDecision::NoOp));
        }
        OperatorVerdict::Veto(reason) => return Err(SwitchError::PolicyVeto(reason)),
    }

    Ok(GateVerdict::Proceed { targets, major })
}

/// Check shape and indices, returning the requested family per modem.
fn validate(
    modem_count: usize,
    rafs: &[RadioAccessFamilyRequest],
) -> Result<Vec<RadioAccessFamily>, SwitchError> {
    if rafs.len() != modem_count {
        return Err(SwitchError::LengthMismatch {
            expected: modem_count,
            got: rafs.len(),
        });
    }
    let mut targets: Vec<Option<RadioAccessFamily>> = vec![None; modem_count];
    for (index, req) in rafs.iter().enumerate() {
        let slot = targets
            .get_mut(req.modem_index)
            .ok_or(SwitchError::UnknownModem {
                index,
                modem_index: req.modem_index,
            })?;
        if slot.is_some() {
            return Err(SwitchError::DuplicateModem {
                modem_index: req.modem_index,
            });
        }
        *slot = Some(req.family);
    }
    // Length matches and no index repeats, so every slot is filled.
    Ok(targets.into_iter().map(Option::unwrap_or_default).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{
        AirplaneModeProvider, CallStateProvider, TestModeProvider, WorldModeProvider,
    };
    use crate::modem::{NotificationSink, PhaseReply, RadioAvailableSink, RadioCapability};
    use crate::policy::AllowAll;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StaticModem {
        family: RadioAccessFamily,
        available: AtomicBool,
    }

    impl ModemHandle for StaticModem {
        fn current_family(&self) -> RadioAccessFamily {
            self.family
        }
        fn is_radio_available(&self) -> bool {
            self.available.load(Ordering::Relaxed)
        }
        fn logical_modem_id(&self) -> String {
            format!("lm-{}", self.family.bits())
        }
        fn send_phase_request(&self, _request: RadioCapability, _reply: PhaseReply) {}
        fn register_for_capability_changed(&self, _sink: NotificationSink) {}
        fn register_for_radio_available(&self, _sink: RadioAvailableSink) {}
        fn notify_capability_updated(&self, _capability: &RadioCapability) {}
    }

    #[derive(Default)]
    struct Flags {
        call: AtomicBool,
        emergency: AtomicBool,
        airplane: AtomicBool,
        world_mode: AtomicBool,
        fta: AtomicBool,
        engineering: AtomicBool,
    }

    impl CallStateProvider for Flags {
        fn call_state(&self) -> CallState {
            if self.call.load(Ordering::Relaxed) {
                CallState::OffHook
            } else {
                CallState::Idle
            }
        }
        fn emergency_in_progress(&self) -> bool {
            self.emergency.load(Ordering::Relaxed)
        }
    }
    impl AirplaneModeProvider for Flags {
        fn airplane_mode_on(&self) -> bool {
            self.airplane.load(Ordering::Relaxed)
        }
    }
    impl WorldModeProvider for Flags {
        fn world_mode_switching(&self) -> bool {
            self.world_mode.load(Ordering::Relaxed)
        }
    }
    impl TestModeProvider for Flags {
        fn conformance_test_mode(&self) -> bool {
            self.fta.load(Ordering::Relaxed)
        }
        fn engineering_switch_disabled(&self) -> bool {
            self.engineering.load(Ordering::Relaxed)
        }
    }

    struct Fixture {
        config: SwitchConfig,
        modems: Vec<Arc<dyn ModemHandle>>,
        flags: Arc<Flags>,
        conditions: Conditions,
        major: MajorPhonePolicy,
        state: GateState,
    }

    impl Fixture {
        /// Modem 0 on LTE, modem 1 on GSM.
        fn new() -> Self {
            let modems: Vec<Arc<dyn ModemHandle>> = vec![
                Arc::new(StaticModem {
                    family: RadioAccessFamily::LTE,
                    available: AtomicBool::new(true),
                }),
                Arc::new(StaticModem {
                    family: RadioAccessFamily::GSM,
                    available: AtomicBool::new(true),
                }),
            ];
            let flags = Arc::new(Flags::default());
            Self {
                config: SwitchConfig::default(),
                modems,
                conditions: Conditions::from_provider(flags.clone()),
                flags,
                major: MajorPhonePolicy::default(),
                state: GateState::new(),
            }
        }

        fn run(
            &mut self,
            rafs: &[RadioAccessFamilyRequest],
            session_active: bool,
        ) -> Result<GateVerdict, SwitchError> {
            let ctx = GateContext {
                config: &self.config,
                modems: &self.modems,
                conditions: &self.conditions,
                major: &self.major,
                operator: &AllowAll,
                session_active,
            };
            evaluate(&ctx, &mut self.state, rafs)
        }
    }

    fn swap() -> Vec<RadioAccessFamilyRequest> {
        vec![
            RadioAccessFamilyRequest::new(0, RadioAccessFamily::GSM),
            RadioAccessFamilyRequest::new(1, RadioAccessFamily::LTE),
        ]
    }

    fn decided(v: Result<GateVerdict, SwitchError>) -> GateDecision {
        match v {
            Ok(GateVerdict::Decided(d)) => d,
            Ok(GateVerdict::SynthesizeSuccess) => panic!("unexpected synthesized success"),
            Ok(GateVerdict::Proceed { .. }) => panic!("unexpected proceed"),
            Err(e) => panic!("unexpected error {e}"),
        }
    }

    #[test]
    fn swap_proceeds_with_targets() {
        let mut fx = Fixture::new();
        match fx.run(&swap(), false) {
            Ok(GateVerdict::Proceed { targets, major }) => {
                assert_eq!(targets, vec![RadioAccessFamily::GSM, RadioAccessFamily::LTE]);
                assert_eq!(major, 1);
            }
            _ => panic!("expected proceed"),
        }
    }

    #[test]
    fn in_call_defers_and_watches() {
        let mut fx = Fixture::new();
        fx.flags.call.store(true, Ordering::Relaxed);
        let d = decided(fx.run(&swap(), false));
        assert_eq!(d, GateDecision::Deferred(RetryCause::InCall));
        assert!(!d.as_bool());
        assert!(fx.state.watching_calls());
        assert!(!fx.state.watching_emergency());
        assert_eq!(fx.state.pending().unwrap().rafs, swap());
    }

    #[test]
    fn emergency_counts_as_in_call() {
        let mut fx = Fixture::new();
        fx.flags.emergency.store(true, Ordering::Relaxed);
        let d = decided(fx.run(&swap(), false));
        assert_eq!(d, GateDecision::Deferred(RetryCause::InCall));
        assert!(fx.state.watching_emergency());
    }

    #[test]
    fn world_mode_defers_before_validation() {
        let mut fx = Fixture::new();
        fx.flags.world_mode.store(true, Ordering::Relaxed);
        // Malformed on purpose: world-mode is checked first.
        let d = decided(fx.run(&swap()[..1], false));
        assert_eq!(d, GateDecision::Deferred(RetryCause::WorldModeSwitching));
        assert!(d.as_bool());

        fx.flags.world_mode.store(false, Ordering::Relaxed);
        let _ = fx.run(&swap(), false);
        assert!(!fx.state.watching_world_mode());
    }

    #[test]
    fn airplane_mode_defers() {
        let mut fx = Fixture::new();
        fx.flags.airplane.store(true, Ordering::Relaxed);
        let d = decided(fx.run(&swap(), false));
        assert_eq!(d, GateDecision::Deferred(RetryCause::AirplaneMode));
        assert!(!d.as_bool());
    }

    #[test]
    fn unavailable_radio_rejects_without_parking() {
        let mut fx = Fixture::new();
        fx.modems = vec![
            fx.modems[0].clone(),
            Arc::new(StaticModem {
                family: RadioAccessFamily::GSM,
                available: AtomicBool::new(false),
            }),
        ];
        let d = decided(fx.run(&swap(), false));
        assert_eq!(
            d,
            GateDecision::Rejected(RejectReason::RadioUnavailable { modem: 1 })
        );
        assert!(fx.state.pending().is_none());
    }

    #[test]
    fn unchanged_request_is_noop_even_while_switching() {
        let mut fx = Fixture::new();
        let same = vec![
            RadioAccessFamilyRequest::new(0, RadioAccessFamily::LTE),
            RadioAccessFamilyRequest::new(1, RadioAccessFamily::GSM),
        ];
        assert_eq!(decided(fx.run(&same, false)), GateDecision::NoOp);
        assert_eq!(decided(fx.run(&same, true)), GateDecision::NoOp);
        assert!(fx.state.pending().is_none());
    }

    #[test]
    fn active_session_parks_new_target() {
        let mut fx = Fixture::new();
        let d = decided(fx.run(&swap(), true));
        assert_eq!(d, GateDecision::Deferred(RetryCause::CapabilitySwitching));
        assert!(d.as_bool());
    }

    #[test]
    fn input_errors() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.run(&swap()[..1], false).err(),
            Some(SwitchError::LengthMismatch { expected: 2, got: 1 })
        );
        let dup = vec![
            RadioAccessFamilyRequest::new(1, RadioAccessFamily::GSM),
            RadioAccessFamilyRequest::new(1, RadioAccessFamily::LTE),
        ];
        assert_eq!(
            fx.run(&dup, false).err(),
            Some(SwitchError::DuplicateModem { modem_index: 1 })
        );
        let unknown = vec![
            RadioAccessFamilyRequest::new(0, RadioAccessFamily::GSM),
            RadioAccessFamilyRequest::new(5, RadioAccessFamily::LTE),
        ];
        assert_eq!(
            fx.run(&unknown, false).err(),
            Some(SwitchError::UnknownModem { index: 1, modem_index: 5 })
        );
        let two_major = vec![
            RadioAccessFamilyRequest::new(0, RadioAccessFamily::LTE | RadioAccessFamily::GSM),
            RadioAccessFamilyRequest::new(1, RadioAccessFamily::LTE),
        ];
        assert_eq!(
            fx.run(&two_major, false).err(),
            Some(SwitchError::MultipleMajorPhones { first: 0, second: 1 })
        );
    }

    #[test]
    fn major_phone_count_is_checked_before_parking() {
        let mut fx = Fixture::new();
        let no_major = vec![
            RadioAccessFamilyRequest::new(0, RadioAccessFamily::GSM),
            RadioAccessFamilyRequest::new(1, RadioAccessFamily::UMTS),
        ];
        assert_eq!(
            fx.run(&no_major, true).err(),
            Some(SwitchError::NoMajorPhone)
        );
        fx.flags.call.store(true, Ordering::Relaxed);
        assert_eq!(
            fx.run(&no_major, false).err(),
            Some(SwitchError::NoMajorPhone)
        );
        assert!(fx.state.pending().is_none());
    }

    #[test]
    fn same_major_synthesizes_success() {
        let mut fx = Fixture::new();
        let widen = vec![
            RadioAccessFamilyRequest::new(0, RadioAccessFamily::LTE | RadioAccessFamily::UMTS),
            RadioAccessFamilyRequest::new(1, RadioAccessFamily::GSM),
        ];
        assert!(matches!(
            fx.run(&widen, false),
            Ok(GateVerdict::SynthesizeSuccess)
        ));
    }

    #[test]
    fn test_mode_and_disable_flag_synthesize_success() {
        let mut fx = Fixture::new();
        fx.flags.fta.store(true, Ordering::Relaxed);
        assert!(matches!(
            fx.run(&swap(), false),
            Ok(GateVerdict::SynthesizeSuccess)
        ));

        let mut fx = Fixture::new();
        fx.flags.engineering.store(true, Ordering::Relaxed);
        assert!(matches!(
            fx.run(&swap(), true),
            Ok(GateVerdict::SynthesizeSuccess)
        ));

        let mut fx = Fixture::new();
        fx.config.disabled = true;
        assert!(matches!(
            fx.run(&swap()[..1], false),
            Ok(GateVerdict::SynthesizeSuccess)
        ));
    }

    #[test]
    fn later_deferral_overwrites_parked_request() {
        let mut fx = Fixture::new();
        fx.flags.airplane.store(true, Ordering::Relaxed);
        let _ = fx.run(&swap(), false);
        fx.flags.airplane.store(false, Ordering::Relaxed);
        fx.flags.call.store(true, Ordering::Relaxed);
        let _ = fx.run(&swap(), false);
        assert_eq!(fx.state.retry_cause(), Some(RetryCause::InCall));
        assert!(fx.state.take_if(RetryCause::AirplaneMode).is_none());
        assert!(fx.state.take_if(RetryCause::InCall).is_some());
        assert!(fx.state.pending().is_none());
    }
}
