//! Simulated device conditions.
//!
//! Every setter updates the flag first and then posts the matching
//! [`ConditionChange`], the same order a platform broadcast would arrive in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use capswitch_core::conditions::{
    AirplaneModeProvider, CallState, CallStateProvider, ConditionChange, Conditions,
    TestModeProvider, WorldModeProvider,
};
use capswitch_core::events::{CoordinatorEvent, EventSink};
use tracing::debug;

#[derive(Debug)]
pub struct SimConditions {
    events: EventSink,
    call: Mutex<CallState>,
    emergency: AtomicBool,
    airplane: AtomicBool,
    world_mode: AtomicBool,
    conformance: AtomicBool,
    engineering_disabled: AtomicBool,
    legacy_world_phone: AtomicBool,
    major_notices: Mutex<Vec<usize>>,
}

impl SimConditions {
    pub fn new(events: EventSink) -> Self {
        Self {
            events,
            call: Mutex::new(CallState::Idle),
            emergency: AtomicBool::new(false),
            airplane: AtomicBool::new(false),
            world_mode: AtomicBool::new(false),
            conformance: AtomicBool::new(false),
            engineering_disabled: AtomicBool::new(false),
            legacy_world_phone: AtomicBool::new(false),
            major_notices: Mutex::new(Vec::new()),
        }
    }

    /// Provider bundle for the coordinator, backed by `self`.
    pub fn conditions(self: &Arc<Self>) -> Conditions {
        Conditions::from_provider(self.clone())
    }

    fn post(&self, change: ConditionChange) {
        debug!(?change, "condition changed");
        self.events.post(CoordinatorEvent::Condition(change));
    }

    pub fn set_call_state(&self, state: CallState) {
        *self.call.lock().unwrap_or_else(|e| e.into_inner()) = state;
        self.post(ConditionChange::CallState(state));
    }

    pub fn set_emergency(&self, active: bool) {
        self.emergency.store(active, Ordering::Relaxed);
        self.post(ConditionChange::EmergencyStateChanged);
    }

    pub fn set_airplane_mode(&self, enabled: bool) {
        self.airplane.store(enabled, Ordering::Relaxed);
        self.post(ConditionChange::AirplaneMode { enabled });
    }

    pub fn set_world_mode_switching(&self, switching: bool) {
        self.world_mode.store(switching, Ordering::Relaxed);
        self.post(ConditionChange::WorldMode { switching });
    }

    /// Test modes have no change broadcast.
    pub fn set_conformance_test_mode(&self, on: bool) {
        self.conformance.store(on, Ordering::Relaxed);
    }

    pub fn set_engineering_switch_disabled(&self, on: bool) {
        self.engineering_disabled.store(on, Ordering::Relaxed);
    }

    /// Act as a world phone without world-mode support, which must be told
    /// the new major phone before every switch.
    pub fn set_legacy_world_phone(&self, on: bool) {
        self.legacy_world_phone.store(on, Ordering::Relaxed);
    }

    pub fn major_notices(&self) -> Vec<usize> {
        self.major_notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl CallStateProvider for SimConditions {
    fn call_state(&self) -> CallState {
        *self.call.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emergency_in_progress(&self) -> bool {
        self.emergency.load(Ordering::Relaxed)
    }
}

impl AirplaneModeProvider for SimConditions {
    fn airplane_mode_on(&self) -> bool {
        self.airplane.load(Ordering::Relaxed)
    }
}

impl WorldModeProvider for SimConditions {
    fn world_mode_switching(&self) -> bool {
        self.world_mode.load(Ordering::Relaxed)
    }

    fn needs_major_phone_notice(&self) -> bool {
        self.legacy_world_phone.load(Ordering::Relaxed)
    }

    fn notify_major_phone_change(&self, major_modem: usize) {
        self.major_notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(major_modem);
    }
}

impl TestModeProvider for SimConditions {
    fn conformance_test_mode(&self) -> bool {
        self.conformance.load(Ordering::Relaxed)
    }

    fn engineering_switch_disabled(&self) -> bool {
        self.engineering_disabled.load(Ordering::Relaxed)
    }
}
