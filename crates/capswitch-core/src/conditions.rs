//! # Device Condition Providers
//!
//! A capability switch must not run while the user is on a call, while
//! airplane mode is on, or while the baseband is switching world mode.
//! The gate queries these conditions through small provider traits and
//! learns that a blocking condition cleared from [`ConditionChange`]
//! events posted on the coordinator's event channel.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Telephony call state of the device as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    #[default]
    Idle,
    Ringing,
    OffHook,
}

/// Edge-triggered change of a device condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionChange {
    AirplaneMode { enabled: bool },
    CallState(CallState),
    /// Emergency call or emergency callback mode started or ended. The gate
    /// re-reads [`CallStateProvider::emergency_in_progress`] to learn which.
    EmergencyStateChanged,
    WorldMode { switching: bool },
}

pub trait CallStateProvider: Send + Sync {
    fn call_state(&self) -> CallState;

    /// Emergency call in progress or emergency callback mode active.
    fn emergency_in_progress(&self) -> bool;
}

pub trait AirplaneModeProvider: Send + Sync {
    fn airplane_mode_on(&self) -> bool;
}

pub trait WorldModeProvider: Send + Sync {
    /// Baseband is in the middle of a world-mode (region band set) switch.
    fn world_mode_switching(&self) -> bool;

    /// Legacy world phones without world-mode support must be told which
    /// slot becomes the major phone before a switch starts.
    fn needs_major_phone_notice(&self) -> bool {
        false
    }

    fn notify_major_phone_change(&self, _major_modem: usize) {}
}

/// Factory/engineering test modes that pin the capability layout.
pub trait TestModeProvider: Send + Sync {
    /// Conformance (field test) mode is active.
    fn conformance_test_mode(&self) -> bool;

    /// Engineering menu has capability switching turned off.
    fn engineering_switch_disabled(&self) -> bool;
}

/// The condition providers consulted by the gate.
#[derive(Clone)]
pub struct Conditions {
    pub calls: Arc<dyn CallStateProvider>,
    pub airplane: Arc<dyn AirplaneModeProvider>,
    pub world_mode: Arc<dyn WorldModeProvider>,
    pub test_mode: Arc<dyn TestModeProvider>,
}

impl Conditions {
    /// Use one object for every provider.
    pub fn from_provider<P>(provider: Arc<P>) -> Self
    where
        P: CallStateProvider
            + AirplaneModeProvider
            + WorldModeProvider
            + TestModeProvider
            + 'static,
    {
        Self {
            calls: provider.clone(),
            airplane: provider.clone(),
            world_mode: provider.clone(),
            test_mode: provider,
        }
    }

    /// Any voice or emergency call is active.
    pub fn in_call(&self) -> bool {
        self.calls.call_state() != CallState::Idle || self.calls.emergency_in_progress()
    }
}

impl Default for Conditions {
    fn default() -> Self {
        Self::from_provider(Arc::new(QuietDevice))
    }
}

impl std::fmt::Debug for Conditions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conditions")
            .field("call_state", &self.calls.call_state())
            .field("emergency", &self.calls.emergency_in_progress())
            .field("airplane", &self.airplane.airplane_mode_on())
            .field("world_mode_switching", &self.world_mode.world_mode_switching())
            .finish()
    }
}

/// A device with no call, airplane mode off, no world-mode switch and no
/// test mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuietDevice;

impl CallStateProvider for QuietDevice {
    fn call_state(&self) -> CallState {
        CallState::Idle
    }

    fn emergency_in_progress(&self) -> bool {
        false
    }
}

impl AirplaneModeProvider for QuietDevice {
    fn airplane_mode_on(&self) -> bool {
        false
    }
}

impl WorldModeProvider for QuietDevice {
    fn world_mode_switching(&self) -> bool {
        false
    }
}

impl TestModeProvider for QuietDevice {
    fn conformance_test_mode(&self) -> bool {
        false
    }

    fn engineering_switch_disabled(&self) -> bool {
        false
    }
}
