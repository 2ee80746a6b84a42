//! Named end-to-end scenarios against a simulated two-modem device.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use capswitch_core::conditions::CallState;
use capswitch_core::config::SwitchConfig;
use capswitch_core::coordinator::{Coordinator, StatusSnapshot};
use capswitch_core::events::{self, SwitchEvent};
use capswitch_core::gate::GateDecision;
use capswitch_core::modem::{CommandError, ModemHandle, Phase};
use capswitch_core::raf::{RadioAccessFamily, RadioAccessFamilyRequest};
use capswitch_core::runtime::SwitchRuntime;
use crossbeam_channel::Receiver;
use serde::Serialize;
use tracing::{info, warn};

use crate::conditions::SimConditions;
use crate::modem::{ModemScript, NotifyScript, PhaseScript, SimModem};

/// How long to wait for a DONE/FAILED broadcast that should arrive.
const OUTCOME_WAIT: Duration = Duration::from_secs(5);
/// How long to watch for a broadcast that should not arrive.
const QUIET_WAIT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// Swap LTE and GSM between the two modems.
    Happy,
    /// Request during a call; runs when the call ends.
    InCall,
    /// Modem 1 loses its radio during APPLY; retried when it returns.
    RadioUnavailable,
    /// Modem 0 never reports its capability change.
    Timeout,
    /// Request the layout the device already has.
    NoOp,
}

impl ScenarioKind {
    pub fn name(self) -> &'static str {
        match self {
            ScenarioKind::Happy => "happy",
            ScenarioKind::InCall => "in-call",
            ScenarioKind::RadioUnavailable => "radio-unavailable",
            ScenarioKind::Timeout => "timeout",
            ScenarioKind::NoOp => "no-op",
        }
    }
}

/// A simulated device: two modems, condition providers and the runtime.
pub struct Device {
    pub runtime: SwitchRuntime,
    pub modems: Vec<Arc<SimModem>>,
    pub conditions: Arc<SimConditions>,
    pub broadcasts: Receiver<SwitchEvent>,
}

impl Device {
    /// Modem 0 serves LTE on logical modem `md-lte`, modem 1 serves GSM on
    /// `md-gsm`.
    pub fn two_modem(config: SwitchConfig) -> anyhow::Result<Self> {
        let modems = vec![
            Arc::new(SimModem::new(0, RadioAccessFamily::LTE, "md-lte")),
            Arc::new(SimModem::new(1, RadioAccessFamily::GSM, "md-gsm")),
        ];
        let handles: Vec<Arc<dyn ModemHandle>> = modems
            .iter()
            .map(|m| m.clone() as Arc<dyn ModemHandle>)
            .collect();
        let (sink, rx) = events::channel();
        let conditions = Arc::new(SimConditions::new(sink.clone()));
        let coordinator = Coordinator::builder(handles, sink)
            .with_config(config)
            .with_conditions(conditions.conditions())
            .build();
        let broadcasts = coordinator.subscribe();
        let runtime = SwitchRuntime::spawn(coordinator, rx)?;
        Ok(Self {
            runtime,
            modems,
            conditions,
            broadcasts,
        })
    }

    pub fn families(&self) -> Vec<RadioAccessFamily> {
        self.modems.iter().map(|m| m.family()).collect()
    }

    /// Request that moves every modem to the other modem's family.
    pub fn swap_request(&self) -> Vec<RadioAccessFamilyRequest> {
        let families = self.families();
        let n = families.len();
        (0..n)
            .map(|i| RadioAccessFamilyRequest::new(i, families[(i + 1) % n]))
            .collect()
    }

    /// Request that keeps the current layout.
    pub fn current_request(&self) -> Vec<RadioAccessFamilyRequest> {
        self.families()
            .into_iter()
            .enumerate()
            .map(|(i, f)| RadioAccessFamilyRequest::new(i, f))
            .collect()
    }

    pub fn wait_for_outcome(&self, wait: Duration) -> Option<SwitchEvent> {
        self.broadcasts.recv_timeout(wait).ok()
    }

    /// Wait until the worker has published an idle snapshot.
    pub fn wait_idle(&self, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        while self.runtime.is_capability_switching() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    pub fn finish_requests(&self) -> usize {
        self.modems
            .iter()
            .map(|m| m.requests_for(Phase::Finish).len())
            .sum()
    }
}

/// What a scenario run observed.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: &'static str,
    pub decision: GateDecision,
    pub accepted: bool,
    /// Broadcasts in arrival order.
    pub outcomes: Vec<SwitchEvent>,
    pub families: Vec<RadioAccessFamily>,
    pub finish_requests: usize,
    pub snapshot: StatusSnapshot,
}

impl ScenarioReport {
    pub fn final_outcome(&self) -> Option<&SwitchEvent> {
        self.outcomes.last()
    }
}

/// Run one scenario on a fresh device.
pub fn run(kind: ScenarioKind, config: SwitchConfig) -> anyhow::Result<ScenarioReport> {
    let config = match kind {
        ScenarioKind::Timeout => SwitchConfig {
            session_timeout: Duration::from_secs(1),
            ..config
        },
        _ => config,
    };
    let device = Device::two_modem(config)?;
    info!(scenario = kind.name(), "running scenario");

    let mut outcomes = Vec::new();
    let decision = match kind {
        ScenarioKind::Happy => {
            let decision = device.runtime.request_switch(&device.swap_request())?;
            outcomes.extend(device.wait_for_outcome(OUTCOME_WAIT));
            decision
        }
        ScenarioKind::InCall => {
            device.conditions.set_call_state(CallState::OffHook);
            let decision = device.runtime.request_switch(&device.swap_request())?;
            device.conditions.set_call_state(CallState::Idle);
            outcomes.extend(device.wait_for_outcome(OUTCOME_WAIT));
            decision
        }
        ScenarioKind::RadioUnavailable => {
            device.modems[1].set_script(
                ModemScript::default()
                    .with_apply(PhaseScript::Fail(CommandError::RadioNotAvailable)),
            );
            let decision = device.runtime.request_switch(&device.swap_request())?;
            let aborted = device
                .wait_for_outcome(OUTCOME_WAIT)
                .context("no broadcast after radio loss")?;
            outcomes.push(aborted);
            device.modems[1].set_script(ModemScript::default());
            device.modems[1].set_available(true);
            outcomes.extend(device.wait_for_outcome(OUTCOME_WAIT));
            decision
        }
        ScenarioKind::Timeout => {
            device.modems[0].set_script(ModemScript::default().with_notify(NotifyScript::Drop));
            let decision = device.runtime.request_switch(&device.swap_request())?;
            outcomes.extend(device.wait_for_outcome(OUTCOME_WAIT));
            decision
        }
        ScenarioKind::NoOp => {
            let decision = device.runtime.request_switch(&device.current_request())?;
            outcomes.extend(device.wait_for_outcome(QUIET_WAIT));
            decision
        }
    };

    if !device.wait_idle(OUTCOME_WAIT) {
        warn!(scenario = kind.name(), "device still switching at end of scenario");
    }
    let report = ScenarioReport {
        scenario: kind.name(),
        decision,
        accepted: decision.as_bool(),
        outcomes,
        families: device.families(),
        finish_requests: device.finish_requests(),
        snapshot: device.runtime.status_snapshot(),
    };
    info!(
        scenario = report.scenario,
        accepted = report.accepted,
        outcome = ?report.final_outcome(),
        "scenario finished"
    );
    Ok(report)
}
