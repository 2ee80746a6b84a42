//! End-to-end scenarios: the threaded runtime driving simulated modems.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use capswitch_core::conditions::CallState;
use capswitch_core::config::SwitchConfig;
use capswitch_core::events::SwitchEvent;
use capswitch_core::gate::{GateDecision, RetryCause};
use capswitch_core::modem::Phase;
use capswitch_core::raf::{RadioAccessFamily, RadioAccessFamilyRequest};
use capswitch_core::session::SessionId;
use capswitch_sim::scenario::{self, Device, ScenarioKind};

const WAIT: Duration = Duration::from_secs(5);

fn families(a: RadioAccessFamily, b: RadioAccessFamily) -> Vec<RadioAccessFamilyRequest> {
    vec![
        RadioAccessFamilyRequest::new(0, a),
        RadioAccessFamilyRequest::new(1, b),
    ]
}

// ─── Named Scenarios ────────────────────────────────────────────────────

#[test]
fn happy_scenario_swaps_families() {
    let report = scenario::run(ScenarioKind::Happy, SwitchConfig::default()).unwrap();
    assert_eq!(report.decision, GateDecision::Accepted);
    assert_eq!(
        report.final_outcome(),
        Some(&SwitchEvent::Done {
            families: vec![RadioAccessFamily::GSM, RadioAccessFamily::LTE]
        })
    );
    assert_eq!(report.finish_requests, 2);
    assert!(!report.snapshot.switching);
}

#[test]
fn in_call_scenario_runs_after_hangup() {
    let report = scenario::run(ScenarioKind::InCall, SwitchConfig::default()).unwrap();
    assert_eq!(report.decision, GateDecision::Deferred(RetryCause::InCall));
    assert!(!report.accepted);
    assert!(matches!(report.final_outcome(), Some(SwitchEvent::Done { .. })));
    assert_eq!(report.families, vec![RadioAccessFamily::GSM, RadioAccessFamily::LTE]);
}

#[test]
fn radio_unavailable_scenario_recovers() {
    let report = scenario::run(ScenarioKind::RadioUnavailable, SwitchConfig::default()).unwrap();
    assert_eq!(report.outcomes.first(), Some(&SwitchEvent::Failed));
    assert!(matches!(report.final_outcome(), Some(SwitchEvent::Done { .. })));
    // Only the retried session reached FINISH.
    assert_eq!(report.finish_requests, 2);
    assert_eq!(report.families, vec![RadioAccessFamily::GSM, RadioAccessFamily::LTE]);
    assert!(report.snapshot.pending.is_none());
}

#[test]
fn timeout_scenario_rolls_back() {
    let report = scenario::run(ScenarioKind::Timeout, SwitchConfig::default()).unwrap();
    assert_eq!(report.final_outcome(), Some(&SwitchEvent::Failed));
    assert_eq!(report.finish_requests, 2);
    assert_eq!(report.families, vec![RadioAccessFamily::LTE, RadioAccessFamily::GSM]);
}

#[test]
fn noop_scenario_is_silent() {
    let report = scenario::run(ScenarioKind::NoOp, SwitchConfig::default()).unwrap();
    assert_eq!(report.decision, GateDecision::NoOp);
    assert!(report.accepted);
    assert!(report.outcomes.is_empty());
    assert_eq!(report.finish_requests, 0);
}

#[test]
fn report_serializes_to_json() {
    let report = scenario::run(ScenarioKind::NoOp, SwitchConfig::default()).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["scenario"], "no-op");
    assert_eq!(json["decision"], "no_op");
    assert_eq!(json["snapshot"]["switching"], false);
}

// ─── Runtime Properties ─────────────────────────────────────────────────

#[test]
fn concurrent_requests_never_overlap_sessions() {
    let device = Arc::new(Device::two_modem(SwitchConfig::default()).unwrap());
    let swap = families(RadioAccessFamily::GSM, RadioAccessFamily::LTE);
    let back = families(RadioAccessFamily::LTE, RadioAccessFamily::GSM);

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let device = device.clone();
            let (swap, back) = (swap.clone(), back.clone());
            thread::spawn(move || {
                for i in 0..10 {
                    let rafs = if (i + t) % 2 == 0 { &swap } else { &back };
                    assert_eq!(device.runtime.set_radio_capability(rafs), Ok(true));
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    let deadline = Instant::now() + WAIT;
    loop {
        let snap = device.runtime.status_snapshot();
        if !snap.switching && snap.pending.is_none() {
            break;
        }
        assert!(Instant::now() < deadline, "device never settled: {snap:?}");
        thread::sleep(Duration::from_millis(5));
    }

    let sessions: BTreeSet<SessionId> = device.modems[0]
        .requests_for(Phase::Start)
        .iter()
        .map(|r| r.session_id)
        .collect();
    assert!(!sessions.is_empty());
    for modem in &device.modems {
        for phase in [Phase::Start, Phase::Finish] {
            let requests = modem.requests_for(phase);
            for id in &sessions {
                let n = requests.iter().filter(|r| r.session_id == *id).count();
                assert_eq!(n, 1, "modem {} phase {phase} session {id}", modem.index());
            }
        }
    }

    let families = device.families();
    assert_eq!(
        families.iter().filter(|f| f.contains(RadioAccessFamily::LTE)).count(),
        1
    );
}

#[test]
fn airplane_mode_defers_until_turned_off() {
    let device = Device::two_modem(SwitchConfig::default()).unwrap();
    device.conditions.set_airplane_mode(true);
    assert_eq!(device.runtime.set_radio_capability(&device.swap_request()), Ok(false));
    assert_eq!(
        device.runtime.status_snapshot().retry_cause,
        Some(RetryCause::AirplaneMode)
    );

    device.conditions.set_airplane_mode(false);
    assert!(matches!(
        device.wait_for_outcome(WAIT),
        Some(SwitchEvent::Done { .. })
    ));
}

#[test]
fn legacy_world_phone_is_told_the_new_major() {
    let device = Device::two_modem(SwitchConfig::default()).unwrap();
    device.conditions.set_legacy_world_phone(true);
    device.runtime.request_switch(&device.swap_request()).unwrap();
    assert!(device.wait_for_outcome(WAIT).is_some());
    assert_eq!(device.conditions.major_notices(), vec![1]);
}

#[test]
fn conformance_mode_reports_done_without_switching() {
    let device = Device::two_modem(SwitchConfig::default()).unwrap();
    device.conditions.set_conformance_test_mode(true);
    let decision = device.runtime.request_switch(&device.swap_request()).unwrap();
    assert_eq!(decision, GateDecision::NoOp);
    assert_eq!(
        device.wait_for_outcome(WAIT),
        Some(SwitchEvent::Done {
            families: vec![RadioAccessFamily::LTE, RadioAccessFamily::GSM]
        })
    );
    assert_eq!(device.finish_requests(), 0);
}

#[test]
fn emergency_callback_blocks_until_it_ends() {
    let device = Device::two_modem(SwitchConfig::default()).unwrap();
    device.conditions.set_emergency(true);
    assert_eq!(
        device.runtime.request_switch(&device.swap_request()),
        Ok(GateDecision::Deferred(RetryCause::InCall))
    );
    device.conditions.set_call_state(CallState::Idle);
    assert_eq!(device.wait_for_outcome(Duration::from_millis(200)), None);

    device.conditions.set_emergency(false);
    assert!(matches!(
        device.wait_for_outcome(WAIT),
        Some(SwitchEvent::Done { .. })
    ));
}
