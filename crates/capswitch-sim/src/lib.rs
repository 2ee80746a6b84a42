//! Simulation toolkit for the capability switch coordinator.
//!
//! Provides scriptable in-process modems, settable device conditions and a
//! set of named end-to-end scenarios run against the threaded
//! [`SwitchRuntime`](capswitch_core::runtime::SwitchRuntime).

pub mod conditions;
pub mod modem;
pub mod scenario;
