//! # capswitch-core
//!
//! Radio capability switch coordinator for multi-modem devices.
//!
//! Reassigns radio access families (2G/3G/4G) and logical modems between
//! SIM slots with a three-phase START/APPLY/FINISH commit protocol, guarded
//! by a precondition gate that defers requests while a call, airplane mode,
//! a world-mode switch or another session is in the way.
//!
//! ## Crate structure
//!
//! - [`raf`]: Radio access family bitmask and per-modem requests
//! - [`modem`]: Modem handle contract, phase records, reply sinks
//! - [`conditions`]: Device condition providers (call, airplane, world mode)
//! - [`session`]: Session ids and per-modem status table
//! - [`gate`]: Precondition gate and the parked-request slot
//! - [`policy`]: Major phone rule and operator policy hook
//! - [`wakelock`]: Wake lock scope guard
//! - [`coordinator`]: The session state machine
//! - [`events`]: Typed event channel and DONE/FAILED broadcasts
//! - [`runtime`]: Worker thread hosting the coordinator
//! - [`config`]: TOML configuration
//! - [`error`]: Error types

pub mod conditions;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod gate;
pub mod modem;
pub mod policy;
pub mod raf;
pub mod runtime;
pub mod session;
pub mod wakelock;

pub use config::SwitchConfig;
pub use coordinator::{Coordinator, CoordinatorBuilder, SessionPhase, StatusSnapshot};
pub use error::{ConfigError, SwitchError};
pub use events::{CoordinatorEvent, EventSink, SwitchEvent};
pub use gate::{GateDecision, RetryCause};
pub use raf::{RadioAccessFamily, RadioAccessFamilyRequest};
pub use runtime::SwitchRuntime;
