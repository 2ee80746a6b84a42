//! # Session Bookkeeping
//!
//! Every capability switch attempt is tagged with a [`SessionId`]. Responses
//! are matched to the attempt by id, never by arrival order, so bumping the
//! current id is enough to make every in-flight response and timer for an
//! older attempt a no-op.
//!
//! The [`StatusTable`] records each modem's phase status and which modems
//! still owe a response for the phase currently in flight.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one capability switch attempt.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic source of session ids. Every call to [`next`](Self::next)
/// returns an id strictly greater than all previous ones.
#[derive(Debug)]
pub struct SessionIdGenerator {
    next: u64,
}

impl SessionIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Start the sequence at `seed`. Seeding from something that differs
    /// across restarts keeps a freshly booted coordinator from honouring
    /// responses addressed to its previous incarnation.
    pub fn starting_at(seed: u64) -> Self {
        Self { next: seed }
    }

    pub fn next(&mut self) -> SessionId {
        let id = SessionId(self.next);
        self.next = self.next.wrapping_add(1);
        id
    }

    /// Id that the next call to [`next`](Self::next) will return.
    pub fn peek(&self) -> SessionId {
        SessionId(self.next)
    }
}

impl Default for SessionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Per-Modem Status ───────────────────────────────────────────────────────

/// Phase status of one modem within the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModemStatus {
    #[default]
    Idle,
    Starting,
    Started,
    Applying,
    Success,
    Fail,
}

impl ModemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModemStatus::Idle => "idle",
            ModemStatus::Starting => "starting",
            ModemStatus::Started => "started",
            ModemStatus::Applying => "applying",
            ModemStatus::Success => "success",
            ModemStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for ModemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of every modem plus the set of modems still owing a response for
/// the current phase.
#[derive(Debug, Clone)]
pub struct StatusTable {
    status: Vec<ModemStatus>,
    awaiting: Vec<bool>,
}

impl StatusTable {
    pub fn new(modem_count: usize) -> Self {
        Self {
            status: vec![ModemStatus::Idle; modem_count],
            awaiting: vec![false; modem_count],
        }
    }

    pub fn len(&self) -> usize {
        self.status.len()
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_empty()
    }

    /// Open a new phase: every modem owes exactly one response.
    pub fn expect_all(&mut self) {
        self.awaiting.iter_mut().for_each(|a| *a = true);
    }

    /// Record a response from `modem` for the current phase.
    ///
    /// Returns `false` for unknown modems and for modems that already
    /// answered this phase, so each modem is counted at most once.
    pub fn acknowledge(&mut self, modem: usize) -> bool {
        match self.awaiting.get_mut(modem) {
            Some(slot) if *slot => {
                *slot = false;
                true
            }
            _ => false,
        }
    }

    /// Number of modems that have not answered the current phase.
    pub fn outstanding(&self) -> usize {
        self.awaiting.iter().filter(|a| **a).count()
    }

    pub fn is_awaiting(&self, modem: usize) -> bool {
        self.awaiting.get(modem).copied().unwrap_or(false)
    }

    pub fn set(&mut self, modem: usize, status: ModemStatus) {
        if let Some(slot) = self.status.get_mut(modem) {
            *slot = status;
        }
    }

    pub fn set_all(&mut self, status: ModemStatus) {
        self.status.iter_mut().for_each(|s| *s = status);
    }

    pub fn get(&self, modem: usize) -> Option<ModemStatus> {
        self.status.get(modem).copied()
    }

    pub fn statuses(&self) -> &[ModemStatus] {
        &self.status
    }

    pub fn all_idle(&self) -> bool {
        self.status.iter().all(|s| *s == ModemStatus::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_strictly_increase() {
        let mut ids = SessionIdGenerator::starting_at(41);
        let a = ids.next();
        let b = ids.next();
        assert_eq!(a, SessionId(41));
        assert!(b > a);
        assert_eq!(ids.peek(), SessionId(43));
    }

    #[test]
    fn each_modem_counts_once_per_phase() {
        let mut table = StatusTable::new(3);
        assert_eq!(table.outstanding(), 0);

        table.expect_all();
        assert_eq!(table.outstanding(), 3);
        assert!(table.acknowledge(1));
        assert!(!table.acknowledge(1), "duplicate must not count");
        assert!(!table.acknowledge(7), "unknown modem must not count");
        assert_eq!(table.outstanding(), 2);

        assert!(table.acknowledge(0));
        assert!(table.acknowledge(2));
        assert_eq!(table.outstanding(), 0);

        table.expect_all();
        assert!(table.is_awaiting(1));
    }

    #[test]
    fn status_updates() {
        let mut table = StatusTable::new(2);
        assert!(table.all_idle());
        table.set_all(ModemStatus::Starting);
        table.set(1, ModemStatus::Fail);
        table.set(9, ModemStatus::Success);
        assert_eq!(
            table.statuses(),
            &[ModemStatus::Starting, ModemStatus::Fail]
        );
        assert_eq!(table.get(9), None);
        assert_eq!(ModemStatus::Applying.to_string(), "applying");
    }
}
