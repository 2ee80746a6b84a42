//! Switch policies.
//!
//! The *major phone* is the single slot that ends up owning the top-tier
//! family (LTE on LTE devices, UMTS on 3G-only devices). Which bits make a
//! slot major, and whether an operator allows the switch at all, are
//! device/operator policy rather than protocol, so both live here.

use crate::error::SwitchError;
use crate::raf::{RadioAccessFamily, RadioAccessFamilyRequest};

/// Identifies the major phone in requests and in the current layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MajorPhonePolicy {
    major_family: RadioAccessFamily,
}

impl MajorPhonePolicy {
    pub fn new(major_family: RadioAccessFamily) -> Self {
        Self { major_family }
    }

    pub fn major_family(&self) -> RadioAccessFamily {
        self.major_family
    }

    pub fn is_major(&self, family: RadioAccessFamily) -> bool {
        !self.major_family.is_empty() && family.contains(self.major_family)
    }

    /// Modem index that the request makes major. Exactly one entry must
    /// carry the major family.
    pub fn requested_major(
        &self,
        rafs: &[RadioAccessFamilyRequest],
    ) -> Result<usize, SwitchError> {
        let mut major: Option<usize> = None;
        for req in rafs.iter().filter(|r| self.is_major(r.family)) {
            if let Some(first) = major {
                return Err(SwitchError::MultipleMajorPhones {
                    first,
                    second: req.modem_index,
                });
            }
            major = Some(req.modem_index);
        }
        major.ok_or(SwitchError::NoMajorPhone)
    }

    /// Modem index currently serving the major family, if any.
    pub fn current_major(&self, families: &[RadioAccessFamily]) -> Option<usize> {
        families.iter().position(|f| self.is_major(*f))
    }
}

impl Default for MajorPhonePolicy {
    fn default() -> Self {
        Self::new(RadioAccessFamily::LTE)
    }
}

/// Operator verdict on a switch that passed every device precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorVerdict {
    Proceed,
    /// Nothing to do for this operator; report success without switching.
    Skip,
    /// SIM information needed for the decision is not loaded yet; report
    /// success without switching or broadcasting.
    NotReady,
    /// The switch is forbidden (e.g. a virtual SIM is bound to the major
    /// slot).
    Veto(String),
}

pub trait OperatorPolicy: Send {
    fn check(
        &self,
        current: &[RadioAccessFamily],
        rafs: &[RadioAccessFamilyRequest],
        new_major: usize,
    ) -> OperatorVerdict;
}

/// Open-market policy: every switch proceeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl OperatorPolicy for AllowAll {
    fn check(
        &self,
        _current: &[RadioAccessFamily],
        _rafs: &[RadioAccessFamilyRequest],
        _new_major: usize,
    ) -> OperatorVerdict {
        OperatorVerdict::Proceed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(modem: usize, family: RadioAccessFamily) -> RadioAccessFamilyRequest {
        RadioAccessFamilyRequest::new(modem, family)
    }

    #[test]
    fn single_major_is_found() {
        let policy = MajorPhonePolicy::default();
        let rafs = [
            req(0, RadioAccessFamily::GSM_FAMILY),
            req(1, RadioAccessFamily::LTE | RadioAccessFamily::WCDMA_FAMILY),
        ];
        assert_eq!(policy.requested_major(&rafs), Ok(1));
    }

    #[test]
    fn two_majors_are_rejected() {
        let policy = MajorPhonePolicy::default();
        let rafs = [req(0, RadioAccessFamily::LTE), req(1, RadioAccessFamily::LTE)];
        assert_eq!(
            policy.requested_major(&rafs),
            Err(SwitchError::MultipleMajorPhones { first: 0, second: 1 })
        );
    }

    #[test]
    fn missing_major_is_rejected() {
        let policy = MajorPhonePolicy::new(RadioAccessFamily::UMTS);
        let rafs = [req(0, RadioAccessFamily::GSM), req(1, RadioAccessFamily::LTE)];
        assert_eq!(policy.requested_major(&rafs), Err(SwitchError::NoMajorPhone));
    }

    #[test]
    fn current_major_scans_families() {
        let policy = MajorPhonePolicy::default();
        let families = [RadioAccessFamily::GSM, RadioAccessFamily::LTE];
        assert_eq!(policy.current_major(&families), Some(1));
        assert_eq!(policy.current_major(&[RadioAccessFamily::GSM]), None);
    }
}
