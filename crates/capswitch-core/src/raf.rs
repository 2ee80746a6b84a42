//! # Radio Access Family
//!
//! A Radio Access Family (RAF) is the set of radio technologies a logical
//! modem is configured to serve, encoded as a bitmask with one bit per
//! radio technology:
//!
//! | Bit | Technology | Bit | Technology |
//! |-----|------------|-----|------------|
//! | 0   | unknown    | 9   | HSDPA      |
//! | 1   | GPRS       | 10  | HSUPA      |
//! | 2   | EDGE       | 11  | HSPA       |
//! | 3   | UMTS       | 12  | EVDO-B     |
//! | 4   | IS95A      | 13  | eHRPD      |
//! | 5   | IS95B      | 14  | LTE        |
//! | 6   | 1xRTT      | 15  | HSPA+      |
//! | 7   | EVDO-0     | 16  | GSM        |
//! | 8   | EVDO-A     | 17  | TD-SCDMA   |

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bitmask of radio technologies served by one modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RadioAccessFamily(u32);

impl RadioAccessFamily {
    pub const UNKNOWN: Self = Self(1 << 0);
    pub const GPRS: Self = Self(1 << 1);
    pub const EDGE: Self = Self(1 << 2);
    pub const UMTS: Self = Self(1 << 3);
    pub const IS95A: Self = Self(1 << 4);
    pub const IS95B: Self = Self(1 << 5);
    pub const ONE_X_RTT: Self = Self(1 << 6);
    pub const EVDO_0: Self = Self(1 << 7);
    pub const EVDO_A: Self = Self(1 << 8);
    pub const HSDPA: Self = Self(1 << 9);
    pub const HSUPA: Self = Self(1 << 10);
    pub const HSPA: Self = Self(1 << 11);
    pub const EVDO_B: Self = Self(1 << 12);
    pub const EHRPD: Self = Self(1 << 13);
    pub const LTE: Self = Self(1 << 14);
    pub const HSPAP: Self = Self(1 << 15);
    pub const GSM: Self = Self(1 << 16);
    pub const TD_SCDMA: Self = Self(1 << 17);

    /// 2G GSM family: GSM, GPRS and EDGE.
    pub const GSM_FAMILY: Self = Self(Self::GSM.0 | Self::GPRS.0 | Self::EDGE.0);
    /// HSPA family: HSDPA, HSUPA, HSPA and HSPA+.
    pub const HS_FAMILY: Self = Self(Self::HSDPA.0 | Self::HSUPA.0 | Self::HSPA.0 | Self::HSPAP.0);
    /// 3G WCDMA family: UMTS plus the HSPA family.
    pub const WCDMA_FAMILY: Self = Self(Self::HS_FAMILY.0 | Self::UMTS.0);

    const NAMES: &'static [(Self, &'static str)] = &[
        (Self::UNKNOWN, "unknown"),
        (Self::GPRS, "gprs"),
        (Self::EDGE, "edge"),
        (Self::UMTS, "umts"),
        (Self::IS95A, "is95a"),
        (Self::IS95B, "is95b"),
        (Self::ONE_X_RTT, "1xrtt"),
        (Self::EVDO_0, "evdo_0"),
        (Self::EVDO_A, "evdo_a"),
        (Self::HSDPA, "hsdpa"),
        (Self::HSUPA, "hsupa"),
        (Self::HSPA, "hspa"),
        (Self::EVDO_B, "evdo_b"),
        (Self::EHRPD, "ehrpd"),
        (Self::LTE, "lte"),
        (Self::HSPAP, "hspap"),
        (Self::GSM, "gsm"),
        (Self::TD_SCDMA, "td_scdma"),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Number of technologies in the set.
    pub const fn technology_count(self) -> u32 {
        self.0.count_ones()
    }
}

impl BitOr for RadioAccessFamily {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for RadioAccessFamily {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for RadioAccessFamily {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for RadioAccessFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "none");
        }
        let mut first = true;
        let mut known = 0u32;
        for (raf, name) in Self::NAMES {
            if self.contains(*raf) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
                known |= raf.0;
            }
        }
        let rest = self.0 & !known;
        if rest != 0 {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{rest:#x}")?;
        }
        Ok(())
    }
}

/// Parses a family name (`"lte"`, `"umts"`, `"gsm"`, `"wcdma"`, ...), a
/// `|`-separated list of names, or a decimal / `0x` hexadecimal bitmask.
impl FromStr for RadioAccessFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("empty radio access family".into());
        }
        if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            return u32::from_str_radix(hex, 16)
                .map(Self)
                .map_err(|e| format!("invalid bitmask {trimmed}: {e}"));
        }
        if let Ok(bits) = trimmed.parse::<u32>() {
            return Ok(Self(bits));
        }

        let mut out = Self(0);
        for part in trimmed.split('|') {
            let name = part.trim().to_ascii_lowercase();
            let raf = match name.as_str() {
                "gsm_family" | "2g" => Self::GSM_FAMILY,
                "hs_family" => Self::HS_FAMILY,
                "wcdma" | "wcdma_family" | "3g" => Self::WCDMA_FAMILY,
                "4g" => Self::LTE,
                other => Self::NAMES
                    .iter()
                    .find(|(_, n)| *n == other)
                    .map(|(raf, _)| *raf)
                    .ok_or_else(|| format!("unknown radio access family '{other}'"))?,
            };
            out |= raf;
        }
        Ok(out)
    }
}

/// One entry of a capability switch request: the family one modem should
/// serve after the switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioAccessFamilyRequest {
    pub modem_index: usize,
    pub family: RadioAccessFamily,
}

impl RadioAccessFamilyRequest {
    pub fn new(modem_index: usize, family: RadioAccessFamily) -> Self {
        Self {
            modem_index,
            family,
        }
    }
}

impl fmt::Display for RadioAccessFamilyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "modem {} → {}", self.modem_index, self.family)
    }
}
