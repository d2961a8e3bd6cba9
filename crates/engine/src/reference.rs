//! Document references.
//!
//! A reference is nine ASCII digits: one kind digit, a two-digit month, a
//! two-digit year and a four-digit zero-padded sequence. `2012600042` is not a
//! reference (ten digits); `201260042` is the 42nd commitment of January 2026.
//!
//! [`format`] and [`parse`] are pure. `parse` never fails: legacy or foreign
//! strings come back as [`ParsedReference::Invalid`].

use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine};

pub const MAX_SEQUENCE: i64 = 9_999;
const REFERENCE_LEN: usize = 9;

/// Everything that draws numbers from the sequence allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Note,
    Commitment,
    Liquidation,
    PaymentOrder,
    Settlement,
    CreditTransfer,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 6] = [
        Self::Note,
        Self::Commitment,
        Self::Liquidation,
        Self::PaymentOrder,
        Self::Settlement,
        Self::CreditTransfer,
    ];

    pub fn digit(self) -> u8 {
        match self {
            Self::Note => 1,
            Self::Commitment => 2,
            Self::Liquidation => 3,
            Self::PaymentOrder => 4,
            Self::Settlement => 5,
            Self::CreditTransfer => 6,
        }
    }

    pub fn from_digit(digit: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.digit() == digit)
    }

    /// Name used inside scope keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Note => "NOTE",
            Self::Commitment => "COMMITMENT",
            Self::Liquidation => "LIQUIDATION",
            Self::PaymentOrder => "PAYMENT_ORDER",
            Self::Settlement => "SETTLEMENT",
            Self::CreditTransfer => "CREDIT_TRANSFER",
        }
    }
}

impl TryFrom<&str> for ReferenceKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| EngineError::InvalidInput(format!("invalid reference kind: {value}")))
    }
}

/// A calendar month, the granularity of reference numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> ResultEngine<Self> {
        if !(1..=12).contains(&month) {
            return Err(EngineError::InvalidInput(format!(
                "invalid period month: {month}"
            )));
        }
        Ok(Self { year, month })
    }

    pub fn of(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    /// The month of `at`, pinned inside `exercise`. Work dated after the
    /// exercise year files under December, work dated before it under
    /// January.
    pub fn within_exercise(exercise: i32, at: DateTime<Utc>) -> Self {
        let month = match at.year().cmp(&exercise) {
            std::cmp::Ordering::Less => 1,
            std::cmp::Ordering::Equal => at.month(),
            std::cmp::Ordering::Greater => 12,
        };
        Self {
            year: exercise,
            month,
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidInput(format!("invalid period: {s}"));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Period::new(year, month)
    }
}

/// One independent sequence counter: `"{KIND}|{YYYY-MM}"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey {
    pub kind: ReferenceKind,
    pub period: Period,
}

impl ScopeKey {
    pub fn new(kind: ReferenceKind, period: Period) -> Self {
        Self { kind, period }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.kind.as_str(), self.period)
    }
}

impl FromStr for ScopeKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, period) = s
            .split_once('|')
            .ok_or_else(|| EngineError::InvalidInput(format!("invalid scope key: {s}")))?;
        Ok(Self {
            kind: ReferenceKind::try_from(kind)?,
            period: period.parse()?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferenceParts {
    pub kind: ReferenceKind,
    pub period: Period,
    pub sequence: i64,
}

impl ReferenceParts {
    pub fn scope(&self) -> ScopeKey {
        ScopeKey::new(self.kind, self.period)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParsedReference {
    Valid(ReferenceParts),
    Invalid,
}

impl ParsedReference {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn parts(self) -> Option<ReferenceParts> {
        match self {
            Self::Valid(parts) => Some(parts),
            Self::Invalid => None,
        }
    }
}

/// Encodes `(kind, period, sequence)` as a reference.
///
/// Years are stored on two digits, so only 2000..=2099 can be represented.
/// A sequence above [`MAX_SEQUENCE`] means the month's numbering space is
/// used up.
pub fn format(kind: ReferenceKind, period: Period, sequence: i64) -> ResultEngine<String> {
    if !(2000..=2099).contains(&period.year) {
        return Err(EngineError::InvalidInput(format!(
            "period {period} cannot be encoded in a reference"
        )));
    }
    if sequence < 1 {
        return Err(EngineError::InvalidInput(format!(
            "invalid sequence: {sequence}"
        )));
    }
    if sequence > MAX_SEQUENCE {
        return Err(EngineError::SequenceExhausted(format!(
            "{} exceeded {MAX_SEQUENCE}",
            ScopeKey::new(kind, period)
        )));
    }
    Ok(format!(
        "{}{:02}{:02}{:04}",
        kind.digit(),
        period.month,
        period.year % 100,
        sequence
    ))
}

/// Decodes a reference. Never fails.
pub fn parse(reference: &str) -> ParsedReference {
    let raw = reference.trim();
    if raw.len() != REFERENCE_LEN || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return ParsedReference::Invalid;
    }

    let field = |range: std::ops::Range<usize>| raw[range].parse::<u32>().ok();
    let (Some(kind), Some(month), Some(year), Some(sequence)) =
        (field(0..1), field(1..3), field(3..5), field(5..9))
    else {
        return ParsedReference::Invalid;
    };

    let Some(kind) = u8::try_from(kind).ok().and_then(ReferenceKind::from_digit) else {
        return ParsedReference::Invalid;
    };
    let Ok(period) = Period::new(2000 + year as i32, month) else {
        return ParsedReference::Invalid;
    };
    if sequence == 0 {
        return ParsedReference::Invalid;
    }

    ParsedReference::Valid(ReferenceParts {
        kind,
        period,
        sequence: i64::from(sequence),
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn jan_2026() -> Period {
        Period::new(2026, 1).unwrap()
    }

    #[test]
    fn formats_fixed_width_fields() {
        assert_eq!(
            format(ReferenceKind::Commitment, jan_2026(), 42).unwrap(),
            "201260042"
        );
        assert_eq!(
            format(ReferenceKind::Settlement, Period::new(2031, 12).unwrap(), 9_999).unwrap(),
            "512319999"
        );
    }

    #[test]
    fn parse_recovers_what_format_produced() {
        for kind in ReferenceKind::ALL {
            for (year, month, seq) in [(2000, 1, 1), (2026, 7, 130), (2099, 12, 9_999)] {
                let period = Period::new(year, month).unwrap();
                let reference = format(kind, period, seq).unwrap();
                assert_eq!(
                    parse(&reference),
                    ParsedReference::Valid(ReferenceParts {
                        kind,
                        period,
                        sequence: seq
                    })
                );
            }
        }
    }

    #[test]
    fn parse_is_total_on_garbage() {
        for raw in [
            "",
            "ABC",
            "20126004",
            "2012600042",
            "201360042",
            "200026001",
            "901260042",
            "001260042",
            "201260000",
            "2O1260042",
            "ENG-2026-0042",
            "２01260042",
        ] {
            assert!(!parse(raw).is_valid(), "{raw:?} should be invalid");
        }
    }

    #[test]
    fn format_rejects_out_of_range_inputs() {
        assert!(matches!(
            format(ReferenceKind::Note, jan_2026(), 10_000),
            Err(EngineError::SequenceExhausted(_))
        ));
        assert!(format(ReferenceKind::Note, jan_2026(), 0).is_err());
        assert!(format(ReferenceKind::Note, Period::new(1999, 1).unwrap(), 1).is_err());
    }

    #[test]
    fn scope_key_round_trips_through_text() {
        let key = ScopeKey::new(ReferenceKind::Commitment, jan_2026());
        assert_eq!(key.to_string(), "COMMITMENT|2026-01");
        assert_eq!("COMMITMENT|2026-01".parse::<ScopeKey>().unwrap(), key);
        assert!("COMMITMENT-2026-01".parse::<ScopeKey>().is_err());
        assert!("COMMITMENT|2026-13".parse::<ScopeKey>().is_err());
    }

    #[test]
    fn period_follows_the_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 0).unwrap();
        assert_eq!(Period::of(at), Period::new(2026, 3).unwrap());
        assert_eq!(Period::of(at).to_string(), "2026-03");
    }

    #[test]
    fn exercise_pins_the_year() {
        let closing = Utc.with_ymd_and_hms(2027, 1, 5, 9, 0, 0).unwrap();
        assert_eq!(
            Period::within_exercise(2026, closing),
            Period::new(2026, 12).unwrap()
        );
        let early = Utc.with_ymd_and_hms(2025, 11, 20, 9, 0, 0).unwrap();
        assert_eq!(
            Period::within_exercise(2026, early),
            Period::new(2026, 1).unwrap()
        );
        let inside = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(
            Period::within_exercise(2026, inside),
            Period::new(2026, 6).unwrap()
        );
    }
}
