//! Internal helpers for input validation and conversion.
//!
//! These utilities are **not** part of the public API. They centralize
//! validation and mapping logic so every operation rejects bad input the
//! same way.

use uuid::Uuid;

use crate::{EngineError, ResultEngine};

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value).map_err(|_| EngineError::InvalidInput(format!("invalid {label} id")))
}

/// Largest amount the engine accepts, in minor units. Line counters are sums
/// of such amounts and stay far from `i64` overflow.
pub(crate) const MAX_AMOUNT: i64 = 1_000_000_000_000_000;

/// Amounts moved through the ledger are strictly positive minor units, no
/// larger than [`MAX_AMOUNT`].
pub(crate) fn ensure_positive(amount: i64, label: &str) -> ResultEngine<()> {
    if amount <= 0 {
        return Err(EngineError::InvalidAmount(format!(
            "{label} must be > 0, got {amount}"
        )));
    }
    if amount > MAX_AMOUNT {
        return Err(EngineError::InvalidAmount(format!(
            "{label} must be <= {MAX_AMOUNT}, got {amount}"
        )));
    }
    Ok(())
}

pub(crate) fn normalize_required_text(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput(format!(
            "{label} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// A justification is present when it has at least one non-blank character.
pub(crate) fn require_justification(value: Option<&str>, what: &str) -> ResultEngine<String> {
    normalize_optional_text(value)
        .ok_or_else(|| EngineError::MissingJustification(format!("{what} requires a reason")))
}
