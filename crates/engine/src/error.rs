//! The module contains the errors the engine can return.
//!
//! Business-rule failures ([`InsufficientFunds`], [`InvalidTransition`],
//! [`Unauthorized`], [`MissingJustification`]) are final: retrying the same
//! call yields the same answer. Contention failures
//! ([`SequenceContention`], [`LedgerContention`]) are transient and are
//! already retried inside the engine before they reach the caller.
//!
//!  [`InsufficientFunds`]: EngineError::InsufficientFunds
//!  [`InvalidTransition`]: EngineError::InvalidTransition
//!  [`Unauthorized`]: EngineError::Unauthorized
//!  [`MissingJustification`]: EngineError::MissingJustification
//!  [`SequenceContention`]: EngineError::SequenceContention
//!  [`LedgerContention`]: EngineError::LedgerContention
use sea_orm::DbErr;
use thiserror::Error;

/// Which retry class a transient failure belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Contended {
    Sequence,
    Ledger,
}

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(
        "Insufficient funds on line {line_id}: requested {requested}, available {available} (shortfall {shortfall})"
    )]
    InsufficientFunds {
        line_id: String,
        requested: i64,
        available: i64,
        shortfall: i64,
    },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Missing justification: {0}")]
    MissingJustification(String),
    #[error("Sequence contention: {0}")]
    SequenceContention(String),
    #[error("Ledger contention: {0}")]
    LedgerContention(String),
    #[error("Sequence exhausted: {0}")]
    SequenceExhausted(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    /// Returns `true` for errors produced by a business rule. These are
    /// answers, not faults, and must not be retried.
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. }
                | Self::InvalidTransition(_)
                | Self::Unauthorized(_)
                | Self::MissingJustification(_)
        )
    }

    /// Returns `true` when the whole operation can safely be tried again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SequenceContention(_) | Self::LedgerContention(_) => true,
            Self::Database(err) => is_lock_conflict(err),
            _ => false,
        }
    }

    /// Re-labels a transient failure with the contention class of the
    /// operation that observed it.
    pub(crate) fn into_contention(self, kind: Contended) -> Self {
        let detail = match self {
            Self::SequenceContention(msg) | Self::LedgerContention(msg) => msg,
            other => other.to_string(),
        };
        match kind {
            Contended::Sequence => Self::SequenceContention(detail),
            Contended::Ledger => Self::LedgerContention(detail),
        }
    }
}

/// Lock-wait failures reported by the store. SQLite reports them as
/// `SQLITE_BUSY`/`SQLITE_LOCKED`; the serialization wording covers other
/// backends sharing the same code path.
fn is_lock_conflict(err: &DbErr) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("database is locked")
        || msg.contains("database table is locked")
        || msg.contains("(code: 5)")
        || msg.contains("(code: 6)")
        || msg.contains("could not serialize")
        || msg.contains("deadlock detected")
        || msg.contains("lock timeout")
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::InsufficientFunds {
                    line_id: a,
                    requested: ra,
                    available: aa,
                    shortfall: sa,
                },
                Self::InsufficientFunds {
                    line_id: b,
                    requested: rb,
                    available: ab,
                    shortfall: sb,
                },
            ) => a == b && ra == rb && aa == ab && sa == sb,
            (Self::InvalidTransition(a), Self::InvalidTransition(b)) => a == b,
            (Self::Unauthorized(a), Self::Unauthorized(b)) => a == b,
            (Self::MissingJustification(a), Self::MissingJustification(b)) => a == b,
            (Self::SequenceContention(a), Self::SequenceContention(b)) => a == b,
            (Self::LedgerContention(a), Self::LedgerContention(b)) => a == b,
            (Self::SequenceExhausted(a), Self::SequenceExhausted(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidInput(a), Self::InvalidInput(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
