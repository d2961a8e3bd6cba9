//! Budget availability ledger and expenditure workflow core.
//!
//! Everything goes through [`Engine`], which owns the database connection
//! and runs each public operation inside a single transaction.

pub use alert_rules::AlertRule;
pub use alerts::{AlertRecord, Severity};
pub use audit_entries::AuditEntry;
pub use authority::{ActingAuthority, ActionScope, Actor, Capability, Role};
pub use budget_lines::{BudgetLine, Classification, LineAvailability, LineStatus};
pub use budget_movements::{Movement, MovementKind};
pub use credit_transfers::{CreditTransfer, SideSnapshot, TransferKind, TransferStatus};
pub use delegations::Delegation;
pub use documents::{Document, DocumentKind, DocumentStatus, NewDocument, WorkflowAction};
pub use error::{Contended, EngineError};
pub use ops::{
    AlertFilter, AlertSummary, DocumentFilter, Engine, EngineBuilder, EngineSettings,
    NewAlertRule, NewBudgetLine, NewDelegation, NewTransfer, OverBudgetLine, ResyncReport,
    TransitionOutcome,
};
pub use reference::{ParsedReference, Period, ReferenceKind, ReferenceParts, ScopeKey};
pub use sequence_counters::SequenceCounter;
pub use workflow_transitions::TransitionRecord;

mod actor_roles;
mod alert_rules;
mod alerts;
mod audit_entries;
mod authority;
mod budget_lines;
mod budget_movements;
mod credit_transfers;
mod delegations;
mod documents;
mod error;
mod ops;
pub mod reference;
mod sequence_counters;
mod util;
mod workflow_transitions;

type ResultEngine<T> = Result<T, EngineError>;

/// Result of attaching a permanent reference to a document.
///
/// A document gets at most one reference. Asking again returns the one it
/// already has, which callers treat as success.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "outcome", content = "reference", rename_all = "snake_case")]
pub enum ReferenceAssignment {
    Minted(String),
    AlreadyAssigned(String),
}

impl ReferenceAssignment {
    pub fn reference(&self) -> &str {
        match self {
            Self::Minted(reference) | Self::AlreadyAssigned(reference) => reference,
        }
    }

    pub fn was_minted(&self) -> bool {
        matches!(self, Self::Minted(_))
    }
}
