//! Expenditure documents and the state machine they move through.
//!
//! Every kind shares one state machine:
//!
//! ```text
//! draft ──submit──▶ submitted ──validate──▶ validated
//!                     │    ▲  ╲──reject───▶ rejected
//!                  defer  resubmit
//!                     ▼    │
//!                    deferred
//! ```
//!
//! plus `cancel` from any non-terminal state. What differs per kind is the
//! guard run on validation and the state in which the reference is minted.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine, budget_movements::MovementKind, reference::ReferenceKind,
    util::parse_uuid,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Note,
    Commitment,
    Liquidation,
    PaymentOrder,
    Settlement,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 5] = [
        Self::Note,
        Self::Commitment,
        Self::Liquidation,
        Self::PaymentOrder,
        Self::Settlement,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Commitment => "commitment",
            Self::Liquidation => "liquidation",
            Self::PaymentOrder => "payment_order",
            Self::Settlement => "settlement",
        }
    }

    pub fn reference_kind(self) -> ReferenceKind {
        match self {
            Self::Note => ReferenceKind::Note,
            Self::Commitment => ReferenceKind::Commitment,
            Self::Liquidation => ReferenceKind::Liquidation,
            Self::PaymentOrder => ReferenceKind::PaymentOrder,
            Self::Settlement => ReferenceKind::Settlement,
        }
    }

    /// The kind this one consumes in the expenditure chain.
    pub fn parent_kind(self) -> Option<DocumentKind> {
        match self {
            Self::Note => None,
            Self::Commitment => Some(Self::Note),
            Self::Liquidation => Some(Self::Commitment),
            Self::PaymentOrder => Some(Self::Liquidation),
            Self::Settlement => Some(Self::PaymentOrder),
        }
    }

    /// A commitment may be raised without a note; later steps always hang
    /// off their predecessor.
    pub fn requires_parent(self) -> bool {
        matches!(
            self,
            Self::Liquidation | Self::PaymentOrder | Self::Settlement
        )
    }

    /// The first state in which the document is official and carries its
    /// permanent reference.
    pub fn official_status(self) -> DocumentStatus {
        match self {
            Self::Settlement => DocumentStatus::Validated,
            _ => DocumentStatus::Submitted,
        }
    }

    /// Whether a document in `status` has passed its official state and so
    /// must carry a reference.
    pub fn is_official(self, status: DocumentStatus) -> bool {
        match self.official_status() {
            DocumentStatus::Validated => status == DocumentStatus::Validated,
            _ => matches!(
                status,
                DocumentStatus::Submitted
                    | DocumentStatus::Deferred
                    | DocumentStatus::Validated
                    | DocumentStatus::Rejected
            ),
        }
    }

    /// Ledger counter moved when a document of this kind is validated.
    pub fn movement_on_validation(self) -> Option<MovementKind> {
        match self {
            Self::Note => None,
            Self::Commitment => Some(MovementKind::Reserve),
            Self::Liquidation => Some(MovementKind::Liquidate),
            Self::PaymentOrder => Some(MovementKind::Order),
            Self::Settlement => Some(MovementKind::Pay),
        }
    }
}

impl TryFrom<&str> for DocumentKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == value)
            .ok_or_else(|| EngineError::InvalidInput(format!("invalid document kind: {value}")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Submitted,
    Validated,
    Rejected,
    Deferred,
    Cancelled,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Validated => "validated",
            Self::Rejected => "rejected",
            Self::Deferred => "deferred",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Validated | Self::Rejected | Self::Cancelled)
    }
}

impl TryFrom<&str> for DocumentStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "draft" => Ok(Self::Draft),
            "submitted" => Ok(Self::Submitted),
            "validated" => Ok(Self::Validated),
            "rejected" => Ok(Self::Rejected),
            "deferred" => Ok(Self::Deferred),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(EngineError::InvalidInput(format!(
                "invalid document status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Submit,
    Validate,
    Reject,
    Defer,
    Resubmit,
    Cancel,
}

impl WorkflowAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Validate => "validate",
            Self::Reject => "reject",
            Self::Defer => "defer",
            Self::Resubmit => "resubmit",
            Self::Cancel => "cancel",
        }
    }

    pub fn requires_justification(self) -> bool {
        matches!(self, Self::Reject | Self::Defer)
    }

    /// Resolves the edge taken from `from`, or refuses it.
    pub fn target(self, from: DocumentStatus) -> ResultEngine<DocumentStatus> {
        use DocumentStatus::*;

        let to = match (self, from) {
            (Self::Submit, Draft) => Submitted,
            (Self::Validate, Submitted) => Validated,
            (Self::Reject, Submitted) => Rejected,
            (Self::Defer, Submitted) => Deferred,
            (Self::Resubmit, Deferred) => Submitted,
            (Self::Cancel, Draft | Submitted | Deferred) => Cancelled,
            (action, from) => {
                return Err(EngineError::InvalidTransition(format!(
                    "cannot {} a {} document",
                    action.as_str(),
                    from.as_str()
                )));
            }
        };
        Ok(to)
    }
}

impl TryFrom<&str> for WorkflowAction {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "submit" => Ok(Self::Submit),
            "validate" => Ok(Self::Validate),
            "reject" => Ok(Self::Reject),
            "defer" => Ok(Self::Defer),
            "resubmit" => Ok(Self::Resubmit),
            "cancel" => Ok(Self::Cancel),
            other => Err(EngineError::InvalidInput(format!(
                "invalid workflow action: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub kind: DocumentKind,
    pub exercise: i32,
    pub reference: Option<String>,
    pub budget_line_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub object: String,
    pub amount: i64,
    /// Funds this document currently holds on its line.
    pub reserved_amount: i64,
    pub status: DocumentStatus,
    pub deferral_deadline: Option<DateTime<Utc>>,
    pub deferral_condition: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// How much validated children may consume. A validated commitment
    /// shrinks as it is disengaged.
    pub fn ceiling(&self) -> i64 {
        match (self.kind, self.status) {
            (DocumentKind::Commitment, DocumentStatus::Validated) => self.reserved_amount,
            _ => self.amount,
        }
    }
}

/// Input for [`Engine::create_document`](crate::Engine::create_document).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewDocument {
    pub kind: DocumentKind,
    pub exercise: i32,
    pub object: String,
    pub amount: i64,
    pub budget_line_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub kind: String,
    pub exercise: i32,
    #[sea_orm(unique)]
    pub reference: Option<String>,
    pub budget_line_id: Option<String>,
    pub parent_id: Option<String>,
    pub object: String,
    pub amount: i64,
    pub reserved_amount: i64,
    pub status: String,
    pub deferral_deadline: Option<DateTimeUtc>,
    pub deferral_condition: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::workflow_transitions::Entity")]
    Transitions,
}

impl Related<super::workflow_transitions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transitions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Document> for ActiveModel {
    fn from(doc: &Document) -> Self {
        Self {
            id: ActiveValue::Set(doc.id.to_string()),
            kind: ActiveValue::Set(doc.kind.as_str().to_string()),
            exercise: ActiveValue::Set(doc.exercise),
            reference: ActiveValue::Set(doc.reference.clone()),
            budget_line_id: ActiveValue::Set(doc.budget_line_id.map(|id| id.to_string())),
            parent_id: ActiveValue::Set(doc.parent_id.map(|id| id.to_string())),
            object: ActiveValue::Set(doc.object.clone()),
            amount: ActiveValue::Set(doc.amount),
            reserved_amount: ActiveValue::Set(doc.reserved_amount),
            status: ActiveValue::Set(doc.status.as_str().to_string()),
            deferral_deadline: ActiveValue::Set(doc.deferral_deadline),
            deferral_condition: ActiveValue::Set(doc.deferral_condition.clone()),
            rejection_reason: ActiveValue::Set(doc.rejection_reason.clone()),
            created_by: ActiveValue::Set(doc.created_by.clone()),
            created_at: ActiveValue::Set(doc.created_at),
            updated_at: ActiveValue::Set(doc.updated_at),
        }
    }
}

impl TryFrom<Model> for Document {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "document")?,
            kind: DocumentKind::try_from(model.kind.as_str())?,
            exercise: model.exercise,
            reference: model.reference,
            budget_line_id: model
                .budget_line_id
                .as_deref()
                .map(|id| parse_uuid(id, "budget_line"))
                .transpose()?,
            parent_id: model
                .parent_id
                .as_deref()
                .map(|id| parse_uuid(id, "document"))
                .transpose()?,
            object: model.object,
            amount: model.amount,
            reserved_amount: model.reserved_amount,
            status: DocumentStatus::try_from(model.status.as_str())?,
            deferral_deadline: model.deferral_deadline,
            deferral_condition: model.deferral_condition,
            rejection_reason: model.rejection_reason,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
