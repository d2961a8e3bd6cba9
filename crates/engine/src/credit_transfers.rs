//! Credit transfers between budget lines.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// Moves allocation from a source line to a destination line.
    Transfer,
    /// Raises the destination's allocation without a source line.
    Adjustment,
}

impl TransferKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::Adjustment => "adjustment",
        }
    }
}

impl TryFrom<&str> for TransferKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "transfer" => Ok(Self::Transfer),
            "adjustment" => Ok(Self::Adjustment),
            other => Err(EngineError::InvalidInput(format!(
                "invalid transfer kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Approved,
    Rejected,
}

impl TransferStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl TryFrom<&str> for TransferStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(EngineError::InvalidInput(format!(
                "invalid transfer status: {other}"
            ))),
        }
    }
}

/// Availability of one side before and after approval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideSnapshot {
    pub available_before: i64,
    pub available_after: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransfer {
    pub id: Uuid,
    pub code: String,
    pub exercise: i32,
    pub kind: TransferKind,
    pub from_line_id: Option<Uuid>,
    pub to_line_id: Uuid,
    pub amount: i64,
    pub justification: String,
    pub status: TransferStatus,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub from_snapshot: Option<SideSnapshot>,
    pub to_snapshot: Option<SideSnapshot>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "credit_transfers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub code: String,
    pub exercise: i32,
    pub kind: String,
    pub from_line_id: Option<String>,
    pub to_line_id: String,
    pub amount: i64,
    pub justification: String,
    pub status: String,
    pub requested_by: String,
    pub requested_at: DateTimeUtc,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTimeUtc>,
    pub rejection_reason: Option<String>,
    pub from_available_before: Option<i64>,
    pub from_available_after: Option<i64>,
    pub to_available_before: Option<i64>,
    pub to_available_after: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&CreditTransfer> for ActiveModel {
    fn from(value: &CreditTransfer) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            code: ActiveValue::Set(value.code.clone()),
            exercise: ActiveValue::Set(value.exercise),
            kind: ActiveValue::Set(value.kind.as_str().to_string()),
            from_line_id: ActiveValue::Set(value.from_line_id.map(|id| id.to_string())),
            to_line_id: ActiveValue::Set(value.to_line_id.to_string()),
            amount: ActiveValue::Set(value.amount),
            justification: ActiveValue::Set(value.justification.clone()),
            status: ActiveValue::Set(value.status.as_str().to_string()),
            requested_by: ActiveValue::Set(value.requested_by.clone()),
            requested_at: ActiveValue::Set(value.requested_at),
            decided_by: ActiveValue::Set(value.decided_by.clone()),
            decided_at: ActiveValue::Set(value.decided_at),
            rejection_reason: ActiveValue::Set(value.rejection_reason.clone()),
            from_available_before: ActiveValue::Set(
                value.from_snapshot.map(|s| s.available_before),
            ),
            from_available_after: ActiveValue::Set(value.from_snapshot.map(|s| s.available_after)),
            to_available_before: ActiveValue::Set(value.to_snapshot.map(|s| s.available_before)),
            to_available_after: ActiveValue::Set(value.to_snapshot.map(|s| s.available_after)),
        }
    }
}

fn snapshot(before: Option<i64>, after: Option<i64>) -> Option<SideSnapshot> {
    Some(SideSnapshot {
        available_before: before?,
        available_after: after?,
    })
}

impl TryFrom<Model> for CreditTransfer {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "credit_transfer")?,
            code: model.code,
            exercise: model.exercise,
            kind: TransferKind::try_from(model.kind.as_str())?,
            from_line_id: model
                .from_line_id
                .as_deref()
                .map(|id| parse_uuid(id, "budget_line"))
                .transpose()?,
            to_line_id: parse_uuid(&model.to_line_id, "budget_line")?,
            amount: model.amount,
            justification: model.justification,
            status: TransferStatus::try_from(model.status.as_str())?,
            requested_by: model.requested_by,
            requested_at: model.requested_at,
            decided_by: model.decided_by,
            decided_at: model.decided_at,
            rejection_reason: model.rejection_reason,
            from_snapshot: snapshot(model.from_available_before, model.from_available_after),
            to_snapshot: snapshot(model.to_available_before, model.to_available_after),
        })
    }
}
