//! Journal of every change applied to a budget line's counters.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{EngineError, util::parse_uuid};

/// What a movement does to a line. Each kind touches exactly one counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// `committed += amount`, bounded by `available`.
    Reserve,
    /// `committed -= amount`, bounded by `committed`.
    Release,
    /// `transfers_out += amount`, bounded by `available`.
    TransferOut,
    /// `transfers_in += amount`.
    TransferIn,
    /// `liquidated += amount`, bounded by `committed`.
    Liquidate,
    /// `ordered += amount`, bounded by `liquidated`.
    Order,
    /// `paid += amount`, bounded by `ordered`.
    Pay,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reserve => "reserve",
            Self::Release => "release",
            Self::TransferOut => "transfer_out",
            Self::TransferIn => "transfer_in",
            Self::Liquidate => "liquidate",
            Self::Order => "order",
            Self::Pay => "pay",
        }
    }

    /// Signed effect on `available`.
    pub fn available_delta(self, amount: i64) -> i64 {
        match self {
            Self::Reserve | Self::TransferOut => -amount,
            Self::Release | Self::TransferIn => amount,
            Self::Liquidate | Self::Order | Self::Pay => 0,
        }
    }
}

impl TryFrom<&str> for MovementKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "reserve" => Ok(Self::Reserve),
            "release" => Ok(Self::Release),
            "transfer_out" => Ok(Self::TransferOut),
            "transfer_in" => Ok(Self::TransferIn),
            "liquidate" => Ok(Self::Liquidate),
            "order" => Ok(Self::Order),
            "pay" => Ok(Self::Pay),
            other => Err(EngineError::InvalidInput(format!(
                "invalid movement kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: i64,
    pub line_id: Uuid,
    pub kind: MovementKind,
    pub amount: i64,
    pub available_before: i64,
    pub available_after: i64,
    pub source: String,
    pub actor_id: String,
    pub overridden: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "budget_movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub line_id: String,
    pub kind: String,
    pub amount: i64,
    pub available_before: i64,
    pub available_after: i64,
    pub source: String,
    pub actor_id: String,
    pub overridden: bool,
    pub occurred_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::budget_lines::Entity",
        from = "Column::LineId",
        to = "super::budget_lines::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    BudgetLines,
}

impl Related<super::budget_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BudgetLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Movement {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            line_id: parse_uuid(&model.line_id, "budget_line")?,
            kind: MovementKind::try_from(model.kind.as_str())?,
            amount: model.amount,
            available_before: model.available_before,
            available_after: model.available_after,
            source: model.source,
            actor_id: model.actor_id,
            overridden: model.overridden,
            occurred_at: model.occurred_at,
        })
    }
}
