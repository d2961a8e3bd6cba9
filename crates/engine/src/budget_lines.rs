//! The module contains `BudgetLine`, the unit of allocation the ledger
//! guards, and its read-only availability projection.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine,
    util::{MAX_AMOUNT, parse_uuid},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Draft,
    Submitted,
    Validated,
    Rejected,
}

impl LineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Validated => "validated",
            Self::Rejected => "rejected",
        }
    }
}

impl TryFrom<&str> for LineStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "draft" => Ok(Self::Draft),
            "submitted" => Ok(Self::Submitted),
            "validated" => Ok(Self::Validated),
            "rejected" => Ok(Self::Rejected),
            other => Err(EngineError::InvalidInput(format!(
                "invalid budget line status: {other}"
            ))),
        }
    }
}

/// Classification attributes. They are foreign keys owned by other systems;
/// the engine stores them verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub unit_id: Option<String>,
    pub objective_id: Option<String>,
    pub nature_code: Option<String>,
}

/// A budget line.
///
/// All amounts are integer minor currency units. The only derived figure the
/// engine relies on is
///
/// `available = initial_allocation + transfers_in - transfers_out - committed`
///
/// which is never stored: it is recomputed from the counters on every read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLine {
    pub id: Uuid,
    pub code: String,
    pub label: String,
    pub exercise: i32,
    pub classification: Classification,
    pub initial_allocation: i64,
    pub transfers_in: i64,
    pub transfers_out: i64,
    pub committed: i64,
    pub liquidated: i64,
    pub ordered: i64,
    pub paid: i64,
    pub status: LineStatus,
    pub active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl BudgetLine {
    pub fn new(
        code: String,
        label: String,
        exercise: i32,
        classification: Classification,
        initial_allocation: i64,
        created_by: String,
        created_at: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if !(0..=MAX_AMOUNT).contains(&initial_allocation) {
            return Err(EngineError::InvalidAmount(format!(
                "initial_allocation must be within 0..={MAX_AMOUNT}"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            code,
            label,
            exercise,
            classification,
            initial_allocation,
            transfers_in: 0,
            transfers_out: 0,
            committed: 0,
            liquidated: 0,
            ordered: 0,
            paid: 0,
            status: LineStatus::Draft,
            active: true,
            created_by,
            created_at,
        })
    }

    /// Allocation after transfers.
    pub fn current_allocation(&self) -> i64 {
        self.initial_allocation + self.transfers_in - self.transfers_out
    }

    pub fn available(&self) -> i64 {
        self.current_allocation() - self.committed
    }

    pub fn availability(&self) -> LineAvailability {
        LineAvailability {
            line_id: self.id,
            initial_allocation: self.initial_allocation,
            transfers_in: self.transfers_in,
            transfers_out: self.transfers_out,
            allocation: self.current_allocation(),
            committed: self.committed,
            liquidated: self.liquidated,
            ordered: self.ordered,
            paid: self.paid,
            available: self.available(),
        }
    }
}

/// Snapshot of a line's counters, as returned to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAvailability {
    pub line_id: Uuid,
    pub initial_allocation: i64,
    pub transfers_in: i64,
    pub transfers_out: i64,
    pub allocation: i64,
    pub committed: i64,
    pub liquidated: i64,
    pub ordered: i64,
    pub paid: i64,
    pub available: i64,
}

impl LineAvailability {
    /// `committed / allocation` in basis points, `None` without allocation.
    pub fn consumption_bps(&self) -> Option<i64> {
        ratio_bps(self.committed, self.allocation)
    }

    /// `paid / allocation` in basis points, `None` without allocation.
    pub fn execution_bps(&self) -> Option<i64> {
        ratio_bps(self.paid, self.allocation)
    }
}

/// Floor of `part / whole * 10_000`.
pub(crate) fn ratio_bps(part: i64, whole: i64) -> Option<i64> {
    if whole <= 0 {
        return None;
    }
    let bps = i128::from(part) * 10_000 / i128::from(whole);
    i64::try_from(bps).ok()
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "budget_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub code: String,
    pub label: String,
    pub exercise: i32,
    pub unit_id: Option<String>,
    pub objective_id: Option<String>,
    pub nature_code: Option<String>,
    pub initial_allocation: i64,
    pub transfers_in: i64,
    pub transfers_out: i64,
    pub committed: i64,
    pub liquidated: i64,
    pub ordered: i64,
    pub paid: i64,
    pub status: String,
    pub active: bool,
    pub created_by: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::budget_movements::Entity")]
    Movements,
}

impl Related<super::budget_movements::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Movements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&BudgetLine> for ActiveModel {
    fn from(line: &BudgetLine) -> Self {
        Self {
            id: ActiveValue::Set(line.id.to_string()),
            code: ActiveValue::Set(line.code.clone()),
            label: ActiveValue::Set(line.label.clone()),
            exercise: ActiveValue::Set(line.exercise),
            unit_id: ActiveValue::Set(line.classification.unit_id.clone()),
            objective_id: ActiveValue::Set(line.classification.objective_id.clone()),
            nature_code: ActiveValue::Set(line.classification.nature_code.clone()),
            initial_allocation: ActiveValue::Set(line.initial_allocation),
            transfers_in: ActiveValue::Set(line.transfers_in),
            transfers_out: ActiveValue::Set(line.transfers_out),
            committed: ActiveValue::Set(line.committed),
            liquidated: ActiveValue::Set(line.liquidated),
            ordered: ActiveValue::Set(line.ordered),
            paid: ActiveValue::Set(line.paid),
            status: ActiveValue::Set(line.status.as_str().to_string()),
            active: ActiveValue::Set(line.active),
            created_by: ActiveValue::Set(line.created_by.clone()),
            created_at: ActiveValue::Set(line.created_at),
        }
    }
}

impl TryFrom<Model> for BudgetLine {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "budget_line")?,
            code: model.code,
            label: model.label,
            exercise: model.exercise,
            classification: Classification {
                unit_id: model.unit_id,
                objective_id: model.objective_id,
                nature_code: model.nature_code,
            },
            initial_allocation: model.initial_allocation,
            transfers_in: model.transfers_in,
            transfers_out: model.transfers_out,
            committed: model.committed,
            liquidated: model.liquidated,
            ordered: model.ordered,
            paid: model.paid,
            status: LineStatus::try_from(model.status.as_str())?,
            active: model.active,
            created_by: model.created_by,
            created_at: model.created_at,
        })
    }
}
