//! Consumption thresholds watched by the alert monitor.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    /// Consumption ratio, in basis points, at which the rule fires.
    pub threshold_bps: i64,
    /// `None` watches every line.
    pub line_id: Option<Uuid>,
    pub description: Option<String>,
    pub active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl AlertRule {
    pub fn covers(&self, line_id: Uuid) -> bool {
        self.active && self.line_id.is_none_or(|id| id == line_id)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub threshold_bps: i64,
    pub line_id: Option<String>,
    pub description: Option<String>,
    pub active: bool,
    pub created_by: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::alerts::Entity")]
    Alerts,
}

impl Related<super::alerts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Alerts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&AlertRule> for ActiveModel {
    fn from(rule: &AlertRule) -> Self {
        Self {
            id: ActiveValue::Set(rule.id.to_string()),
            threshold_bps: ActiveValue::Set(rule.threshold_bps),
            line_id: ActiveValue::Set(rule.line_id.map(|id| id.to_string())),
            description: ActiveValue::Set(rule.description.clone()),
            active: ActiveValue::Set(rule.active),
            created_by: ActiveValue::Set(rule.created_by.clone()),
            created_at: ActiveValue::Set(rule.created_at),
        }
    }
}

impl TryFrom<Model> for AlertRule {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "alert_rule")?,
            threshold_bps: model.threshold_bps,
            line_id: model
                .line_id
                .as_deref()
                .map(|id| parse_uuid(id, "budget_line"))
                .transpose()?,
            description: model.description,
            active: model.active,
            created_by: model.created_by,
            created_at: model.created_at,
        })
    }
}
