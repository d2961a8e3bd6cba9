//! Immutable audit trail of state-changing operations.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    /// `budget_line`, `document`, `credit_transfer`, `sequence`, `alert`, ...
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor_id: String,
    /// Delegator the actor acted for, if any.
    pub on_behalf_of: Option<String>,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor_id: String,
    pub on_behalf_of: Option<String>,
    pub payload: String,
    pub recorded_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for AuditEntry {
    fn from(model: Model) -> Self {
        let payload = serde_json::from_str(&model.payload)
            .unwrap_or(serde_json::Value::String(model.payload));
        Self {
            id: model.id,
            entity_type: model.entity_type,
            entity_id: model.entity_id,
            action: model.action,
            actor_id: model.actor_id,
            on_behalf_of: model.on_behalf_of,
            payload,
            recorded_at: model.recorded_at,
        }
    }
}
