//! Append-only history of document transitions.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    ActionScope, DocumentStatus, EngineError, WorkflowAction,
    authority::{ActingAuthority, Role},
    util::parse_uuid,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Commit order. Records of one document are totally ordered by it.
    pub id: i64,
    pub document_id: Uuid,
    pub action: WorkflowAction,
    pub from_status: DocumentStatus,
    pub to_status: DocumentStatus,
    pub actor_id: String,
    pub authority: ActingAuthority,
    pub justification: Option<String>,
    pub resume_by: Option<DateTime<Utc>>,
    pub resume_condition: Option<String>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "workflow_transitions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub document_id: String,
    pub action: String,
    pub from_status: String,
    pub to_status: String,
    pub actor_id: String,
    pub authority: String,
    pub role: String,
    pub scope: String,
    pub delegator_id: Option<String>,
    pub delegation_id: Option<String>,
    pub justification: Option<String>,
    pub resume_by: Option<DateTimeUtc>,
    pub resume_condition: Option<String>,
    pub reference: Option<String>,
    pub occurred_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::documents::Entity",
        from = "Column::DocumentId",
        to = "super::documents::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Documents,
}

impl Related<super::documents::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Documents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for TransitionRecord {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let role = Role::try_from(model.role.as_str())?;
        let authority = match (model.authority.as_str(), model.delegator_id, model.delegation_id)
        {
            ("direct", _, _) => ActingAuthority::Direct { role },
            ("delegated", Some(delegator_id), Some(delegation_id)) => ActingAuthority::Delegated {
                role,
                delegator_id,
                delegation_id: parse_uuid(&delegation_id, "delegation")?,
                scope: ActionScope::try_from(model.scope.as_str())?,
            },
            (other, _, _) => {
                return Err(EngineError::InvalidInput(format!(
                    "invalid transition authority: {other}"
                )));
            }
        };

        Ok(Self {
            id: model.id,
            document_id: parse_uuid(&model.document_id, "document")?,
            action: WorkflowAction::try_from(model.action.as_str())?,
            from_status: DocumentStatus::try_from(model.from_status.as_str())?,
            to_status: DocumentStatus::try_from(model.to_status.as_str())?,
            actor_id: model.actor_id,
            authority,
            justification: model.justification,
            resume_by: model.resume_by,
            resume_condition: model.resume_condition,
            reference: model.reference,
            occurred_at: model.occurred_at,
        })
    }
}
