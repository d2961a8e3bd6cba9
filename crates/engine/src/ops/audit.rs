use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, prelude::*};
use serde_json::Value;

use crate::{Actor, AuditEntry, Contended, ResultEngine, audit_entries};

use super::{Engine, with_tx};

/// An audit entry about to be written.
pub(crate) struct AuditDraft<'a> {
    pub(crate) entity_type: &'a str,
    pub(crate) entity_id: String,
    pub(crate) action: &'a str,
    pub(crate) actor_id: &'a str,
    pub(crate) on_behalf_of: Option<&'a str>,
    pub(crate) payload: Value,
    pub(crate) at: DateTime<Utc>,
}

impl Engine {
    /// Appends an audit entry inside the caller's transaction.
    ///
    /// A failed write fails the caller: an unaudited change is never
    /// committed.
    pub(crate) async fn record_tx(
        &self,
        db_tx: &DatabaseTransaction,
        draft: AuditDraft<'_>,
    ) -> ResultEngine<()> {
        audit_entries::ActiveModel {
            id: ActiveValue::NotSet,
            entity_type: ActiveValue::Set(draft.entity_type.to_string()),
            entity_id: ActiveValue::Set(draft.entity_id),
            action: ActiveValue::Set(draft.action.to_string()),
            actor_id: ActiveValue::Set(draft.actor_id.to_string()),
            on_behalf_of: ActiveValue::Set(draft.on_behalf_of.map(ToString::to_string)),
            payload: ActiveValue::Set(draft.payload.to_string()),
            recorded_at: ActiveValue::Set(draft.at),
        }
        .insert(db_tx)
        .await?;
        Ok(())
    }

    /// Records an entry on behalf of a collaborator outside the engine (for
    /// example a document import).
    pub async fn record(
        &self,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        actor: &Actor,
        payload: Value,
    ) -> ResultEngine<()> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            self.record_tx(
                &db_tx,
                AuditDraft {
                    entity_type,
                    entity_id: entity_id.to_string(),
                    action,
                    actor_id: &actor.id,
                    on_behalf_of: None,
                    payload: payload.clone(),
                    at: actor.at,
                },
            )
            .await
        })
    }

    /// Audit trail of one entity, oldest first.
    pub async fn list_audit(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> ResultEngine<Vec<AuditEntry>> {
        let models = audit_entries::Entity::find()
            .filter(audit_entries::Column::EntityType.eq(entity_type))
            .filter(audit_entries::Column::EntityId.eq(entity_id))
            .order_by_asc(audit_entries::Column::Id)
            .all(&self.database)
            .await?;
        Ok(models.into_iter().map(AuditEntry::from).collect())
    }
}
