//! Authority resolution, role grants and delegations.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, prelude::*, sea_query::Expr,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    ActingAuthority, ActionScope, Actor, Capability, Contended, Delegation, EngineError,
    ResultEngine, Role, actor_roles, authority::qualifying_roles, delegations,
    util::{normalize_optional_text, normalize_required_text},
};

use super::{Engine, audit::AuditDraft, with_tx};

/// Input for [`Engine::create_delegation`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewDelegation {
    pub delegator_id: String,
    pub delegate_id: String,
    pub scopes: Vec<ActionScope>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Answers "may this actor do this, and on whose authority?".
///
/// One resolver is consulted once per operation, inside the operation's
/// transaction, so a grant revoked concurrently is either fully visible or
/// not at all.
pub(crate) struct AuthorityResolver<'a> {
    db: &'a DatabaseTransaction,
}

impl<'a> AuthorityResolver<'a> {
    pub(crate) fn new(db: &'a DatabaseTransaction) -> Self {
        Self { db }
    }

    async fn active_roles(&self, actor_id: &str) -> ResultEngine<Vec<Role>> {
        actor_roles::Entity::find()
            .filter(actor_roles::Column::ActorId.eq(actor_id))
            .filter(actor_roles::Column::Active.eq(true))
            .all(self.db)
            .await?
            .into_iter()
            .map(|model| Role::try_from(model.role.as_str()))
            .collect()
    }

    /// Direct roles win over delegations. Among delegations the oldest
    /// applicable one is used. Overrides are never delegated.
    pub(crate) async fn resolve(
        &self,
        actor_id: &str,
        scope: ActionScope,
        capability: Capability,
        at: DateTime<Utc>,
    ) -> ResultEngine<ActingAuthority> {
        let qualifying = qualifying_roles(scope, capability);

        let held = self.active_roles(actor_id).await?;
        if let Some(role) = qualifying.iter().find(|role| held.contains(role)) {
            return Ok(ActingAuthority::Direct { role: *role });
        }

        if capability != Capability::Override {
            let candidates = delegations::Entity::find()
                .filter(delegations::Column::DelegateId.eq(actor_id))
                .filter(delegations::Column::Active.eq(true))
                .order_by_asc(delegations::Column::CreatedAt)
                .all(self.db)
                .await?;
            for model in candidates {
                let delegation = Delegation::try_from(model)?;
                if !delegation.applies(scope, at) {
                    continue;
                }
                let delegator_roles = self.active_roles(&delegation.delegator_id).await?;
                if let Some(role) = qualifying.iter().find(|r| delegator_roles.contains(r)) {
                    return Ok(ActingAuthority::Delegated {
                        role: *role,
                        delegator_id: delegation.delegator_id,
                        delegation_id: delegation.id,
                        scope,
                    });
                }
            }
        }

        tracing::debug!(
            actor = actor_id,
            scope = scope.as_str(),
            capability = capability.as_str(),
            "authority refused"
        );
        Err(EngineError::Unauthorized(format!(
            "{actor_id} may not {} in scope {}",
            capability.as_str(),
            scope.as_str()
        )))
    }
}

impl Engine {
    pub(crate) async fn resolve_authority_tx(
        &self,
        db_tx: &DatabaseTransaction,
        actor_id: &str,
        scope: ActionScope,
        capability: Capability,
        at: DateTime<Utc>,
    ) -> ResultEngine<ActingAuthority> {
        AuthorityResolver::new(db_tx)
            .resolve(actor_id, scope, capability, at)
            .await
    }

    /// Read-only authority check, for callers deciding what to offer.
    pub async fn resolve_authority(
        &self,
        actor_id: &str,
        scope: ActionScope,
        capability: Capability,
        at: DateTime<Utc>,
    ) -> ResultEngine<ActingAuthority> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            self.resolve_authority_tx(&db_tx, actor_id, scope, capability, at)
                .await
        })
    }

    /// Grants `role` to `actor_id`, reactivating a revoked grant.
    ///
    /// Who may administer roles is decided by the authentication layer.
    pub async fn grant_role(
        &self,
        actor_id: &str,
        role: Role,
        granted_by: &Actor,
    ) -> ResultEngine<()> {
        let actor_id = normalize_required_text(actor_id, "actor id")?;
        with_tx!(self, Contended::Ledger, |db_tx| {
            let key = (actor_id.clone(), role.as_str().to_string());
            let existing = actor_roles::Entity::find_by_id(key).one(&db_tx).await?;
            let model = actor_roles::ActiveModel {
                actor_id: ActiveValue::Set(actor_id.clone()),
                role: ActiveValue::Set(role.as_str().to_string()),
                active: ActiveValue::Set(true),
                granted_by: ActiveValue::Set(granted_by.id.clone()),
                granted_at: ActiveValue::Set(granted_by.at),
            };
            if existing.is_some() {
                model.update(&db_tx).await?;
            } else {
                model.insert(&db_tx).await?;
            }
            self.record_tx(
                &db_tx,
                AuditDraft {
                    entity_type: "actor",
                    entity_id: actor_id.clone(),
                    action: "grant_role",
                    actor_id: &granted_by.id,
                    on_behalf_of: None,
                    payload: json!({ "role": role.as_str() }),
                    at: granted_by.at,
                },
            )
            .await?;
            tracing::info!(actor = %actor_id, role = role.as_str(), "role granted");
            Ok(())
        })
    }

    pub async fn revoke_role(
        &self,
        actor_id: &str,
        role: Role,
        revoked_by: &Actor,
    ) -> ResultEngine<()> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            let result = actor_roles::Entity::update_many()
                .col_expr(actor_roles::Column::Active, Expr::value(false))
                .filter(actor_roles::Column::ActorId.eq(actor_id))
                .filter(actor_roles::Column::Role.eq(role.as_str()))
                .filter(actor_roles::Column::Active.eq(true))
                .exec(&db_tx)
                .await?;
            if result.rows_affected == 0 {
                return Err(EngineError::KeyNotFound(format!(
                    "active role {} for {actor_id}",
                    role.as_str()
                )));
            }
            self.record_tx(
                &db_tx,
                AuditDraft {
                    entity_type: "actor",
                    entity_id: actor_id.to_string(),
                    action: "revoke_role",
                    actor_id: &revoked_by.id,
                    on_behalf_of: None,
                    payload: json!({ "role": role.as_str() }),
                    at: revoked_by.at,
                },
            )
            .await?;
            tracing::info!(actor = actor_id, role = role.as_str(), "role revoked");
            Ok(())
        })
    }

    /// Active roles held directly by `actor_id`.
    pub async fn roles_of(&self, actor_id: &str) -> ResultEngine<Vec<Role>> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            AuthorityResolver::new(&db_tx).active_roles(actor_id).await
        })
    }

    /// Lets `delegate_id` exercise the delegator's roles within `scopes`
    /// between `starts_at` and `ends_at`. The delegator must hold at least one
    /// role when the delegation is created; what it actually confers is
    /// evaluated each time it is used.
    pub async fn create_delegation(
        &self,
        input: NewDelegation,
        created_by: &Actor,
    ) -> ResultEngine<Delegation> {
        let delegator_id = normalize_required_text(&input.delegator_id, "delegator id")?;
        let delegate_id = normalize_required_text(&input.delegate_id, "delegate id")?;
        if delegator_id == delegate_id {
            return Err(EngineError::InvalidInput(
                "an actor cannot delegate to themselves".to_string(),
            ));
        }
        if input.scopes.is_empty() {
            return Err(EngineError::InvalidInput(
                "delegation needs at least one scope".to_string(),
            ));
        }
        if input.ends_at <= input.starts_at {
            return Err(EngineError::InvalidInput(
                "delegation must end after it starts".to_string(),
            ));
        }
        let mut scopes: Vec<ActionScope> = Vec::with_capacity(input.scopes.len());
        for scope in input.scopes {
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        let delegation = Delegation {
            id: Uuid::new_v4(),
            delegator_id,
            delegate_id,
            scopes,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            active: true,
            reason: normalize_optional_text(input.reason.as_deref()),
            created_at: created_by.at,
        };

        with_tx!(self, Contended::Ledger, |db_tx| {
            let roles = AuthorityResolver::new(&db_tx)
                .active_roles(&delegation.delegator_id)
                .await?;
            if roles.is_empty() {
                return Err(EngineError::Unauthorized(format!(
                    "{} holds no role to delegate",
                    delegation.delegator_id
                )));
            }
            delegations::ActiveModel::from(&delegation)
                .insert(&db_tx)
                .await?;
            self.record_tx(
                &db_tx,
                AuditDraft {
                    entity_type: "delegation",
                    entity_id: delegation.id.to_string(),
                    action: "create",
                    actor_id: &created_by.id,
                    on_behalf_of: None,
                    payload: json!({
                        "delegator_id": delegation.delegator_id,
                        "delegate_id": delegation.delegate_id,
                        "scopes": ActionScope::join_list(&delegation.scopes),
                        "starts_at": delegation.starts_at,
                        "ends_at": delegation.ends_at,
                    }),
                    at: created_by.at,
                },
            )
            .await?;
            tracing::info!(
                delegation = %delegation.id,
                delegator = %delegation.delegator_id,
                delegate = %delegation.delegate_id,
                "delegation created"
            );
            Ok(delegation.clone())
        })
    }

    pub async fn revoke_delegation(
        &self,
        delegation_id: Uuid,
        revoked_by: &Actor,
    ) -> ResultEngine<()> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            let result = delegations::Entity::update_many()
                .col_expr(delegations::Column::Active, Expr::value(false))
                .filter(delegations::Column::Id.eq(delegation_id.to_string()))
                .filter(delegations::Column::Active.eq(true))
                .exec(&db_tx)
                .await?;
            if result.rows_affected == 0 {
                return Err(EngineError::KeyNotFound(format!(
                    "active delegation {delegation_id}"
                )));
            }
            self.record_tx(
                &db_tx,
                AuditDraft {
                    entity_type: "delegation",
                    entity_id: delegation_id.to_string(),
                    action: "revoke",
                    actor_id: &revoked_by.id,
                    on_behalf_of: None,
                    payload: json!({}),
                    at: revoked_by.at,
                },
            )
            .await?;
            tracing::info!(delegation = %delegation_id, "delegation revoked");
            Ok(())
        })
    }

    /// Delegations given or received by `actor_id`, newest first.
    pub async fn list_delegations(&self, actor_id: &str) -> ResultEngine<Vec<Delegation>> {
        let models = delegations::Entity::find()
            .filter(
                delegations::Column::DelegatorId
                    .eq(actor_id)
                    .or(delegations::Column::DelegateId.eq(actor_id)),
            )
            .order_by_desc(delegations::Column::CreatedAt)
            .all(&self.database)
            .await?;
        models.into_iter().map(Delegation::try_from).collect()
    }
}
