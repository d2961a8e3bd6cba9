//! Who may act on what.
//!
//! An actor acts either on a role they hold directly or on a role held by
//! someone who delegated it to them. The resolved [`ActingAuthority`] is
//! stored with every transition so the audit trail records on whose behalf a
//! decision was taken.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DocumentKind, EngineError, ResultEngine};

/// The caller of a mutating operation and the instant it acts at.
///
/// `at` decides which delegations are in force and which period a minted
/// reference belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub at: DateTime<Utc>,
}

impl Actor {
    pub fn new(id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self { id: id.into(), at }
    }

    pub fn now(id: impl Into<String>) -> Self {
        Self::new(id, Utc::now())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    /// Prepares and submits documents.
    Agent,
    /// Director general.
    Dg,
    /// Budget controller.
    BudgetController,
    /// Administrative and financial director.
    Daaf,
    Treasury,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Self::Admin,
        Self::Agent,
        Self::Dg,
        Self::BudgetController,
        Self::Daaf,
        Self::Treasury,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Agent => "agent",
            Self::Dg => "dg",
            Self::BudgetController => "budget_controller",
            Self::Daaf => "daaf",
            Self::Treasury => "treasury",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "admin" => Ok(Self::Admin),
            "agent" => Ok(Self::Agent),
            "dg" => Ok(Self::Dg),
            "budget_controller" => Ok(Self::BudgetController),
            "daaf" => Ok(Self::Daaf),
            "treasury" => Ok(Self::Treasury),
            other => Err(EngineError::InvalidInput(format!("invalid role: {other}"))),
        }
    }
}

/// The area an authority applies to. Delegations are granted per scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionScope {
    Document(DocumentKind),
    Transfers,
    Budget,
}

impl ActionScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document(kind) => kind.as_str(),
            Self::Transfers => "transfer",
            Self::Budget => "budget",
        }
    }

    /// Parses a comma separated scope list, as stored on delegations.
    pub fn parse_list(raw: &str) -> ResultEngine<Vec<ActionScope>> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ActionScope::try_from)
            .collect()
    }

    pub fn join_list(scopes: &[ActionScope]) -> String {
        scopes
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl TryFrom<&str> for ActionScope {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "transfer" => Ok(Self::Transfers),
            "budget" => Ok(Self::Budget),
            other => DocumentKind::try_from(other)
                .map(Self::Document)
                .map_err(|_| EngineError::InvalidInput(format!("invalid scope: {other}"))),
        }
    }
}

/// What the actor is trying to do inside a scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Draft, submit, resubmit, cancel, impute, request.
    Prepare,
    /// Validate, reject, defer, approve.
    Decide,
    /// Push a line past its available balance.
    Override,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Decide => "decide",
            Self::Override => "override",
        }
    }
}

/// Roles that grant `capability` within `scope`. `Admin` always qualifies.
pub fn qualifying_roles(scope: ActionScope, capability: Capability) -> &'static [Role] {
    use Role::*;

    match (scope, capability) {
        (_, Capability::Override) => &[Admin],
        (ActionScope::Document(_), Capability::Prepare) => &[Agent, Admin],
        (ActionScope::Document(kind), Capability::Decide) => match kind {
            DocumentKind::Note | DocumentKind::PaymentOrder => &[Dg, Admin],
            DocumentKind::Commitment => &[BudgetController, Admin],
            DocumentKind::Liquidation => &[Daaf, Admin],
            DocumentKind::Settlement => &[Treasury, Admin],
        },
        (ActionScope::Budget, Capability::Prepare) => &[BudgetController, Admin],
        (ActionScope::Budget, Capability::Decide) => &[Dg, Admin],
        (ActionScope::Transfers, Capability::Prepare) => &[BudgetController, Daaf, Admin],
        (ActionScope::Transfers, Capability::Decide) => &[Dg, Admin],
    }
}

/// The authority under which an action was taken.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActingAuthority {
    Direct {
        role: Role,
    },
    Delegated {
        role: Role,
        delegator_id: String,
        delegation_id: Uuid,
        scope: ActionScope,
    },
}

impl ActingAuthority {
    pub fn role(&self) -> Role {
        match self {
            Self::Direct { role } | Self::Delegated { role, .. } => *role,
        }
    }

    pub fn delegator_id(&self) -> Option<&str> {
        match self {
            Self::Direct { .. } => None,
            Self::Delegated { delegator_id, .. } => Some(delegator_id),
        }
    }

    pub fn delegation_id(&self) -> Option<Uuid> {
        match self {
            Self::Direct { .. } => None,
            Self::Delegated { delegation_id, .. } => Some(*delegation_id),
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Direct { .. } => "direct",
            Self::Delegated { .. } => "delegated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_qualifies_everywhere() {
        let scopes = DocumentKind::ALL
            .into_iter()
            .map(ActionScope::Document)
            .chain([ActionScope::Transfers, ActionScope::Budget]);
        for scope in scopes {
            for capability in [Capability::Prepare, Capability::Decide, Capability::Override] {
                assert!(qualifying_roles(scope, capability).contains(&Role::Admin));
            }
        }
    }

    #[test]
    fn commitments_are_decided_by_the_budget_controller() {
        let roles = qualifying_roles(
            ActionScope::Document(DocumentKind::Commitment),
            Capability::Decide,
        );
        assert!(roles.contains(&Role::BudgetController));
        assert!(!roles.contains(&Role::Agent));
        assert!(!roles.contains(&Role::Treasury));
    }

    #[test]
    fn scope_lists_parse_and_reject_unknown_entries() {
        let scopes = ActionScope::parse_list("commitment, transfer,,budget").unwrap();
        assert_eq!(
            scopes,
            vec![
                ActionScope::Document(DocumentKind::Commitment),
                ActionScope::Transfers,
                ActionScope::Budget,
            ]
        );
        assert_eq!(
            ActionScope::join_list(&scopes),
            "commitment,transfer,budget"
        );
        assert!(ActionScope::parse_list("commitment,treasury").is_err());
    }
}
