//! Time-bounded grants of one actor's authority to another.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, authority::ActionScope, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub id: Uuid,
    pub delegator_id: String,
    pub delegate_id: String,
    pub scopes: Vec<ActionScope>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub active: bool,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Delegation {
    /// Active, inside its validity window (both ends inclusive) and covering
    /// `scope`.
    pub fn applies(&self, scope: ActionScope, at: DateTime<Utc>) -> bool {
        self.active && self.starts_at <= at && at <= self.ends_at && self.scopes.contains(&scope)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "delegations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub delegator_id: String,
    pub delegate_id: String,
    pub scopes: String,
    pub starts_at: DateTimeUtc,
    pub ends_at: DateTimeUtc,
    pub active: bool,
    pub reason: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Delegation> for ActiveModel {
    fn from(value: &Delegation) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            delegator_id: ActiveValue::Set(value.delegator_id.clone()),
            delegate_id: ActiveValue::Set(value.delegate_id.clone()),
            scopes: ActiveValue::Set(ActionScope::join_list(&value.scopes)),
            starts_at: ActiveValue::Set(value.starts_at),
            ends_at: ActiveValue::Set(value.ends_at),
            active: ActiveValue::Set(value.active),
            reason: ActiveValue::Set(value.reason.clone()),
            created_at: ActiveValue::Set(value.created_at),
        }
    }
}

impl TryFrom<Model> for Delegation {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "delegation")?,
            delegator_id: model.delegator_id,
            delegate_id: model.delegate_id,
            scopes: ActionScope::parse_list(&model.scopes)?,
            starts_at: model.starts_at,
            ends_at: model.ends_at,
            active: model.active,
            reason: model.reason,
            created_at: model.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::DocumentKind;

    fn delegation() -> Delegation {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Delegation {
            id: Uuid::new_v4(),
            delegator_id: "cb".to_string(),
            delegate_id: "deputy".to_string(),
            scopes: vec![ActionScope::Document(DocumentKind::Commitment)],
            starts_at: start,
            ends_at: start + Duration::days(14),
            active: true,
            reason: None,
            created_at: start,
        }
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let d = delegation();
        let scope = ActionScope::Document(DocumentKind::Commitment);
        assert!(d.applies(scope, d.starts_at));
        assert!(d.applies(scope, d.ends_at));
        assert!(!d.applies(scope, d.ends_at + Duration::seconds(1)));
        assert!(!d.applies(scope, d.starts_at - Duration::seconds(1)));
    }

    #[test]
    fn scope_and_activity_must_match() {
        let mut d = delegation();
        assert!(!d.applies(ActionScope::Transfers, d.starts_at));
        d.active = false;
        assert!(!d.applies(
            ActionScope::Document(DocumentKind::Commitment),
            d.starts_at
        ));
    }
}
