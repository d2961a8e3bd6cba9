//! One row per sequence scope (`"{KIND}|{YYYY-MM}"`).
//!
//! Rows are only ever written through the single-statement upserts in
//! `ops::sequences`; nothing reads a value and writes it back.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::{EngineError, reference::ScopeKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SequenceCounter {
    #[serde(serialize_with = "serialize_scope")]
    pub scope: ScopeKey,
    pub last_value: i64,
    pub updated_at: DateTime<Utc>,
}

fn serialize_scope<S: serde::Serializer>(scope: &ScopeKey, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(scope)
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sequence_counters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub scope_key: String,
    pub last_value: i64,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for SequenceCounter {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            scope: model.scope_key.parse()?,
            last_value: model.last_value,
            updated_at: model.updated_at,
        })
    }
}
