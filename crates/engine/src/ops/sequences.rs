//! Sequence allocation and reference minting.
//!
//! A counter only moves through one statement that increments and returns
//! the new value, so two callers on the same scope can never read the same
//! number. Callers on different scopes touch different rows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseTransaction, QueryOrder, Statement, prelude::*};
use serde::Serialize;
use serde_json::json;

use crate::{
    Actor, Contended, EngineError, ParsedReference, Period, ReferenceKind, ResultEngine,
    ScopeKey, SequenceCounter, reference, sequence_counters,
};

use super::{Engine, audit::AuditDraft, with_tx};

const NEXT_VALUE_SQL: &str = "INSERT INTO sequence_counters (scope_key, last_value, updated_at) \
     VALUES (?, 1, ?) \
     ON CONFLICT(scope_key) DO UPDATE SET last_value = last_value + 1, \
     updated_at = excluded.updated_at \
     RETURNING last_value";

const RESYNC_SQL: &str = "INSERT INTO sequence_counters (scope_key, last_value, updated_at) \
     VALUES (?, ?, ?) \
     ON CONFLICT(scope_key) DO UPDATE SET \
     last_value = MAX(last_value, excluded.last_value), \
     updated_at = excluded.updated_at \
     RETURNING last_value";

/// Outcome of a resynchronisation from imported references.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    /// Counters touched, with their value after the resync.
    pub counters: Vec<SequenceCounter>,
    /// Inputs that did not parse as a reference.
    pub skipped: usize,
}

impl Engine {
    async fn upsert_counter(
        &self,
        db_tx: &DatabaseTransaction,
        sql: &str,
        values: Vec<sea_orm::Value>,
    ) -> ResultEngine<i64> {
        let stmt = Statement::from_sql_and_values(db_tx.get_database_backend(), sql, values);
        let row = db_tx.query_one(stmt).await?.ok_or_else(|| {
            EngineError::SequenceContention("counter upsert returned no row".to_string())
        })?;
        Ok(row.try_get::<i64>("", "last_value")?)
    }

    /// Atomic increment-and-read inside the caller's transaction.
    pub(crate) async fn next_value_tx(
        &self,
        db_tx: &DatabaseTransaction,
        scope: ScopeKey,
        at: DateTime<Utc>,
    ) -> ResultEngine<i64> {
        self.upsert_counter(db_tx, NEXT_VALUE_SQL, vec![scope.to_string().into(), at.into()])
            .await
    }

    /// Draws the next number of `kind` in `period` and formats it.
    pub(crate) async fn mint_reference_tx(
        &self,
        db_tx: &DatabaseTransaction,
        kind: ReferenceKind,
        period: Period,
        at: DateTime<Utc>,
    ) -> ResultEngine<String> {
        let sequence = self
            .next_value_tx(db_tx, ScopeKey::new(kind, period), at)
            .await?;
        reference::format(kind, period, sequence)
    }

    /// Returns the next value of `scope`. Values strictly increase; a value
    /// drawn by an operation that later fails is lost, never reissued.
    pub async fn next_value(&self, scope: ScopeKey) -> ResultEngine<i64> {
        let at = Utc::now();
        with_tx!(self, Contended::Sequence, |db_tx| {
            self.next_value_tx(&db_tx, scope, at).await
        })
    }

    /// Mints a standalone reference of `kind` in `period`.
    pub async fn allocate_reference(
        &self,
        kind: ReferenceKind,
        period: Period,
    ) -> ResultEngine<String> {
        let at = Utc::now();
        with_tx!(self, Contended::Sequence, |db_tx| {
            let sequence = self
                .next_value_tx(&db_tx, ScopeKey::new(kind, period), at)
                .await?;
            reference::format(kind, period, sequence)
        })
    }

    pub fn parse_reference(&self, raw: &str) -> ParsedReference {
        reference::parse(raw)
    }

    /// Raises `scope` to at least `observed_max`. The counter is never
    /// lowered, and a concurrent `next_value` either runs before (and is
    /// absorbed by the max) or after (and continues from it).
    pub async fn resync_from_import(
        &self,
        scope: ScopeKey,
        observed_max: i64,
        actor: &Actor,
    ) -> ResultEngine<i64> {
        if observed_max < 0 {
            return Err(EngineError::InvalidAmount(format!(
                "observed maximum must be >= 0, got {observed_max}"
            )));
        }
        with_tx!(self, Contended::Sequence, |db_tx| {
            self.resync_tx(&db_tx, scope, observed_max, actor).await
        })
    }

    async fn resync_tx(
        &self,
        db_tx: &DatabaseTransaction,
        scope: ScopeKey,
        observed_max: i64,
        actor: &Actor,
    ) -> ResultEngine<i64> {
        let last_value = self
            .upsert_counter(
                db_tx,
                RESYNC_SQL,
                vec![
                    scope.to_string().into(),
                    observed_max.into(),
                    actor.at.into(),
                ],
            )
            .await?;
        self.record_tx(
            db_tx,
            AuditDraft {
                entity_type: "sequence",
                entity_id: scope.to_string(),
                action: "resync",
                actor_id: &actor.id,
                on_behalf_of: None,
                payload: json!({ "observed_max": observed_max, "last_value": last_value }),
                at: actor.at,
            },
        )
        .await?;
        tracing::info!(%scope, observed_max, last_value, "sequence resynchronised");
        Ok(last_value)
    }

    /// Resynchronises every scope seen in a batch of imported references.
    /// Unparseable entries are counted and skipped.
    pub async fn resync_from_references<I, S>(
        &self,
        references: I,
        actor: &Actor,
    ) -> ResultEngine<ResyncReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut maxima: BTreeMap<ScopeKey, i64> = BTreeMap::new();
        let mut skipped = 0;
        for raw in references {
            match reference::parse(raw.as_ref()) {
                ParsedReference::Valid(parts) => {
                    let max = maxima.entry(parts.scope()).or_default();
                    *max = (*max).max(parts.sequence);
                }
                ParsedReference::Invalid => skipped += 1,
            }
        }

        let mut counters = Vec::with_capacity(maxima.len());
        for (scope, observed_max) in maxima {
            let last_value = self.resync_from_import(scope, observed_max, actor).await?;
            counters.push(SequenceCounter {
                scope,
                last_value,
                updated_at: actor.at,
            });
        }
        Ok(ResyncReport { counters, skipped })
    }

    /// Every counter, ordered by scope key.
    pub async fn list_counters(&self) -> ResultEngine<Vec<SequenceCounter>> {
        let models = sequence_counters::Entity::find()
            .order_by_asc(sequence_counters::Column::ScopeKey)
            .all(&self.database)
            .await?;
        models.into_iter().map(SequenceCounter::try_from).collect()
    }
}
