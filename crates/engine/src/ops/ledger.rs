//! The budget ledger.
//!
//! [`Engine::apply_movement`] is the only code that writes a line's
//! counters. Each movement is one guarded `UPDATE`: the bound is checked by
//! the same statement that changes the counter, so there is no window
//! between reading the figures and acting on them. A refused movement
//! changes nothing.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, Condition, DatabaseTransaction, QueryFilter, QueryOrder, prelude::*,
    sea_query::{Expr, SimpleExpr},
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    ActionScope, Actor, BudgetLine, Capability, Contended, DocumentKind, EngineError,
    LineAvailability, LineStatus, Movement, MovementKind, ResultEngine, budget_lines,
    budget_movements, documents,
    util::{ensure_positive, require_justification},
};

use super::{Engine, audit::AuditDraft, with_tx};

const AVAILABLE_SQL: &str = "initial_allocation + transfers_in - transfers_out - committed";

/// One requested change to a line's counters.
pub(crate) struct MovementRequest<'a> {
    pub(crate) line_id: Uuid,
    pub(crate) kind: MovementKind,
    pub(crate) amount: i64,
    /// Reference or id of whatever caused the movement.
    pub(crate) source: &'a str,
    pub(crate) actor_id: &'a str,
    pub(crate) at: DateTime<Utc>,
    /// Skip the availability bound. Only meaningful for reservations.
    pub(crate) overridden: bool,
}

impl MovementKind {
    fn counter(self) -> budget_lines::Column {
        match self {
            Self::Reserve | Self::Release => budget_lines::Column::Committed,
            Self::TransferOut => budget_lines::Column::TransfersOut,
            Self::TransferIn => budget_lines::Column::TransfersIn,
            Self::Liquidate => budget_lines::Column::Liquidated,
            Self::Order => budget_lines::Column::Ordered,
            Self::Pay => budget_lines::Column::Paid,
        }
    }

    /// `WHERE` fragment bounding the movement, `None` when unbounded.
    fn guard(self, amount: i64) -> Option<SimpleExpr> {
        let sql = match self {
            Self::Reserve | Self::TransferOut => {
                return Some(Expr::cust_with_values(
                    format!("{AVAILABLE_SQL} >= ?"),
                    [amount],
                ));
            }
            Self::TransferIn => return None,
            Self::Release => "committed - liquidated >= ?",
            Self::Liquidate => "liquidated + ? <= committed",
            Self::Order => "ordered + ? <= liquidated",
            Self::Pay => "paid + ? <= ordered",
        };
        Some(Expr::cust_with_values(sql, [amount]))
    }

    fn requires_active_line(self) -> bool {
        matches!(self, Self::Reserve | Self::TransferOut | Self::TransferIn)
    }

    /// How much room the line has left for this kind of movement.
    fn headroom(self, line: &BudgetLine) -> Option<i64> {
        match self {
            Self::Reserve | Self::TransferOut => Some(line.available()),
            Self::TransferIn => None,
            Self::Release => Some(line.committed - line.liquidated),
            Self::Liquidate => Some(line.committed - line.liquidated),
            Self::Order => Some(line.liquidated - line.ordered),
            Self::Pay => Some(line.ordered - line.paid),
        }
    }
}

impl Engine {
    pub(crate) async fn find_line(
        &self,
        db: &impl ConnectionTrait,
        line_id: Uuid,
    ) -> ResultEngine<BudgetLine> {
        let model = budget_lines::Entity::find_by_id(line_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("budget_line {line_id}")))?;
        BudgetLine::try_from(model)
    }

    /// Applies one movement to a line and journals it.
    ///
    /// Fails with [`EngineError::InsufficientFunds`] when the bound for the
    /// movement's kind would be crossed, with
    /// [`EngineError::InvalidTransition`] when the line cannot take
    /// movements, and leaves every counter untouched in both cases.
    pub(crate) async fn apply_movement(
        &self,
        db_tx: &DatabaseTransaction,
        request: MovementRequest<'_>,
    ) -> ResultEngine<Movement> {
        ensure_positive(request.amount, "movement amount")?;
        let counter = request.kind.counter();
        let delta = match request.kind {
            MovementKind::Release => Expr::col(counter).sub(request.amount),
            _ => Expr::col(counter).add(request.amount),
        };

        let mut update = budget_lines::Entity::update_many()
            .col_expr(counter, delta)
            .filter(budget_lines::Column::Id.eq(request.line_id.to_string()))
            .filter(budget_lines::Column::Status.eq(LineStatus::Validated.as_str()));
        if request.kind.requires_active_line() {
            update = update.filter(budget_lines::Column::Active.eq(true));
        }
        let bounded = !(request.overridden && request.kind == MovementKind::Reserve);
        if bounded && let Some(guard) = request.kind.guard(request.amount) {
            update = update.filter(guard);
        }

        let result = update.exec(db_tx).await?;
        if result.rows_affected == 0 {
            return Err(self.diagnose_refusal(db_tx, &request).await);
        }

        let line = self.find_line(db_tx, request.line_id).await?;
        let available_after = line.available();
        let available_before = available_after - request.kind.available_delta(request.amount);
        let model = budget_movements::ActiveModel {
            id: ActiveValue::NotSet,
            line_id: ActiveValue::Set(request.line_id.to_string()),
            kind: ActiveValue::Set(request.kind.as_str().to_string()),
            amount: ActiveValue::Set(request.amount),
            available_before: ActiveValue::Set(available_before),
            available_after: ActiveValue::Set(available_after),
            source: ActiveValue::Set(request.source.to_string()),
            actor_id: ActiveValue::Set(request.actor_id.to_string()),
            overridden: ActiveValue::Set(request.overridden),
            occurred_at: ActiveValue::Set(request.at),
        }
        .insert(db_tx)
        .await?;

        tracing::debug!(
            line = %request.line_id,
            kind = request.kind.as_str(),
            amount = request.amount,
            available_after,
            "ledger movement applied"
        );
        Movement::try_from(model)
    }

    /// Explains why a guarded update touched no row.
    async fn diagnose_refusal(
        &self,
        db_tx: &DatabaseTransaction,
        request: &MovementRequest<'_>,
    ) -> EngineError {
        let line = match self.find_line(db_tx, request.line_id).await {
            Ok(line) => line,
            Err(err) => return err,
        };
        if line.status != LineStatus::Validated {
            return EngineError::InvalidTransition(format!(
                "budget line {} is {}, not validated",
                line.code,
                line.status.as_str()
            ));
        }
        if request.kind.requires_active_line() && !line.active {
            return EngineError::InvalidTransition(format!(
                "budget line {} is deactivated",
                line.code
            ));
        }
        match request.kind.headroom(&line) {
            Some(headroom) if headroom < request.amount => {
                tracing::debug!(
                    line = %line.id,
                    kind = request.kind.as_str(),
                    requested = request.amount,
                    headroom,
                    "ledger movement refused"
                );
                EngineError::InsufficientFunds {
                    line_id: line.id.to_string(),
                    requested: request.amount,
                    available: headroom,
                    shortfall: request.amount.saturating_sub(headroom),
                }
            }
            _ => EngineError::LedgerContention(format!(
                "budget line {} changed while applying {}",
                line.code,
                request.kind.as_str()
            )),
        }
    }

    /// `initial_allocation + transfers_in - transfers_out - committed`.
    pub async fn compute_available(&self, line_id: Uuid) -> ResultEngine<i64> {
        Ok(self.find_line(&self.database, line_id).await?.available())
    }

    pub async fn get_availability(&self, line_id: Uuid) -> ResultEngine<LineAvailability> {
        Ok(self.find_line(&self.database, line_id).await?.availability())
    }

    /// Reserves `amount` on a line. An amount equal to what is available is
    /// accepted.
    pub async fn reserve(
        &self,
        line_id: Uuid,
        amount: i64,
        source: &str,
        actor: &Actor,
    ) -> ResultEngine<Movement> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            let authority = self
                .resolve_authority_tx(
                    &db_tx,
                    &actor.id,
                    ActionScope::Document(DocumentKind::Commitment),
                    Capability::Decide,
                    actor.at,
                )
                .await?;
            let movement = self
                .apply_movement(
                    &db_tx,
                    MovementRequest {
                        line_id,
                        kind: MovementKind::Reserve,
                        amount,
                        source,
                        actor_id: &actor.id,
                        at: actor.at,
                        overridden: false,
                    },
                )
                .await?;
            self.record_movement_audit(&db_tx, &movement, authority.delegator_id(), None)
                .await?;
            Ok(movement)
        })
    }

    /// Reserves past the available balance. Admin only, and the reason is
    /// kept with the movement's audit entry.
    pub async fn reserve_with_override(
        &self,
        line_id: Uuid,
        amount: i64,
        source: &str,
        justification: &str,
        actor: &Actor,
    ) -> ResultEngine<Movement> {
        let justification = require_justification(Some(justification), "override")?;
        with_tx!(self, Contended::Ledger, |db_tx| {
            self.resolve_authority_tx(
                &db_tx,
                &actor.id,
                ActionScope::Budget,
                Capability::Override,
                actor.at,
            )
            .await?;
            let movement = self
                .apply_movement(
                    &db_tx,
                    MovementRequest {
                        line_id,
                        kind: MovementKind::Reserve,
                        amount,
                        source,
                        actor_id: &actor.id,
                        at: actor.at,
                        overridden: true,
                    },
                )
                .await?;
            self.record_movement_audit(&db_tx, &movement, None, Some(justification.as_str()))
                .await?;
            if movement.available_after < 0 {
                tracing::warn!(
                    line = %line_id,
                    amount,
                    available_after = movement.available_after,
                    actor = %actor.id,
                    "reservation overrode available balance"
                );
            }
            Ok(movement)
        })
    }

    /// Net amount `source` still holds on a line: its reservations minus its
    /// releases.
    async fn held_by_source_tx(
        &self,
        db_tx: &DatabaseTransaction,
        line_id: Uuid,
        source: &str,
    ) -> ResultEngine<i64> {
        let movements = budget_movements::Entity::find()
            .filter(budget_movements::Column::LineId.eq(line_id.to_string()))
            .filter(budget_movements::Column::Source.eq(source))
            .filter(budget_movements::Column::Kind.is_in([
                MovementKind::Reserve.as_str(),
                MovementKind::Release.as_str(),
            ]))
            .all(db_tx)
            .await?;
        Ok(movements.iter().fold(0, |held, m| {
            if m.kind == MovementKind::Release.as_str() {
                held - m.amount
            } else {
                held + m.amount
            }
        }))
    }

    /// Gives back funds reserved under `source` with [`Engine::reserve`].
    ///
    /// A source only gets back what it holds. Funds held by a document are
    /// returned through [`Engine::disengage`] instead.
    pub async fn release(
        &self,
        line_id: Uuid,
        amount: i64,
        source: &str,
        actor: &Actor,
    ) -> ResultEngine<Movement> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            let authority = self
                .resolve_authority_tx(
                    &db_tx,
                    &actor.id,
                    ActionScope::Document(DocumentKind::Commitment),
                    Capability::Decide,
                    actor.at,
                )
                .await?;
            let owned_by_document = documents::Entity::find()
                .filter(
                    Condition::any()
                        .add(documents::Column::Reference.eq(source))
                        .add(documents::Column::Id.eq(source)),
                )
                .one(&db_tx)
                .await?;
            if let Some(document) = owned_by_document {
                return Err(EngineError::InvalidTransition(format!(
                    "{source} is held by {} {}, disengage it instead",
                    document.kind.as_str(),
                    document.id
                )));
            }
            let held = self.held_by_source_tx(&db_tx, line_id, source).await?;
            if amount > held {
                return Err(EngineError::InsufficientFunds {
                    line_id: line_id.to_string(),
                    requested: amount,
                    available: held,
                    shortfall: amount.saturating_sub(held),
                });
            }
            let movement = self
                .apply_movement(
                    &db_tx,
                    MovementRequest {
                        line_id,
                        kind: MovementKind::Release,
                        amount,
                        source,
                        actor_id: &actor.id,
                        at: actor.at,
                        overridden: false,
                    },
                )
                .await?;
            self.record_movement_audit(&db_tx, &movement, authority.delegator_id(), None)
                .await?;
            Ok(movement)
        })
    }

    async fn record_movement_audit(
        &self,
        db_tx: &DatabaseTransaction,
        movement: &Movement,
        on_behalf_of: Option<&str>,
        justification: Option<&str>,
    ) -> ResultEngine<()> {
        self.record_tx(
            db_tx,
            AuditDraft {
                entity_type: "budget_line",
                entity_id: movement.line_id.to_string(),
                action: movement.kind.as_str(),
                actor_id: &movement.actor_id,
                on_behalf_of,
                payload: json!({
                    "amount": movement.amount,
                    "source": movement.source,
                    "available_before": movement.available_before,
                    "available_after": movement.available_after,
                    "overridden": movement.overridden,
                    "justification": justification,
                }),
                at: movement.occurred_at,
            },
        )
        .await
    }

    /// Journal of a line, oldest first.
    pub async fn list_movements(&self, line_id: Uuid) -> ResultEngine<Vec<Movement>> {
        let models = budget_movements::Entity::find()
            .filter(budget_movements::Column::LineId.eq(line_id.to_string()))
            .order_by_asc(budget_movements::Column::Id)
            .all(&self.database)
            .await?;
        models.into_iter().map(Movement::try_from).collect()
    }
}
