use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, prelude::*, sea_query::Expr};
use serde_json::json;
use uuid::Uuid;

use crate::{
    ActingAuthority, ActionScope, Actor, BudgetLine, Capability, Classification, Contended,
    EngineError, LineStatus, ResultEngine, budget_lines,
    util::{normalize_required_text, require_justification},
};

use super::{Engine, audit::AuditDraft, with_tx};

/// Input for [`Engine::create_budget_line`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewBudgetLine {
    pub code: String,
    pub label: String,
    pub exercise: i32,
    pub classification: Classification,
    pub initial_allocation: i64,
}

impl Engine {
    /// Creates a draft line. Codes are unique within an exercise.
    pub async fn create_budget_line(
        &self,
        input: NewBudgetLine,
        actor: &Actor,
    ) -> ResultEngine<BudgetLine> {
        let line = BudgetLine::new(
            normalize_required_text(&input.code, "budget line code")?,
            normalize_required_text(&input.label, "budget line label")?,
            input.exercise,
            input.classification,
            input.initial_allocation,
            actor.id.clone(),
            actor.at,
        )?;

        with_tx!(self, Contended::Ledger, |db_tx| {
            let authority = self
                .resolve_authority_tx(
                    &db_tx,
                    &actor.id,
                    ActionScope::Budget,
                    Capability::Prepare,
                    actor.at,
                )
                .await?;
            let duplicate = budget_lines::Entity::find()
                .filter(budget_lines::Column::Exercise.eq(line.exercise))
                .filter(budget_lines::Column::Code.eq(line.code.as_str()))
                .one(&db_tx)
                .await?;
            if duplicate.is_some() {
                return Err(EngineError::ExistingKey(format!(
                    "budget line {} in {}",
                    line.code, line.exercise
                )));
            }
            budget_lines::ActiveModel::from(&line).insert(&db_tx).await?;
            self.record_line_audit(
                &db_tx,
                &line,
                "create",
                actor,
                &authority,
                json!({ "initial_allocation": line.initial_allocation }),
            )
            .await?;
            Ok(line.clone())
        })
    }

    pub async fn submit_budget_line(
        &self,
        line_id: Uuid,
        actor: &Actor,
    ) -> ResultEngine<BudgetLine> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            self.move_line_tx(
                &db_tx,
                line_id,
                &[LineStatus::Draft, LineStatus::Rejected],
                LineStatus::Submitted,
                Capability::Prepare,
                None,
                actor,
            )
            .await
        })
    }

    /// Validated lines are the only ones the ledger will move.
    pub async fn validate_budget_line(
        &self,
        line_id: Uuid,
        actor: &Actor,
    ) -> ResultEngine<BudgetLine> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            self.move_line_tx(
                &db_tx,
                line_id,
                &[LineStatus::Submitted],
                LineStatus::Validated,
                Capability::Decide,
                None,
                actor,
            )
            .await
        })
    }

    pub async fn reject_budget_line(
        &self,
        line_id: Uuid,
        reason: &str,
        actor: &Actor,
    ) -> ResultEngine<BudgetLine> {
        let reason = require_justification(Some(reason), "rejecting a budget line")?;
        with_tx!(self, Contended::Ledger, |db_tx| {
            self.move_line_tx(
                &db_tx,
                line_id,
                &[LineStatus::Submitted],
                LineStatus::Rejected,
                Capability::Decide,
                Some(reason.as_str()),
                actor,
            )
            .await
        })
    }

    /// Lines are never deleted. A deactivated line keeps its history and
    /// its downstream counters but takes no new reservation or transfer.
    pub async fn deactivate_budget_line(
        &self,
        line_id: Uuid,
        actor: &Actor,
    ) -> ResultEngine<BudgetLine> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            let authority = self
                .resolve_authority_tx(
                    &db_tx,
                    &actor.id,
                    ActionScope::Budget,
                    Capability::Decide,
                    actor.at,
                )
                .await?;
            let result = budget_lines::Entity::update_many()
                .col_expr(budget_lines::Column::Active, Expr::value(false))
                .filter(budget_lines::Column::Id.eq(line_id.to_string()))
                .filter(budget_lines::Column::Active.eq(true))
                .exec(&db_tx)
                .await?;
            let line = self.find_line(&db_tx, line_id).await?;
            if result.rows_affected == 0 {
                return Err(EngineError::InvalidTransition(format!(
                    "budget line {} is already deactivated",
                    line.code
                )));
            }
            self.record_line_audit(&db_tx, &line, "deactivate", actor, &authority, json!({}))
                .await?;
            tracing::info!(line = %line.id, code = %line.code, "budget line deactivated");
            Ok(line)
        })
    }

    async fn move_line_tx(
        &self,
        db_tx: &DatabaseTransaction,
        line_id: Uuid,
        from: &[LineStatus],
        to: LineStatus,
        capability: Capability,
        reason: Option<&str>,
        actor: &Actor,
    ) -> ResultEngine<BudgetLine> {
        let line = self.find_line(db_tx, line_id).await?;
        if !from.contains(&line.status) {
            return Err(EngineError::InvalidTransition(format!(
                "cannot move budget line {} from {} to {}",
                line.code,
                line.status.as_str(),
                to.as_str()
            )));
        }
        let authority = self
            .resolve_authority_tx(db_tx, &actor.id, ActionScope::Budget, capability, actor.at)
            .await?;

        let result = budget_lines::Entity::update_many()
            .col_expr(budget_lines::Column::Status, Expr::value(to.as_str()))
            .filter(budget_lines::Column::Id.eq(line_id.to_string()))
            .filter(budget_lines::Column::Status.eq(line.status.as_str()))
            .exec(db_tx)
            .await?;
        if result.rows_affected == 0 {
            return Err(EngineError::LedgerContention(format!(
                "budget line {} changed concurrently",
                line.code
            )));
        }

        let line = self.find_line(db_tx, line_id).await?;
        self.record_line_audit(
            db_tx,
            &line,
            to.as_str(),
            actor,
            &authority,
            json!({ "status": to.as_str(), "reason": reason }),
        )
        .await?;
        tracing::info!(
            line = %line.id,
            code = %line.code,
            status = to.as_str(),
            "budget line moved"
        );
        Ok(line)
    }

    async fn record_line_audit(
        &self,
        db_tx: &DatabaseTransaction,
        line: &BudgetLine,
        action: &str,
        actor: &Actor,
        authority: &ActingAuthority,
        payload: serde_json::Value,
    ) -> ResultEngine<()> {
        self.record_tx(
            db_tx,
            AuditDraft {
                entity_type: "budget_line",
                entity_id: line.id.to_string(),
                action,
                actor_id: &actor.id,
                on_behalf_of: authority.delegator_id(),
                payload,
                at: actor.at,
            },
        )
        .await
    }

    pub async fn budget_line(&self, line_id: Uuid) -> ResultEngine<BudgetLine> {
        self.find_line(&self.database, line_id).await
    }

    /// Lines of an exercise ordered by code.
    pub async fn list_budget_lines(&self, exercise: i32) -> ResultEngine<Vec<BudgetLine>> {
        let models = budget_lines::Entity::find()
            .filter(budget_lines::Column::Exercise.eq(exercise))
            .order_by_asc(budget_lines::Column::Code)
            .all(&self.database)
            .await?;
        models.into_iter().map(BudgetLine::try_from).collect()
    }
}
