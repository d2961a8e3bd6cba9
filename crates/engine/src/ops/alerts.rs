//! Consumption threshold monitoring.
//!
//! A scan is stateless and safe to run concurrently with itself: an alert
//! row is inserted with `ON CONFLICT DO NOTHING` against the unique index on
//! unresolved `(rule_id, line_id)`, and only the scan whose insert landed
//! reports it.

use std::collections::BTreeMap;

use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, Statement, prelude::*,
    sea_query::Expr,
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    ActionScope, Actor, AlertRecord, AlertRule, BudgetLine, Capability, Contended, EngineError,
    LineStatus, ResultEngine, Severity, alert_rules,
    alerts::{self, BLOCKING_BPS},
    budget_lines,
    util::{normalize_optional_text, require_justification},
};

use super::{Engine, audit::AuditDraft, with_tx};

const INSERT_ALERT_SQL: &str = "INSERT INTO alerts (id, rule_id, line_id, line_code, line_label, \
     exercise, severity, threshold_bps, ratio_bps, allocation, committed, computed_available, \
     message, created_at) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
     ON CONFLICT DO NOTHING";

const TOP_OVER_BUDGET: usize = 10;

/// Input for [`Engine::create_alert_rule`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAlertRule {
    pub threshold_bps: i64,
    /// `None` applies the rule to every line.
    pub line_id: Option<Uuid>,
    pub description: Option<String>,
}

/// Filter for [`Engine::list_alerts`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AlertFilter {
    pub severity: Option<Severity>,
    pub line_id: Option<Uuid>,
    pub unresolved_only: bool,
    pub unacknowledged_only: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OverBudgetLine {
    pub line_id: Uuid,
    pub line_code: String,
    pub line_label: String,
    pub overrun: i64,
    pub ratio_bps: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AlertSummary {
    pub exercise: i32,
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub unacknowledged: usize,
    pub unresolved: usize,
    /// Blocking alerts with a negative balance, largest overrun first.
    pub top_over_budget: Vec<OverBudgetLine>,
    pub total_overrun: i64,
}

/// `9512` reads `95.1%`.
fn percent(bps: i64) -> String {
    format!("{}.{}%", bps / 100, (bps % 100) / 10)
}

fn alert_message(line: &BudgetLine, ratio_bps: i64, available: i64, severity: Severity) -> String {
    let name = format!("{} ({})", line.code, line.label);
    match severity {
        Severity::Blocking if available < 0 => format!(
            "OVERRUN: line {name} exceeded its allocation by {}",
            available.unsigned_abs()
        ),
        Severity::Blocking => format!("BLOCKING: line {name} has no allocation left"),
        Severity::Critical => format!(
            "CRITICAL: line {name} is {} consumed, {available} left",
            percent(ratio_bps)
        ),
        Severity::Warning => format!(
            "WARNING: line {name} reached {} consumption, {available} left",
            percent(ratio_bps)
        ),
        Severity::Info => format!("INFO: line {name} is {} consumed", percent(ratio_bps)),
    }
}

impl Engine {
    pub async fn create_alert_rule(
        &self,
        input: NewAlertRule,
        actor: &Actor,
    ) -> ResultEngine<AlertRule> {
        if !(1..=BLOCKING_BPS).contains(&input.threshold_bps) {
            return Err(EngineError::InvalidInput(format!(
                "threshold must be within 1..={BLOCKING_BPS} bps, got {}",
                input.threshold_bps
            )));
        }
        let rule = AlertRule {
            id: Uuid::new_v4(),
            threshold_bps: input.threshold_bps,
            line_id: input.line_id,
            description: normalize_optional_text(input.description.as_deref()),
            active: true,
            created_by: actor.id.clone(),
            created_at: actor.at,
        };
        with_tx!(self, Contended::Ledger, |db_tx| {
            self.resolve_authority_tx(
                &db_tx,
                &actor.id,
                ActionScope::Budget,
                Capability::Prepare,
                actor.at,
            )
            .await?;
            if let Some(line_id) = rule.line_id {
                self.find_line(&db_tx, line_id).await?;
            }
            alert_rules::ActiveModel::from(&rule).insert(&db_tx).await?;
            self.record_alert_audit(
                &db_tx,
                "alert_rule",
                rule.id,
                "create",
                actor,
                json!({ "threshold_bps": rule.threshold_bps, "line_id": rule.line_id }),
            )
            .await?;
            Ok(rule.clone())
        })
    }

    pub async fn deactivate_alert_rule(&self, rule_id: Uuid, actor: &Actor) -> ResultEngine<()> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            self.resolve_authority_tx(
                &db_tx,
                &actor.id,
                ActionScope::Budget,
                Capability::Prepare,
                actor.at,
            )
            .await?;
            let result = alert_rules::Entity::update_many()
                .col_expr(alert_rules::Column::Active, Expr::value(false))
                .filter(alert_rules::Column::Id.eq(rule_id.to_string()))
                .filter(alert_rules::Column::Active.eq(true))
                .exec(&db_tx)
                .await?;
            if result.rows_affected == 0 {
                return Err(EngineError::KeyNotFound(format!("active alert rule {rule_id}")));
            }
            self.record_alert_audit(&db_tx, "alert_rule", rule_id, "deactivate", actor, json!({}))
                .await
        })
    }

    /// Rules ordered from the lowest threshold up.
    pub async fn list_alert_rules(&self) -> ResultEngine<Vec<AlertRule>> {
        let models = alert_rules::Entity::find()
            .order_by_asc(alert_rules::Column::ThresholdBps)
            .order_by_asc(alert_rules::Column::CreatedAt)
            .all(&self.database)
            .await?;
        models.into_iter().map(AlertRule::try_from).collect()
    }

    /// Scans the active lines of `exercise` and returns the alerts raised by
    /// this scan. A `(rule, line)` pair with an unresolved alert is skipped.
    pub async fn evaluate(&self, exercise: i32, actor: &Actor) -> ResultEngine<Vec<AlertRecord>> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            self.evaluate_tx(&db_tx, exercise, actor).await
        })
    }

    async fn evaluate_tx(
        &self,
        db_tx: &DatabaseTransaction,
        exercise: i32,
        actor: &Actor,
    ) -> ResultEngine<Vec<AlertRecord>> {
        let rules = alert_rules::Entity::find()
            .filter(alert_rules::Column::Active.eq(true))
            .order_by_asc(alert_rules::Column::ThresholdBps)
            .all(db_tx)
            .await?
            .into_iter()
            .map(AlertRule::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;
        if rules.is_empty() {
            return Ok(Vec::new());
        }

        let lines = budget_lines::Entity::find()
            .filter(budget_lines::Column::Exercise.eq(exercise))
            .filter(budget_lines::Column::Active.eq(true))
            .filter(budget_lines::Column::Status.eq(LineStatus::Validated.as_str()))
            .order_by_asc(budget_lines::Column::Code)
            .all(db_tx)
            .await?;

        let backend = db_tx.get_database_backend();
        let mut raised = Vec::new();
        for model in lines {
            let line = BudgetLine::try_from(model)?;
            let availability = line.availability();
            let Some(ratio_bps) = alerts::alert_ratio_bps(&availability) else {
                continue;
            };
            for rule in rules.iter().filter(|rule| rule.covers(line.id)) {
                if ratio_bps < rule.threshold_bps {
                    continue;
                }
                let severity = Severity::classify(ratio_bps, rule.threshold_bps);
                let record = AlertRecord {
                    id: Uuid::new_v4(),
                    rule_id: rule.id,
                    line_id: line.id,
                    line_code: line.code.clone(),
                    line_label: line.label.clone(),
                    exercise,
                    severity,
                    threshold_bps: rule.threshold_bps,
                    ratio_bps,
                    allocation: availability.allocation,
                    committed: availability.committed,
                    computed_available: availability.available,
                    message: alert_message(&line, ratio_bps, availability.available, severity),
                    created_at: actor.at,
                    acknowledged_at: None,
                    acknowledged_by: None,
                    resolved_at: None,
                    resolved_by: None,
                    resolution_comment: None,
                };
                let stmt = Statement::from_sql_and_values(
                    backend,
                    INSERT_ALERT_SQL,
                    [
                        record.id.to_string().into(),
                        record.rule_id.to_string().into(),
                        record.line_id.to_string().into(),
                        record.line_code.clone().into(),
                        record.line_label.clone().into(),
                        record.exercise.into(),
                        record.severity.as_str().into(),
                        record.threshold_bps.into(),
                        record.ratio_bps.into(),
                        record.allocation.into(),
                        record.committed.into(),
                        record.computed_available.into(),
                        record.message.clone().into(),
                        record.created_at.into(),
                    ],
                );
                if db_tx.execute(stmt).await?.rows_affected() == 0 {
                    continue;
                }
                self.record_alert_audit(
                    db_tx,
                    "alert",
                    record.id,
                    "raise",
                    actor,
                    json!({
                        "rule_id": record.rule_id,
                        "line_id": record.line_id,
                        "severity": record.severity.as_str(),
                        "ratio_bps": record.ratio_bps,
                    }),
                )
                .await?;
                tracing::info!(
                    line = %record.line_code,
                    severity = record.severity.as_str(),
                    ratio_bps = record.ratio_bps,
                    "budget alert raised"
                );
                raised.push(record);
            }
        }
        Ok(raised)
    }

    pub async fn list_alerts(
        &self,
        exercise: i32,
        filter: &AlertFilter,
    ) -> ResultEngine<Vec<AlertRecord>> {
        let mut query = alerts::Entity::find().filter(alerts::Column::Exercise.eq(exercise));
        if let Some(severity) = filter.severity {
            query = query.filter(alerts::Column::Severity.eq(severity.as_str()));
        }
        if let Some(line_id) = filter.line_id {
            query = query.filter(alerts::Column::LineId.eq(line_id.to_string()));
        }
        if filter.unresolved_only {
            query = query.filter(alerts::Column::ResolvedAt.is_null());
        }
        if filter.unacknowledged_only {
            query = query.filter(alerts::Column::AcknowledgedAt.is_null());
        }
        let models = query
            .order_by_desc(alerts::Column::CreatedAt)
            .order_by_asc(alerts::Column::LineCode)
            .all(&self.database)
            .await?;
        models.into_iter().map(AlertRecord::try_from).collect()
    }

    async fn find_alert(
        &self,
        db: &impl ConnectionTrait,
        alert_id: Uuid,
    ) -> ResultEngine<AlertRecord> {
        let model = alerts::Entity::find_by_id(alert_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("alert {alert_id}")))?;
        AlertRecord::try_from(model)
    }

    /// Marks an alert as seen. Acknowledging twice keeps the first
    /// acknowledgement.
    pub async fn acknowledge_alert(
        &self,
        alert_id: Uuid,
        actor: &Actor,
    ) -> ResultEngine<AlertRecord> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            self.resolve_authority_tx(
                &db_tx,
                &actor.id,
                ActionScope::Budget,
                Capability::Prepare,
                actor.at,
            )
            .await?;
            let alert = self.find_alert(&db_tx, alert_id).await?;
            if alert.acknowledged_at.is_some() {
                return Ok(alert);
            }
            alerts::ActiveModel {
                id: ActiveValue::Unchanged(alert_id.to_string()),
                acknowledged_at: ActiveValue::Set(Some(actor.at)),
                acknowledged_by: ActiveValue::Set(Some(actor.id.clone())),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;
            self.record_alert_audit(&db_tx, "alert", alert_id, "acknowledge", actor, json!({}))
                .await?;
            self.find_alert(&db_tx, alert_id).await
        })
    }

    /// Closes an alert. The `(rule, line)` pair can alert again on the next
    /// scan.
    pub async fn resolve_alert(
        &self,
        alert_id: Uuid,
        comment: &str,
        actor: &Actor,
    ) -> ResultEngine<AlertRecord> {
        let comment = require_justification(Some(comment), "resolving an alert")?;
        with_tx!(self, Contended::Ledger, |db_tx| {
            self.resolve_authority_tx(
                &db_tx,
                &actor.id,
                ActionScope::Budget,
                Capability::Prepare,
                actor.at,
            )
            .await?;
            let alert = self.find_alert(&db_tx, alert_id).await?;
            if alert.is_resolved() {
                return Err(EngineError::InvalidTransition(format!(
                    "alert {alert_id} is already resolved"
                )));
            }
            let result = alerts::Entity::update_many()
                .col_expr(alerts::Column::ResolvedAt, Expr::value(actor.at))
                .col_expr(alerts::Column::ResolvedBy, Expr::value(actor.id.as_str()))
                .col_expr(
                    alerts::Column::ResolutionComment,
                    Expr::value(comment.as_str()),
                )
                .filter(alerts::Column::Id.eq(alert_id.to_string()))
                .filter(alerts::Column::ResolvedAt.is_null())
                .exec(&db_tx)
                .await?;
            if result.rows_affected == 0 {
                return Err(EngineError::LedgerContention(format!(
                    "alert {alert_id} resolved concurrently"
                )));
            }
            self.record_alert_audit(
                &db_tx,
                "alert",
                alert_id,
                "resolve",
                actor,
                json!({ "comment": comment }),
            )
            .await?;
            self.find_alert(&db_tx, alert_id).await
        })
    }

    /// Counts by severity and status plus the worst overruns of `exercise`.
    pub async fn alert_summary(&self, exercise: i32) -> ResultEngine<AlertSummary> {
        let alerts = self.list_alerts(exercise, &AlertFilter::default()).await?;
        let mut by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.into_iter().map(|s| (s, 0)).collect();
        let mut top_over_budget = Vec::new();
        let mut total_overrun = 0;
        for alert in &alerts {
            *by_severity.entry(alert.severity).or_default() += 1;
            if alert.severity == Severity::Blocking && alert.computed_available < 0 {
                let overrun = -alert.computed_available;
                total_overrun += overrun;
                top_over_budget.push(OverBudgetLine {
                    line_id: alert.line_id,
                    line_code: alert.line_code.clone(),
                    line_label: alert.line_label.clone(),
                    overrun,
                    ratio_bps: alert.ratio_bps,
                });
            }
        }
        top_over_budget.sort_by(|a, b| b.overrun.cmp(&a.overrun));
        top_over_budget.truncate(TOP_OVER_BUDGET);

        Ok(AlertSummary {
            exercise,
            total: alerts.len(),
            by_severity,
            unacknowledged: alerts.iter().filter(|a| a.acknowledged_at.is_none()).count(),
            unresolved: alerts.iter().filter(|a| !a.is_resolved()).count(),
            top_over_budget,
            total_overrun,
        })
    }

    async fn record_alert_audit(
        &self,
        db_tx: &DatabaseTransaction,
        entity_type: &str,
        entity_id: Uuid,
        action: &str,
        actor: &Actor,
        payload: serde_json::Value,
    ) -> ResultEngine<()> {
        self.record_tx(
            db_tx,
            AuditDraft {
                entity_type,
                entity_id: entity_id.to_string(),
                action,
                actor_id: &actor.id,
                on_behalf_of: None,
                payload,
                at: actor.at,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_keeps_one_decimal() {
        assert_eq!(percent(9_512), "95.1%");
        assert_eq!(percent(10_000), "100.0%");
        assert_eq!(percent(805), "8.0%");
    }
}
