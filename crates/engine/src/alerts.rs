//! Alerts raised when a line's consumption crosses a rule's threshold.
//!
//! At most one unresolved alert exists per `(rule, line)`; the migration
//! backs this with a partial unique index so concurrent scans cannot both
//! insert one.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, LineAvailability, util::parse_uuid};

/// Consumption at or above which an alert blocks further commitments.
pub const BLOCKING_BPS: i64 = 10_000;
/// Consumption at or above which an alert is critical.
pub const CRITICAL_BPS: i64 = 9_500;

/// Consumption ratio used to raise alerts. A line without allocation that
/// still carries commitments is fully over budget and counts as blocking;
/// one without commitments has nothing to report.
pub fn alert_ratio_bps(availability: &LineAvailability) -> Option<i64> {
    match availability.consumption_bps() {
        Some(ratio) => Some(ratio),
        None if availability.committed > 0 => Some(BLOCKING_BPS),
        None => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Blocking,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Self::Info,
        Self::Warning,
        Self::Critical,
        Self::Blocking,
    ];

    /// Severity of a consumption ratio measured against a rule threshold.
    pub fn classify(ratio_bps: i64, threshold_bps: i64) -> Self {
        if ratio_bps >= BLOCKING_BPS {
            Self::Blocking
        } else if ratio_bps >= CRITICAL_BPS {
            Self::Critical
        } else if ratio_bps >= threshold_bps {
            Self::Warning
        } else {
            Self::Info
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Blocking => "blocking",
        }
    }
}

impl TryFrom<&str> for Severity {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == value)
            .ok_or_else(|| EngineError::InvalidInput(format!("invalid severity: {value}")))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub line_id: Uuid,
    pub line_code: String,
    pub line_label: String,
    pub exercise: i32,
    pub severity: Severity,
    /// Threshold of the rule that fired.
    pub threshold_bps: i64,
    /// Consumption observed when the alert was raised.
    pub ratio_bps: i64,
    pub allocation: i64,
    pub committed: i64,
    pub computed_available: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_comment: Option<String>,
}

impl AlertRecord {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub rule_id: String,
    pub line_id: String,
    pub line_code: String,
    pub line_label: String,
    pub exercise: i32,
    pub severity: String,
    pub threshold_bps: i64,
    pub ratio_bps: i64,
    pub allocation: i64,
    pub committed: i64,
    pub computed_available: i64,
    pub message: String,
    pub created_at: DateTimeUtc,
    pub acknowledged_at: Option<DateTimeUtc>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTimeUtc>,
    pub resolved_by: Option<String>,
    pub resolution_comment: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::alert_rules::Entity",
        from = "Column::RuleId",
        to = "super::alert_rules::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    AlertRules,
}

impl Related<super::alert_rules::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlertRules.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for AlertRecord {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "alert")?,
            rule_id: parse_uuid(&model.rule_id, "alert_rule")?,
            line_id: parse_uuid(&model.line_id, "budget_line")?,
            line_code: model.line_code,
            line_label: model.line_label,
            exercise: model.exercise,
            severity: Severity::try_from(model.severity.as_str())?,
            threshold_bps: model.threshold_bps,
            ratio_bps: model.ratio_bps,
            allocation: model.allocation,
            committed: model.committed,
            computed_available: model.computed_available,
            message: model.message,
            created_at: model.created_at,
            acknowledged_at: model.acknowledged_at,
            acknowledged_by: model.acknowledged_by,
            resolved_at: model.resolved_at,
            resolved_by: model.resolved_by,
            resolution_comment: model.resolution_comment,
        })
    }
}
