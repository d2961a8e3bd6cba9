//! Credit transfers, budget alerts and the audit trail.

use sea_orm::ConnectionTrait;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum BudgetLines {
    Table,
    Id,
}

#[derive(Iden)]
enum CreditTransfers {
    Table,
    Id,
    Code,
    Exercise,
    Kind,
    FromLineId,
    ToLineId,
    Amount,
    Justification,
    Status,
    RequestedBy,
    RequestedAt,
    DecidedBy,
    DecidedAt,
    RejectionReason,
    FromAvailableBefore,
    FromAvailableAfter,
    ToAvailableBefore,
    ToAvailableAfter,
}

#[derive(Iden)]
enum AlertRules {
    Table,
    Id,
    ThresholdBps,
    LineId,
    Description,
    Active,
    CreatedBy,
    CreatedAt,
}

#[derive(Iden)]
enum Alerts {
    Table,
    Id,
    RuleId,
    LineId,
    LineCode,
    LineLabel,
    Exercise,
    Severity,
    ThresholdBps,
    RatioBps,
    Allocation,
    Committed,
    ComputedAvailable,
    Message,
    CreatedAt,
    AcknowledgedAt,
    AcknowledgedBy,
    ResolvedAt,
    ResolvedBy,
    ResolutionComment,
}

#[derive(Iden)]
enum AuditEntries {
    Table,
    Id,
    EntityType,
    EntityId,
    Action,
    ActorId,
    OnBehalfOf,
    Payload,
    RecordedAt,
}

// At most one open alert per (rule, line). sea-query cannot express a
// partial index, so it is written by hand.
const OPEN_ALERTS_INDEX: &str = r#"CREATE UNIQUE INDEX IF NOT EXISTS "uidx-alerts-open-rule_id-line_id" ON alerts (rule_id, line_id) WHERE resolved_at IS NULL"#;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CreditTransfers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CreditTransfers::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CreditTransfers::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(CreditTransfers::Exercise).integer().not_null())
                    .col(ColumnDef::new(CreditTransfers::Kind).string().not_null())
                    .col(ColumnDef::new(CreditTransfers::FromLineId).string())
                    .col(ColumnDef::new(CreditTransfers::ToLineId).string().not_null())
                    .col(
                        ColumnDef::new(CreditTransfers::Amount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CreditTransfers::Justification)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CreditTransfers::Status).string().not_null())
                    .col(
                        ColumnDef::new(CreditTransfers::RequestedBy)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CreditTransfers::RequestedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CreditTransfers::DecidedBy).string())
                    .col(ColumnDef::new(CreditTransfers::DecidedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(CreditTransfers::RejectionReason).string())
                    .col(ColumnDef::new(CreditTransfers::FromAvailableBefore).big_integer())
                    .col(ColumnDef::new(CreditTransfers::FromAvailableAfter).big_integer())
                    .col(ColumnDef::new(CreditTransfers::ToAvailableBefore).big_integer())
                    .col(ColumnDef::new(CreditTransfers::ToAvailableAfter).big_integer())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-credit_transfers-from_line_id")
                            .from(CreditTransfers::Table, CreditTransfers::FromLineId)
                            .to(BudgetLines::Table, BudgetLines::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-credit_transfers-to_line_id")
                            .from(CreditTransfers::Table, CreditTransfers::ToLineId)
                            .to(BudgetLines::Table, BudgetLines::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-credit_transfers-exercise-status")
                    .table(CreditTransfers::Table)
                    .col(CreditTransfers::Exercise)
                    .col(CreditTransfers::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AlertRules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlertRules::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AlertRules::ThresholdBps)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AlertRules::LineId).string())
                    .col(ColumnDef::new(AlertRules::Description).string())
                    .col(ColumnDef::new(AlertRules::Active).boolean().not_null())
                    .col(ColumnDef::new(AlertRules::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(AlertRules::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-alert_rules-line_id")
                            .from(AlertRules::Table, AlertRules::LineId)
                            .to(BudgetLines::Table, BudgetLines::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Alerts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Alerts::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Alerts::RuleId).string().not_null())
                    .col(ColumnDef::new(Alerts::LineId).string().not_null())
                    .col(ColumnDef::new(Alerts::LineCode).string().not_null())
                    .col(ColumnDef::new(Alerts::LineLabel).string().not_null())
                    .col(ColumnDef::new(Alerts::Exercise).integer().not_null())
                    .col(ColumnDef::new(Alerts::Severity).string().not_null())
                    .col(ColumnDef::new(Alerts::ThresholdBps).big_integer().not_null())
                    .col(ColumnDef::new(Alerts::RatioBps).big_integer().not_null())
                    .col(ColumnDef::new(Alerts::Allocation).big_integer().not_null())
                    .col(ColumnDef::new(Alerts::Committed).big_integer().not_null())
                    .col(
                        ColumnDef::new(Alerts::ComputedAvailable)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alerts::Message).string().not_null())
                    .col(
                        ColumnDef::new(Alerts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alerts::AcknowledgedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Alerts::AcknowledgedBy).string())
                    .col(ColumnDef::new(Alerts::ResolvedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Alerts::ResolvedBy).string())
                    .col(ColumnDef::new(Alerts::ResolutionComment).string())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-alerts-rule_id")
                            .from(Alerts::Table, Alerts::RuleId)
                            .to(AlertRules::Table, AlertRules::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-alerts-line_id")
                            .from(Alerts::Table, Alerts::LineId)
                            .to(BudgetLines::Table, BudgetLines::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-alerts-exercise-severity")
                    .table(Alerts::Table)
                    .col(Alerts::Exercise)
                    .col(Alerts::Severity)
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(OPEN_ALERTS_INDEX)
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AuditEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuditEntries::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AuditEntries::EntityType).string().not_null())
                    .col(ColumnDef::new(AuditEntries::EntityId).string().not_null())
                    .col(ColumnDef::new(AuditEntries::Action).string().not_null())
                    .col(ColumnDef::new(AuditEntries::ActorId).string().not_null())
                    .col(ColumnDef::new(AuditEntries::OnBehalfOf).string())
                    .col(ColumnDef::new(AuditEntries::Payload).text().not_null())
                    .col(
                        ColumnDef::new(AuditEntries::RecordedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-audit_entries-entity")
                    .table(AuditEntries::Table)
                    .col(AuditEntries::EntityType)
                    .col(AuditEntries::EntityId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuditEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Alerts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AlertRules::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CreditTransfers::Table).to_owned())
            .await?;
        Ok(())
    }
}
