//! Initial schema.
//!
//! - `budget_lines`: allocations and their execution counters
//! - `budget_movements`: journal of every counter change
//! - `documents`: the expenditure chain (notes to settlements)
//! - `workflow_transitions`: one row per state change of a document
//! - `sequence_counters`: reference numbering per kind and month
//! - `actor_roles`: roles held directly by actors
//! - `delegations`: time boxed authority handed from one actor to another

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum BudgetLines {
    Table,
    Id,
    Code,
    Label,
    Exercise,
    UnitId,
    ObjectiveId,
    NatureCode,
    InitialAllocation,
    TransfersIn,
    TransfersOut,
    Committed,
    Liquidated,
    Ordered,
    Paid,
    Status,
    Active,
    CreatedBy,
    CreatedAt,
}

#[derive(Iden)]
enum BudgetMovements {
    Table,
    Id,
    LineId,
    Kind,
    Amount,
    AvailableBefore,
    AvailableAfter,
    Source,
    ActorId,
    Overridden,
    OccurredAt,
}

#[derive(Iden)]
enum Documents {
    Table,
    Id,
    Kind,
    Exercise,
    Reference,
    BudgetLineId,
    ParentId,
    Object,
    Amount,
    ReservedAmount,
    Status,
    DeferralDeadline,
    DeferralCondition,
    RejectionReason,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum WorkflowTransitions {
    Table,
    Id,
    DocumentId,
    Action,
    FromStatus,
    ToStatus,
    ActorId,
    Authority,
    Role,
    Scope,
    DelegatorId,
    DelegationId,
    Justification,
    ResumeBy,
    ResumeCondition,
    Reference,
    OccurredAt,
}

#[derive(Iden)]
enum SequenceCounters {
    Table,
    ScopeKey,
    LastValue,
    UpdatedAt,
}

#[derive(Iden)]
enum ActorRoles {
    Table,
    ActorId,
    Role,
    Active,
    GrantedBy,
    GrantedAt,
}

#[derive(Iden)]
enum Delegations {
    Table,
    Id,
    DelegatorId,
    DelegateId,
    Scopes,
    StartsAt,
    EndsAt,
    Active,
    Reason,
    CreatedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Budget lines
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(BudgetLines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BudgetLines::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BudgetLines::Code).string().not_null())
                    .col(ColumnDef::new(BudgetLines::Label).string().not_null())
                    .col(ColumnDef::new(BudgetLines::Exercise).integer().not_null())
                    .col(ColumnDef::new(BudgetLines::UnitId).string())
                    .col(ColumnDef::new(BudgetLines::ObjectiveId).string())
                    .col(ColumnDef::new(BudgetLines::NatureCode).string())
                    .col(
                        ColumnDef::new(BudgetLines::InitialAllocation)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BudgetLines::TransfersIn)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BudgetLines::TransfersOut)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BudgetLines::Committed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BudgetLines::Liquidated)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BudgetLines::Ordered)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BudgetLines::Paid)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(BudgetLines::Status).string().not_null())
                    .col(ColumnDef::new(BudgetLines::Active).boolean().not_null())
                    .col(ColumnDef::new(BudgetLines::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(BudgetLines::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-budget_lines-exercise-code-unique")
                    .table(BudgetLines::Table)
                    .col(BudgetLines::Exercise)
                    .col(BudgetLines::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Budget movements
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(BudgetMovements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BudgetMovements::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BudgetMovements::LineId).string().not_null())
                    .col(ColumnDef::new(BudgetMovements::Kind).string().not_null())
                    .col(
                        ColumnDef::new(BudgetMovements::Amount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BudgetMovements::AvailableBefore)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BudgetMovements::AvailableAfter)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BudgetMovements::Source).string().not_null())
                    .col(ColumnDef::new(BudgetMovements::ActorId).string().not_null())
                    .col(
                        ColumnDef::new(BudgetMovements::Overridden)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(BudgetMovements::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-budget_movements-line_id")
                            .from(BudgetMovements::Table, BudgetMovements::LineId)
                            .to(BudgetLines::Table, BudgetLines::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-budget_movements-line_id")
                    .table(BudgetMovements::Table)
                    .col(BudgetMovements::LineId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Documents
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Documents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Documents::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Documents::Kind).string().not_null())
                    .col(ColumnDef::new(Documents::Exercise).integer().not_null())
                    .col(ColumnDef::new(Documents::Reference).string().unique_key())
                    .col(ColumnDef::new(Documents::BudgetLineId).string())
                    .col(ColumnDef::new(Documents::ParentId).string())
                    .col(ColumnDef::new(Documents::Object).string().not_null())
                    .col(ColumnDef::new(Documents::Amount).big_integer().not_null())
                    .col(
                        ColumnDef::new(Documents::ReservedAmount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Documents::Status).string().not_null())
                    .col(ColumnDef::new(Documents::DeferralDeadline).timestamp_with_time_zone())
                    .col(ColumnDef::new(Documents::DeferralCondition).string())
                    .col(ColumnDef::new(Documents::RejectionReason).string())
                    .col(ColumnDef::new(Documents::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(Documents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Documents::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-documents-budget_line_id")
                            .from(Documents::Table, Documents::BudgetLineId)
                            .to(BudgetLines::Table, BudgetLines::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-documents-parent_id")
                            .from(Documents::Table, Documents::ParentId)
                            .to(Documents::Table, Documents::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-documents-exercise-kind-status")
                    .table(Documents::Table)
                    .col(Documents::Exercise)
                    .col(Documents::Kind)
                    .col(Documents::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-documents-parent_id")
                    .table(Documents::Table)
                    .col(Documents::ParentId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Workflow transitions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(WorkflowTransitions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkflowTransitions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WorkflowTransitions::DocumentId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WorkflowTransitions::Action).string().not_null())
                    .col(
                        ColumnDef::new(WorkflowTransitions::FromStatus)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkflowTransitions::ToStatus)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WorkflowTransitions::ActorId).string().not_null())
                    .col(
                        ColumnDef::new(WorkflowTransitions::Authority)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WorkflowTransitions::Role).string().not_null())
                    .col(ColumnDef::new(WorkflowTransitions::Scope).string().not_null())
                    .col(ColumnDef::new(WorkflowTransitions::DelegatorId).string())
                    .col(ColumnDef::new(WorkflowTransitions::DelegationId).string())
                    .col(ColumnDef::new(WorkflowTransitions::Justification).string())
                    .col(ColumnDef::new(WorkflowTransitions::ResumeBy).timestamp_with_time_zone())
                    .col(ColumnDef::new(WorkflowTransitions::ResumeCondition).string())
                    .col(ColumnDef::new(WorkflowTransitions::Reference).string())
                    .col(
                        ColumnDef::new(WorkflowTransitions::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-workflow_transitions-document_id")
                            .from(WorkflowTransitions::Table, WorkflowTransitions::DocumentId)
                            .to(Documents::Table, Documents::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-workflow_transitions-document_id")
                    .table(WorkflowTransitions::Table)
                    .col(WorkflowTransitions::DocumentId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Sequence counters
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(SequenceCounters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SequenceCounters::ScopeKey)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SequenceCounters::LastValue)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SequenceCounters::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 6. Actor roles
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(ActorRoles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ActorRoles::ActorId).string().not_null())
                    .col(ColumnDef::new(ActorRoles::Role).string().not_null())
                    .col(ColumnDef::new(ActorRoles::Active).boolean().not_null())
                    .col(ColumnDef::new(ActorRoles::GrantedBy).string().not_null())
                    .col(
                        ColumnDef::new(ActorRoles::GrantedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(ActorRoles::ActorId)
                            .col(ActorRoles::Role),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 7. Delegations
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Delegations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Delegations::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Delegations::DelegatorId).string().not_null())
                    .col(ColumnDef::new(Delegations::DelegateId).string().not_null())
                    .col(ColumnDef::new(Delegations::Scopes).string().not_null())
                    .col(
                        ColumnDef::new(Delegations::StartsAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Delegations::EndsAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Delegations::Active).boolean().not_null())
                    .col(ColumnDef::new(Delegations::Reason).string())
                    .col(
                        ColumnDef::new(Delegations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-delegations-delegate_id")
                    .table(Delegations::Table)
                    .col(Delegations::DelegateId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Reverse order of creation.
        manager
            .drop_table(Table::drop().table(Delegations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ActorRoles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SequenceCounters::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WorkflowTransitions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Documents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BudgetMovements::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BudgetLines::Table).to_owned())
            .await?;
        Ok(())
    }
}
