//! Credit transfers.
//!
//! Approval debits the source and credits the destination inside one
//! transaction through the ledger's movement primitive; there is no state
//! in which only one side has moved.

use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, prelude::*, sea_query::Expr};
use serde_json::json;
use uuid::Uuid;

use crate::{
    ActingAuthority, ActionScope, Actor, Capability, Contended, CreditTransfer, EngineError,
    LineStatus, MovementKind, Period, ReferenceKind, ResultEngine, SideSnapshot, TransferKind,
    TransferStatus, credit_transfers,
    util::{ensure_positive, require_justification},
};

use super::{Engine, audit::AuditDraft, ledger::MovementRequest, with_tx};

/// Input for [`Engine::request_transfer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTransfer {
    pub kind: TransferKind,
    pub exercise: i32,
    /// Required for [`TransferKind::Transfer`], absent for adjustments.
    pub from_line_id: Option<Uuid>,
    pub to_line_id: Uuid,
    pub amount: i64,
    pub justification: String,
}

impl Engine {
    async fn find_transfer(
        &self,
        db: &impl ConnectionTrait,
        transfer_id: Uuid,
    ) -> ResultEngine<CreditTransfer> {
        let model = credit_transfers::Entity::find_by_id(transfer_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("credit_transfer {transfer_id}")))?;
        CreditTransfer::try_from(model)
    }

    /// Records a pending transfer with a freshly minted code. The source's
    /// availability is checked now and again on approval.
    pub async fn request_transfer(
        &self,
        input: NewTransfer,
        actor: &Actor,
    ) -> ResultEngine<CreditTransfer> {
        ensure_positive(input.amount, "transfer amount")?;
        let justification = require_justification(Some(&input.justification), "transfer")?;
        match (input.kind, input.from_line_id) {
            (TransferKind::Transfer, None) => {
                return Err(EngineError::InvalidInput(
                    "a transfer needs a source line".to_string(),
                ));
            }
            (TransferKind::Transfer, Some(from)) if from == input.to_line_id => {
                return Err(EngineError::InvalidInput(
                    "source and destination lines must differ".to_string(),
                ));
            }
            (TransferKind::Adjustment, Some(_)) => {
                return Err(EngineError::InvalidInput(
                    "an adjustment has no source line".to_string(),
                ));
            }
            _ => {}
        }

        with_tx!(self, Contended::Ledger, |db_tx| {
            let authority = self
                .resolve_authority_tx(
                    &db_tx,
                    &actor.id,
                    ActionScope::Transfers,
                    Capability::Prepare,
                    actor.at,
                )
                .await?;
            for line_id in input.from_line_id.into_iter().chain([input.to_line_id]) {
                self.ensure_transfer_line(&db_tx, line_id, input.exercise)
                    .await?;
            }
            if let Some(from) = input.from_line_id {
                let available = self.find_line(&db_tx, from).await?.available();
                if available < input.amount {
                    return Err(EngineError::InsufficientFunds {
                        line_id: from.to_string(),
                        requested: input.amount,
                        available,
                        shortfall: input.amount.saturating_sub(available),
                    });
                }
            }

            let code = self
                .mint_reference_tx(
                    &db_tx,
                    ReferenceKind::CreditTransfer,
                    Period::within_exercise(input.exercise, actor.at),
                    actor.at,
                )
                .await?;
            let transfer = CreditTransfer {
                id: Uuid::new_v4(),
                code,
                exercise: input.exercise,
                kind: input.kind,
                from_line_id: input.from_line_id,
                to_line_id: input.to_line_id,
                amount: input.amount,
                justification: justification.clone(),
                status: TransferStatus::Pending,
                requested_by: actor.id.clone(),
                requested_at: actor.at,
                decided_by: None,
                decided_at: None,
                rejection_reason: None,
                from_snapshot: None,
                to_snapshot: None,
            };
            credit_transfers::ActiveModel::from(&transfer)
                .insert(&db_tx)
                .await?;
            self.record_transfer_audit(
                &db_tx,
                &transfer,
                "request",
                actor,
                &authority,
                json!({
                    "kind": transfer.kind.as_str(),
                    "from_line_id": transfer.from_line_id,
                    "to_line_id": transfer.to_line_id,
                    "amount": transfer.amount,
                }),
            )
            .await?;
            tracing::info!(
                transfer = %transfer.code,
                amount = transfer.amount,
                "transfer requested"
            );
            Ok(transfer)
        })
    }

    async fn ensure_transfer_line(
        &self,
        db_tx: &DatabaseTransaction,
        line_id: Uuid,
        exercise: i32,
    ) -> ResultEngine<()> {
        let line = self.find_line(db_tx, line_id).await?;
        if line.exercise != exercise {
            return Err(EngineError::InvalidInput(format!(
                "budget line {} belongs to exercise {}",
                line.code, line.exercise
            )));
        }
        if line.status != LineStatus::Validated || !line.active {
            return Err(EngineError::InvalidTransition(format!(
                "budget line {} cannot take transfers",
                line.code
            )));
        }
        Ok(())
    }

    /// Approves a pending transfer, re-checking the source's availability.
    pub async fn approve_transfer(
        &self,
        transfer_id: Uuid,
        actor: &Actor,
    ) -> ResultEngine<CreditTransfer> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            let authority = self
                .resolve_authority_tx(
                    &db_tx,
                    &actor.id,
                    ActionScope::Transfers,
                    Capability::Decide,
                    actor.at,
                )
                .await?;
            let transfer = self
                .decide_transfer_tx(&db_tx, transfer_id, TransferStatus::Approved, None, actor)
                .await?;

            let from_snapshot = match transfer.from_line_id {
                Some(from) => {
                    let debit = self
                        .apply_movement(
                            &db_tx,
                            MovementRequest {
                                line_id: from,
                                kind: MovementKind::TransferOut,
                                amount: transfer.amount,
                                source: &transfer.code,
                                actor_id: &actor.id,
                                at: actor.at,
                                overridden: false,
                            },
                        )
                        .await?;
                    Some(SideSnapshot {
                        available_before: debit.available_before,
                        available_after: debit.available_after,
                    })
                }
                None => None,
            };
            let credit = self
                .apply_movement(
                    &db_tx,
                    MovementRequest {
                        line_id: transfer.to_line_id,
                        kind: MovementKind::TransferIn,
                        amount: transfer.amount,
                        source: &transfer.code,
                        actor_id: &actor.id,
                        at: actor.at,
                        overridden: false,
                    },
                )
                .await?;
            let to_snapshot = SideSnapshot {
                available_before: credit.available_before,
                available_after: credit.available_after,
            };

            credit_transfers::Entity::update_many()
                .col_expr(
                    credit_transfers::Column::FromAvailableBefore,
                    Expr::value(from_snapshot.map(|s| s.available_before)),
                )
                .col_expr(
                    credit_transfers::Column::FromAvailableAfter,
                    Expr::value(from_snapshot.map(|s| s.available_after)),
                )
                .col_expr(
                    credit_transfers::Column::ToAvailableBefore,
                    Expr::value(to_snapshot.available_before),
                )
                .col_expr(
                    credit_transfers::Column::ToAvailableAfter,
                    Expr::value(to_snapshot.available_after),
                )
                .filter(credit_transfers::Column::Id.eq(transfer_id.to_string()))
                .exec(&db_tx)
                .await?;

            let transfer = self.find_transfer(&db_tx, transfer_id).await?;
            self.record_transfer_audit(
                &db_tx,
                &transfer,
                "approve",
                actor,
                &authority,
                json!({ "from": from_snapshot, "to": to_snapshot }),
            )
            .await?;
            tracing::info!(
                transfer = %transfer.code,
                amount = transfer.amount,
                actor = %actor.id,
                "transfer approved"
            );
            Ok(transfer)
        })
    }

    pub async fn reject_transfer(
        &self,
        transfer_id: Uuid,
        reason: &str,
        actor: &Actor,
    ) -> ResultEngine<CreditTransfer> {
        let reason = require_justification(Some(reason), "rejecting a transfer")?;
        with_tx!(self, Contended::Ledger, |db_tx| {
            let authority = self
                .resolve_authority_tx(
                    &db_tx,
                    &actor.id,
                    ActionScope::Transfers,
                    Capability::Decide,
                    actor.at,
                )
                .await?;
            let transfer = self
                .decide_transfer_tx(
                    &db_tx,
                    transfer_id,
                    TransferStatus::Rejected,
                    Some(reason.as_str()),
                    actor,
                )
                .await?;
            self.record_transfer_audit(
                &db_tx,
                &transfer,
                "reject",
                actor,
                &authority,
                json!({ "reason": reason }),
            )
            .await?;
            tracing::info!(transfer = %transfer.code, "transfer rejected");
            Ok(transfer)
        })
    }

    /// Moves a pending transfer to its terminal status. Only one decision
    /// can ever win.
    async fn decide_transfer_tx(
        &self,
        db_tx: &DatabaseTransaction,
        transfer_id: Uuid,
        status: TransferStatus,
        reason: Option<&str>,
        actor: &Actor,
    ) -> ResultEngine<CreditTransfer> {
        let current = self.find_transfer(db_tx, transfer_id).await?;
        if current.status != TransferStatus::Pending {
            return Err(EngineError::InvalidTransition(format!(
                "transfer {} is already {}",
                current.code,
                current.status.as_str()
            )));
        }
        let result = credit_transfers::Entity::update_many()
            .col_expr(credit_transfers::Column::Status, Expr::value(status.as_str()))
            .col_expr(
                credit_transfers::Column::DecidedBy,
                Expr::value(actor.id.as_str()),
            )
            .col_expr(credit_transfers::Column::DecidedAt, Expr::value(actor.at))
            .col_expr(
                credit_transfers::Column::RejectionReason,
                Expr::value(reason.map(ToString::to_string)),
            )
            .filter(credit_transfers::Column::Id.eq(transfer_id.to_string()))
            .filter(credit_transfers::Column::Status.eq(TransferStatus::Pending.as_str()))
            .exec(db_tx)
            .await?;
        if result.rows_affected == 0 {
            return Err(EngineError::LedgerContention(format!(
                "transfer {} decided concurrently",
                current.code
            )));
        }
        self.find_transfer(db_tx, transfer_id).await
    }

    async fn record_transfer_audit(
        &self,
        db_tx: &DatabaseTransaction,
        transfer: &CreditTransfer,
        action: &str,
        actor: &Actor,
        authority: &ActingAuthority,
        payload: serde_json::Value,
    ) -> ResultEngine<()> {
        self.record_tx(
            db_tx,
            AuditDraft {
                entity_type: "credit_transfer",
                entity_id: transfer.id.to_string(),
                action,
                actor_id: &actor.id,
                on_behalf_of: authority.delegator_id(),
                payload,
                at: actor.at,
            },
        )
        .await
    }

    pub async fn transfer(&self, transfer_id: Uuid) -> ResultEngine<CreditTransfer> {
        self.find_transfer(&self.database, transfer_id).await
    }

    /// Transfers of an exercise, oldest first, optionally by status.
    pub async fn list_transfers(
        &self,
        exercise: i32,
        status: Option<TransferStatus>,
    ) -> ResultEngine<Vec<CreditTransfer>> {
        let mut query = credit_transfers::Entity::find()
            .filter(credit_transfers::Column::Exercise.eq(exercise));
        if let Some(status) = status {
            query = query.filter(credit_transfers::Column::Status.eq(status.as_str()));
        }
        let models = query
            .order_by_asc(credit_transfers::Column::RequestedAt)
            .order_by_asc(credit_transfers::Column::Code)
            .all(&self.database)
            .await?;
        models.into_iter().map(CreditTransfer::try_from).collect()
    }
}
