//! The document workflow.
//!
//! Every transition runs in one transaction that resolves the actor's
//! authority, applies the kind-specific guard (ledger movement, chain
//! bound), mints the reference when the document first becomes official,
//! compare-and-sets the status, appends the transition record and writes
//! the audit entry. Any failure leaves the document and the ledger as they
//! were.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, prelude::*, sea_query::Expr,
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    ActingAuthority, ActionScope, Actor, Capability, Contended, Document, DocumentKind,
    DocumentStatus, EngineError, LineStatus, MovementKind, NewDocument, Period,
    ReferenceAssignment, ResultEngine, TransitionRecord, WorkflowAction, documents,
    util::{
        ensure_positive, normalize_optional_text, normalize_required_text, require_justification,
    },
    workflow_transitions,
};

use super::{Engine, audit::AuditDraft, ledger::MovementRequest, with_tx};

/// What a successful transition produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    pub document: Document,
    pub record: TransitionRecord,
    /// Set when the transition entered the kind's official state.
    pub reference: Option<ReferenceAssignment>,
}

/// Filter for [`Engine::list_documents`]. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    pub exercise: Option<i32>,
    pub kind: Option<DocumentKind>,
    pub status: Option<DocumentStatus>,
    pub budget_line_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
}

struct TransitionRequest<'a> {
    document_id: Uuid,
    action: WorkflowAction,
    justification: Option<&'a str>,
    resume_by: Option<DateTime<Utc>>,
    resume_condition: Option<&'a str>,
}

impl WorkflowAction {
    fn capability(self) -> Capability {
        match self {
            Self::Submit | Self::Resubmit | Self::Cancel => Capability::Prepare,
            Self::Validate | Self::Reject | Self::Defer => Capability::Decide,
        }
    }
}

impl Engine {
    async fn find_document(
        &self,
        db: &impl ConnectionTrait,
        document_id: Uuid,
    ) -> ResultEngine<Document> {
        let model = documents::Entity::find_by_id(document_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("document {document_id}")))?;
        Document::try_from(model)
    }

    /// Sum of the validated children of `parent_id`.
    async fn validated_children_total(
        &self,
        db: &impl ConnectionTrait,
        parent_id: Uuid,
    ) -> ResultEngine<i64> {
        let children = documents::Entity::find()
            .filter(documents::Column::ParentId.eq(parent_id.to_string()))
            .filter(documents::Column::Status.eq(DocumentStatus::Validated.as_str()))
            .all(db)
            .await?;
        Ok(children.iter().map(|child| child.amount).sum())
    }

    /// Creates a draft document.
    ///
    /// Anything after a commitment hangs off a validated document of the
    /// preceding kind, inherits its budget line and may not exceed what is
    /// left of it.
    pub async fn create_document(
        &self,
        input: NewDocument,
        actor: &Actor,
    ) -> ResultEngine<Document> {
        ensure_positive(input.amount, "document amount")?;
        let object = normalize_required_text(&input.object, "document object")?;
        if input.kind.requires_parent() && input.parent_id.is_none() {
            return Err(EngineError::InvalidInput(format!(
                "a {} needs a validated {}",
                input.kind.as_str(),
                input.kind.parent_kind().map_or("parent", DocumentKind::as_str)
            )));
        }

        with_tx!(self, Contended::Ledger, |db_tx| {
            let authority = self
                .resolve_authority_tx(
                    &db_tx,
                    &actor.id,
                    ActionScope::Document(input.kind),
                    Capability::Prepare,
                    actor.at,
                )
                .await?;

            let mut budget_line_id = input.budget_line_id;
            if let Some(parent_id) = input.parent_id {
                let parent = self.find_document(&db_tx, parent_id).await?;
                if Some(parent.kind) != input.kind.parent_kind() {
                    return Err(EngineError::InvalidInput(format!(
                        "a {} cannot follow a {}",
                        input.kind.as_str(),
                        parent.kind.as_str()
                    )));
                }
                if parent.status != DocumentStatus::Validated {
                    return Err(EngineError::InvalidTransition(format!(
                        "{} {parent_id} is {}, not validated",
                        parent.kind.as_str(),
                        parent.status.as_str()
                    )));
                }
                if parent.exercise != input.exercise {
                    return Err(EngineError::InvalidInput(format!(
                        "{} {parent_id} belongs to exercise {}",
                        parent.kind.as_str(),
                        parent.exercise
                    )));
                }
                match (budget_line_id, parent.budget_line_id) {
                    (Some(own), Some(inherited)) if own != inherited => {
                        return Err(EngineError::InvalidInput(format!(
                            "budget line {own} differs from the parent's {inherited}"
                        )));
                    }
                    (_, inherited) => budget_line_id = budget_line_id.or(inherited),
                }
                let remaining = parent.ceiling()
                    - self.validated_children_total(&db_tx, parent_id).await?;
                if input.amount > remaining {
                    return Err(EngineError::InvalidAmount(format!(
                        "{} exceeds the {remaining} left on {} {parent_id}",
                        input.amount,
                        parent.kind.as_str()
                    )));
                }
            }
            if let Some(line_id) = budget_line_id {
                let line = self.find_line(&db_tx, line_id).await?;
                if line.exercise != input.exercise {
                    return Err(EngineError::InvalidInput(format!(
                        "budget line {} belongs to exercise {}",
                        line.code, line.exercise
                    )));
                }
            }

            let document = Document {
                id: Uuid::new_v4(),
                kind: input.kind,
                exercise: input.exercise,
                reference: None,
                budget_line_id,
                parent_id: input.parent_id,
                object: object.clone(),
                amount: input.amount,
                reserved_amount: 0,
                status: DocumentStatus::Draft,
                deferral_deadline: None,
                deferral_condition: None,
                rejection_reason: None,
                created_by: actor.id.clone(),
                created_at: actor.at,
                updated_at: actor.at,
            };
            documents::ActiveModel::from(&document).insert(&db_tx).await?;
            self.record_document_audit(
                &db_tx,
                &document,
                "create",
                actor,
                &authority,
                json!({
                    "kind": document.kind.as_str(),
                    "amount": document.amount,
                    "parent_id": document.parent_id,
                    "budget_line_id": document.budget_line_id,
                }),
            )
            .await?;
            tracing::info!(
                document = %document.id,
                kind = document.kind.as_str(),
                "document created"
            );
            Ok(document)
        })
    }

    /// Attaches a budget line to a document that is not yet settled.
    pub async fn impute(
        &self,
        document_id: Uuid,
        line_id: Uuid,
        actor: &Actor,
    ) -> ResultEngine<Document> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            let document = self.find_document(&db_tx, document_id).await?;
            if document.status.is_terminal() {
                return Err(EngineError::InvalidTransition(format!(
                    "cannot impute a {} document",
                    document.status.as_str()
                )));
            }
            if document.parent_id.is_some() && document.budget_line_id != Some(line_id) {
                return Err(EngineError::InvalidInput(format!(
                    "{} {document_id} inherits its budget line from its parent",
                    document.kind.as_str()
                )));
            }
            let authority = self
                .resolve_authority_tx(
                    &db_tx,
                    &actor.id,
                    ActionScope::Document(document.kind),
                    Capability::Prepare,
                    actor.at,
                )
                .await?;
            let line = self.find_line(&db_tx, line_id).await?;
            if line.exercise != document.exercise {
                return Err(EngineError::InvalidInput(format!(
                    "budget line {} belongs to exercise {}",
                    line.code, line.exercise
                )));
            }
            if line.status != LineStatus::Validated || !line.active {
                return Err(EngineError::InvalidTransition(format!(
                    "budget line {} cannot be imputed",
                    line.code
                )));
            }

            let result = documents::Entity::update_many()
                .col_expr(
                    documents::Column::BudgetLineId,
                    Expr::value(line_id.to_string()),
                )
                .col_expr(documents::Column::UpdatedAt, Expr::value(actor.at))
                .filter(documents::Column::Id.eq(document_id.to_string()))
                .filter(documents::Column::Status.eq(document.status.as_str()))
                .exec(&db_tx)
                .await?;
            if result.rows_affected == 0 {
                return Err(EngineError::LedgerContention(format!(
                    "document {document_id} changed concurrently"
                )));
            }
            let document = self.find_document(&db_tx, document_id).await?;
            self.record_document_audit(
                &db_tx,
                &document,
                "impute",
                actor,
                &authority,
                json!({ "budget_line_id": line_id, "line_code": line.code }),
            )
            .await?;
            Ok(document)
        })
    }

    pub async fn submit(
        &self,
        document_id: Uuid,
        actor: &Actor,
    ) -> ResultEngine<TransitionOutcome> {
        self.transition(TransitionRequest::plain(document_id, WorkflowAction::Submit), actor)
            .await
    }

    /// Validates a submitted document. Commitments reserve their amount on
    /// the line; liquidations, payment orders and settlements move the
    /// matching downstream counter.
    pub async fn validate(
        &self,
        document_id: Uuid,
        actor: &Actor,
    ) -> ResultEngine<TransitionOutcome> {
        self.transition(TransitionRequest::plain(document_id, WorkflowAction::Validate), actor)
            .await
    }

    pub async fn reject(
        &self,
        document_id: Uuid,
        reason: &str,
        actor: &Actor,
    ) -> ResultEngine<TransitionOutcome> {
        let request = TransitionRequest {
            justification: Some(reason),
            ..TransitionRequest::plain(document_id, WorkflowAction::Reject)
        };
        self.transition(request, actor).await
    }

    /// Suspends a submitted document. Funds it holds stay held.
    pub async fn defer(
        &self,
        document_id: Uuid,
        reason: &str,
        resume_by: Option<DateTime<Utc>>,
        resume_condition: Option<&str>,
        actor: &Actor,
    ) -> ResultEngine<TransitionOutcome> {
        let request = TransitionRequest {
            justification: Some(reason),
            resume_by,
            resume_condition,
            ..TransitionRequest::plain(document_id, WorkflowAction::Defer)
        };
        self.transition(request, actor).await
    }

    pub async fn resubmit(
        &self,
        document_id: Uuid,
        actor: &Actor,
    ) -> ResultEngine<TransitionOutcome> {
        self.transition(TransitionRequest::plain(document_id, WorkflowAction::Resubmit), actor)
            .await
    }

    /// Withdraws a document that was not decided yet. Cancellation is
    /// terminal; documents are never deleted. Funds are only held from
    /// validation on, so a cancelled document never held any.
    pub async fn cancel(
        &self,
        document_id: Uuid,
        actor: &Actor,
    ) -> ResultEngine<TransitionOutcome> {
        self.transition(TransitionRequest::plain(document_id, WorkflowAction::Cancel), actor)
            .await
    }

    /// Gives back part of a validated commitment's reservation.
    ///
    /// At most what the commitment holds beyond its validated liquidations
    /// can be disengaged. The release on the line, the lower
    /// `reserved_amount` and the audit entry commit together.
    pub async fn disengage(
        &self,
        document_id: Uuid,
        amount: i64,
        reason: &str,
        actor: &Actor,
    ) -> ResultEngine<Document> {
        ensure_positive(amount, "disengaged amount")?;
        let reason = require_justification(Some(reason), "disengage")?;
        with_tx!(self, Contended::Ledger, |db_tx| {
            let document = self.find_document(&db_tx, document_id).await?;
            if document.kind != DocumentKind::Commitment
                || document.status != DocumentStatus::Validated
            {
                return Err(EngineError::InvalidTransition(format!(
                    "only validated commitments can be disengaged, {} {} is {}",
                    document.kind.as_str(),
                    document.id,
                    document.status.as_str()
                )));
            }
            let authority = self
                .resolve_authority_tx(
                    &db_tx,
                    &actor.id,
                    ActionScope::Document(DocumentKind::Commitment),
                    Capability::Decide,
                    actor.at,
                )
                .await?;
            let line_id = document.budget_line_id.ok_or_else(|| {
                EngineError::InvalidTransition(format!(
                    "commitment {} has no budget line",
                    document.id
                ))
            })?;

            let consumed = self.validated_children_total(&db_tx, document.id).await?;
            let free = document.reserved_amount - consumed;
            if amount > free {
                return Err(EngineError::InsufficientFunds {
                    line_id: line_id.to_string(),
                    requested: amount,
                    available: free,
                    shortfall: amount.saturating_sub(free),
                });
            }

            let reserved_after = document.reserved_amount - amount;
            let result = documents::Entity::update_many()
                .col_expr(documents::Column::ReservedAmount, Expr::value(reserved_after))
                .col_expr(documents::Column::UpdatedAt, Expr::value(actor.at))
                .filter(documents::Column::Id.eq(document.id.to_string()))
                .filter(documents::Column::Status.eq(DocumentStatus::Validated.as_str()))
                .filter(documents::Column::ReservedAmount.eq(document.reserved_amount))
                .exec(&db_tx)
                .await?;
            if result.rows_affected == 0 {
                return Err(EngineError::LedgerContention(format!(
                    "commitment {} changed while disengaging",
                    document.id
                )));
            }

            let source = document
                .reference
                .clone()
                .unwrap_or_else(|| document.id.to_string());
            let movement = self
                .apply_movement(
                    &db_tx,
                    MovementRequest {
                        line_id,
                        kind: MovementKind::Release,
                        amount,
                        source: &source,
                        actor_id: &actor.id,
                        at: actor.at,
                        overridden: false,
                    },
                )
                .await?;

            let updated = self.find_document(&db_tx, document.id).await?;
            self.record_document_audit(
                &db_tx,
                &updated,
                "disengage",
                actor,
                &authority,
                json!({
                    "amount": amount,
                    "reserved_before": document.reserved_amount,
                    "reserved_after": reserved_after,
                    "available_after": movement.available_after,
                    "justification": reason,
                }),
            )
            .await?;
            tracing::info!(
                document = %updated.id,
                amount,
                reserved_after,
                actor = %actor.id,
                "commitment disengaged"
            );
            Ok(updated)
        })
    }

    async fn transition(
        &self,
        request: TransitionRequest<'_>,
        actor: &Actor,
    ) -> ResultEngine<TransitionOutcome> {
        with_tx!(self, Contended::Ledger, |db_tx| {
            self.transition_tx(&db_tx, &request, actor).await
        })
    }

    async fn transition_tx(
        &self,
        db_tx: &DatabaseTransaction,
        request: &TransitionRequest<'_>,
        actor: &Actor,
    ) -> ResultEngine<TransitionOutcome> {
        let document = self.find_document(db_tx, request.document_id).await?;
        let action = request.action;
        let from = document.status;
        let to = action.target(from)?;
        let justification = if action.requires_justification() {
            Some(require_justification(request.justification, action.as_str())?)
        } else {
            normalize_optional_text(request.justification)
        };
        let resume_condition = normalize_optional_text(request.resume_condition);

        let scope = ActionScope::Document(document.kind);
        let authority = self
            .resolve_authority_tx(db_tx, &actor.id, scope, action.capability(), actor.at)
            .await?;

        let reference = if to == document.kind.official_status() {
            Some(self.assign_reference_tx(db_tx, &document, actor.at).await?)
        } else {
            None
        };

        let mut reserved_amount = document.reserved_amount;
        if action == WorkflowAction::Validate {
            self.check_chain_tx(db_tx, &document).await?;
            if let Some(kind) = document.kind.movement_on_validation() {
                let line_id = document.budget_line_id.ok_or_else(|| {
                    EngineError::InvalidTransition(format!(
                        "{} {} has no budget line",
                        document.kind.as_str(),
                        document.id
                    ))
                })?;
                let source = reference
                    .as_ref()
                    .map(|r| r.reference().to_string())
                    .or_else(|| document.reference.clone())
                    .unwrap_or_else(|| document.id.to_string());
                self.apply_movement(
                    db_tx,
                    MovementRequest {
                        line_id,
                        kind,
                        amount: document.amount,
                        source: &source,
                        actor_id: &actor.id,
                        at: actor.at,
                        overridden: false,
                    },
                )
                .await?;
                if kind == MovementKind::Reserve {
                    reserved_amount = document.amount;
                }
            }
        }
        let mut update = documents::Entity::update_many()
            .col_expr(documents::Column::Status, Expr::value(to.as_str()))
            .col_expr(documents::Column::ReservedAmount, Expr::value(reserved_amount))
            .col_expr(documents::Column::UpdatedAt, Expr::value(actor.at))
            .filter(documents::Column::Id.eq(document.id.to_string()))
            .filter(documents::Column::Status.eq(from.as_str()));
        match action {
            WorkflowAction::Reject => {
                update = update.col_expr(
                    documents::Column::RejectionReason,
                    Expr::value(justification.clone()),
                );
            }
            WorkflowAction::Defer => {
                update = update
                    .col_expr(
                        documents::Column::DeferralDeadline,
                        Expr::value(request.resume_by),
                    )
                    .col_expr(
                        documents::Column::DeferralCondition,
                        Expr::value(resume_condition.clone()),
                    );
            }
            WorkflowAction::Resubmit => {
                update = update
                    .col_expr(
                        documents::Column::DeferralDeadline,
                        Expr::value(Option::<DateTime<Utc>>::None),
                    )
                    .col_expr(
                        documents::Column::DeferralCondition,
                        Expr::value(Option::<String>::None),
                    );
            }
            _ => {}
        }
        if update.exec(db_tx).await?.rows_affected == 0 {
            return Err(EngineError::LedgerContention(format!(
                "document {} changed concurrently",
                document.id
            )));
        }

        let updated = self.find_document(db_tx, document.id).await?;
        let record = workflow_transitions::ActiveModel {
            id: ActiveValue::NotSet,
            document_id: ActiveValue::Set(document.id.to_string()),
            action: ActiveValue::Set(action.as_str().to_string()),
            from_status: ActiveValue::Set(from.as_str().to_string()),
            to_status: ActiveValue::Set(to.as_str().to_string()),
            actor_id: ActiveValue::Set(actor.id.clone()),
            authority: ActiveValue::Set(authority.kind_str().to_string()),
            role: ActiveValue::Set(authority.role().as_str().to_string()),
            scope: ActiveValue::Set(scope.as_str().to_string()),
            delegator_id: ActiveValue::Set(authority.delegator_id().map(ToString::to_string)),
            delegation_id: ActiveValue::Set(authority.delegation_id().map(|id| id.to_string())),
            justification: ActiveValue::Set(justification.clone()),
            resume_by: ActiveValue::Set(
                request.resume_by.filter(|_| to == DocumentStatus::Deferred),
            ),
            resume_condition: ActiveValue::Set(
                resume_condition.filter(|_| to == DocumentStatus::Deferred),
            ),
            reference: ActiveValue::Set(updated.reference.clone()),
            occurred_at: ActiveValue::Set(actor.at),
        }
        .insert(db_tx)
        .await?;
        let record = TransitionRecord::try_from(record)?;

        self.record_document_audit(
            db_tx,
            &updated,
            action.as_str(),
            actor,
            &authority,
            json!({
                "from": from.as_str(),
                "to": to.as_str(),
                "reference": updated.reference,
                "amount": updated.amount,
                "justification": justification,
                "role": authority.role().as_str(),
            }),
        )
        .await?;

        tracing::info!(
            document = %updated.id,
            kind = updated.kind.as_str(),
            from = from.as_str(),
            to = to.as_str(),
            actor = %actor.id,
            authority = authority.kind_str(),
            "document transition"
        );
        Ok(TransitionOutcome {
            document: updated,
            record,
            reference,
        })
    }

    /// A child's amount plus its validated siblings may not exceed the
    /// parent's amount.
    async fn check_chain_tx(
        &self,
        db_tx: &DatabaseTransaction,
        document: &Document,
    ) -> ResultEngine<()> {
        let Some(parent_id) = document.parent_id else {
            return Ok(());
        };
        let parent = self.find_document(db_tx, parent_id).await?;
        if parent.status != DocumentStatus::Validated {
            return Err(EngineError::InvalidTransition(format!(
                "{} {parent_id} is {}, not validated",
                parent.kind.as_str(),
                parent.status.as_str()
            )));
        }
        let used = self.validated_children_total(db_tx, parent_id).await?;
        if used + document.amount > parent.ceiling() {
            return Err(EngineError::InvalidTransition(format!(
                "{} of {} exceeds the {} left on {} {parent_id}",
                document.amount,
                document.kind.as_str(),
                parent.ceiling() - used,
                parent.kind.as_str()
            )));
        }
        Ok(())
    }

    /// Mints the document's reference unless it already has one.
    async fn assign_reference_tx(
        &self,
        db_tx: &DatabaseTransaction,
        document: &Document,
        at: DateTime<Utc>,
    ) -> ResultEngine<ReferenceAssignment> {
        if let Some(existing) = &document.reference {
            return Ok(ReferenceAssignment::AlreadyAssigned(existing.clone()));
        }
        let minted = self
            .mint_reference_tx(
                db_tx,
                document.kind.reference_kind(),
                Period::within_exercise(document.exercise, at),
                at,
            )
            .await?;
        let result = documents::Entity::update_many()
            .col_expr(documents::Column::Reference, Expr::value(minted.as_str()))
            .filter(documents::Column::Id.eq(document.id.to_string()))
            .filter(documents::Column::Reference.is_null())
            .exec(db_tx)
            .await?;
        if result.rows_affected == 0 {
            let current = self.find_document(db_tx, document.id).await?;
            return current
                .reference
                .map(ReferenceAssignment::AlreadyAssigned)
                .ok_or_else(|| {
                    EngineError::SequenceContention(format!(
                        "reference of document {} could not be attached",
                        document.id
                    ))
                });
        }
        tracing::info!(document = %document.id, reference = %minted, "reference minted");
        Ok(ReferenceAssignment::Minted(minted))
    }

    /// Returns the document's reference, minting it if the document is
    /// already official but has none yet. Calling it again returns the same
    /// reference.
    pub async fn assign_reference(
        &self,
        document_id: Uuid,
        actor: &Actor,
    ) -> ResultEngine<ReferenceAssignment> {
        with_tx!(self, Contended::Sequence, |db_tx| {
            let document = self.find_document(&db_tx, document_id).await?;
            if !document.kind.is_official(document.status) {
                return Err(EngineError::InvalidTransition(format!(
                    "a {} {} carries no reference yet",
                    document.status.as_str(),
                    document.kind.as_str()
                )));
            }
            let assignment = self.assign_reference_tx(&db_tx, &document, actor.at).await?;
            if assignment.was_minted() {
                self.record_tx(
                    &db_tx,
                    AuditDraft {
                        entity_type: "document",
                        entity_id: document.id.to_string(),
                        action: "assign_reference",
                        actor_id: &actor.id,
                        on_behalf_of: None,
                        payload: json!({ "reference": assignment.reference() }),
                        at: actor.at,
                    },
                )
                .await?;
            }
            Ok(assignment)
        })
    }

    async fn record_document_audit(
        &self,
        db_tx: &DatabaseTransaction,
        document: &Document,
        action: &str,
        actor: &Actor,
        authority: &ActingAuthority,
        payload: serde_json::Value,
    ) -> ResultEngine<()> {
        self.record_tx(
            db_tx,
            AuditDraft {
                entity_type: "document",
                entity_id: document.id.to_string(),
                action,
                actor_id: &actor.id,
                on_behalf_of: authority.delegator_id(),
                payload,
                at: actor.at,
            },
        )
        .await
    }

    pub async fn document(&self, document_id: Uuid) -> ResultEngine<Document> {
        self.find_document(&self.database, document_id).await
    }

    pub async fn list_documents(&self, filter: &DocumentFilter) -> ResultEngine<Vec<Document>> {
        let mut query = documents::Entity::find();
        if let Some(exercise) = filter.exercise {
            query = query.filter(documents::Column::Exercise.eq(exercise));
        }
        if let Some(kind) = filter.kind {
            query = query.filter(documents::Column::Kind.eq(kind.as_str()));
        }
        if let Some(status) = filter.status {
            query = query.filter(documents::Column::Status.eq(status.as_str()));
        }
        if let Some(line_id) = filter.budget_line_id {
            query = query.filter(documents::Column::BudgetLineId.eq(line_id.to_string()));
        }
        if let Some(parent_id) = filter.parent_id {
            query = query.filter(documents::Column::ParentId.eq(parent_id.to_string()));
        }
        let models = query
            .order_by_asc(documents::Column::CreatedAt)
            .order_by_asc(documents::Column::Id)
            .all(&self.database)
            .await?;
        models.into_iter().map(Document::try_from).collect()
    }

    /// Amount of `document_id` not yet consumed by validated children, such
    /// as what is left to settle on a payment order.
    pub async fn remaining_amount(&self, document_id: Uuid) -> ResultEngine<i64> {
        let document = self.find_document(&self.database, document_id).await?;
        let used = self
            .validated_children_total(&self.database, document_id)
            .await?;
        Ok(document.ceiling() - used)
    }

    /// Transitions of a document in commit order.
    pub async fn list_transitions(
        &self,
        document_id: Uuid,
    ) -> ResultEngine<Vec<TransitionRecord>> {
        let models = workflow_transitions::Entity::find()
            .filter(workflow_transitions::Column::DocumentId.eq(document_id.to_string()))
            .order_by_asc(workflow_transitions::Column::Id)
            .all(&self.database)
            .await?;
        models.into_iter().map(TransitionRecord::try_from).collect()
    }
}

impl<'a> TransitionRequest<'a> {
    fn plain(document_id: Uuid, action: WorkflowAction) -> Self {
        Self {
            document_id,
            action,
            justification: None,
            resume_by: None,
            resume_condition: None,
        }
    }
}
