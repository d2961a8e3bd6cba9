mod common;

use chrono::{TimeZone, Utc};

use common::{EXERCISE, admin, draft, engine_with_db, validated, validated_line};
use engine::{
    Actor, DocumentFilter, DocumentKind, DocumentStatus, EngineError, MovementKind, NewDocument,
    Period, ReferenceAssignment, WorkflowAction,
};

#[tokio::test]
async fn failed_validation_leaves_ledger_and_status_untouched() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "62.20", 10_000_000).await;
    let before = engine.get_availability(line.id).await.unwrap();

    let commitment = draft(
        &engine,
        DocumentKind::Commitment,
        15_000_000,
        Some(line.id),
        None,
        &admin(),
    )
    .await;
    engine.submit(commitment.id, &admin()).await.unwrap();

    let err = engine.validate(commitment.id, &admin()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientFunds {
            shortfall: 5_000_000,
            ..
        }
    ));
    let document = engine.document(commitment.id).await.unwrap();
    assert_eq!(document.status, DocumentStatus::Submitted);
    assert_eq!(document.reserved_amount, 0);
    assert_eq!(engine.get_availability(line.id).await.unwrap(), before);
    assert!(engine.list_movements(line.id).await.unwrap().is_empty());

    let rejected = engine
        .reject(commitment.id, "line cannot cover it", &admin())
        .await
        .unwrap();
    assert_eq!(rejected.document.status, DocumentStatus::Rejected);
    assert_eq!(
        rejected.document.rejection_reason.as_deref(),
        Some("line cannot cover it")
    );
    assert_eq!(engine.get_availability(line.id).await.unwrap(), before);

    // submit, reject
    assert_eq!(engine.list_transitions(commitment.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn submission_mints_the_reference_once() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "62.21", 1_000_000).await;
    let commitment = draft(
        &engine,
        DocumentKind::Commitment,
        100_000,
        Some(line.id),
        None,
        &admin(),
    )
    .await;
    assert_eq!(commitment.reference, None);

    let submitted = engine.submit(commitment.id, &admin()).await.unwrap();
    let reference = submitted.reference.unwrap();
    assert_eq!(reference, ReferenceAssignment::Minted("201260001".to_string()));
    assert_eq!(submitted.document.reference.as_deref(), Some("201260001"));

    let again = engine.assign_reference(commitment.id, &admin()).await.unwrap();
    assert_eq!(
        again,
        ReferenceAssignment::AlreadyAssigned("201260001".to_string())
    );

    engine
        .defer(
            commitment.id,
            "waiting for the supplier quote",
            Some(common::jan_15() + chrono::Duration::days(10)),
            Some("quote received"),
            &admin(),
        )
        .await
        .unwrap();
    let resumed = engine.resubmit(commitment.id, &admin()).await.unwrap();
    assert_eq!(
        resumed.reference,
        Some(ReferenceAssignment::AlreadyAssigned("201260001".to_string()))
    );
    assert_eq!(resumed.document.deferral_deadline, None);

    let validated = engine.validate(commitment.id, &admin()).await.unwrap();
    assert_eq!(validated.reference, None);
    assert_eq!(validated.document.reference.as_deref(), Some("201260001"));
    assert_eq!(validated.document.reserved_amount, 100_000);

    let movements = engine.list_movements(line.id).await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].source, "201260001");
}

#[tokio::test]
async fn drafts_carry_no_reference() {
    let (engine, _db) = engine_with_db().await;
    let note = draft(&engine, DocumentKind::Note, 500, None, None, &admin()).await;
    let err = engine.assign_reference(note.id, &admin()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));
    assert!(engine.list_counters().await.unwrap().is_empty());
}

#[tokio::test]
async fn decided_documents_accept_no_further_transition() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "62.22", 1_000_000).await;

    let accepted = validated(&engine, DocumentKind::Commitment, 1_000, Some(line.id), None).await;
    let refused = draft(
        &engine,
        DocumentKind::Commitment,
        1_000,
        Some(line.id),
        None,
        &admin(),
    )
    .await;
    engine.submit(refused.id, &admin()).await.unwrap();
    engine.reject(refused.id, "duplicate", &admin()).await.unwrap();
    let withdrawn = draft(&engine, DocumentKind::Note, 1_000, None, None, &admin()).await;
    engine.cancel(withdrawn.id, &admin()).await.unwrap();

    for id in [accepted.id, refused.id, withdrawn.id] {
        for action in [
            WorkflowAction::Submit,
            WorkflowAction::Validate,
            WorkflowAction::Reject,
            WorkflowAction::Defer,
            WorkflowAction::Resubmit,
            WorkflowAction::Cancel,
        ] {
            let result = match action {
                WorkflowAction::Submit => engine.submit(id, &admin()).await,
                WorkflowAction::Validate => engine.validate(id, &admin()).await,
                WorkflowAction::Reject => engine.reject(id, "again", &admin()).await,
                WorkflowAction::Defer => engine.defer(id, "later", None, None, &admin()).await,
                WorkflowAction::Resubmit => engine.resubmit(id, &admin()).await,
                WorkflowAction::Cancel => engine.cancel(id, &admin()).await,
            };
            assert!(
                matches!(result, Err(EngineError::InvalidTransition(_))),
                "{action:?} on {id} must be refused"
            );
        }
    }
    assert_eq!(engine.compute_available(line.id).await.unwrap(), 999_000);
}

#[tokio::test]
async fn reject_and_defer_need_a_reason() {
    let (engine, _db) = engine_with_db().await;
    let note = draft(&engine, DocumentKind::Note, 700, None, None, &admin()).await;
    engine.submit(note.id, &admin()).await.unwrap();

    let err = engine.reject(note.id, " ", &admin()).await.unwrap_err();
    assert!(matches!(err, EngineError::MissingJustification(_)));
    let err = engine
        .defer(note.id, "", None, None, &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingJustification(_)));
    assert_eq!(
        engine.document(note.id).await.unwrap().status,
        DocumentStatus::Submitted
    );
}

#[tokio::test]
async fn the_expenditure_chain_moves_each_counter() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "62.30", 100_000_000).await;

    let note = validated(&engine, DocumentKind::Note, 60_000_000, Some(line.id), None).await;
    assert_eq!(note.reference.as_deref(), Some("101260001"));

    let commitment = validated(
        &engine,
        DocumentKind::Commitment,
        50_000_000,
        None,
        Some(note.id),
    )
    .await;
    assert_eq!(commitment.budget_line_id, Some(line.id));
    let liquidation = validated(
        &engine,
        DocumentKind::Liquidation,
        50_000_000,
        None,
        Some(commitment.id),
    )
    .await;
    let order = validated(
        &engine,
        DocumentKind::PaymentOrder,
        50_000_000,
        None,
        Some(liquidation.id),
    )
    .await;

    let settlement = draft(
        &engine,
        DocumentKind::Settlement,
        30_000_000,
        None,
        Some(order.id),
        &admin(),
    )
    .await;
    let submitted = engine.submit(settlement.id, &admin()).await.unwrap();
    assert_eq!(submitted.reference, None);
    assert_eq!(submitted.document.reference, None);
    let settled = engine.validate(settlement.id, &admin()).await.unwrap();
    assert_eq!(
        settled.reference,
        Some(ReferenceAssignment::Minted("501260001".to_string()))
    );

    let a = engine.get_availability(line.id).await.unwrap();
    assert_eq!(a.committed, 50_000_000);
    assert_eq!(a.liquidated, 50_000_000);
    assert_eq!(a.ordered, 50_000_000);
    assert_eq!(a.paid, 30_000_000);
    assert_eq!(a.available, 50_000_000);
    assert_eq!(a.execution_bps(), Some(3_000));

    assert_eq!(engine.remaining_amount(order.id).await.unwrap(), 20_000_000);
    let err = engine
        .create_document(
            NewDocument {
                kind: DocumentKind::Settlement,
                exercise: EXERCISE,
                object: "second instalment".to_string(),
                amount: 25_000_000,
                budget_line_id: None,
                parent_id: Some(order.id),
            },
            &admin(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));

    let children = engine
        .list_documents(&DocumentFilter {
            parent_id: Some(order.id),
            ..DocumentFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(children.len(), 1);
}

#[tokio::test]
async fn sibling_validations_cannot_exceed_the_parent() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "62.31", 10_000).await;
    let commitment =
        validated(&engine, DocumentKind::Commitment, 8_000, Some(line.id), None).await;

    let first = draft(
        &engine,
        DocumentKind::Liquidation,
        5_000,
        None,
        Some(commitment.id),
        &admin(),
    )
    .await;
    let second = draft(
        &engine,
        DocumentKind::Liquidation,
        5_000,
        None,
        Some(commitment.id),
        &admin(),
    )
    .await;
    engine.submit(first.id, &admin()).await.unwrap();
    engine.submit(second.id, &admin()).await.unwrap();
    engine.validate(first.id, &admin()).await.unwrap();

    let err = engine.validate(second.id, &admin()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));
    assert_eq!(
        engine.get_availability(line.id).await.unwrap().liquidated,
        5_000
    );
}

#[tokio::test]
async fn chain_documents_need_a_validated_parent_of_the_preceding_kind() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "62.32", 10_000).await;

    let orphan = engine
        .create_document(
            NewDocument {
                kind: DocumentKind::Liquidation,
                exercise: EXERCISE,
                object: "orphan".to_string(),
                amount: 100,
                budget_line_id: Some(line.id),
                parent_id: None,
            },
            &admin(),
        )
        .await
        .unwrap_err();
    assert!(matches!(orphan, EngineError::InvalidInput(_)));

    let note = draft(&engine, DocumentKind::Note, 1_000, Some(line.id), None, &admin()).await;
    let pending_parent = engine
        .create_document(
            NewDocument {
                kind: DocumentKind::Commitment,
                exercise: EXERCISE,
                object: "too early".to_string(),
                amount: 100,
                budget_line_id: None,
                parent_id: Some(note.id),
            },
            &admin(),
        )
        .await
        .unwrap_err();
    assert!(matches!(pending_parent, EngineError::InvalidTransition(_)));

    engine.submit(note.id, &admin()).await.unwrap();
    engine.validate(note.id, &admin()).await.unwrap();
    let skipping = engine
        .create_document(
            NewDocument {
                kind: DocumentKind::PaymentOrder,
                exercise: EXERCISE,
                object: "skips two steps".to_string(),
                amount: 100,
                budget_line_id: None,
                parent_id: Some(note.id),
            },
            &admin(),
        )
        .await
        .unwrap_err();
    assert!(matches!(skipping, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn imputation_attaches_a_line_before_validation() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "62.40", 5_000).await;
    let commitment = draft(&engine, DocumentKind::Commitment, 2_000, None, None, &admin()).await;
    engine.submit(commitment.id, &admin()).await.unwrap();

    let err = engine.validate(commitment.id, &admin()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));

    let imputed = engine
        .impute(commitment.id, line.id, &admin())
        .await
        .unwrap();
    assert_eq!(imputed.budget_line_id, Some(line.id));
    engine.validate(commitment.id, &admin()).await.unwrap();
    assert_eq!(engine.compute_available(line.id).await.unwrap(), 3_000);
}

#[tokio::test]
async fn every_transition_is_recorded_and_audited() {
    let (engine, _db) = engine_with_db().await;
    let note = draft(&engine, DocumentKind::Note, 900, None, None, &admin()).await;
    engine.submit(note.id, &admin()).await.unwrap();
    engine
        .defer(note.id, "missing annex", None, Some("annex"), &admin())
        .await
        .unwrap();
    engine.resubmit(note.id, &admin()).await.unwrap();
    engine.validate(note.id, &admin()).await.unwrap();

    let records = engine.list_transitions(note.id).await.unwrap();
    let path: Vec<_> = records
        .iter()
        .map(|r| (r.action, r.from_status, r.to_status))
        .collect();
    assert_eq!(
        path,
        vec![
            (
                WorkflowAction::Submit,
                DocumentStatus::Draft,
                DocumentStatus::Submitted
            ),
            (
                WorkflowAction::Defer,
                DocumentStatus::Submitted,
                DocumentStatus::Deferred
            ),
            (
                WorkflowAction::Resubmit,
                DocumentStatus::Deferred,
                DocumentStatus::Submitted
            ),
            (
                WorkflowAction::Validate,
                DocumentStatus::Submitted,
                DocumentStatus::Validated
            ),
        ]
    );
    assert_eq!(records[1].justification.as_deref(), Some("missing annex"));
    assert_eq!(records[1].resume_condition.as_deref(), Some("annex"));
    assert!(records.windows(2).all(|w| w[0].id < w[1].id));

    let audit = engine.list_audit("document", &note.id.to_string()).await.unwrap();
    let actions: Vec<_> = audit.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(
        actions,
        vec!["create", "submit", "defer", "resubmit", "validate"]
    );
    assert!(audit.iter().all(|e| e.actor_id == common::ADMIN));
}

#[tokio::test]
async fn late_submission_keeps_the_exercise_year() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "62.40", 1_000_000).await;
    let commitment = draft(
        &engine,
        DocumentKind::Commitment,
        10_000,
        Some(line.id),
        None,
        &admin(),
    )
    .await;

    let early_january = Actor::new(
        common::ADMIN,
        Utc.with_ymd_and_hms(2027, 1, 5, 9, 0, 0).unwrap(),
    );
    let submitted = engine.submit(commitment.id, &early_january).await.unwrap();
    assert_eq!(submitted.document.reference.as_deref(), Some("212260001"));

    let parts = engine.parse_reference("212260001").parts().unwrap();
    assert_eq!(parts.period, Period::new(EXERCISE, 12).unwrap());
}

#[tokio::test]
async fn disengaging_returns_part_of_a_commitment() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "63.01", 5_000).await;
    let commitment = validated(&engine, DocumentKind::Commitment, 1_000, Some(line.id), None).await;
    assert_eq!(commitment.reserved_amount, 1_000);

    assert!(matches!(
        engine.disengage(commitment.id, 300, "  ", &admin()).await,
        Err(EngineError::MissingJustification(_))
    ));

    let reduced = engine
        .disengage(commitment.id, 300, "scope reduced", &admin())
        .await
        .unwrap();
    assert_eq!(reduced.reserved_amount, 700);
    assert_eq!(reduced.status, DocumentStatus::Validated);
    let availability = engine.get_availability(line.id).await.unwrap();
    assert_eq!(availability.committed, 700);
    assert_eq!(availability.available, 4_300);

    let err = engine
        .disengage(commitment.id, 800, "more", &admin())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientFunds {
            requested: 800,
            available: 700,
            shortfall: 100,
            ..
        }
    ));

    validated(
        &engine,
        DocumentKind::Liquidation,
        600,
        None,
        Some(commitment.id),
    )
    .await;
    assert_eq!(engine.remaining_amount(commitment.id).await.unwrap(), 100);
    let err = engine
        .disengage(commitment.id, 150, "already liquidated", &admin())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientFunds {
            available: 100,
            shortfall: 50,
            ..
        }
    ));
    let too_big = engine
        .create_document(
            NewDocument {
                kind: DocumentKind::Liquidation,
                exercise: EXERCISE,
                object: "second invoice".to_string(),
                amount: 200,
                budget_line_id: None,
                parent_id: Some(commitment.id),
            },
            &admin(),
        )
        .await;
    assert!(matches!(too_big, Err(EngineError::InvalidAmount(_))));

    let audit = engine
        .list_audit("document", &commitment.id.to_string())
        .await
        .unwrap();
    let entry = audit.iter().find(|e| e.action == "disengage").unwrap();
    assert_eq!(entry.payload["reserved_before"], 1_000);
    assert_eq!(entry.payload["reserved_after"], 700);
    assert_eq!(entry.payload["justification"], "scope reduced");

    let movements = engine.list_movements(line.id).await.unwrap();
    let release = movements
        .iter()
        .find(|m| m.kind == MovementKind::Release)
        .unwrap();
    assert_eq!(release.amount, 300);
    assert_eq!(release.source, commitment.reference.clone().unwrap());
}

#[tokio::test]
async fn only_validated_commitments_can_be_disengaged() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "63.02", 5_000).await;
    let pending = draft(
        &engine,
        DocumentKind::Commitment,
        1_000,
        Some(line.id),
        None,
        &admin(),
    )
    .await;
    engine.submit(pending.id, &admin()).await.unwrap();
    assert!(matches!(
        engine.disengage(pending.id, 100, "not yet", &admin()).await,
        Err(EngineError::InvalidTransition(_))
    ));

    let note = validated(&engine, DocumentKind::Note, 500, None, None).await;
    assert!(matches!(
        engine.disengage(note.id, 100, "wrong kind", &admin()).await,
        Err(EngineError::InvalidTransition(_))
    ));
    assert_eq!(engine.compute_available(line.id).await.unwrap(), 5_000);
}

#[tokio::test]
async fn commitments_on_one_line_keep_their_own_holds() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "63.03", 1_000).await;
    let first = validated(&engine, DocumentKind::Commitment, 600, Some(line.id), None).await;
    let second = validated(&engine, DocumentKind::Commitment, 400, Some(line.id), None).await;
    assert_eq!(engine.compute_available(line.id).await.unwrap(), 0);

    let first_reference = first.reference.clone().unwrap();
    let err = engine
        .release(line.id, 100, &first_reference, &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));

    engine
        .disengage(first.id, 600, "contract cancelled", &admin())
        .await
        .unwrap();
    let err = engine
        .disengage(first.id, 1, "nothing left", &admin())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientFunds {
            available: 0,
            shortfall: 1,
            ..
        }
    ));

    let second = engine.document(second.id).await.unwrap();
    assert_eq!(second.reserved_amount, 400);
    let availability = engine.get_availability(line.id).await.unwrap();
    assert_eq!(availability.committed, 400);
    assert_eq!(availability.available, 600);
}
