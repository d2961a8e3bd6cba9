mod common;

use std::sync::Arc;

use common::{actor, admin, engine_with_db, engine_with_file_db, validated_line};
use engine::{EngineError, MovementKind, Role};

#[tokio::test]
async fn reservation_past_available_reports_shortfall_and_changes_nothing() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "62.11", 100_000_000).await;

    engine
        .reserve(line.id, 30_000_000, "manual", &admin())
        .await
        .unwrap();
    assert_eq!(engine.compute_available(line.id).await.unwrap(), 70_000_000);
    let before = engine.get_availability(line.id).await.unwrap();

    let err = engine
        .reserve(line.id, 75_000_000, "manual", &admin())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InsufficientFunds {
            line_id: line.id.to_string(),
            requested: 75_000_000,
            available: 70_000_000,
            shortfall: 5_000_000,
        }
    );
    assert!(err.is_business_rule());

    assert_eq!(engine.get_availability(line.id).await.unwrap(), before);
    assert_eq!(engine.list_movements(line.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn reserving_exactly_what_is_available_is_accepted() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "62.12", 1_000).await;

    let movement = engine.reserve(line.id, 1_000, "exact", &admin()).await.unwrap();
    assert_eq!(movement.available_before, 1_000);
    assert_eq!(movement.available_after, 0);

    let err = engine.reserve(line.id, 1, "one more", &admin()).await.unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds { shortfall: 1, .. }));
}

#[tokio::test]
async fn availability_identity_holds_after_every_operation() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "60.10", 50_000).await;

    let steps: [(bool, i64); 6] = [
        (true, 10_000),
        (true, 25_000),
        (false, 5_000),
        (true, 30_000),
        (true, 20_000),
        (false, 50_000),
    ];
    for (reserve, amount) in steps {
        let _ = if reserve {
            engine.reserve(line.id, amount, "step", &admin()).await
        } else {
            engine.release(line.id, amount, "step", &admin()).await
        };
        let a = engine.get_availability(line.id).await.unwrap();
        assert_eq!(
            a.available,
            a.initial_allocation + a.transfers_in - a.transfers_out - a.committed
        );
        assert!(a.available >= 0);
        assert!(a.committed >= 0);
    }

    let movements = engine.list_movements(line.id).await.unwrap();
    for pair in movements.windows(2) {
        assert_eq!(pair[0].available_after, pair[1].available_before);
    }
}

#[tokio::test]
async fn release_cannot_exceed_what_the_source_holds() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "60.11", 10_000).await;
    engine.reserve(line.id, 4_000, "c1", &admin()).await.unwrap();

    let err = engine.release(line.id, 4_001, "c1", &admin()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientFunds {
            available: 4_000,
            shortfall: 1,
            ..
        }
    ));

    let released = engine.release(line.id, 4_000, "c1", &admin()).await.unwrap();
    assert_eq!(released.kind, MovementKind::Release);
    assert_eq!(engine.compute_available(line.id).await.unwrap(), 10_000);
}

#[tokio::test]
async fn override_goes_negative_only_for_admins_with_a_reason() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "61.00", 1_000).await;
    engine
        .grant_role("cb", Role::BudgetController, &admin())
        .await
        .unwrap();

    let err = engine
        .reserve_with_override(line.id, 1_500, "urgent", "  ", &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingJustification(_)));

    let err = engine
        .reserve_with_override(line.id, 1_500, "urgent", "court order", &actor("cb"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));

    let movement = engine
        .reserve_with_override(line.id, 1_500, "urgent", "court order", &admin())
        .await
        .unwrap();
    assert!(movement.overridden);
    assert_eq!(movement.available_after, -500);

    let audit = engine
        .list_audit("budget_line", &line.id.to_string())
        .await
        .unwrap();
    let entry = audit.iter().find(|e| e.action == "reserve").unwrap();
    assert_eq!(entry.payload["justification"], "court order");
    assert_eq!(entry.payload["overridden"], true);
}

#[tokio::test]
async fn unvalidated_or_deactivated_lines_take_no_reservation() {
    let (engine, _db) = engine_with_db().await;
    let draft = engine
        .create_budget_line(
            engine::NewBudgetLine {
                code: "63.00".to_string(),
                label: "Draft line".to_string(),
                exercise: common::EXERCISE,
                classification: engine::Classification::default(),
                initial_allocation: 5_000,
            },
            &admin(),
        )
        .await
        .unwrap();
    let err = engine.reserve(draft.id, 100, "x", &admin()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));

    let line = validated_line(&engine, "63.01", 5_000).await;
    engine.deactivate_budget_line(line.id, &admin()).await.unwrap();
    let err = engine.reserve(line.id, 100, "x", &admin()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition(_)));
    assert_eq!(engine.compute_available(line.id).await.unwrap(), 5_000);
}

#[tokio::test]
async fn budget_line_lifecycle() {
    let (engine, _db) = engine_with_db().await;
    engine
        .grant_role("cb", Role::BudgetController, &admin())
        .await
        .unwrap();
    let line = engine
        .create_budget_line(
            engine::NewBudgetLine {
                code: "64.00".to_string(),
                label: "Travel".to_string(),
                exercise: common::EXERCISE,
                classification: engine::Classification::default(),
                initial_allocation: 9_000,
            },
            &actor("cb"),
        )
        .await
        .unwrap();
    assert_eq!(line.status, engine::LineStatus::Draft);

    let duplicate = engine
        .create_budget_line(
            engine::NewBudgetLine {
                code: "64.00".to_string(),
                label: "Travel again".to_string(),
                exercise: common::EXERCISE,
                classification: engine::Classification::default(),
                initial_allocation: 1,
            },
            &actor("cb"),
        )
        .await
        .unwrap_err();
    assert!(matches!(duplicate, EngineError::ExistingKey(_)));

    engine.submit_budget_line(line.id, &actor("cb")).await.unwrap();
    let err = engine
        .validate_budget_line(line.id, &actor("cb"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));

    let err = engine
        .reject_budget_line(line.id, "", &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingJustification(_)));
    let rejected = engine
        .reject_budget_line(line.id, "wrong nature code", &admin())
        .await
        .unwrap();
    assert_eq!(rejected.status, engine::LineStatus::Rejected);

    engine.submit_budget_line(line.id, &actor("cb")).await.unwrap();
    let validated = engine.validate_budget_line(line.id, &admin()).await.unwrap();
    assert_eq!(validated.status, engine::LineStatus::Validated);
    assert_eq!(
        engine.list_budget_lines(common::EXERCISE).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn a_source_cannot_release_another_sources_funds() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "60.12", 1_000).await;
    engine.reserve(line.id, 300, "hold-a", &admin()).await.unwrap();
    engine.reserve(line.id, 200, "hold-b", &admin()).await.unwrap();

    let err = engine
        .release(line.id, 250, "hold-b", &admin())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientFunds {
            requested: 250,
            available: 200,
            shortfall: 50,
            ..
        }
    ));
    assert!(matches!(
        engine.release(line.id, 1, "never-reserved", &admin()).await,
        Err(EngineError::InsufficientFunds { available: 0, .. })
    ));

    engine.release(line.id, 200, "hold-b", &admin()).await.unwrap();
    assert!(matches!(
        engine.release(line.id, 1, "hold-b", &admin()).await,
        Err(EngineError::InsufficientFunds { available: 0, .. })
    ));
    assert_eq!(engine.compute_available(line.id).await.unwrap(), 700);
}

#[tokio::test]
async fn huge_requests_on_an_overdrawn_line_are_refused_cleanly() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "61.01", 100).await;
    engine
        .reserve_with_override(line.id, 105, "urgent", "court order", &admin())
        .await
        .unwrap();
    let before = engine.get_availability(line.id).await.unwrap();
    assert_eq!(before.available, -5);

    assert!(matches!(
        engine.reserve(line.id, i64::MAX, "huge", &admin()).await,
        Err(EngineError::InvalidAmount(_))
    ));

    let err = engine
        .reserve(line.id, 1_000_000_000_000_000, "huge", &admin())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InsufficientFunds {
            line_id: line.id.to_string(),
            requested: 1_000_000_000_000_000,
            available: -5,
            shortfall: 1_000_000_000_000_005,
        }
    );
    assert_eq!(engine.get_availability(line.id).await.unwrap(), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reservations_never_overdraw_a_line() {
    let (engine, _db, path) = engine_with_file_db().await;
    let engine = Arc::new(engine);
    let line = validated_line(&engine, "60.20", 100).await;
    let line_id = line.id;

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..20 {
        let engine = Arc::clone(&engine);
        tasks.spawn(async move {
            engine
                .reserve(line_id, 10, &format!("c-{i}"), &admin())
                .await
        });
    }
    let (mut ok, mut insufficient) = (0, 0);
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => ok += 1,
            Err(EngineError::InsufficientFunds { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((ok, insufficient), (10, 10));

    let availability = engine.get_availability(line.id).await.unwrap();
    assert_eq!(availability.committed, 100);
    assert_eq!(availability.available, 0);
    assert_eq!(engine.list_movements(line.id).await.unwrap().len(), 10);

    let _ = std::fs::remove_file(path);
}
