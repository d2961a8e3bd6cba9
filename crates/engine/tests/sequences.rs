mod common;

use std::{collections::BTreeSet, sync::Arc};

use common::{admin, engine_with_db, engine_with_file_db};
use engine::{EngineError, ParsedReference, Period, ReferenceKind, ScopeKey};

fn commitments_jan_2026() -> ScopeKey {
    ScopeKey::new(ReferenceKind::Commitment, Period::new(2026, 1).unwrap())
}

#[tokio::test]
async fn values_strictly_increase_per_scope() {
    let (engine, _db) = engine_with_db().await;
    let scope = commitments_jan_2026();
    let other = ScopeKey::new(ReferenceKind::Commitment, Period::new(2026, 2).unwrap());

    let mut last = 0;
    for _ in 0..5 {
        let value = engine.next_value(scope).await.unwrap();
        assert!(value > last);
        last = value;
    }
    assert_eq!(last, 5);
    assert_eq!(engine.next_value(other).await.unwrap(), 1);

    let counters = engine.list_counters().await.unwrap();
    assert_eq!(counters.len(), 2);
    assert_eq!(counters[0].scope, scope);
    assert_eq!(counters[0].last_value, 5);
}

#[tokio::test]
async fn two_concurrent_calls_never_share_a_value() {
    let (engine, _db, path) = engine_with_file_db().await;
    let scope = commitments_jan_2026();
    let n = engine.next_value(scope).await.unwrap();

    let (a, b) = tokio::join!(engine.next_value(scope), engine.next_value(scope));
    let got: BTreeSet<i64> = [a.unwrap(), b.unwrap()].into_iter().collect();
    assert_eq!(got, BTreeSet::from([n + 1, n + 2]));

    let _ = std::fs::remove_file(path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_allocations_are_distinct() {
    let (engine, _db, path) = engine_with_file_db().await;
    let engine = Arc::new(engine);
    let period = Period::new(2026, 1).unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let engine = Arc::clone(&engine);
        tasks.spawn(async move {
            engine
                .allocate_reference(ReferenceKind::Commitment, period)
                .await
        });
    }
    let mut references = BTreeSet::new();
    while let Some(joined) = tasks.join_next().await {
        assert!(references.insert(joined.unwrap().unwrap()));
    }

    let sequences: BTreeSet<i64> = references
        .iter()
        .map(|r| engine.parse_reference(r).parts().unwrap().sequence)
        .collect();
    assert_eq!(sequences, (1..=16).collect());

    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn resync_raises_but_never_lowers() {
    let (engine, _db) = engine_with_db().await;
    let scope = commitments_jan_2026();
    for _ in 0..3 {
        engine.next_value(scope).await.unwrap();
    }

    assert_eq!(
        engine.resync_from_import(scope, 130, &admin()).await.unwrap(),
        130
    );
    assert_eq!(engine.next_value(scope).await.unwrap(), 131);

    assert_eq!(
        engine.resync_from_import(scope, 12, &admin()).await.unwrap(),
        131
    );
    assert_eq!(engine.next_value(scope).await.unwrap(), 132);

    let audit = engine
        .list_audit("sequence", &scope.to_string())
        .await
        .unwrap();
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[0].payload["observed_max"], 130);

    assert!(matches!(
        engine.resync_from_import(scope, -1, &admin()).await,
        Err(EngineError::InvalidAmount(_))
    ));
}

#[tokio::test]
async fn resync_from_legacy_references_skips_garbage() {
    let (engine, _db) = engine_with_db().await;
    let report = engine
        .resync_from_references(
            [
                "201260042",
                "201260007",
                "ENG-2026-0042",
                "101260003",
                "2012600042",
                "201270001",
            ],
            &admin(),
        )
        .await
        .unwrap();
    assert_eq!(report.skipped, 2);
    let counters: Vec<_> = report
        .counters
        .iter()
        .map(|c| (c.scope.to_string(), c.last_value))
        .collect();
    assert_eq!(
        counters,
        vec![
            ("NOTE|2026-01".to_string(), 3),
            ("COMMITMENT|2026-01".to_string(), 42),
            ("COMMITMENT|2027-01".to_string(), 1),
        ]
    );

    let next = engine
        .allocate_reference(ReferenceKind::Commitment, Period::new(2026, 1).unwrap())
        .await
        .unwrap();
    assert_eq!(next, "201260043");
    assert!(matches!(
        engine.parse_reference(&next),
        ParsedReference::Valid(_)
    ));
}

#[tokio::test]
async fn exhausted_month_is_reported() {
    let (engine, _db) = engine_with_db().await;
    let scope = commitments_jan_2026();
    engine
        .resync_from_import(scope, 9_999, &admin())
        .await
        .unwrap();
    let err = engine
        .allocate_reference(ReferenceKind::Commitment, Period::new(2026, 1).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SequenceExhausted(_)));
}
