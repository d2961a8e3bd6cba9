mod common;

use chrono::{Duration, TimeZone, Utc};

use common::{actor, admin, draft, engine_with_db, jan_15, validated_line};
use engine::{
    ActingAuthority, ActionScope, Actor, Capability, DocumentKind, EngineError, NewDelegation,
    Role,
};

#[tokio::test]
async fn each_kind_is_decided_by_its_own_role() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "65.00", 1_000_000).await;
    engine.grant_role("agent", Role::Agent, &admin()).await.unwrap();
    engine
        .grant_role("cb", Role::BudgetController, &admin())
        .await
        .unwrap();
    engine.grant_role("treasurer", Role::Treasury, &admin()).await.unwrap();

    let commitment = draft(
        &engine,
        DocumentKind::Commitment,
        10_000,
        Some(line.id),
        None,
        &actor("agent"),
    )
    .await;
    engine.submit(commitment.id, &actor("agent")).await.unwrap();

    for outsider in ["agent", "treasurer", "nobody"] {
        let err = engine
            .validate(commitment.id, &actor(outsider))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)), "{outsider}");
    }

    let outcome = engine.validate(commitment.id, &actor("cb")).await.unwrap();
    assert_eq!(
        outcome.record.authority,
        ActingAuthority::Direct {
            role: Role::BudgetController
        }
    );
    assert_eq!(outcome.record.actor_id, "cb");
}

#[tokio::test]
async fn delegated_decisions_record_on_whose_behalf() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "65.01", 1_000_000).await;
    engine
        .grant_role("cb", Role::BudgetController, &admin())
        .await
        .unwrap();
    let delegation = engine
        .create_delegation(
            NewDelegation {
                delegator_id: "cb".to_string(),
                delegate_id: "deputy".to_string(),
                scopes: vec![ActionScope::Document(DocumentKind::Commitment)],
                starts_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                ends_at: Utc.with_ymd_and_hms(2026, 1, 31, 23, 59, 59).unwrap(),
                reason: Some("annual leave".to_string()),
            },
            &admin(),
        )
        .await
        .unwrap();

    let commitment = draft(
        &engine,
        DocumentKind::Commitment,
        20_000,
        Some(line.id),
        None,
        &admin(),
    )
    .await;
    engine.submit(commitment.id, &admin()).await.unwrap();

    let outcome = engine
        .validate(commitment.id, &actor("deputy"))
        .await
        .unwrap();
    assert_eq!(
        outcome.record.authority,
        ActingAuthority::Delegated {
            role: Role::BudgetController,
            delegator_id: "cb".to_string(),
            delegation_id: delegation.id,
            scope: ActionScope::Document(DocumentKind::Commitment),
        }
    );

    let audit = engine
        .list_audit("document", &commitment.id.to_string())
        .await
        .unwrap();
    let validation = audit.last().unwrap();
    assert_eq!(validation.action, "validate");
    assert_eq!(validation.actor_id, "deputy");
    assert_eq!(validation.on_behalf_of.as_deref(), Some("cb"));
}

#[tokio::test]
async fn delegations_apply_only_inside_their_window_and_scope() {
    let (engine, _db) = engine_with_db().await;
    engine
        .grant_role("cb", Role::BudgetController, &admin())
        .await
        .unwrap();
    let delegation = engine
        .create_delegation(
            NewDelegation {
                delegator_id: "cb".to_string(),
                delegate_id: "deputy".to_string(),
                scopes: vec![ActionScope::Document(DocumentKind::Commitment)],
                starts_at: jan_15() - Duration::days(1),
                ends_at: jan_15() + Duration::days(1),
                reason: None,
            },
            &admin(),
        )
        .await
        .unwrap();
    let scope = ActionScope::Document(DocumentKind::Commitment);

    assert!(
        engine
            .resolve_authority("deputy", scope, Capability::Decide, jan_15())
            .await
            .is_ok()
    );
    let later = jan_15() + Duration::days(5);
    assert!(matches!(
        engine
            .resolve_authority("deputy", scope, Capability::Decide, later)
            .await,
        Err(EngineError::Unauthorized(_))
    ));
    assert!(matches!(
        engine
            .resolve_authority(
                "deputy",
                ActionScope::Document(DocumentKind::Settlement),
                Capability::Decide,
                jan_15()
            )
            .await,
        Err(EngineError::Unauthorized(_))
    ));

    engine
        .revoke_delegation(delegation.id, &admin())
        .await
        .unwrap();
    assert!(
        engine
            .resolve_authority("deputy", scope, Capability::Decide, jan_15())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn delegation_confers_only_what_the_delegator_still_holds() {
    let (engine, _db) = engine_with_db().await;
    engine
        .grant_role("cb", Role::BudgetController, &admin())
        .await
        .unwrap();
    engine
        .create_delegation(
            NewDelegation {
                delegator_id: "cb".to_string(),
                delegate_id: "deputy".to_string(),
                scopes: vec![ActionScope::Document(DocumentKind::Commitment)],
                starts_at: jan_15() - Duration::days(1),
                ends_at: jan_15() + Duration::days(1),
                reason: None,
            },
            &admin(),
        )
        .await
        .unwrap();

    engine
        .revoke_role("cb", Role::BudgetController, &admin())
        .await
        .unwrap();
    assert!(engine.roles_of("cb").await.unwrap().is_empty());
    let err = engine
        .resolve_authority(
            "deputy",
            ActionScope::Document(DocumentKind::Commitment),
            Capability::Decide,
            jan_15(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));
}

#[tokio::test]
async fn override_is_never_delegated() {
    let (engine, _db) = engine_with_db().await;
    let line = validated_line(&engine, "65.02", 100).await;
    engine
        .create_delegation(
            NewDelegation {
                delegator_id: common::ADMIN.to_string(),
                delegate_id: "deputy".to_string(),
                scopes: vec![ActionScope::Budget],
                starts_at: jan_15() - Duration::days(1),
                ends_at: jan_15() + Duration::days(1),
                reason: None,
            },
            &admin(),
        )
        .await
        .unwrap();

    let deputy = Actor::new("deputy", jan_15());
    let err = engine
        .reserve_with_override(line.id, 500, "urgent", "emergency", &deputy)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));
    assert_eq!(engine.compute_available(line.id).await.unwrap(), 100);
}

#[tokio::test]
async fn malformed_delegations_are_refused() {
    let (engine, _db) = engine_with_db().await;
    engine
        .grant_role("cb", Role::BudgetController, &admin())
        .await
        .unwrap();
    let base = NewDelegation {
        delegator_id: "cb".to_string(),
        delegate_id: "deputy".to_string(),
        scopes: vec![ActionScope::Transfers],
        starts_at: jan_15(),
        ends_at: jan_15() + Duration::days(7),
        reason: None,
    };

    let to_self = NewDelegation {
        delegate_id: "cb".to_string(),
        ..base.clone()
    };
    let no_scope = NewDelegation {
        scopes: Vec::new(),
        ..base.clone()
    };
    let reversed = NewDelegation {
        ends_at: jan_15() - Duration::days(1),
        ..base.clone()
    };
    for input in [to_self, no_scope, reversed] {
        assert!(matches!(
            engine.create_delegation(input, &admin()).await,
            Err(EngineError::InvalidInput(_))
        ));
    }

    let roleless = NewDelegation {
        delegator_id: "nobody".to_string(),
        ..base.clone()
    };
    assert!(matches!(
        engine.create_delegation(roleless, &admin()).await,
        Err(EngineError::Unauthorized(_))
    ));

    engine.create_delegation(base, &admin()).await.unwrap();
    assert_eq!(engine.list_delegations("deputy").await.unwrap().len(), 1);
}
