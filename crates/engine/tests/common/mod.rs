#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

use engine::{
    Actor, BudgetLine, Classification, Document, DocumentKind, Engine, EngineSettings,
    NewBudgetLine, NewDocument, Role,
};
use migration::MigratorTrait;

pub const EXERCISE: i32 = 2026;
pub const ADMIN: &str = "admin";

/// Mid January 2026: references minted at this instant use period 01/26.
pub fn jan_15() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

pub fn admin() -> Actor {
    Actor::new(ADMIN, jan_15())
}

pub fn actor(id: &str) -> Actor {
    Actor::new(id, jan_15())
}

async fn bootstrap(db: &DatabaseConnection, settings: EngineSettings) -> Engine {
    migration::Migrator::up(db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .settings(settings)
        .build()
        .await
        .unwrap();
    engine
        .grant_role(ADMIN, Role::Admin, &Actor::new("bootstrap", jan_15()))
        .await
        .unwrap();
    engine
}

pub async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let engine = bootstrap(&db, EngineSettings::default()).await;
    (engine, db)
}

/// File backed database, so that several pooled connections really run
/// concurrently.
pub async fn engine_with_file_db() -> (Engine, DatabaseConnection, std::path::PathBuf) {
    let root = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/test_dbs");
    std::fs::create_dir_all(&root).unwrap();

    let path = root.join(format!("engine_{}.db", Uuid::new_v4()));
    let url = format!("sqlite:{}?mode=rwc", path.display());

    let db = Database::connect(&url).await.unwrap();
    let engine = bootstrap(
        &db,
        EngineSettings {
            max_attempts: 50,
            retry_backoff_ms: 5,
        },
    )
    .await;
    (engine, db, path)
}

/// Creates, submits and validates a line as admin.
pub async fn validated_line(engine: &Engine, code: &str, allocation: i64) -> BudgetLine {
    let line = engine
        .create_budget_line(
            NewBudgetLine {
                code: code.to_string(),
                label: format!("Line {code}"),
                exercise: EXERCISE,
                classification: Classification::default(),
                initial_allocation: allocation,
            },
            &admin(),
        )
        .await
        .unwrap();
    engine.submit_budget_line(line.id, &admin()).await.unwrap();
    engine.validate_budget_line(line.id, &admin()).await.unwrap()
}

pub async fn draft(
    engine: &Engine,
    kind: DocumentKind,
    amount: i64,
    line_id: Option<Uuid>,
    parent_id: Option<Uuid>,
    by: &Actor,
) -> Document {
    engine
        .create_document(
            NewDocument {
                kind,
                exercise: EXERCISE,
                object: format!("{} for tests", kind.as_str()),
                amount,
                budget_line_id: line_id,
                parent_id,
            },
            by,
        )
        .await
        .unwrap()
}

/// Drafts, submits and validates a document as admin.
pub async fn validated(
    engine: &Engine,
    kind: DocumentKind,
    amount: i64,
    line_id: Option<Uuid>,
    parent_id: Option<Uuid>,
) -> Document {
    let document = draft(engine, kind, amount, line_id, parent_id, &admin()).await;
    engine.submit(document.id, &admin()).await.unwrap();
    engine.validate(document.id, &admin()).await.unwrap().document
}
