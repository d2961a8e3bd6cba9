use std::time::Duration;

use engine::{Actor, Engine};
use migration::{Migrator, MigratorTrait};
use settings::Database;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "spendchain={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let db = parse_database(&settings.database).await?;
    let engine = Engine::builder()
        .database(db)
        .settings((&settings.engine).into())
        .build()
        .await?;
    tracing::info!(settings = ?engine.settings(), "engine ready");

    let Some(alerts) = settings.alerts else {
        tracing::info!("no alert schedule configured, waiting for shutdown");
        tokio::signal::ctrl_c().await?;
        return Ok(());
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(alerts.interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => evaluate_all(&engine, &alerts).await,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// One evaluation pass over every configured exercise. Failures are logged
/// and the next tick tries again.
async fn evaluate_all(engine: &Engine, alerts: &settings::Alerts) {
    for &exercise in &alerts.exercises {
        let actor = Actor::now(alerts.actor.as_str());
        match engine.evaluate(exercise, &actor).await {
            Ok(raised) if raised.is_empty() => {
                tracing::debug!(exercise, "no new alerts");
            }
            Ok(raised) => {
                for alert in &raised {
                    tracing::warn!(
                        exercise,
                        line = %alert.line_code,
                        severity = alert.severity.as_str(),
                        ratio_bps = alert.ratio_bps,
                        "{}",
                        alert.message
                    );
                }
            }
            Err(err) => tracing::error!(exercise, "alert evaluation failed: {err}"),
        }
    }
}

async fn parse_database(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
