use sea_orm::DatabaseConnection;

use crate::ResultEngine;

mod alerts;
mod audit;
mod authority;
mod budget_lines;
mod ledger;
mod sequences;
mod transfers;
mod workflow;

pub use alerts::{AlertFilter, AlertSummary, NewAlertRule, OverBudgetLine};
pub use authority::NewDelegation;
pub use budget_lines::NewBudgetLine;
pub use sequences::ResyncReport;
pub use transfers::NewTransfer;
pub use workflow::{DocumentFilter, TransitionOutcome};

/// Run a block inside a DB transaction, committing on success and rolling
/// back on error.
///
/// Retryable failures (store lock conflicts and lost compare-and-set races)
/// re-run the whole block in a fresh transaction, up to
/// `EngineSettings::max_attempts` times, before being reported as the given
/// contention class. The block is evaluated once per attempt, so it must only
/// borrow its inputs.
macro_rules! with_tx {
    ($self:expr, $contended:expr, |$tx:ident| $body:expr) => {{
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = async {
                let $tx = sea_orm::TransactionTrait::begin(&$self.database).await?;
                let value = {
                    let body: $crate::ResultEngine<_> = $body;
                    body
                }?;
                $tx.commit().await?;
                Ok::<_, $crate::EngineError>(value)
            }
            .await;
            match result {
                Err(err) if err.is_retryable() => {
                    if attempt >= $self.settings.max_attempts {
                        tracing::warn!(attempt, error = %err, "giving up after contention");
                        break Err(err.into_contention($contended));
                    }
                    tracing::warn!(attempt, error = %err, "contention, retrying");
                    let backoff = $self.settings.retry_backoff_ms * u64::from(attempt);
                    tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                }
                other => break other,
            }
        }
    }};
}

pub(crate) use with_tx;

/// Tuning knobs for the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    /// Attempts per operation before a contention error is surfaced.
    pub max_attempts: u32,
    /// Linear backoff step between attempts.
    pub retry_backoff_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_backoff_ms: 20,
        }
    }
}

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    settings: EngineSettings,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    settings: EngineSettings,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> EngineBuilder {
        self.settings = settings;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            settings: EngineSettings {
                max_attempts: self.settings.max_attempts.max(1),
                ..self.settings
            },
        })
    }
}
