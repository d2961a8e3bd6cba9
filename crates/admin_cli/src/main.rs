use std::{error::Error, path::PathBuf};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use engine::{ActionScope, Actor, Classification, Engine, NewBudgetLine, NewDelegation, Role};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "spend_admin")]
#[command(about = "Admin utilities for spendchain (budget lines, roles, sequences)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./spendchain.db?mode=rwc"
    )]
    database_url: String,

    /// Identity recorded as the actor of every change.
    #[arg(long, env = "SPEND_ACTOR", default_value = "admin")]
    actor: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Line(Line),
    Role(RoleCmd),
    Delegation(Delegation),
    Sequence(Sequence),
    Alerts(Alerts),
    /// Prints the workflow history of a document.
    Transitions {
        #[arg(long)]
        document: Uuid,
    },
}

#[derive(Args, Debug)]
struct Line {
    #[command(subcommand)]
    command: LineCommand,
}

#[derive(Subcommand, Debug)]
enum LineCommand {
    Create(LineCreateArgs),
    Submit {
        #[arg(long)]
        id: Uuid,
    },
    Validate {
        #[arg(long)]
        id: Uuid,
    },
    List {
        #[arg(long)]
        exercise: i32,
    },
}

#[derive(Args, Debug)]
struct LineCreateArgs {
    #[arg(long)]
    code: String,
    #[arg(long)]
    label: String,
    #[arg(long)]
    exercise: i32,
    /// Initial allocation in minor units.
    #[arg(long)]
    allocation: i64,
    #[arg(long)]
    unit: Option<String>,
    #[arg(long)]
    objective: Option<String>,
    #[arg(long)]
    nature: Option<String>,
}

#[derive(Args, Debug)]
struct RoleCmd {
    #[command(subcommand)]
    command: RoleCommand,
}

#[derive(Subcommand, Debug)]
enum RoleCommand {
    Grant {
        #[arg(long)]
        to: String,
        #[arg(long, value_parser = parse_role)]
        role: Role,
    },
    Revoke {
        #[arg(long)]
        from: String,
        #[arg(long, value_parser = parse_role)]
        role: Role,
    },
}

#[derive(Args, Debug)]
struct Delegation {
    #[command(subcommand)]
    command: DelegationCommand,
}

#[derive(Subcommand, Debug)]
enum DelegationCommand {
    Create(DelegationCreateArgs),
}

#[derive(Args, Debug)]
struct DelegationCreateArgs {
    #[arg(long)]
    delegator: String,
    #[arg(long)]
    delegate: String,
    /// Comma separated scopes, e.g. `commitment,transfer`.
    #[arg(long)]
    scopes: String,
    /// RFC 3339 instant.
    #[arg(long)]
    starts_at: DateTime<Utc>,
    #[arg(long)]
    ends_at: DateTime<Utc>,
    #[arg(long)]
    reason: Option<String>,
}

#[derive(Args, Debug)]
struct Sequence {
    #[command(subcommand)]
    command: SequenceCommand,
}

#[derive(Subcommand, Debug)]
enum SequenceCommand {
    /// Lists every counter and its last value.
    Status,
    /// Raises counters to the highest sequence found in a CSV export.
    Resync(ResyncArgs),
}

#[derive(Args, Debug)]
struct ResyncArgs {
    #[arg(long)]
    csv: PathBuf,
    /// Header of the column holding legacy references.
    #[arg(long, default_value = "reference")]
    column: String,
}

#[derive(Args, Debug)]
struct Alerts {
    #[command(subcommand)]
    command: AlertsCommand,
}

#[derive(Subcommand, Debug)]
enum AlertsCommand {
    /// Runs one evaluation pass and prints the alerts it raised.
    Check {
        #[arg(long)]
        exercise: i32,
    },
}

fn parse_role(raw: &str) -> Result<Role, String> {
    Role::try_from(raw).map_err(|err| err.to_string())
}

fn read_references(args: &ResyncArgs) -> Result<Vec<String>, Box<dyn Error + Send + Sync>> {
    let mut reader = csv::Reader::from_path(&args.csv)?;
    let index = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == args.column)
        .ok_or_else(|| format!("column not found: {}", args.column))?;

    let mut references = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(index) {
            references.push(value.trim().to_string());
        }
    }
    Ok(references)
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let db = connect_db(&cli.database_url).await?;
    let engine = Engine::builder().database(db).build().await?;
    let actor = Actor::now(cli.actor);

    match cli.command {
        Command::Line(Line { command }) => match command {
            LineCommand::Create(args) => {
                let line = engine
                    .create_budget_line(
                        NewBudgetLine {
                            code: args.code,
                            label: args.label,
                            exercise: args.exercise,
                            classification: Classification {
                                unit_id: args.unit,
                                objective_id: args.objective,
                                nature_code: args.nature,
                            },
                            initial_allocation: args.allocation,
                        },
                        &actor,
                    )
                    .await?;
                println!("created budget line: {} ({})", line.code, line.id);
            }
            LineCommand::Submit { id } => {
                let line = engine.submit_budget_line(id, &actor).await?;
                println!("submitted budget line: {}", line.code);
            }
            LineCommand::Validate { id } => {
                let line = engine.validate_budget_line(id, &actor).await?;
                println!("validated budget line: {}", line.code);
            }
            LineCommand::List { exercise } => {
                for line in engine.list_budget_lines(exercise).await? {
                    println!(
                        "{}\t{}\t{}\tallocation={}\tcommitted={}\tavailable={}",
                        line.id,
                        line.code,
                        line.status.as_str(),
                        line.current_allocation(),
                        line.committed,
                        line.available(),
                    );
                }
            }
        },
        Command::Role(RoleCmd { command }) => match command {
            RoleCommand::Grant { to, role } => {
                engine.grant_role(&to, role, &actor).await?;
                println!("granted {} to {to}", role.as_str());
            }
            RoleCommand::Revoke { from, role } => {
                engine.revoke_role(&from, role, &actor).await?;
                println!("revoked {} from {from}", role.as_str());
            }
        },
        Command::Delegation(Delegation {
            command: DelegationCommand::Create(args),
        }) => {
            let scopes = match ActionScope::parse_list(&args.scopes) {
                Ok(scopes) => scopes,
                Err(err) => {
                    eprintln!("{err}");
                    std::process::exit(2);
                }
            };
            let delegation = engine
                .create_delegation(
                    NewDelegation {
                        delegator_id: args.delegator,
                        delegate_id: args.delegate,
                        scopes,
                        starts_at: args.starts_at,
                        ends_at: args.ends_at,
                        reason: args.reason,
                    },
                    &actor,
                )
                .await?;
            println!("created delegation: {}", delegation.id);
        }
        Command::Sequence(Sequence { command }) => match command {
            SequenceCommand::Status => {
                for counter in engine.list_counters().await? {
                    println!("{}\t{}", counter.scope, counter.last_value);
                }
            }
            SequenceCommand::Resync(args) => {
                let references = read_references(&args)?;
                let report = engine.resync_from_references(references, &actor).await?;
                for counter in &report.counters {
                    println!("{}\t{}", counter.scope, counter.last_value);
                }
                if report.skipped > 0 {
                    eprintln!("skipped {} unparseable references", report.skipped);
                }
            }
        },
        Command::Alerts(Alerts {
            command: AlertsCommand::Check { exercise },
        }) => {
            let raised = engine.evaluate(exercise, &actor).await?;
            if raised.is_empty() {
                println!("no new alerts");
            }
            for alert in raised {
                println!("{}\t{}", alert.severity.as_str(), alert.message);
            }
        }
        Command::Transitions { document } => {
            for record in engine.list_transitions(document).await? {
                let on_behalf = record
                    .authority
                    .delegator_id()
                    .map(|d| format!(" (for {d})"))
                    .unwrap_or_default();
                println!(
                    "{}\t{}\t{} -> {}\t{}{on_behalf}",
                    record.occurred_at.to_rfc3339(),
                    record.action.as_str(),
                    record.from_status.as_str(),
                    record.to_status.as_str(),
                    record.actor_id,
                );
            }
        }
    }

    Ok(())
}
