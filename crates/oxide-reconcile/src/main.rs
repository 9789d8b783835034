//! oxide-reconcile CLI
//!
//! Brings a SQLite database in line with a schema file.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, bail};
use clap::Parser;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use oxide_reconcile::prelude::*;

/// Declarative schema reconciliation for SQLite.
#[derive(Parser)]
#[command(name = "oxide-reconcile")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database path or `sqlite:` URL. The file is created if missing.
    #[arg(env = "DATABASE_URL")]
    database: String,

    /// Desired schema file, `-` to read it from stdin.
    #[arg(short, long, env = "SCHEMA", default_value = "-")]
    schema: PathBuf,

    /// Apply the plan without asking for confirmation.
    #[arg(long)]
    auto_apply: bool,

    /// Allow the plan to drop tables and columns.
    #[arg(long)]
    allow_deletions: bool,

    /// Print the plan as JSON.
    #[arg(long)]
    json: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn schema_from_stdin(&self) -> bool {
        self.schema == Path::new("-")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let outcome = tokio::select! {
        result = run(cli) => Some(result),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            None
        }
    };

    match outcome {
        Some(result) => result,
        None => {
            // The apply transaction, if any, was dropped with `run` and never committed.
            error!("Interrupted, no changes applied");
            std::process::exit(130);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let ddl = read_schema(&cli)?;
    let pool = connect(&cli.database)
        .await
        .with_context(|| format!("failed to open database {}", cli.database))?;

    let plan = Planner::new(pool.clone())
        .allow_deletions(cli.allow_deletions)
        .plan(&ddl)
        .await
        .context("failed to plan schema changes")?;

    if plan.is_empty() {
        info!("schema is up to date");
        pool.close().await;
        return Ok(());
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("Plan:");
        for (i, operation) in plan.iter().enumerate() {
            println!(" {}: {}", i + 1, operation.normalized());
        }
    }

    if !cli.auto_apply {
        let schema_from_stdin = cli.schema_from_stdin();
        let confirmed = tokio::task::spawn_blocking(move || confirm(schema_from_stdin)).await??;
        if !confirmed {
            bail!("plan not applied");
        }
    }

    Applier::new(pool.clone())
        .apply(&plan)
        .await
        .context("failed to apply plan")?;
    info!(operations = plan.len(), "Plan applied");

    pool.close().await;
    Ok(())
}

fn read_schema(cli: &Cli) -> anyhow::Result<String> {
    if cli.schema_from_stdin() {
        let mut ddl = String::new();
        io::stdin()
            .read_to_string(&mut ddl)
            .context("failed to read schema from stdin")?;
        Ok(ddl)
    } else {
        std::fs::read_to_string(&cli.schema)
            .with_context(|| format!("failed to read schema {}", cli.schema.display()))
    }
}

async fn connect(database: &str) -> anyhow::Result<SqlitePool> {
    let options = if database.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(database)?
    } else {
        SqliteConnectOptions::new().filename(database)
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options.create_if_missing(true))
        .await?;
    Ok(pool)
}

/// Asks for confirmation on the terminal, or on stdin when it is still free.
fn confirm(schema_from_stdin: bool) -> anyhow::Result<bool> {
    eprint!("Type \"y\" to apply plan: ");
    io::stderr().flush()?;

    let mut answer = String::new();
    match File::open("/dev/tty") {
        Ok(tty) => {
            BufReader::new(tty).read_line(&mut answer)?;
        }
        Err(_) if !schema_from_stdin => {
            io::stdin().lock().read_line(&mut answer)?;
        }
        Err(e) => {
            return Err(e).context("no terminal to confirm the plan on, use --auto-apply");
        }
    }

    Ok(answer.trim() == "y")
}
