//! Command-line interface for db_reconcile
//!
//! ```bash
//! # what would make `replica` look like `primary`
//! db_reconcile --config reconcile.toml compare primary replica
//!
//! # render and apply the migration in one transaction where the engine allows it
//! db_reconcile migrate primary replica --apply --transactional
//!
//! # copy missing rows and fix differing ones
//! db_reconcile sync-table primary replica users --keys id --insert --update
//!
//! # status of every target in an instance group
//! db_reconcile --format yaml group-status fleet
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use db_reconcile::{utils::logging::init_logging, GroupChecks, ReconcileClient, SyncOptions};

#[derive(Parser)]
#[command(name = "db_reconcile")]
#[command(about = "Compare and reconcile schemas and rows across SQL databases")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "reconcile.toml")]
    config: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff the target schema against the source
    Compare { source: String, target: String },

    /// Render the migration that brings the target to the source schema
    Migrate {
        source: String,
        target: String,

        /// Execute the script instead of printing it
        #[arg(long)]
        apply: bool,

        /// Wrap the script in one transaction where the engine supports it
        #[arg(long)]
        transactional: bool,
    },

    /// Row counts and key presence for every table
    RowCounts { source: String, target: String },

    /// Reconcile the rows of one table
    SyncTable {
        source: String,
        target: String,
        table: String,

        /// Key columns identifying rows
        #[arg(long, value_delimiter = ',', required = true)]
        keys: Vec<String>,

        /// Insert rows missing from the target
        #[arg(long)]
        insert: bool,

        /// Update rows that differ
        #[arg(long)]
        update: bool,

        /// Delete rows missing from the source
        #[arg(long)]
        delete: bool,

        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Check every target of an instance group
    GroupStatus {
        group: String,

        /// Skip the schema comparison
        #[arg(long)]
        no_schema: bool,

        /// Skip row counts
        #[arg(long)]
        no_rows: bool,
    },

    /// Check that a connection can be opened
    Test { connection: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = db_reconcile::config::load_from_file(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;
    init_logging(&config.logging).context("Failed to initialise logging")?;

    if let Commands::Migrate { transactional: true, .. } = cli.command {
        config.migrations.transactional = true;
    }
    if let Commands::Migrate { apply: false, .. } = cli.command {
        config.migrations.dry_run = true;
    }
    let client = ReconcileClient::new(config);

    let outcome = execute(&client, cli.command, cli.format).await;
    client.disconnect_all().await;
    outcome
}

async fn execute(client: &ReconcileClient, command: Commands, format: Format) -> anyhow::Result<()> {
    match command {
        Commands::Compare { source, target } => {
            let diff = client
                .compare_schemas(&source, &target)
                .await
                .with_context(|| format!("Failed to compare '{source}' with '{target}'"))?;
            print(&diff, format)
        }
        Commands::Migrate { source, target, apply, .. } => {
            let diff = client
                .compare_schemas(&source, &target)
                .await
                .with_context(|| format!("Failed to compare '{source}' with '{target}'"))?;
            for warning in &diff.warnings {
                tracing::warn!(warning = %warning, "Diff warning");
            }
            let plan = client.generate_migrations(&diff);
            if !apply {
                return print(&plan.sql(), format);
            }
            let outcome = client
                .apply_plan(&target, &plan)
                .await
                .with_context(|| format!("Failed to apply migration to '{target}'"))?;
            print(&outcome, format)?;
            outcome.outcome.into_result()?;
            Ok(())
        }
        Commands::RowCounts { source, target } => {
            let counts = client
                .get_table_row_counts(&source, &target)
                .await
                .with_context(|| format!("Failed to count rows of '{source}' and '{target}'"))?;
            print(&counts, format)
        }
        Commands::SyncTable {
            source,
            target,
            table,
            keys,
            insert,
            update,
            delete,
            batch_size,
        } => {
            let options = SyncOptions {
                insert_missing: insert,
                update_different: update,
                delete_extra: delete,
                primary_keys: keys,
                batch_size,
            };
            let result = client
                .sync_table_data(&source, &target, &table, &options)
                .await
                .with_context(|| format!("Failed to sync table '{table}'"))?;
            print(&result, format)?;
            result.into_result()?;
            Ok(())
        }
        Commands::GroupStatus {
            group,
            no_schema,
            no_rows,
        } => {
            let checks = GroupChecks {
                schema: !no_schema,
                row_counts: !no_rows,
            };
            let status = client
                .get_group_sync_status(&group, checks)
                .await
                .with_context(|| format!("Failed to check group '{group}'"))?;
            print(&status, format)
        }
        Commands::Test { connection } => {
            let test = client.test_connection(&connection).await;
            print(&test, format)?;
            if !test.success {
                anyhow::bail!("connection '{connection}' failed");
            }
            Ok(())
        }
    }
}

fn print<T: Serialize>(value: &T, format: Format) -> anyhow::Result<()> {
    let rendered = match format {
        Format::Json => serde_json::to_string_pretty(value)?,
        Format::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{}", rendered);
    Ok(())
}
