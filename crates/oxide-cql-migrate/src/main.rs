//! oxide-cql-migrate CLI
//!
//! Offline tooling around schema files: definition statements, schema
//! diffs and query translation.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use oxide_cql_core::{ddl, where_clause, NormalizedSchema, SchemaDescription, SchemaDiff};
use serde::Serialize;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_cql_migrate::prelude::*;

/// Schema tooling for Cassandra-family databases.
#[derive(Parser)]
#[command(name = "oxide-cql-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Keyspace the schemas belong to.
    #[arg(short, long, env = "OXIDE_CQL_KEYSPACE", default_value = "oxide")]
    keyspace: String,

    /// Deployment environment.
    #[arg(short, long, env = "OXIDE_CQL_ENV", value_enum, default_value_t = Environment::Development)]
    env: Environment,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the definition statements of a schema file.
    Ddl {
        /// Schema file (JSON).
        schema: PathBuf,

        /// Table name (defaults to the schema's `table_name`, then the file
        /// name).
        #[arg(short, long)]
        table: Option<String>,
    },

    /// Compare a schema file with a live-schema file.
    Diff {
        /// Declared schema file (JSON).
        schema: PathBuf,

        /// Live schema file (JSON, same format).
        live: PathBuf,

        /// Migration mode used to report the planned action.
        #[arg(short, long, value_enum, default_value_t = MigrationMode::Safe)]
        mode: MigrationMode,
    },

    /// Translate a filter object into a WHERE clause.
    Query {
        /// Schema file (JSON).
        schema: PathBuf,

        /// Filter object (JSON).
        filter: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum PlannedAction {
    None,
    Mismatch,
    Alter,
    Recreate,
}

#[derive(Serialize)]
struct DiffReport {
    keyspace: String,
    effective_mode: MigrationMode,
    action: PlannedAction,
    #[serde(flatten)]
    diff: SchemaDiff,
}

fn table_name(schema: &SchemaDescription, path: &Path, table: Option<String>) -> anyhow::Result<String> {
    table
        .or_else(|| schema.table_name.clone())
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .context("cannot determine table name")
}

fn load(path: &Path) -> anyhow::Result<SchemaDescription> {
    load_schema_file(path).with_context(|| format!("loading schema {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Ddl { schema, table } => {
            let description = load(&schema)?;
            let table = table_name(&description, &schema, table)?;
            debug!(table = %table, "Rendering definition statements");

            println!("{}", ddl::create_table(&table, &description));
            for target in &description.indexes {
                println!("{}", ddl::create_index(&table, target));
            }
            for index in &description.custom_indexes {
                println!("{}", ddl::create_custom_index(&table, index));
            }
            for (name, view) in &description.materialized_views {
                println!("{}", ddl::create_materialized_view(&table, name, view));
            }
        }

        Commands::Diff { schema, live, mode } => {
            let declared = NormalizedSchema::from_schema(&load(&schema)?)?;
            let live = NormalizedSchema::from_schema(&load(&live)?)?;
            let diff = SchemaDiff::between(&live, &declared);

            let config = MigrationConfig::new(cli.keyspace.clone())
                .migration(mode)
                .environment(cli.env);
            let effective_mode = config.effective_mode();
            let action = if diff.is_empty() {
                PlannedAction::None
            } else {
                match effective_mode {
                    MigrationMode::Safe => PlannedAction::Mismatch,
                    MigrationMode::Alter if !diff.key_changed => PlannedAction::Alter,
                    MigrationMode::Alter | MigrationMode::Drop => PlannedAction::Recreate,
                }
            };

            let report = DiffReport {
                keyspace: config.keyspace,
                effective_mode,
                action,
                diff,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Query { schema, filter } => {
            let description = load(&schema)?;
            let filter: serde_json::Value =
                serde_json::from_str(&filter).context("filter is not valid JSON")?;
            let object = filter
                .as_object()
                .context("filter must be a JSON object")?;
            let clause = where_clause(&description, object)?;

            println!("{}", clause.text);
            println!("{}", serde_json::to_string(&clause.params)?);
        }
    }

    Ok(())
}
