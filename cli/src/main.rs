use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tablelog_kernel::log::decode_batch;
use tablelog_kernel::protocol::{check_protocol, Operation, SupportedVersions};
use tablelog_kernel::snapshot::{commit, create_table, load_snapshot, write_checkpoint};
use tablelog_kernel::{KernelConfig, Metadata, Protocol, TableState, Version};

mod store;

use store::DirectoryLogStore;

/// Tablelog transaction log CLI
#[derive(Parser, Debug)]
#[command(name = "tablelog")]
#[command(about = "Inspect and extend a table transaction log", long_about = None)]
struct Cli {
    /// Path to kernel config JSON
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a summary of the table state
    State {
        /// Log directory
        #[arg(long)]
        log: String,

        /// Version to load (latest if omitted)
        #[arg(long)]
        version: Option<Version>,
    },

    /// Check whether this implementation may read or write the table
    Check {
        #[arg(long)]
        log: String,

        #[arg(long, value_enum)]
        operation: OperationArg,
    },

    /// Create a new table at version 0
    Create {
        #[arg(long)]
        log: String,

        /// Path to the table schema JSON
        #[arg(long)]
        schema: String,

        /// Partition columns, comma separated
        #[arg(long, value_delimiter = ',')]
        partition_by: Vec<String>,

        #[arg(long)]
        name: Option<String>,
    },

    /// Commit newline-delimited action records as the next version
    Commit {
        #[arg(long)]
        log: String,

        /// File with one action envelope per line
        #[arg(long)]
        actions: String,
    },

    /// Write a checkpoint for the latest version
    Checkpoint {
        #[arg(long)]
        log: String,

        /// Reference time for tombstone retention, epoch milliseconds
        #[arg(long)]
        now: Option<i64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OperationArg {
    Read,
    Write,
}

impl From<OperationArg> for Operation {
    fn from(arg: OperationArg) -> Self {
        match arg {
            OperationArg::Read => Operation::Read,
            OperationArg::Write => Operation::Write,
        }
    }
}

/// JSON summary of a table state
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StateSummary {
    version: Version,
    table_id: String,
    name: Option<String>,
    protocol: Protocol,
    partition_columns: Vec<String>,
    num_files: usize,
    size_in_bytes: i64,
    num_tombstones: usize,
    files: Vec<String>,
}

impl From<&TableState> for StateSummary {
    fn from(state: &TableState) -> Self {
        let mut files: Vec<_> = state.active_files().keys().cloned().collect();
        files.sort();
        Self {
            version: state.version(),
            table_id: state.metadata().id.clone(),
            name: state.metadata().name.clone(),
            protocol: *state.protocol(),
            partition_columns: state.metadata().partition_columns.clone(),
            num_files: state.num_files(),
            size_in_bytes: state.size_in_bytes(),
            num_tombstones: state.tombstones().len(),
            files,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckOutput {
    version: Version,
    protocol: Protocol,
    supported: SupportedVersions,
    permitted: bool,
    reason: Option<String>,
}

fn now_ms() -> Result<i64> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(i64::try_from(elapsed.as_millis())?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // ----------------------------
    // Load config
    // ----------------------------
    let config = if let Some(path) = &cli.config {
        let data = fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
        KernelConfig::from_json(&data)?
    } else {
        KernelConfig::default_config()
    };

    match cli.command {
        Command::State { log, version } => {
            let store = DirectoryLogStore::new(log);
            let state = load_snapshot(&store, version, &config, now_ms()?)?;
            print_json(&StateSummary::from(&state))
        }

        Command::Check { log, operation } => {
            // Load without gating so the table protocol can be reported.
            let inspect = KernelConfig {
                supported_versions: SupportedVersions::new(i32::MAX, i32::MAX),
                ..config.clone()
            };
            let store = DirectoryLogStore::new(log);
            let state = load_snapshot(&store, None, &inspect, now_ms()?)?;

            let result =
                check_protocol(state.protocol(), config.supported_versions, operation.into());
            print_json(&CheckOutput {
                version: state.version(),
                protocol: *state.protocol(),
                supported: config.supported_versions,
                permitted: result.is_ok(),
                reason: result.err().map(|e| e.to_string()),
            })
        }

        Command::Create {
            log,
            schema,
            partition_by,
            name,
        } => {
            let schema_string =
                fs::read_to_string(&schema).with_context(|| format!("reading schema {schema}"))?;
            let mut metadata = Metadata::new_table(schema_string.trim(), partition_by, now_ms()?);
            if let Some(name) = name {
                metadata = metadata.with_name(name);
            }
            metadata
                .parse_schema()
                .context("schema is not a valid struct schema")?;

            let mut store = DirectoryLogStore::new(log);
            let protocol = Protocol::from(config.supported_versions);
            let state = create_table(&mut store, metadata, protocol, &config)?;
            print_json(&StateSummary::from(&state))
        }

        Command::Commit { log, actions } => {
            let data =
                fs::read_to_string(&actions).with_context(|| format!("reading actions {actions}"))?;
            let actions = decode_batch(data.lines())?;

            let mut store = DirectoryLogStore::new(log);
            let state = load_snapshot(&store, None, &config, now_ms()?)?;
            let next = commit(&mut store, &state, actions, &config)?;
            print_json(&StateSummary::from(&next))
        }

        Command::Checkpoint { log, now } => {
            let now = match now {
                Some(now) => now,
                None => now_ms()?,
            };
            let mut store = DirectoryLogStore::new(log);
            let state = load_snapshot(&store, None, &config, now)?;
            let records = write_checkpoint(&mut store, &state, &config, now)?;
            print_json(&serde_json::json!({
                "version": state.version(),
                "records": records,
            }))
        }
    }
}
