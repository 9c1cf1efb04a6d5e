#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Admin CLI for geotrack track stores.
//!
//! Opens the same store the server would (resolved from `GEOTRACK_CONFIG`
//! and the `GEOTRACK_*` environment variables), with command-line flags
//! taking precedence.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use geotrack_store::{Backend, IdPolicy, StoreConfig, StoreError, TrackStore, open_store};
use geotrack_track_models::{LocationReport, SortOrder, TrackRecord};

#[derive(Parser)]
#[command(name = "geotrack_cli", about = "Inspect and edit geotrack track stores")]
struct Cli {
    /// Storage backend (`csv` or `document`)
    #[arg(long, global = true)]
    backend: Option<Backend>,
    /// Directory holding the store's files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Whether ids restart after `delete-all` (`reset` or `preserve`)
    #[arg(long, global = true)]
    id_policy: Option<IdPolicy>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every stored record
    List {
        /// `asc` or `desc` by timestamp
        #[arg(long, default_value = "desc")]
        order: SortOrder,
    },
    /// Print a single record as JSON
    Show {
        /// Record id
        id: u64,
    },
    /// Store a report given as a JSON object
    Submit {
        /// Report JSON, e.g. `{"latitude":1.0,"longitude":2.0,...}`
        json: String,
    },
    /// Delete a single record
    Delete {
        /// Record id
        id: u64,
    },
    /// Delete every record
    DeleteAll {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Invalid report JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Refusing to delete every record without --yes")]
    NotConfirmed,
}

impl Cli {
    /// Applies the command-line overrides on top of `config`.
    fn apply(&self, mut config: StoreConfig) -> StoreConfig {
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(data_dir) = &self.data_dir {
            config.data_dir.clone_from(data_dir);
        }
        if let Some(id_policy) = self.id_policy {
            config.id_policy = id_policy;
        }
        config
    }
}

fn write_table(out: &mut impl Write, records: &[TrackRecord]) -> std::io::Result<()> {
    writeln!(
        out,
        "{:<6} {:<26} {:>10} {:>11} {:>10} {:>10} {:<7} LABEL",
        "ID", "TIMESTAMP", "LATITUDE", "LONGITUDE", "DIST_KM", "KMH", "ANOMALY"
    )?;
    writeln!(out, "{}", "-".repeat(90))?;
    for record in records {
        let speed = record
            .speed_kmh
            .map_or_else(|| "-".to_string(), |s| format!("{s:.1}"));
        writeln!(
            out,
            "{:<6} {:<26} {:>10.5} {:>11.5} {:>10.3} {:>10} {:<7} {}",
            record.id,
            record.timestamp.to_rfc3339(),
            record.latitude,
            record.longitude,
            record.distance_km,
            speed,
            record.anomaly,
            record.label
        )?;
    }
    Ok(())
}

#[allow(clippy::future_not_send)]
async fn execute(
    store: &dyn TrackStore,
    command: Commands,
    out: &mut impl Write,
) -> Result<(), CliError> {
    match command {
        Commands::List { order } => {
            let records = store.list(order).await?;
            write_table(out, &records)?;
        }
        Commands::Show { id } => {
            let record = store.get(id).await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&record)?)?;
        }
        Commands::Submit { json } => {
            let report: LocationReport = serde_json::from_str(&json)?;
            let record = store.append(&report).await?;
            if record.anomaly {
                log::warn!("Record {} was flagged as anomalous", record.id);
            }
            writeln!(out, "{}", serde_json::to_string_pretty(&record)?)?;
        }
        Commands::Delete { id } => {
            if store.delete_one(id).await? {
                writeln!(out, "Deleted record {id}")?;
            } else {
                writeln!(out, "No record with id {id}")?;
            }
        }
        Commands::DeleteAll { yes } => {
            if !yes {
                return Err(CliError::NotConfirmed);
            }
            store.delete_all().await?;
            writeln!(out, "Deleted all records")?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    let config = cli.apply(StoreConfig::from_env()?);
    let store = open_store(&config)?;

    let mut stdout = std::io::stdout().lock();
    execute(store.as_ref(), cli.command, &mut stdout).await?;

    Ok(())
}
