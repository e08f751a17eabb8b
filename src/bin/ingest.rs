// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local-mode ingestion CLI.
//!
//! Runs one file under a local storage root through the pipeline, or
//! inspects the snapshots already stored there.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use workout_ingest::config::DEFAULT_MAX_SUMMARY_RECORDS;
use workout_ingest::models::{IngestEvent, Lineage, VersionId};
use workout_ingest::services::{LogNotifier, Pipeline, SnapshotRepository};
use workout_ingest::storage::local::LocalStore;

#[derive(Parser, Debug)]
#[command(
    name = "ingest",
    version,
    about = "Ingest workout history exports into versioned local snapshots"
)]
struct Opt {
    /// Storage root holding incoming files plus current/ and archive/
    #[arg(
        long,
        env = "LOCAL_STORAGE_PATH",
        default_value = "local_testing",
        value_hint = ValueHint::DirPath
    )]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process one file and print the outcome as JSON
    Run {
        /// File key relative to the storage root
        file_key: String,
        /// Lineage name; defaults to the file stem
        #[arg(long)]
        lineage: Option<String>,
        #[arg(long, default_value_t = DEFAULT_MAX_SUMMARY_RECORDS)]
        max_summary_records: usize,
    },
    /// List archived versions of a lineage, oldest first
    History { lineage: String },
    /// Print a stored snapshot (current when no version is given)
    Show {
        lineage: String,
        version: Option<VersionId>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let opt = Opt::parse();
    match run(opt).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "ingest failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(opt: Opt) -> Result<ExitCode> {
    let store = Arc::new(LocalStore::new(&opt.root).await?);

    match opt.command {
        Commands::Run {
            file_key,
            lineage,
            max_summary_records,
        } => {
            let pipeline = Pipeline::new(store, Arc::new(LogNotifier), max_summary_records);
            let mut event = IngestEvent::local(file_key);
            if let Some(lineage) = lineage {
                event = event.with_lineage(lineage);
            }
            let outcome = pipeline.process(&event).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::History { lineage } => {
            let repository = SnapshotRepository::new(store);
            for version in repository.history(&Lineage::new(lineage)?).await? {
                println!("{}", version);
            }
        }
        Commands::Show { lineage, version } => {
            let repository = SnapshotRepository::new(store);
            let lineage = Lineage::new(lineage)?;
            let snapshot = match version {
                Some(version) => repository.read_version(&lineage, &version).await?,
                None => match repository.get_current(&lineage).await? {
                    Some(snapshot) => snapshot,
                    None => {
                        eprintln!("No current snapshot for {}", lineage);
                        return Ok(ExitCode::FAILURE);
                    }
                },
            };
            let bytes = workout_ingest::services::csv_codec::encode_snapshot(&snapshot)?;
            print!("{}", String::from_utf8_lossy(&bytes));
        }
    }
    Ok(ExitCode::SUCCESS)
}
