// packages/engine/src/main.rs
//! Probelog Recording Engine
//!
//! Validates the configuration, opens the event log and reports its contents.
//!
//! ```text
//! probelog-engine                  check configuration and summarize the log
//! probelog-engine export [json|jsonl]   print every recorded event
//! probelog-engine calls [json|jsonl]    print asynchronous calls joined with their outcomes
//! ```

use anyhow::{bail, Context, Result};
use probelog_engine::observability::{init_metrics, init_tracing};
use probelog_engine::recording::{
    correlate, Compressor, CorrelationTable, EventStorage, ExportFormat, Exporter, LogEntry,
};
use probelog_engine::utils::config::EngineConfig;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first: it decides how logging is set up
    let config = EngineConfig::load().context("failed to load configuration")?;

    init_tracing(&config.logging)?;
    let _metrics = init_metrics()?;

    info!("Starting Probelog Recording Engine v{}", env!("CARGO_PKG_VERSION"));

    // An invalid capture policy would record nothing while looking active
    let policy = config
        .capture_policy()
        .context("refusing to start with an invalid capture policy")?;
    info!(
        "Capture policy: {} (mode: {:?})",
        policy, config.recording.mode
    );

    let storage = EventStorage::new(config.storage.clone()).await?;
    let compressor = Compressor::new(config.recording.compression_level);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => summarize(&storage).await,
        Some(command @ ("export" | "calls")) => {
            let format = match args.get(1) {
                Some(name) => name.parse::<ExportFormat>()?,
                None => ExportFormat::Json,
            };
            export(&storage, &compressor, format, command == "calls").await
        }
        Some(other) => bail!("unknown command '{}' (expected 'export' or 'calls')", other),
    }
}

async fn summarize(storage: &EventStorage) -> Result<()> {
    let stats = storage.stats().await?;
    info!(
        "Event log: {} entries in {} batches ({} bytes), {} registered classes",
        stats.total_entries, stats.total_batches, stats.total_size_bytes, stats.total_classes
    );
    Ok(())
}

async fn export(
    storage: &EventStorage,
    compressor: &Compressor,
    format: ExportFormat,
    calls_only: bool,
) -> Result<()> {
    let entries = storage.read_entries(compressor).await?;

    // Rebuild the anchor table from the registrations stored alongside the events
    let table = CorrelationTable::new();
    let mut events = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            LogEntry::Event(event) => events.push(event),
            LogEntry::Weave { probe_ids, .. } => {
                if let Some(&anchor) = probe_ids.first() {
                    table.register_batch(anchor, &probe_ids);
                }
            }
        }
    }

    let exporter = Exporter::new(format);
    let calls = correlate(&events, &table);

    if calls_only {
        println!("{}", exporter.export_calls(&calls)?);
    } else {
        println!("{}", exporter.export(&events)?);
    }

    let pending = calls.iter().filter(|c| c.outcomes.is_empty()).count();
    if pending > 0 {
        warn!("{} asynchronous calls have no completion event", pending);
    }
    info!("Exported {} events, {} correlated calls", events.len(), calls.len());
    Ok(())
}
