//! # Media Library Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento configurazione + override da CLI
//! - Costruzione di catalogo, statistiche e servizio per la libreria
//! - Dispatch dei sottocomandi
//!
//! ## Sottocomandi:
//! - `scan`: registra immagini e derived sizes della libreria nel catalogo
//! - `optimize <ID>`: ottimizza un singolo asset
//! - `batch`: un batch stateless (`--batch-size`, `--offset`)
//! - `run`: job completo con progress bar, ripreso se interrotto
//! - `revert <ID>`: ripristina l'originale dal backup
//! - `stats`: statistiche globali, log e libreria
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-library-optimizer --library /srv/uploads scan
//! media-library-optimizer --library /srv/uploads --quality 70 run
//! media-library-optimizer --library /srv/uploads --json stats
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

use media_library_optimizer::file_manager::FileManager;
use media_library_optimizer::json_output::{JsonMessage, JsonSettings};
use media_library_optimizer::progress::{ProgressManager, RunTally};
use media_library_optimizer::{
    AssetId, BatchRequest, BatchResult, Catalog, CompressionMode, Config, ImageCodec, JobRecord, JobStore,
    JsonCatalog, JsonStatsStore, OptimizeRequest, OptimizerService, RevertRequest, StatisticsReport,
};

#[derive(Parser)]
#[command(name = "media-library-optimizer")]
#[command(about = "Optimize a media library in place, with reversible backups and running statistics")]
struct Cli {
    /// Root directory of the media library
    #[arg(short, long)]
    library: PathBuf,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Compression mode (lossy or lossless)
    #[arg(short, long)]
    mode: Option<CompressionMode>,

    /// Quality (0-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Output progress and results as JSON lines
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register the library images and their derived sizes
    Scan,
    /// Optimize one asset
    Optimize { id: u64 },
    /// Run one batch at an explicit offset
    Batch {
        #[arg(short, long)]
        batch_size: Option<usize>,
        #[arg(short, long, default_value = "0")]
        offset: usize,
    },
    /// Optimize the whole library, resuming an interrupted run
    Run {
        #[arg(short, long)]
        batch_size: Option<usize>,
        /// Discard the stored job and start over
        #[arg(long)]
        restart: bool,
    },
    /// Restore the original of an asset
    Revert { id: u64 },
    /// Show statistics
    Stats {
        /// Number of recent log entries to show
        #[arg(short, long, default_value = "10")]
        recent: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (stderr, so JSON output on stdout stays clean)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if !cli.library.is_dir() {
        return Err(anyhow::anyhow!("Library directory does not exist: {}", cli.library.display()));
    }
    let library = cli.library.canonicalize()?;

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    if let Some(mode) = cli.mode {
        config.settings.compression_mode = mode;
    }
    if let Some(quality) = cli.quality {
        config.settings.quality = quality;
    }
    config.json_output |= cli.json;
    config.validate()?;

    tokio::fs::create_dir_all(&config.data_dir).await?;

    let catalog = Arc::new(JsonCatalog::for_library(&config.data_dir, &library).await?);
    let stats_store = Arc::new(JsonStatsStore::for_library(&config.data_dir, &library));
    let job_store = JobStore::for_library(&config.data_dir, &library);
    let json = config.json_output;
    let mode = config.settings.compression_mode;
    let quality = config.settings.quality;
    let default_batch_size = config.settings.batch_size;

    let service = OptimizerService::new(config, catalog.clone(), Arc::new(ImageCodec::new()), stats_store);

    let outcome = match cli.command {
        Command::Scan => scan(&catalog, &library, json).await,
        Command::Optimize { id } => {
            optimize(&service, OptimizeRequest { asset_id: AssetId(id), compression_mode: mode, quality }, json).await
        }
        Command::Batch { batch_size, offset } => {
            let request = BatchRequest {
                batch_size: batch_size.unwrap_or(default_batch_size),
                offset,
                compression_mode: mode,
                quality,
            };
            batch(&service, request, json).await
        }
        Command::Run { batch_size, restart } => {
            run(&service, &library, job_store, batch_size.unwrap_or(default_batch_size), restart, json).await
        }
        Command::Revert { id } => revert(&service, AssetId(id), json).await,
        Command::Stats { recent } => stats(&service, recent, json).await,
    };

    if let Err(e) = &outcome {
        if json {
            JsonMessage::error(e.to_string(), e.chain().nth(1).map(|cause| cause.to_string())).emit();
        }
    }
    outcome
}

async fn scan(catalog: &JsonCatalog, library: &std::path::Path, json: bool) -> Result<()> {
    let spinner = (!json).then(|| ProgressManager::spinner("Scanning library..."));
    let ids = catalog.scan_directory(library).await?;
    if let Some(spinner) = spinner {
        spinner.finish_with_message(format!("Registered {} images", ids.len()));
    }

    if json {
        JsonMessage::Scanned {
            library: library.to_path_buf(),
            registered: ids.len(),
        }
        .emit();
    }
    Ok(())
}

async fn optimize(service: &OptimizerService, request: OptimizeRequest, json: bool) -> Result<()> {
    let item = service.optimize(&request).await?;

    if json {
        JsonMessage::asset_complete(&item).emit();
    } else if item.outcome.replaced {
        println!(
            "Asset {}: {} -> {} ({:.2}% saved, {} derived sizes)",
            item.id,
            FileManager::format_size(item.outcome.original_size),
            FileManager::format_size(item.outcome.optimized_size),
            item.outcome.savings_percent,
            item.derived_optimized
        );
    } else {
        println!("Asset {}: insufficient reduction, original kept", item.id);
    }
    Ok(())
}

async fn batch(service: &OptimizerService, request: BatchRequest, json: bool) -> Result<()> {
    let result = service.batch(&request).await?;

    if json {
        for message in JsonMessage::from_batch(&result, None) {
            message.emit();
        }
    } else {
        print_batch(&result);
    }
    Ok(())
}

async fn run(
    service: &OptimizerService,
    library: &std::path::Path,
    job_store: JobStore,
    batch_size: usize,
    restart: bool,
    json: bool,
) -> Result<()> {
    let mut settings = service.settings_for(service.config().settings.compression_mode, service.config().settings.quality)?;
    settings.batch_size = batch_size;
    settings.validate()?;

    if restart {
        job_store.save(&JobRecord::new(&settings)).await?;
    }

    let remaining = service
        .controller()
        .catalog()
        .select_unoptimized(&settings, usize::MAX, 0)
        .await?
        .len();
    info!("{} assets to optimize in {}", remaining, library.display());

    if json {
        JsonMessage::Start {
            library: library.to_path_buf(),
            total_assets: remaining,
            settings: JsonSettings::from(&settings),
        }
        .emit();
    }

    let started = Instant::now();
    let progress = (!json).then(|| ProgressManager::new(remaining as u64));
    let mut tally = RunTally::new();

    let runner = service.job_runner(job_store);
    let job = runner
        .run(&settings, |job, result| {
            tally.add_batch(result);
            if json {
                for message in JsonMessage::from_batch(result, Some(job.cursor)) {
                    message.emit();
                }
            }
            if let Some(progress) = &progress {
                progress.advance(
                    result.processed() as u64,
                    &format!(
                        "batch {}: {} ok, {} failed",
                        job.batches_run,
                        result.succeeded.len(),
                        result.failed.len()
                    ),
                );
            }
        })
        .await?;

    if json {
        JsonMessage::complete(&tally, started.elapsed().as_secs_f64()).emit();
    } else if let Some(progress) = progress {
        progress.finish(&tally.format_summary());
        println!("Job {} {:?} after {} batches", job.id, job.state, job.batches_run);
    }
    Ok(())
}

async fn revert(service: &OptimizerService, asset_id: AssetId, json: bool) -> Result<()> {
    service.revert(&RevertRequest { asset_id }).await?;

    if json {
        JsonMessage::Reverted { id: asset_id }.emit();
    } else {
        println!("Asset {} restored from backup", asset_id);
    }
    Ok(())
}

async fn stats(service: &OptimizerService, recent: usize, json: bool) -> Result<()> {
    let report = service.statistics(recent).await?;

    if json {
        JsonMessage::Stats { report }.emit();
    } else {
        print_stats(&report);
    }
    Ok(())
}

fn print_batch(result: &BatchResult) {
    for item in &result.succeeded {
        println!(
            "✅ {}: {:.2}% saved ({} derived sizes)",
            item.id, item.outcome.savings_percent, item.derived_optimized
        );
    }
    for failure in &result.failed {
        println!("❌ {}: {}", failure.id, failure.reason);
    }
    println!(
        "Selected {} | Optimized {} | Failed {} | Saved {}",
        result.selected,
        result.succeeded.len(),
        result.failed.len(),
        FileManager::format_size(result.total_saved_bytes)
    );
}

fn print_stats(report: &StatisticsReport) {
    println!("Library");
    println!("  Images:            {}", report.library.total_images);
    println!("  Optimized:         {}", report.library.optimized_images);
    println!("  Saved:             {}", FileManager::format_size(report.library.total_saved_bytes));
    println!("  Average savings:   {:.1}%", report.library.average_savings_percent);
    println!("  Backups:           {}", report.total_backups);
    println!("Totals");
    println!("  Optimizations:     {}", report.global.total_optimized);
    println!("  Saved:             {}", FileManager::format_size(report.global.total_saved_bytes));
    println!("  Average savings:   {:.2}%", report.global.average_savings_percent);
    println!("Log");
    println!("  Entries:           {}", report.log.entries);
    println!(
        "  Average saved:     {}",
        FileManager::format_size(report.log.average_saved_bytes.round() as u64)
    );

    if !report.recent.is_empty() {
        println!("Recent");
        for entry in &report.recent {
            println!(
                "  {} asset {} {} -> {} ({:.2}%, {:?})",
                entry.timestamp,
                entry.asset_id,
                FileManager::format_size(entry.original_size),
                FileManager::format_size(entry.optimized_size),
                entry.savings_percent,
                entry.status
            );
        }
    }
}
