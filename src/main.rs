//! # minipng - Main Entry Point
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Costruzione della configurazione (file JSON + override da CLI)
//! - Avvio del motore, progress bar o eventi JSON, riepilogo finale
//!
//! ## Esempio di utilizzo:
//! ```bash
//! minipng ~/Pictures/screenshots --quality high --workers 8 --replace
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use minipng::json_output::{self, JsonMessage};
use minipng::progress::ProgressManager;
use minipng::{BatchOptimizer, Config, ImageProcessor, JobStatus, Quality};

#[derive(Parser)]
#[command(name = "minipng")]
#[command(about = "Batch-compress PNG, JPEG, WebP and GIF images with external codec tools")]
struct Args {
    /// Image files or directories to compress
    inputs: Vec<PathBuf>,

    /// Quality tier (low, medium, high)
    #[arg(short, long)]
    quality: Option<Quality>,

    /// Number of images compressed at once
    #[arg(short, long)]
    workers: Option<usize>,

    /// Overwrite the original files
    #[arg(long)]
    replace: bool,

    /// Write compressed files into this directory instead of `<name>-min.<ext>` siblings
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory containing bundled tools under `bin/`
    #[arg(long)]
    tools_dir: Option<PathBuf>,

    /// Directory for temporary files of in-place compression
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON lines for programmatic use
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Show where each codec tool was found and exit
    #[arg(long)]
    list_tools: bool,
}

impl Args {
    /// Command line flags override values from the configuration file
    async fn build_config(&self) -> Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::from_file(path).await?,
            None => Config::default(),
        };

        if let Some(quality) = self.quality {
            config.quality = quality;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.replace {
            config.replace_original = true;
        }
        if self.output.is_some() {
            config.output_dir = self.output.clone();
        }
        if self.tools_dir.is_some() {
            config.tools_dir = self.tools_dir.clone();
        }
        if self.scratch_dir.is_some() {
            config.scratch_dir = self.scratch_dir.clone();
        }
        if self.json {
            config.json_output = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // stdout is reserved for JSON lines
    if json {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::fmt().with_max_level(level).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json)?;

    let config = match args.build_config().await {
        Ok(config) => config,
        Err(e) => {
            if args.json {
                JsonMessage::error("Invalid configuration".to_string(), Some(e.to_string())).emit();
            }
            return Err(e);
        }
    };

    let processor = ImageProcessor::from_config(&config);
    if args.list_tools {
        println!("{}", processor.tools().report());
        return Ok(());
    }

    if args.inputs.is_empty() {
        return Err(anyhow::anyhow!("No input files or directories given"));
    }

    // Create output directory if missing
    if let Some(ref output_dir) = config.output_dir {
        if !output_dir.exists() {
            std::fs::create_dir_all(output_dir)?;
            info!("Created output directory: {}", output_dir.display());
        }
    }

    let engine = BatchOptimizer::start(&config, Arc::new(processor))?;
    let ids = engine.add_sources(&args.inputs).await?;
    if ids.is_empty() {
        info!("No supported images found");
        return Ok(());
    }
    info!("📁 Found {} images to compress", ids.len());

    let events = engine.subscribe();
    let follower = if config.json_output {
        JsonMessage::start(ids.len(), &config).emit();
        tokio::spawn(json_output::emit_events(events))
    } else {
        tokio::spawn(ProgressManager::new(ids.len() as u64).follow(events))
    };

    let summary = engine.compress_all().await?;
    if let Err(e) = follower.await {
        warn!("Progress reporting ended abnormally: {}", e);
    }

    if !config.json_output {
        for job in engine.jobs().await? {
            if let JobStatus::Failed { reason } = &job.status {
                warn!("❌ {}: {}", job.source.display(), reason);
            }
        }
        info!(
            "Done: {}/{} compressed, {} failed",
            summary.aggregate.completed, summary.aggregate.total, summary.aggregate.failed
        );
    }

    engine.shutdown().await?;
    Ok(())
}
