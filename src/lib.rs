//! # minipng Library
//!
//! Motore di compressione batch per immagini PNG, JPEG, WebP e GIF tramite
//! tool esterni (pngquant, oxipng, mozjpeg, cwebp, gifsicle).
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Errori per-job (`CompressionError`) e della macchina a stati
//! - `quality`: Livelli di qualità e parametri per formato
//! - `job`: Modello dei job e loro ciclo di vita
//! - `file_manager`: Discovery delle immagini e utilità sui file
//! - `tool_registry`: Risoluzione dei tool di compressione
//! - `pipeline`: Esecuzione di processi singoli e pipeline a due stadi
//! - `image_processor`: Strategia di compressione per formato
//! - `optimizer`: Scheduler, stato dei job e sostituzione atomica
//! - `progress` / `json_output`: Feedback per terminale e per frontend
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use minipng::{BatchOptimizer, Config};
//!
//! let engine = BatchOptimizer::with_codec_tools(&Config::default())?;
//! engine.add_sources(&[PathBuf::from("/photos")]).await?;
//! let summary = engine.compress_all().await?;
//! println!("{}", minipng::progress::format_summary(&summary));
//! ```

pub mod config;
pub mod error;
pub mod file_manager;
pub mod image_processor;
pub mod job;
pub mod json_output;
pub mod optimizer;
pub mod pipeline;
pub mod progress;
pub mod quality;
pub mod tool_registry;
pub mod utils;

pub use config::Config;
pub use error::{CompressionError, TrackerError};
pub use image_processor::{Compressor, ImageProcessor};
pub use job::{ImageFormat, JobId, JobStatus, JobView};
pub use optimizer::{BatchAggregate, BatchOptimizer, EngineHandle, JobEvent, RunSummary};
pub use quality::Quality;
pub use tool_registry::ToolRegistry;
