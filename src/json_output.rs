//! # JSON Output Module
//!
//! Output strutturato in JSON (una riga per messaggio su stdout) per i
//! frontend che pilotano il motore come processo figlio.
//!
//! ## Tipi di messaggi:
//! - `start`: inizio del run, con la configurazione effettiva
//! - `file_start`: un job è entrato in esecuzione
//! - `file_complete`: un job è terminato (successo o errore)
//! - `complete`: fine del run con le statistiche aggregate
//! - `error`: errore generale

use crate::config::Config;
use crate::job::{JobId, JobStatus, JobView};
use crate::optimizer::batch_optimizer::{JobEvent, RunSummary};
use crate::quality::Quality;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::broadcast::{self, error::RecvError};

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    #[serde(rename = "start")]
    Start { total_files: usize, config: JsonConfig },

    #[serde(rename = "file_start")]
    FileStart { id: JobId, path: PathBuf },

    #[serde(rename = "file_complete")]
    FileComplete {
        id: JobId,
        path: PathBuf,
        output: Option<PathBuf>,
        original_size: u64,
        compressed_size: Option<u64>,
        reduction_percent: Option<f64>,
        error: Option<String>,
    },

    #[serde(rename = "complete")]
    Complete {
        total_files: usize,
        files_completed: usize,
        files_failed: usize,
        total_bytes_saved: i64,
        average_reduction: f64,
        duration_seconds: f64,
    },

    #[serde(rename = "error")]
    Error { message: String, details: Option<String> },
}

/// Configurazione per output JSON
#[derive(Debug, Serialize)]
pub struct JsonConfig {
    pub quality: Quality,
    pub workers: usize,
    pub replace_original: bool,
    pub output_dir: Option<PathBuf>,
}

impl From<&Config> for JsonConfig {
    fn from(config: &Config) -> Self {
        Self {
            quality: config.quality,
            workers: config.workers,
            replace_original: config.replace_original,
            output_dir: config.output_dir.clone(),
        }
    }
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(total_files: usize, config: &Config) -> Self {
        Self::Start {
            total_files,
            config: config.into(),
        }
    }

    pub fn file_complete(job: &JobView) -> Self {
        let error = match &job.status {
            JobStatus::Failed { reason } => Some(reason.clone()),
            _ => None,
        };
        Self::FileComplete {
            id: job.id,
            path: job.source.clone(),
            output: job.output.clone(),
            original_size: job.original_size,
            compressed_size: job.compressed_size,
            reduction_percent: job.compression_ratio,
            error,
        }
    }

    pub fn complete(summary: &RunSummary) -> Self {
        Self::Complete {
            total_files: summary.aggregate.total,
            files_completed: summary.aggregate.completed,
            files_failed: summary.aggregate.failed,
            total_bytes_saved: summary.aggregate.total_bytes_saved,
            average_reduction: summary.aggregate.average_ratio,
            duration_seconds: summary.duration.as_secs_f64(),
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }

    /// Translate an engine event; `Queued` has no JSON counterpart
    pub fn from_event(event: &JobEvent) -> Option<Self> {
        match event {
            JobEvent::Queued { .. } => None,
            JobEvent::Started { id, source } => Some(Self::FileStart {
                id: *id,
                path: source.clone(),
            }),
            JobEvent::Finished { job } => Some(Self::file_complete(job)),
            JobEvent::RunComplete { summary } => Some(Self::complete(summary)),
        }
    }
}

/// Print engine events as JSON lines until the run completes
pub async fn emit_events(mut events: broadcast::Receiver<JobEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(message) = JsonMessage::from_event(&event) {
                    message.emit();
                }
                if matches!(event, JobEvent::RunComplete { .. }) {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                JsonMessage::error(format!("{} events dropped", skipped), None).emit();
            }
            Err(RecvError::Closed) => break,
        }
    }
}
