//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore custom del motore di compressione.
//!
//! ## Responsabilità:
//! - Definisce `CompressionError`, la tassonomia dei fallimenti per singolo job
//! - Definisce `TrackerError` per le transizioni di stato rifiutate
//! - Integra con `thiserror` per messaggi descrittivi e conversioni automatiche
//!
//! ## Categorie di errori (per job):
//! - `ToolNotFound`: tool esterno non risolto dal registry
//! - `ProcessFailed`: il tool è terminato con exit code non accettato
//! - `InvalidImage`: il contenuto del file non è un'immagine riconosciuta
//! - `UnsupportedFormat`: estensione non gestita da nessun codec
//! - `CannotCreateDestination`: directory o file di output non creabili
//! - `Panicked`: il codec è andato in panic, il job fallisce comunque
//! - `Io`: errori di filesystem durante la finalizzazione
//!
//! Il testo `Display` di un `CompressionError` è la ragione mostrata
//! all'utente al posto della dimensione compressa.
//!
//! ## Esempio:
//! ```rust,ignore
//! if tool.is_none() {
//!     return Err(CompressionError::ToolNotFound("pngquant".to_string()));
//! }
//! ```

use crate::job::{JobId, JobStatusKind};
use std::path::PathBuf;

/// Reasons a single compression job can fail
#[derive(thiserror::Error, Debug)]
pub enum CompressionError {
    #[error("Compression tool not found: {0}")]
    ToolNotFound(String),

    #[error("{}", format_process_failure(.message, .exit_code))]
    ProcessFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("Cannot read image: {}", .0.display())]
    InvalidImage(PathBuf),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Cannot create output file: {}", .0.display())]
    CannotCreateDestination(PathBuf),

    #[error("Compressor panicked: {0}")]
    Panicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompressionError {
    /// Builds a `ProcessFailed` from a stage label, exit code and captured stderr
    pub fn process_failed(stage: &str, exit_code: Option<i32>, stderr: &[u8]) -> Self {
        let captured = String::from_utf8_lossy(stderr).trim().to_string();
        let message = if captured.is_empty() {
            format!("{} failed", stage)
        } else {
            format!("{}: {}", stage, captured)
        };
        Self::ProcessFailed { message, exit_code }
    }
}

fn format_process_failure(message: &str, exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("Compression failed (exit {}): {}", code, message),
        None => format!("Compression failed: {}", message),
    }
}

/// Rejected mutations of the job list
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Unknown job: {0}")]
    UnknownJob(JobId),

    #[error("Invalid status transition for job {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: JobId,
        from: JobStatusKind,
        to: JobStatusKind,
    },

    #[error("Job {0} has no resolved output path")]
    MissingOutput(JobId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_failed_message_includes_stage_and_code() {
        let err = CompressionError::process_failed("djpeg", Some(2), b"Not a JPEG file\n");
        assert_eq!(
            err.to_string(),
            "Compression failed (exit 2): djpeg: Not a JPEG file"
        );
    }

    #[test]
    fn test_process_failed_without_stderr() {
        let err = CompressionError::process_failed("cwebp", None, b"  ");
        assert_eq!(err.to_string(), "Compression failed: cwebp failed");
    }

    #[test]
    fn test_tool_not_found_display() {
        let err = CompressionError::ToolNotFound("gifsicle".to_string());
        assert!(err.to_string().contains("gifsicle"));
    }
}
