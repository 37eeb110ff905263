//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione del motore di compressione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di un batch
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `quality`: livello di qualità (low/medium/high, default: medium)
//! - `workers`: job in esecuzione contemporanea (default: 4)
//! - `replace_original`: sovrascrive i file sorgente (default: false)
//! - `output_dir`: directory di output alternativa (default: None = file `-min` accanto alla sorgente)
//! - `scratch_dir`: directory per i file temporanei in-place (default: temp di sistema)
//! - `tools_dir`: radice dei tool bundled (`<tools_dir>/bin/<tool>`)
//! - `json_output`: eventi JSON su stdout invece della progress bar
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     quality: Quality::High,
//!     workers: 8,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::quality::Quality;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of concurrently running jobs
pub const DEFAULT_WORKERS: usize = 4;

/// Configuration for a batch compression engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Quality tier used by the next run
    pub quality: Quality,
    /// Maximum number of jobs compressing at once
    pub workers: usize,
    /// Overwrite source files with their compressed version
    pub replace_original: bool,
    /// Write outputs into this directory instead of next to the sources
    pub output_dir: Option<PathBuf>,
    /// Where in-place jobs stage their temporary output
    pub scratch_dir: Option<PathBuf>,
    /// Root of bundled codec tools
    pub tools_dir: Option<PathBuf>,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quality: Quality::Medium,
            workers: DEFAULT_WORKERS,
            replace_original: false,
            output_dir: None,
            scratch_dir: None,
            tools_dir: None,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        if self.replace_original && self.output_dir.is_some() {
            return Err(anyhow::anyhow!(
                "Replacing originals and an output directory cannot be combined"
            ));
        }

        if let Some(ref output_dir) = self.output_dir {
            if output_dir.exists() && !output_dir.is_dir() {
                return Err(anyhow::anyhow!("Output path is not a directory: {}", output_dir.display()));
            }
        }

        if let Some(ref tools_dir) = self.tools_dir {
            if !tools_dir.is_dir() {
                return Err(anyhow::anyhow!("Tools directory does not exist: {}", tools_dir.display()));
            }
        }

        Ok(())
    }

    /// Scratch directory for in-place temporaries
    pub fn effective_scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("minipng"))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
