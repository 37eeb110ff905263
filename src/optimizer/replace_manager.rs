//! # Replace Manager
//!
//! Decide dove il codec scrive e come il risultato arriva a destinazione:
//!
//! - **Output diretto** (output ≠ sorgente): il tool scrive direttamente sul
//!   path richiesto, nessun file temporaneo.
//! - **In-place** (output = sorgente): il tool scrive su un file temporaneo
//!   univoco nella scratch directory; solo a compressione riuscita il file
//!   temporaneo sostituisce l'originale con un rename.
//!
//! Se la compressione fallisce il piano viene scartato: il file temporaneo
//! viene cancellato dal drop di `TempPath` e la sorgente resta intatta.

use crate::error::CompressionError;
use crate::job::{ImageFormat, JobSpec};
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile, TempPath};
use tracing::debug;

/// Chooses the write location for each job
#[derive(Debug, Clone)]
pub struct ReplaceManager {
    scratch_dir: PathBuf,
}

impl ReplaceManager {
    pub fn new(scratch_dir: PathBuf) -> Self {
        Self { scratch_dir }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Plan the output of one job
    pub async fn prepare(&self, job: &JobSpec) -> Result<OutputPlan, CompressionError> {
        self.prepare_paths(&job.output, &job.source, job.format).await
    }

    pub async fn prepare_paths(
        &self,
        requested_output: &Path,
        source: &Path,
        format: ImageFormat,
    ) -> Result<OutputPlan, CompressionError> {
        if requested_output == source {
            let cannot_create = || CompressionError::CannotCreateDestination(self.scratch_dir.clone());
            tokio::fs::create_dir_all(&self.scratch_dir)
                .await
                .map_err(|_| cannot_create())?;

            let scratch_dir = self.scratch_dir.clone();
            let suffix = format!(".{}", format.extension());
            let temp = tokio::task::spawn_blocking(move || {
                Builder::new()
                    .prefix("minipng-")
                    .suffix(&suffix)
                    .tempfile_in(&scratch_dir)
                    .map(NamedTempFile::into_temp_path)
            })
            .await
            .map_err(|_| cannot_create())?
            .map_err(|_| cannot_create())?;

            debug!("In-place job for {} writes to {}", source.display(), temp.display());
            Ok(OutputPlan::InPlace {
                temp,
                target: requested_output.to_path_buf(),
            })
        } else {
            if let Some(parent) = requested_output.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|_| {
                        CompressionError::CannotCreateDestination(requested_output.to_path_buf())
                    })?;
                }
            }
            Ok(OutputPlan::Direct {
                target: requested_output.to_path_buf(),
            })
        }
    }
}

/// Where a codec writes, and how that file reaches its final path
#[derive(Debug)]
pub enum OutputPlan {
    Direct { target: PathBuf },
    InPlace { temp: TempPath, target: PathBuf },
}

impl OutputPlan {
    /// Path the codec tools must write to
    pub fn write_path(&self) -> &Path {
        match self {
            OutputPlan::Direct { target } => target,
            OutputPlan::InPlace { temp, .. } => temp,
        }
    }

    pub fn is_in_place(&self) -> bool {
        matches!(self, OutputPlan::InPlace { .. })
    }

    /// Move the compressed file into place and return its final path.
    ///
    /// In-place results replace the source with a single rename. When the
    /// scratch directory sits on another filesystem the result is first
    /// copied next to the target and renamed from there, so the source is
    /// never missing at any point. The file work runs on the blocking pool.
    pub async fn finalize(self) -> Result<PathBuf, CompressionError> {
        match self {
            OutputPlan::Direct { target } => Ok(target),
            OutputPlan::InPlace { temp, target } => {
                tokio::task::spawn_blocking(move || replace_target(temp, target))
                    .await
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
            }
        }
    }
}

fn replace_target(temp: TempPath, target: PathBuf) -> Result<PathBuf, CompressionError> {
    if let Ok(metadata) = std::fs::metadata(&target) {
        let _ = std::fs::set_permissions(&temp, metadata.permissions());
    }

    let temp = match temp.persist(&target) {
        Ok(()) => {
            debug!("Replaced {} in place", target.display());
            return Ok(target);
        }
        Err(e) => {
            debug!("Rename into {} failed ({}), staging beside target", target.display(), e.error);
            e.path
        }
    };

    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let staged = NamedTempFile::new_in(dir)
        .map_err(|_| CompressionError::CannotCreateDestination(target.clone()))?;
    std::fs::copy(&temp, staged.path())?;
    if let Ok(metadata) = std::fs::metadata(&target) {
        let _ = std::fs::set_permissions(staged.path(), metadata.permissions());
    }
    staged.persist(&target).map_err(|e| e.error)?;

    debug!("Replaced {} in place via staged copy", target.display());
    Ok(target)
}
