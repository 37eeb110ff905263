//! # Job Model
//!
//! Un job è una singola compressione sorgente → output con il proprio
//! ciclo di vita:
//!
//! ```text
//! Pending ──▶ Running ──▶ Completed(size)
//!                    └──▶ Failed(reason)
//! ```
//!
//! `Completed` può tornare a `Pending` solo tramite reset esterno (cambio di
//! qualità); `Running` esce solo verso `Completed` o `Failed`.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque job identity, unique within one tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(pub(crate) u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Image formats the codec invoker knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
    Gif,
    Unsupported,
}

impl ImageFormat {
    /// Detect format from the file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("png") => ImageFormat::Png,
            Some("jpg") | Some("jpeg") => ImageFormat::Jpeg,
            Some("webp") => ImageFormat::Webp,
            Some("gif") => ImageFormat::Gif,
            _ => ImageFormat::Unsupported,
        }
    }

    pub fn is_supported(self) -> bool {
        self != ImageFormat::Unsupported
    }

    /// Extension used for scratch files
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
            ImageFormat::Gif => "gif",
            ImageFormat::Unsupported => "tmp",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Webp => "WebP",
            ImageFormat::Gif => "GIF",
            ImageFormat::Unsupported => "unknown",
        }
    }
}

/// Lifecycle status of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed { compressed_size: u64 },
    Failed { reason: String },
}

/// Data-free discriminant of [`JobStatus`], used in transition errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobStatusKind {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn kind(&self) -> JobStatusKind {
        match self {
            JobStatus::Pending => JobStatusKind::Pending,
            JobStatus::Running => JobStatusKind::Running,
            JobStatus::Completed { .. } => JobStatusKind::Completed,
            JobStatus::Failed { .. } => JobStatusKind::Failed,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, JobStatus::Running)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, JobStatus::Completed { .. })
    }
}

impl JobStatusKind {
    /// Whether the state machine allows moving from `self` to `to`.
    ///
    /// `Failed -> Pending` happens when a new run re-queues a failed job;
    /// `Completed -> Pending` only through a quality reset.
    pub fn can_transition_to(self, to: JobStatusKind) -> bool {
        use JobStatusKind::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Completed, Pending)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => f.write_str("pending"),
            JobStatus::Running => f.write_str("compressing"),
            JobStatus::Completed { .. } => f.write_str("completed"),
            JobStatus::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Canonical job record, owned by the job tracker
#[derive(Debug, Clone)]
pub struct CompressionJob {
    pub(crate) id: JobId,
    pub(crate) source: PathBuf,
    pub(crate) output: Option<PathBuf>,
    pub(crate) format: ImageFormat,
    pub(crate) original_size: u64,
    pub(crate) status: JobStatus,
}

impl CompressionJob {
    pub(crate) fn new(id: JobId, source: PathBuf, original_size: u64) -> Self {
        let format = ImageFormat::from_path(&source);
        Self {
            id,
            source,
            output: None,
            format,
            original_size,
            status: JobStatus::Pending,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    /// Compressed size, present only once the job is Completed
    pub fn compressed_size(&self) -> Option<u64> {
        match self.status {
            JobStatus::Completed { compressed_size } => Some(compressed_size),
            _ => None,
        }
    }

    /// Percentage of bytes saved (0-100); None unless Completed
    pub fn compression_ratio(&self) -> Option<f64> {
        let compressed = self.compressed_size()?;
        if self.original_size == 0 {
            return None;
        }
        Some((self.original_size as f64 - compressed as f64) / self.original_size as f64 * 100.0)
    }

    /// Read-only projection handed to collaborators
    pub fn view(&self) -> JobView {
        JobView {
            id: self.id,
            source: self.source.clone(),
            output: self.output.clone(),
            format: self.format,
            original_size: self.original_size,
            compressed_size: self.compressed_size(),
            compression_ratio: self.compression_ratio(),
            status: self.status.clone(),
        }
    }
}

/// Everything a worker needs to compress one job, passed by value
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: JobId,
    pub source: PathBuf,
    pub output: PathBuf,
    pub format: ImageFormat,
    pub original_size: u64,
}

/// Per-job view exposed to collaborators
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub source: PathBuf,
    pub output: Option<PathBuf>,
    pub format: ImageFormat,
    pub original_size: u64,
    pub compressed_size: Option<u64>,
    pub compression_ratio: Option<f64>,
    pub status: JobStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection_is_case_insensitive() {
        assert_eq!(ImageFormat::from_path(Path::new("a/B.PNG")), ImageFormat::Png);
        assert_eq!(ImageFormat::from_path(Path::new("c.JPEG")), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_path(Path::new("c.jpg")), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_path(Path::new("d.webp")), ImageFormat::Webp);
        assert_eq!(ImageFormat::from_path(Path::new("e.gif")), ImageFormat::Gif);
        assert_eq!(ImageFormat::from_path(Path::new("f.tiff")), ImageFormat::Unsupported);
        assert_eq!(ImageFormat::from_path(Path::new("noext")), ImageFormat::Unsupported);
    }

    #[test]
    fn test_completed_only_resets_to_pending() {
        use JobStatusKind::*;
        assert!(Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_ratio_only_when_completed() {
        let mut job = CompressionJob::new(JobId(1), PathBuf::from("x.png"), 200);
        assert_eq!(job.compression_ratio(), None);
        job.status = JobStatus::Completed { compressed_size: 150 };
        assert_eq!(job.compression_ratio(), Some(25.0));
        assert_eq!(job.view().compressed_size, Some(150));
    }
}
