//! # Progress Reporting Module
//!
//! Progress bar `indicatif` alimentata dagli eventi del motore, più la
//! formattazione dei riepiloghi di fine run.
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================>---------------] 30/50 (60%) ✅ photo.png: 45.2% saved
//! ```

use crate::file_manager::FileManager;
use crate::job::{JobStatus, JobView};
use crate::optimizer::batch_optimizer::{JobEvent, RunSummary};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

/// Manages the terminal progress bar for one run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new(total_jobs: u64) -> Self {
        let bar = ProgressBar::new(total_jobs);

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Advance by one job with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Drive the bar from engine events until the run completes
    pub async fn follow(self, mut events: broadcast::Receiver<JobEvent>) {
        loop {
            match events.recv().await {
                Ok(JobEvent::Started { source, .. }) => {
                    self.set_message(&format!("compressing {}", file_name(&source)));
                }
                Ok(JobEvent::Finished { job }) => self.update(&job_message(&job)),
                Ok(JobEvent::RunComplete { summary }) => {
                    self.finish(&format_summary(&summary));
                    break;
                }
                Ok(JobEvent::Queued { .. }) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// One-line status of a finished job
pub fn job_message(job: &JobView) -> String {
    let name = file_name(&job.source);
    match &job.status {
        JobStatus::Completed { compressed_size } => format!(
            "✅ {}: {:.1}% saved ({} → {})",
            name,
            job.compression_ratio.unwrap_or(0.0),
            FileManager::format_size(job.original_size),
            FileManager::format_size(*compressed_size)
        ),
        JobStatus::Failed { reason } => format!("❌ {}: {}", name, reason),
        other => format!("{}: {}", name, other),
    }
}

/// End-of-run summary: completed/total, bytes saved, average ratio
pub fn format_summary(summary: &RunSummary) -> String {
    let aggregate = &summary.aggregate;
    let saved = if aggregate.total_bytes_saved >= 0 {
        FileManager::format_size(aggregate.total_bytes_saved as u64)
    } else {
        format!("-{}", FileManager::format_size(aggregate.total_bytes_saved.unsigned_abs()))
    };

    format!(
        "Completed: {}/{} | Failed: {} | Saved: {} | Average reduction: {:.1}% | {:.1}s",
        aggregate.completed,
        aggregate.total,
        aggregate.failed,
        saved,
        aggregate.average_ratio,
        summary.duration.as_secs_f64()
    )
}
