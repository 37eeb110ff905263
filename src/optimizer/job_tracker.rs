//! # Job Tracker
//!
//! Proprietario unico della lista dei job e unico scrittore dei loro stati.
//! Vive dentro il task coordinatore: nessun lock, tutte le mutazioni passano
//! di qui in sequenza.
//!
//! Le statistiche aggregate (`BatchAggregate`) vengono ricalcolate a ogni
//! richiesta, mai mantenute incrementalmente.

use crate::error::TrackerError;
use crate::job::{CompressionJob, JobId, JobSpec, JobStatus, JobStatusKind, JobView};
use crate::optimizer::path_resolver::{OutputMode, PathResolver};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Derived batch statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchAggregate {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub pending: usize,
    /// Sum of (original - compressed) over Completed jobs
    pub total_bytes_saved: i64,
    /// Unweighted mean of per-job compression ratios (percent)
    pub average_ratio: f64,
}

/// Canonical, ordered job list
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: Vec<CompressionJob>,
    next_id: u64,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new source. Returns None if the path is already tracked.
    pub fn add(&mut self, source: PathBuf, original_size: u64) -> Option<JobId> {
        if self.contains_source(&source) {
            debug!("Already tracked: {}", source.display());
            return None;
        }

        self.next_id += 1;
        let id = JobId(self.next_id);
        self.jobs.push(CompressionJob::new(id, source, original_size));
        Some(id)
    }

    pub fn contains_source(&self, source: &Path) -> bool {
        self.jobs.iter().any(|j| j.source == source)
    }

    /// Remove a job that is not currently running
    pub fn remove(&mut self, id: JobId) -> Result<(), TrackerError> {
        let index = self.index_of(id)?;
        let status = self.jobs[index].status.kind();
        if status == JobStatusKind::Running {
            return Err(TrackerError::InvalidTransition {
                id,
                from: status,
                to: JobStatusKind::Pending,
            });
        }
        self.jobs.remove(index);
        Ok(())
    }

    /// Remove every job that is not running; returns how many were removed
    pub fn clear(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|j| j.status.is_running());
        before - self.jobs.len()
    }

    pub fn get(&self, id: JobId) -> Option<&CompressionJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn index_of(&self, id: JobId) -> Result<usize, TrackerError> {
        self.jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or(TrackerError::UnknownJob(id))
    }

    fn job_mut(&mut self, id: JobId) -> Result<&mut CompressionJob, TrackerError> {
        let index = self.index_of(id)?;
        Ok(&mut self.jobs[index])
    }

    fn transition(&mut self, id: JobId, to: JobStatus) -> Result<&mut CompressionJob, TrackerError> {
        let job = self.job_mut(id)?;
        let from = job.status.kind();
        if !from.can_transition_to(to.kind()) {
            return Err(TrackerError::InvalidTransition { id, from, to: to.kind() });
        }
        job.status = to;
        Ok(job)
    }

    /// Queue the jobs a new run must process.
    ///
    /// Completed jobs are skipped. Failed jobs go back to Pending. Each queued
    /// job gets its output path resolved here; it does not change afterwards.
    pub fn prepare_run(&mut self, mode: &OutputMode) -> Vec<JobId> {
        let mut queue = Vec::new();

        for job in &mut self.jobs {
            match job.status.kind() {
                JobStatusKind::Completed | JobStatusKind::Running => continue,
                JobStatusKind::Failed => job.status = JobStatus::Pending,
                JobStatusKind::Pending => {}
            }
            job.output = Some(PathResolver::output_path(&job.source, mode));
            queue.push(job.id);
        }

        queue
    }

    /// Pending -> Running. Returns the dispatch payload.
    ///
    /// The output path must have been resolved by `prepare_run`; a job
    /// without one stays Pending.
    pub fn mark_running(&mut self, id: JobId) -> Result<JobSpec, TrackerError> {
        let job = self.job_mut(id)?;
        let from = job.status.kind();
        if !from.can_transition_to(JobStatusKind::Running) {
            return Err(TrackerError::InvalidTransition { id, from, to: JobStatusKind::Running });
        }
        let output = job.output.clone().ok_or(TrackerError::MissingOutput(id))?;
        job.status = JobStatus::Running;
        Ok(JobSpec {
            id: job.id,
            source: job.source.clone(),
            output,
            format: job.format,
            original_size: job.original_size,
        })
    }

    /// Running -> Completed
    pub fn mark_completed(&mut self, id: JobId, compressed_size: u64) -> Result<(), TrackerError> {
        self.transition(id, JobStatus::Completed { compressed_size })?;
        Ok(())
    }

    /// Running -> Failed
    pub fn mark_failed(&mut self, id: JobId, reason: String) -> Result<(), TrackerError> {
        self.transition(id, JobStatus::Failed { reason })?;
        Ok(())
    }

    /// Quality changed: every Completed job returns to Pending and loses its
    /// result. Running and Pending jobs are left alone.
    pub fn reset_completed(&mut self) -> usize {
        let mut reset = 0;
        for job in &mut self.jobs {
            if job.status.is_completed() {
                job.status = JobStatus::Pending;
                job.output = None;
                reset += 1;
            }
        }
        if reset > 0 {
            debug!("Reset {} completed jobs to pending", reset);
        }
        reset
    }

    pub fn views(&self) -> Vec<JobView> {
        self.jobs.iter().map(CompressionJob::view).collect()
    }

    pub fn view(&self, id: JobId) -> Option<JobView> {
        self.get(id).map(CompressionJob::view)
    }

    /// Recompute batch statistics from the current job list
    pub fn aggregate(&self) -> BatchAggregate {
        let mut aggregate = BatchAggregate {
            total: self.jobs.len(),
            ..Default::default()
        };
        let mut ratio_sum = 0.0;
        let mut ratio_count = 0usize;

        for job in &self.jobs {
            match &job.status {
                JobStatus::Pending => aggregate.pending += 1,
                JobStatus::Running => aggregate.running += 1,
                JobStatus::Failed { .. } => aggregate.failed += 1,
                JobStatus::Completed { compressed_size } => {
                    aggregate.completed += 1;
                    aggregate.total_bytes_saved += job.original_size as i64 - *compressed_size as i64;
                    if let Some(ratio) = job.compression_ratio() {
                        ratio_sum += ratio;
                        ratio_count += 1;
                    }
                }
            }
        }

        if ratio_count > 0 {
            aggregate.average_ratio = ratio_sum / ratio_count as f64;
        }

        aggregate
    }

    /// Apply a worker result, logging instead of failing on stale ids
    pub fn record_result(&mut self, id: JobId, result: Result<u64, String>) {
        let applied = match result {
            Ok(size) => self.mark_completed(id, size),
            Err(reason) => {
                warn!("Job {} failed: {}", id, reason);
                self.mark_failed(id, reason)
            }
        };
        if let Err(e) = applied {
            warn!("Dropping result for job {}: {}", id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(sizes: &[u64]) -> (JobTracker, Vec<JobId>) {
        let mut tracker = JobTracker::new();
        let ids = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| tracker.add(PathBuf::from(format!("/img/{}.png", i)), *size).unwrap())
            .collect();
        (tracker, ids)
    }

    #[test]
    fn test_duplicate_sources_ignored() {
        let mut tracker = JobTracker::new();
        assert!(tracker.add(PathBuf::from("/a.png"), 10).is_some());
        assert!(tracker.add(PathBuf::from("/a.png"), 10).is_none());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_average_ratio_is_unweighted() {
        let (mut tracker, ids) = tracker_with(&[1000, 100]);
        tracker.prepare_run(&OutputMode::Sibling);
        tracker.mark_running(ids[0]).unwrap();
        tracker.mark_running(ids[1]).unwrap();
        tracker.mark_completed(ids[0], 500).unwrap(); // 50%
        tracker.mark_completed(ids[1], 70).unwrap(); // 30%

        let aggregate = tracker.aggregate();
        assert_eq!(aggregate.completed, 2);
        assert!((aggregate.average_ratio - 40.0).abs() < 1e-9);
        assert_eq!(aggregate.total_bytes_saved, 530);
    }

    #[test]
    fn test_failed_jobs_excluded_from_totals() {
        let (mut tracker, ids) = tracker_with(&[100, 100]);
        tracker.prepare_run(&OutputMode::Sibling);
        tracker.mark_running(ids[0]).unwrap();
        tracker.mark_running(ids[1]).unwrap();
        tracker.mark_completed(ids[0], 80).unwrap();
        tracker.mark_failed(ids[1], "boom".into()).unwrap();

        let aggregate = tracker.aggregate();
        assert_eq!(aggregate.completed, 1);
        assert_eq!(aggregate.failed, 1);
        assert_eq!(aggregate.total_bytes_saved, 20);
        assert!((aggregate.average_ratio - 20.0).abs() < 1e-9);
        assert_eq!(tracker.view(ids[1]).unwrap().compressed_size, None);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let (mut tracker, ids) = tracker_with(&[100]);
        let id = ids[0];
        assert!(matches!(
            tracker.mark_completed(id, 1),
            Err(TrackerError::InvalidTransition { from: JobStatusKind::Pending, .. })
        ));

        tracker.prepare_run(&OutputMode::Sibling);
        tracker.mark_running(id).unwrap();
        assert!(tracker.mark_running(id).is_err());
        tracker.mark_completed(id, 50).unwrap();
        assert!(tracker.mark_running(id).is_err());
        assert!(tracker.mark_failed(id, "late".into()).is_err());
        assert_eq!(tracker.get(id).unwrap().compressed_size(), Some(50));

        assert_eq!(tracker.mark_running(JobId(999)).unwrap_err(), TrackerError::UnknownJob(JobId(999)));
    }

    #[test]
    fn test_running_requires_resolved_output() {
        let (mut tracker, ids) = tracker_with(&[100]);
        let id = ids[0];

        // never prepared: refused, and never silently pointed at the source
        assert_eq!(tracker.mark_running(id).unwrap_err(), TrackerError::MissingOutput(id));
        assert_eq!(tracker.get(id).unwrap().status(), &JobStatus::Pending);
        assert_eq!(tracker.view(id).unwrap().output, None);

        // a quality reset clears the output again
        tracker.prepare_run(&OutputMode::Sibling);
        tracker.mark_running(id).unwrap();
        tracker.mark_completed(id, 40).unwrap();
        tracker.reset_completed();
        assert_eq!(tracker.mark_running(id).unwrap_err(), TrackerError::MissingOutput(id));

        tracker.prepare_run(&OutputMode::Sibling);
        let spec = tracker.mark_running(id).unwrap();
        assert_eq!(spec.output, PathBuf::from("/img/0-min.png"));
    }

    #[test]
    fn test_reset_only_touches_completed() {
        let (mut tracker, ids) = tracker_with(&[100, 100, 100]);
        tracker.prepare_run(&OutputMode::ReplaceOriginal);
        tracker.mark_running(ids[0]).unwrap();
        tracker.mark_running(ids[1]).unwrap();
        tracker.mark_completed(ids[0], 60).unwrap();

        assert_eq!(tracker.reset_completed(), 1);
        let views = tracker.views();
        assert_eq!(views[0].status, JobStatus::Pending);
        assert_eq!(views[0].output, None);
        assert_eq!(views[1].status, JobStatus::Running);
        assert_eq!(views[2].status, JobStatus::Pending);

        // a running job's late result still lands after the reset
        tracker.record_result(ids[1], Ok(40));
        assert_eq!(tracker.get(ids[1]).unwrap().compressed_size(), Some(40));
    }

    #[test]
    fn test_prepare_run_skips_completed_and_requeues_failed() {
        let (mut tracker, ids) = tracker_with(&[100, 100, 100]);
        tracker.prepare_run(&OutputMode::Sibling);
        tracker.mark_running(ids[0]).unwrap();
        tracker.mark_running(ids[1]).unwrap();
        tracker.mark_completed(ids[0], 10).unwrap();
        tracker.mark_failed(ids[1], "x".into()).unwrap();

        let queue = tracker.prepare_run(&OutputMode::Sibling);
        assert_eq!(queue, vec![ids[1], ids[2]]);
        assert_eq!(tracker.get(ids[1]).unwrap().status(), &JobStatus::Pending);
        assert_eq!(
            tracker.view(ids[2]).unwrap().output,
            Some(PathBuf::from("/img/2-min.png"))
        );
    }

    #[test]
    fn test_remove_and_clear_spare_running_jobs() {
        let (mut tracker, ids) = tracker_with(&[1, 2, 3]);
        tracker.prepare_run(&OutputMode::Sibling);
        tracker.mark_running(ids[1]).unwrap();

        assert!(tracker.remove(ids[1]).is_err());
        tracker.remove(ids[0]).unwrap();
        assert_eq!(tracker.clear(), 1);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.get(ids[1]).is_some());
    }
}
