//! # Batch Optimizer
//!
//! Coordinatore del motore di compressione.
//!
//! ## Modello:
//! - Un solo task coordinatore possiede il `JobTracker` ed è l'unico a
//!   modificarne lo stato; comandi e completion arrivano su due canali e
//!   vengono serializzati da un `tokio::select!`
//! - Un pool fisso di worker esegue le compressioni; il coordinatore non
//!   aspetta mai l'I/O dei processi esterni
//! - Dispatch in ordine di coda, al massimo `workers` job in esecuzione;
//!   ogni completion libera uno slot che viene subito riempito
//! - Nessuna cancellazione: un job in esecuzione scrive sempre il proprio
//!   risultato, anche dopo un cambio di qualità
//!
//! ## Esempio:
//! ```rust,ignore
//! let engine = BatchOptimizer::with_codec_tools(&config)?;
//! engine.add_sources(&[PathBuf::from("/photos")]).await?;
//! let summary = engine.compress_all().await?;
//! ```

use crate::config::Config;
use crate::error::TrackerError;
use crate::file_manager::FileManager;
use crate::image_processor::{Compressor, ImageProcessor};
use crate::job::{JobId, JobView};
use crate::optimizer::job_tracker::{BatchAggregate, JobTracker};
use crate::optimizer::path_resolver::OutputMode;
use crate::optimizer::worker_pool::{Completion, Dispatch, WorkerPool};
use crate::quality::Quality;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 256;

/// Outcome of one `compress_all` run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Jobs that finished during this run
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
    pub duration: Duration,
    /// Whole-batch statistics at the end of the run
    pub aggregate: BatchAggregate,
}

/// Notifications broadcast to subscribers
#[derive(Debug, Clone)]
pub enum JobEvent {
    Queued { id: JobId, source: PathBuf },
    Started { id: JobId, source: PathBuf },
    Finished { job: JobView },
    RunComplete { summary: RunSummary },
}

enum Command {
    Add {
        sources: Vec<(PathBuf, u64)>,
        reply: oneshot::Sender<Vec<JobId>>,
    },
    Remove {
        id: JobId,
        reply: oneshot::Sender<Result<(), TrackerError>>,
    },
    Clear {
        reply: oneshot::Sender<usize>,
    },
    SetQuality {
        quality: Quality,
        reply: oneshot::Sender<usize>,
    },
    CompressAll {
        reply: oneshot::Sender<Result<RunSummary>>,
    },
    Jobs {
        reply: oneshot::Sender<Vec<JobView>>,
    },
    Aggregate {
        reply: oneshot::Sender<BatchAggregate>,
    },
    Shutdown {
        reply: oneshot::Sender<Vec<JobView>>,
    },
}

/// Entry point of the engine
pub struct BatchOptimizer;

impl BatchOptimizer {
    /// Spawn the coordinator and its worker pool.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn start(config: &Config, compressor: Arc<dyn Compressor>) -> Result<EngineHandle> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let coordinator = Coordinator {
            tracker: JobTracker::new(),
            quality: config.quality,
            mode: OutputMode::from_config(config),
            workers: config.workers,
            pool: WorkerPool::spawn(config.workers, compressor, completion_tx),
            events: events.clone(),
            run: None,
            shutdown: None,
        };

        info!(
            "🔧 Compression engine started: {} workers, {} quality, output {:?}",
            config.workers, config.quality, coordinator.mode
        );
        tokio::spawn(coordinator.run(command_rx, completion_rx));

        Ok(EngineHandle {
            commands: command_tx,
            events,
        })
    }

    /// Engine backed by the external codec tools
    pub fn with_codec_tools(config: &Config) -> Result<EngineHandle> {
        let processor = ImageProcessor::from_config(config);
        Self::start(config, Arc::new(processor))
    }
}

/// Cloneable handle to a running engine
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<JobEvent>,
}

impl EngineHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| anyhow!("Compression engine has shut down"))?;
        response
            .await
            .map_err(|_| anyhow!("Compression engine has shut down"))
    }

    /// Track every supported image found in `inputs`.
    ///
    /// Directories are walked recursively. Already tracked paths and
    /// unreadable files are skipped. Returns the ids of the new jobs.
    pub async fn add_sources(&self, inputs: &[PathBuf]) -> Result<Vec<JobId>> {
        let mut sources = Vec::new();
        for path in FileManager::find_images(inputs) {
            match FileManager::file_size(&path).await {
                Ok(size) => sources.push((path, size)),
                Err(e) => warn!("Skipping unreadable file {}: {}", path.display(), e),
            }
        }
        self.request(|reply| Command::Add { sources, reply }).await
    }

    /// Drop a job that is not running
    pub async fn remove(&self, id: JobId) -> Result<()> {
        self.request(|reply| Command::Remove { id, reply }).await??;
        Ok(())
    }

    /// Drop every job that is not running
    pub async fn clear(&self) -> Result<usize> {
        self.request(|reply| Command::Clear { reply }).await
    }

    /// Select the quality for the next run. A different quality resets all
    /// Completed jobs to Pending; returns how many were reset.
    pub async fn set_quality(&self, quality: Quality) -> Result<usize> {
        self.request(|reply| Command::SetQuality { quality, reply }).await
    }

    /// Compress every Pending or Failed job and wait for the queue to drain
    pub async fn compress_all(&self) -> Result<RunSummary> {
        self.request(|reply| Command::CompressAll { reply }).await?
    }

    pub async fn jobs(&self) -> Result<Vec<JobView>> {
        self.request(|reply| Command::Jobs { reply }).await
    }

    pub async fn aggregate(&self) -> Result<BatchAggregate> {
        self.request(|reply| Command::Aggregate { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Stop the engine once running jobs finish. Queued jobs of an active
    /// run are not started. Returns the final job list.
    pub async fn shutdown(self) -> Result<Vec<JobView>> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

struct ActiveRun {
    queue: VecDeque<JobId>,
    in_flight: usize,
    completed: usize,
    failed: usize,
    quality: Quality,
    started: Instant,
    reply: oneshot::Sender<Result<RunSummary>>,
}

struct Coordinator {
    tracker: JobTracker,
    quality: Quality,
    mode: OutputMode,
    workers: usize,
    pool: WorkerPool,
    events: broadcast::Sender<JobEvent>,
    run: Option<ActiveRun>,
    shutdown: Option<oneshot::Sender<Vec<JobView>>>,
}

impl Coordinator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            tokio::select! {
                Some(completion) = completions.recv() => self.on_completion(completion),
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        debug!("All engine handles dropped");
                        break;
                    }
                },
            }

            if self.shutdown.is_some() && self.in_flight() == 0 {
                break;
            }
        }

        let Coordinator { tracker, pool, shutdown, .. } = self;
        pool.shutdown().await;
        info!("Compression engine stopped");
        if let Some(reply) = shutdown {
            let _ = reply.send(tracker.views());
        }
    }

    fn in_flight(&self) -> usize {
        self.run.as_ref().map_or(0, |run| run.in_flight)
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Add { sources, reply } => {
                let mut added = Vec::new();
                for (source, size) in sources {
                    if let Some(id) = self.tracker.add(source.clone(), size) {
                        self.emit(JobEvent::Queued { id, source });
                        added.push(id);
                    }
                }
                debug!("Added {} jobs ({} total)", added.len(), self.tracker.len());
                let _ = reply.send(added);
            }
            Command::Remove { id, reply } => {
                let _ = reply.send(self.tracker.remove(id));
            }
            Command::Clear { reply } => {
                let _ = reply.send(self.tracker.clear());
            }
            Command::SetQuality { quality, reply } => {
                let reset = if quality != self.quality {
                    info!("Quality changed: {} -> {}", self.quality, quality);
                    self.quality = quality;
                    self.tracker.reset_completed()
                } else {
                    0
                };
                let _ = reply.send(reset);
            }
            Command::CompressAll { reply } => self.start_run(reply),
            Command::Jobs { reply } => {
                let _ = reply.send(self.tracker.views());
            }
            Command::Aggregate { reply } => {
                let _ = reply.send(self.tracker.aggregate());
            }
            Command::Shutdown { reply } => {
                if let Some(run) = self.run.as_mut() {
                    if !run.queue.is_empty() {
                        info!("Shutdown requested, {} queued jobs will not start", run.queue.len());
                        run.queue.clear();
                    }
                }
                self.shutdown = Some(reply);
                self.finish_run_if_drained();
            }
        }
    }

    fn start_run(&mut self, reply: oneshot::Sender<Result<RunSummary>>) {
        if self.run.is_some() {
            let _ = reply.send(Err(anyhow!("A compression run is already in progress")));
            return;
        }
        if self.shutdown.is_some() {
            let _ = reply.send(Err(anyhow!("Compression engine is shutting down")));
            return;
        }

        let queue: VecDeque<JobId> = self.tracker.prepare_run(&self.mode).into();
        info!(
            "🚀 Starting run: {} jobs, {} quality, {} workers",
            queue.len(),
            self.quality,
            self.workers
        );

        self.run = Some(ActiveRun {
            queue,
            in_flight: 0,
            completed: 0,
            failed: 0,
            quality: self.quality,
            started: Instant::now(),
            reply,
        });
        self.refill();
        self.finish_run_if_drained();
    }

    /// Dispatch queued jobs until every worker slot is busy
    fn refill(&mut self) {
        let Some(run) = self.run.as_mut() else { return };

        while run.in_flight < self.workers {
            let Some(id) = run.queue.pop_front() else { break };

            // Jobs removed after the run started are no longer tracked
            let spec = match self.tracker.mark_running(id) {
                Ok(spec) => spec,
                Err(e) => {
                    debug!("Skipping job {}: {}", id, e);
                    continue;
                }
            };

            let source = spec.source.clone();
            if let Err(e) = self.pool.dispatch(Dispatch { spec, quality: run.quality }) {
                error!("Failed to dispatch job {}: {}", id, e);
                self.tracker.record_result(id, Err(e.to_string()));
                run.failed += 1;
                continue;
            }

            run.in_flight += 1;
            debug!("Dispatched job {} ({} in flight)", id, run.in_flight);
            let _ = self.events.send(JobEvent::Started { id, source });
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        let Completion { id, result } = completion;
        let result = result.map_err(|e| e.to_string());
        let succeeded = result.is_ok();

        self.tracker.record_result(id, result);
        if let Some(run) = self.run.as_mut() {
            run.in_flight = run.in_flight.saturating_sub(1);
            if succeeded {
                run.completed += 1;
            } else {
                run.failed += 1;
            }
        }

        if let Some(job) = self.tracker.view(id) {
            self.emit(JobEvent::Finished { job });
        }

        self.refill();
        self.finish_run_if_drained();
    }

    fn finish_run_if_drained(&mut self) {
        let drained = matches!(&self.run, Some(run) if run.queue.is_empty() && run.in_flight == 0);
        if !drained {
            return;
        }
        let Some(run) = self.run.take() else { return };

        let summary = RunSummary {
            processed: run.completed + run.failed,
            completed: run.completed,
            failed: run.failed,
            duration: run.started.elapsed(),
            aggregate: self.tracker.aggregate(),
        };
        info!(
            "✅ Run finished in {:.1}s: {} completed, {} failed",
            summary.duration.as_secs_f64(),
            summary.completed,
            summary.failed
        );

        self.emit(JobEvent::RunComplete {
            summary: summary.clone(),
        });
        let _ = run.reply.send(Ok(summary));
    }
}
