//! # Worker Pool
//!
//! Pool fisso di task tokio che eseguono le compressioni fuori dal
//! coordinatore. Ogni worker preleva un `Dispatch` dalla coda condivisa,
//! chiama il `Compressor` e restituisce il risultato sul canale delle
//! completion. I worker non toccano mai lo stato dei job.

use crate::error::CompressionError;
use crate::image_processor::Compressor;
use crate::job::{JobId, JobSpec};
use crate::quality::Quality;
use anyhow::Result;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// One job handed to a worker
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub spec: JobSpec,
    pub quality: Quality,
}

/// Result of one job, sent back to the coordinator
#[derive(Debug)]
pub struct Completion {
    pub id: JobId,
    pub result: Result<u64, CompressionError>,
}

pub struct WorkerPool {
    dispatch_tx: mpsc::UnboundedSender<Dispatch>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers sharing one dispatch queue
    pub fn spawn(
        size: usize,
        compressor: Arc<dyn Compressor>,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel::<Dispatch>();
        let dispatch_rx = Arc::new(Mutex::new(dispatch_rx));

        let handles = (0..size)
            .map(|worker| {
                let rx = dispatch_rx.clone();
                let compressor = compressor.clone();
                let completions = completions.clone();
                tokio::spawn(async move {
                    Self::worker_loop(worker, rx, compressor, completions).await;
                })
            })
            .collect();

        debug!("Started worker pool with {} workers", size);
        Self { dispatch_tx, handles }
    }

    async fn worker_loop(
        worker: usize,
        rx: Arc<Mutex<mpsc::UnboundedReceiver<Dispatch>>>,
        compressor: Arc<dyn Compressor>,
        completions: mpsc::UnboundedSender<Completion>,
    ) {
        loop {
            // The lock is released before compressing so other workers can pull
            let next = { rx.lock().await.recv().await };
            let Some(dispatch) = next else { break };

            let id = dispatch.spec.id;
            debug!("Worker {} compressing job {}: {}", worker, id, dispatch.spec.source.display());
            let compression = AssertUnwindSafe(async {
                compressor.compress(dispatch.spec, dispatch.quality).await
            });
            let result = match compression.catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!("Worker {} caught a panic in job {}: {}", worker, id, message);
                    Err(CompressionError::Panicked(message))
                }
            };

            if completions.send(Completion { id, result }).is_err() {
                warn!("Coordinator gone, worker {} dropping result for job {}", worker, id);
                break;
            }
        }
        debug!("Worker {} stopped", worker);
    }

    pub fn dispatch(&self, dispatch: Dispatch) -> Result<()> {
        self.dispatch_tx
            .send(dispatch)
            .map_err(|_| anyhow::anyhow!("Worker pool is shut down"))
    }

    /// Close the queue and wait for every worker to finish its current job
    pub async fn shutdown(self) {
        drop(self.dispatch_tx);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("Worker task ended abnormally: {}", e);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ImageFormat;
    use futures::future::{BoxFuture, FutureExt};
    use std::path::PathBuf;

    struct SizeEcho;

    impl Compressor for SizeEcho {
        fn compress(&self, job: JobSpec, _quality: Quality) -> BoxFuture<'static, Result<u64, CompressionError>> {
            async move {
                if job.original_size == 1 {
                    panic!("decoder exploded on {}", job.source.display());
                }
                if job.original_size == 0 {
                    Err(CompressionError::InvalidImage(job.source))
                } else {
                    Ok(job.original_size / 2)
                }
            }
            .boxed()
        }
    }

    fn dispatch(id: u64, size: u64) -> Dispatch {
        let source = PathBuf::from(format!("/img/{}.png", id));
        Dispatch {
            spec: JobSpec {
                id: JobId(id),
                output: source.clone(),
                source,
                format: ImageFormat::Png,
                original_size: size,
            },
            quality: Quality::Medium,
        }
    }

    #[tokio::test]
    async fn test_every_dispatch_yields_one_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::spawn(3, Arc::new(SizeEcho), tx);

        for id in 1..=6 {
            pool.dispatch(dispatch(id, if id == 4 { 0 } else { 100 })).unwrap();
        }

        let mut results = Vec::new();
        for _ in 0..6 {
            results.push(rx.recv().await.unwrap());
        }
        results.sort_by_key(|c| c.id);

        assert_eq!(results.len(), 6);
        assert!(matches!(results[3].result, Err(CompressionError::InvalidImage(_))));
        assert_eq!(results.iter().filter(|c| c.result.is_ok()).count(), 5);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_job_reports_failure_and_worker_survives() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::spawn(1, Arc::new(SizeEcho), tx);

        pool.dispatch(dispatch(1, 1)).unwrap();
        pool.dispatch(dispatch(2, 100)).unwrap();

        let first = rx.recv().await.unwrap();
        match first.result {
            Err(CompressionError::Panicked(message)) => assert!(message.contains("decoder exploded")),
            other => panic!("expected Panicked, got {:?}", other),
        }
        // the single worker is still alive for the next job
        let second = rx.recv().await.unwrap();
        assert_eq!(second.result.unwrap(), 50);

        pool.shutdown().await;
    }
}
