//! Bounded worker pool for document construction.
//!
//! Jobs are queued on a bounded channel, so `submit` waits once the queue
//! is full. `drain` is the barrier: it closes the queue and waits for every
//! worker before anything may be committed.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::UpdateError;

type Job = BoxFuture<'static, Result<(), UpdateError>>;

/// Fixed set of workers pulling jobs from a bounded queue.
pub struct IndexingPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<Result<usize, UpdateError>>>,
}

impl IndexingPool {
    /// Start `workers` workers sharing a queue of `queue_size` jobs.
    pub fn new(workers: usize, queue_size: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(queue_size.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|worker| {
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    let mut completed = 0;
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else {
                            break;
                        };
                        if let Err(e) = job.await {
                            warn!(worker, error = %e, "Indexing job failed");
                            return Err(e);
                        }
                        completed += 1;
                    }
                    debug!(worker, completed, "Indexing worker finished");
                    Ok(completed)
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Queue a job, waiting while the queue is full.
    ///
    /// Fails once every worker has stopped; `drain` then reports why.
    pub async fn submit<F>(&self, job: F) -> Result<(), UpdateError>
    where
        F: Future<Output = Result<(), UpdateError>> + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| UpdateError::Pool("pool is drained".to_string()))?;
        sender
            .send(job.boxed())
            .await
            .map_err(|_| UpdateError::Pool("all indexing workers stopped".to_string()))
    }

    /// Close the queue and wait for every worker.
    ///
    /// Returns the number of completed jobs, or the first job error.
    pub async fn drain(mut self) -> Result<usize, UpdateError> {
        self.sender.take();

        let mut completed = 0;
        let mut first_error = None;
        for worker in std::mem::take(&mut self.workers) {
            let result = worker
                .await
                .map_err(|e| UpdateError::Pool(format!("indexing worker panicked: {e}")))
                .and_then(|r| r);
            match result {
                Ok(count) => completed += count,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(completed),
        }
    }
}

impl Drop for IndexingPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}
