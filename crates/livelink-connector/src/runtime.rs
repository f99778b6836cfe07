//! Background traversal driver.
//!
//! The `TraversalRuntime` runs a [`TraversalManager`] on a tokio task and
//! wires it to a [`CheckpointStore`] and a [`DocumentSink`]:
//!
//! - **Documents**: drained into the sink, then the list's checkpoint is
//!   committed to the store
//! - **Pending**: the checkpoint is committed and the next call runs at once
//! - **Caught up**: any moved checkpoint is committed, then the task waits
//!   for the poll interval
//!
//! Repository calls block, so each traversal call runs on the blocking
//! pool. A checkpoint is committed only after the sink accepted every
//! document before it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::document::Document;
use crate::error::ConnectorError;
use crate::metrics::TraversalMetrics;
use crate::repository::Repository;
use crate::store::CheckpointStore;
use crate::traversal::{TraversalManager, TraversalOutcome};

/// Receives documents produced by the traversal.
#[async_trait]
pub trait DocumentSink: Send {
    /// Accepts one batch of documents, in traversal order.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the batch could not be accepted. The
    /// batch's checkpoint is not committed.
    async fn write_batch(&mut self, documents: Vec<Document>) -> Result<(), ConnectorError>;

    /// Makes every accepted batch durable.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the flush fails.
    async fn flush(&mut self) -> Result<(), ConnectorError> {
        Ok(())
    }
}

/// Configuration for the traversal runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Delay between traversal calls once caught up.
    pub poll_interval: Duration,

    /// Delay before retrying after a retryable repository error.
    pub retry_interval: Duration,

    /// Stop the task the first time the traversal is caught up.
    pub stop_when_caught_up: bool,

    /// Stop after this many document batches.
    pub max_batches: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            retry_interval: Duration::from_secs(30),
            stop_when_caught_up: false,
            max_batches: None,
        }
    }
}

/// Lifecycle state of a traversal task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    /// Running traversal calls.
    Running,

    /// Caught up and waiting for the poll interval.
    Idle,

    /// Waiting to retry after a repository error.
    Recovering,

    /// Stopped normally.
    Closed,

    /// Stopped on an error that retrying cannot fix.
    Failed,
}

impl fmt::Display for TraversalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TraversalState::Running => "running",
            TraversalState::Idle => "idle",
            TraversalState::Recovering => "recovering",
            TraversalState::Closed => "closed",
            TraversalState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Handle to a running traversal task.
#[derive(Debug)]
pub struct TraversalHandle {
    /// Current state.
    state: Arc<RwLock<TraversalState>>,

    /// Traversal metrics.
    metrics: Arc<TraversalMetrics>,

    /// Shutdown signal sender.
    shutdown_tx: Option<oneshot::Sender<()>>,

    /// Task join handle.
    task_handle: Option<JoinHandle<Result<(), ConnectorError>>>,
}

impl TraversalHandle {
    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TraversalState {
        *self.state.read()
    }

    /// Returns the traversal metrics.
    #[must_use]
    pub fn metrics(&self) -> &TraversalMetrics {
        &self.metrics
    }

    /// Asks the task to stop after the call in flight.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Waits for the task to complete.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError` if the task panicked or stopped on an error.
    pub async fn join(mut self) -> Result<(), ConnectorError> {
        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| ConnectorError::Internal(format!("task panicked: {e}")))?
        } else {
            Ok(())
        }
    }
}

/// Spawns traversal tasks.
#[derive(Debug, Clone, Default)]
pub struct TraversalRuntime {
    config: RuntimeConfig,
}

impl TraversalRuntime {
    /// Creates a runtime.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// The runtime configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Spawns a task that traverses with `manager`, resuming from the
    /// checkpoint in `store`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<R, S, K>(&self, manager: TraversalManager<R>, store: S, sink: K) -> TraversalHandle
    where
        R: Repository + 'static,
        S: CheckpointStore + 'static,
        K: DocumentSink + 'static,
    {
        let state = Arc::new(RwLock::new(TraversalState::Running));
        let metrics = Arc::clone(manager.metrics());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = TraversalTask {
            manager: Arc::new(manager),
            store: Arc::new(store),
            sink,
            state: Arc::clone(&state),
            metrics: Arc::clone(&metrics),
            config: self.config.clone(),
        };
        let task_handle = tokio::spawn(task.run(shutdown_rx));

        TraversalHandle {
            state,
            metrics,
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
        }
    }
}

struct TraversalTask<R, S, K> {
    manager: Arc<TraversalManager<R>>,
    store: Arc<S>,
    sink: K,
    state: Arc<RwLock<TraversalState>>,
    metrics: Arc<TraversalMetrics>,
    config: RuntimeConfig,
}

impl<R, S, K> TraversalTask<R, S, K>
where
    R: Repository + 'static,
    S: CheckpointStore + 'static,
    K: DocumentSink + 'static,
{
    async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) -> Result<(), ConnectorError> {
        let result = self.traverse(&mut shutdown_rx).await;
        let final_state = match &result {
            Ok(()) => TraversalState::Closed,
            Err(e) => {
                error!(error = %e, "traversal task failed");
                TraversalState::Failed
            }
        };
        *self.state.write() = final_state;
        result
    }

    async fn traverse(
        &mut self,
        shutdown_rx: &mut oneshot::Receiver<()>,
    ) -> Result<(), ConnectorError> {
        let mut checkpoint = load_checkpoint(Arc::clone(&self.store)).await?;
        info!(checkpoint = ?checkpoint, "traversal task started");
        let mut batches = 0u64;

        loop {
            if shutdown_rx.try_recv().is_ok() {
                return Ok(());
            }
            *self.state.write() = TraversalState::Running;

            let manager = Arc::clone(&self.manager);
            let resume_from = checkpoint.clone();
            let outcome = tokio::task::spawn_blocking(move || match resume_from {
                Some(cp) => manager.resume_traversal(&cp),
                None => manager.start_traversal(),
            })
            .await
            .map_err(|e| ConnectorError::Internal(format!("traversal call panicked: {e}")))?;

            let wait = match outcome {
                Ok(TraversalOutcome::Documents(mut list)) => {
                    let mut documents = Vec::with_capacity(list.len());
                    let mut failure = None;
                    loop {
                        match list.next_document() {
                            Ok(Some(doc)) => documents.push(doc),
                            Ok(None) => break,
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    }
                    if !documents.is_empty() {
                        debug!(documents = documents.len(), "writing batch");
                        self.sink.write_batch(documents).await?;
                        self.sink.flush().await?;
                        if let Some(next) = list.checkpoint() {
                            commit_checkpoint(Arc::clone(&self.store), &self.metrics, &next)
                                .await?;
                            checkpoint = Some(next);
                        }
                    }
                    if let Some(e) = failure {
                        self.recover(e)?
                    } else {
                        batches += 1;
                        if self.config.max_batches.is_some_and(|max| batches >= max) {
                            info!(batches, "batch limit reached");
                            return Ok(());
                        }
                        None
                    }
                }
                Ok(TraversalOutcome::Pending(next)) => {
                    commit_checkpoint(Arc::clone(&self.store), &self.metrics, &next).await?;
                    checkpoint = Some(next);
                    None
                }
                Ok(TraversalOutcome::CaughtUp(next)) => {
                    if let Some(next) = next {
                        commit_checkpoint(Arc::clone(&self.store), &self.metrics, &next).await?;
                        checkpoint = Some(next);
                    }
                    if self.config.stop_when_caught_up {
                        info!("traversal caught up");
                        return Ok(());
                    }
                    *self.state.write() = TraversalState::Idle;
                    Some(self.config.poll_interval)
                }
                Err(e) => self.recover(e)?,
            };

            if let Some(delay) = wait {
                tokio::select! {
                    _ = &mut *shutdown_rx => return Ok(()),
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    /// Retry delay for a retryable error; anything else ends the task.
    fn recover(&self, e: ConnectorError) -> Result<Option<Duration>, ConnectorError> {
        if !e.is_retryable() {
            return Err(e);
        }
        warn!(error = %e, retry_in = ?self.config.retry_interval, "traversal call failed");
        *self.state.write() = TraversalState::Recovering;
        Ok(Some(self.config.retry_interval))
    }
}

// These never borrow the task across an await: sinks are `Send` but not
// necessarily `Sync`.

async fn load_checkpoint<S: CheckpointStore + 'static>(
    store: Arc<S>,
) -> Result<Option<String>, ConnectorError> {
    tokio::task::spawn_blocking(move || store.load())
        .await
        .map_err(|e| ConnectorError::Internal(format!("checkpoint load panicked: {e}")))?
}

async fn commit_checkpoint<S: CheckpointStore + 'static>(
    store: Arc<S>,
    metrics: &TraversalMetrics,
    checkpoint: &str,
) -> Result<(), ConnectorError> {
    let owned = checkpoint.to_string();
    tokio::task::spawn_blocking(move || store.save(&owned))
        .await
        .map_err(|e| ConnectorError::Internal(format!("checkpoint save panicked: {e}")))??;
    metrics.inc_checkpoints();
    debug!(checkpoint, "checkpoint committed");
    Ok(())
}
