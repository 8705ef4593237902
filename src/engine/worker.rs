//! Background-worker execution path.
//!
//! The same seven-phase pipeline, run on a dedicated thread behind a
//! bounded channel, purely so an interactive caller is never blocked on
//! processing. Inputs and outputs are owned values copied across the
//! boundary; there is no shared mutable state. The protocol is three
//! request kinds in, three reply kinds out, correlated by a caller-supplied
//! request id, so the channel transport could be swapped for a serialized
//! one without touching the engine.
//!
//! Dispatch through the worker is best-effort by contract: if the worker
//! cannot accept or answer a request, `process_field_or_local` silently
//! runs the identical pipeline in-process. Both paths execute the same
//! code, so they produce identical contexts for identical inputs.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::context::FormContext;
use crate::engine::DecisionEngine;
use crate::error::WorkerError;
use crate::field::FieldUpdate;
use crate::rules::ValidationResults;

/// Caller-supplied correlation id for one worker request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new random request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request into the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Run the full per-field-update pipeline.
    ProcessField {
        /// Correlation id echoed on every reply.
        id: RequestId,
        /// The field update to process.
        update: FieldUpdate,
        /// The prior context.
        context: FormContext,
    },

    /// Run validation only.
    ValidateForm {
        /// Correlation id echoed on every reply.
        id: RequestId,
        /// The context to validate.
        context: FormContext,
    },

    /// Run conflict detection and gated auto-resolution only.
    ResolveConflicts {
        /// Correlation id echoed on every reply.
        id: RequestId,
        /// The context to inspect.
        context: FormContext,
    },
}

impl WorkerRequest {
    /// The correlation id of this request.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        match self {
            Self::ProcessField { id, .. }
            | Self::ValidateForm { id, .. }
            | Self::ResolveConflicts { id, .. } => *id,
        }
    }
}

/// The payload of a successful reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerOutput {
    /// Result of `ProcessField`.
    Processed {
        /// The updated context.
        context: FormContext,
    },

    /// Result of `ValidateForm`.
    Validated {
        /// The validation findings.
        results: ValidationResults,
    },

    /// Result of `ResolveConflicts`.
    Resolved {
        /// The updated context.
        context: FormContext,
    },
}

/// A reply from the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerReply {
    /// A progress checkpoint (0–100).
    Progress {
        /// The request this progress belongs to.
        id: RequestId,
        /// Percent complete.
        percent: u8,
    },

    /// The request completed.
    Success {
        /// The request that completed.
        id: RequestId,
        /// Its result.
        output: WorkerOutput,
    },

    /// The request failed.
    Error {
        /// The request that failed.
        id: RequestId,
        /// What went wrong.
        message: String,
    },
}

struct Job {
    request: WorkerRequest,
    reply: Sender<WorkerReply>,
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum queued requests.
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

/// Handle for replies to one request.
#[derive(Debug)]
pub struct PendingRequest {
    rx: Receiver<WorkerReply>,
}

impl PendingRequest {
    /// Receives the next reply (progress or final).
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Disconnected` if the worker dropped the reply
    /// channel without answering.
    pub fn recv(&self) -> Result<WorkerReply, WorkerError> {
        self.rx.recv().map_err(|_| WorkerError::Disconnected)
    }

    /// Receives the next reply with a timeout.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Timeout` or `WorkerError::Disconnected`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<WorkerReply, WorkerError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            crossbeam_channel::RecvTimeoutError::Timeout => WorkerError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            },
            crossbeam_channel::RecvTimeoutError::Disconnected => WorkerError::Disconnected,
        })
    }

    /// Waits for the final reply, discarding progress events.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Remote` if the worker reported failure, or
    /// `WorkerError::Disconnected` if it never answered.
    pub fn wait(self) -> Result<WorkerOutput, WorkerError> {
        loop {
            match self.recv()? {
                WorkerReply::Progress { .. } => {}
                WorkerReply::Success { output, .. } => return Ok(output),
                WorkerReply::Error { message, .. } => {
                    return Err(WorkerError::Remote { message })
                }
            }
        }
    }
}

/// A background worker running the engine pipeline off-thread.
pub struct EngineWorker {
    engine: Arc<DecisionEngine>,
    tx: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    queue_capacity: usize,
}

impl EngineWorker {
    /// Spawns the worker thread.
    #[must_use]
    pub fn spawn(engine: Arc<DecisionEngine>, config: WorkerConfig) -> Self {
        let queue_capacity = config.queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let worker_engine = Arc::clone(&engine);
        let handle = thread::Builder::new()
            .name("aidflow-worker".to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    handle_job(&worker_engine, job);
                }
            })
            .expect("failed to spawn aidflow worker");

        Self {
            engine,
            tx: Some(tx),
            handle: Some(handle),
            queue_capacity,
        }
    }

    /// The engine this worker runs.
    #[must_use]
    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Submits a request; replies arrive on the given sender.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::QueueFull` under backpressure, or
    /// `WorkerError::Disconnected` after shutdown.
    pub fn submit(
        &self,
        request: WorkerRequest,
        reply: Sender<WorkerReply>,
    ) -> Result<(), WorkerError> {
        let Some(tx) = &self.tx else {
            return Err(WorkerError::Disconnected);
        };
        match tx.try_send(Job { request, reply }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(WorkerError::QueueFull {
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(WorkerError::Disconnected),
        }
    }

    /// Submits a request and returns a handle for its replies.
    ///
    /// # Errors
    ///
    /// Same as `submit`.
    pub fn request(&self, request: WorkerRequest) -> Result<PendingRequest, WorkerError> {
        // Progress checkpoints plus the final reply; 16 leaves headroom.
        let (tx, rx) = bounded::<WorkerReply>(16);
        self.submit(request, tx)?;
        Ok(PendingRequest { rx })
    }

    /// Processes a field update through the worker, falling back to
    /// in-process execution if the worker cannot accept or answer.
    ///
    /// The fallback is silent by contract: the caller always gets a
    /// context, never a worker failure. Both paths run the same pipeline
    /// code, so for the same inputs they produce identical contexts.
    #[must_use]
    pub fn process_field_or_local(
        &self,
        update: FieldUpdate,
        context: &FormContext,
    ) -> FormContext {
        let request = WorkerRequest::ProcessField {
            id: RequestId::new(),
            update: update.clone(),
            context: context.clone(),
        };

        match self.request(request) {
            Ok(pending) => match pending.wait() {
                Ok(WorkerOutput::Processed { context }) => context,
                Ok(_) => {
                    warn!("worker returned mismatched output; falling back to in-process");
                    self.engine.process_update(update, context)
                }
                Err(err) => {
                    warn!(error = %err, "worker reply failed; falling back to in-process");
                    self.engine.process_update(update, context)
                }
            },
            Err(err) => {
                warn!(error = %err, "worker dispatch failed; falling back to in-process");
                self.engine.process_update(update, context)
            }
        }
    }

    /// Stops accepting requests, drains the queue, and joins the thread.
    pub fn shutdown(&mut self) {
        // Close the channel: the worker drains queued jobs then exits.
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EngineWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn handle_job(engine: &DecisionEngine, job: Job) {
    let Job { request, reply } = job;
    match request {
        WorkerRequest::ProcessField {
            id,
            update,
            context,
        } => {
            let progress_reply = reply.clone();
            let result = engine.process_update_with_progress(update, &context, &|percent| {
                let _ = progress_reply.send(WorkerReply::Progress { id, percent });
            });
            let _ = reply.send(WorkerReply::Success {
                id,
                output: WorkerOutput::Processed { context: result },
            });
        }

        WorkerRequest::ValidateForm { id, context } => match engine.validate(&context) {
            Ok(results) => {
                let _ = reply.send(WorkerReply::Success {
                    id,
                    output: WorkerOutput::Validated { results },
                });
            }
            Err(err) => {
                let _ = reply.send(WorkerReply::Error {
                    id,
                    message: err.to_string(),
                });
            }
        },

        WorkerRequest::ResolveConflicts { id, context } => {
            match engine.resolve_conflicts(&context) {
                Ok(resolved) => {
                    let _ = reply.send(WorkerReply::Success {
                        id,
                        output: WorkerOutput::Resolved { context: resolved },
                    });
                }
                Err(err) => {
                    let _ = reply.send(WorkerReply::Error {
                        id,
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}
