//! Run bridge: starts workflow runs as background tasks, streams their events,
//! and cancels them by id.
//!
//! Every started run gets a UUID, a bounded event channel, and a cancellation
//! token, registered in a [`RunRegistry`] for as long as its task is alive.
//! The task emits `started`, races the pipeline against the token, and then
//! emits exactly one terminal event:
//!
//! | Pipeline outcome       | Terminal event        |
//! |------------------------|-----------------------|
//! | completed              | `done {result}`       |
//! | returned an error      | `error {error}`       |
//! | panicked               | `error {error}`       |
//! | token fired first      | `cancelled {run_id}`  |
//!
//! The registry entry is removed once the terminal event has been sent,
//! whichever way the run ended.

use futures::{FutureExt, Stream};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use stepweave_core::event::{EventSink, RunEvent};
use stepweave_core::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::model::WorkflowDefinition;
use crate::pipeline::{RunOutput, WorkflowRunner};

/// Default capacity of a run's event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

struct RunEntry {
    token: CancellationToken,
    events: mpsc::Sender<RunEvent>,
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// No live run has this id (never existed, or already finished).
    NotFound,
    /// The run was signalled; its stream will end with `cancelled` unless it
    /// was already emitting another terminal event.
    Requested,
}

/// Live runs, keyed by run id.
///
/// The lock is only held for single map operations, never across an await.
#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<String, RunEntry>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, run_id: &str, entry: RunEntry) {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id.to_string(), entry);
    }

    fn remove(&self, run_id: &str) -> bool {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(run_id)
            .is_some()
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(run_id)
    }

    /// Ids of all live runs, sorted.
    pub fn active_runs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signal the run with this id to stop.
    ///
    /// Pushes a `cancel_requested` event if the channel has room (a full or
    /// closed channel is ignored), then fires the run's token.
    pub fn cancel(&self, run_id: &str) -> CancelOutcome {
        let runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = runs.get(run_id) else {
            debug!(run_id, "Cancel requested for unknown run");
            return CancelOutcome::NotFound;
        };

        if let Err(e) = entry.events.try_send(RunEvent::CancelRequested {
            run_id: run_id.to_string(),
        }) {
            debug!(run_id, error = %e, "Could not enqueue cancel_requested");
        }
        entry.token.cancel();
        info!(run_id, "Run cancellation requested");
        CancelOutcome::Requested
    }
}

/// Removes a run's registry entry when dropped.
struct RegistryGuard {
    registry: Arc<RunRegistry>,
    run_id: String,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        if self.registry.remove(&self.run_id) {
            debug!(run_id = %self.run_id, "Run removed from registry");
        }
    }
}

/// Result of one bounded wait on a run's events.
#[derive(Debug, Clone, PartialEq)]
pub enum NextEvent {
    Event(RunEvent),
    /// Nothing arrived within the poll interval; the run may still be alive.
    Idle,
    /// The channel closed; no more events will arrive.
    Closed,
}

/// Consumer side of a started run.
pub struct StreamingRun {
    pub run_id: String,
    pub events: mpsc::Receiver<RunEvent>,
    pub task: JoinHandle<()>,
}

impl StreamingRun {
    /// Wait up to `poll` for the next event.
    pub async fn next_event(&mut self, poll: Duration) -> NextEvent {
        match tokio::time::timeout(poll, self.events.recv()).await {
            Ok(Some(event)) => NextEvent::Event(event),
            Ok(None) => NextEvent::Closed,
            Err(_) => NextEvent::Idle,
        }
    }

    /// Drain events up to and including the terminal one, then wait for the
    /// run's task to finish.
    pub async fn collect(mut self) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        drop(self.events);
        if let Err(e) = self.task.await {
            warn!(run_id = %self.run_id, error = %e, "Run task did not finish cleanly");
        }
        events
    }

    /// Events as a stream that ends after the terminal event.
    pub fn into_stream(self) -> impl Stream<Item = RunEvent> + Send + 'static {
        futures::stream::unfold((self.events, false), |(mut rx, finished)| async move {
            if finished {
                return None;
            }
            let event = rx.recv().await?;
            let finished = event.is_terminal();
            Some((event, (rx, finished)))
        })
    }
}

/// Starts, streams, and cancels workflow runs over one [`WorkflowRunner`].
pub struct RunBridge {
    runner: Arc<WorkflowRunner>,
    registry: Arc<RunRegistry>,
    event_buffer: usize,
}

impl RunBridge {
    pub fn new(runner: Arc<WorkflowRunner>) -> Self {
        Self {
            runner,
            registry: Arc::new(RunRegistry::new()),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Use a shared registry instead of a private one.
    pub fn with_registry(mut self, registry: Arc<RunRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Set the per-run event channel capacity (minimum 1).
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    pub fn runner(&self) -> &Arc<WorkflowRunner> {
        &self.runner
    }

    /// Run a workflow to completion without events or registration.
    pub async fn run(&self, workflow: &WorkflowDefinition) -> Result<RunOutput> {
        self.runner.run(workflow, &EventSink::disabled()).await
    }

    /// Start a workflow as a background task and return its event stream.
    pub fn start(&self, workflow: WorkflowDefinition) -> StreamingRun {
        let run_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let token = CancellationToken::new();

        self.registry.insert(
            &run_id,
            RunEntry {
                token: token.clone(),
                events: tx.clone(),
            },
        );
        let guard = RegistryGuard {
            registry: self.registry.clone(),
            run_id: run_id.clone(),
        };

        let runner = self.runner.clone();
        let sink = EventSink::new(tx);
        let span = info_span!("run", run_id = %run_id);
        let task = tokio::spawn(
            produce(runner, workflow, sink, token, run_id.clone(), guard).instrument(span),
        );

        info!(run_id = %run_id, "Run started");
        StreamingRun {
            run_id,
            events: rx,
            task,
        }
    }

    /// Cancel a live run. Unknown or finished ids are reported, not errors.
    pub fn cancel(&self, run_id: &str) -> CancelOutcome {
        self.registry.cancel(run_id)
    }
}

async fn produce(
    runner: Arc<WorkflowRunner>,
    workflow: WorkflowDefinition,
    sink: EventSink,
    token: CancellationToken,
    run_id: String,
    guard: RegistryGuard,
) {
    sink.emit(RunEvent::Started {
        run_id: run_id.clone(),
    })
    .await;

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = AssertUnwindSafe(runner.run(&workflow, &sink)).catch_unwind() => Some(result),
    };

    let terminal = match outcome {
        None => {
            info!("Run cancelled");
            RunEvent::Cancelled { run_id }
        }
        Some(Ok(Ok(output))) => match serde_json::to_value(&output) {
            Ok(result) => {
                info!("Run completed");
                RunEvent::Done { result }
            }
            Err(e) => RunEvent::Error {
                error: format!("failed to serialize run output: {e}"),
            },
        },
        Some(Ok(Err(e))) => {
            warn!(error = %e, "Run failed");
            RunEvent::Error {
                error: e.to_string(),
            }
        }
        Some(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            warn!(panic = %message, "Run panicked");
            RunEvent::Error {
                error: format!("run panicked: {message}"),
            }
        }
    };

    sink.emit(terminal).await;
    drop(guard);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
