//! Scheduler worker loop
//!
//! ## Architecture
//!
//! The worker owns the sink for the lifetime of the scheduler:
//! - Sleeps on the work condvar while the backlog is empty
//! - Takes up to `batch_size` commands per pass while holding the lock
//! - Executes them with the lock released, one at a time, in order
//! - Exits once shutdown has begun and the backlog is drained
//!
//! A failing or panicking sink never stops the loop. Failures are counted,
//! logged, and passed to the optional error listener.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use logpipe_core::{SchedulerAction, SchedulerCommand, Sink, SinkError};
use smallvec::SmallVec;
use tracing::{debug, error, info, warn};

use crate::scheduler::{Phase, Shared};

/// Batch buffer kept on the stack for the default batch size
type Batch<P> = SmallVec<[SchedulerCommand<P>; 16]>;

// ----------------------------------------------------------------------------
// Error Reporting
// ----------------------------------------------------------------------------

/// A command the sink failed to execute
#[derive(Debug)]
pub struct SinkFailure<'a> {
    /// Caption of the scheduler that owns the sink
    pub caption: &'a str,
    pub action: SchedulerAction,
    pub error: &'a SinkError,
}

/// Callback invoked on the worker thread for every sink failure
pub type ErrorListener = Arc<dyn Fn(&SinkFailure<'_>) + Send + Sync>;

// ----------------------------------------------------------------------------
// Worker
// ----------------------------------------------------------------------------

pub(crate) struct Worker<S: Sink> {
    sink: S,
    shared: Arc<Shared<S::Packet>>,
    batch_size: usize,
    caption: String,
    error_listener: Option<ErrorListener>,
}

/// Marks the worker as exited even if the loop unwinds
struct ExitGuard<'a, P> {
    shared: &'a Shared<P>,
}

impl<P> Drop for ExitGuard<'_, P> {
    fn drop(&mut self) {
        self.shared.state.lock().worker_exited = true;
        self.shared.exited.notify_all();
    }
}

impl<S: Sink> Worker<S> {
    pub(crate) fn new(
        sink: S,
        shared: Arc<Shared<S::Packet>>,
        batch_size: usize,
        caption: String,
        error_listener: Option<ErrorListener>,
    ) -> Self {
        Self {
            sink,
            shared,
            batch_size: batch_size.max(1),
            caption,
            error_listener,
        }
    }

    pub(crate) fn run(mut self) {
        let shared = Arc::clone(&self.shared);
        let _guard = ExitGuard { shared: &shared };

        info!("Scheduler worker {} running", self.caption);
        let mut batch: Batch<S::Packet> = SmallVec::new();

        loop {
            {
                let mut state = shared.state.lock();
                while state.queue.is_empty() && state.phase == Phase::Running {
                    shared.work.wait(&mut state);
                }
                if state.queue.is_empty() {
                    break;
                }
                while batch.len() < self.batch_size {
                    match state.queue.dequeue() {
                        Some(command) => batch.push(command),
                        None => break,
                    }
                }
            }

            let mut pending = batch.drain(..);
            while let Some(command) = pending.next() {
                self.execute(&command);

                if !self.sink.is_failed() {
                    continue;
                }

                // Phase is re-read per command: stop may arrive mid-batch
                let queued = {
                    let mut state = shared.state.lock();
                    if state.phase == Phase::Running {
                        continue;
                    }
                    state.queue.clear()
                };
                let discarded = pending.count() + queued;
                shared.stats.record_cleared(discarded);
                warn!(
                    "Sink of scheduler {} failed during shutdown, discarded {} pending commands",
                    self.caption, discarded
                );
                info!("Scheduler worker {} exiting", self.caption);
                return;
            }
        }

        debug!("Scheduler worker {} drained backlog", self.caption);
        info!("Scheduler worker {} exiting", self.caption);
    }

    /// Run one command against the sink, isolating failures and panics
    fn execute(&mut self, command: &SchedulerCommand<S::Packet>) {
        let action = command.action();
        let sink = &mut self.sink;

        let result = panic::catch_unwind(AssertUnwindSafe(|| sink.execute(command)))
            .unwrap_or_else(|payload| {
                Err(SinkError::Panicked {
                    action,
                    message: panic_message(payload.as_ref()),
                })
            });

        match result {
            Ok(()) => self.shared.stats.record_executed(),
            Err(e) => {
                self.shared.stats.record_failed();
                error!("Scheduler {} failed to execute {}: {}", self.caption, action, e);
                self.report(action, &e);
            }
        }
    }

    fn report(&self, action: SchedulerAction, error: &SinkError) {
        let Some(listener) = &self.error_listener else {
            return;
        };
        let failure = SinkFailure {
            caption: &self.caption,
            action,
            error,
        };
        if panic::catch_unwind(AssertUnwindSafe(|| listener(&failure))).is_err() {
            warn!("Error listener of scheduler {} panicked", self.caption);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
