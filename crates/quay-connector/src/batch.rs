//! Batch orchestration: one task per descriptor, a counting join
//! barrier, and terminal-event/outcome finalization.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::descriptor::{Outcome, StatusCell};
use crate::error::{ConnectorError, Result};
use crate::events::EventSink;

/// Counting barrier the orchestrator blocks on.
pub(crate) struct Latch {
    remaining: Mutex<usize>,
    notify: Notify,
}

impl Latch {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            notify: Notify::new(),
        }
    }

    fn count_down(&self) {
        let mut remaining = self.remaining.lock().expect("latch poisoned");
        if *remaining > 0 {
            *remaining -= 1;
        }
        if *remaining == 0 {
            self.notify.notify_waiters();
        }
    }

    pub(crate) async fn wait(&self) {
        loop {
            // Register interest before reading the count, so a
            // decrement between the check and the await cannot be lost.
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();
            if *self.remaining.lock().expect("latch poisoned") == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Decrements its latch at most once, no matter how many of a worker's
/// exit paths fire.
pub(crate) struct LatchGuard {
    latch: Arc<Latch>,
    fired: AtomicBool,
}

impl LatchGuard {
    pub(crate) fn new(latch: Arc<Latch>) -> Self {
        Self {
            latch,
            fired: AtomicBool::new(false),
        }
    }

    pub(crate) fn count_down(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.latch.count_down();
        }
    }
}

/// One unit of batch work: the worker future plus the handles the
/// orchestrator needs to finalize it.
pub(crate) struct TransferTask {
    pub(crate) cell: Arc<StatusCell>,
    pub(crate) sink: EventSink,
    pub(crate) fut: BoxFuture<'static, Result<()>>,
}

/// Run every task to a terminal state, then return.
///
/// Each task is spawned on the runtime; its terminal signal writes the
/// descriptor outcome (write-once), emits the closing event, and
/// decrements the barrier. If the returned future is dropped before the
/// barrier opens, remaining workers are aborted and their descriptors
/// finalized with [`Outcome::Cancelled`]; in-flight connections drain
/// inside the HTTP client.
pub(crate) async fn run_all(tasks: Vec<TransferTask>) {
    if tasks.is_empty() {
        return;
    }

    let latch = Arc::new(Latch::new(tasks.len()));
    let mut guard = CancelGuard {
        pending: Vec::with_capacity(tasks.len()),
        handles: Vec::with_capacity(tasks.len()),
        armed: true,
    };

    for task in tasks {
        let TransferTask { cell, sink, fut } = task;
        guard.pending.push((Arc::clone(&cell), sink.clone()));
        let latch_guard = LatchGuard::new(Arc::clone(&latch));
        guard.handles.push(tokio::spawn(async move {
            let result = fut.await;
            match result {
                Ok(()) => {
                    cell.finish(Outcome::Ok);
                    sink.succeeded();
                }
                Err(err) => {
                    cell.finish(Outcome::from_error(&err));
                    sink.failed(&err);
                }
            }
            latch_guard.count_down();
        }));
    }

    latch.wait().await;
    guard.armed = false;
}

struct CancelGuard {
    pending: Vec<(Arc<StatusCell>, EventSink)>,
    handles: Vec<JoinHandle<()>>,
    armed: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for handle in &self.handles {
            handle.abort();
        }
        for (cell, sink) in &self.pending {
            if cell.finish(Outcome::Cancelled) {
                sink.failed(&ConnectorError::Cancelled);
            }
        }
    }
}
