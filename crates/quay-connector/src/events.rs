//! Per-transfer lifecycle event dispatch.
//!
//! One listener per session. Each worker owns an [`EventSink`] for its
//! descriptor, so events for a single transfer are emitted from one
//! task and arrive totally ordered: `Initiated` first, then any number
//! of `Progressed` (and at most one `Corrupted`), closed by exactly one
//! of `Succeeded`/`Failed`. Dispatch is best-effort: a panicking
//! listener is logged and ignored, it never changes a transfer outcome.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::descriptor::TransferResource;
use crate::error::ConnectorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Get,
    Put,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferEventKind {
    /// Emitted before any I/O for the transfer.
    Initiated,
    /// One body chunk moved; carries the chunk size and the cumulative
    /// count for this transfer.
    Progressed { delta: u64, transferred: u64 },
    /// Soft checksum failure under [`ChecksumPolicy::Warn`].
    ///
    /// [`ChecksumPolicy::Warn`]: crate::descriptor::ChecksumPolicy::Warn
    Corrupted { detail: String },
    Succeeded,
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct TransferEvent {
    pub resource: TransferResource,
    pub direction: TransferDirection,
    pub kind: TransferEventKind,
}

/// Session-wide observer of transfer lifecycles.
///
/// May be called from multiple worker tasks, but never concurrently for
/// the same transfer.
pub trait TransferListener: Send + Sync {
    fn on_event(&self, event: &TransferEvent);
}

/// A worker's handle for emitting events about its one transfer.
#[derive(Clone)]
pub(crate) struct EventSink {
    listener: Option<Arc<dyn TransferListener>>,
    resource: TransferResource,
    direction: TransferDirection,
    transferred: Arc<AtomicU64>,
}

impl EventSink {
    pub(crate) fn new(
        listener: Option<Arc<dyn TransferListener>>,
        resource: TransferResource,
        direction: TransferDirection,
    ) -> Self {
        Self {
            listener,
            resource,
            direction,
            transferred: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn initiated(&self) {
        self.emit(TransferEventKind::Initiated);
    }

    pub(crate) fn progressed(&self, delta: u64) {
        let transferred = self.transferred.fetch_add(delta, Ordering::SeqCst) + delta;
        self.emit(TransferEventKind::Progressed { delta, transferred });
    }

    /// Align the cumulative count with bytes already present, e.g. when
    /// resuming a partial, or back to zero after a restart from scratch.
    pub(crate) fn set_transferred(&self, transferred: u64) {
        self.transferred.store(transferred, Ordering::SeqCst);
    }

    pub(crate) fn corrupted(&self, detail: impl Into<String>) {
        self.emit(TransferEventKind::Corrupted {
            detail: detail.into(),
        });
    }

    pub(crate) fn succeeded(&self) {
        self.emit(TransferEventKind::Succeeded);
    }

    pub(crate) fn failed(&self, error: &ConnectorError) {
        self.emit(TransferEventKind::Failed {
            error: error.to_string(),
        });
    }

    fn emit(&self, kind: TransferEventKind) {
        let Some(listener) = &self.listener else {
            return;
        };
        let event = TransferEvent {
            resource: self.resource.clone(),
            direction: self.direction,
            kind,
        };
        if catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))).is_err() {
            tracing::warn!(resource = %self.resource, "transfer listener panicked, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<TransferEventKind>>,
    }

    impl TransferListener for Recorder {
        fn on_event(&self, event: &TransferEvent) {
            self.events.lock().unwrap().push(event.kind.clone());
        }
    }

    fn sink(listener: Arc<dyn TransferListener>) -> EventSink {
        EventSink::new(
            Some(listener),
            TransferResource::artifact("a/b.jar"),
            TransferDirection::Get,
        )
    }

    #[test]
    fn progressed_accumulates() {
        let recorder = Arc::new(Recorder::default());
        let sink = sink(recorder.clone());
        sink.progressed(3);
        sink.progressed(2);

        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                TransferEventKind::Progressed { delta: 3, transferred: 3 },
                TransferEventKind::Progressed { delta: 2, transferred: 5 },
            ]
        );
    }

    #[test]
    fn set_transferred_rebases_the_count() {
        let recorder = Arc::new(Recorder::default());
        let sink = sink(recorder.clone());
        sink.set_transferred(7);
        sink.progressed(3);

        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![TransferEventKind::Progressed { delta: 3, transferred: 10 }]
        );
    }

    #[test]
    fn panicking_listener_is_contained() {
        struct Bomb;
        impl TransferListener for Bomb {
            fn on_event(&self, _event: &TransferEvent) {
                panic!("listener bug");
            }
        }

        let sink = sink(Arc::new(Bomb));
        // Must not propagate.
        sink.initiated();
        sink.succeeded();
    }

    #[test]
    fn no_listener_is_a_no_op() {
        let sink = EventSink::new(None, TransferResource::artifact("a"), TransferDirection::Put);
        sink.initiated();
        sink.progressed(1);
        sink.succeeded();
    }
}
