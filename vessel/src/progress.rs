//! Progress coordinator (C8, §4.8). Aggregates progress events from N
//! concurrent pipeline subtasks (image fetch, image unpack, kernel fetch,
//! init image fetch, init image unpack) into a single ordered stream a
//! client can render.
//!
//! This lives alongside [`crate::pipeline`]'s generic task/stage machinery
//! but is a distinct concern: the pipeline module measures *how long* each
//! stage took (for metrics), while this module forwards *what each task is
//! currently doing* for a progress bar. Terminal rendering itself is out of
//! scope (§1); this module only produces the stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;

/// A single progress update from one task handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Human-readable description, e.g. "Fetching image".
    pub description: String,
    /// Name of the unit being counted, e.g. "layers", "bytes".
    pub items_name: Option<String>,
    pub completed: u64,
    pub total: Option<u64>,
}

impl ProgressEvent {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            items_name: None,
            completed: 0,
            total: None,
        }
    }

    pub fn with_count(mut self, completed: u64, total: Option<u64>) -> Self {
        self.completed = completed;
        self.total = total;
        self
    }
}

/// A message forwarded on the coordinator's outward stream.
#[derive(Debug, Clone)]
pub enum ProgressMessage {
    /// An update from one of the coordinator's handles.
    Update { handle_id: u64, event: ProgressEvent },
    /// All handles allocated by the coordinator have finished, or the
    /// coordinator was closed explicitly. Terminal: no further messages
    /// follow.
    Finished,
}

/// Short-lived handle accepting progress events for one subtask. Dropping a
/// handle counts as that task finishing.
#[derive(Clone)]
pub struct ProgressHandle {
    id: u64,
    tx: mpsc::UnboundedSender<ProgressMessage>,
    outstanding: Arc<AtomicU64>,
}

impl ProgressHandle {
    /// Forwards an update to the coordinator's outward stream.
    pub fn update(&self, event: ProgressEvent) {
        let _ = self.tx.send(ProgressMessage::Update {
            handle_id: self.id,
            event,
        });
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _ = self.tx.send(ProgressMessage::Finished);
        }
    }
}

/// Allocates handles and merges their updates into one outward stream.
pub struct ProgressCoordinator {
    next_id: AtomicU64,
    tx: mpsc::UnboundedSender<ProgressMessage>,
    outstanding: Arc<AtomicU64>,
}

impl ProgressCoordinator {
    /// Creates a coordinator and its outward stream.
    pub fn new() -> (Self, impl Stream<Item = ProgressMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            next_id: AtomicU64::new(0),
            tx,
            outstanding: Arc::new(AtomicU64::new(0)),
        };
        (coordinator, UnboundedReceiverStream::new(rx))
    }

    /// Allocates a new task handle. The coordinator's "all handles finished"
    /// condition will not fire until every handle allocated so far (and any
    /// allocated later) has been dropped.
    pub fn handle(&self) -> ProgressHandle {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        ProgressHandle {
            id,
            tx: self.tx.clone(),
            outstanding: Arc::clone(&self.outstanding),
        }
    }

    /// Closes the coordinator immediately, emitting a final `Finished`
    /// regardless of outstanding handles.
    pub fn close(self) {
        let _ = self.tx.send(ProgressMessage::Finished);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn forwards_updates_from_each_handle() {
        let (coordinator, stream) = ProgressCoordinator::new();
        let h1 = coordinator.handle();
        let h2 = coordinator.handle();

        h1.update(ProgressEvent::new("Fetching image"));
        h2.update(ProgressEvent::new("Fetching kernel"));
        drop(h1);
        drop(h2);

        let messages: Vec<_> = stream.collect().await;
        let updates: Vec<_> = messages
            .iter()
            .filter_map(|m| match m {
                ProgressMessage::Update { event, .. } => Some(event.description.clone()),
                ProgressMessage::Finished => None,
            })
            .collect();
        assert_eq!(updates, vec!["Fetching image", "Fetching kernel"]);
        assert!(matches!(messages.last(), Some(ProgressMessage::Finished)));
    }

    #[tokio::test]
    async fn emits_finished_once_all_handles_drop() {
        let (coordinator, stream) = ProgressCoordinator::new();
        let handle = coordinator.handle();
        drop(handle);

        tokio::pin!(stream);
        let msg = stream.next().await.unwrap();
        assert!(matches!(msg, ProgressMessage::Finished));
    }

    #[tokio::test]
    async fn close_emits_finished_immediately() {
        let (coordinator, stream) = ProgressCoordinator::new();
        let _handle = coordinator.handle();
        coordinator.close();

        tokio::pin!(stream);
        let msg = stream.next().await.unwrap();
        assert!(matches!(msg, ProgressMessage::Finished));
    }
}
