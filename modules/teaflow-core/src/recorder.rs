//! In-memory snapshot recording for tests and debugging.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::snapshot::Snapshot;
use crate::traits::{CommandLike, Interceptor, MessageLike, StateLike};

/// In-memory interceptor that keeps every snapshot it sees, in order.
/// Clones share the same recording.
pub struct SnapshotRecorder<M, S, C> {
    snapshots: Arc<Mutex<Vec<Snapshot<M, S, C>>>>,
}

impl<M, S, C> SnapshotRecorder<M, S, C>
where
    M: MessageLike,
    S: StateLike,
    C: CommandLike,
{
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Everything recorded so far (for test assertions).
    pub fn snapshots(&self) -> Vec<Snapshot<M, S, C>> {
        self.snapshots.lock().clone()
    }

    pub fn states(&self) -> Vec<S> {
        self.snapshots
            .lock()
            .iter()
            .map(|snapshot| snapshot.state().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().is_empty()
    }

    pub fn clear(&self) {
        self.snapshots.lock().clear();
    }
}

impl<M, S, C> Default for SnapshotRecorder<M, S, C>
where
    M: MessageLike,
    S: StateLike,
    C: CommandLike,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M, S, C> Clone for SnapshotRecorder<M, S, C> {
    fn clone(&self) -> Self {
        Self {
            snapshots: Arc::clone(&self.snapshots),
        }
    }
}

#[async_trait]
impl<M, S, C> Interceptor<M, S, C> for SnapshotRecorder<M, S, C>
where
    M: MessageLike,
    S: StateLike,
    C: CommandLike,
{
    async fn intercept(&self, snapshot: Snapshot<M, S, C>) {
        self.snapshots.lock().push(snapshot);
    }
}
