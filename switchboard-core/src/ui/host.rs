//! Render hosts: the UI framework's side of re-render scheduling.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::store::Applied;

/// Schedules re-renders for instances whose state changed.
pub trait RenderHost: Send + Sync {
    /// Request a re-render. Finish or drop `applied` once it has happened.
    fn request_render(&self, applied: Applied);
}

/// Host that treats every render request as committed immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateHost;

impl ImmediateHost {
    /// A shared handle, ready to pass to `mount`.
    pub fn shared() -> Arc<dyn RenderHost> {
        Arc::new(Self)
    }
}

impl RenderHost for ImmediateHost {
    fn request_render(&self, applied: Applied) {
        applied.finish();
    }
}

/// Host that queues render requests until [`flush`](Self::flush) is called,
/// the way a framework batches state updates into one render pass.
#[derive(Default)]
pub struct BatchedHost {
    queue: Mutex<Vec<Applied>>,
}

impl BatchedHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of render requests waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Commit every queued render. Returns how many were committed.
    pub fn flush(&self) -> usize {
        // Take the queue first: finishing a token may run a completion
        // callback that requests more renders.
        let batch = std::mem::take(&mut *self.queue.lock());
        let count = batch.len();
        trace!(count, "flushing render batch");
        batch.into_iter().for_each(Applied::finish);
        count
    }
}

impl RenderHost for BatchedHost {
    fn request_render(&self, applied: Applied) {
        self.queue.lock().push(applied);
    }
}

impl fmt::Debug for BatchedHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchedHost")
            .field("pending", &self.pending())
            .finish()
    }
}
