//! Update Dispatcher
//!
//! Turns one batch of updates into per-instance notifications.
//!
//! # Algorithm
//!
//! 1. Collect every registration subscribed to any updated name, visiting
//!    each registration once even if it subscribed to several updated names.
//! 2. For each registration, build a patch holding only the updated names it
//!    subscribed to.
//! 3. Snapshot the live instances of those registrations and count them.
//!    That count is the number of `apply_state` completions to wait for.
//! 4. Deliver the patch to every instance with an [`Applied`] token. Each
//!    token settles once; when the last one settles the completion callback
//!    runs.
//!
//! Planning happens while the store lock is held, delivery after it has been
//! released, so instances may read from or write to the store while applying.
//! Planned dispatches are queued per store and delivered strictly in the
//! order their values were stored; a `set` issued during a delivery is
//! delivered after it.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use super::registry::{InstanceHandle, InstanceId, RegistrationId, SubscriptionRegistry};
use super::variables::VariableStore;
use super::Patch;

/// Callback run once every notified instance has applied its patch.
pub(crate) type OnComplete = Box<dyn FnOnce() + Send + 'static>;

/// Shared pending counter for one `set` call.
struct Completion {
    pending: AtomicUsize,
    on_complete: Mutex<Option<OnComplete>>,
}

impl Completion {
    fn new(pending: usize, on_complete: Option<OnComplete>) -> Self {
        Self {
            pending: AtomicUsize::new(pending),
            on_complete: Mutex::new(on_complete),
        }
    }

    fn settle(&self) {
        let previous = self.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "completion settled more often than dispatched");
        if previous == 1 {
            self.fire();
        }
    }

    fn fire(&self) {
        let callback = self.on_complete.lock().take();
        if let Some(callback) = callback {
            trace!("all instances applied, running completion callback");
            callback();
        }
    }
}

/// Completion signal handed to an instance along with its patch.
///
/// Call [`finish`](Self::finish) once the patch has been applied. A token
/// that is dropped without being finished (for example because the instance
/// unmounted before rendering) still counts as applied, so every token
/// settles exactly once.
pub struct Applied {
    completion: Option<Arc<Completion>>,
}

impl Applied {
    fn new(completion: Arc<Completion>) -> Self {
        Self {
            completion: Some(completion),
        }
    }

    /// A token that is not tied to any `set` call.
    pub fn detached() -> Self {
        Self { completion: None }
    }

    /// Signal that the patch has been applied.
    pub fn finish(mut self) {
        if let Some(completion) = self.completion.take() {
            completion.settle();
        }
    }
}

impl Drop for Applied {
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            completion.settle();
        }
    }
}

impl fmt::Debug for Applied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Applied")
            .field("attached", &self.completion.is_some())
            .finish()
    }
}

/// Notifications for one affected registration.
struct Target {
    registration: RegistrationId,
    patch: Patch,
    instances: Vec<(InstanceId, InstanceHandle)>,
}

/// Everything one `set` call has to deliver, computed under the store lock.
pub(crate) struct Dispatch {
    targets: Vec<Target>,
    on_complete: Option<OnComplete>,
}

impl Dispatch {
    /// Plan notifications for `updates`, which have already been stored.
    pub fn plan(
        variables: &VariableStore,
        registry: &SubscriptionRegistry,
        updates: &Patch,
        on_complete: Option<OnComplete>,
    ) -> Self {
        let mut affected: SmallVec<[RegistrationId; 4]> = SmallVec::new();
        for name in updates.keys() {
            for registration in variables.subscribers(name) {
                if !affected.contains(&registration) {
                    affected.push(registration);
                }
            }
        }

        let targets = affected
            .into_iter()
            .map(|id| {
                let registration = registry.registration(id);
                let patch: Patch = updates
                    .iter()
                    .filter(|(name, _)| registration.is_subscribed(name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                Target {
                    registration: id,
                    patch,
                    instances: registration.snapshot_instances(),
                }
            })
            .collect();

        Self {
            targets,
            on_complete,
        }
    }

    /// Number of registrations touched by the batch.
    pub fn affected_registrations(&self) -> usize {
        self.targets.len()
    }

    /// Number of instances that will receive a patch.
    pub fn pending_instances(&self) -> usize {
        self.targets.iter().map(|target| target.instances.len()).sum()
    }

    /// Deliver every patch. Must be called without the store lock held.
    pub fn deliver(self) {
        let pending = self.pending_instances();
        let completion = Arc::new(Completion::new(pending, self.on_complete));
        if pending == 0 {
            completion.fire();
            return;
        }

        for target in self.targets {
            for (instance, handle) in target.instances {
                trace!(
                    registration = target.registration.raw(),
                    %instance,
                    names = target.patch.len(),
                    "delivering patch"
                );
                let applied = Applied::new(Arc::clone(&completion));
                handle.apply_state(target.patch.clone(), applied);
            }
        }
    }
}
