//! Variable Store
//!
//! This module implements the shared store: named variables, the components
//! subscribed to them, and the propagation of updates to mounted instances.
//!
//! # Concepts
//!
//! ## Variables
//!
//! A variable is a named slot holding an untyped [`Value`]. Variables are
//! declared by the initial values given at construction or by a `subscribe`
//! call naming them. They are never removed.
//!
//! ## Registrations and instances
//!
//! Each call to [`Store::subscribe`] creates one registration: a component
//! type together with the names it observes. Every time the resulting
//! wrapper is mounted, the new instance is added to its registration, and it
//! is removed again when the instance is dropped.
//!
//! ## Updates
//!
//! [`Store::set`] stores a batch of values and then notifies every affected
//! instance exactly once, with a patch containing only the names that
//! instance observes.
//!
//! # Locking
//!
//! The variables and the registry share one mutex per store, since their
//! invariants span both maps. UI callbacks always run after the lock has
//! been released.
//!
//! # Delivery order
//!
//! Each accepted batch is planned and pushed onto the store's delivery queue
//! in the same critical section that stores its values. Whichever caller
//! finds the queue idle drains it; a `set` made while a drain is running,
//! from a callback or another thread, only enqueues. Instances therefore see
//! batches in the order they were stored, and the last patch an instance
//! receives always matches the store.

mod dispatch;
mod registry;
mod variables;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::ui::{Component, Subscribed, UiInstance};

pub use dispatch::Applied;
pub use registry::{InstanceId, RegistrationId};

use dispatch::{Dispatch, OnComplete};
use registry::SubscriptionRegistry;
use variables::VariableStore;

/// An untyped variable value.
pub type Value = serde_json::Value;

/// Name/value pairs in insertion order: update batches, instance patches and
/// seeded instance state all use this shape.
pub type Patch = IndexMap<String, Value>;

/// Everything guarded by the store mutex.
struct StoreState {
    config: StoreConfig,
    variables: VariableStore,
    registry: SubscriptionRegistry,
    /// Planned dispatches, oldest first.
    deliveries: VecDeque<Dispatch>,
    /// Whether some caller is currently draining `deliveries`.
    delivering: bool,
}

impl StoreState {
    /// Validate, store and queue one batch.
    ///
    /// Returns whether the caller has to drain the delivery queue.
    fn store_batch(&mut self, updates: Patch, on_complete: Option<OnComplete>) -> Result<bool> {
        let may_create = self.config.allows_creation(!self.registry.is_empty());

        // Validate the whole batch before storing anything.
        if let Err(err) = updates
            .keys()
            .try_for_each(|name| self.variables.check_writable(name, may_create))
        {
            warn!(variable = err.variable(), "rejected update batch");
            return Err(err);
        }

        for (name, value) in &updates {
            self.variables.set_value(name, value.clone());
        }

        let dispatch = Dispatch::plan(&self.variables, &self.registry, &updates, on_complete);
        debug!(
            updated = updates.len(),
            registrations = dispatch.affected_registrations(),
            instances = dispatch.pending_instances(),
            queued = self.deliveries.len(),
            "queued update batch"
        );
        self.deliveries.push_back(dispatch);
        Ok(!std::mem::replace(&mut self.delivering, true))
    }
}

/// Resets the delivery queue if a delivery panics, so later batches are not
/// stuck behind a drain that will never finish.
struct DrainGuard<'a>(&'a Store);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut state = self.0.state.lock();
            state.deliveries.clear();
            state.delivering = false;
        }
    }
}

/// A shared publish/subscribe variable store.
///
/// Cloning a `Store` yields another handle to the same variables.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use switchboard_core::store::Store;
///
/// let store = Store::new([("count", json!(0))]);
/// store.set([("count", json!(5))]).unwrap();
/// assert_eq!(store.get("count").unwrap(), json!(5));
/// ```
#[derive(Clone)]
pub struct Store {
    state: Arc<Mutex<StoreState>>,
}

impl Store {
    /// Create a store with the default (strict) configuration.
    pub fn new<I, K, V>(initial: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::with_config(initial, StoreConfig::default())
    }

    /// Create a store with the given configuration.
    ///
    /// Initial values always create their entries, whatever the policy.
    pub fn with_config<I, K, V>(initial: I, config: StoreConfig) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut variables = VariableStore::new();
        variables.initialize(collect_patch(initial));

        Self {
            state: Arc::new(Mutex::new(StoreState {
                config,
                variables,
                registry: SubscriptionRegistry::new(),
                deliveries: VecDeque::new(),
                delivering: false,
            })),
        }
    }

    /// Create a store without any variables.
    pub fn empty() -> Self {
        Self::new(std::iter::empty::<(String, Value)>())
    }

    /// The configuration this store was created with.
    pub fn config(&self) -> StoreConfig {
        self.state.lock().config.clone()
    }

    /// Get the current value of a variable.
    ///
    /// Fails with [`StoreError::UnknownVariable`] if the variable does not
    /// exist or has never been given a value.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.state.lock().variables.get_value(name).cloned()
    }

    /// Get the current value of a variable, deserialized into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.get(name)?;
        serde_json::from_value(value).map_err(|source| StoreError::Decode {
            name: name.to_string(),
            source,
        })
    }

    /// Whether the store has an entry for `name`, set or not.
    pub fn contains(&self, name: &str) -> bool {
        self.state.lock().variables.contains(name)
    }

    /// Names of all variables, in the order they were declared.
    pub fn names(&self) -> Vec<String> {
        self.state
            .lock()
            .variables
            .names()
            .map(str::to_string)
            .collect()
    }

    /// Every variable that currently holds a value.
    pub fn snapshot(&self) -> Patch {
        self.state.lock().variables.snapshot()
    }

    /// Number of component registrations subscribed to `name`.
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.state.lock().variables.subscriber_count(name)
    }

    /// Store a batch of values and notify affected instances.
    pub fn set<I, K, V>(&self, updates: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.dispatch(collect_patch(updates), None)
    }

    /// Like [`set`](Self::set), running `on_complete` once every notified
    /// instance has applied its patch.
    ///
    /// If no instance is affected and no other delivery is in progress,
    /// `on_complete` runs before this returns. It does not run if the batch
    /// is rejected.
    pub fn set_with<I, K, V, F>(&self, updates: I, on_complete: F) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
        F: FnOnce() + Send + 'static,
    {
        self.dispatch(collect_patch(updates), Some(Box::new(on_complete)))
    }

    /// Serialize `value` and store it under `name`.
    pub fn set_as<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Encode {
            name: name.to_string(),
            source,
        })?;
        self.set([(name, value)])
    }

    /// Replace the value of `name` with `f` applied to its current value.
    ///
    /// Reading, computing and storing happen in one critical section, so
    /// concurrent updates of the same variable are never lost. `f` runs with
    /// the store locked and must not call back into the store.
    pub fn update<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce(&Value) -> Value,
    {
        let drain = {
            let mut state = self.state.lock();
            let next = f(state.variables.get_value(name)?);
            state.store_batch(Patch::from([(name.to_string(), next)]), None)?
        };
        if drain {
            self.drain();
        }
        Ok(())
    }

    fn dispatch(&self, updates: Patch, on_complete: Option<OnComplete>) -> Result<()> {
        let drain = self.state.lock().store_batch(updates, on_complete)?;
        if drain {
            self.drain();
        }
        Ok(())
    }

    /// Deliver queued dispatches until the queue is empty.
    fn drain(&self) {
        let _guard = DrainGuard(self);
        loop {
            let next = {
                let mut state = self.state.lock();
                match state.deliveries.pop_front() {
                    Some(dispatch) => dispatch,
                    None => {
                        state.delivering = false;
                        return;
                    }
                }
            };
            next.deliver();
        }
    }

    /// Wrap `component` so its instances observe `names`.
    ///
    /// Each call creates a new registration. Names without an entry get an
    /// empty placeholder, which `set` may then update under any policy.
    pub fn subscribe<C, I, S>(&self, component: C, names: I) -> Subscribed<C>
    where
        C: Component,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (registration, names) = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let id = state.registry.register_component(&mut state.variables, names);
            let names: Vec<String> =
                state.registry.registration(id).names().iter().cloned().collect();
            (id, names)
        };

        debug!(registration = registration.raw(), ?names, "component subscribed");
        Subscribed::new(self.clone(), registration, names, component)
    }

    /// Register a new instance of `registration`.
    ///
    /// `make` receives the current values of the subscribed names and builds
    /// the instance handle. Seeding and registration happen in one critical
    /// section so no update can slip in between.
    pub(crate) fn attach<T, F>(&self, registration: RegistrationId, make: F) -> (InstanceId, Arc<T>)
    where
        T: UiInstance + 'static,
        F: FnOnce(Patch) -> Arc<T>,
    {
        let mut state = self.state.lock();
        let state = &mut *state;
        let seed = state
            .variables
            .values_of(state.registry.registration(registration).names());
        let handle = make(seed);
        let instance = state.registry.register_instance(registration, handle.clone());
        (instance, handle)
    }

    /// Remove an instance from its registration.
    pub(crate) fn detach(&self, registration: RegistrationId, instance: InstanceId) -> bool {
        self.state.lock().registry.unregister_instance(registration, instance)
    }

    /// Number of mounted instances of `registration`.
    pub(crate) fn instance_count(&self, registration: RegistrationId) -> usize {
        self.state
            .lock()
            .registry
            .registration(registration)
            .instance_count()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_lock() {
            Some(state) => f
                .debug_struct("Store")
                .field("config", &state.config)
                .field("variables", &state.variables.snapshot())
                .finish(),
            None => write!(f, "Store(<locked>)"),
        }
    }
}

fn collect_patch<I, K, V>(pairs: I) -> Patch
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn get_after_set() {
        let store = Store::new([("count", json!(0))]);
        store.set([("count", json!(5))]).unwrap();
        assert_eq!(store.get("count").unwrap(), json!(5));
    }

    #[test]
    fn get_unknown_fails() {
        let store = Store::new([("count", json!(0))]);
        assert!(matches!(
            store.get("missing"),
            Err(StoreError::UnknownVariable { name }) if name == "missing"
        ));
    }

    #[test]
    fn strict_set_rejects_unknown_names() {
        let store = Store::new([("a", json!(1))]);
        let err = store.set([("a", json!(2)), ("b", json!(3))]).unwrap_err();

        assert_eq!(err.variable(), "b");
        // Nothing from the rejected batch is stored.
        assert_eq!(store.get("a").unwrap(), json!(1));
        assert!(!store.contains("b"));
    }

    #[test]
    fn rejected_batch_skips_completion() {
        let store = Store::empty();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result = store.set_with([("ghost", json!(1))], move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn permissive_set_creates_until_subscribed() {
        let store = Store::with_config([("a", json!(1))], StoreConfig::permissive());
        store.set([("fresh", json!(true))]).unwrap();
        assert_eq!(store.get("fresh").unwrap(), json!(true));

        let _wrapper = store.subscribe(crate::ui::component(|_| ()), ["a"]);
        assert!(store.set([("later", json!(1))]).is_err());
        assert!(store.set([("fresh", json!(false))]).is_ok());
    }

    #[test]
    fn subscribe_creates_writable_placeholder() {
        let store = Store::empty();
        let _wrapper = store.subscribe(crate::ui::component(|_| ()), ["pending"]);

        assert!(store.contains("pending"));
        assert!(store.get("pending").is_err());
        assert_eq!(store.subscriber_count("pending"), 1);

        store.set([("pending", json!("ready"))]).unwrap();
        assert_eq!(store.get("pending").unwrap(), json!("ready"));
    }

    #[test]
    fn set_without_subscribers_completes_immediately() {
        let store = Store::new([("x", json!(0))]);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        store
            .set_with([("x", json!(1))], move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("x").unwrap(), json!(1));
    }

    #[test]
    fn update_applies_function() {
        let store = Store::new([("count", json!(10))]);
        store
            .update("count", |value| json!(value.as_i64().unwrap_or_default() + 5))
            .unwrap();
        assert_eq!(store.get("count").unwrap(), json!(15));
        assert!(store.update("missing", |value| value.clone()).is_err());
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let store = Store::new([("count", json!(0))]);

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..2000 {
                        store
                            .update("count", |value| json!(value.as_i64().unwrap_or_default() + 1))
                            .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(store.get("count").unwrap(), json!(16000));
    }

    #[test]
    fn delivery_queue_is_idle_after_each_set() {
        let store = Store::new([("x", json!(0))]);
        store.set([("x", json!(1))]).unwrap();
        store.update("x", |value| value.clone()).unwrap();

        let state = store.state.lock();
        assert!(state.deliveries.is_empty());
        assert!(!state.delivering);
    }

    #[test]
    fn typed_access() {
        let store = Store::new([("tags", json!([]))]);
        store.set_as("tags", &["a", "b"]).unwrap();

        let tags: Vec<String> = store.get_as("tags").unwrap();
        assert_eq!(tags, vec!["a", "b"]);

        let err = store.get_as::<u32>("tags").unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }

    #[test]
    fn names_and_snapshot() {
        let store = Store::new([("a", json!(1)), ("b", json!(2))]);
        let _wrapper = store.subscribe(crate::ui::component(|_| ()), ["c"]);

        assert_eq!(store.names(), vec!["a", "b", "c"]);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["b"], json!(2));
    }

    #[test]
    fn clones_share_state() {
        let store = Store::new([("a", json!(1))]);
        let other = store.clone();
        other.set([("a", json!(2))]).unwrap();
        assert_eq!(store.get("a").unwrap(), json!(2));
    }
}
