//! Subscriber Wrapper
//!
//! [`Subscribed`] wraps a component so each of its mounted instances
//! observes a set of store variables.
//!
//! # Lifecycle
//!
//! 1. `mount` registers a new instance with the store and seeds its state
//!    with the current values of the subscribed names, in one critical
//!    section, then mounts the inner component.
//!
//! 2. Every patch the store delivers is merged into that state and a
//!    re-render is requested from the host.
//!
//! 3. `render` merges the state over the external props and renders the
//!    inner instance with the result.
//!
//! 4. Dropping the instance unregisters it before the inner instance is
//!    dropped, so it never receives another patch. A patch already in
//!    flight when it unmounts only settles its completion token.
//!
//! # Precedence
//!
//! State wins over external props of the same name. When wrappers are
//! chained (a `Subscribed` wrapping another `Subscribed`, possibly for a
//! different store), each layer merges its state over the props it received
//! and hands the result inward. The innermost wrapper merges last, so on a
//! name collision the value from the wrapper closest to the final render
//! wins.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{Component, ComponentInstance, Props, RenderHost, UiInstance};
use crate::store::{Applied, InstanceId, Patch, RegistrationId, Store};

/// A component whose instances observe store variables.
///
/// Created by [`Store::subscribe`].
pub struct Subscribed<C> {
    store: Store,
    registration: RegistrationId,
    names: Vec<String>,
    inner: C,
}

impl<C> Subscribed<C> {
    pub(crate) fn new(
        store: Store,
        registration: RegistrationId,
        names: Vec<String>,
        inner: C,
    ) -> Self {
        Self {
            store,
            registration,
            names,
            inner,
        }
    }

    /// The subscribed variable names, in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The store registration shared by every instance of this wrapper.
    pub fn registration(&self) -> RegistrationId {
        self.registration
    }

    /// Number of currently mounted instances.
    pub fn instance_count(&self) -> usize {
        self.store.instance_count(self.registration)
    }

    /// The wrapped component.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Component> Component for Subscribed<C> {
    type Node = C::Node;
    type Instance = SubscribedInstance<C::Instance>;

    fn mount(&self, host: &Arc<dyn RenderHost>) -> Self::Instance {
        let (id, state) = self.store.attach(self.registration, |seed| {
            Arc::new(InstanceState {
                state: Mutex::new(seed),
                mounted: AtomicBool::new(true),
                host: Arc::clone(host),
            })
        });

        debug!(registration = self.registration.raw(), instance = %id, "instance mounted");

        SubscribedInstance {
            store: self.store.clone(),
            registration: self.registration,
            id,
            state,
            inner: self.inner.mount(host),
        }
    }
}

impl<C> fmt::Debug for Subscribed<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribed")
            .field("registration", &self.registration)
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

/// The part of a mounted wrapper instance the store holds on to.
struct InstanceState {
    state: Mutex<Patch>,
    /// Cleared on unmount. Deliveries planned before that are dropped.
    mounted: AtomicBool,
    host: Arc<dyn RenderHost>,
}

impl UiInstance for InstanceState {
    fn apply_state(&self, patch: Patch, applied: Applied) {
        if !self.mounted.load(Ordering::Acquire) {
            applied.finish();
            return;
        }
        self.state.lock().extend(patch);
        self.host.request_render(applied);
    }
}

/// A mounted [`Subscribed`] component.
pub struct SubscribedInstance<I> {
    store: Store,
    registration: RegistrationId,
    id: InstanceId,
    state: Arc<InstanceState>,
    inner: I,
}

impl<I> SubscribedInstance<I> {
    /// Id of this instance within its registration.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// The store values this instance currently sees.
    pub fn state(&self) -> Patch {
        self.state.state.lock().clone()
    }

    /// External props with this instance's state merged over them.
    pub fn merged_props(&self, props: &Props) -> Props {
        let mut merged = props.clone();
        let state = self.state.state.lock();
        merged.extend(state.iter().map(|(name, value)| (name.clone(), value.clone())));
        merged
    }

    /// The mounted inner component instance.
    pub fn inner(&self) -> &I {
        &self.inner
    }
}

impl<I: ComponentInstance> ComponentInstance for SubscribedInstance<I> {
    type Node = I::Node;

    fn render(&self, props: &Props) -> I::Node {
        self.inner.render(&self.merged_props(props))
    }
}

impl<I> Drop for SubscribedInstance<I> {
    fn drop(&mut self) {
        self.state.mounted.store(false, Ordering::Release);
        if self.store.detach(self.registration, self.id) {
            debug!(
                registration = self.registration.raw(),
                instance = %self.id,
                "instance unmounted"
            );
        }
    }
}

impl<I> fmt::Debug for SubscribedInstance<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribedInstance")
            .field("registration", &self.registration)
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
