//! Subscription Registry
//!
//! Registrations live in an arena indexed by [`RegistrationId`]. Each
//! registration is one subscribing component type and owns the handles of
//! its currently mounted instances, keyed by [`InstanceId`].

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use super::variables::VariableStore;
use crate::ui::UiInstance;

/// Identifier of one subscribing component type within a store.
///
/// Only the registry hands these out, and registrations are never removed,
/// so an id always addresses a live registration of the store that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(usize);

impl RegistrationId {
    /// Get the raw arena index.
    pub fn raw(&self) -> usize {
        self.0
    }
}

#[cfg(test)]
impl From<usize> for RegistrationId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

/// Identifier of one mounted instance within its registration.
///
/// Ids are assigned from a per-registration counter and are never reused,
/// so a stale id can never address a newer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Get the raw counter value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared handle to a mounted instance.
pub(crate) type InstanceHandle = Arc<dyn UiInstance>;

/// One subscribing component type.
pub(crate) struct ComponentRegistration {
    names: IndexSet<String>,
    instances: IndexMap<InstanceId, InstanceHandle>,
    next_instance_id: u64,
}

impl ComponentRegistration {
    fn new(names: IndexSet<String>) -> Self {
        Self {
            names,
            instances: IndexMap::new(),
            next_instance_id: 0,
        }
    }

    /// Names this registration subscribed to, in declaration order.
    pub fn names(&self) -> &IndexSet<String> {
        &self.names
    }

    pub fn is_subscribed(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Clone the handles of every live instance.
    ///
    /// Dispatch works from this snapshot so instances may unmount while
    /// their patch is being delivered.
    pub fn snapshot_instances(&self) -> Vec<(InstanceId, InstanceHandle)> {
        self.instances
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect()
    }
}

impl fmt::Debug for ComponentRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistration")
            .field("names", &self.names)
            .field("instances", &self.instances.keys().collect::<Vec<_>>())
            .field("next_instance_id", &self.next_instance_id)
            .finish()
    }
}

/// Arena of component registrations.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    registrations: Vec<ComponentRegistration>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any component has subscribed yet.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Register a component subscribing to `names`.
    ///
    /// Every name gets a variable entry (an empty placeholder if needed) and
    /// the new registration is added to each entry's subscriber set.
    pub fn register_component<I, S>(
        &mut self,
        variables: &mut VariableStore,
        names: I,
    ) -> RegistrationId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = RegistrationId(self.registrations.len());
        let names: IndexSet<String> = names.into_iter().map(Into::into).collect();

        for name in &names {
            variables.add_subscriber(name, id);
        }

        self.registrations.push(ComponentRegistration::new(names));
        id
    }

    pub fn registration(&self, id: RegistrationId) -> &ComponentRegistration {
        &self.registrations[id.0]
    }

    /// Store `handle` under a fresh instance id.
    pub fn register_instance(&mut self, id: RegistrationId, handle: InstanceHandle) -> InstanceId {
        let registration = &mut self.registrations[id.0];
        let instance_id = InstanceId(registration.next_instance_id);
        registration.next_instance_id += 1;
        registration.instances.insert(instance_id, handle);
        instance_id
    }

    /// Remove an instance handle. Returns whether the instance was mounted.
    pub fn unregister_instance(&mut self, id: RegistrationId, instance: InstanceId) -> bool {
        self.registrations[id.0]
            .instances
            .shift_remove(&instance)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Applied, Patch};

    struct Silent;

    impl UiInstance for Silent {
        fn apply_state(&self, _patch: Patch, applied: Applied) {
            applied.finish();
        }
    }

    #[test]
    fn register_component_creates_placeholders() {
        let mut variables = VariableStore::new();
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.is_empty());

        let id = registry.register_component(&mut variables, ["a", "b", "a"]);

        assert!(!registry.is_empty());
        assert!(variables.contains("a"));
        assert!(variables.contains("b"));
        assert_eq!(variables.subscribers("a").collect::<Vec<_>>(), vec![id]);

        let registration = registry.registration(id);
        assert_eq!(registration.names().len(), 2);
        assert!(registration.is_subscribed("b"));
        assert!(!registration.is_subscribed("c"));
    }

    #[test]
    fn registration_ids_are_distinct() {
        let mut variables = VariableStore::new();
        let mut registry = SubscriptionRegistry::new();

        let first = registry.register_component(&mut variables, ["x"]);
        let second = registry.register_component(&mut variables, ["x"]);

        assert_ne!(first, second);
        assert_eq!(variables.subscriber_count("x"), 2);
    }

    #[test]
    fn instance_ids_are_never_reused() {
        let mut variables = VariableStore::new();
        let mut registry = SubscriptionRegistry::new();
        let id = registry.register_component(&mut variables, ["x"]);

        let first = registry.register_instance(id, Arc::new(Silent));
        assert!(registry.unregister_instance(id, first));
        let second = registry.register_instance(id, Arc::new(Silent));

        assert_ne!(first, second);
        assert!(second > first);
        assert_eq!(registry.registration(id).instance_count(), 1);
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut variables = VariableStore::new();
        let mut registry = SubscriptionRegistry::new();
        let id = registry.register_component(&mut variables, ["x"]);
        let instance = registry.register_instance(id, Arc::new(Silent));

        assert!(registry.unregister_instance(id, instance));
        assert!(!registry.unregister_instance(id, instance));
    }

    #[test]
    fn snapshot_survives_unregistration() {
        let mut variables = VariableStore::new();
        let mut registry = SubscriptionRegistry::new();
        let id = registry.register_component(&mut variables, ["x"]);
        let instance = registry.register_instance(id, Arc::new(Silent));

        let snapshot = registry.registration(id).snapshot_instances();
        registry.unregister_instance(id, instance);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, instance);
        assert_eq!(registry.registration(id).instance_count(), 0);
    }
}
