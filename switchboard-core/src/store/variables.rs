//! Variable Store
//!
//! Maps variable names to their current value and to the registrations
//! subscribed to them. Entries are created by construction, by `subscribe`,
//! or (under the permissive policy) by `set`, and are never removed.

use indexmap::{IndexMap, IndexSet};

use super::registry::RegistrationId;
use super::{Patch, Value};
use crate::error::{Result, StoreError};

/// One variable slot.
#[derive(Debug, Default)]
pub(crate) struct VariableEntry {
    /// `None` until the variable is first given a value.
    value: Option<Value>,
    /// Registrations subscribed to this variable, in subscription order.
    subscribers: IndexSet<RegistrationId>,
}

/// Name-indexed collection of variable entries.
#[derive(Debug, Default)]
pub(crate) struct VariableStore {
    entries: IndexMap<String, VariableEntry>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed entries with initial values. Always creates missing entries.
    pub fn initialize(&mut self, initial: Patch) {
        for (name, value) in initial {
            self.entries.entry(name).or_default().value = Some(value);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Check that `name` may be written, without mutating anything.
    pub fn check_writable(&self, name: &str, may_create: bool) -> Result<()> {
        if may_create || self.contains(name) {
            Ok(())
        } else {
            Err(StoreError::unknown(name))
        }
    }

    /// Store a value, creating the entry if needed.
    ///
    /// Callers validate with [`check_writable`](Self::check_writable) first.
    pub fn set_value(&mut self, name: &str, value: Value) {
        match self.entries.get_mut(name) {
            Some(entry) => entry.value = Some(value),
            None => {
                self.entries.insert(
                    name.to_string(),
                    VariableEntry {
                        value: Some(value),
                        subscribers: IndexSet::new(),
                    },
                );
            }
        }
    }

    /// Current value of `name`. Placeholders without a value count as unknown.
    pub fn get_value(&self, name: &str) -> Result<&Value> {
        self.entries
            .get(name)
            .and_then(|entry| entry.value.as_ref())
            .ok_or_else(|| StoreError::unknown(name))
    }

    /// Add `registration` to the subscriber set of `name`, creating an empty
    /// placeholder entry if the variable does not exist yet.
    pub fn add_subscriber(&mut self, name: &str, registration: RegistrationId) {
        if !self.entries.contains_key(name) {
            self.entries.insert(name.to_string(), VariableEntry::default());
        }
        if let Some(entry) = self.entries.get_mut(name) {
            entry.subscribers.insert(registration);
        }
    }

    /// Registrations subscribed to `name`.
    pub fn subscribers(&self, name: &str) -> impl Iterator<Item = RegistrationId> + '_ {
        self.entries
            .get(name)
            .into_iter()
            .flat_map(|entry| entry.subscribers.iter().copied())
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.entries
            .get(name)
            .map_or(0, |entry| entry.subscribers.len())
    }

    /// The already-set values among `names`.
    pub fn values_of<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> Patch {
        names
            .into_iter()
            .filter_map(|name| {
                let value = self.entries.get(name)?.value.as_ref()?;
                Some((name.clone(), value.clone()))
            })
            .collect()
    }

    /// All variable names, including placeholders, in creation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Every variable that currently holds a value.
    pub fn snapshot(&self) -> Patch {
        self.entries
            .iter()
            .filter_map(|(name, entry)| Some((name.clone(), entry.value.clone()?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> VariableStore {
        let mut store = VariableStore::new();
        store.initialize(Patch::from([("count".to_string(), json!(0))]));
        store
    }

    #[test]
    fn initialize_creates_entries() {
        let store = seeded();
        assert!(store.contains("count"));
        assert_eq!(store.get_value("count").unwrap(), &json!(0));
    }

    #[test]
    fn get_unknown_fails() {
        let store = seeded();
        let err = store.get_value("missing").unwrap_err();
        assert_eq!(err.variable(), "missing");
    }

    #[test]
    fn placeholder_has_no_value() {
        let mut store = seeded();
        store.add_subscriber("later", RegistrationId::from(0));

        assert!(store.contains("later"));
        assert!(store.get_value("later").is_err());
        assert_eq!(store.subscriber_count("later"), 1);
        assert!(store.snapshot().get("later").is_none());
    }

    #[test]
    fn check_writable_respects_creation_flag() {
        let store = seeded();
        assert!(store.check_writable("count", false).is_ok());
        assert!(store.check_writable("fresh", false).is_err());
        assert!(store.check_writable("fresh", true).is_ok());
    }

    #[test]
    fn subscriber_sets_are_deduplicated() {
        let mut store = seeded();
        let registration = RegistrationId::from(3);
        store.add_subscriber("count", registration);
        store.add_subscriber("count", registration);

        assert_eq!(store.subscribers("count").collect::<Vec<_>>(), vec![registration]);
        assert_eq!(store.subscribers("missing").count(), 0);
    }

    #[test]
    fn values_of_skips_unset_names() {
        let mut store = seeded();
        store.add_subscriber("unset", RegistrationId::from(0));
        let names = vec!["count".to_string(), "unset".to_string(), "missing".to_string()];

        let values = store.values_of(&names);
        assert_eq!(values.len(), 1);
        assert_eq!(values["count"], json!(0));
    }
}
