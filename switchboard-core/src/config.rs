//! Store Configuration
//!
//! Configuration is plain data so it can be embedded in an application's own
//! settings file and deserialized alongside it.

use serde::{Deserialize, Serialize};

/// How `set` treats a variable name that has no entry yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownVariablePolicy {
    /// Every variable must exist before it is updated, either from the
    /// initial values given at construction or from a `subscribe` call.
    #[default]
    Strict,

    /// `set` may create new entries as long as no component has subscribed
    /// to the store yet. Once the first subscription happens this behaves
    /// like [`Strict`](Self::Strict).
    CreateUntilSubscribed,
}

/// Configuration for a [`Store`](crate::store::Store).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Policy for updates naming variables without an entry.
    pub unknown_variables: UnknownVariablePolicy,
}

impl StoreConfig {
    /// Configuration that lets `set` create variables before the first subscription.
    pub fn permissive() -> Self {
        Self {
            unknown_variables: UnknownVariablePolicy::CreateUntilSubscribed,
        }
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Whether `set` may create an entry for an unknown name right now.
    pub(crate) fn allows_creation(&self, subscribed: bool) -> bool {
        match self.unknown_variables {
            UnknownVariablePolicy::Strict => false,
            UnknownVariablePolicy::CreateUntilSubscribed => !subscribed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_strict() {
        let config = StoreConfig::default();
        assert_eq!(config.unknown_variables, UnknownVariablePolicy::Strict);
        assert!(!config.allows_creation(false));
        assert!(!config.allows_creation(true));
    }

    #[test]
    fn permissive_creates_only_before_subscription() {
        let config = StoreConfig::permissive();
        assert!(config.allows_creation(false));
        assert!(!config.allows_creation(true));
    }

    #[test]
    fn parse_from_json() {
        let json = r#"{"unknown_variables": "create_until_subscribed"}"#;
        let config = StoreConfig::from_json(json).unwrap();
        assert_eq!(config, StoreConfig::permissive());

        let empty = StoreConfig::from_json("{}").unwrap();
        assert_eq!(empty, StoreConfig::default());
    }

    #[test]
    fn reject_unknown_policy() {
        assert!(StoreConfig::from_json(r#"{"unknown_variables": "lenient"}"#).is_err());
    }
}
