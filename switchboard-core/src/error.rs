//! Error types for store operations.

use thiserror::Error;

/// Errors raised by [`Store`](crate::store::Store) operations.
///
/// All errors are raised synchronously and indicate a wiring bug in the
/// caller (reading a variable nobody declared, updating a name that was
/// never initialized). They are never recovered internally.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The variable has no entry, or has an entry that was never given a value.
    #[error("unknown variable `{name}`")]
    UnknownVariable { name: String },

    /// A stored value could not be converted to the requested type.
    #[error("variable `{name}` does not hold the requested type")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// A typed value could not be converted into a stored value.
    #[error("value for variable `{name}` could not be encoded")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownVariable { name: name.into() }
    }

    /// Name of the variable the error refers to.
    pub fn variable(&self) -> &str {
        match self {
            Self::UnknownVariable { name }
            | Self::Decode { name, .. }
            | Self::Encode { name, .. } => name,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
