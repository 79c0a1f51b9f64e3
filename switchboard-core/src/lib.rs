//! Switchboard Core
//!
//! This crate provides a small publish/subscribe variable store for
//! component-based UI frameworks. Independent parts of a UI observe named
//! variables in a shared store and re-render when those variables change,
//! without routing updates through a central dispatcher or a chain of props.
//!
//! # Architecture
//!
//! The crate is organized into a few modules:
//!
//! - `store`: variables, the subscription registry and update dispatch
//! - `ui`: the boundary to the hosting UI framework and the subscriber wrapper
//! - `config`: store configuration
//! - `error`: error types
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use switchboard_core::store::Store;
//! use switchboard_core::ui::{component, Component, ComponentInstance, ImmediateHost, Props};
//!
//! let store = Store::new([("count", json!(0))]);
//!
//! // Wrap a component so it observes `count`
//! let counter = store.subscribe(
//!     component(|props: &Props| format!("count = {}", props["count"])),
//!     ["count"],
//! );
//! let instance = counter.mount(&ImmediateHost::shared());
//! assert_eq!(instance.render(&Props::new()), "count = 0");
//!
//! // Update the variable; the mounted instance sees the new value
//! store.set([("count", json!(5))]).unwrap();
//! assert_eq!(instance.render(&Props::new()), "count = 5");
//! ```

pub mod config;
pub mod error;
pub mod store;
pub mod ui;

pub use config::{StoreConfig, UnknownVariablePolicy};
pub use error::{Result, StoreError};
pub use store::{Applied, InstanceId, Patch, RegistrationId, Store, Value};
