//! UI Boundary
//!
//! The store never renders anything itself. It talks to the hosting UI
//! framework through a handful of small traits:
//!
//! - [`UiInstance`]: a mounted instance that can be told to apply a patch.
//! - [`RenderHost`]: the framework's scheduler, asked to re-render after a
//!   patch has been applied to an instance's state.
//! - [`Component`] / [`ComponentInstance`]: a component type that can be
//!   mounted, and a mounted instance that renders from props.
//!
//! [`Subscribed`] is the wrapper component produced by
//! [`Store::subscribe`](crate::store::Store::subscribe). It bridges store
//! notifications into the props of the component it wraps.

mod component;
mod host;
mod wrapper;

pub use component::{component, Component, ComponentInstance, FnComponent, FnInstance};
pub use host::{BatchedHost, ImmediateHost, RenderHost};
pub use wrapper::{Subscribed, SubscribedInstance};

use crate::store::{Applied, Patch};

/// Properties passed to a component when it renders.
pub type Props = Patch;

/// A mounted instance that receives state patches from a store.
///
/// `apply_state` may defer the actual re-render. The instance must finish
/// (or drop) `applied` once the patch is visible; the store's completion
/// callback waits for that.
pub trait UiInstance: Send + Sync {
    /// Merge `patch` into the instance's state.
    fn apply_state(&self, patch: Patch, applied: Applied);
}
