//! Component capability of the hosting UI framework.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::{Props, RenderHost};

/// A component type: something that can be mounted any number of times.
pub trait Component: Send + Sync + 'static {
    /// What rendering produces (a virtual node, a string, ...).
    type Node;

    /// A mounted occurrence of this component.
    type Instance: ComponentInstance<Node = Self::Node>;

    /// Mount a new instance. `host` schedules re-renders for it.
    fn mount(&self, host: &Arc<dyn RenderHost>) -> Self::Instance;
}

/// A mounted component instance. Dropping it unmounts it.
pub trait ComponentInstance {
    type Node;

    /// Render with the given properties.
    fn render(&self, props: &Props) -> Self::Node;
}

/// A stateless component backed by a render function.
pub struct FnComponent<F, N> {
    render: Arc<F>,
    _node: PhantomData<fn() -> N>,
}

/// Wrap a render function as a [`Component`].
///
/// ```rust
/// use switchboard_core::ui::{component, Props};
///
/// let greeting = component(|props: &Props| {
///     format!("hello {}", props.get("name").and_then(|v| v.as_str()).unwrap_or("?"))
/// });
/// # let _ = greeting;
/// ```
pub fn component<F, N>(render: F) -> FnComponent<F, N>
where
    F: Fn(&Props) -> N + Send + Sync + 'static,
{
    FnComponent {
        render: Arc::new(render),
        _node: PhantomData,
    }
}

impl<F, N> Clone for FnComponent<F, N> {
    fn clone(&self) -> Self {
        Self {
            render: Arc::clone(&self.render),
            _node: PhantomData,
        }
    }
}

impl<F, N> fmt::Debug for FnComponent<F, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnComponent").finish_non_exhaustive()
    }
}

impl<F, N> Component for FnComponent<F, N>
where
    F: Fn(&Props) -> N + Send + Sync + 'static,
    N: 'static,
{
    type Node = N;
    type Instance = FnInstance<F, N>;

    fn mount(&self, _host: &Arc<dyn RenderHost>) -> Self::Instance {
        FnInstance {
            render: Arc::clone(&self.render),
            _node: PhantomData,
        }
    }
}

/// Mounted instance of an [`FnComponent`].
pub struct FnInstance<F, N> {
    render: Arc<F>,
    _node: PhantomData<fn() -> N>,
}

impl<F, N> ComponentInstance for FnInstance<F, N>
where
    F: Fn(&Props) -> N,
{
    type Node = N;

    fn render(&self, props: &Props) -> N {
        (self.render)(props)
    }
}
