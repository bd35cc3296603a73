//! Element-tree reconciliation engine
//!
//! Declarative element trees go in, incremental mutations against a stateful
//! host tree come out. Host nodes are reused whenever the element kind at a
//! position stays the same; children are matched by index.
//!
//! ```
//! use vdom_reconciler::{children, create_element, MemoryHost, Props, Renderer};
//!
//! let mut host = MemoryHost::new();
//! let container = host.create_container();
//! let renderer = Renderer::new(host);
//! let mut root = renderer.create_root(container);
//!
//! root.render(create_element("p", Some(Props::new().set("id", "greeting")), children!["Hello"]))?;
//! assert_eq!(renderer.host().to_html(container), r#"<p id="greeting">Hello</p>"#);
//! # Ok::<(), vdom_reconciler::ReconcileError>(())
//! ```
//!
//! Everything runs synchronously on the calling thread. A `set_state` issued
//! while a pass is already running is rejected, never interleaved.
mod component;
mod config;
mod converters;
mod diff_engine;
mod errors;
mod host;
mod html_generator;
mod memory_host;
mod patcher;
mod types;

pub use component::{ComponentHandle, ComponentType, State};
pub use config::ReconcilerConfig;
pub use converters::{props_to_json, value_to_state, value_to_text};
pub use errors::{HostError, ReconcileError};
pub use host::Host;
pub use memory_host::{MemoryHost, Mutation, MutationKind, NodeId};
pub use types::{
    create_element, event_type_for, is_listener_key, is_regular_key, text_element, Child,
    ComponentId, Element, ElementKind, Event, EventHandler, PropValue, Props, NODE_VALUE,
    TEXT_ELEMENT,
};

use diff_engine::{DiffEngine, InstanceRef};
use std::cell::{Ref, RefMut};
use std::rc::Rc;

/// Owns a host and the engine state shared by every root rendered into it.
pub struct Renderer<H: Host + 'static> {
    engine: Rc<DiffEngine<H>>,
}

impl<H: Host + 'static> Renderer<H> {
    pub fn new(host: H) -> Self {
        Self::with_config(host, ReconcilerConfig::default())
    }

    pub fn with_config(host: H, config: ReconcilerConfig) -> Self {
        log::info!("Reconciler initialized (strict_tags: {})", config.strict_tags);
        Renderer {
            engine: DiffEngine::new(host, config),
        }
    }

    /// A root that renders into `container`. The caller owns the handle.
    pub fn create_root(&self, container: H::Node) -> Root<H> {
        Root {
            engine: self.engine.clone(),
            container,
            current: None,
        }
    }

    pub fn host(&self) -> Ref<'_, H> {
        self.engine.host()
    }

    /// Direct host access. Must not be held across `render`/`set_state`.
    pub fn host_mut(&self) -> RefMut<'_, H> {
        self.engine.host_mut()
    }

    pub fn config(&self) -> &ReconcilerConfig {
        self.engine.config()
    }

    /// Completed reconciliation passes (root renders and component re-renders).
    pub fn pass_count(&self) -> u64 {
        self.engine.pass_count()
    }

    pub fn mounted_components(&self) -> usize {
        self.engine.mounted_components()
    }
}

/// Single-root coordinator: remembers what was rendered into one container.
pub struct Root<H: Host + 'static> {
    engine: Rc<DiffEngine<H>>,
    container: H::Node,
    current: Option<InstanceRef<H>>,
}

impl<H: Host + 'static> Root<H> {
    /// Reconciles `element` against the previous render into this root.
    ///
    /// On error the host keeps whatever mutations were applied before the
    /// failure; there is no rollback.
    pub fn render(&mut self, element: Element) -> Result<(), ReconcileError> {
        log::debug!("Root: render {:?}", element.kind());
        let previous = self.current.clone();
        let next = self.engine.run_pass("root", || {
            self.engine
                .reconcile(&self.container, previous, Some(element), None)
        })?;
        self.current = next;
        Ok(())
    }

    /// Removes everything this root rendered.
    pub fn unmount(&mut self) -> Result<(), ReconcileError> {
        let Some(previous) = self.current.clone() else {
            return Ok(());
        };
        log::debug!("Root: unmount");
        self.engine.run_pass("root", || {
            self.engine
                .reconcile(&self.container, Some(previous), None, None)
        })?;
        self.current = None;
        Ok(())
    }

    pub fn container(&self) -> &H::Node {
        &self.container
    }

    pub fn is_mounted(&self) -> bool {
        self.current.is_some()
    }

    /// Host node currently produced by the top element.
    pub fn host_node(&self) -> Option<H::Node> {
        self.current.as_ref().map(|i| i.borrow().host_node.clone())
    }

    /// Handle of the top element when it is a component.
    pub fn component(&self) -> Option<ComponentHandle> {
        self.current
            .as_ref()
            .and_then(|i| i.borrow().component().cloned())
    }
}
