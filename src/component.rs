//! Stateful component capability objects
//!
//! A [`ComponentType`] is the definition (name, initial state, render
//! closure); a [`ComponentHandle`] is one mounted occurrence of it, owning the
//! props and state that survive re-renders. Handles are built by the engine
//! with their updater already wired in, so `set_state` always knows which
//! engine and which instance to re-reconcile.
//!
//! Calling `set_state` while a reconciliation pass is running (from inside a
//! render closure, or from a host side effect triggered by a patch) is
//! forbidden and rejected with [`ReconcileError::ReentrantUpdate`].
use crate::converters::value_to_state;
use crate::errors::ReconcileError;
use crate::types::{next_id, ComponentId, Element, Props};
use serde_json::{Map, Value};
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Component state: a JSON object, shallow-merged by `set_state`.
pub type State = Map<String, Value>;

/// Engine-side capability a handle uses to re-render itself.
pub(crate) trait Updater {
    fn is_reconciling(&self) -> bool;
    fn rerender(&self, id: ComponentId) -> Result<(), ReconcileError>;
}

type RenderFn = dyn Fn(&ComponentHandle) -> Option<Element>;
type InitialStateFn = dyn Fn(&Props) -> State;

struct ComponentDef {
    name: String,
    initial_state: Option<Box<InitialStateFn>>,
    render: Box<RenderFn>,
}

/// Component definition. Two element kinds refer to the same component only
/// if they hold clones of the same `ComponentType`.
#[derive(Clone)]
pub struct ComponentType(Rc<ComponentDef>);

impl ComponentType {
    /// A component whose state starts out empty.
    pub fn new(
        name: impl Into<String>,
        render: impl Fn(&ComponentHandle) -> Option<Element> + 'static,
    ) -> Self {
        ComponentType(Rc::new(ComponentDef {
            name: name.into(),
            initial_state: None,
            render: Box::new(render),
        }))
    }

    /// A component whose initial state is derived from its first props.
    pub fn with_state(
        name: impl Into<String>,
        initial_state: impl Fn(&Props) -> State + 'static,
        render: impl Fn(&ComponentHandle) -> Option<Element> + 'static,
    ) -> Self {
        ComponentType(Rc::new(ComponentDef {
            name: name.into(),
            initial_state: Some(Box::new(initial_state)),
            render: Box::new(render),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentType({})", self.0.name)
    }
}

struct ComponentCell {
    id: ComponentId,
    ty: ComponentType,
    props: RefCell<Props>,
    state: RefCell<State>,
    /// State changed since the last successfully applied render.
    dirty: Cell<bool>,
    updater: Weak<dyn Updater>,
}

/// One mounted component: its props, its state, and the way back to the
/// engine that owns its instance.
#[derive(Clone)]
pub struct ComponentHandle(Rc<ComponentCell>);

impl ComponentHandle {
    pub(crate) fn construct(ty: &ComponentType, props: Props, updater: Weak<dyn Updater>) -> Self {
        let state = match &ty.0.initial_state {
            Some(init) => init(&props),
            None => State::new(),
        };
        ComponentHandle(Rc::new(ComponentCell {
            id: next_id(),
            ty: ty.clone(),
            props: RefCell::new(props),
            state: RefCell::new(state),
            dirty: Cell::new(false),
            updater,
        }))
    }

    pub fn id(&self) -> ComponentId {
        self.0.id
    }

    pub fn component_type(&self) -> &ComponentType {
        &self.0.ty
    }

    pub fn name(&self) -> &str {
        self.0.ty.name()
    }

    pub fn props(&self) -> Ref<'_, Props> {
        self.0.props.borrow()
    }

    pub fn state(&self) -> Ref<'_, State> {
        self.0.state.borrow()
    }

    pub fn state_value(&self, key: &str) -> Option<Value> {
        self.0.state.borrow().get(key).cloned()
    }

    pub(crate) fn set_props(&self, props: Props) {
        *self.0.props.borrow_mut() = props;
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }

    pub(crate) fn mark_clean(&self) {
        self.0.dirty.set(false);
    }

    pub(crate) fn render(&self) -> Result<Element, ReconcileError> {
        (self.0.ty.0.render)(self).ok_or_else(|| ReconcileError::MissingRenderResult {
            component: self.name().to_string(),
        })
    }

    /// Shallow-merges `partial` (a JSON object) into the state, then
    /// synchronously re-reconciles this component's subtree.
    pub fn set_state(&self, partial: Value) -> Result<(), ReconcileError> {
        let partial = value_to_state(partial)?;
        let updater = self.0.updater.upgrade();

        if updater.as_ref().is_some_and(|u| u.is_reconciling()) {
            return Err(ReconcileError::ReentrantUpdate {
                component: self.name().to_string(),
            });
        }

        self.0.state.borrow_mut().extend(partial);
        self.0.dirty.set(true);

        match updater {
            Some(updater) => updater.rerender(self.id()),
            None => {
                log::warn!("set_state on '{}' ({}) after its renderer was dropped", self.name(), self.id());
                Ok(())
            }
        }
    }

    /// `set_state` with a partial computed from the current state.
    pub fn update_state(&self, f: impl FnOnce(&State) -> Value) -> Result<(), ReconcileError> {
        let partial = f(&self.state());
        self.set_state(partial)
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("id", &self.0.id)
            .field("type", &self.0.ty.name())
            .field("state", &self.0.state.borrow())
            .finish()
    }
}
