//! Core reconciliation engine: positional element-tree diffing against a live instance tree
//!
//! `reconcile(parent, previous, next)` resolves one slot of the tree:
//!
//! 1. nothing before, element now: instantiate and append under `parent`
//! 2. instance before, nothing now: detach it and release its whole subtree
//! 3. kinds differ: release the old subtree, instantiate the new element and
//!    replace the old host node in place
//! 4. same host/text kind: patch properties, then children by index
//! 5. same component: hand over the new props, render, reconcile the child
//!
//! Passes are synchronous and never interleave; a request for a second pass
//! while one is running fails with `ReentrantUpdate`. A failing host call
//! aborts the pass and leaves whatever mutations already happened in place.
use crate::component::{ComponentHandle, ComponentType, Updater};
use crate::config::ReconcilerConfig;
use crate::converters::props_to_json;
use crate::errors::ReconcileError;
use crate::host::Host;
use crate::patcher::{clear_listeners, patch_properties, Listeners};
use crate::types::{ComponentId, Element, ElementKind, Props};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

pub(crate) type InstanceRef<H> = Rc<RefCell<Instance<H>>>;

pub(crate) enum Body<H: Host> {
    Host {
        child_instances: Vec<InstanceRef<H>>,
        listeners: Listeners,
    },
    Component {
        component: ComponentHandle,
        child_instance: InstanceRef<H>,
    },
}

/// Live record pairing an element with the host node it produced.
pub(crate) struct Instance<H: Host> {
    pub(crate) element: Element,
    /// For components, the host node of the rendered child.
    pub(crate) host_node: H::Node,
    pub(crate) host_parent: H::Node,
    pub(crate) body: Body<H>,
    /// Component whose render produced this instance.
    pub(crate) owner: Option<ComponentId>,
}

impl<H: Host> Instance<H> {
    pub(crate) fn component(&self) -> Option<&ComponentHandle> {
        match &self.body {
            Body::Component { component, .. } => Some(component),
            Body::Host { .. } => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn child_instances(&self) -> &[InstanceRef<H>] {
        match &self.body {
            Body::Host { child_instances, .. } => child_instances,
            Body::Component { .. } => &[],
        }
    }
}

/// Result of one positional child reconciliation before compaction.
enum Slot<H: Host> {
    Present(InstanceRef<H>),
    Absent,
}

struct PassGuard<'a>(&'a Cell<bool>);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub(crate) struct DiffEngine<H: Host> {
    host: RefCell<H>,
    config: ReconcilerConfig,
    components: RefCell<HashMap<ComponentId, Weak<RefCell<Instance<H>>>>>,
    reconciling: Cell<bool>,
    passes: Cell<u64>,
    this: Weak<DiffEngine<H>>,
}

impl<H: Host + 'static> DiffEngine<H> {
    pub(crate) fn new(host: H, config: ReconcilerConfig) -> Rc<Self> {
        Rc::new_cyclic(|this| DiffEngine {
            host: RefCell::new(host),
            config,
            components: RefCell::new(HashMap::new()),
            reconciling: Cell::new(false),
            passes: Cell::new(0),
            this: this.clone(),
        })
    }

    pub(crate) fn host(&self) -> Ref<'_, H> {
        self.host.borrow()
    }

    pub(crate) fn host_mut(&self) -> RefMut<'_, H> {
        self.host.borrow_mut()
    }

    pub(crate) fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub(crate) fn pass_count(&self) -> u64 {
        self.passes.get()
    }

    pub(crate) fn mounted_components(&self) -> usize {
        self.components
            .borrow()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Runs `f` as one reconciliation pass, refusing to nest passes.
    pub(crate) fn run_pass<T>(
        &self,
        label: &str,
        f: impl FnOnce() -> Result<T, ReconcileError>,
    ) -> Result<T, ReconcileError> {
        if self.reconciling.replace(true) {
            return Err(ReconcileError::ReentrantUpdate {
                component: label.to_string(),
            });
        }
        let _guard = PassGuard(&self.reconciling);
        let out = f().inspect_err(|_| self.prune_components())?;
        self.passes.set(self.passes.get() + 1);
        Ok(out)
    }

    /// Drops registry entries whose instance died with a failed pass.
    fn prune_components(&self) {
        self.components
            .borrow_mut()
            .retain(|_, instance| instance.strong_count() > 0);
    }

    pub(crate) fn reconcile(
        &self,
        parent: &H::Node,
        previous: Option<InstanceRef<H>>,
        next: Option<Element>,
        owner: Option<ComponentId>,
    ) -> Result<Option<InstanceRef<H>>, ReconcileError> {
        match (previous, next) {
            (None, None) => Ok(None),
            (Some(instance), None) => {
                log::debug!(
                    "DiffEngine: unmount {:?}",
                    instance.borrow().element.kind()
                );
                self.release(&instance, parent, true)?;
                Ok(None)
            }
            (previous, Some(element)) => self
                .reconcile_present(parent, previous, element, owner)
                .map(Some),
        }
    }

    fn reconcile_present(
        &self,
        parent: &H::Node,
        previous: Option<InstanceRef<H>>,
        element: Element,
        owner: Option<ComponentId>,
    ) -> Result<InstanceRef<H>, ReconcileError> {
        let Some(instance) = previous else {
            log::debug!("DiffEngine: mount {:?}", element.kind());
            let instance = self.instantiate(parent, element, owner)?;
            let node = instance.borrow().host_node.clone();
            self.host.borrow_mut().append_child(parent, &node)?;
            return Ok(instance);
        };

        if instance.borrow().element.kind() != element.kind() {
            return self.remount(parent, instance, element, owner);
        }

        let component = {
            let record = instance.borrow();
            match &record.body {
                Body::Component {
                    component,
                    child_instance,
                } => Some((component.clone(), child_instance.clone())),
                Body::Host { .. } => None,
            }
        };
        match component {
            Some((component, child)) => {
                self.update_component(parent, &instance, element, component, child)?
            }
            None => self.update_host(parent, &instance, element)?,
        }
        Ok(instance)
    }

    fn remount(
        &self,
        parent: &H::Node,
        previous: InstanceRef<H>,
        element: Element,
        owner: Option<ComponentId>,
    ) -> Result<InstanceRef<H>, ReconcileError> {
        let old_node = previous.borrow().host_node.clone();
        log::debug!(
            "DiffEngine: kind changed {:?} -> {:?}, remounting",
            previous.borrow().element.kind(),
            element.kind()
        );
        self.release(&previous, parent, false)?;
        let instance = self.instantiate(parent, element, owner)?;
        let new_node = instance.borrow().host_node.clone();
        self.host
            .borrow_mut()
            .replace_child(parent, &old_node, &new_node)?;
        Ok(instance)
    }

    fn update_host(
        &self,
        parent: &H::Node,
        instance: &InstanceRef<H>,
        element: Element,
    ) -> Result<(), ReconcileError> {
        let (node, previous_children) = {
            let mut record = instance.borrow_mut();
            record.host_parent = parent.clone();
            if record.element.same(&element) {
                log::trace!("DiffEngine: identical element, subtree skipped");
                return Ok(());
            }
            let node = record.host_node.clone();
            let previous_element = record.element.clone();
            let Body::Host {
                child_instances,
                listeners,
            } = &mut record.body
            else {
                return Ok(());
            };
            patch_properties(
                &mut *self.host.borrow_mut(),
                &node,
                previous_element.props(),
                element.props(),
                listeners,
                &self.config,
            )?;
            (node, child_instances.clone())
        };

        let children = self.reconcile_children(&node, previous_children, element.children())?;

        let mut record = instance.borrow_mut();
        if let Body::Host {
            child_instances, ..
        } = &mut record.body
        {
            *child_instances = children;
        }
        record.element = element;
        Ok(())
    }

    fn reconcile_children(
        &self,
        node: &H::Node,
        previous: Vec<InstanceRef<H>>,
        next: &[Element],
    ) -> Result<Vec<InstanceRef<H>>, ReconcileError> {
        let count = previous.len().max(next.len());
        let mut previous = previous.into_iter();
        let mut slots = Vec::with_capacity(count);

        for i in 0..count {
            let slot = match self.reconcile(node, previous.next(), next.get(i).cloned(), None)? {
                Some(instance) => Slot::Present(instance),
                None => Slot::Absent,
            };
            slots.push(slot);
        }

        Ok(slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Present(instance) => Some(instance),
                Slot::Absent => None,
            })
            .collect())
    }

    fn update_component(
        &self,
        parent: &H::Node,
        instance: &InstanceRef<H>,
        element: Element,
        component: ComponentHandle,
        previous_child: InstanceRef<H>,
    ) -> Result<(), ReconcileError> {
        // a failed remount may have unregistered this instance while it stayed in the tree
        self.components
            .borrow_mut()
            .insert(component.id(), Rc::downgrade(instance));

        {
            let mut record = instance.borrow_mut();
            if record.element.same(&element) && !component.is_dirty() {
                record.host_parent = parent.clone();
                log::trace!("DiffEngine: '{}' unchanged, subtree skipped", component.name());
                return Ok(());
            }
        }

        component.set_props(element.props().clone());
        let child_element = component.render()?;
        let child = self.reconcile_present(
            parent,
            Some(previous_child),
            child_element,
            Some(component.id()),
        )?;
        component.mark_clean();
        let host_node = child.borrow().host_node.clone();

        let mut record = instance.borrow_mut();
        record.host_node = host_node;
        record.host_parent = parent.clone();
        record.element = element;
        record.body = Body::Component {
            component,
            child_instance: child,
        };
        Ok(())
    }

    fn instantiate(
        &self,
        parent: &H::Node,
        element: Element,
        owner: Option<ComponentId>,
    ) -> Result<InstanceRef<H>, ReconcileError> {
        self.config.validate_kind(element.kind())?;

        let node = match element.kind() {
            ElementKind::Component(ty) => {
                let ty = ty.clone();
                return self.instantiate_component(parent, &ty, element, owner);
            }
            ElementKind::Host(tag) => self.host.borrow_mut().create_element(tag)?,
            ElementKind::Text => self.host.borrow_mut().create_text()?,
        };

        let mut listeners = Listeners::new();
        patch_properties(
            &mut *self.host.borrow_mut(),
            &node,
            &Props::default(),
            element.props(),
            &mut listeners,
            &self.config,
        )?;

        let mut child_instances = Vec::with_capacity(element.children().len());
        for child in element.children() {
            let instance = self.instantiate(&node, child.clone(), None)?;
            let child_node = instance.borrow().host_node.clone();
            self.host.borrow_mut().append_child(&node, &child_node)?;
            child_instances.push(instance);
        }

        Ok(Rc::new(RefCell::new(Instance {
            element,
            host_node: node,
            host_parent: parent.clone(),
            body: Body::Host {
                child_instances,
                listeners,
            },
            owner,
        })))
    }

    fn instantiate_component(
        &self,
        parent: &H::Node,
        ty: &ComponentType,
        element: Element,
        owner: Option<ComponentId>,
    ) -> Result<InstanceRef<H>, ReconcileError> {
        let updater: Weak<dyn Updater> = self.this.clone();
        let component = ComponentHandle::construct(ty, element.props().clone(), updater);
        let child_element = component.render()?;
        let child = self.instantiate(parent, child_element, Some(component.id()))?;
        let host_node = child.borrow().host_node.clone();

        let id = component.id();
        let instance = Rc::new(RefCell::new(Instance {
            element,
            host_node,
            host_parent: parent.clone(),
            body: Body::Component {
                component,
                child_instance: child,
            },
            owner,
        }));
        self.components
            .borrow_mut()
            .insert(id, Rc::downgrade(&instance));
        log::debug!("DiffEngine: mounted component '{}' as {}", ty.name(), id);
        Ok(instance)
    }

    /// Tears down `instance`: optionally detaches its node from `parent`,
    /// unregisters its listeners and detaches every descendant node.
    fn release(
        &self,
        instance: &InstanceRef<H>,
        parent: &H::Node,
        detach_self: bool,
    ) -> Result<(), ReconcileError> {
        let mut record = instance.borrow_mut();
        let node = record.host_node.clone();

        match &mut record.body {
            Body::Component {
                component,
                child_instance,
            } => {
                self.components.borrow_mut().remove(&component.id());
                let child = child_instance.clone();
                drop(record);
                self.release(&child, parent, detach_self)
            }
            Body::Host {
                child_instances,
                listeners,
            } => {
                if detach_self {
                    self.host.borrow_mut().remove_child(parent, &node)?;
                }
                clear_listeners(&mut *self.host.borrow_mut(), &node, listeners)?;
                let children = std::mem::take(child_instances);
                drop(record);
                for child in &children {
                    self.release(child, &node, true)?;
                }
                Ok(())
            }
        }
    }

    fn lookup(&self, id: ComponentId) -> Option<InstanceRef<H>> {
        self.components.borrow().get(&id).and_then(Weak::upgrade)
    }

    /// Copies a component's (possibly new) host node up to every ancestor
    /// component that adopted it.
    fn propagate_host_node(&self, instance: &InstanceRef<H>) {
        let (mut owner, node) = {
            let record = instance.borrow();
            (record.owner, record.host_node.clone())
        };
        while let Some(id) = owner {
            let Some(ancestor) = self.lookup(id) else {
                break;
            };
            let mut record = ancestor.borrow_mut();
            record.host_node = node.clone();
            owner = record.owner;
        }
    }
}

impl<H: Host + 'static> Updater for DiffEngine<H> {
    fn is_reconciling(&self) -> bool {
        self.reconciling.get()
    }

    fn rerender(&self, id: ComponentId) -> Result<(), ReconcileError> {
        let Some(instance) = self.lookup(id) else {
            log::warn!("DiffEngine: state update for unmounted {}; ignored", id);
            return Ok(());
        };
        let (parent, element, owner, before) = {
            let record = instance.borrow();
            (
                record.host_parent.clone(),
                record.element.clone(),
                record.owner,
                record.host_node.clone(),
            )
        };
        log::debug!(
            "DiffEngine: re-rendering '{}' ({}) with props {}",
            element.kind().name(),
            id,
            props_to_json(element.props())
        );

        self.run_pass(element.kind().name(), || {
            self.reconcile_present(&parent, Some(instance.clone()), element.clone(), owner)
        })?;

        if instance.borrow().host_node != before {
            self.propagate_host_node(&instance);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::children;
    use crate::memory_host::{MemoryHost, MutationKind, NodeId};
    use crate::types::create_element;
    use serde_json::json;

    fn engine() -> (Rc<DiffEngine<MemoryHost>>, NodeId) {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        (DiffEngine::new(host, ReconcilerConfig::default()), container)
    }

    fn node_of(instance: &InstanceRef<MemoryHost>) -> NodeId {
        instance.borrow().host_node
    }

    #[test]
    fn test_mount_then_identical_element_is_idempotent() {
        let (engine, root) = engine();
        let el = create_element(
            "ul",
            Some(Props::new().set("id", "list")),
            children![create_element("li", None, children!["a"])],
        );

        let instance = engine.reconcile(&root, None, Some(el.clone()), None).unwrap();
        engine.host_mut().take_mutations();
        let again = engine.reconcile(&root, instance.clone(), Some(el), None).unwrap();

        assert!(engine.host().mutations().is_empty());
        assert!(Rc::ptr_eq(instance.as_ref().unwrap(), again.as_ref().unwrap()));
    }

    #[test]
    fn test_same_tag_keeps_host_node() {
        let (engine, root) = engine();
        let a = create_element("div", Some(Props::new().set("title", "a")), children![]);
        let b = create_element("div", Some(Props::new().set("title", "b")), children![]);

        let first = engine.reconcile(&root, None, Some(a), None).unwrap().unwrap();
        let original = node_of(&first);
        let second = engine.reconcile(&root, Some(first), Some(b), None).unwrap().unwrap();

        assert_eq!(node_of(&second), original);
        assert_eq!(engine.host().property(original, "title"), Some(&json!("b")));
    }

    #[test]
    fn test_kind_change_never_reuses_node() {
        let (engine, root) = engine();
        let a = create_element("div", None, children!["x"]);
        let b = create_element("section", None, children!["x"]);

        let first = engine.reconcile(&root, None, Some(a), None).unwrap().unwrap();
        let old = node_of(&first);
        let old_text = engine.host().children(old)[0];
        let second = engine.reconcile(&root, Some(first), Some(b), None).unwrap().unwrap();
        let new = node_of(&second);

        assert_ne!(new, old);
        let host = engine.host();
        assert!(!host.is_attached(old));
        assert!(!host.is_attached(old_text));
        assert_eq!(host.children(root), &[new]);
        assert_eq!(host.tag(new), Some("section"));
    }

    #[test]
    fn test_text_to_element_remount() {
        let (engine, root) = engine();
        let p1 = create_element("p", None, children!["plain"]);
        let p2 = create_element("p", None, children![create_element("em", None, children!["rich"])]);

        let first = engine.reconcile(&root, None, Some(p1), None).unwrap().unwrap();
        let second = engine.reconcile(&root, Some(first.clone()), Some(p2), None).unwrap().unwrap();

        let p = node_of(&second);
        assert_eq!(p, node_of(&first));
        let host = engine.host();
        assert_eq!(host.children(p).len(), 1);
        assert_eq!(host.tag(host.children(p)[0]), Some("em"));
        assert_eq!(host.text_content(p), "rich");
    }

    #[test]
    fn test_children_shrink_unmounts_tail() {
        let (engine, root) = engine();
        let before = create_element("div", None, children!["x", create_element("b", None, children!["y"])]);
        let after = create_element("div", None, children!["x2"]);

        let first = engine.reconcile(&root, None, Some(before), None).unwrap().unwrap();
        let y = first.borrow().child_instances()[1].clone();
        let y_node = node_of(&y);
        let y_text = engine.host().children(y_node)[0];

        let second = engine.reconcile(&root, Some(first), Some(after), None).unwrap().unwrap();

        assert_eq!(second.borrow().child_instances().len(), 1);
        let host = engine.host();
        assert!(!host.is_attached(y_node));
        assert!(!host.is_attached(y_text));
        assert_eq!(host.text_content(node_of(&second)), "x2");
    }

    #[test]
    fn test_children_grow_appends() {
        let (engine, root) = engine();
        let first = engine
            .reconcile(&root, None, Some(create_element("ol", None, children!["1"])), None)
            .unwrap();
        let grown = create_element("ol", None, children!["1", "2", "3"]);
        let second = engine.reconcile(&root, first, Some(grown), None).unwrap().unwrap();

        assert_eq!(second.borrow().child_instances().len(), 3);
        assert_eq!(engine.host().text_content(root), "123");
    }

    #[test]
    fn test_unmount_is_deep() {
        let (engine, root) = engine();
        let el = create_element(
            "div",
            Some(Props::new().on("onClick", |_| {})),
            children![create_element("p", Some(Props::new().on("onHover", |_| {})), children!["deep"])],
        );
        let instance = engine.reconcile(&root, None, Some(el), None).unwrap();
        let top = node_of(instance.as_ref().unwrap());
        let all = engine.host().subtree(top);

        let gone = engine.reconcile(&root, instance, None, None).unwrap();

        assert!(gone.is_none());
        let host = engine.host();
        assert!(host.children(root).is_empty());
        for node in all {
            assert!(!host.is_attached(node), "{node} still attached");
            assert_eq!(host.listener_count(node), 0);
        }
    }

    #[test]
    fn test_component_mount_and_registry_cleanup() {
        let (engine, root) = engine();
        let label = ComponentType::new("Label", |this| {
            let text = this.props().value("text").cloned().unwrap_or(json!(""));
            Some(create_element("label", None, children![text.as_str().unwrap_or_default()]))
        });
        let el = create_element(&label, Some(Props::new().set("text", "hi")), children![]);

        let instance = engine.reconcile(&root, None, Some(el), None).unwrap();
        assert_eq!(engine.mounted_components(), 1);
        let node = node_of(instance.as_ref().unwrap());
        assert_eq!(engine.host().tag(node), Some("label"));
        assert_eq!(engine.host().text_content(node), "hi");

        engine.reconcile(&root, instance, None, None).unwrap();
        assert_eq!(engine.mounted_components(), 0);
        assert!(!engine.host().is_attached(node));
    }

    #[test]
    fn test_host_failure_propagates_unmodified() {
        let (engine, root) = engine();
        engine.host_mut().fail_on(MutationKind::AppendChild);

        let err = engine
            .reconcile(&root, None, Some(create_element("div", None, children![])), None)
            .err().unwrap();

        match err {
            ReconcileError::HostOperationFailure(host_err) => {
                assert_eq!(host_err.operation, "append_child");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_failed_pass_leaves_no_stale_registrations() {
        let (engine, root) = engine();
        let label = ComponentType::new("Label", |_| Some(create_element("label", None, children![])));
        let nothing = ComponentType::new("Nothing", |_| None);
        let el = create_element(
            "div",
            None,
            children![
                create_element(&label, None, children![]),
                create_element(&nothing, None, children![]),
            ],
        );

        let result = engine.run_pass("root", || engine.reconcile(&root, None, Some(el), None));

        assert!(matches!(result, Err(ReconcileError::MissingRenderResult { .. })));
        assert!(engine.components.borrow().is_empty());
        assert_eq!(engine.mounted_components(), 0);
    }

    #[test]
    fn test_same_component_element_is_skipped_unless_dirty() {
        let (engine, root) = engine();
        let label = ComponentType::new("Label", |this| {
            let text = this.state_value("text").unwrap_or(json!("idle"));
            Some(create_element("label", Some(Props::new().set("title", text)), children![]))
        });
        let el = create_element(&label, None, children![]);

        let instance = engine.reconcile(&root, None, Some(el.clone()), None).unwrap();
        engine.host_mut().take_mutations();
        let instance = engine.reconcile(&root, instance, Some(el.clone()), None).unwrap();
        assert!(engine.host().mutations().is_empty());

        let handle = instance.as_ref().unwrap().borrow().component().cloned().unwrap();
        handle.set_state(json!({ "text": "busy" })).unwrap();
        assert!(!handle.is_dirty());
        let node = node_of(instance.as_ref().unwrap());
        assert_eq!(engine.host().property(node, "title"), Some(&json!("busy")));
    }

    #[test]
    fn test_nested_passes_are_rejected() {
        let (engine, _root) = engine();
        let result = engine.run_pass("outer", || engine.run_pass("inner", || Ok(())));

        assert!(matches!(result, Err(ReconcileError::ReentrantUpdate { ref component }) if component == "inner"));
        assert!(!engine.is_reconciling());
        assert_eq!(engine.pass_count(), 0);
    }
}
