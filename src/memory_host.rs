//! In-process reference host
//!
//! `MemoryHost` keeps its nodes in an arena and records every mutation the
//! engine performs, which makes it the host of choice for tests, snapshots and
//! headless rendering. It follows DOM semantics where they matter to the
//! engine: appending an attached node moves it, registering the same
//! (event, handler) pair twice is a no-op, and removing a node that is not a
//! child of the given parent is an error.
use crate::converters::value_to_text;
use crate::errors::HostError;
use crate::host::Host;
use crate::html_generator::render_html;
use crate::types::{Event, EventHandler, NODE_VALUE};
use crate::Renderer;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Mutation action enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationKind {
    CreateElement,
    CreateText,
    AppendChild,
    RemoveChild,
    ReplaceChild,
    SetProperty,
    RemoveProperty,
    AddListener,
    RemoveListener,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::CreateElement => "CREATE_ELEMENT",
            MutationKind::CreateText => "CREATE_TEXT",
            MutationKind::AppendChild => "APPEND_CHILD",
            MutationKind::RemoveChild => "REMOVE_CHILD",
            MutationKind::ReplaceChild => "REPLACE_CHILD",
            MutationKind::SetProperty => "SET_PROPERTY",
            MutationKind::RemoveProperty => "REMOVE_PROPERTY",
            MutationKind::AddListener => "ADD_LISTENER",
            MutationKind::RemoveListener => "REMOVE_LISTENER",
        };
        f.write_str(name)
    }
}

/// One recorded host mutation. `node` is the node acted upon (the parent for
/// tree operations); `target` is the child being attached or detached and
/// `previous` the child replaced by `target`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mutation {
    pub kind: MutationKind,
    pub node: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Mutation {
    fn on(kind: MutationKind, node: NodeId) -> Self {
        Mutation {
            kind,
            node,
            target: None,
            previous: None,
            name: None,
            value: None,
        }
    }

    pub fn touches(&self, id: NodeId) -> bool {
        self.node == id || self.target == Some(id) || self.previous == Some(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Container,
    Element(String),
    Text,
}

pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) properties: IndexMap<String, Value>,
    listeners: Vec<(String, EventHandler)>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            properties: IndexMap::new(),
            listeners: Vec::new(),
        }
    }
}

#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<NodeData>,
    log: Vec<Mutation>,
    failures: HashSet<MutationKind>,
}

impl MemoryHost {
    pub fn new() -> Self {
        MemoryHost::default()
    }

    /// A detached root node to render into. Not recorded as a mutation.
    pub fn create_container(&mut self) -> NodeId {
        self.push(NodeKind::Container)
    }

    /// Make every subsequent operation of `kind` fail.
    pub fn fail_on(&mut self, kind: MutationKind) {
        self.failures.insert(kind);
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.log
    }

    pub fn take_mutations(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.log)
    }

    pub fn mutations_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(&self.log)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id.0).map(|n| n.children.as_slice()).unwrap_or_default()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.parent(id).is_some()
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.nodes.get(id.0).map(|n| &n.kind) {
            Some(NodeKind::Element(tag)) => Some(tag),
            _ => None,
        }
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.0).map(|n| &n.kind), Some(NodeKind::Text))
    }

    pub fn property(&self, id: NodeId, name: &str) -> Option<&Value> {
        self.nodes.get(id.0).and_then(|n| n.properties.get(name))
    }

    /// Concatenated text of every text node below (and including) `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let Some(node) = self.nodes.get(id.0) else {
            return String::new();
        };
        match node.kind {
            NodeKind::Text => node.properties.get(NODE_VALUE).map(value_to_text).unwrap_or_default(),
            _ => node.children.iter().map(|c| self.text_content(*c)).collect(),
        }
    }

    /// Handlers currently registered on `id` for `event_type`, in
    /// registration order.
    pub fn listeners(&self, id: NodeId, event_type: &str) -> Vec<EventHandler> {
        self.nodes
            .get(id.0)
            .map(|n| {
                n.listeners
                    .iter()
                    .filter(|(ty, _)| ty == event_type)
                    .map(|(_, h)| h.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn listener_count(&self, id: NodeId) -> usize {
        self.nodes.get(id.0).map(|n| n.listeners.len()).unwrap_or(0)
    }

    /// `id` and all of its descendants, depth first.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        for child in self.children(id) {
            out.extend(self.subtree(*child));
        }
        out
    }

    pub fn to_html(&self, id: NodeId) -> String {
        render_html(self, id)
    }

    pub(crate) fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0)
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(NodeData::new(kind));
        NodeId(self.nodes.len() - 1)
    }

    fn check(&self, kind: MutationKind, operation: &'static str) -> Result<(), HostError> {
        if self.failures.contains(&kind) {
            return Err(HostError::new(operation, format!("injected failure for {kind}")));
        }
        Ok(())
    }

    fn node_mut(&mut self, id: NodeId, operation: &'static str) -> Result<&mut NodeData, HostError> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| HostError::new(operation, format!("unknown {id}")))
    }

    fn record(&mut self, mutation: Mutation) {
        log::trace!("MemoryHost: {} {:?}", mutation.kind, mutation);
        self.log.push(mutation);
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(old_parent) = self.nodes[child.0].parent.take() {
            self.nodes[old_parent.0].children.retain(|c| *c != child);
        }
    }

    fn is_ancestor(&self, candidate: NodeId, of: NodeId) -> bool {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.parent(id);
        }
        false
    }
}

impl Host for MemoryHost {
    type Node = NodeId;

    fn create_element(&mut self, tag: &str) -> Result<NodeId, HostError> {
        self.check(MutationKind::CreateElement, "create_element")?;
        let id = self.push(NodeKind::Element(tag.to_string()));
        let mut m = Mutation::on(MutationKind::CreateElement, id);
        m.name = Some(tag.to_string());
        self.record(m);
        Ok(id)
    }

    fn create_text(&mut self) -> Result<NodeId, HostError> {
        self.check(MutationKind::CreateText, "create_text")?;
        let id = self.push(NodeKind::Text);
        self.record(Mutation::on(MutationKind::CreateText, id));
        Ok(id)
    }

    fn append_child(&mut self, parent: &NodeId, child: &NodeId) -> Result<(), HostError> {
        self.check(MutationKind::AppendChild, "append_child")?;
        self.node_mut(*child, "append_child")?;
        if self.is_ancestor(*child, *parent) {
            return Err(HostError::new(
                "append_child",
                format!("{child} is an ancestor of {parent}"),
            ));
        }
        self.node_mut(*parent, "append_child")?;
        self.detach(*child);
        self.nodes[parent.0].children.push(*child);
        self.nodes[child.0].parent = Some(*parent);

        let mut m = Mutation::on(MutationKind::AppendChild, *parent);
        m.target = Some(*child);
        self.record(m);
        Ok(())
    }

    fn remove_child(&mut self, parent: &NodeId, child: &NodeId) -> Result<(), HostError> {
        self.check(MutationKind::RemoveChild, "remove_child")?;
        if self.node_mut(*child, "remove_child")?.parent != Some(*parent) {
            return Err(HostError::new(
                "remove_child",
                format!("{child} is not a child of {parent}"),
            ));
        }
        self.detach(*child);

        let mut m = Mutation::on(MutationKind::RemoveChild, *parent);
        m.target = Some(*child);
        self.record(m);
        Ok(())
    }

    fn replace_child(&mut self, parent: &NodeId, old_child: &NodeId, new_child: &NodeId) -> Result<(), HostError> {
        self.check(MutationKind::ReplaceChild, "replace_child")?;
        self.node_mut(*new_child, "replace_child")?;
        if self.node_mut(*old_child, "replace_child")?.parent != Some(*parent) {
            return Err(HostError::new(
                "replace_child",
                format!("{old_child} is not a child of {parent}"),
            ));
        }
        if old_child != new_child {
            self.detach(*new_child);
            let slot = self.nodes[parent.0]
                .children
                .iter()
                .position(|c| c == old_child)
                .ok_or_else(|| HostError::new("replace_child", format!("{old_child} missing from {parent}")))?;
            self.nodes[parent.0].children[slot] = *new_child;
            self.nodes[new_child.0].parent = Some(*parent);
            self.nodes[old_child.0].parent = None;
        }

        let mut m = Mutation::on(MutationKind::ReplaceChild, *parent);
        m.target = Some(*new_child);
        m.previous = Some(*old_child);
        self.record(m);
        Ok(())
    }

    fn set_property(&mut self, node: &NodeId, name: &str, value: &Value) -> Result<(), HostError> {
        self.check(MutationKind::SetProperty, "set_property")?;
        self.node_mut(*node, "set_property")?
            .properties
            .insert(name.to_string(), value.clone());

        let mut m = Mutation::on(MutationKind::SetProperty, *node);
        m.name = Some(name.to_string());
        m.value = Some(value.clone());
        self.record(m);
        Ok(())
    }

    fn remove_property(&mut self, node: &NodeId, name: &str) -> Result<(), HostError> {
        self.check(MutationKind::RemoveProperty, "remove_property")?;
        self.node_mut(*node, "remove_property")?.properties.shift_remove(name);

        let mut m = Mutation::on(MutationKind::RemoveProperty, *node);
        m.name = Some(name.to_string());
        self.record(m);
        Ok(())
    }

    fn add_event_listener(&mut self, node: &NodeId, event_type: &str, handler: &EventHandler) -> Result<(), HostError> {
        self.check(MutationKind::AddListener, "add_event_listener")?;
        let data = self.node_mut(*node, "add_event_listener")?;
        if data.listeners.iter().any(|(ty, h)| ty == event_type && h.same(handler)) {
            return Ok(());
        }
        data.listeners.push((event_type.to_string(), handler.clone()));

        let mut m = Mutation::on(MutationKind::AddListener, *node);
        m.name = Some(event_type.to_string());
        self.record(m);
        Ok(())
    }

    fn remove_event_listener(&mut self, node: &NodeId, event_type: &str, handler: &EventHandler) -> Result<(), HostError> {
        self.check(MutationKind::RemoveListener, "remove_event_listener")?;
        let data = self.node_mut(*node, "remove_event_listener")?;
        let before = data.listeners.len();
        data.listeners.retain(|(ty, h)| !(ty == event_type && h.same(handler)));
        if data.listeners.len() == before {
            return Ok(());
        }

        let mut m = Mutation::on(MutationKind::RemoveListener, *node);
        m.name = Some(event_type.to_string());
        self.record(m);
        Ok(())
    }
}

impl Renderer<MemoryHost> {
    /// Fires `event` at `node`, returning how many handlers ran.
    ///
    /// Handlers are collected first and invoked with no host borrow held, so
    /// they are free to call `set_state`.
    pub fn dispatch(&self, node: NodeId, event: &Event) -> usize {
        let handlers = self.host().listeners(node, &event.event_type);
        for handler in &handlers {
            handler.call(event);
        }
        handlers.len()
    }
}
