//! Capability set the engine needs from a rendering surface
use crate::errors::HostError;
use crate::types::EventHandler;
use serde_json::Value;
use std::fmt;

/// A rendering surface (a DOM, a terminal buffer, an in-memory tree).
///
/// Node handles are opaque to the engine: it only clones them, compares them
/// and hands them back. Every call may fail; the engine propagates the
/// [`HostError`] untouched and does not roll back mutations already applied.
pub trait Host {
    type Node: Clone + PartialEq + fmt::Debug;

    fn create_element(&mut self, tag: &str) -> Result<Self::Node, HostError>;

    fn create_text(&mut self) -> Result<Self::Node, HostError>;

    fn append_child(&mut self, parent: &Self::Node, child: &Self::Node) -> Result<(), HostError>;

    fn remove_child(&mut self, parent: &Self::Node, child: &Self::Node) -> Result<(), HostError>;

    /// Puts `new_child` where `old_child` was and detaches `old_child`.
    fn replace_child(
        &mut self,
        parent: &Self::Node,
        old_child: &Self::Node,
        new_child: &Self::Node,
    ) -> Result<(), HostError>;

    fn set_property(&mut self, node: &Self::Node, name: &str, value: &Value) -> Result<(), HostError>;

    fn remove_property(&mut self, node: &Self::Node, name: &str) -> Result<(), HostError>;

    fn add_event_listener(
        &mut self,
        node: &Self::Node,
        event_type: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError>;

    /// `handler` is the exact reference previously passed to
    /// [`Host::add_event_listener`].
    fn remove_event_listener(
        &mut self,
        node: &Self::Node,
        event_type: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError>;
}
