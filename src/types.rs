//! Immutable element descriptions, property maps and the element factory
use crate::component::ComponentType;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Display name of the text marker kind.
pub const TEXT_ELEMENT: &str = "TEXT ELEMENT";
/// Property carrying the literal text of a text leaf.
pub const NODE_VALUE: &str = "nodeValue";
pub const CHILDREN: &str = "children";

/// What an element describes. Decided once, when the element is built.
#[derive(Clone)]
pub enum ElementKind {
    Host(String),
    Text,
    Component(ComponentType),
}

impl ElementKind {
    pub fn name(&self) -> &str {
        match self {
            ElementKind::Host(tag) => tag,
            ElementKind::Text => TEXT_ELEMENT,
            ElementKind::Component(ty) => ty.name(),
        }
    }
}

impl PartialEq for ElementKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ElementKind::Host(a), ElementKind::Host(b)) => a == b,
            (ElementKind::Text, ElementKind::Text) => true,
            (ElementKind::Component(a), ElementKind::Component(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Host(tag) => write!(f, "HostTag({tag})"),
            ElementKind::Text => write!(f, "TextTag"),
            ElementKind::Component(ty) => write!(f, "ComponentTag({})", ty.name()),
        }
    }
}

impl From<&str> for ElementKind {
    fn from(tag: &str) -> Self {
        ElementKind::Host(tag.to_string())
    }
}

impl From<String> for ElementKind {
    fn from(tag: String) -> Self {
        ElementKind::Host(tag)
    }
}

impl From<ComponentType> for ElementKind {
    fn from(ty: ComponentType) -> Self {
        ElementKind::Component(ty)
    }
}

impl From<&ComponentType> for ElementKind {
    fn from(ty: &ComponentType) -> Self {
        ElementKind::Component(ty.clone())
    }
}

/// Event delivered to listeners by a host.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub detail: Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Event {
            event_type: event_type.into(),
            detail: Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Shared listener callback. Equality is reference identity: two handlers are
/// the same only if they are clones of one registration.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&Event)>);

impl EventHandler {
    pub fn new(f: impl Fn(&Event) + 'static) -> Self {
        EventHandler(Rc::new(f))
    }

    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }

    pub fn same(&self, other: &EventHandler) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Value(Value),
    Handler(EventHandler),
}

impl PropValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            PropValue::Value(v) => Some(v),
            PropValue::Handler(_) => None,
        }
    }

    pub fn as_handler(&self) -> Option<&EventHandler> {
        match self {
            PropValue::Handler(h) => Some(h),
            PropValue::Value(_) => None,
        }
    }
}

impl From<Value> for PropValue {
    fn from(value: Value) -> Self {
        PropValue::Value(value)
    }
}

impl From<EventHandler> for PropValue {
    fn from(handler: EventHandler) -> Self {
        PropValue::Handler(handler)
    }
}

/// Keys beginning with `on` name event listeners.
pub fn is_listener_key(key: &str) -> bool {
    key.starts_with("on")
}

pub fn is_regular_key(key: &str) -> bool {
    key != CHILDREN && !is_listener_key(key)
}

/// `onClick` -> `click`.
pub fn event_type_for(key: &str) -> String {
    key.get(2..).unwrap_or_default().to_lowercase()
}

/// Property map of an element. Declaration order is preserved and is the
/// order in which properties reach the host.
#[derive(Debug, Clone, Default)]
pub struct Props {
    values: IndexMap<String, PropValue>,
    children: Vec<Element>,
}

impl Props {
    pub fn new() -> Self {
        Props::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), PropValue::Value(value.into()));
        self
    }

    pub fn on(self, key: impl Into<String>, f: impl Fn(&Event) + 'static) -> Self {
        self.handler(key, EventHandler::new(f))
    }

    pub fn handler(mut self, key: impl Into<String>, handler: EventHandler) -> Self {
        self.values.insert(key.into(), PropValue::Handler(handler));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PropValue) -> Option<PropValue> {
        self.values.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.values.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.get(key).and_then(PropValue::as_value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropValue)> {
        self.values.iter()
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.children.is_empty()
    }
}

struct ElementData {
    kind: ElementKind,
    props: Props,
}

/// Immutable element-tree node. Clones share the same node.
#[derive(Clone)]
pub struct Element(Rc<ElementData>);

impl Element {
    pub fn new(kind: ElementKind, props: Props) -> Self {
        Element(Rc::new(ElementData { kind, props }))
    }

    pub fn kind(&self) -> &ElementKind {
        &self.0.kind
    }

    pub fn props(&self) -> &Props {
        &self.0.props
    }

    pub fn children(&self) -> &[Element] {
        self.0.props.children()
    }

    pub fn node_value(&self) -> Option<&Value> {
        self.0.props.value(NODE_VALUE)
    }

    /// True when both values are the same node, not merely equal-looking.
    pub fn same(&self, other: &Element) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("kind", &self.0.kind)
            .field("props", &self.0.props)
            .finish()
    }
}

/// Child argument accepted by [`create_element`].
#[derive(Debug, Clone)]
pub enum Child {
    Text(String),
    Element(Element),
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Text(text.to_string())
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Text(text)
    }
}

impl From<Element> for Child {
    fn from(element: Element) -> Self {
        Child::Element(element)
    }
}

impl From<&Element> for Child {
    fn from(element: &Element) -> Self {
        Child::Element(element.clone())
    }
}

/// Builds an element, normalizing bare text children into text leaves.
/// Any kind is accepted; validation happens when the element is mounted.
pub fn create_element<K: Into<ElementKind>>(
    kind: K,
    props: Option<Props>,
    children: Vec<Child>,
) -> Element {
    let mut props = props.unwrap_or_default();
    props.children = children
        .into_iter()
        .map(|child| match child {
            Child::Text(text) => text_element(text),
            Child::Element(element) => element,
        })
        .collect();
    Element::new(kind.into(), props)
}

pub fn text_element(value: impl Into<String>) -> Element {
    let props = Props::new().set(NODE_VALUE, Value::String(value.into()));
    Element::new(ElementKind::Text, props)
}

/// Converts each argument into a [`Child`].
///
/// ```
/// use vdom_reconciler::{children, create_element};
/// let el = create_element("p", None, children!["Hello ", create_element("b", None, children!["world"])]);
/// assert_eq!(el.children().len(), 2);
/// ```
#[macro_export]
macro_rules! children {
    () => {
        ::std::vec::Vec::<$crate::Child>::new()
    };
    ($($child:expr),+ $(,)?) => {
        vec![$($crate::Child::from($child)),+]
    };
}

/// Stable identity of a mounted component, used to locate its instance when
/// its state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component#{}", self.0)
    }
}

/// Global ID generator (lock-free, atomic)
static ID_COUNTER: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));

pub fn next_id() -> ComponentId {
    ComponentId(ID_COUNTER.fetch_add(1, Ordering::SeqCst))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_children_become_text_elements() {
        let el = create_element("div", None, children!["Hello"]);

        assert_eq!(el.kind(), &ElementKind::Host("div".into()));
        assert_eq!(el.children().len(), 1);
        let text = &el.children()[0];
        assert_eq!(text.kind(), &ElementKind::Text);
        assert_eq!(text.node_value(), Some(&json!("Hello")));
        assert!(text.children().is_empty());
    }

    #[test]
    fn test_element_children_pass_through() {
        let inner = create_element("span", None, children![]);
        let outer = create_element("div", Some(Props::new().set("id", "x")), children![&inner]);

        assert!(outer.children()[0].same(&inner));
        assert_eq!(outer.props().value("id"), Some(&json!("x")));
    }

    #[test]
    fn test_listener_key_classification() {
        assert!(is_listener_key("onClick"));
        assert!(!is_regular_key("onClick"));
        assert!(!is_regular_key("children"));
        assert!(is_regular_key("className"));
        assert_eq!(event_type_for("onClick"), "click");
        assert_eq!(event_type_for("onMouseOver"), "mouseover");
    }

    #[test]
    fn test_handler_identity() {
        let a = EventHandler::new(|_| {});
        let b = EventHandler::new(|_| {});
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_next_id_is_unique() {
        let a = next_id();
        let b = next_id();
        assert_ne!(a, b);
    }
}
