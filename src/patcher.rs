//! Property and listener delta application on a single host node
use crate::config::ReconcilerConfig;
use crate::errors::ReconcileError;
use crate::host::Host;
use crate::types::{event_type_for, is_listener_key, is_regular_key, EventHandler, PropValue, Props};
use indexmap::IndexMap;
use serde_json::Value;

/// Handlers currently registered on a host node, keyed by the property name
/// that registered them. Removal always goes through these stored references.
pub(crate) type Listeners = IndexMap<String, EventHandler>;

fn regular_values<'a>(props: &'a Props) -> impl Iterator<Item = (&'a String, &'a Value)> {
    props
        .iter()
        .filter(|(key, _)| is_regular_key(key))
        .filter_map(|(key, value)| value.as_value().map(|v| (key, v)))
}

fn listener_handlers<'a>(props: &'a Props) -> impl Iterator<Item = (&'a String, &'a EventHandler)> {
    props
        .iter()
        .filter(|(key, _)| is_listener_key(key))
        .filter_map(|(key, value)| value.as_handler().map(|h| (key, h)))
}

fn warn_on_misplaced(props: &Props, config: &ReconcilerConfig) {
    if !config.warn_on_non_handler_listeners {
        return;
    }
    for (key, value) in props.iter() {
        match value {
            PropValue::Value(_) if is_listener_key(key) => {
                log::warn!("Patcher: '{}' looks like a listener but holds data; skipped", key);
            }
            PropValue::Handler(_) if is_regular_key(key) => {
                log::warn!("Patcher: handler under non-listener key '{}'; skipped", key);
            }
            _ => {}
        }
    }
}

/// Brings `node` from `prev` to `next`:
/// clear regular properties `next` drops, unregister listeners `next` no
/// longer carries (by stored reference), re-assign every regular property of
/// `next`, then register listeners not already in place.
pub(crate) fn patch_properties<H: Host>(
    host: &mut H,
    node: &H::Node,
    prev: &Props,
    next: &Props,
    registered: &mut Listeners,
    config: &ReconcilerConfig,
) -> Result<(), ReconcileError> {
    warn_on_misplaced(next, config);

    let dropped: Vec<&String> = regular_values(prev)
        .map(|(key, _)| key)
        .filter(|key| next.value(key).is_none())
        .collect();
    for key in dropped {
        host.remove_property(node, key)?;
    }

    let stale: Vec<String> = registered
        .iter()
        .filter(|(key, handler)| {
            !matches!(next.get(key.as_str()), Some(PropValue::Handler(h)) if h.same(handler))
        })
        .map(|(key, _)| key.clone())
        .collect();
    for key in stale {
        if let Some(handler) = registered.get(&key) {
            host.remove_event_listener(node, &event_type_for(&key), handler)?;
        }
        registered.shift_remove(&key);
    }

    for (key, value) in regular_values(next) {
        host.set_property(node, key, value)?;
    }

    for (key, handler) in listener_handlers(next) {
        if registered.get(key).is_some_and(|h| h.same(handler)) {
            continue;
        }
        host.add_event_listener(node, &event_type_for(key), handler)?;
        registered.insert(key.clone(), handler.clone());
    }

    Ok(())
}

/// Unregisters every stored listener; used when a node is released.
pub(crate) fn clear_listeners<H: Host>(
    host: &mut H,
    node: &H::Node,
    registered: &mut Listeners,
) -> Result<(), ReconcileError> {
    while let Some((key, handler)) = registered.pop() {
        host.remove_event_listener(node, &event_type_for(&key), &handler)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_host::{MemoryHost, MutationKind};
    use crate::types::Event;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> EventHandler {
        let log = log.clone();
        EventHandler::new(move |_| log.borrow_mut().push(name))
    }

    #[test]
    fn test_initial_patch_applies_everything() {
        let mut host = MemoryHost::new();
        let node = host.create_element("a").unwrap();
        let mut registered = Listeners::new();
        let next = Props::new().set("href", "/x").set("title", "t").on("onClick", |_| {});

        patch_properties(&mut host, &node, &Props::new(), &next, &mut registered, &ReconcilerConfig::default()).unwrap();

        assert_eq!(host.property(node, "href"), Some(&json!("/x")));
        assert_eq!(host.property(node, "title"), Some(&json!("t")));
        assert_eq!(host.listeners(node, "click").len(), 1);
        assert!(registered.contains_key("onClick"));
    }

    #[test]
    fn test_dropped_property_is_cleared_and_kept_ones_reassigned() {
        let mut host = MemoryHost::new();
        let node = host.create_element("div").unwrap();
        let mut registered = Listeners::new();
        let config = ReconcilerConfig::default();
        let prev = Props::new().set("id", "a").set("title", "old");
        patch_properties(&mut host, &node, &Props::new(), &prev, &mut registered, &config).unwrap();
        host.take_mutations();

        let next = Props::new().set("id", "a");
        patch_properties(&mut host, &node, &prev, &next, &mut registered, &config).unwrap();

        let kinds: Vec<_> = host.mutations().iter().map(|m| (m.kind, m.name.clone())).collect();
        assert_eq!(
            kinds,
            vec![
                (MutationKind::RemoveProperty, Some("title".to_string())),
                (MutationKind::SetProperty, Some("id".to_string())),
            ]
        );
        assert_eq!(host.property(node, "title"), None);
    }

    #[test]
    fn test_listener_replacement_uses_stored_reference() {
        let mut host = MemoryHost::new();
        let node = host.create_element("button").unwrap();
        let mut registered = Listeners::new();
        let config = ReconcilerConfig::default();
        let fired = Rc::new(RefCell::new(Vec::new()));

        let prev = Props::new().handler("onClick", recorder(&fired, "f1"));
        patch_properties(&mut host, &node, &Props::new(), &prev, &mut registered, &config).unwrap();
        let next = Props::new().handler("onClick", recorder(&fired, "f2"));
        patch_properties(&mut host, &node, &prev, &next, &mut registered, &config).unwrap();

        for handler in host.listeners(node, "click") {
            handler.call(&Event::new("click"));
        }
        assert_eq!(*fired.borrow(), vec!["f2"]);
    }

    #[test]
    fn test_unchanged_handler_is_not_churned() {
        let mut host = MemoryHost::new();
        let node = host.create_element("button").unwrap();
        let mut registered = Listeners::new();
        let config = ReconcilerConfig::default();
        let handler = EventHandler::new(|_| {});

        let prev = Props::new().handler("onClick", handler.clone());
        patch_properties(&mut host, &node, &Props::new(), &prev, &mut registered, &config).unwrap();
        host.take_mutations();
        let next = Props::new().handler("onClick", handler);
        patch_properties(&mut host, &node, &prev, &next, &mut registered, &config).unwrap();

        assert!(host.mutations().is_empty());
        assert_eq!(host.listener_count(node), 1);
    }

    #[test]
    fn test_removed_listener_and_clear() {
        let mut host = MemoryHost::new();
        let node = host.create_element("input").unwrap();
        let mut registered = Listeners::new();
        let config = ReconcilerConfig::default();

        let prev = Props::new().on("onInput", |_| {}).on("onFocus", |_| {});
        patch_properties(&mut host, &node, &Props::new(), &prev, &mut registered, &config).unwrap();
        let next = Props::new().handler("onFocus", registered["onFocus"].clone());
        patch_properties(&mut host, &node, &prev, &next, &mut registered, &config).unwrap();

        assert!(host.listeners(node, "input").is_empty());
        assert_eq!(host.listeners(node, "focus").len(), 1);

        clear_listeners(&mut host, &node, &mut registered).unwrap();
        assert_eq!(host.listener_count(node), 0);
        assert!(registered.is_empty());
    }

    #[test]
    fn test_data_under_listener_key_is_skipped() {
        let mut host = MemoryHost::new();
        let node = host.create_element("div").unwrap();
        let mut registered = Listeners::new();
        let next = Props::new().set("onClick", "alert(1)");

        patch_properties(&mut host, &node, &Props::new(), &next, &mut registered, &ReconcilerConfig::default()).unwrap();

        assert!(host.mutations().iter().all(|m| m.kind == MutationKind::CreateElement));
        assert!(registered.is_empty());
    }
}
