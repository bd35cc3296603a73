//! HTML serialization of `MemoryHost` trees with consistent escaping and zero panics
use crate::converters::value_to_text;
use crate::memory_host::{MemoryHost, NodeId, NodeKind};
use crate::types::NODE_VALUE;
use phf::{phf_map, phf_set};
use serde_json::Value;

// Compile-time property -> attribute lookup (zero allocation)
static PROPERTY_ATTRIBUTES: phf::Map<&'static str, &'static str> = phf_map! {
    "className" => "class",
    "htmlFor" => "for",
    "tabIndex" => "tabindex",
    "readOnly" => "readonly",
    "maxLength" => "maxlength",
};

static VOID_ELEMENTS: phf::Set<&'static str> = phf_set! {
    "area", "base", "br", "col", "embed", "hr", "img", "input",
    "link", "meta", "source", "track", "wbr",
};

/// Consistent HTML attribute escaping
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Markup for `id` and its subtree. A container renders only its children.
pub fn render_html(host: &MemoryHost, id: NodeId) -> String {
    let mut out = String::new();
    write_node(host, id, &mut out);
    out
}

fn write_node(host: &MemoryHost, id: NodeId, out: &mut String) {
    let Some(node) = host.data(id) else {
        return;
    };

    match &node.kind {
        NodeKind::Text => {
            let text = node.properties.get(NODE_VALUE).map(value_to_text).unwrap_or_default();
            out.push_str(&html_escape(&text));
        }
        NodeKind::Container => {
            for child in &node.children {
                write_node(host, *child, out);
            }
        }
        NodeKind::Element(tag) => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in &node.properties {
                write_attribute(name, value, out);
            }
            out.push('>');

            if VOID_ELEMENTS.contains(tag.as_str()) {
                return;
            }
            for child in &node.children {
                write_node(host, *child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

fn write_attribute(name: &str, value: &Value, out: &mut String) {
    let attr = PROPERTY_ATTRIBUTES.get(name).copied().unwrap_or(name);
    match value {
        Value::Null | Value::Bool(false) => {}
        Value::Bool(true) => {
            out.push(' ');
            out.push_str(&html_escape(attr));
        }
        // Generic style handling
        Value::Object(style) if name == "style" => {
            let css: Vec<String> = style
                .iter()
                .map(|(key, value)| format!("{}: {}", key.replace('_', "-"), value_to_text(value)))
                .collect();
            out.push_str(&format!(r#" style="{}""#, html_escape(&css.join("; "))));
        }
        other => {
            out.push_str(&format!(
                r#" {}="{}""#,
                html_escape(attr),
                html_escape(&value_to_text(other))
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;
    use serde_json::json;

    #[test]
    fn test_escapes_text_and_attributes() {
        let mut host = MemoryHost::new();
        let root = host.create_container();
        let p = host.create_element("p").unwrap();
        let text = host.create_text().unwrap();
        host.set_property(&p, "className", &json!("a\"b")).unwrap();
        host.set_property(&text, NODE_VALUE, &json!("1 < 2 & 3")).unwrap();
        host.append_child(&p, &text).unwrap();
        host.append_child(&root, &p).unwrap();

        assert_eq!(render_html(&host, root), r#"<p class="a&quot;b">1 &lt; 2 &amp; 3</p>"#);
    }

    #[test]
    fn test_void_and_boolean_attributes() {
        let mut host = MemoryHost::new();
        let input = host.create_element("input").unwrap();
        host.set_property(&input, "disabled", &json!(true)).unwrap();
        host.set_property(&input, "hidden", &json!(false)).unwrap();
        host.set_property(&input, "maxLength", &json!(4)).unwrap();

        assert_eq!(render_html(&host, input), r#"<input disabled maxlength="4">"#);
    }

    #[test]
    fn test_style_object() {
        let mut host = MemoryHost::new();
        let div = host.create_element("div").unwrap();
        host.set_property(&div, "style", &json!({"font_size": "12px", "color": "red"})).unwrap();

        assert_eq!(render_html(&host, div), r#"<div style="color: red; font-size: 12px"></div>"#);
    }
}
