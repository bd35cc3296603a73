//! Engine configuration and element-kind validation
use crate::errors::ReconcileError;
use crate::types::ElementKind;
use phf::phf_set;
use serde::Deserialize;

// Compile-time HTML tag table consulted in strict mode
static KNOWN_TAGS: phf::Set<&'static str> = phf_set! {
    "a", "abbr", "address", "area", "article", "aside", "audio", "b", "blockquote",
    "body", "br", "button", "canvas", "caption", "code", "col", "dd", "details",
    "dialog", "div", "dl", "dt", "em", "embed", "fieldset", "figure", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "i", "iframe",
    "img", "input", "label", "li", "link", "main", "meta", "nav", "ol", "option",
    "p", "pre", "section", "select", "small", "source", "span", "strong", "sub",
    "summary", "sup", "svg", "table", "tbody", "td", "textarea", "tfoot", "th",
    "thead", "tr", "track", "u", "ul", "video", "wbr",
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Reject host tags that are neither in the built-in HTML table nor in
    /// `custom_tags`.
    pub strict_tags: bool,
    pub custom_tags: Vec<String>,
    /// Log a warning when an `on*` property carries plain data instead of a
    /// handler.
    pub warn_on_non_handler_listeners: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfig {
            strict_tags: false,
            custom_tags: Vec::new(),
            warn_on_non_handler_listeners: true,
        }
    }
}

impl ReconcilerConfig {
    pub fn from_json(json: &str) -> Result<Self, ReconcileError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks that `kind` can be mounted. Text and component kinds always
    /// can; host tags must be well formed and, in strict mode, known.
    pub fn validate_kind(&self, kind: &ElementKind) -> Result<(), ReconcileError> {
        let ElementKind::Host(tag) = kind else {
            return Ok(());
        };

        let well_formed = tag.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !well_formed {
            return Err(ReconcileError::InvalidElementKind {
                kind: tag.clone(),
                details: "tag names must start with a letter and contain only letters, digits and '-'".into(),
            });
        }

        if self.strict_tags
            && !KNOWN_TAGS.contains(tag.as_str())
            && !self.custom_tags.iter().any(|t| t == tag)
        {
            return Err(ReconcileError::InvalidElementKind {
                kind: tag.clone(),
                details: "not a recognized host tag".into(),
            });
        }
        Ok(())
    }
}
