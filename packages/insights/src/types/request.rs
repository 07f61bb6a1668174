//! Request descriptors - one per insight to fetch for a symbol.

use serde::{Deserialize, Serialize};

/// Grouping of insights shown together downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Valuation,
    Holdings,
    Deals,
    Financials,
}

/// Where on the fetched page the insight lives.
///
/// - `attribute` + `attribute_value`: element matching `tag[attribute="value"]`,
///   returned as outer HTML.
/// - `attribute` alone: value of the first element carrying that attribute,
///   parsed as JSON.
/// - neither: the whole document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetSelector {
    pub attribute: Option<String>,
    pub attribute_value: Option<String>,
    pub tag_name: Option<String>,
}

impl TargetSelector {
    /// Whole-document target.
    pub fn document() -> Self {
        Self::default()
    }

    /// Element whose attribute equals a value.
    pub fn element(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: Some(attribute.into()),
            attribute_value: Some(value.into()),
            tag_name: None,
        }
    }

    /// JSON carried in an attribute value.
    pub fn attribute(attribute: impl Into<String>) -> Self {
        Self {
            attribute: Some(attribute.into()),
            attribute_value: None,
            tag_name: None,
        }
    }

    /// Restrict an element match to a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag_name = Some(tag.into());
        self
    }

    /// CSS selector for this target, if it names an attribute.
    pub fn css(&self) -> Option<String> {
        let attribute = self.attribute.as_deref().filter(|a| !a.is_empty())?;
        let tag = self.tag_name.as_deref().unwrap_or("");
        Some(match self.attribute_value.as_deref().filter(|v| !v.is_empty()) {
            Some(value) => format!("{tag}[{attribute}=\"{}\"]", value.replace('"', "\\\"")),
            None => format!("{tag}[{attribute}]"),
        })
    }
}

/// A fully-resolved request for one insight of one symbol.
///
/// Generated deterministically from templates; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
    pub category: Category,
    pub indicator_name: String,
    pub url: String,
    pub target: TargetSelector,

    /// The extracted fragment needs a second (LLM) parsing pass downstream
    pub requires_secondary_parse: bool,
}
