//! Query-time views over elements
//!
//! A view restricts which groups are returned, which properties survive, and
//! optionally re-aggregates results with a different group-by key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::element::Element;

/// Per-group view settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewElementDefinition {
    /// Properties to keep; `None` keeps all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,

    /// Group-by override used when summarising
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Vec<String>>,
}

/// A view; an empty group map allows every group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    /// Allowed groups and their settings
    #[serde(default)]
    pub groups: BTreeMap<String, ViewElementDefinition>,

    /// Aggregate results at query time
    #[serde(default)]
    pub summarise: bool,
}

impl View {
    /// A view returning everything unchanged
    pub fn all() -> Self {
        Self::default()
    }

    /// Allow a group with default settings
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into(), ViewElementDefinition::default());
        self
    }

    /// Allow a group with explicit settings
    pub fn with_group_definition(
        mut self,
        group: impl Into<String>,
        definition: ViewElementDefinition,
    ) -> Self {
        self.groups.insert(group.into(), definition);
        self
    }

    /// Enable query-time summarisation
    pub fn summarised(mut self) -> Self {
        self.summarise = true;
        self
    }

    /// Whether elements of `group` pass the view
    pub fn allows_group(&self, group: &str) -> bool {
        self.groups.is_empty() || self.groups.contains_key(group)
    }

    /// Whether an element passes the view
    pub fn allows(&self, element: &Element) -> bool {
        self.allows_group(element.group())
    }

    /// The group-by override for a group, if any
    pub fn group_by(&self, group: &str) -> Option<&[String]> {
        self.groups
            .get(group)
            .and_then(|d| d.group_by.as_deref())
    }

    /// Drop properties the view does not select
    pub fn project(&self, element: &mut Element) {
        let keep = match self
            .groups
            .get(element.group())
            .and_then(|d| d.properties.as_ref())
        {
            Some(keep) => keep,
            None => return,
        };
        element
            .properties_mut()
            .retain(|name, _| keep.iter().any(|k| k == name));
    }
}
