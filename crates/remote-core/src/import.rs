//! JSON import and export of a remote's element tree.
//!
//! The document is a nested object per element:
//!
//! ```json
//! {
//!   "type": "remote",
//!   "name": "Home",
//!   "background-color": { "default": "#000000ff" },
//!   "subelements": [
//!     {
//!       "type": "button-group",
//!       "key": "transport",
//!       "subelements": [ { "name": "Play", "key": "play" } ],
//!       "constraints": {
//!         "index": { "play": "0b4f6c4e-3f6f-4cf3-9a8e-4d7f0b6f5e21" },
//!         "format": ["play.left = transport.left + 8", "play.width = 44"]
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! `type` may be omitted below the root: children of a remote are button
//! groups and children of a button group are buttons.  `format` may be a
//! single string or a list of lines.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::element::{Color, ElementId, ElementKind, RemoteElement, Role, Shape, Style};
use crate::domain::graph::{ConstraintError, ElementGraph};
use crate::format::PseudoConstraint;

/// Errors produced while reading or writing a remote document.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid remote document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown element type {0:?}")]
    UnknownType(String),

    #[error("invalid uuid {0:?}")]
    InvalidUuid(String),

    #[error("invalid colour {value:?} for mode {mode:?}")]
    InvalidColor { mode: String, value: String },

    #[error("constraint index entry {name:?} -> {value:?} does not name an element in scope")]
    UnknownIndexEntry { name: String, value: String },

    #[error(transparent)]
    Constraint(#[from] ConstraintError),
}

/// Serialized form of one element and its subtree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ElementSpec {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub background_color: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub background_image_alpha: BTreeMap<String, f32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub shrink_wrap: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subelements: Vec<ElementSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<ConstraintsSpec>,
}

/// An element's owned constraints: a name index plus format lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintsSpec {
    /// Name used in `format` -> element UUID or key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub index: BTreeMap<String, String>,
    #[serde(default)]
    pub format: FormatLines,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormatLines {
    One(String),
    Many(Vec<String>),
}

impl Default for FormatLines {
    fn default() -> Self {
        FormatLines::Many(Vec::new())
    }
}

impl FormatLines {
    pub fn joined(&self) -> String {
        match self {
            FormatLines::One(line) => line.clone(),
            FormatLines::Many(lines) => lines.join("\n"),
        }
    }
}

/// Parses a remote document into a fresh graph.  Returns the graph and the
/// root element's id.
pub fn import_remote(json: &str) -> Result<(ElementGraph, ElementId), ImportError> {
    let spec: ElementSpec = serde_json::from_str(json)?;
    let mut graph = ElementGraph::new();
    let root = import_into(&mut graph, None, &spec)?;
    info!(root = %root, elements = graph.len(), constraints = graph.constraint_count(), "imported remote");
    Ok((graph, root))
}

/// Adds `spec` to `graph` under `parent` (or as a root) and installs every
/// element's constraints once the whole subtree exists.
pub fn import_into(
    graph: &mut ElementGraph,
    parent: Option<ElementId>,
    spec: &ElementSpec,
) -> Result<ElementId, ImportError> {
    let mut pending = Vec::new();
    let root = build(graph, parent, spec, &mut pending)?;
    for (element, constraints) in pending {
        install_constraints(graph, element, constraints)?;
    }
    Ok(root)
}

fn build<'s>(
    graph: &mut ElementGraph,
    parent: Option<ElementId>,
    spec: &'s ElementSpec,
    pending: &mut Vec<(ElementId, &'s ConstraintsSpec)>,
) -> Result<ElementId, ImportError> {
    let parent_kind = match parent {
        Some(p) => Some(graph.get(p)?.kind),
        None => None,
    };
    let element = element_from_spec(spec, parent_kind)?;
    let id = match parent {
        Some(p) => graph.add_subelement(p, element)?,
        None => graph.insert_root(element)?,
    };
    for child in &spec.subelements {
        build(graph, Some(id), child, pending)?;
    }
    if let Some(constraints) = &spec.constraints {
        pending.push((id, constraints));
    }
    Ok(id)
}

fn element_from_spec(
    spec: &ElementSpec,
    parent_kind: Option<ElementKind>,
) -> Result<RemoteElement, ImportError> {
    let kind = match spec.kind.as_deref() {
        Some(name) => {
            ElementKind::from_name(name).ok_or_else(|| ImportError::UnknownType(name.to_string()))?
        }
        None => match parent_kind {
            None => ElementKind::Remote,
            Some(ElementKind::Remote) => ElementKind::ButtonGroup,
            Some(_) => ElementKind::Button,
        },
    };
    let id = match spec.uuid.as_deref() {
        Some(raw) => ElementId::parse(raw).ok_or_else(|| ImportError::InvalidUuid(raw.to_string()))?,
        None => ElementId::new(),
    };
    let name = spec
        .name
        .clone()
        .or_else(|| spec.key.clone())
        .unwrap_or_else(|| kind.name().to_string());

    let mut element = RemoteElement::with_id(id, kind, name);
    element.key = spec.key.clone();
    element.shrink_wrap = spec.shrink_wrap;
    if let Some(role) = &spec.role {
        element.role = Role::from_name(role);
    }
    if let Some(shape) = &spec.shape {
        element.shape = Shape::from_name(shape);
    }
    if let Some(style) = &spec.style {
        element.style = Style::parse(style);
    }
    for (mode, value) in &spec.background_color {
        let color = Color::parse(value).ok_or_else(|| ImportError::InvalidColor {
            mode: mode.clone(),
            value: value.clone(),
        })?;
        element.set_background_color(mode, Some(color));
    }
    for (mode, alpha) in &spec.background_image_alpha {
        element.configuration_mut(mode).background_image_alpha = Some(*alpha);
    }
    Ok(element)
}

fn install_constraints(
    graph: &mut ElementGraph,
    element: ElementId,
    constraints: &ConstraintsSpec,
) -> Result<(), ImportError> {
    let mut scope = vec![element];
    scope.extend_from_slice(graph.subelements_of(element));

    let mut index = HashMap::with_capacity(constraints.index.len());
    for (name, value) in &constraints.index {
        let target = ElementId::parse(value)
            .filter(|id| scope.contains(id))
            .or_else(|| graph.find_in(&scope, value))
            .ok_or_else(|| ImportError::UnknownIndexEntry {
                name: name.clone(),
                value: value.clone(),
            })?;
        index.insert(name.clone(), target);
    }

    let mut manager = graph.constraint_manager(element)?;
    let ids = manager.set_constraints_with_index(&constraints.format.joined(), &index)?;
    debug!(%element, count = ids.len(), "installed imported constraints");
    Ok(())
}

/// Serializes the subtree rooted at `root` as a pretty-printed document.
pub fn export_remote(graph: &ElementGraph, root: ElementId) -> Result<String, ImportError> {
    let spec = export_element(graph, root)?;
    Ok(serde_json::to_string_pretty(&spec)?)
}

/// Builds the [`ElementSpec`] for the subtree rooted at `id`.
pub fn export_element(graph: &ElementGraph, id: ElementId) -> Result<ElementSpec, ImportError> {
    let element = graph.get(id)?;
    let mut spec = ElementSpec {
        kind: Some(element.kind.name().to_string()),
        name: Some(element.name.clone()),
        key: element.key.clone(),
        uuid: Some(element.id.uuid().to_string()),
        shrink_wrap: element.shrink_wrap,
        ..ElementSpec::default()
    };
    if element.role != Role::UNDEFINED {
        spec.role = Some(element.role.name().to_string());
    }
    if element.shape != Shape::default() {
        spec.shape = Some(element.shape.name().to_string());
    }
    if element.style != Style::NONE {
        spec.style = Some(element.style.describe());
    }
    for mode in element.modes() {
        if let Some(config) = element.configuration_for_mode(mode) {
            if let Some(color) = config.background_color {
                spec.background_color.insert(mode.to_string(), color.to_hex());
            }
            if let Some(alpha) = config.background_image_alpha {
                spec.background_image_alpha.insert(mode.to_string(), alpha);
            }
        }
    }
    for child in element.subelements() {
        spec.subelements.push(export_element(graph, *child)?);
    }
    spec.constraints = export_constraints(graph, id);
    Ok(spec)
}

fn export_constraints(graph: &ElementGraph, id: ElementId) -> Option<ConstraintsSpec> {
    let owned = graph.owned_constraints(id);
    if owned.is_empty() {
        return None;
    }
    let name_of = |e: ElementId| {
        graph
            .element(e)
            .and_then(|el| el.key.clone())
            .unwrap_or_else(|| e.identifier())
    };

    let mut index = BTreeMap::new();
    let mut lines: Vec<String> = Vec::with_capacity(owned.len());
    for c in owned.iter().filter_map(|cid| graph.constraint(*cid)) {
        for item in std::iter::once(c.first_item).chain(c.second_item) {
            index.insert(name_of(item), item.uuid().to_string());
        }
        lines.push(PseudoConstraint::from_constraint(c, &name_of).to_string());
    }
    lines.sort();

    let format = match <[String; 1]>::try_from(lines) {
        Ok([line]) => FormatLines::One(line),
        Err(lines) => FormatLines::Many(lines),
    };
    Some(ConstraintsSpec { index, format })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
