//! The element arena.
//!
//! [`ElementGraph`] owns every [`RemoteElement`] of a remote and every
//! [`LayoutConstraint`] between them.  Parent/child links and constraint items
//! are stored as [`ElementId`]s, so the tree and the constraint web never form
//! reference cycles.
//!
//! # Vocabulary (for beginners)
//!
//! For an element `E`:
//!
//! - **owned** constraints are the ones stored in `E`'s constraint set
//!   (`owner == E`).  A parent usually owns the constraints that position its
//!   children.
//! - **first-order** constraints have `E` as their first item: they constrain `E`.
//! - **second-order** constraints have `E` as their second item: something else
//!   is constrained relative to `E`.
//! - **intrinsic** constraints involve only `E` (a fixed width, an aspect-ratio
//!   lock).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;
use tracing::debug;

use super::constraint::{
    Axis, ConstraintId, LayoutAttribute, LayoutConstraint, Relation,
};
use super::constraint_manager::ConstraintManager;
use super::element::{ElementId, RemoteElement};
use crate::format::FormatError;

/// Errors produced by the arena and by [`ConstraintManager`] operations.
#[derive(Debug, Error, PartialEq)]
pub enum ConstraintError {
    /// A format string could not be parsed or named an unknown element.
    #[error("malformed constraint format: {0}")]
    MalformedConstraintSpec(#[from] FormatError),

    /// The constraints on an element could not be reduced to a consistent set.
    #[error("unsatisfiable constraints on {element}: {reason}")]
    UnsatisfiableConstraintSet { element: ElementId, reason: String },

    /// The element is not part of this graph.
    #[error("unknown element: {0}")]
    UnknownElement(ElementId),

    /// An element with this id is already part of the graph.
    #[error("duplicate element: {0}")]
    DuplicateElement(ElementId),

    /// The operation needs a direct child of the managed element.
    #[error("{child} is not a subelement of {parent}")]
    NotASubelement { parent: ElementId, child: ElementId },

    /// The metrics table has no frame for an element the operation reads.
    #[error("no metrics recorded for element {0}")]
    MissingMetrics(String),

    /// The constraint references missing items or carries invalid values.
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),

    /// The requested tree edit would create a cycle or orphan an element.
    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),
}

/// Which side of a constraint an element must occupy to match a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// First or second item.
    #[default]
    Any,
    First,
    Second,
}

/// What an attribute of an element is constrained against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dependency {
    #[default]
    None,
    /// The element's parent.
    Parent,
    /// One of the element's own children.
    Child,
    /// Another child of the same parent.
    Sibling,
    /// The element itself, or a fixed value.
    Intrinsic,
}

/// Summary of which canonical attributes of an element are constrained.
///
/// Computed on demand from the element's first-order constraints; nothing is
/// cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutConfiguration {
    dependencies: BTreeMap<LayoutAttribute, Dependency>,
    proportion_lock: bool,
}

impl LayoutConfiguration {
    /// Canonical attributes in bit order (bit 0 is `Height`).
    pub const CANONICAL: [LayoutAttribute; 8] = [
        LayoutAttribute::Height,
        LayoutAttribute::Width,
        LayoutAttribute::CenterY,
        LayoutAttribute::CenterX,
        LayoutAttribute::Bottom,
        LayoutAttribute::Top,
        LayoutAttribute::Right,
        LayoutAttribute::Left,
    ];

    /// `true` when any first-order constraint targets `attribute`
    /// (aliases fold onto their canonical attribute).
    pub fn is_set(&self, attribute: LayoutAttribute) -> bool {
        self.dependencies.contains_key(&attribute.canonical())
    }

    pub fn dependency_for_attribute(&self, attribute: LayoutAttribute) -> Dependency {
        self.dependencies
            .get(&attribute.canonical())
            .copied()
            .unwrap_or(Dependency::None)
    }

    pub fn has_proportion_lock(&self) -> bool {
        self.proportion_lock
    }

    /// The eight-bit attribute mask.
    pub fn bits(&self) -> u8 {
        Self::CANONICAL
            .iter()
            .enumerate()
            .filter(|(_, a)| self.is_set(**a))
            .fold(0u8, |bits, (i, _)| bits | (1 << i))
    }

    /// Set attributes on `axis`, in canonical order.
    pub fn attributes_on(&self, axis: Axis) -> Vec<LayoutAttribute> {
        Self::CANONICAL
            .iter()
            .copied()
            .filter(|a| a.axis() == Some(axis) && self.is_set(*a))
            .collect()
    }
}

/// Arena of elements and constraints for one remote.
#[derive(Debug, Clone, Default)]
pub struct ElementGraph {
    elements: HashMap<ElementId, RemoteElement>,
    constraints: BTreeMap<ConstraintId, LayoutConstraint>,
    next_constraint: u64,
}

/// Saved constraint table, restored when an operation fails part-way.
#[derive(Debug, Clone)]
pub(crate) struct ConstraintSnapshot {
    constraints: BTreeMap<ConstraintId, LayoutConstraint>,
    next_constraint: u64,
}

impl ElementGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Elements ─────────────────────────────────────────────────────────────

    /// Adds a parentless element (normally the remote itself).
    pub fn insert_root(&mut self, mut element: RemoteElement) -> Result<ElementId, ConstraintError> {
        let id = element.id;
        if self.elements.contains_key(&id) {
            return Err(ConstraintError::DuplicateElement(id));
        }
        element.parent = None;
        element.subelements.clear();
        self.elements.insert(id, element);
        Ok(id)
    }

    /// Appends `element` as the last child of `parent`.
    pub fn add_subelement(
        &mut self,
        parent: ElementId,
        element: RemoteElement,
    ) -> Result<ElementId, ConstraintError> {
        let index = self.get(parent)?.subelements.len();
        self.insert_subelement(parent, element, index)
    }

    /// Inserts `element` as a child of `parent` at `index` (clamped to the
    /// number of children).
    pub fn insert_subelement(
        &mut self,
        parent: ElementId,
        mut element: RemoteElement,
        index: usize,
    ) -> Result<ElementId, ConstraintError> {
        let id = element.id;
        if self.elements.contains_key(&id) {
            return Err(ConstraintError::DuplicateElement(id));
        }
        let parent_element = self.get_mut(parent)?;
        let index = index.min(parent_element.subelements.len());
        parent_element.subelements.insert(index, id);
        element.parent = Some(parent);
        element.subelements.clear();
        self.elements.insert(id, element);
        Ok(id)
    }

    /// Removes `id`, its whole subtree and every constraint that references a
    /// removed element.  Returns the removed elements, root of the subtree
    /// first.
    pub fn remove_element(&mut self, id: ElementId) -> Result<Vec<RemoteElement>, ConstraintError> {
        let parent = self.get(id)?.parent;
        if let Some(parent) = parent {
            if let Some(p) = self.elements.get_mut(&parent) {
                p.subelements.retain(|c| *c != id);
            }
        }

        let doomed = self.subtree(id);
        let doomed_set: BTreeSet<ElementId> = doomed.iter().copied().collect();
        let before = self.constraints.len();
        self.constraints.retain(|_, c| {
            !doomed_set.iter().any(|e| c.references(*e))
        });
        debug!(
            element = %id,
            elements = doomed.len(),
            constraints = before - self.constraints.len(),
            "removed element subtree"
        );

        Ok(doomed
            .into_iter()
            .filter_map(|e| self.elements.remove(&e))
            .collect())
    }

    /// Moves `child` to position `index` among its siblings.
    pub fn move_subelement(&mut self, child: ElementId, index: usize) -> Result<(), ConstraintError> {
        let parent = self
            .get(child)?
            .parent
            .ok_or_else(|| ConstraintError::InvalidHierarchy(format!("{child} has no parent")))?;
        let siblings = &mut self.get_mut(parent)?.subelements;
        siblings.retain(|c| *c != child);
        let index = index.min(siblings.len());
        siblings.insert(index, child);
        Ok(())
    }

    /// Moves `child` under `new_parent` at `index`.
    ///
    /// Constraints tying `child` to its old parent or old siblings cannot be
    /// expressed in the new location and are dropped; constraints internal to
    /// `child`'s subtree survive.
    pub fn reparent(
        &mut self,
        child: ElementId,
        new_parent: ElementId,
        index: usize,
    ) -> Result<(), ConstraintError> {
        self.get(new_parent)?;
        if self.subtree(child).contains(&new_parent) {
            return Err(ConstraintError::InvalidHierarchy(format!(
                "{new_parent} is inside the subtree of {child}"
            )));
        }
        let old_parent = self
            .get(child)?
            .parent
            .ok_or_else(|| ConstraintError::InvalidHierarchy(format!("{child} has no parent")))?;

        let subtree: BTreeSet<ElementId> = self.subtree(child).into_iter().collect();
        let before = self.constraints.len();
        self.constraints.retain(|_, c| {
            let touches = subtree.iter().any(|e| c.references(*e));
            if !touches {
                return true;
            }
            subtree.contains(&c.owner)
                && subtree.contains(&c.first_item)
                && c.second_item.map_or(true, |s| subtree.contains(&s))
        });
        debug!(
            element = %child,
            from = %old_parent,
            to = %new_parent,
            dropped = before - self.constraints.len(),
            "reparented element"
        );

        if let Some(p) = self.elements.get_mut(&old_parent) {
            p.subelements.retain(|c| *c != child);
        }
        let siblings = &mut self.get_mut(new_parent)?.subelements;
        let index = index.min(siblings.len());
        siblings.insert(index, child);
        self.get_mut(child)?.parent = Some(new_parent);
        Ok(())
    }

    /// `id` followed by all of its descendants, depth first.
    pub fn subtree(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(element) = self.elements.get(&next) {
                out.push(next);
                stack.extend(element.subelements.iter().rev().copied());
            }
        }
        out
    }

    pub fn element(&self, id: ElementId) -> Option<&RemoteElement> {
        self.elements.get(&id)
    }

    pub fn element_mut(&mut self, id: ElementId) -> Option<&mut RemoteElement> {
        self.elements.get_mut(&id)
    }

    pub fn get(&self, id: ElementId) -> Result<&RemoteElement, ConstraintError> {
        self.elements
            .get(&id)
            .ok_or(ConstraintError::UnknownElement(id))
    }

    pub fn get_mut(&mut self, id: ElementId) -> Result<&mut RemoteElement, ConstraintError> {
        self.elements
            .get_mut(&id)
            .ok_or(ConstraintError::UnknownElement(id))
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn parent_of(&self, id: ElementId) -> Option<ElementId> {
        self.elements.get(&id).and_then(|e| e.parent)
    }

    pub fn subelements_of(&self, id: ElementId) -> &[ElementId] {
        self.elements
            .get(&id)
            .map(|e| e.subelements.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_subelement_of(&self, child: ElementId, parent: ElementId) -> bool {
        self.parent_of(child) == Some(parent)
    }

    /// Finds the element named `name` among `scope` (identifier, UUID or key).
    pub fn find_in<'a>(
        &self,
        scope: impl IntoIterator<Item = &'a ElementId>,
        name: &str,
    ) -> Option<ElementId> {
        scope
            .into_iter()
            .filter_map(|id| self.elements.get(id))
            .find(|e| e.is_identified_by(name))
            .map(|e| e.id)
    }

    /// Returns a manager scoped to `element`.
    pub fn constraint_manager(
        &mut self,
        element: ElementId,
    ) -> Result<ConstraintManager<'_>, ConstraintError> {
        self.get(element)?;
        Ok(ConstraintManager::new(self, element))
    }

    // ── Constraints ──────────────────────────────────────────────────────────

    /// Stores `constraint` after checking that its items exist and its values
    /// are usable.
    pub fn add_constraint(
        &mut self,
        constraint: LayoutConstraint,
    ) -> Result<ConstraintId, ConstraintError> {
        self.check(&constraint)?;
        let id = ConstraintId(self.next_constraint);
        self.next_constraint += 1;
        self.constraints.insert(id, constraint);
        Ok(id)
    }

    /// Replaces the constraint stored under `id`, keeping the handle.
    pub fn replace_constraint(
        &mut self,
        id: ConstraintId,
        constraint: LayoutConstraint,
    ) -> Result<(), ConstraintError> {
        self.check(&constraint)?;
        match self.constraints.get_mut(&id) {
            Some(slot) => {
                *slot = constraint;
                Ok(())
            }
            None => Err(ConstraintError::InvalidConstraint(format!(
                "no constraint {id}"
            ))),
        }
    }

    pub fn remove_constraint(&mut self, id: ConstraintId) -> Option<LayoutConstraint> {
        self.constraints.remove(&id)
    }

    pub fn constraint(&self, id: ConstraintId) -> Option<&LayoutConstraint> {
        self.constraints.get(&id)
    }

    pub(crate) fn constraint_mut(&mut self, id: ConstraintId) -> Option<&mut LayoutConstraint> {
        self.constraints.get_mut(&id)
    }

    /// All constraints in creation order.
    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintId, &LayoutConstraint)> {
        self.constraints.iter().map(|(id, c)| (*id, c))
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    fn select(&self, pred: impl Fn(&LayoutConstraint) -> bool) -> Vec<ConstraintId> {
        self.constraints
            .iter()
            .filter(|(_, c)| pred(c))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Constraints stored in `element`'s constraint set.
    pub fn owned_constraints(&self, element: ElementId) -> Vec<ConstraintId> {
        self.select(|c| c.owner == element)
    }

    /// Constraints whose first item is `element`.
    pub fn first_order_constraints(&self, element: ElementId) -> Vec<ConstraintId> {
        self.select(|c| c.first_item == element)
    }

    /// Constraints whose second item is `element`.
    pub fn second_order_constraints(&self, element: ElementId) -> Vec<ConstraintId> {
        self.select(|c| c.second_item == Some(element))
    }

    /// Owned constraints that involve only `element`.
    pub fn intrinsic_constraints(&self, element: ElementId) -> Vec<ConstraintId> {
        self.select(|c| c.owner == element && c.is_intrinsic_to(element))
    }

    /// Owned constraints that are not intrinsic.
    pub fn subelement_constraints(&self, element: ElementId) -> Vec<ConstraintId> {
        self.select(|c| c.owner == element && !c.is_intrinsic_to(element))
    }

    /// Constraints on other elements that depend on `element`.
    pub fn dependent_constraints(&self, element: ElementId) -> Vec<ConstraintId> {
        self.select(|c| c.second_item == Some(element) && c.first_item != element)
    }

    /// Dependent constraints whose first item is a child of `element`.
    pub fn dependent_child_constraints(&self, element: ElementId) -> Vec<ConstraintId> {
        self.select(|c| {
            c.second_item == Some(element)
                && c.first_item != element
                && self.parent_of(c.first_item) == Some(element)
        })
    }

    /// Dependent constraints whose first item is not a child of `element`.
    pub fn dependent_sibling_constraints(&self, element: ElementId) -> Vec<ConstraintId> {
        self.select(|c| {
            c.second_item == Some(element)
                && c.first_item != element
                && self.parent_of(c.first_item) != Some(element)
        })
    }

    /// Constraints involving `element` on `attribute`.
    ///
    /// For [`Order::First`] the first attribute is compared, for
    /// [`Order::Second`] the second; [`Order::Any`] accepts either side.
    /// Aliases match their canonical attribute.
    pub fn constraints_for_attribute(
        &self,
        element: ElementId,
        attribute: LayoutAttribute,
        order: Order,
    ) -> Vec<ConstraintId> {
        let wanted = attribute.canonical();
        self.select(|c| {
            let first = c.first_item == element && c.first_attribute.canonical() == wanted;
            let second =
                c.second_item == Some(element) && c.second_attribute.canonical() == wanted;
            match order {
                Order::First => first,
                Order::Second => second,
                Order::Any => first || second,
            }
        })
    }

    /// Constraints involving `element` whose attribute lies on `axis`.
    pub fn constraints_affecting_axis(
        &self,
        element: ElementId,
        axis: Axis,
        order: Order,
    ) -> Vec<ConstraintId> {
        self.select(|c| {
            let first = c.first_item == element && c.first_attribute.axis() == Some(axis);
            let second =
                c.second_item == Some(element) && c.second_attribute.axis() == Some(axis);
            match order {
                Order::First => first,
                Order::Second => second,
                Order::Any => first || second,
            }
        })
    }

    /// Which attributes of `element` are constrained, and against what.
    pub fn layout_configuration(&self, element: ElementId) -> LayoutConfiguration {
        let parent = self.parent_of(element);
        let mut config = LayoutConfiguration::default();
        for c in self.constraints.values().filter(|c| c.first_item == element) {
            if c.first_attribute == LayoutAttribute::NotAnAttribute {
                continue;
            }
            let dependency = match c.second_item {
                None => Dependency::Intrinsic,
                Some(s) if s == element => Dependency::Intrinsic,
                Some(s) if Some(s) == parent => Dependency::Parent,
                Some(s) if self.parent_of(s) == Some(element) => Dependency::Child,
                Some(s) if parent.is_some() && self.parent_of(s) == parent => Dependency::Sibling,
                Some(_) => Dependency::None,
            };
            config
                .dependencies
                .entry(c.first_attribute.canonical())
                .or_insert(dependency);
            if c.is_proportion_lock() {
                config.proportion_lock = true;
            }
        }
        config
    }

    /// Checks that the required constraints on `element` can hold together.
    ///
    /// A set is rejected when one canonical attribute is fixed twice at the
    /// same priority by different equalities, when an axis is pinned by more
    /// than two required equalities, or when a constraint equates an
    /// attribute with itself plus a non-zero offset.
    ///
    /// Only constraints whose first item is `element` are inspected.  A
    /// contradiction that needs several elements to show up, such as
    /// `a.left = b.left + 10` together with `b.left = a.left + 10`, passes
    /// for each element on its own and is left to the solver.
    pub fn validate_element(&self, element: ElementId) -> Result<(), ConstraintError> {
        let unsatisfiable = |reason: String| ConstraintError::UnsatisfiableConstraintSet {
            element,
            reason,
        };
        let equalities: Vec<&LayoutConstraint> = self
            .constraints
            .values()
            .filter(|c| c.first_item == element && c.relation == Relation::Equal)
            .collect();

        for c in &equalities {
            if c.second_item == Some(element)
                && c.second_attribute.canonical() == c.first_attribute.canonical()
                && c.multiplier == 1.0
                && c.constant != 0.0
            {
                return Err(unsatisfiable(format!(
                    "{} equals itself offset by {}",
                    c.first_attribute, c.constant
                )));
            }
        }

        for (i, a) in equalities.iter().enumerate() {
            for b in &equalities[i + 1..] {
                if a.first_attribute.canonical() == b.first_attribute.canonical()
                    && a.priority == b.priority
                    && !same_relationship(a, b)
                {
                    return Err(unsatisfiable(format!(
                        "{} is fixed twice at priority {}",
                        a.first_attribute.canonical(),
                        a.priority
                    )));
                }
            }
        }

        for axis in [Axis::Horizontal, Axis::Vertical] {
            let pinned: BTreeSet<LayoutAttribute> = equalities
                .iter()
                .filter(|c| c.is_required() && c.first_attribute.axis() == Some(axis))
                .map(|c| c.first_attribute.canonical())
                .collect();
            if pinned.len() > 2 {
                return Err(unsatisfiable(format!(
                    "{:?} axis is over-determined by {:?}",
                    axis, pinned
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> ConstraintSnapshot {
        ConstraintSnapshot {
            constraints: self.constraints.clone(),
            next_constraint: self.next_constraint,
        }
    }

    pub(crate) fn restore(&mut self, snapshot: ConstraintSnapshot) {
        self.constraints = snapshot.constraints;
        self.next_constraint = snapshot.next_constraint;
    }

    fn check(&self, c: &LayoutConstraint) -> Result<(), ConstraintError> {
        for item in [Some(c.first_item), c.second_item, Some(c.owner)]
            .into_iter()
            .flatten()
        {
            if !self.elements.contains_key(&item) {
                return Err(ConstraintError::UnknownElement(item));
            }
        }
        if c.first_attribute == LayoutAttribute::NotAnAttribute {
            return Err(ConstraintError::InvalidConstraint(
                "first attribute is required".into(),
            ));
        }
        if c.second_item.is_some() && c.second_attribute == LayoutAttribute::NotAnAttribute {
            return Err(ConstraintError::InvalidConstraint(
                "second item without an attribute".into(),
            ));
        }
        if let (Some(a), Some(b)) = (c.first_attribute.axis(), c.second_attribute.axis()) {
            let both_sizes = c.first_attribute.is_size() && c.second_attribute.is_size();
            if c.second_item.is_some() && a != b && !both_sizes {
                return Err(ConstraintError::InvalidConstraint(format!(
                    "cannot relate {} to {}",
                    c.first_attribute, c.second_attribute
                )));
            }
        }
        if !c.multiplier.is_finite() || !c.constant.is_finite() || !c.priority.is_finite() {
            return Err(ConstraintError::InvalidConstraint(
                "multiplier, constant and priority must be finite".into(),
            ));
        }
        if c.priority <= 0.0 || c.priority > 1000.0 {
            return Err(ConstraintError::InvalidConstraint(format!(
                "priority {} outside 1..=1000",
                c.priority
            )));
        }
        Ok(())
    }
}

fn same_relationship(a: &LayoutConstraint, b: &LayoutConstraint) -> bool {
    a.second_item == b.second_item
        && a.second_attribute == b.second_attribute
        && a.multiplier == b.multiplier
        && a.constant == b.constant
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::element::ElementKind;
    use LayoutAttribute::*;

    struct Fixture {
        graph: ElementGraph,
        remote: ElementId,
        group: ElementId,
        a: ElementId,
        b: ElementId,
    }

    fn fixture() -> Fixture {
        let mut graph = ElementGraph::new();
        let remote = graph
            .insert_root(RemoteElement::new(ElementKind::Remote, "Remote"))
            .unwrap();
        let group = graph
            .add_subelement(remote, RemoteElement::new(ElementKind::ButtonGroup, "Group"))
            .unwrap();
        let a = graph
            .add_subelement(group, RemoteElement::new(ElementKind::Button, "A").with_key("a"))
            .unwrap();
        let b = graph
            .add_subelement(group, RemoteElement::new(ElementKind::Button, "B").with_key("b"))
            .unwrap();
        Fixture {
            graph,
            remote,
            group,
            a,
            b,
        }
    }

    #[test]
    fn test_add_subelement_links_parent_and_child_in_order() {
        let f = fixture();
        assert_eq!(f.graph.subelements_of(f.group), &[f.a, f.b]);
        assert_eq!(f.graph.parent_of(f.a), Some(f.group));
        assert_eq!(f.graph.parent_of(f.remote), None);
    }

    #[test]
    fn test_insert_root_rejects_duplicate_id() {
        let mut f = fixture();
        let dup = RemoteElement::with_id(f.a, ElementKind::Button, "dup");
        assert_eq!(
            f.graph.insert_root(dup),
            Err(ConstraintError::DuplicateElement(f.a))
        );
    }

    #[test]
    fn test_move_subelement_changes_order_only() {
        let mut f = fixture();
        f.graph.move_subelement(f.b, 0).unwrap();
        assert_eq!(f.graph.subelements_of(f.group), &[f.b, f.a]);
        assert_eq!(f.graph.parent_of(f.b), Some(f.group));
    }

    #[test]
    fn test_remove_element_cascades_to_subtree_and_constraints() {
        // Arrange
        let mut f = fixture();
        f.graph
            .add_constraint(LayoutConstraint::relating(f.a, Left, f.group, Left, f.group))
            .unwrap();
        f.graph
            .add_constraint(LayoutConstraint::fixed(f.group, Width, 100.0))
            .unwrap();
        f.graph
            .add_constraint(LayoutConstraint::relating(f.group, Top, f.remote, Top, f.remote))
            .unwrap();

        // Act
        let removed = f.graph.remove_element(f.group).unwrap();

        // Assert
        assert_eq!(removed.len(), 3);
        assert_eq!(removed[0].id, f.group);
        assert!(!f.graph.contains(f.a));
        assert_eq!(f.graph.constraint_count(), 0);
        assert!(f.graph.subelements_of(f.remote).is_empty());
    }

    #[test]
    fn test_reparent_drops_constraints_to_old_siblings_and_keeps_subtree_ones() {
        // Arrange
        let mut f = fixture();
        let sibling_rel = f
            .graph
            .add_constraint(LayoutConstraint::relating(f.b, Left, f.a, Right, f.group))
            .unwrap();
        let intrinsic = f
            .graph
            .add_constraint(LayoutConstraint::fixed(f.b, Width, 40.0))
            .unwrap();

        // Act
        f.graph.reparent(f.b, f.remote, 0).unwrap();

        // Assert
        assert!(f.graph.constraint(sibling_rel).is_none());
        assert!(f.graph.constraint(intrinsic).is_some());
        assert_eq!(f.graph.subelements_of(f.remote), &[f.b, f.group]);
        assert_eq!(f.graph.subelements_of(f.group), &[f.a]);
    }

    #[test]
    fn test_reparent_into_own_subtree_is_rejected() {
        let mut f = fixture();
        let err = f.graph.reparent(f.group, f.a, 0).unwrap_err();
        assert!(matches!(err, ConstraintError::InvalidHierarchy(_)));
    }

    #[test]
    fn test_add_constraint_rejects_unknown_items_and_mixed_axes() {
        let mut f = fixture();
        let stranger = ElementId::new();
        assert_eq!(
            f.graph
                .add_constraint(LayoutConstraint::fixed(stranger, Width, 1.0)),
            Err(ConstraintError::UnknownElement(stranger))
        );
        let mixed = LayoutConstraint::relating(f.a, Left, f.b, Top, f.group);
        assert!(matches!(
            f.graph.add_constraint(mixed),
            Err(ConstraintError::InvalidConstraint(_))
        ));
    }

    #[test]
    fn test_dependency_queries_split_children_from_siblings() {
        // Arrange
        let mut f = fixture();
        let child_dep = f
            .graph
            .add_constraint(LayoutConstraint::relating(f.a, Top, f.group, Top, f.group))
            .unwrap();
        let sibling_dep = f
            .graph
            .add_constraint(LayoutConstraint::relating(f.a, Left, f.b, Right, f.group))
            .unwrap();

        // Act / Assert
        assert_eq!(f.graph.dependent_child_constraints(f.group), vec![child_dep]);
        assert_eq!(f.graph.dependent_sibling_constraints(f.b), vec![sibling_dep]);
        assert_eq!(f.graph.subelement_constraints(f.group), vec![child_dep, sibling_dep]);
        assert!(f.graph.intrinsic_constraints(f.group).is_empty());
    }

    #[test]
    fn test_constraints_for_attribute_folds_aliases() {
        let mut f = fixture();
        let leading = f
            .graph
            .add_constraint(LayoutConstraint::relating(f.a, Leading, f.group, Leading, f.group))
            .unwrap();
        assert_eq!(
            f.graph.constraints_for_attribute(f.a, Left, Order::First),
            vec![leading]
        );
        assert_eq!(
            f.graph.constraints_for_attribute(f.group, Left, Order::Second),
            vec![leading]
        );
        assert_eq!(
            f.graph
                .constraints_affecting_axis(f.a, Axis::Horizontal, Order::First)
                .len(),
            1
        );
    }

    #[test]
    fn test_layout_configuration_reports_dependencies_and_lock() {
        // Arrange
        let mut f = fixture();
        f.graph
            .add_constraint(LayoutConstraint::relating(f.a, Left, f.group, Left, f.group))
            .unwrap();
        f.graph
            .add_constraint(LayoutConstraint::relating(f.a, Top, f.b, Bottom, f.group))
            .unwrap();
        f.graph
            .add_constraint(LayoutConstraint::fixed(f.a, Height, 20.0))
            .unwrap();
        f.graph
            .add_constraint(LayoutConstraint::relating(f.a, Width, f.a, Height, f.a))
            .unwrap();

        // Act
        let config = f.graph.layout_configuration(f.a);

        // Assert
        assert_eq!(config.dependency_for_attribute(Left), Dependency::Parent);
        assert_eq!(config.dependency_for_attribute(Leading), Dependency::Parent);
        assert_eq!(config.dependency_for_attribute(Top), Dependency::Sibling);
        assert_eq!(config.dependency_for_attribute(Height), Dependency::Intrinsic);
        assert_eq!(config.dependency_for_attribute(Right), Dependency::None);
        assert!(config.has_proportion_lock());
        assert_eq!(config.attributes_on(Axis::Horizontal), vec![Width, Left]);
        // height(0) width(1) top(5) left(7)
        assert_eq!(config.bits(), 0b1010_0011);
    }

    #[test]
    fn test_validate_rejects_three_required_equalities_on_one_axis() {
        let mut f = fixture();
        f.graph
            .add_constraint(LayoutConstraint::relating(f.a, Left, f.group, Left, f.group))
            .unwrap();
        f.graph
            .add_constraint(LayoutConstraint::relating(f.a, Right, f.group, Right, f.group))
            .unwrap();
        assert!(f.graph.validate_element(f.a).is_ok());
        f.graph
            .add_constraint(LayoutConstraint::fixed(f.a, Width, 10.0))
            .unwrap();
        assert!(matches!(
            f.graph.validate_element(f.a),
            Err(ConstraintError::UnsatisfiableConstraintSet { .. })
        ));
    }

    #[test]
    fn test_validate_allows_same_attribute_at_different_priorities() {
        let mut f = fixture();
        f.graph
            .add_constraint(LayoutConstraint::fixed(f.a, Width, 10.0))
            .unwrap();
        f.graph
            .add_constraint(LayoutConstraint::fixed(f.a, Width, 20.0).with_priority(750.0))
            .unwrap();
        assert!(f.graph.validate_element(f.a).is_ok());
        f.graph
            .add_constraint(LayoutConstraint::fixed(f.a, Width, 30.0).with_priority(750.0))
            .unwrap();
        assert!(f.graph.validate_element(f.a).is_err());
    }

    #[test]
    fn test_validate_rejects_self_offset_equality() {
        let mut f = fixture();
        f.graph
            .add_constraint(
                LayoutConstraint::relating(f.a, Width, f.a, Width, f.a).with_constant(5.0),
            )
            .unwrap();
        assert!(f.graph.validate_element(f.a).is_err());
    }

    #[test]
    fn test_validate_checks_each_element_on_its_own() {
        // Arrange
        let mut f = fixture();
        f.graph
            .add_constraint(
                LayoutConstraint::relating(f.a, Left, f.b, Left, f.group).with_constant(10.0),
            )
            .unwrap();
        f.graph
            .add_constraint(
                LayoutConstraint::relating(f.b, Left, f.a, Left, f.group).with_constant(10.0),
            )
            .unwrap();

        // Act / Assert
        assert!(f.graph.validate_element(f.a).is_ok());
        assert!(f.graph.validate_element(f.b).is_ok());
    }

    #[test]
    fn test_find_in_matches_key_within_scope_only() {
        let f = fixture();
        let scope = [f.a];
        assert_eq!(f.graph.find_in(&scope, "a"), Some(f.a));
        assert_eq!(f.graph.find_in(&scope, "b"), None);
    }
}
