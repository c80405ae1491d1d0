//! Constraint manager: edits the constraint set around one element.
//!
//! A [`ConstraintManager`] is a mutable borrow of an [`ElementGraph`] scoped to
//! a single *managed* element.  Every editing operation reads current geometry
//! from a caller-supplied [`Metrics`] table and rewrites constraints so that
//! the edit takes effect without leaving any element over-determined.
//!
//! # How conflicts are kept out (for beginners)
//!
//! On each axis an element is fully placed by exactly two attributes: for
//! example `left + width`, `left + right` or `centerX + width`.  A third
//! required equality on the same axis can only be redundant or contradictory,
//! so before a new constraint is installed the manager removes the attributes
//! it would clash with and, when the new constraint leaves the axis
//! under-determined, derives a replacement (a fixed size or a parent-relative
//! center) from the current metrics.  See [`replacement_candidates`].
//!
//! # Transactions
//!
//! Every public mutating operation is all-or-nothing: when it fails, the
//! constraint table is restored to what it was before the call.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::constraint::{Axis, ConstraintId, LayoutAttribute, LayoutConstraint};
use super::element::ElementId;
use super::geometry::{Metrics, Point, Rect, Size};
use super::graph::{ConstraintError, Dependency, ElementGraph, LayoutConfiguration, Order};
use crate::format::{self, FormatError, PseudoConstraint};

use LayoutAttribute::*;

/// Attributes to remove and attributes to derive from metrics when a
/// constraint on `attribute` is added to an element configured as `config`.
pub fn replacement_candidates(
    config: &LayoutConfiguration,
    attribute: LayoutAttribute,
) -> (Vec<LayoutAttribute>, Vec<LayoutAttribute>) {
    let set = |a| config.is_set(a);
    match attribute {
        Bottom | Baseline => edge(set(Height), set(CenterY), CenterY, Top, Height),
        Top => edge(set(Height), set(CenterY), CenterY, Bottom, Height),
        Left | Leading => edge(set(Width), set(CenterX), CenterX, Right, Width),
        Right | Trailing => edge(set(Width), set(CenterX), CenterX, Left, Width),
        CenterX if set(Width) => (vec![if set(Left) { Left } else { Right }], vec![]),
        CenterX => (vec![Left, Right], vec![Width]),
        CenterY if set(Height) => (vec![if set(Top) { Top } else { Bottom }], vec![]),
        CenterY => (vec![Top, Bottom], vec![Height]),
        Width if set(CenterX) => (vec![if set(Left) { Left } else { Right }], vec![]),
        Width => (vec![Left, Right], vec![CenterX]),
        Height if set(CenterY) => (vec![if set(Top) { Top } else { Bottom }], vec![]),
        Height => (vec![Top, Bottom], vec![CenterY]),
        NotAnAttribute => (vec![], vec![]),
    }
}

fn edge(
    size_set: bool,
    center_set: bool,
    center: LayoutAttribute,
    opposite: LayoutAttribute,
    size: LayoutAttribute,
) -> (Vec<LayoutAttribute>, Vec<LayoutAttribute>) {
    match (size_set, center_set) {
        (true, true) => (vec![center], vec![]),
        (true, false) => (vec![opposite], vec![]),
        (false, _) => (vec![center, opposite], vec![size]),
    }
}

fn frame(metrics: &Metrics, id: ElementId) -> Result<Rect, ConstraintError> {
    metrics
        .frame(id)
        .ok_or_else(|| ConstraintError::MissingMetrics(id.identifier()))
}

fn axis_of(attribute: LayoutAttribute) -> Result<Axis, ConstraintError> {
    attribute
        .axis()
        .ok_or_else(|| ConstraintError::InvalidConstraint(format!("{attribute} has no axis")))
}

fn size_along(size: Size, axis: Axis) -> f64 {
    match axis {
        Axis::Horizontal => size.width,
        Axis::Vertical => size.height,
    }
}

const POSITIONS: [LayoutAttribute; 6] = [Left, Right, Top, Bottom, CenterX, CenterY];

/// Constraint editor for one element of an [`ElementGraph`].
#[derive(Debug)]
pub struct ConstraintManager<'g> {
    graph: &'g mut ElementGraph,
    element: ElementId,
}

impl<'g> ConstraintManager<'g> {
    pub(crate) fn new(graph: &'g mut ElementGraph, element: ElementId) -> Self {
        Self { graph, element }
    }

    /// The managed element.
    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn graph(&self) -> &ElementGraph {
        &*self.graph
    }

    fn atomically<T>(
        &mut self,
        operation: &'static str,
        body: impl FnOnce(&mut Self) -> Result<T, ConstraintError>,
    ) -> Result<T, ConstraintError> {
        let snapshot = self.graph.snapshot();
        let result = body(self);
        if let Err(e) = &result {
            warn!(element = %self.element, operation, error = %e, "constraint edit rolled back");
            self.graph.restore(snapshot);
        }
        result
    }

    fn require_subelement(&self, child: ElementId) -> Result<(), ConstraintError> {
        self.graph.get(child)?;
        if self.graph.is_subelement_of(child, self.element) {
            Ok(())
        } else {
            Err(ConstraintError::NotASubelement {
                parent: self.element,
                child,
            })
        }
    }

    fn remove_all(&mut self, ids: Vec<ConstraintId>) {
        for id in ids {
            self.graph.remove_constraint(id);
        }
    }

    /// Value of `item.attribute` expressed in the coordinate space of
    /// `first`'s parent.
    fn measure(
        &self,
        metrics: &Metrics,
        first: ElementId,
        item: ElementId,
        attribute: LayoutAttribute,
    ) -> Result<f64, ConstraintError> {
        let rect = if item != first && self.graph.parent_of(first) == Some(item) {
            frame(metrics, item)?.bounds()
        } else if self.graph.parent_of(item) == Some(first) {
            let origin = frame(metrics, first)?.origin;
            frame(metrics, item)?.offset_by(origin)
        } else {
            frame(metrics, item)?
        };
        rect.value_of(attribute)
            .ok_or_else(|| ConstraintError::InvalidConstraint(format!("cannot measure {attribute}")))
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn owned_constraints(&self) -> Vec<ConstraintId> {
        self.graph.owned_constraints(self.element)
    }

    pub fn intrinsic_constraints(&self) -> Vec<ConstraintId> {
        self.graph.intrinsic_constraints(self.element)
    }

    pub fn subelement_constraints(&self) -> Vec<ConstraintId> {
        self.graph.subelement_constraints(self.element)
    }

    pub fn dependent_constraints(&self) -> Vec<ConstraintId> {
        self.graph.dependent_constraints(self.element)
    }

    pub fn dependent_child_constraints(&self) -> Vec<ConstraintId> {
        self.graph.dependent_child_constraints(self.element)
    }

    pub fn dependent_sibling_constraints(&self) -> Vec<ConstraintId> {
        self.graph.dependent_sibling_constraints(self.element)
    }

    pub fn constraints_for_attribute(
        &self,
        attribute: LayoutAttribute,
        order: Order,
    ) -> Vec<ConstraintId> {
        self.graph
            .constraints_for_attribute(self.element, attribute, order)
    }

    pub fn constraints_affecting_axis(&self, axis: Axis, order: Order) -> Vec<ConstraintId> {
        self.graph
            .constraints_affecting_axis(self.element, axis, order)
    }

    pub fn layout_configuration(&self) -> LayoutConfiguration {
        self.graph.layout_configuration(self.element)
    }

    pub fn dependency_for_attribute(&self, attribute: LayoutAttribute) -> Dependency {
        self.layout_configuration()
            .dependency_for_attribute(attribute)
    }

    pub fn proportion_lock(&self) -> bool {
        self.layout_configuration().has_proportion_lock()
    }

    pub fn replacement_candidates(
        &self,
        attribute: LayoutAttribute,
    ) -> (Vec<LayoutAttribute>, Vec<LayoutAttribute>) {
        replacement_candidates(&self.layout_configuration(), attribute)
    }

    /// Owned constraints printed as format lines.  Elements are named by key
    /// when they have one, by identifier otherwise.
    pub fn constraints_description(&self) -> String {
        let name_of = |id: ElementId| {
            self.graph
                .element(id)
                .and_then(|e| e.key.clone())
                .unwrap_or_else(|| id.identifier())
        };
        let lines: Vec<PseudoConstraint> = self
            .owned_constraints()
            .into_iter()
            .filter_map(|id| self.graph.constraint(id))
            .map(|c| PseudoConstraint::from_constraint(c, &name_of))
            .collect();
        format::print(&lines)
    }

    // ── Operations ───────────────────────────────────────────────────────────

    /// Replaces the managed element's constraints with those described by
    /// `text`.
    ///
    /// Names may refer to the managed element or any of its subelements, by
    /// identifier, UUID or key.  Nothing is changed when any line fails to
    /// parse, names an unknown element, or the result would be unsatisfiable.
    pub fn set_constraints_from_string(
        &mut self,
        text: &str,
    ) -> Result<Vec<ConstraintId>, ConstraintError> {
        self.set_constraints_with_index(text, &HashMap::new())
    }

    /// Like [`set_constraints_from_string`](Self::set_constraints_from_string),
    /// but names found in `index` resolve to the element they map to.  Index
    /// entries must point at the managed element or one of its subelements.
    pub fn set_constraints_with_index(
        &mut self,
        text: &str,
        index: &HashMap<String, ElementId>,
    ) -> Result<Vec<ConstraintId>, ConstraintError> {
        let mut scope = vec![self.element];
        scope.extend_from_slice(self.graph.subelements_of(self.element));

        let drafts = format::parse(text).and_then(|parsed| {
            parsed
                .iter()
                .map(|p| self.resolve_names(p, &scope, index))
                .collect::<Result<Vec<_>, FormatError>>()
        });
        let drafts = match drafts {
            Ok(d) => d,
            Err(e) => {
                warn!(element = %self.element, error = %e, "ignoring malformed constraint format");
                return Err(e.into());
            }
        };

        self.atomically("set_constraints_from_string", |m| {
            let owned = m.graph.owned_constraints(m.element);
            m.remove_all(owned);
            let ids = drafts
                .into_iter()
                .map(|d| m.graph.add_constraint(d))
                .collect::<Result<Vec<_>, _>>()?;
            for item in &scope {
                m.graph.validate_element(*item)?;
            }
            debug!(element = %m.element, count = ids.len(), "installed constraints from format");
            Ok(ids)
        })
    }

    fn resolve_names(
        &self,
        pseudo: &PseudoConstraint,
        scope: &[ElementId],
        index: &HashMap<String, ElementId>,
    ) -> Result<LayoutConstraint, FormatError> {
        let lookup = |name: &str| {
            index
                .get(name)
                .copied()
                .filter(|id| scope.contains(id))
                .or_else(|| self.graph.find_in(scope, name))
                .ok_or_else(|| FormatError::UnknownElement {
                    line: pseudo.line,
                    name: name.to_string(),
                })
        };
        let first_item = lookup(&pseudo.first_item)?;
        let second_item = pseudo.second_item.as_deref().map(lookup).transpose()?;
        Ok(LayoutConstraint {
            identifier: pseudo.identifier.clone(),
            first_item,
            first_attribute: pseudo.first_attribute,
            relation: pseudo.relation,
            second_item,
            second_attribute: pseudo.second_attribute,
            multiplier: pseudo.multiplier,
            constant: pseudo.constant,
            priority: pseudo.priority,
            owner: self.element,
        })
    }

    /// Fixes `subelement`'s size along `attribute`'s axis to `size`.
    ///
    /// For a position attribute, every other position constraint on that axis
    /// is dropped, so the subelement ends up placed by `attribute` plus the
    /// new fixed size.  For a size attribute, at most one position constraint
    /// survives on the axis (left/top first, then center, then right/bottom).
    pub fn freeze_size(
        &mut self,
        size: Size,
        subelement: ElementId,
        attribute: LayoutAttribute,
    ) -> Result<ConstraintId, ConstraintError> {
        self.require_subelement(subelement)?;
        let axis = axis_of(attribute)?;
        self.atomically("freeze_size", |m| {
            let size_attribute = axis.size_attribute();
            let mut doomed = vec![size_attribute];
            if attribute.is_position() {
                let keep = attribute.canonical();
                doomed.extend(
                    axis.attributes()
                        .into_iter()
                        .filter(|a| a.is_position() && *a != keep),
                );
            } else {
                let config = m.graph.layout_configuration(subelement);
                let [low, high, _, center] = axis.attributes();
                let mut kept = false;
                for candidate in [low, center, high] {
                    if config.is_set(candidate) {
                        if kept {
                            doomed.push(candidate);
                        }
                        kept = true;
                    }
                }
            }
            for a in doomed {
                let ids = m.graph.constraints_for_attribute(subelement, a, Order::First);
                m.remove_all(ids);
            }

            let value = size_along(size, axis);
            let id = m
                .graph
                .add_constraint(LayoutConstraint::fixed(subelement, size_attribute, value))?;
            m.graph.validate_element(subelement)?;
            debug!(element = %subelement, %size_attribute, value, "froze size");
            Ok(id)
        })
    }

    /// Rewrites each of `constraints` whose first attribute is in
    /// `attributes` so that it depends on the first item's parent (positions)
    /// or on nothing (sizes), keeping the geometry recorded in `metrics`.
    ///
    /// Freezing an already frozen constraint reproduces the same constants.
    pub fn freeze_constraints(
        &mut self,
        constraints: &[ConstraintId],
        attributes: &[LayoutAttribute],
        metrics: &Metrics,
    ) -> Result<Vec<ConstraintId>, ConstraintError> {
        self.atomically("freeze_constraints", |m| {
            let mut frozen = Vec::new();
            for id in constraints {
                let Some(c) = m.graph.constraint(*id).cloned() else {
                    continue;
                };
                let attribute = c.first_attribute.canonical();
                if !attributes.iter().any(|a| a.canonical() == attribute) {
                    continue;
                }
                let current = frame(metrics, c.first_item)?;
                let rewritten = if attribute.is_size() {
                    LayoutConstraint {
                        first_attribute: attribute,
                        second_item: None,
                        second_attribute: NotAnAttribute,
                        multiplier: 1.0,
                        constant: current.value_of(attribute).unwrap_or_default(),
                        owner: c.first_item,
                        ..c
                    }
                } else {
                    let Some(parent) = m.graph.parent_of(c.first_item) else {
                        debug!(constraint = %id, "cannot freeze position of a root element");
                        continue;
                    };
                    let bounds = frame(metrics, parent)?.bounds();
                    let constant = current.value_of(attribute).unwrap_or_default()
                        - bounds.value_of(attribute).unwrap_or_default();
                    LayoutConstraint {
                        first_attribute: attribute,
                        second_item: Some(parent),
                        second_attribute: attribute,
                        multiplier: 1.0,
                        constant,
                        owner: parent,
                        ..c
                    }
                };
                m.graph.replace_constraint(*id, rewritten)?;
                frozen.push(*id);
            }
            debug!(element = %m.element, count = frozen.len(), "froze constraints");
            Ok(frozen)
        })
    }

    /// Makes each of `subelements` match `sibling` along `attribute`
    /// (`Width` or `Height`).
    pub fn resize_subelements(
        &mut self,
        subelements: &[ElementId],
        sibling: ElementId,
        attribute: LayoutAttribute,
        metrics: &Metrics,
    ) -> Result<(), ConstraintError> {
        let filter = match attribute {
            Width => [Left, Right, Width],
            Height => [Top, Bottom, Height],
            other => {
                return Err(ConstraintError::InvalidConstraint(format!(
                    "cannot resize along {other}"
                )))
            }
        };
        self.require_subelement(sibling)?;
        for e in subelements {
            self.require_subelement(*e)?;
        }
        self.atomically("resize_subelements", |m| {
            for e in subelements {
                let dependents = m.graph.dependent_sibling_constraints(*e);
                m.freeze_constraints(&dependents, &filter, metrics)?;
            }
            for e in subelements.iter().filter(|e| **e != sibling) {
                m.remove_proportion_lock(*e, frame(metrics, *e)?.size)?;
                let existing = m.graph.constraints_for_attribute(*e, attribute, Order::First);
                m.remove_all(existing);
                let draft =
                    LayoutConstraint::relating(*e, attribute, sibling, attribute, m.element);
                m.add_constraint_resolving(draft, metrics)?;
            }
            debug!(element = %m.element, %sibling, %attribute, "resized subelements");
            Ok(())
        })
    }

    /// Adjusts `element`'s constraints for a size change from `from` to `to`.
    ///
    /// The element keeps its center: edge constants move by half the change,
    /// fixed sizes take the new value and relative sizes are offset by the
    /// change.  Siblings positioned against `element` are first pinned to the
    /// parent using `metrics`, so they stay where they are.
    pub fn resize_element(
        &mut self,
        element: ElementId,
        from: Size,
        to: Size,
        metrics: &Metrics,
    ) -> Result<(), ConstraintError> {
        if element != self.element {
            self.require_subelement(element)?;
        }
        self.atomically("resize_element", |m| {
            if m.graph.layout_configuration(element).has_proportion_lock()
                && from.aspect_ratio() != to.aspect_ratio()
            {
                m.remove_proportion_lock(element, from)?;
            }

            let dw = from.width - to.width;
            let dh = from.height - to.height;

            if m.graph.parent_of(element).is_some() {
                let mut filter = Vec::new();
                if dw != 0.0 {
                    filter.extend(Axis::Horizontal.attributes());
                }
                if dh != 0.0 {
                    filter.extend(Axis::Vertical.attributes());
                }
                if !filter.is_empty() {
                    let dependents = m.graph.dependent_sibling_constraints(element);
                    m.freeze_constraints(&dependents, &filter, metrics)?;
                }
            }

            for id in m.graph.first_order_constraints(element) {
                let Some(c) = m.graph.constraint_mut(id) else {
                    continue;
                };
                let relative_to_other = c.second_item.is_some() && c.second_item != Some(element);
                match c.first_attribute {
                    Left | Leading => c.constant += dw / 2.0,
                    Right | Trailing => c.constant -= dw / 2.0,
                    Top => c.constant += dh / 2.0,
                    Bottom | Baseline => c.constant -= dh / 2.0,
                    Width if dw != 0.0 => {
                        if c.is_static() {
                            c.constant = to.width;
                        } else if relative_to_other {
                            c.constant -= dw;
                        }
                    }
                    Height if dh != 0.0 => {
                        if c.is_static() {
                            c.constant = to.height;
                        } else if relative_to_other {
                            c.constant -= dh;
                        }
                    }
                    _ => {}
                }
            }
            debug!(%element, ?from, ?to, "resized element");
            Ok(())
        })
    }

    /// Aligns `attribute` of each of `subelements` with the same attribute of
    /// `sibling`.  Each subelement keeps its current size along the axis.
    pub fn align_subelements(
        &mut self,
        subelements: &[ElementId],
        sibling: ElementId,
        attribute: LayoutAttribute,
        metrics: &Metrics,
    ) -> Result<(), ConstraintError> {
        if !attribute.is_position() {
            return Err(ConstraintError::InvalidConstraint(format!(
                "cannot align on {attribute}"
            )));
        }
        let filter = match axis_of(attribute)? {
            Axis::Horizontal => [Left, Right, CenterX],
            Axis::Vertical => [Top, Bottom, CenterY],
        };
        self.require_subelement(sibling)?;
        for e in subelements {
            self.require_subelement(*e)?;
        }
        self.atomically("align_subelements", |m| {
            for e in subelements {
                let dependents = m.graph.dependent_sibling_constraints(*e);
                m.freeze_constraints(&dependents, &filter, metrics)?;
            }
            for e in subelements.iter().filter(|e| **e != sibling) {
                m.freeze_size(frame(metrics, *e)?.size, *e, attribute)?;
                let existing = m.graph.constraints_for_attribute(*e, attribute, Order::First);
                m.remove_all(existing);
                let draft =
                    LayoutConstraint::relating(*e, attribute, sibling, attribute, m.element);
                m.add_constraint_resolving(draft, metrics)?;
            }
            debug!(element = %m.element, %sibling, %attribute, "aligned subelements");
            Ok(())
        })
    }

    /// Shrinks the managed element to the union of its children's frames.
    ///
    /// Does nothing and returns `None` unless the element's `shrink_wrap`
    /// flag is set and it has children.  Otherwise returns the element's new
    /// frame (in its parent's coordinate space).  Children stay where they are
    /// on screen; the element's own constraints are adjusted to the new edges.
    pub fn shrink_wrap_subelements(
        &mut self,
        metrics: &Metrics,
    ) -> Result<Option<Rect>, ConstraintError> {
        let managed = self.graph.get(self.element)?;
        if !managed.shrink_wrap || managed.subelements().is_empty() {
            return Ok(None);
        }
        let children = managed.subelements().to_vec();

        self.atomically("shrink_wrap_subelements", |m| {
            let mut union: Option<Rect> = None;
            for child in &children {
                let f = frame(metrics, *child)?;
                union = Some(union.map_or(f, |u| u.union(&f)));
            }
            let Some(union) = union else {
                return Ok(None);
            };
            let old = frame(metrics, m.element)?;
            let new_frame = Rect::new(
                old.min_x() + union.min_x(),
                old.min_y() + union.min_y(),
                union.width(),
                union.height(),
            );

            if m.graph.parent_of(m.element).is_some() {
                let dependents = m.graph.dependent_sibling_constraints(m.element);
                let all: Vec<LayoutAttribute> = LayoutAttribute::ALL.to_vec();
                m.freeze_constraints(&dependents, &all, metrics)?;
            }

            let mut adjusted = metrics.clone();
            let shift = Point::new(-union.min_x(), -union.min_y());
            for child in &children {
                adjusted.insert(*child, frame(metrics, *child)?.offset_by(shift));
            }
            adjusted.insert(m.element, new_frame);
            let parent_relative: Vec<ConstraintId> = m
                .graph
                .dependent_child_constraints(m.element);
            let all: Vec<LayoutAttribute> = LayoutAttribute::ALL.to_vec();
            m.freeze_constraints(&parent_relative, &all, &adjusted)?;

            if m.graph.layout_configuration(m.element).has_proportion_lock()
                && old.size.aspect_ratio() != union.size.aspect_ratio()
            {
                m.remove_proportion_lock(m.element, old.size)?;
            }

            let element = m.element;
            for id in m.graph.first_order_constraints(element) {
                let Some(c) = m.graph.constraint_mut(id) else {
                    continue;
                };
                let relative_to_other = c.second_item.is_some() && c.second_item != Some(element);
                match c.first_attribute {
                    Left | Leading => c.constant += union.min_x(),
                    Right | Trailing => c.constant -= old.width() - union.max_x(),
                    CenterX => c.constant += union.mid_x() - old.width() / 2.0,
                    Top => c.constant += union.min_y(),
                    Bottom | Baseline => c.constant -= old.height() - union.max_y(),
                    CenterY => c.constant += union.mid_y() - old.height() / 2.0,
                    Width if c.is_static() => c.constant = union.width(),
                    Width if relative_to_other => c.constant -= old.width() - union.width(),
                    Height if c.is_static() => c.constant = union.height(),
                    Height if relative_to_other => c.constant -= old.height() - union.height(),
                    _ => {}
                }
            }

            let config = m.graph.layout_configuration(element);
            if !config.is_set(Width) && !(config.is_set(Left) && config.is_set(Right)) {
                m.graph
                    .add_constraint(LayoutConstraint::fixed(element, Width, union.width()))?;
            }
            if !config.is_set(Height) && !(config.is_set(Top) && config.is_set(Bottom)) {
                m.graph
                    .add_constraint(LayoutConstraint::fixed(element, Height, union.height()))?;
            }
            m.graph.validate_element(element)?;
            debug!(%element, ?new_frame, "shrink-wrapped subelements");
            Ok(Some(new_frame))
        })
    }

    /// Moves each of `subelements` by `translation`.
    ///
    /// Siblings positioned against a moved subelement are first pinned to the
    /// parent, so only the listed subelements move.
    pub fn translate_subelements(
        &mut self,
        subelements: &[ElementId],
        translation: Point,
        metrics: &Metrics,
    ) -> Result<(), ConstraintError> {
        for e in subelements {
            self.require_subelement(*e)?;
        }
        self.atomically("translate_subelements", |m| {
            for e in subelements {
                let dependents = m.graph.dependent_sibling_constraints(*e);
                m.freeze_constraints(&dependents, &POSITIONS, metrics)?;
            }
            for e in subelements {
                for id in m.graph.first_order_constraints(*e) {
                    let against_own_child = m
                        .graph
                        .constraint(id)
                        .and_then(|c| c.second_item)
                        .map_or(false, |s| m.graph.parent_of(s) == Some(*e));
                    if against_own_child {
                        continue;
                    }
                    let Some(c) = m.graph.constraint_mut(id) else {
                        continue;
                    };
                    match c.first_attribute.axis() {
                        _ if c.first_attribute.is_size() => {}
                        Some(Axis::Horizontal) => c.constant += translation.x,
                        Some(Axis::Vertical) => c.constant += translation.y,
                        None => {}
                    }
                }
            }
            debug!(element = %m.element, count = subelements.len(), ?translation, "translated subelements");
            Ok(())
        })
    }

    /// Turns every proportional constraint on a subelement into an offset
    /// constraint that yields the same value at the current geometry.
    pub fn remove_multipliers(
        &mut self,
        metrics: &Metrics,
    ) -> Result<Vec<ConstraintId>, ConstraintError> {
        self.atomically("remove_multipliers", |m| {
            let element = m.element;
            let targets: Vec<(ConstraintId, LayoutConstraint)> = m
                .graph
                .constraints()
                .filter(|(_, c)| {
                    m.graph.parent_of(c.first_item) == Some(element)
                        && c.second_item.map_or(false, |s| s != c.first_item)
                        && c.multiplier != 1.0
                })
                .map(|(id, c)| (id, c.clone()))
                .collect();

            let mut changed = Vec::with_capacity(targets.len());
            for (id, c) in targets {
                let Some(second) = c.second_item else {
                    continue;
                };
                let first_value = m.measure(metrics, c.first_item, c.first_item, c.first_attribute)?;
                let second_value = m.measure(metrics, c.first_item, second, c.second_attribute)?;
                let rewritten = LayoutConstraint {
                    multiplier: 1.0,
                    constant: first_value - second_value,
                    ..c
                };
                m.graph.replace_constraint(id, rewritten)?;
                changed.push(id);
            }
            debug!(%element, count = changed.len(), "removed multipliers");
            Ok(changed)
        })
    }

    /// Replaces any width/height lock on `element` with fixed sizes taken
    /// from `current_size`.  Returns whether a lock was removed.
    pub fn remove_proportion_lock(
        &mut self,
        element: ElementId,
        current_size: Size,
    ) -> Result<bool, ConstraintError> {
        self.graph.get(element)?;
        self.atomically("remove_proportion_lock", |m| {
            let locks: Vec<(ConstraintId, LayoutConstraint)> = m
                .graph
                .first_order_constraints(element)
                .into_iter()
                .filter_map(|id| m.graph.constraint(id).map(|c| (id, c.clone())))
                .filter(|(_, c)| c.is_proportion_lock())
                .collect();
            for (id, c) in &locks {
                let value = match c.first_attribute {
                    Width => current_size.width,
                    _ => current_size.height,
                };
                let fixed = LayoutConstraint {
                    identifier: c.identifier.clone(),
                    priority: c.priority,
                    ..LayoutConstraint::fixed(element, c.first_attribute, value)
                };
                m.graph.replace_constraint(*id, fixed)?;
            }
            if !locks.is_empty() {
                debug!(%element, ?current_size, "removed proportion lock");
            }
            Ok(!locks.is_empty())
        })
    }

    /// Removes or derives constraints on `constraint`'s first item so that
    /// `constraint` can be added without over-determining it.
    ///
    /// Existing constraints on the same attribute at or below the new
    /// constraint's priority are removed; clashing attributes on the same axis
    /// are removed; when the axis would be left under-determined a fixed size
    /// or a parent-relative center is derived from `metrics`.  Returns the
    /// derived constraints.
    ///
    /// Priority is only compared for the same attribute.  Clashing attributes
    /// on the axis are removed whatever their priority, so an optional width
    /// still replaces required left and right edges.
    pub fn resolve_conflicts_for_constraint(
        &mut self,
        constraint: &LayoutConstraint,
        metrics: &Metrics,
    ) -> Result<Vec<ConstraintId>, ConstraintError> {
        let item = constraint.first_item;
        self.graph.get(item)?;
        self.atomically("resolve_conflicts_for_constraint", |m| {
            let config = m.graph.layout_configuration(item);
            let (removals, additions) = replacement_candidates(&config, constraint.first_attribute);

            let attribute = constraint.first_attribute.canonical();
            let doomed: Vec<ConstraintId> = m
                .graph
                .constraints()
                .filter(|(_, c)| c.first_item == item)
                .filter(|(_, c)| {
                    let a = c.first_attribute.canonical();
                    removals.iter().any(|r| r.canonical() == a)
                        || (a == attribute && c.priority <= constraint.priority)
                })
                .map(|(id, _)| id)
                .collect();
            m.remove_all(doomed);

            let mut derived = Vec::new();
            for addition in additions {
                if !m
                    .graph
                    .constraints_for_attribute(item, addition, Order::First)
                    .is_empty()
                {
                    continue;
                }
                let current = frame(metrics, item)?;
                let draft = if addition.is_size() {
                    LayoutConstraint::fixed(item, addition, current.value_of(addition).unwrap_or_default())
                } else {
                    let Some(parent) = m.graph.parent_of(item) else {
                        debug!(element = %item, %addition, "root element has no parent to center in");
                        continue;
                    };
                    let bounds = frame(metrics, parent)?.bounds();
                    let constant = current.value_of(addition).unwrap_or_default()
                        - bounds.value_of(addition).unwrap_or_default();
                    LayoutConstraint::relating(item, addition, parent, addition, parent)
                        .with_constant(constant)
                };
                derived.push(m.graph.add_constraint(draft)?);
            }
            debug!(element = %item, attribute = %constraint.first_attribute, derived = derived.len(), "resolved conflicts");
            Ok(derived)
        })
    }

    /// Resolves conflicts for `constraint`, adds it and checks that its first
    /// item is still satisfiable.
    pub fn add_constraint_resolving(
        &mut self,
        constraint: LayoutConstraint,
        metrics: &Metrics,
    ) -> Result<ConstraintId, ConstraintError> {
        self.atomically("add_constraint_resolving", |m| {
            m.resolve_conflicts_for_constraint(&constraint, metrics)?;
            let item = constraint.first_item;
            let id = m.graph.add_constraint(constraint)?;
            m.graph.validate_element(item)?;
            Ok(id)
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
