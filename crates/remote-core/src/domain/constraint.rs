//! Layout constraints between remote elements.
//!
//! A constraint states
//!
//! ```text
//! first_item.first_attribute  <relation>  second_item.second_attribute * multiplier + constant
//! ```
//!
//! A constraint without a second item is *static*: it fixes the first
//! attribute to `constant`.  Items are [`ElementId`]s into the owning
//! [`crate::domain::graph::ElementGraph`], never references.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::element::ElementId;

/// Priority of a constraint that must hold.
pub const PRIORITY_REQUIRED: f32 = 1000.0;
pub const PRIORITY_DEFAULT_HIGH: f32 = 750.0;
pub const PRIORITY_DEFAULT_LOW: f32 = 250.0;

/// A geometric attribute of an element's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayoutAttribute {
    Left,
    Right,
    Top,
    Bottom,
    Leading,
    Trailing,
    Width,
    Height,
    CenterX,
    CenterY,
    Baseline,
    NotAnAttribute,
}

/// Horizontal or vertical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    /// The canonical attributes on this axis: both edges, size, center.
    pub fn attributes(&self) -> [LayoutAttribute; 4] {
        use LayoutAttribute::*;
        match self {
            Axis::Horizontal => [Left, Right, Width, CenterX],
            Axis::Vertical => [Top, Bottom, Height, CenterY],
        }
    }

    pub fn size_attribute(&self) -> LayoutAttribute {
        match self {
            Axis::Horizontal => LayoutAttribute::Width,
            Axis::Vertical => LayoutAttribute::Height,
        }
    }

    pub fn center_attribute(&self) -> LayoutAttribute {
        match self {
            Axis::Horizontal => LayoutAttribute::CenterX,
            Axis::Vertical => LayoutAttribute::CenterY,
        }
    }
}

impl LayoutAttribute {
    /// Every real attribute, in the order used when printing.
    pub const ALL: [LayoutAttribute; 11] = [
        LayoutAttribute::Left,
        LayoutAttribute::Right,
        LayoutAttribute::Top,
        LayoutAttribute::Bottom,
        LayoutAttribute::Leading,
        LayoutAttribute::Trailing,
        LayoutAttribute::Width,
        LayoutAttribute::Height,
        LayoutAttribute::CenterX,
        LayoutAttribute::CenterY,
        LayoutAttribute::Baseline,
    ];

    pub fn axis(&self) -> Option<Axis> {
        use LayoutAttribute::*;
        match self {
            Left | Right | Leading | Trailing | Width | CenterX => Some(Axis::Horizontal),
            Top | Bottom | Height | CenterY | Baseline => Some(Axis::Vertical),
            NotAnAttribute => None,
        }
    }

    /// Folds aliases onto the eight canonical attributes: leading/trailing
    /// become left/right and baseline becomes bottom.
    pub fn canonical(&self) -> LayoutAttribute {
        use LayoutAttribute::*;
        match self {
            Leading => Left,
            Trailing => Right,
            Baseline => Bottom,
            other => *other,
        }
    }

    pub fn is_size(&self) -> bool {
        matches!(self, LayoutAttribute::Width | LayoutAttribute::Height)
    }

    pub fn is_position(&self) -> bool {
        !self.is_size() && *self != LayoutAttribute::NotAnAttribute
    }

    pub fn name(&self) -> &'static str {
        use LayoutAttribute::*;
        match self {
            Left => "left",
            Right => "right",
            Top => "top",
            Bottom => "bottom",
            Leading => "leading",
            Trailing => "trailing",
            Width => "width",
            Height => "height",
            CenterX => "centerX",
            CenterY => "centerY",
            Baseline => "baseline",
            NotAnAttribute => "notAnAttribute",
        }
    }

    /// Parses an attribute name.  Margin variants (`leftMargin`,
    /// `centerXWithinMargins`, ...) resolve to the plain attribute.
    pub fn from_name(name: &str) -> Option<Self> {
        use LayoutAttribute::*;
        let base = name
            .strip_suffix("WithinMargins")
            .or_else(|| name.strip_suffix("Margin"))
            .unwrap_or(name);
        let attribute = match base {
            "left" => Left,
            "right" => Right,
            "top" => Top,
            "bottom" => Bottom,
            "leading" => Leading,
            "trailing" => Trailing,
            "width" => Width,
            "height" => Height,
            "centerX" => CenterX,
            "centerY" => CenterY,
            "baseline" | "lastBaseline" | "firstBaseline" => Baseline,
            _ => return None,
        };
        Some(attribute)
    }
}

impl fmt::Display for LayoutAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the two sides of a constraint compare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    #[default]
    Equal,
    GreaterOrEqual,
    LessOrEqual,
}

impl Relation {
    pub fn symbol(&self) -> &'static str {
        match self {
            Relation::Equal => "=",
            Relation::GreaterOrEqual => ">=",
            Relation::LessOrEqual => "<=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" | "==" => Some(Relation::Equal),
            ">=" | "≥" => Some(Relation::GreaterOrEqual),
            "<=" | "≤" => Some(Relation::LessOrEqual),
            _ => None,
        }
    }
}

/// Handle to a constraint stored in the graph.
///
/// Handles are allocated in increasing order and never reused, so ordering by
/// handle is ordering by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstraintId(pub(crate) u64);

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One geometric relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConstraint {
    /// Optional tag, printed as the quoted prefix of a format line.
    pub identifier: Option<String>,
    pub first_item: ElementId,
    pub first_attribute: LayoutAttribute,
    pub relation: Relation,
    pub second_item: Option<ElementId>,
    pub second_attribute: LayoutAttribute,
    pub multiplier: f64,
    pub constant: f64,
    pub priority: f32,
    /// The element whose constraint set contains this constraint.
    pub owner: ElementId,
}

impl LayoutConstraint {
    /// `first.attribute = second.second_attribute`, owned by `owner`.
    pub fn relating(
        first: ElementId,
        attribute: LayoutAttribute,
        second: ElementId,
        second_attribute: LayoutAttribute,
        owner: ElementId,
    ) -> Self {
        Self {
            identifier: None,
            first_item: first,
            first_attribute: attribute,
            relation: Relation::Equal,
            second_item: Some(second),
            second_attribute,
            multiplier: 1.0,
            constant: 0.0,
            priority: PRIORITY_REQUIRED,
            owner,
        }
    }

    /// `first.attribute = value`, owned by `first`.
    pub fn fixed(first: ElementId, attribute: LayoutAttribute, value: f64) -> Self {
        Self {
            identifier: None,
            first_item: first,
            first_attribute: attribute,
            relation: Relation::Equal,
            second_item: None,
            second_attribute: LayoutAttribute::NotAnAttribute,
            multiplier: 1.0,
            constant: value,
            priority: PRIORITY_REQUIRED,
            owner: first,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_constant(mut self, constant: f64) -> Self {
        self.constant = constant;
        self
    }

    pub fn with_priority(mut self, priority: f32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relation = relation;
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// `true` when there is no second item.
    pub fn is_static(&self) -> bool {
        self.second_item.is_none()
    }

    pub fn is_required(&self) -> bool {
        self.priority >= PRIORITY_REQUIRED
    }

    /// `true` when the constraint relates an element's width and height
    /// (an aspect-ratio lock).
    pub fn is_proportion_lock(&self) -> bool {
        self.second_item == Some(self.first_item)
            && self.first_attribute.is_size()
            && self.second_attribute.is_size()
            && self.first_attribute != self.second_attribute
    }

    /// `true` when both items are `element`, or the constraint is static on it.
    pub fn is_intrinsic_to(&self, element: ElementId) -> bool {
        self.first_item == element && self.second_item.map_or(true, |s| s == element)
    }

    /// `true` when `element` appears as first item, second item or owner.
    pub fn references(&self, element: ElementId) -> bool {
        self.first_item == element || self.second_item == Some(element) || self.owner == element
    }

    /// Value the first attribute takes when the constraint is satisfied with
    /// equality, given the current value of the second attribute.
    pub fn solve(&self, second_value: Option<f64>) -> f64 {
        match second_value {
            Some(v) if !self.is_static() => v * self.multiplier + self.constant,
            _ => self.constant,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_from_name_resolves_margin_variants() {
        assert_eq!(
            LayoutAttribute::from_name("leftMargin"),
            Some(LayoutAttribute::Left)
        );
        assert_eq!(
            LayoutAttribute::from_name("centerXWithinMargins"),
            Some(LayoutAttribute::CenterX)
        );
        assert_eq!(LayoutAttribute::from_name("diagonal"), None);
    }

    #[test]
    fn test_attribute_canonical_folds_aliases() {
        assert_eq!(LayoutAttribute::Leading.canonical(), LayoutAttribute::Left);
        assert_eq!(LayoutAttribute::Trailing.canonical(), LayoutAttribute::Right);
        assert_eq!(LayoutAttribute::Baseline.canonical(), LayoutAttribute::Bottom);
        assert_eq!(LayoutAttribute::Width.canonical(), LayoutAttribute::Width);
    }

    #[test]
    fn test_attribute_axis_partitions_attributes() {
        assert_eq!(LayoutAttribute::Width.axis(), Some(Axis::Horizontal));
        assert_eq!(LayoutAttribute::Baseline.axis(), Some(Axis::Vertical));
        assert_eq!(LayoutAttribute::NotAnAttribute.axis(), None);
    }

    #[test]
    fn test_relation_from_symbol_accepts_unicode_forms() {
        assert_eq!(Relation::from_symbol("≥"), Some(Relation::GreaterOrEqual));
        assert_eq!(Relation::from_symbol("=="), Some(Relation::Equal));
        assert_eq!(Relation::from_symbol("!="), None);
    }

    #[test]
    fn test_fixed_constraint_is_static_and_self_owned() {
        let a = ElementId::new();
        let c = LayoutConstraint::fixed(a, LayoutAttribute::Width, 40.0);
        assert!(c.is_static());
        assert!(c.is_intrinsic_to(a));
        assert_eq!(c.owner, a);
        assert_eq!(c.solve(None), 40.0);
    }

    #[test]
    fn test_proportion_lock_detection() {
        let a = ElementId::new();
        let lock = LayoutConstraint::relating(
            a,
            LayoutAttribute::Width,
            a,
            LayoutAttribute::Height,
            a,
        )
        .with_multiplier(2.0);
        assert!(lock.is_proportion_lock());
        assert!(!LayoutConstraint::fixed(a, LayoutAttribute::Width, 1.0).is_proportion_lock());
    }

    #[test]
    fn test_solve_applies_multiplier_and_constant() {
        let (a, b) = (ElementId::new(), ElementId::new());
        let c = LayoutConstraint::relating(b, LayoutAttribute::Width, a, LayoutAttribute::Width, a)
            .with_multiplier(0.5)
            .with_constant(10.0);
        assert_eq!(c.solve(Some(100.0)), 60.0);
    }
}
