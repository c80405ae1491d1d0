//! Property tests for constraint-set invariants.
//!
//! Whatever sequence of constraints is added through conflict resolution, an
//! element's constraint set must stay satisfiable, and freezing must be
//! repeatable.

use proptest::prelude::*;
use remote_core::{
    ElementGraph, ElementId, ElementKind, LayoutAttribute, LayoutConstraint, Metrics, Order,
    Rect, RemoteElement,
};

const ATTRIBUTES: [LayoutAttribute; 10] = [
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
];

#[derive(Debug, Clone, Copy)]
enum Target {
    Parent,
    Sibling,
    Fixed,
}

#[derive(Debug, Clone)]
struct Draft {
    attribute: LayoutAttribute,
    target: Target,
    constant: f64,
    priority: f32,
}

fn draft() -> impl Strategy<Value = Draft> {
    (
        0..ATTRIBUTES.len(),
        prop_oneof![Just(Target::Parent), Just(Target::Sibling), Just(Target::Fixed)],
        -50i32..50,
        prop_oneof![Just(250.0f32), Just(750.0f32), Just(1000.0f32)],
    )
        .prop_map(|(i, target, constant, priority)| Draft {
            attribute: ATTRIBUTES[i],
            target,
            constant: f64::from(constant),
            priority,
        })
}

struct Scene {
    graph: ElementGraph,
    group: ElementId,
    a: ElementId,
    b: ElementId,
    metrics: Metrics,
}

fn scene(ax: f64, bx: f64) -> Scene {
    let mut graph = ElementGraph::new();
    let group = graph
        .insert_root(RemoteElement::new(ElementKind::ButtonGroup, "G"))
        .unwrap();
    let a = graph
        .add_subelement(group, RemoteElement::new(ElementKind::Button, "A"))
        .unwrap();
    let b = graph
        .add_subelement(group, RemoteElement::new(ElementKind::Button, "B"))
        .unwrap();
    let metrics = Metrics::new()
        .with(group, Rect::new(0.0, 0.0, 400.0, 200.0))
        .with(a, Rect::new(ax, 10.0, 60.0, 30.0))
        .with(b, Rect::new(bx, 50.0, 40.0, 40.0));
    Scene {
        graph,
        group,
        a,
        b,
        metrics,
    }
}

proptest! {
    #[test]
    fn prop_resolved_constraint_sets_stay_satisfiable(drafts in prop::collection::vec(draft(), 1..24)) {
        let mut s = scene(20.0, 120.0);
        for d in drafts {
            let constraint = match d.target {
                Target::Fixed => LayoutConstraint::fixed(s.a, d.attribute, d.constant.abs()),
                Target::Parent => LayoutConstraint::relating(s.a, d.attribute, s.group, d.attribute, s.group),
                Target::Sibling => LayoutConstraint::relating(s.a, d.attribute, s.b, d.attribute, s.group),
            }
            .with_constant(d.constant)
            .with_priority(d.priority);

            let mut manager = s.graph.constraint_manager(s.group).unwrap();
            prop_assert!(manager.add_constraint_resolving(constraint, &s.metrics).is_ok());
            prop_assert!(s.graph.validate_element(s.a).is_ok());

            for attribute in ATTRIBUTES {
                let same: Vec<_> = s
                    .graph
                    .constraints_for_attribute(s.a, attribute, Order::First)
                    .into_iter()
                    .filter_map(|id| s.graph.constraint(id))
                    .collect();
                for (i, x) in same.iter().enumerate() {
                    for y in &same[i + 1..] {
                        prop_assert!(x.priority != y.priority, "{attribute} fixed twice at {}", x.priority);
                    }
                }
            }
        }
    }

    #[test]
    fn prop_freeze_is_idempotent(ax in 0.0f64..200.0, bx in 0.0f64..200.0, gap in -20i32..20) {
        let mut s = scene(ax, bx);
        let offset = if gap < 0 { format!("- {}", -gap) } else { format!("+ {gap}") };
        let spec = format!(
            "_{a}.left = _{b}.right {offset}\n_{a}.top = _{b}.top\n_{a}.width = _{b}.width * 1.5\n_{a}.height = 30",
            a = s.a.uuid().simple(),
            b = s.b.uuid().simple(),
        );
        let mut manager = s.graph.constraint_manager(s.group).unwrap();
        let ids = manager.set_constraints_from_string(&spec).unwrap();

        manager.freeze_constraints(&ids, &ATTRIBUTES, &s.metrics).unwrap();
        let once: Vec<f64> = ids.iter().map(|id| manager.graph().constraint(*id).unwrap().constant).collect();
        manager.freeze_constraints(&ids, &ATTRIBUTES, &s.metrics).unwrap();
        let twice: Vec<f64> = ids.iter().map(|id| manager.graph().constraint(*id).unwrap().constant).collect();

        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once[0], ax);
    }
}
