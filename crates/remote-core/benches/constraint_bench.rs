//! Criterion benchmarks for constraint-manager editing paths.
//!
//! Run with:
//! ```bash
//! cargo bench --package remote-core --bench constraint_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use remote_core::{
    format, ElementGraph, ElementId, ElementKind, LayoutAttribute, Metrics, Point, Rect,
    RemoteElement,
};

// ── Fixture builders ──────────────────────────────────────────────────────────

/// A group holding `n` 40x40 buttons laid out in a row, each pinned to the
/// right edge of the previous one.
fn build_row(n: usize) -> (ElementGraph, ElementId, Vec<ElementId>, Metrics) {
    let mut graph = ElementGraph::new();
    let group = graph
        .insert_root(RemoteElement::new(ElementKind::ButtonGroup, "Row").with_key("row"))
        .expect("root insert");
    let mut buttons = Vec::with_capacity(n);
    let mut metrics = Metrics::new().with(group, Rect::new(0.0, 0.0, 40.0 * n as f64, 40.0));
    for i in 0..n {
        let id = graph
            .add_subelement(
                group,
                RemoteElement::new(ElementKind::Button, format!("B{i}")).with_key(format!("b{i}")),
            )
            .expect("subelement insert");
        metrics.insert(id, Rect::new(40.0 * i as f64, 0.0, 40.0, 40.0));
        buttons.push(id);
    }
    let text = row_format(n);
    graph
        .constraint_manager(group)
        .and_then(|mut m| m.set_constraints_from_string(&text))
        .expect("row constraints");
    (graph, group, buttons, metrics)
}

fn row_format(n: usize) -> String {
    let mut lines = Vec::with_capacity(n * 4);
    for i in 0..n {
        if i == 0 {
            lines.push("b0.left = row.left".to_string());
        } else {
            lines.push(format!("b{i}.left = b{}.right", i - 1));
        }
        lines.push(format!("b{i}.top = row.top"));
        lines.push(format!("b{i}.width = 40"));
        lines.push(format!("b{i}.height = b{i}.width"));
    }
    lines.join("\n")
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_parse_format(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_parse");
    for &n in &[4usize, 16, 64] {
        let text = row_format(n);
        group.bench_with_input(BenchmarkId::new("buttons", n), &text, |b, text| {
            b.iter(|| format::parse(black_box(text)))
        });
    }
    group.finish();
}

fn bench_translate_subelements(c: &mut Criterion) {
    let mut group = c.benchmark_group("translate_subelements");
    for &n in &[4usize, 16, 64] {
        let (graph, row, buttons, metrics) = build_row(n);
        let moved = buttons[n / 2];
        group.bench_with_input(BenchmarkId::new("buttons", n), &n, |b, _| {
            b.iter_batched(
                || graph.clone(),
                |mut g| {
                    if let Ok(mut m) = g.constraint_manager(row) {
                        let _ = m.translate_subelements(&[moved], Point::new(5.0, 0.0), &metrics);
                    }
                    g
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_align_subelements(c: &mut Criterion) {
    let (graph, row, buttons, metrics) = build_row(16);
    c.bench_function("align_subelements_top_16", |b| {
        b.iter_batched(
            || graph.clone(),
            |mut g| {
                if let Ok(mut m) = g.constraint_manager(row) {
                    let _ = m.align_subelements(&buttons[1..], buttons[0], LayoutAttribute::Top, &metrics);
                }
                g
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_layout_configuration(c: &mut Criterion) {
    let (graph, _, buttons, _) = build_row(64);
    c.bench_function("layout_configuration_64", |b| {
        b.iter(|| graph.layout_configuration(black_box(buttons[32])))
    });
}

criterion_group!(
    benches,
    bench_parse_format,
    bench_translate_subelements,
    bench_align_subelements,
    bench_layout_configuration,
);
criterion_main!(benches);
