//! Common test utilities and fixtures
#![allow(dead_code)]

use histoview::accumulator::{Counter, Histogram1D, Sum};
use histoview::storage::Container;
use histoview::testing::MemorySource;
use histoview::View;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One decoded record of the test datasets
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub x: f64,
}

pub fn events(xs: &[f64]) -> Vec<Event> {
    xs.iter().map(|&x| Event { x }).collect()
}

/// Three files holding 2, 3 and 1 records whose `x` values sum to 10.0
pub fn scenario_source() -> Arc<MemorySource<Event>> {
    Arc::new(
        MemorySource::new()
            .with_file("f1", events(&[1.0, 2.5]))
            .with_file("f2", events(&[0.5, 3.0, 1.25]))
            .with_file("f3", events(&[1.75])),
    )
}

/// Files whose float sum depends on the order values are added in
pub fn rounding_source(files: usize) -> Arc<MemorySource<Event>> {
    let source = MemorySource::new();
    for i in 0..files {
        let xs: Vec<f64> = (0..5).map(|j| 0.1 * (i * 5 + j + 1) as f64 + 1e-9).collect();
        source.push_file(&format!("part-{i:03}"), events(&xs));
    }
    Arc::new(source)
}

/// Declare "count" and "sum_x"
pub fn declare_scenario(view: &mut View<Event>) {
    view.declare("count", Counter::default, |_: &Event, c: &mut Counter| {
        c.increment();
        Ok(())
    })
    .unwrap();
    view.declare("sum_x", Sum::default, |e: &Event, s: &mut Sum| {
        s.add(e.x);
        Ok(())
    })
    .unwrap();
}

pub fn declare_histogram(view: &mut View<Event>) {
    view.declare(
        "h_x",
        || Histogram1D::new("x", 10, 0.0, 5.0),
        |e: &Event, h: &mut Histogram1D| {
            h.fill(e.x);
            Ok(())
        },
    )
    .unwrap();
}

pub fn scenario_view(
    source: Arc<MemorySource<Event>>,
    container: &Arc<Container>,
    prefix: &str,
) -> View<Event> {
    let mut view = View::<Event>::new(source, container, prefix).unwrap();
    declare_scenario(&mut view);
    view
}

/// Write one JSON object per line, each `{"x": value}`
pub fn write_jsonl(dir: &Path, name: &str, xs: &[f64]) -> PathBuf {
    let path = dir.join(name);
    let body: String = xs
        .iter()
        .map(|x| format!("{}\n", serde_json::json!({ "x": x })))
        .collect();
    std::fs::write(&path, body).unwrap();
    path
}
