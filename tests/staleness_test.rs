//! Input-list changes invalidate cached entries

mod common;

use common::*;
use histoview::accumulator::{Counter, Sum};
use histoview::storage::{BlobStore, Container};
use histoview::testing::MemorySource;
use histoview::{AggregationStatus, CacheLookup, View, ViewError};
use std::sync::Arc;

#[tokio::test]
async fn test_adding_a_file_marks_everything_stale() {
    let source = scenario_source();
    let container = Container::in_memory();
    let view = scenario_view(source.clone(), &container, "grow");
    view.fill_all().await.unwrap();
    let before = view.fingerprint().unwrap();

    source.push_file("f4", events(&[4.0]));

    assert_ne!(view.fingerprint().unwrap(), before);
    assert!(view.is_stale("count").await.unwrap());
    assert!(view.is_stale("sum_x").await.unwrap());
    assert!(view.list(true).await.unwrap().is_empty());
    assert_eq!(
        view.get::<Counter>("count").await.unwrap(),
        CacheLookup::Empty(Counter::default())
    );

    assert_eq!(view.fill_all().await.unwrap(), 2);
    assert_eq!(view.get::<Counter>("count").await.unwrap().into_inner().count, 7);
    assert_eq!(view.get::<Sum>("sum_x").await.unwrap().into_inner().total, 14.0);

    let cache = container.cache_store("grow").unwrap();
    let entry = cache.entry("count").await.unwrap().unwrap();
    assert_eq!(entry.fingerprint, view.fingerprint().unwrap());
}

#[tokio::test]
async fn test_removing_a_file_marks_everything_stale() {
    let source = scenario_source();
    let view = scenario_view(source.clone(), &Container::in_memory(), "shrink");
    view.fill_all().await.unwrap();

    assert!(source.remove_file("f3"));
    let statuses: Vec<_> = view
        .describe()
        .await
        .unwrap()
        .into_iter()
        .map(|info| info.status)
        .collect();
    assert_eq!(statuses, vec![AggregationStatus::Stale, AggregationStatus::Stale]);
}

#[tokio::test]
async fn test_reordering_inputs_marks_everything_stale() {
    let source = Arc::new(
        MemorySource::new()
            .with_file("a", events(&[1.0]))
            .with_file("b", events(&[2.0])),
    );
    let reordered = Arc::new(
        MemorySource::new()
            .with_file("b", events(&[2.0]))
            .with_file("a", events(&[1.0])),
    );
    let container = Container::in_memory();

    scenario_view(source, &container, "order")
        .fill_all()
        .await
        .unwrap();
    let view = scenario_view(reordered, &container, "order");
    assert!(view.is_stale("count").await.unwrap());
}

#[tokio::test]
async fn test_input_change_during_fill_commits_nothing() {
    let source = Arc::new(
        MemorySource::new()
            .with_file("f1", events(&[1.0]))
            .with_file("f2", events(&[2.0]))
            .appending_on_read("f2", "late", events(&[3.0])),
    );
    let view = scenario_view(source, &Container::in_memory(), "race");

    let err = view.fill_all().await.unwrap_err();
    assert!(matches!(err, ViewError::StaleFingerprintMismatch { .. }));
    assert!(err.is_retryable());
    assert!(view.cached_entries().await.unwrap().is_empty());

    // the late file is now part of the input list
    assert_eq!(view.fill_all().await.unwrap(), 2);
    assert_eq!(view.get::<Counter>("count").await.unwrap().into_inner().count, 3);
}

#[tokio::test]
async fn test_redeclaring_with_another_accumulator_refills() {
    let source = scenario_source();
    let container = Container::in_memory();
    scenario_view(source.clone(), &container, "retyped")
        .fill_all()
        .await
        .unwrap();

    let mut view = View::<Event>::new(source, &container, "retyped").unwrap();
    view.declare("count", Sum::default, |e: &Event, s: &mut Sum| {
        s.add(e.x);
        Ok(())
    })
    .unwrap();

    assert!(view.is_stale("count").await.unwrap());
    assert!(view.list(true).await.unwrap().is_empty());
    assert_eq!(view.describe().await.unwrap()[0].status, AggregationStatus::Stale);
    assert_eq!(
        view.get::<Sum>("count").await.unwrap(),
        CacheLookup::Empty(Sum::default())
    );

    assert_eq!(view.fill_all().await.unwrap(), 1);
    let sum = view.get::<Sum>("count").await.unwrap();
    assert!(sum.is_filled());
    assert_eq!(sum.into_inner().total, 10.0);
    assert_eq!(view.fill_all().await.unwrap(), 0);
}

#[tokio::test]
async fn test_undecodable_state_is_refilled() {
    let container = Container::in_memory();
    let view = scenario_view(scenario_source(), &container, "garbled");
    view.fill_all().await.unwrap();

    let cache = container.cache_store("garbled").unwrap();
    let mut entry = cache.entry("sum_x").await.unwrap().unwrap();
    entry.state = "{\"total\": \"ten\"}".to_string();
    container
        .backend()
        .write("garbled/sum_x", &serde_json::to_vec(&entry).unwrap())
        .await
        .unwrap();

    assert_eq!(entry.fingerprint, view.fingerprint().unwrap());
    assert!(view.is_stale("sum_x").await.unwrap());
    assert!(!view.get::<Sum>("sum_x").await.unwrap().is_filled());

    assert_eq!(view.fill_all().await.unwrap(), 1);
    assert_eq!(view.get::<Sum>("sum_x").await.unwrap().into_inner().total, 10.0);
}
