//! Failed fill cycles never leave partial or torn entries behind

mod common;

use common::*;
use histoview::accumulator::{Counter, Sum};
use histoview::cluster::LocalCluster;
use histoview::storage::Container;
use histoview::testing::FlakyStore;
use histoview::{CacheLookup, ViewError};
use std::sync::Arc;

#[tokio::test]
async fn test_chunk_failure_commits_nothing() {
    let source = scenario_source();
    source.inject_failure("f2", "corrupt record");
    let view = scenario_view(source, &Container::in_memory(), "broken");

    let err = view.fill_all().await.unwrap_err();
    let failure = err.chunk_failure().expect("chunk failure");
    assert_eq!(failure.chunk, 1);
    assert_eq!(failure.location.as_deref(), Some("f2"));
    assert!(err.to_string().contains("corrupt record"));
    assert!(err.is_retryable());

    assert!(view.cached_entries().await.unwrap().is_empty());
    assert_eq!(
        view.get::<Counter>("count").await.unwrap(),
        CacheLookup::Empty(Counter::default())
    );
}

#[tokio::test]
async fn test_chunk_failure_leaves_previous_entries_untouched() {
    let source = scenario_source();
    let container = Container::in_memory();
    let view = scenario_view(source.clone(), &container, "keep");
    view.fill_all().await.unwrap();

    let cache = container.cache_store("keep").unwrap();
    let before = cache.entry("sum_x").await.unwrap().unwrap();

    source.push_file("f4", events(&[9.0]));
    source.inject_failure("f4", "truncated file");
    assert!(view.fill_all().await.is_err());

    let after = cache.entry("sum_x").await.unwrap().unwrap();
    assert_eq!(after, before);

    source.clear_failures();
    assert_eq!(view.fill_all().await.unwrap(), 2);
    assert_eq!(view.get::<Sum>("sum_x").await.unwrap().into_inner().total, 19.0);
}

#[tokio::test]
async fn test_chunk_failure_on_worker_pool() {
    let source = scenario_source();
    source.inject_failure("f3", "decode error");
    let mut view = scenario_view(source, &Container::in_memory(), "pool");
    view.enable_cluster(Arc::new(LocalCluster::new(2)));

    let err = view.fill_all().await.unwrap_err();
    assert_eq!(err.chunk_failure().unwrap().chunk, 2);
    assert!(view.cached_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_panicking_fill_becomes_chunk_failure() {
    let mut view = scenario_view(scenario_source(), &Container::in_memory(), "panic");
    view.declare("boom", Counter::default, |e: &Event, c: &mut Counter| {
        if e.x > 2.0 {
            panic!("value out of range");
        }
        c.increment();
        Ok(())
    })
    .unwrap();

    let err = view.fill_all().await.unwrap_err();
    assert!(matches!(err, ViewError::ChunkFailure(_)));
    assert!(err.to_string().contains("value out of range"));
    assert!(view.cached_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_write_failure_keeps_prior_entry() {
    let store = FlakyStore::new();
    let container = Container::new(store.clone());
    let source = scenario_source();
    let view = scenario_view(source.clone(), &container, "run");
    view.fill_all().await.unwrap();

    let cache = container.cache_store("run").unwrap();
    let prior = cache.entry("sum_x").await.unwrap().unwrap();

    source.push_file("f4", events(&[2.0]));
    store.fail_writes("run/sum_x", 1);
    let err = view.fill_all().await.unwrap_err();
    assert!(matches!(err, ViewError::StoreWriteFailure { ref name, .. } if name == "sum_x"));

    // committed earlier in the same cycle, so still valid
    assert!(!view.is_stale("count").await.unwrap());
    assert_eq!(view.get::<Counter>("count").await.unwrap().into_inner().count, 7);
    assert_eq!(cache.entry("sum_x").await.unwrap().unwrap(), prior);
    assert!(view.is_stale("sum_x").await.unwrap());

    assert_eq!(view.fill_all().await.unwrap(), 1);
    assert_eq!(view.get::<Sum>("sum_x").await.unwrap().into_inner().total, 12.0);
}

#[tokio::test]
async fn test_failed_first_commit_leaves_no_entry() {
    let store = FlakyStore::new();
    let view = scenario_view(scenario_source(), &Container::new(store.clone()), "fresh");
    store.fail_writes("fresh/count", 1);

    assert!(view.fill_all().await.is_err());
    assert!(view.cached_entries().await.unwrap().is_empty());
}
