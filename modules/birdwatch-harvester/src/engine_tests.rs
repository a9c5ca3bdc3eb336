//! Engine boundary tests: mock the trait seams, run one real scan,
//! assert the outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use birdwatch_common::HarvestError;
use twitter_client::{RateLimitWindow, TwitterError};

use crate::engine::Harvester;
use crate::quota::QuotaGovernor;
use crate::stream::{MentionStream, ScanStart, StreamQuery, TimelineStream};
use crate::testing::*;
use crate::traits::{DocumentStore, EnrichmentSink, PersistOutcome};

const PAGE_SIZE: u32 = 200;

fn harvester(store: Arc<MockStore>, sink: Option<Arc<MockSink>>) -> Harvester {
    let sink: Option<Arc<dyn EnrichmentSink>> = match sink {
        Some(s) => Some(s),
        None => None,
    };
    Harvester::new(
        store,
        sink,
        QuotaGovernor::new(Duration::from_secs(3600)),
        PAGE_SIZE,
    )
}

// ---------------------------------------------------------------------------
// Watermark resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timeline_watermark_is_highest_stored_post() {
    let store = MockStore::new().seeded_with([
        post_doc(5, "someorg", 42),
        post_doc(9, "someorg", 42),
        post_doc(12, "someorg", 42),
        post_doc(400, "otherorg", 77),
    ]);

    let start = TimelineStream
        .scan_start(&store, &subject("someorg"))
        .await
        .unwrap();
    assert_eq!(start, ScanStart::Since(Some(12)));
}

#[tokio::test]
async fn timeline_watermark_absent_for_unknown_subject() {
    let store = MockStore::new();
    let start = TimelineStream
        .scan_start(&store, &subject("someorg"))
        .await
        .unwrap();
    assert_eq!(start, ScanStart::Since(None));
}

#[tokio::test]
async fn mention_watermark_keys_on_recipient_user_id() {
    let store = MockStore::new().seeded_with([
        post_doc(12, "someorg", 42),
        mention_doc(7, "friend", 42),
        mention_doc(15, "critic", 42),
        mention_doc(900, "stranger", 77),
    ]);

    let start = MentionStream
        .scan_start(&store, &subject("someorg"))
        .await
        .unwrap();
    assert_eq!(start, ScanStart::Since(Some(15)));
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pagination_drains_window_and_stops_on_short_page() {
    let source = ScriptedSource::new()
        .push_page(Ok(post_page(801..=1000, "someorg")))
        .push_page(Ok(post_page(601..=800, "someorg")))
        .push_page(Ok(post_page(544..=600, "someorg")));
    let store = Arc::new(MockStore::new());
    let stats = harvester(store.clone(), None)
        .harvest(&TimelineStream, &source, &subject("someorg"))
        .await
        .unwrap();

    assert_eq!(stats.fetched, 457);
    assert_eq!(stats.pages, 3);
    assert_eq!(stats.created, 457);
    assert_eq!(store.len(), 457);

    let calls = source.page_calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].max_id, None);
    // Each cursor sits strictly below the previous page's minimum id.
    assert_eq!(calls[1].max_id, Some(800));
    assert_eq!(calls[2].max_id, Some(600));
}

#[tokio::test]
async fn empty_first_page_means_nothing_new() {
    let source = ScriptedSource::new();
    let store = Arc::new(MockStore::new());
    let sink = Arc::new(MockSink::new());
    let stats = harvester(store.clone(), Some(sink.clone()))
        .harvest(&TimelineStream, &source, &subject("someorg"))
        .await
        .unwrap();

    assert_eq!(stats.fetched, 0);
    assert_eq!(stats.pages, 1);
    assert_eq!(store.len(), 0);
    assert!(sink.forwarded().is_empty());
}

#[tokio::test]
async fn items_at_or_below_the_watermark_are_dropped() {
    let store = Arc::new(MockStore::new().seeded_with([post_doc(100, "someorg", 42)]));
    // A misbehaving page that leaks the boundary item and one below it.
    let source =
        ScriptedSource::new().push_page(Ok(post_page([150, 120, 100, 90], "someorg")));

    let stats = harvester(store.clone(), None)
        .harvest(&TimelineStream, &source, &subject("someorg"))
        .await
        .unwrap();

    assert_eq!(source.page_calls()[0].since_id, Some(100));
    assert_eq!(stats.fetched, 2);
    assert_eq!(stats.boundary_rejected, 2);
    assert!(store.document(150).is_some());
    assert!(store.document(90).is_none());
}

#[tokio::test]
async fn stalled_cursor_aborts_the_scan() {
    let source = ScriptedSource::new()
        .push_page(Ok(post_page(801..=1000, "someorg")))
        // Minimum id fails to move the cursor downward.
        .push_page(Ok(post_page(900..=1099, "someorg")));
    let store = Arc::new(MockStore::new());

    let err = harvester(store.clone(), None)
        .harvest(&TimelineStream, &source, &subject("someorg"))
        .await
        .unwrap_err();

    assert!(matches!(err, HarvestError::CursorStalled { max_id: 800 }));
    // Nothing reaches the store when the fetch phase fails.
    assert_eq!(store.len(), 0);
}

// ---------------------------------------------------------------------------
// Quota handling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn rate_limited_page_is_retried_after_the_governed_wait() {
    let source = ScriptedSource::new()
        .push_page(Err(TwitterError::RateLimited { reset: None }))
        .push_page(Ok(post_page(1..=5, "someorg")))
        .with_window(RateLimitWindow {
            limit: 900,
            remaining: 0,
            reset: Utc::now().timestamp() + 3,
        });
    let store = Arc::new(MockStore::new());

    let stats = harvester(store.clone(), None)
        .harvest(&TimelineStream, &source, &subject("someorg"))
        .await
        .unwrap();

    assert_eq!(stats.fetched, 5);
    assert_eq!(*source.window_reads.lock().unwrap(), 1);
    let calls = source.page_calls();
    assert_eq!(calls.len(), 2);
    // Cursor state unchanged across the retry.
    assert_eq!(calls[0], calls[1]);
}

// ---------------------------------------------------------------------------
// Mentions prerequisite
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mentions_without_a_stored_post_skip_the_source_entirely() {
    let source = ScriptedSource::new();
    let store = Arc::new(MockStore::new());

    let stats = harvester(store, None)
        .harvest(&MentionStream, &source, &subject("someorg"))
        .await
        .unwrap();

    assert!(stats.skipped);
    assert!(source.page_calls().is_empty());
    assert_eq!(*source.window_reads.lock().unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_upserts_leave_a_single_logical_document() {
    let store = MockStore::new();
    let doc = post_doc(12, "someorg", 42);

    assert_eq!(store.upsert(12, &doc).await.unwrap(), PersistOutcome::Created);
    assert_eq!(store.upsert(12, &doc).await.unwrap(), PersistOutcome::Updated);
    assert_eq!(store.upsert(12, &doc).await.unwrap(), PersistOutcome::Updated);

    assert_eq!(store.len(), 1);
    assert_eq!(store.document(12).unwrap(), doc);
}

#[tokio::test]
async fn rerunning_an_overlapping_window_changes_nothing() {
    let store = Arc::new(MockStore::new());
    let first = ScriptedSource::new().push_page(Ok(post_page(1..=3, "someorg")));
    harvester(store.clone(), None)
        .harvest(&TimelineStream, &first, &subject("someorg"))
        .await
        .unwrap();
    assert_eq!(store.len(), 3);

    // Second run: watermark is now 3, and the API misbehaves by
    // re-serving the same window.
    let second = ScriptedSource::new().push_page(Ok(post_page(1..=3, "someorg")));
    let stats = harvester(store.clone(), None)
        .harvest(&TimelineStream, &second, &subject("someorg"))
        .await
        .unwrap();

    assert_eq!(second.page_calls()[0].since_id, Some(3));
    assert_eq!(stats.fetched, 0);
    assert_eq!(stats.boundary_rejected, 3);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn one_failed_write_spares_the_rest_of_the_batch() {
    let store = Arc::new(MockStore::new().failing_on([4]));
    let sink = Arc::new(MockSink::new());
    let source = ScriptedSource::new().push_page(Ok(post_page(1..=10, "someorg")));

    let stats = harvester(store.clone(), Some(sink.clone()))
        .harvest(&TimelineStream, &source, &subject("someorg"))
        .await
        .unwrap();

    assert_eq!(stats.created, 9);
    assert_eq!(stats.persist_failed, 1);
    assert_eq!(store.len(), 9);
    assert!(store.document(4).is_none());

    // The forward batch still carries every fetched payload.
    let batches = sink.forwarded();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 10);
    assert_eq!(stats.forwarded, 10);
}

// ---------------------------------------------------------------------------
// Forwarding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn forward_failure_does_not_roll_back_persistence() {
    let store = Arc::new(MockStore::new());
    let sink = Arc::new(MockSink::failing());
    let source = ScriptedSource::new().push_page(Ok(post_page(1..=3, "someorg")));

    let stats = harvester(store.clone(), Some(sink))
        .harvest(&TimelineStream, &source, &subject("someorg"))
        .await
        .unwrap();

    assert_eq!(stats.created, 3);
    assert_eq!(stats.forwarded, 0);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn mentions_flow_harvests_into_the_store() {
    let store = Arc::new(MockStore::new().seeded_with([
        post_doc(12, "someorg", 42),
        mention_doc(20, "friend", 42),
    ]));
    let source = ScriptedSource::new().push_page(Ok(vec![
        status(mention_doc(31, "critic", 42)),
        status(mention_doc(25, "friend", 42)),
    ]));

    let stats = harvester(store.clone(), None)
        .harvest(&MentionStream, &source, &subject("someorg"))
        .await
        .unwrap();

    let calls = source.page_calls();
    assert_eq!(calls[0].kind, "mentions");
    assert_eq!(calls[0].since_id, Some(20));
    assert_eq!(stats.fetched, 2);
    assert!(store.document(31).is_some());
    assert!(store.document(25).is_some());
}
