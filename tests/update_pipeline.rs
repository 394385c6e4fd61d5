//! Integration tests for the update pipeline
//!
//! Whole updates run against an in-memory store, a fake network and a
//! temporary media root.

mod common;

use tokio_test::assert_ok;

use castkeeper::app::hash::identity_hash;
use castkeeper::app::repository::Repository;
use castkeeper::app::update::{update_feed, UpdateStatus};
use castkeeper::app::xml_cache::XmlCache;
use castkeeper::app::{Item, MemoryStore};

use common::{rss, Harness, TestItem, FEED_URL};

const BUILD_1: &str = "Mon, 01 Apr 2024 00:00:00 +0000";
const BUILD_2: &str = "Mon, 08 Apr 2024 00:00:00 +0000";

fn two_items() -> Vec<TestItem> {
    // Newest first, as most feeds publish
    vec![
        TestItem::new(
            "g2",
            "https://cdn.example.com/ep2.mp3?tracking=1",
            "Episode Two",
            "Mon, 05 Feb 2024 10:00:00 +0000",
        ),
        TestItem::new(
            "g1",
            "https://cdn.example.com/ep1.mp3",
            "Episode One",
            "Mon, 01 Jan 2024 10:00:00 +0000",
        ),
    ]
}

fn stored_items(store: &MemoryStore) -> Vec<Item> {
    let feed = store.load_feed("foo").unwrap().unwrap();
    store.load_items(feed.id.unwrap()).unwrap()
}

#[tokio::test]
async fn test_first_run_creates_names_and_downloads() {
    let harness = Harness::new();
    harness.fetch.serve(FEED_URL, rss(BUILD_1, &two_items()));
    let feed = harness.feed("#shortname#_#count#.mp3");

    let report = assert_ok!(update_feed(&harness.context(), &feed).await);
    assert_eq!(report.status, UpdateStatus::Updated);
    assert_eq!(report.counts.new, 2);
    assert_eq!(report.downloads.downloaded, 2);
    assert_eq!(report.images, 1);
    assert!(report.failures.is_empty());

    let items = stored_items(&harness.store);
    assert_eq!(items.len(), 2);
    // Oldest item gets the first sequence number
    assert_eq!(items[0].guid, "g1");
    assert_eq!(items[0].filename, "foo_01.mp3");
    assert_eq!(items[1].filename, "foo_02.mp3");
    assert_eq!(items[1].url, "https://cdn.example.com/ep2.mp3");
    assert!(items.iter().all(|item| item.downloaded && !item.archived));

    assert!(feed.media_path("foo_01.mp3").is_file());
    assert!(feed.media_path("foo_02.mp3").is_file());
    assert_eq!(
        std::fs::read_dir(feed.image_directory()).unwrap().count(),
        1
    );

    let record = harness.store.load_feed("foo").unwrap().unwrap();
    assert_eq!(record.episode_count, 2);
    assert!(record.last_build_date.is_some());
    assert_eq!(record.channel.unwrap().title, "Foo Show");

    let cache = XmlCache::new(&feed.xml_directory, "foo", 5);
    assert_eq!(cache.cached_files().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let mut harness = Harness::new();
    harness.fetch.serve(FEED_URL, rss(BUILD_1, &two_items()));
    let feed = harness.feed("#shortname#_#count#.mp3");
    assert_ok!(update_feed(&harness.context(), &feed).await);
    let downloads = harness.fetch.downloads();

    // Unchanged build date cancels the parse
    let report = assert_ok!(update_feed(&harness.context(), &feed).await);
    assert_eq!(report.status, UpdateStatus::Unchanged);
    assert_eq!(report.counts.new, 0);

    // Forced: everything is a duplicate, nothing new or modified
    harness.settings.force_update = true;
    let report = assert_ok!(update_feed(&harness.context(), &feed).await);
    assert_eq!(report.status, UpdateStatus::Updated);
    assert_eq!(report.counts.new, 0);
    assert_eq!(report.counts.modified, 0);
    assert_eq!(report.counts.duplicate, 2);
    assert_eq!(harness.fetch.downloads(), downloads);

    let items = stored_items(&harness.store);
    assert_eq!(items.len(), 2);
    assert_eq!(
        harness.store.load_feed("foo").unwrap().unwrap().episode_count,
        2
    );
}

#[tokio::test]
async fn test_known_items_are_skipped_when_feed_advances() {
    let harness = Harness::new();
    harness.fetch.serve(FEED_URL, rss(BUILD_1, &two_items()));
    let feed = harness.feed("#shortname#_#count#.mp3");
    assert_ok!(update_feed(&harness.context(), &feed).await);

    let mut items = two_items();
    items.insert(
        0,
        TestItem::new(
            "g3",
            "https://cdn.example.com/ep3.mp3",
            "Episode Three",
            "Mon, 04 Mar 2024 10:00:00 +0000",
        ),
    );
    harness.fetch.serve(FEED_URL, rss(BUILD_2, &items));

    let report = assert_ok!(update_feed(&harness.context(), &feed).await);
    assert_eq!(report.counts.new, 1);
    assert_eq!(report.counts.duplicate, 0);
    assert_eq!(report.skipped, 2);

    let stored = stored_items(&harness.store);
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[2].filename, "foo_03.mp3");
}

#[tokio::test]
async fn test_guid_match_with_new_url_is_modification() {
    let harness = Harness::new();
    let feed = harness.feed("#shortname#_#count#.mp3");
    let first = vec![TestItem::new(
        "g1",
        "https://cdn.example.com/u1.mp3",
        "Episode One",
        "Mon, 01 Jan 2024 10:00:00 +0000",
    )];
    harness.fetch.serve(FEED_URL, rss(BUILD_1, &first));
    assert_ok!(update_feed(&harness.context(), &feed).await);

    let moved = vec![TestItem::new(
        "g1",
        "https://other-cdn.example.com/u2.mp3",
        "Episode One",
        "Mon, 01 Jan 2024 10:00:00 +0000",
    )];
    harness.fetch.serve(FEED_URL, rss(BUILD_2, &moved));
    let report = assert_ok!(update_feed(&harness.context(), &feed).await);
    assert_eq!(report.counts.modified, 1);
    assert_eq!(report.counts.new, 0);
    assert_eq!(report.downloads.downloaded, 1);

    let items = stored_items(&harness.store);
    assert_eq!(items.len(), 1);
    let (expected, _) = identity_hash("g1", "https://other-cdn.example.com/u2.mp3", None).unwrap();
    assert_eq!(items[0].hash, expected);
    assert_eq!(items[0].url, "https://other-cdn.example.com/u2.mp3");
    assert_eq!(items[0].filename, "foo_01.mp3");
    assert!(items[0].downloaded);
}

#[tokio::test]
async fn test_same_batch_collisions_get_suffixes() {
    let harness = Harness::new();
    let feed = harness.feed("#shortname#.mp3");
    let items: Vec<TestItem> = ["g3", "g2", "g1"]
        .iter()
        .map(|&guid| {
            TestItem::new(
                guid,
                &format!("https://cdn.example.com/{}.mp3", guid),
                guid,
                "Mon, 01 Jan 2024 10:00:00 +0000",
            )
        })
        .collect();
    harness.fetch.serve(FEED_URL, rss(BUILD_1, &items));

    let report = assert_ok!(update_feed(&harness.context(), &feed).await);
    assert_eq!(report.counts.new, 3);

    let mut names: Vec<(String, String)> = stored_items(&harness.store)
        .into_iter()
        .map(|item| (item.guid, item.filename))
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            ("g1".to_string(), "foo.mp3".to_string()),
            ("g2".to_string(), "foo.A.mp3".to_string()),
            ("g3".to_string(), "foo.B.mp3".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_exhausted_suffixes_fail_only_that_item() {
    let harness = Harness::new();
    let feed = harness.feed("#shortname#.mp3");
    const GUIDS: [&str; 14] = [
        "g14", "g13", "g12", "g11", "g10", "g09", "g08", "g07", "g06", "g05", "g04", "g03", "g02",
        "g01",
    ];
    let items: Vec<TestItem> = GUIDS
        .iter()
        .map(|&guid| {
            TestItem::new(
                guid,
                &format!("https://cdn.example.com/{}.mp3", guid),
                guid,
                "Mon, 01 Jan 2024 10:00:00 +0000",
            )
        })
        .collect();
    harness.fetch.serve(FEED_URL, rss(BUILD_1, &items));

    let report = assert_ok!(update_feed(&harness.context(), &feed).await);
    assert_eq!(report.counts.new, 13);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, "g14");
    assert_eq!(report.failures[0].error.category(), "filename");

    assert_eq!(stored_items(&harness.store).len(), 13);
    assert_eq!(
        harness.store.load_feed("foo").unwrap().unwrap().episode_count,
        13
    );
}

#[tokio::test]
async fn test_simulate_writes_nothing() {
    let mut harness = Harness::new();
    harness.settings.simulate = true;
    harness.fetch.serve(FEED_URL, rss(BUILD_1, &two_items()));
    let feed = harness.feed("");

    let report = assert_ok!(update_feed(&harness.context(), &feed).await);
    assert_eq!(report.status, UpdateStatus::Simulated);
    assert_eq!(report.counts.new, 2);
    assert_eq!(report.downloads.downloaded, 2);
    assert_eq!(report.downloads.bytes, 2000);

    assert!(harness.store.load_feed("foo").unwrap().is_none());
    assert!(!feed.directory.exists());
    assert_eq!(harness.fetch.downloads(), 0);
}

#[tokio::test]
async fn test_failed_download_is_retried_next_run() {
    let mut harness = Harness::new();
    let feed = harness.feed("");
    let items = vec![
        TestItem::new(
            "g2",
            "https://cdn.example.com/missing.mp3",
            "Broken",
            "Mon, 05 Feb 2024 10:00:00 +0000",
        ),
        TestItem::new(
            "g1",
            "https://cdn.example.com/ok.mp3",
            "Fine",
            "Mon, 01 Jan 2024 10:00:00 +0000",
        ),
    ];
    harness.fetch.serve(FEED_URL, rss(BUILD_1, &items));

    let report = assert_ok!(update_feed(&harness.context(), &feed).await);
    assert_eq!(report.downloads.downloaded, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, "Broken");

    let stored = stored_items(&harness.store);
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().any(|item| item.guid == "g2" && !item.downloaded));

    harness.settings.force_update = true;
    let before = harness.fetch.requests().len();
    let report = assert_ok!(update_feed(&harness.context(), &feed).await);
    assert_eq!(report.failures.len(), 1);
    let retried: Vec<String> = harness.fetch.requests()[before..].to_vec();
    assert!(retried.iter().any(|url| url.contains("missing.mp3")));
    assert!(!retried.iter().any(|url| url.contains("ok.mp3")));
}

#[tokio::test]
async fn test_most_recent_xml_skips_network() {
    let mut harness = Harness::new();
    harness.fetch.serve(FEED_URL, rss(BUILD_1, &two_items()));
    let feed = harness.feed("");
    assert_ok!(update_feed(&harness.context(), &feed).await);

    harness.fetch.serve(FEED_URL, "not xml at all");
    harness.settings.use_most_recent_xml = true;
    harness.settings.force_update = true;
    let before = harness.fetch.requests().len();

    let report = assert_ok!(update_feed(&harness.context(), &feed).await);
    assert_eq!(report.counts.duplicate, 2);
    assert!(!harness.fetch.requests()[before..]
        .iter()
        .any(|url| url == FEED_URL));
}

#[tokio::test]
async fn test_oldest_first_feed_numbers_the_same() {
    let harness = Harness::new();
    let mut config = castkeeper::config::FeedConfig::new("Foo Show", "foo", FEED_URL);
    config.filename_parse = "#shortname#_#count#.mp3".to_string();
    config.standard_chronological = true;
    let feed = config.resolve(&harness.settings).unwrap();

    let mut items = two_items();
    items.reverse();
    harness.fetch.serve(FEED_URL, rss(BUILD_1, &items));
    assert_ok!(update_feed(&harness.context(), &feed).await);

    let stored = stored_items(&harness.store);
    let one = stored.iter().find(|item| item.guid == "g1").unwrap();
    assert_eq!(one.filename, "foo_01.mp3");
}
