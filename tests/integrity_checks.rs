//! Integration tests for the integrity checker

mod common;

use std::fs;

use tokio_test::assert_ok;

use castkeeper::app::hash::ItemHash;
use castkeeper::app::integrity::{
    check_feed, CollisionDecision, CollisionPrompt, SkipCollisions,
};
use castkeeper::app::repository::Repository;
use castkeeper::app::update::update_feed;
use castkeeper::app::{Feed, Item, MemoryStore};

use common::{rss, Harness, TestItem, FEED_URL};

const BUILD: &str = "Mon, 01 Apr 2024 00:00:00 +0000";

/// Answers collisions from a fixed script and records what it was asked
struct Scripted {
    answers: Vec<CollisionDecision>,
    asked: Vec<(String, String)>,
}

impl CollisionPrompt for Scripted {
    fn decide(&mut self, first: &Item, second: &Item) -> CollisionDecision {
        self.asked.push((first.guid.clone(), second.guid.clone()));
        if self.answers.is_empty() {
            CollisionDecision::Skip
        } else {
            self.answers.remove(0)
        }
    }
}

async fn updated(harness: &Harness) -> Feed {
    let items = vec![
        TestItem::new(
            "g2",
            "https://cdn.example.com/ep2.mp3?utm=x",
            "Episode Two",
            "Mon, 05 Feb 2024 10:00:00 +0000",
        ),
        TestItem::new(
            "g1",
            "https://cdn.example.com/ep1.mp3",
            "Episode One",
            "Mon, 01 Jan 2024 10:00:00 +0000",
        ),
    ];
    harness.fetch.serve(FEED_URL, rss(BUILD, &items));
    let feed = harness.feed("#shortname#_#count#.mp3");
    assert_ok!(update_feed(&harness.context(), &feed).await);
    feed
}

fn stored(store: &MemoryStore) -> (i64, Vec<Item>) {
    let id = store.load_feed("foo").unwrap().unwrap().id.unwrap();
    (id, store.load_items(id).unwrap())
}

#[tokio::test]
async fn test_fresh_feed_is_clean() {
    let harness = Harness::new();
    let feed = updated(&harness).await;

    let report = assert_ok!(check_feed(&harness.context(), &feed, &mut SkipCollisions));
    assert_eq!(report.items_checked, 2);
    assert!(report.is_clean(), "{:?}", report);
}

#[tokio::test]
async fn test_hash_mismatch_is_reported_not_fixed() {
    let harness = Harness::new();
    let feed = updated(&harness).await;
    let mut store = harness.store.clone();
    let (id, mut items) = stored(&store);
    let bogus = ItemHash::compute("bogus", "https://example.com/x.mp3");
    items[0].hash = bogus;
    store.save_items(id, &mut items[..1]).unwrap();

    let report = assert_ok!(check_feed(&harness.context(), &feed, &mut SkipCollisions));
    assert_eq!(report.hash_mismatches, 1);
    assert_eq!(stored(&store).1[0].hash, bogus);
}

#[tokio::test]
async fn test_missing_file_marked_archived_only_with_flag() {
    let mut harness = Harness::new();
    let feed = updated(&harness).await;
    fs::remove_file(feed.media_path("foo_01.mp3")).unwrap();
    fs::write(feed.media_path("stray.mp3"), b"x").unwrap();

    let report = assert_ok!(check_feed(&harness.context(), &feed, &mut SkipCollisions));
    assert_eq!(report.missing_files, 1);
    assert_eq!(report.marked_archived, 0);
    assert!(stored(&harness.store).1.iter().all(|item| !item.archived));

    harness.settings.do_archive = true;
    let report = assert_ok!(check_feed(&harness.context(), &feed, &mut SkipCollisions));
    assert_eq!(report.marked_archived, 1);
    let (_, items) = stored(&harness.store);
    let gone = items.iter().find(|item| item.filename == "foo_01.mp3").unwrap();
    assert!(gone.archived);

    // Archived items are out of scope for later passes
    let report = assert_ok!(check_feed(&harness.context(), &feed, &mut SkipCollisions));
    assert_eq!(report.missing_files, 0);
}

#[tokio::test]
async fn test_untracked_file_is_reported() {
    let harness = Harness::new();
    let feed = updated(&harness).await;
    let mut store = harness.store.clone();
    let (id, mut items) = stored(&store);
    items[1].downloaded = false;
    store.save_items(id, &mut items[1..]).unwrap();

    let report = assert_ok!(check_feed(&harness.context(), &feed, &mut SkipCollisions));
    assert_eq!(report.untracked_files, 1);
}

#[tokio::test]
async fn test_template_drift_and_rename() {
    let mut harness = Harness::new();
    updated(&harness).await;
    let renamed_feed = harness.feed("#shortname#_#title#.mp3");

    let report = assert_ok!(check_feed(
        &harness.context(),
        &renamed_feed,
        &mut SkipCollisions
    ));
    assert_eq!(report.drifted, 2);
    assert_eq!(report.renamed, 0);
    assert!(renamed_feed.media_path("foo_01.mp3").is_file());

    harness.settings.do_rename = true;
    let report = assert_ok!(check_feed(
        &harness.context(),
        &renamed_feed,
        &mut SkipCollisions
    ));
    assert_eq!(report.renamed, 2);
    assert!(renamed_feed.media_path("foo_Episode_One.mp3").is_file());
    assert!(!renamed_feed.media_path("foo_01.mp3").exists());

    let (_, items) = stored(&harness.store);
    assert!(items.iter().any(|item| item.filename == "foo_Episode_Two.mp3"));

    let report = assert_ok!(check_feed(
        &harness.context(),
        &renamed_feed,
        &mut SkipCollisions
    ));
    assert_eq!(report.drifted, 0);
}

#[tokio::test]
async fn test_filename_collision_dump_and_resolution() {
    let mut harness = Harness::new();
    let feed = updated(&harness).await;
    let mut store = harness.store.clone();
    let (id, mut items) = stored(&store);
    items[1].filename = items[0].filename.clone();
    store.save_items(id, &mut items[1..]).unwrap();

    harness.settings.save_collision = true;
    harness.settings.do_collision = true;
    let mut prompt = Scripted {
        answers: vec![CollisionDecision::KeepFirst],
        asked: Vec::new(),
    };

    let report = assert_ok!(check_feed(&harness.context(), &feed, &mut prompt));
    assert_eq!(report.filename_collisions, 1);
    assert_eq!(prompt.asked, vec![("g1".to_string(), "g2".to_string())]);
    assert_eq!(report.deleted, 1);

    let dump = feed.xml_directory.join("collision_foo_01.mp3.json");
    assert_eq!(report.collision_dumps, vec![dump.clone()]);
    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(dump).unwrap()).unwrap();
    assert_eq!(value["items"].as_array().unwrap().len(), 2);

    let (_, remaining) = stored(&store);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].guid, "g1");
}

#[tokio::test]
async fn test_three_way_collision_resolved_in_one_pass() {
    let mut harness = Harness::new();
    let items = vec![
        TestItem::new(
            "g3",
            "https://cdn.example.com/ep3.mp3",
            "Episode Three",
            "Mon, 04 Mar 2024 10:00:00 +0000",
        ),
        TestItem::new(
            "g2",
            "https://cdn.example.com/ep2.mp3",
            "Episode Two",
            "Mon, 05 Feb 2024 10:00:00 +0000",
        ),
        TestItem::new(
            "g1",
            "https://cdn.example.com/ep1.mp3",
            "Episode One",
            "Mon, 01 Jan 2024 10:00:00 +0000",
        ),
    ];
    harness.fetch.serve(FEED_URL, rss(BUILD, &items));
    let feed = harness.feed("#shortname#_#count#.mp3");
    assert_ok!(update_feed(&harness.context(), &feed).await);

    let mut store = harness.store.clone();
    let (id, mut stored_items) = stored(&store);
    let shared = stored_items[0].filename.clone();
    for item in &mut stored_items[1..] {
        item.filename = shared.clone();
    }
    store.save_items(id, &mut stored_items[1..]).unwrap();

    harness.settings.do_collision = true;
    harness.settings.save_collision = true;
    let mut prompt = Scripted {
        answers: vec![CollisionDecision::KeepSecond, CollisionDecision::KeepFirst],
        asked: Vec::new(),
    };

    let report = assert_ok!(check_feed(&harness.context(), &feed, &mut prompt));
    assert_eq!(report.filename_collisions, 1);
    assert_eq!(
        prompt.asked,
        vec![
            ("g1".to_string(), "g2".to_string()),
            ("g2".to_string(), "g3".to_string()),
        ]
    );
    assert_eq!(report.deleted, 2);
    assert_eq!(report.collision_dumps.len(), 1);

    let (_, remaining) = stored(&store);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].guid, "g2");
}
