//! Round trips against a real server. Run with
//! `cargo test -- --ignored` and a disposable Redis on
//! `KEYSCOPE_TEST_HOST`:`KEYSCOPE_TEST_PORT` (default 127.0.0.1:6379).
//! Every test flushes database 15.

use keyscope::config::Settings;
use keyscope::editor::DeleteOutcome;
use keyscope::profiles::ConnectionProfile;
use keyscope::reader::{Identity, KeyKind};
use keyscope::{Browser, BrowserError};
use redis::{aio::MultiplexedConnection, AsyncCommands};
use serial_test::serial;
use std::collections::HashSet;

const TEST_DB: u8 = 15;

fn profile() -> ConnectionProfile {
    let host = std::env::var("KEYSCOPE_TEST_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("KEYSCOPE_TEST_PORT").unwrap_or_else(|_| "6379".to_string());
    let auth = std::env::var("KEYSCOPE_TEST_AUTH").unwrap_or_default();
    ConnectionProfile::new("live", &host, &port, &auth)
}

async fn fresh_db() -> MultiplexedConnection {
    let profile = profile();
    let url = match profile.password() {
        Some(password) => format!("redis://:{}@{}:{}/{}", password, profile.ip, profile.port, TEST_DB),
        None => format!("redis://{}:{}/{}", profile.ip, profile.port, TEST_DB),
    };
    let client = redis::Client::open(url).unwrap();
    let mut con = client.get_multiplexed_async_connection().await.unwrap();
    redis::cmd("FLUSHDB").query_async::<()>(&mut con).await.unwrap();
    con
}

async fn browser_on_test_db() -> Browser {
    let mut browser = Browser::new(&Settings::default());
    browser.connect(profile()).await.unwrap();
    browser.select_database(TEST_DB).await.unwrap();
    browser
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn ping_and_test_connection_succeed() {
    let _con = fresh_db().await;
    let mut browser = browser_on_test_db().await;
    assert!(browser.ping().await);
    assert!(browser.test_connection(&profile()).await);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn category_totals_match_dbsize() {
    let mut con = fresh_db().await;
    for i in 0..120 {
        let _: () = con.set(format!("user:{}", i), i).await.unwrap();
    }
    for i in 0..30 {
        let _: () = con.set(format!("session:{}:token", i), "t").await.unwrap();
    }
    let _: () = con.set("standalone", "x").await.unwrap();

    let mut browser = browser_on_test_db().await;
    browser.refresh_counts().await.unwrap();

    let dbsize: u64 = redis::cmd("DBSIZE").query_async(&mut con).await.unwrap();
    assert_eq!(browser.counts().total(TEST_DB), dbsize);
    assert_eq!(
        browser.category_counts(TEST_DB),
        vec![
            ("session".to_string(), 30),
            ("standalone".to_string(), 1),
            ("user".to_string(), 120)
        ]
    );
    assert_eq!(browser.database_summaries().len(), 16);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn key_deletions_keep_counts_in_step() {
    let mut con = fresh_db().await;
    for i in 0..5 {
        let _: () = con.set(format!("user:{}", i), "u").await.unwrap();
    }
    for i in 0..3 {
        let _: () = con.set(format!("session:{}", i), "s").await.unwrap();
    }

    let mut browser = browser_on_test_db().await;
    browser.refresh_counts().await.unwrap();

    browser.load_key("session:0").await.unwrap();
    assert_eq!(browser.delete_key().await.unwrap(), DeleteOutcome::Deleted);
    assert!(browser.session().is_none());
    assert_eq!(
        browser.category_counts(TEST_DB),
        vec![("session".to_string(), 2), ("user".to_string(), 5)]
    );

    for i in 0..5 {
        browser.load_key(&format!("user:{}", i)).await.unwrap();
        browser.delete_key().await.unwrap();
    }
    assert_eq!(browser.category_counts(TEST_DB), vec![("session".to_string(), 2)]);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn deleting_a_key_removed_elsewhere_is_nothing_to_delete() {
    let mut con = fresh_db().await;
    let _: () = con.set("job:1", "x").await.unwrap();

    let mut browser = browser_on_test_db().await;
    browser.refresh_counts().await.unwrap();
    browser.load_key("job:1").await.unwrap();

    let _: () = con.del("job:1").await.unwrap();
    assert_eq!(browser.delete_key().await.unwrap(), DeleteOutcome::NothingToDelete);
    assert_eq!(browser.category_counts(TEST_DB), vec![("job".to_string(), 1)]);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn missing_key_is_not_found() {
    let _con = fresh_db().await;
    let mut browser = browser_on_test_db().await;
    let err = browser.load_key("does:not:exist").await.unwrap_err();
    assert!(matches!(err, BrowserError::NotFound(key) if key == "does:not:exist"));
    assert!(browser.session().is_none());
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn string_value_round_trips() {
    let mut con = fresh_db().await;
    let _: () = con.set("greeting", "hello").await.unwrap();

    let mut browser = browser_on_test_db().await;
    let descriptor = browser.load_key("greeting").await.unwrap().clone();
    assert_eq!(descriptor.kind, KeyKind::String);
    assert_eq!(descriptor.length, 1);

    browser.set_value(None, "hello, world\nsecond line").await.unwrap();
    let stored: String = con.get("greeting").await.unwrap();
    assert_eq!(stored, "hello, world\nsecond line");
    assert_eq!(browser.window().unwrap().rows[0].value, "hello, world\nsecond line");
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn long_list_window_and_head_removal() {
    let mut con = fresh_db().await;
    let items: Vec<String> = (0..250).map(|i| format!("item_{}", i)).collect();
    let _: () = con.rpush("queue", &items).await.unwrap();

    let mut browser = browser_on_test_db().await;
    let descriptor = browser.load_key("queue").await.unwrap().clone();
    assert_eq!(descriptor.length, 250);

    let window = browser.window().unwrap();
    assert_eq!(window.len(), 100);
    for (row, identity) in window.identities.iter().enumerate() {
        assert!(matches!(identity, Identity::Index { index, .. } if *index == row));
    }

    let outcome = browser.delete_rows(&[0]).await.unwrap();
    assert_eq!(outcome.removed, 1);
    assert!(!outcome.key_emptied);

    let head: Vec<String> = con.lrange("queue", 0, 0).await.unwrap();
    assert_eq!(head, vec!["item_1".to_string()]);
    assert_eq!(browser.session().unwrap().descriptor().length, 249);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn list_set_value_out_of_range_is_index_error() {
    let mut con = fresh_db().await;
    let _: () = con.rpush("short", &["a", "b", "c"]).await.unwrap();

    let mut browser = browser_on_test_db().await;
    browser.load_key("short").await.unwrap();
    browser.set_value(Some(1), "B").await.unwrap();
    let values: Vec<String> = con.lrange("short", 0, -1).await.unwrap();
    assert_eq!(values, vec!["a", "B", "c"]);

    // Shrink the list behind the loaded window, then edit the last row.
    let _: () = con.ltrim("short", 0, 0).await.unwrap();
    let err = browser.set_value(Some(2), "C").await.unwrap_err();
    assert!(matches!(err, BrowserError::IndexError { index: 2, .. }));
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn selected_duplicates_each_remove_one_occurrence() {
    let mut con = fresh_db().await;
    let _: () = con.rpush("dups", &["x", "y", "x", "x"]).await.unwrap();

    let mut browser = browser_on_test_db().await;
    browser.load_key("dups").await.unwrap();
    let outcome = browser.delete_rows(&[0, 2]).await.unwrap();
    assert_eq!(outcome.removed, 2);

    let values: Vec<String> = con.lrange("dups", 0, -1).await.unwrap();
    assert_eq!(values, vec!["y", "x"]);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn hash_upsert_replaces_exactly_the_captured_field() {
    let mut con = fresh_db().await;
    let _: () = con
        .hset_multiple("user:1", &[("a", "1"), ("b", "2"), ("c", "3")])
        .await
        .unwrap();

    let mut browser = browser_on_test_db().await;
    browser.load_key("user:1").await.unwrap();
    let window = browser.window().unwrap();
    let row = window
        .rows
        .iter()
        .position(|r| r.key.as_deref() == Some("b"))
        .unwrap();

    browser.upsert_member(row, "bb", Some("22")).await.unwrap();

    let mut fields: Vec<(String, String)> = con.hgetall("user:1").await.unwrap();
    fields.sort();
    assert_eq!(
        fields,
        vec![
            ("a".to_string(), "1".to_string()),
            ("bb".to_string(), "22".to_string()),
            ("c".to_string(), "3".to_string())
        ]
    );
    assert_eq!(browser.session().unwrap().descriptor().length, 3);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn zset_upsert_sets_new_score() {
    let mut con = fresh_db().await;
    let _: () = con
        .zadd_multiple("board", &[(1.0, "alice"), (2.0, "bob")])
        .await
        .unwrap();

    let mut browser = browser_on_test_db().await;
    browser.load_key("board").await.unwrap();
    let row = browser
        .window()
        .unwrap()
        .rows
        .iter()
        .position(|r| r.key.as_deref() == Some("alice"))
        .unwrap();

    browser.upsert_member(row, "alicia", Some("7.5")).await.unwrap();

    let alice: Option<f64> = con.zscore("board", "alice").await.unwrap();
    let alicia: Option<f64> = con.zscore("board", "alicia").await.unwrap();
    assert_eq!(alice, None);
    assert_eq!(alicia, Some(7.5));

    let err = browser.upsert_member(0, "carol", Some("lots")).await.unwrap_err();
    assert!(matches!(err, BrowserError::ValidationFailure(_)));
    let card: u64 = con.zcard("board").await.unwrap();
    assert_eq!(card, 2);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn removing_last_members_drops_key_and_count() {
    let mut con = fresh_db().await;
    let _: () = con.sadd("tags:post:1", &["rust", "redis"]).await.unwrap();
    let _: () = con.sadd("tags:post:2", "keep").await.unwrap();

    let mut browser = browser_on_test_db().await;
    browser.refresh_counts().await.unwrap();
    assert_eq!(browser.category_counts(TEST_DB), vec![("tags".to_string(), 2)]);

    browser.load_key("tags:post:1").await.unwrap();
    let partial = browser.delete_rows(&[0]).await.unwrap();
    assert!(!partial.key_emptied);
    assert_eq!(browser.category_counts(TEST_DB), vec![("tags".to_string(), 2)]);

    let outcome = browser.delete_rows(&[0]).await.unwrap();
    assert!(outcome.key_emptied);
    assert!(browser.session().is_none());
    assert_eq!(browser.category_counts(TEST_DB), vec![("tags".to_string(), 1)]);

    let exists: bool = con.exists("tags:post:1").await.unwrap();
    assert!(!exists);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn edits_are_rejected_for_the_wrong_type() {
    let mut con = fresh_db().await;
    let _: () = con.sadd("members", "a").await.unwrap();

    let mut browser = browser_on_test_db().await;
    browser.load_key("members").await.unwrap();
    let err = browser.set_value(Some(0), "b").await.unwrap_err();
    assert!(matches!(err, BrowserError::TypeMismatch { .. }));
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn large_member_collections_fill_exactly_one_window() {
    let mut con = fresh_db().await;
    let fields: Vec<(String, String)> = (0..1000)
        .map(|i| (format!("field_{}", i), format!("value_{}", i)))
        .collect();
    let members: Vec<String> = (0..1000).map(|i| format!("member_{}", i)).collect();
    let scored: Vec<(f64, String)> = (0..1000).map(|i| (i as f64, format!("player_{}", i))).collect();
    let _: () = con.hset_multiple("big:hash", &fields).await.unwrap();
    let _: () = con.sadd("big:set", &members).await.unwrap();
    let _: () = con.zadd_multiple("big:zset", &scored).await.unwrap();

    let mut browser = browser_on_test_db().await;
    for (key, kind) in [
        ("big:hash", KeyKind::Hash),
        ("big:set", KeyKind::Set),
        ("big:zset", KeyKind::SortedSet),
    ] {
        let descriptor = browser.load_key(key).await.unwrap().clone();
        assert_eq!(descriptor.kind, kind);
        assert_eq!(descriptor.length, 1000, "{}", key);

        let window = browser.window().unwrap();
        assert_eq!(window.len(), 100, "{}", key);
        assert_eq!(window.identities.len(), 100, "{}", key);
        let distinct: HashSet<&Identity> = window.identities.iter().collect();
        assert_eq!(distinct.len(), 100, "{}", key);
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn removing_every_row_empties_hash_and_list() {
    let mut con = fresh_db().await;
    let _: () = con
        .hset_multiple("cart:1", &[("apple", "2"), ("pear", "1")])
        .await
        .unwrap();
    let _: () = con.hset("cart:2", "plum", "4").await.unwrap();
    let _: () = con.rpush("jobs:pending", &["a", "b", "a"]).await.unwrap();

    let mut browser = browser_on_test_db().await;
    browser.refresh_counts().await.unwrap();
    assert_eq!(
        browser.category_counts(TEST_DB),
        vec![("cart".to_string(), 2), ("jobs".to_string(), 1)]
    );

    browser.load_key("cart:1").await.unwrap();
    let outcome = browser.delete_rows(&[0, 1]).await.unwrap();
    assert_eq!(outcome.removed, 2);
    assert!(outcome.key_emptied);
    assert!(browser.session().is_none());

    browser.load_key("jobs:pending").await.unwrap();
    let outcome = browser.delete_rows(&[0, 1, 2]).await.unwrap();
    assert_eq!(outcome.removed, 3);
    assert!(outcome.key_emptied);

    assert_eq!(browser.category_counts(TEST_DB), vec![("cart".to_string(), 1)]);
    let exists: bool = con.exists("cart:1").await.unwrap();
    assert!(!exists);
    let exists: bool = con.exists("jobs:pending").await.unwrap();
    assert!(!exists);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn removing_rows_of_a_vanished_key_leaves_counts_alone() {
    let mut con = fresh_db().await;
    let _: () = con.sadd("tags:a", &["x", "y"]).await.unwrap();
    let _: () = con.set("note:1", "hello").await.unwrap();

    let mut browser = browser_on_test_db().await;
    browser.refresh_counts().await.unwrap();

    browser.load_key("tags:a").await.unwrap();
    let _: () = con.del("tags:a").await.unwrap();
    let outcome = browser.delete_rows(&[0]).await.unwrap();
    assert_eq!(outcome.removed, 0);
    assert!(!outcome.key_emptied);
    assert!(outcome.key_gone);
    assert!(browser.session().is_none());

    browser.load_key("note:1").await.unwrap();
    let _: () = con.del("note:1").await.unwrap();
    let outcome = browser.delete_rows(&[0]).await.unwrap();
    assert!(!outcome.key_emptied);
    assert!(outcome.key_gone);
    assert!(browser.session().is_none());

    assert_eq!(
        browser.category_counts(TEST_DB),
        vec![("note".to_string(), 1), ("tags".to_string(), 1)]
    );
}
