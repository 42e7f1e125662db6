// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Exercises the `SharedStore` contract against `LocalStore`. `RedisStore`
//! implements the same contract against a live server and is not covered
//! here since this crate's tests don't spin up external services.

use super::*;
use std::time::Duration;

#[tokio::test]
async fn set_then_get_round_trips() {
    let store = LocalStore::new();
    store.set("k1", "v1", None).await.expect("set");
    assert_eq!(store.get("k1").await.expect("get"), Some("v1".to_string()));
}

#[tokio::test]
async fn get_on_missing_key_is_none() {
    let store = LocalStore::new();
    assert_eq!(store.get("missing").await.expect("get"), None);
}

#[tokio::test]
async fn delete_removes_key() {
    let store = LocalStore::new();
    store.set("k1", "v1", None).await.expect("set");
    store.delete("k1").await.expect("delete");
    assert_eq!(store.get("k1").await.expect("get"), None);
}

#[tokio::test]
async fn ttl_expires_entry() {
    let store = LocalStore::new();
    store.set("k1", "v1", Some(Duration::from_millis(10))).await.expect("set");
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(store.get("k1").await.expect("get"), None);
}

#[tokio::test]
async fn set_if_absent_acquires_once() {
    let store = LocalStore::new();
    let first = store.set_if_absent("lock", "owner-a", None).await.expect("set_if_absent");
    assert_eq!(first, AcquireOutcome::Acquired);

    let second = store.set_if_absent("lock", "owner-b", None).await.expect("set_if_absent");
    assert_eq!(second, AcquireOutcome::Occupied);
    assert_eq!(store.get("lock").await.expect("get"), Some("owner-a".to_string()));
}

#[tokio::test]
async fn set_if_absent_after_ttl_expiry_reacquires() {
    let store = LocalStore::new();
    store.set_if_absent("lock", "owner-a", Some(Duration::from_millis(10))).await.expect("acquire");
    tokio::time::sleep(Duration::from_millis(30)).await;
    let second = store.set_if_absent("lock", "owner-b", None).await.expect("set_if_absent");
    assert_eq!(second, AcquireOutcome::Acquired);
}

#[tokio::test]
async fn compare_and_set_succeeds_on_match() {
    let store = LocalStore::new();
    store.set("epoch", "1", None).await.expect("set");
    let outcome = store.compare_and_set("epoch", "1", "2", None).await.expect("cas");
    assert_eq!(outcome, CasOutcome::Ok);
    assert_eq!(store.get("epoch").await.expect("get"), Some("2".to_string()));
}

#[tokio::test]
async fn compare_and_set_rejects_on_mismatch() {
    let store = LocalStore::new();
    store.set("epoch", "1", None).await.expect("set");
    let outcome = store.compare_and_set("epoch", "99", "2", None).await.expect("cas");
    assert_eq!(outcome, CasOutcome::Conflict);
    assert_eq!(store.get("epoch").await.expect("get"), Some("1".to_string()));
}

#[tokio::test]
async fn compare_and_set_against_absent_key_requires_empty_expected() {
    let store = LocalStore::new();
    let outcome = store.compare_and_set("fresh", "", "1", None).await.expect("cas");
    assert_eq!(outcome, CasOutcome::Conflict);
}

#[tokio::test]
async fn publish_before_subscribe_is_dropped_silently() {
    let store = LocalStore::new();
    store.publish("chan", "nobody-home").await.expect("publish");
}

#[tokio::test]
async fn subscriber_receives_published_payload() {
    let store = LocalStore::new();
    let mut rx = store.subscribe("chan").await.expect("subscribe");
    store.publish("chan", "hello").await.expect("publish");
    let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("no timeout")
        .expect("channel open");
    assert_eq!(received, "hello");
}

#[tokio::test]
async fn scan_filters_by_prefix() {
    let store = LocalStore::new();
    store.set("agent:a1", "x", None).await.expect("set");
    store.set("agent:a2", "x", None).await.expect("set");
    store.set("session:s1", "x", None).await.expect("set");

    let mut keys = store.scan("agent:").await.expect("scan");
    keys.sort();
    assert_eq!(keys, vec!["agent:a1".to_string(), "agent:a2".to_string()]);
}
