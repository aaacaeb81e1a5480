//! Session store integration tests

use std::collections::BTreeMap;

use murmur_agent::{Error, SessionStore, TurnExtractor};

fn store_in(dir: &tempfile::TempDir) -> SessionStore {
    SessionStore::open(dir.path().join("conversation_data.json"))
}

#[test]
fn turns_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversation_data.json");

    let session = {
        let mut store = SessionStore::open(&path);
        store.record_turn("hello", "hi there", BTreeMap::new());
        store.record_turn("what's up", "not much", BTreeMap::new());
        store.current_session().to_string()
    };

    let reopened = SessionStore::open(&path);
    let hits = reopened.search("hello");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].session_id, session);
    assert_eq!(hits[0].turn.assistant_text, "hi there");
}

#[test]
fn extracted_info_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversation_data.json");
    let extractor = TurnExtractor::default();

    let session = {
        let mut store = SessionStore::open(&path);
        let info = extractor.extract("reach me at 555-123-4567", "Noted.");
        store.record_turn("reach me at 555-123-4567", "Noted.", info);
        store.current_session().to_string()
    };

    let reopened = SessionStore::open(&path);
    let summary = reopened.summarize(&session).unwrap();
    assert_eq!(summary["phone"], vec!["555-123-4567"]);
}

#[test]
fn summary_merges_chronologically_and_dedupes() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_in(&dir);

    let mut first = BTreeMap::new();
    first.insert("phone".to_string(), vec!["555-111-2222".to_string()]);
    store.record_turn("call me", "ok", first);

    let mut second = BTreeMap::new();
    second.insert(
        "phone".to_string(),
        vec!["555-111-2222".to_string(), "555-333-4444".to_string()],
    );
    second.insert("email".to_string(), vec!["a@b.com".to_string()]);
    store.record_turn("also this one", "noted", second);

    let session = store.current_session().to_string();
    let summary = store.summarize(&session).unwrap();

    assert_eq!(summary["phone"], vec!["555-111-2222", "555-333-4444"]);
    assert_eq!(summary["email"], vec!["a@b.com"]);
}

#[test]
fn summarizing_an_unknown_session_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    let err = store.summarize("20190101_000000").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn corrupt_file_starts_an_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversation_data.json");
    std::fs::write(&path, "{ not json").unwrap();

    let mut store = SessionStore::open(&path);
    assert!(store.session_ids().is_empty());

    // And recording still works, replacing the corrupt file
    store.record_turn("fresh start", "welcome back", BTreeMap::new());
    let reopened = SessionStore::open(&path);
    assert_eq!(reopened.search("fresh start").len(), 1);
}

#[test]
fn new_session_separates_turns() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_in(&dir);

    store.record_turn("first session", "ok", BTreeMap::new());
    let first = store.current_session().to_string();
    let second = store.new_session();
    assert_ne!(first, second);

    store.record_turn("second session", "ok", BTreeMap::new());

    assert_eq!(store.search("first session")[0].session_id, first);
    assert_eq!(store.search("second session")[0].session_id, second);
}

#[test]
fn search_is_case_insensitive_and_covers_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_in(&dir);

    store.record_turn("I need a DENTIST appointment", "Sure thing", BTreeMap::new());
    store.record_turn("thanks", "See the dentist on Monday", BTreeMap::new());

    let hits = store.search("dentist");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].turn_index, 0);
    assert_eq!(hits[1].turn_index, 1);
}
