use codex_subagent::models::session::{compose_prompt, Role, Turn};
use codex_subagent::persistence::session_store::SessionStore;

#[test]
fn compose_prompt_joins_history_with_newlines() {
    assert_eq!(compose_prompt(&[], "hi"), "hi");
    let history = vec![Turn::new(Role::User, "A"), Turn::new(Role::Assistant, "B")];
    assert_eq!(compose_prompt(&history, "C"), "A\nB\nC");
}

#[test]
fn new_sessions_get_distinct_hex_ids() {
    let store = SessionStore::in_memory();
    let a = store.new_session().expect("session");
    let b = store.new_session().expect("session");
    assert_ne!(a, b);
    assert_eq!(a.len(), 32);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(store.contains(&a));
    assert!(store.get(&a).is_empty());
}

#[test]
fn append_creates_unknown_sessions_and_preserves_order() {
    let store = SessionStore::in_memory();
    store.append("s1", Role::User, "A").expect("append");
    store.append("s1", Role::Assistant, "B").expect("append");

    let turns = store.get("s1");
    assert_eq!(
        turns,
        vec![Turn::new(Role::User, "A"), Turn::new(Role::Assistant, "B")]
    );
    assert_eq!(store.compose_prompt("s1", "C"), "A\nB\nC");
    assert_eq!(store.compose_prompt("unknown", "C"), "C");
    assert!(store.get("unknown").is_empty());
}

#[test]
fn contents_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("sessions.json");

    let id = {
        let store = SessionStore::open(&path);
        let id = store.new_session().expect("session");
        store.append(&id, Role::User, "hello").expect("append");
        store.append(&id, Role::Assistant, "world").expect("append");
        id
    };

    let reopened = SessionStore::open(&path);
    assert_eq!(reopened.get(&id).len(), 2);
    assert_eq!(reopened.session_ids(), vec![id.clone()]);

    let raw = std::fs::read_to_string(&path).expect("read file");
    let json: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(json[&id][0]["role"], "user");
    assert_eq!(json[&id][1]["content"], "world");
}

#[test]
fn corrupt_file_degrades_to_empty_and_is_overwritten() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sessions.json");
    std::fs::write(&path, "{ not json").expect("write");

    let store = SessionStore::open(&path);
    assert!(store.session_ids().is_empty());

    store.append("s1", Role::User, "fresh").expect("append");
    let reopened = SessionStore::open(&path);
    assert_eq!(reopened.get("s1"), vec![Turn::new(Role::User, "fresh")]);
}

#[test]
fn no_temp_files_are_left_behind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sessions.json");
    let store = SessionStore::open(&path);
    for i in 0..5 {
        store.append("s", Role::User, &format!("turn {i}")).expect("append");
    }
    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .collect();
    assert_eq!(entries.len(), 1);
}
