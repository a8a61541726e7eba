use financepro_core::{decode_user_config, decode_user_data, format_size, Amount, Expense, StoreError, UserData};
use financepro_json::{dir_size, StoreOptions, UserStore};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tempfile::TempDir;

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn tea() -> Expense {
    Expense::new(Amount::from_str("5").unwrap(), "Tea", "Food").with_tags(["daily"])
}

/// A user with one persisted coffee expense and three prior launches.
fn seed_bob(root: &Path) {
    let dir = root.join("bob");
    fs::create_dir_all(&dir).unwrap();
    let data = json!({
        "expenses": [{"amount": 12.50, "name": "Coffee", "category": "Food", "tags": ["daily"]}],
        "names": ["Coffee"],
        "categories": ["Food"],
        "tags": ["daily"]
    });
    fs::write(dir.join("data.json"), serde_json::to_vec_pretty(&data).unwrap()).unwrap();
    let config = json!({"username": "bob", "launches": 3, "data_size": "1 B"});
    fs::write(dir.join("config.json"), config.to_string()).unwrap();
}

fn open_bob(root: &Path) -> UserStore {
    UserStore::open("bob", &StoreOptions::in_dir(root)).unwrap()
}

#[test]
fn fresh_user_is_bootstrapped() {
    let tmp = TempDir::new().unwrap();
    let store = UserStore::open("alice", &StoreOptions::in_dir(tmp.path())).unwrap();

    let dir = tmp.path().join("alice");
    assert!(dir.is_dir());
    assert_eq!(
        read_json(&dir.join("data.json")),
        json!({"expenses": [], "names": [], "categories": [], "tags": []})
    );
    let config = read_json(&dir.join("config.json"));
    assert_eq!(config["launches"], 1);
    assert_eq!(config["username"], "alice");
    assert_eq!(store.config().launches, 1);
    assert!(store.combined().is_empty());
}

#[test]
fn existing_user_loads_boot_snapshot() {
    let tmp = TempDir::new().unwrap();
    seed_bob(tmp.path());
    let store = open_bob(tmp.path());

    assert_eq!(store.boot().expenses.len(), 1);
    assert_eq!(store.boot().expenses[0].amount, Amount::from_str("12.50").unwrap());
    assert_eq!(store.combined(), store.boot());
    assert!(store.staged().expenses.is_empty());
    assert!(!store.has_changes());
    // Counted in memory only until the next save.
    assert_eq!(store.config().launches, 4);
    assert_eq!(read_json(&store.paths().config)["launches"], 3);
}

#[test]
fn adding_grows_combined_and_staged_diff() {
    let tmp = TempDir::new().unwrap();
    seed_bob(tmp.path());
    let mut store = open_bob(tmp.path());

    store.add_expense(tea());

    assert_eq!(store.combined().expenses.len(), 2);
    assert_eq!(store.combined().tags, set(&["daily"]));
    assert_eq!(store.combined().names, set(&["Coffee", "Tea"]));
    assert_eq!(store.staged().names, set(&["Tea"]));
    assert_eq!(store.pending_count(), 2);
}

#[test]
fn revert_leaves_disk_alone() {
    let tmp = TempDir::new().unwrap();
    seed_bob(tmp.path());
    let mut store = open_bob(tmp.path());
    let before = fs::read(&store.paths().data).unwrap();

    store.add_expense(tea());
    store.revert();

    assert_eq!(store.combined().expenses.len(), 1);
    assert_eq!(store.combined().expenses[0].name, "Coffee");
    assert!(store.staged().is_empty());
    assert_eq!(store.combined(), store.boot());
    assert_eq!(fs::read(&store.paths().data).unwrap(), before);
}

#[test]
fn save_commits_staging_and_refreshes_config() {
    let tmp = TempDir::new().unwrap();
    seed_bob(tmp.path());
    let mut store = open_bob(tmp.path());
    let old_config_len = fs::metadata(&store.paths().config).unwrap().len();

    store.add_expense(tea());
    let expected = store.combined().clone();
    assert!(store.save().unwrap());

    assert!(store.staged().is_empty());
    let data = read_json(&store.paths().data);
    assert_eq!(data["expenses"].as_array().unwrap().len(), 2);
    assert_eq!(data["tags"], json!(["daily"]));
    let on_disk: UserData = decode_user_data(&fs::read(&store.paths().data).unwrap()).unwrap();
    assert_eq!(on_disk, expected);

    // Size is taken after the data and backup writes, before the config rewrite.
    let config = decode_user_config(&fs::read(&store.paths().config).unwrap()).unwrap();
    let new_config_len = fs::metadata(&store.paths().config).unwrap().len();
    let measured = dir_size(&store.paths().dir).unwrap() - new_config_len + old_config_len;
    assert_eq!(config.data_size, format_size(measured));
    assert_ne!(config.data_size, "1 B");
    assert_eq!(config.launches, 4);
}

#[test]
fn saved_data_reloads_in_next_session() {
    let tmp = TempDir::new().unwrap();
    seed_bob(tmp.path());
    let mut store = open_bob(tmp.path());
    store.add_expense(tea());
    store.add_tag("gift");
    store.save().unwrap();
    let committed = store.combined().clone();
    drop(store);

    let store = open_bob(tmp.path());
    assert_eq!(store.boot(), &committed);
    assert!(store.boot().tags.contains("gift"));
    assert_eq!(store.config().launches, 5);
}

#[test]
fn second_save_without_changes_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    seed_bob(tmp.path());
    let mut store = open_bob(tmp.path());
    store.add_expense(tea());

    assert!(store.save().unwrap());
    let data = fs::read(&store.paths().data).unwrap();
    let config = fs::read(&store.paths().config).unwrap();

    assert!(!store.save().unwrap());
    assert_eq!(fs::read(&store.paths().data).unwrap(), data);
    assert_eq!(fs::read(&store.paths().config).unwrap(), config);
}

#[test]
fn failed_save_keeps_staged_changes() {
    let tmp = TempDir::new().unwrap();
    seed_bob(tmp.path());
    let mut store = open_bob(tmp.path());
    store.add_expense(tea());

    fs::remove_dir_all(&store.paths().dir).unwrap();
    let err = store.save().unwrap_err();
    assert!(matches!(err, StoreError::Persistence { .. }));
    assert_eq!(store.staged().expenses, vec![tea()]);
    assert_eq!(store.combined().expenses.len(), 2);

    fs::create_dir_all(&store.paths().dir).unwrap();
    assert!(store.save().unwrap());
    assert!(!store.has_changes());
}

#[test]
fn wrong_typed_field_is_corrupt_not_empty() {
    let tmp = TempDir::new().unwrap();
    seed_bob(tmp.path());
    let data_path = tmp.path().join("bob").join("data.json");
    fs::write(
        &data_path,
        r#"{"expenses":[{"amount":"twelve","name":"Coffee","category":"Food"}],"names":[],"categories":[],"tags":[]}"#,
    )
    .unwrap();

    let err = UserStore::open("bob", &StoreOptions::in_dir(tmp.path())).err().unwrap();
    match err {
        StoreError::CorruptData { path, issue } => {
            assert_eq!(path, data_path);
            assert_eq!(issue.field.as_deref(), Some("expenses[0].amount"));
        }
        other => panic!("expected corrupt data, got {other}"),
    }
    // The file is left untouched for the caller to decide.
    assert!(fs::read_to_string(&data_path).unwrap().contains("twelve"));
}

#[test]
fn corrupt_config_is_reported() {
    let tmp = TempDir::new().unwrap();
    seed_bob(tmp.path());
    fs::write(tmp.path().join("bob").join("config.json"), r#"{"username":"bob","launches":-1,"data_size":"1 B"}"#).unwrap();
    let err = UserStore::open("bob", &StoreOptions::in_dir(tmp.path())).err().unwrap();
    assert!(err.is_corrupt());
}

#[test]
fn recovery_quarantines_corrupt_file() {
    let tmp = TempDir::new().unwrap();
    seed_bob(tmp.path());
    let dir = tmp.path().join("bob");
    fs::write(dir.join("data.json"), b"{\"expenses\": 7}").unwrap();

    let store = UserStore::recover_corrupt("bob", &StoreOptions::in_dir(tmp.path())).unwrap();

    assert!(store.combined().is_empty());
    // The intact config survives, so the launch history is kept.
    assert_eq!(store.config().launches, 4);
    let quarantined: Vec<_> = fs::read_dir(dir.join("backups"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(quarantined.len(), 1);
    assert!(quarantined[0].starts_with("corrupt-data-"));
}

#[test]
fn missing_config_is_regenerated() {
    let tmp = TempDir::new().unwrap();
    seed_bob(tmp.path());
    fs::remove_file(tmp.path().join("bob").join("config.json")).unwrap();

    let mut store = open_bob(tmp.path());
    assert_eq!(store.config().launches, 1);
    store.add_tag("x");
    store.save().unwrap();
    assert_eq!(read_json(&store.paths().config)["launches"], 1);
}

#[test]
fn missing_index_entries_are_restored_on_load() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("dana");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("data.json"),
        r#"{"expenses":[{"amount":3,"name":"Bus","category":"Transport","tags":["commute"]}]}"#,
    )
    .unwrap();

    let store = UserStore::open("dana", &StoreOptions::in_dir(tmp.path())).unwrap();
    assert_eq!(store.boot().names, set(&["Bus"]));
    assert_eq!(store.boot().categories, set(&["Transport"]));
    assert_eq!(store.boot().tags, set(&["commute"]));
    assert!(!store.has_changes());
}

#[test]
fn backups_are_rotated() {
    let tmp = TempDir::new().unwrap();
    let options = StoreOptions {
        root: Some(tmp.path().to_path_buf()),
        max_backups: 2,
    };
    let mut store = UserStore::open("erin", &options).unwrap();
    for i in 0..4 {
        store.add_tag(&format!("t{i}"));
        store.save().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    let backups = fs::read_dir(&store.paths().backups).unwrap().count();
    assert_eq!(backups, 2);
}

#[test]
fn stores_for_different_users_are_independent() {
    let tmp = TempDir::new().unwrap();
    let options = StoreOptions::in_dir(tmp.path());
    let mut a = UserStore::open("amy", &options).unwrap();
    let b = UserStore::open("ben", &options).unwrap();
    a.add_expense(tea());
    a.save().unwrap();
    assert!(b.combined().is_empty());
    assert!(UserStore::open("ben", &options).unwrap().combined().is_empty());
}

#[test]
fn saved_amounts_reload_exactly() {
    let tmp = TempDir::new().unwrap();
    let options = StoreOptions::in_dir(tmp.path());
    let texts = [
        "1234567890123456.78",
        "0.123456789012345678",
        "79228162514264337593543950335",
        "12.50",
    ];
    let mut store = UserStore::open("fay", &options).unwrap();
    for (i, text) in texts.iter().enumerate() {
        store.add_expense(Expense::new(Amount::from_str(text).unwrap(), format!("e{i}"), "Misc"));
    }
    assert!(store.save().unwrap());
    let saved = store.combined().clone();
    drop(store);

    let store = UserStore::open("fay", &options).unwrap();
    assert_eq!(store.boot(), &saved);
    let reloaded: Vec<String> = store
        .boot()
        .expenses
        .iter()
        .map(|e| e.amount.value().to_string())
        .collect();
    assert_eq!(reloaded, texts);
    assert_eq!(read_json(&store.paths().data)["expenses"][3]["amount"], "12.50");
}
