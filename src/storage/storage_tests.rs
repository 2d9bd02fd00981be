use super::*;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    id: u32,
    title: String,
}

impl Document for Note {
    type Id = u32;
    const KIND: &'static str = "note";
    fn id(&self) -> u32 { self.id }
    fn conflict_with(&self, other: &Self) -> Option<AppError> {
        if self.id == other.id {
            return Some(AppError::conflict("note_exists", "duplicate id"));
        }
        if self.title == other.title {
            return Some(AppError::conflict("title_taken", "duplicate title"));
        }
        None
    }
}

fn note(id: u32, title: &str) -> Note { Note { id, title: title.to_string() } }

fn empty_store(dir: &Path) -> DocumentStore<Note> {
    let store = DocumentStore::new(dir.join("notes.json"));
    store.ensure_exists().unwrap();
    store
}

#[test]
fn missing_file_is_storage_error() {
    let tmp = tempfile::tempdir().unwrap();
    let store: DocumentStore<Note> = DocumentStore::new(tmp.path().join("absent.json"));
    let err = store.load().unwrap_err();
    assert!(matches!(err, AppError::Storage { .. }));
    assert_eq!(err.code_str(), "storage_read_failed");
}

#[test]
fn malformed_file_is_storage_error() {
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("notes.json");
    std::fs::write(&p, "{ not json").unwrap();
    let store: DocumentStore<Note> = DocumentStore::new(&p);
    let err = store.list().unwrap_err();
    assert_eq!(err.code_str(), "storage_decode_failed");
}

#[test]
fn save_of_load_round_trips() {
    let tmp = tempfile::tempdir().unwrap();
    let store = empty_store(tmp.path());
    store.insert(note(1, "a")).unwrap();
    store.insert(note(2, "b")).unwrap();

    let loaded = store.load().unwrap();
    store.save(&loaded).unwrap();
    assert_eq!(store.load().unwrap(), loaded);
}

#[test]
fn insert_rejects_conflicts_and_leaves_file_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let store = empty_store(tmp.path());
    store.insert(note(1, "alpha")).unwrap();
    let before = std::fs::read(store.path()).unwrap();

    let dup_id = store.insert(note(1, "beta")).unwrap_err();
    assert_eq!(dup_id.code_str(), "note_exists");
    let dup_title = store.insert(note(2, "alpha")).unwrap_err();
    assert_eq!(dup_title.code_str(), "title_taken");

    assert_eq!(std::fs::read(store.path()).unwrap(), before);
}

#[test]
fn update_checks_against_other_records_only() {
    let tmp = tempfile::tempdir().unwrap();
    let store = empty_store(tmp.path());
    store.insert(note(1, "alpha")).unwrap();
    store.insert(note(2, "beta")).unwrap();

    // same title on itself is fine
    let same = store.update(&1, |n| { n.title = "alpha".into(); Ok(()) }).unwrap();
    assert_eq!(same.title, "alpha");

    let clash = store.update(&1, |n| { n.title = "beta".into(); Ok(()) }).unwrap_err();
    assert_eq!(clash.http_status(), 409);

    let missing = store.replace(note(9, "zeta")).unwrap_err();
    assert!(missing.is_not_found());
    assert_eq!(missing.code_str(), "note_not_found");
}

#[test]
fn failed_mutation_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let store = empty_store(tmp.path());
    store.insert(note(1, "a")).unwrap();
    let r: AppResult<()> = store.mutate(|items| {
        items.clear();
        Err(AppError::user("rejected", "validation failed"))
    });
    assert!(r.is_err());
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn remove_and_remove_many() {
    let tmp = tempfile::tempdir().unwrap();
    let store = empty_store(tmp.path());
    for (i, t) in ["a", "b", "c"].iter().enumerate() {
        store.insert(note(i as u32 + 1, t)).unwrap();
    }
    assert_eq!(store.remove(&2).unwrap().title, "b");
    assert!(store.remove(&2).unwrap_err().is_not_found());

    let removed = store.remove_many(&[1, 42, 77]).unwrap();
    assert_eq!(removed, vec![note(1, "a")]);
    assert_eq!(store.list().unwrap(), vec![note(3, "c")]);
}

#[test]
fn get_and_find() {
    let tmp = tempfile::tempdir().unwrap();
    let store = empty_store(tmp.path());
    store.insert(note(5, "five")).unwrap();
    assert_eq!(store.get(&5).unwrap().title, "five");
    assert!(store.get(&6).unwrap_err().is_not_found());
    assert_eq!(store.find(|n| n.title == "five").unwrap().map(|n| n.id), Some(5));
    assert!(store.find(|n| n.title == "six").unwrap().is_none());
}

#[test]
fn ensure_exists_keeps_existing_content() {
    let tmp = tempfile::tempdir().unwrap();
    let store = empty_store(tmp.path());
    store.insert(note(1, "keep")).unwrap();
    store.ensure_exists().unwrap();
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn concurrent_inserts_are_not_lost() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(empty_store(tmp.path()));
    let n = 24u32;
    std::thread::scope(|s| {
        for i in 0..n {
            let store = Arc::clone(&store);
            s.spawn(move || store.insert(note(i + 1, &format!("n{}", i))).unwrap());
        }
    });
    let mut ids: Vec<u32> = store.list().unwrap().into_iter().map(|n| n.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=n).collect::<Vec<_>>());
}
