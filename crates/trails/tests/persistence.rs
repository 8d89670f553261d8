use std::fs;
use std::sync::{Arc, Mutex};

use brie_trails::{
    EntityRef, JsonFileBackend, MemoryBackend, NamePolicy, NoteId, PageUpdate, ParentContext,
    StoreConfig, StoreEvent, TrailDocument, TrailId, TrailKind, TrailStore, TrailStoreError,
    TrailUpdate, ValidationError,
};
use tempfile::tempdir;

#[test]
fn export_matches_documented_layout() {
    let mut store = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    let home = store
        .create_trail(Some("Home"), Default::default(), ParentContext::TopLevel)
        .unwrap();
    store
        .update_trail(
            home.id,
            TrailUpdate {
                icon: Some("🏠".into()),
                ..TrailUpdate::default()
            },
        )
        .unwrap();
    store
        .create_page(home.id, "https://example.com", Some("Example"))
        .unwrap();
    store.create_sub_trail(home.id, Some("Child")).unwrap();

    // Grouped trails stay out of the export.
    let area = store.create_area("Hidden", None).unwrap();
    store
        .create_trail(Some("Grouped"), Default::default(), ParentContext::Area(area.id))
        .unwrap();

    assert_eq!(
        store.export_trails_to_markdown(),
        "# Brie Browser Trails\n\n- 🏠[Home]\n  - [Example](https://example.com)\n  - [Child]\n"
    );
}

#[test]
fn empty_store_exports_header_only() {
    let store = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    assert_eq!(store.export_trails_to_markdown(), "# Brie Browser Trails\n\n");
}

#[test]
fn export_title_comes_from_config() {
    let config = StoreConfig {
        export_title: "Research".into(),
        ..StoreConfig::default()
    };
    let store = TrailStore::open(MemoryBackend::new(), config).unwrap();
    assert!(store.export_trails_to_markdown().starts_with("# Research\n\n"));
}

#[test]
fn import_recreates_exported_outline() {
    let mut source = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    let root = source
        .create_trail(Some("Rust"), Default::default(), ParentContext::TopLevel)
        .unwrap();
    source
        .create_page(root.id, "https://doc.rust-lang.org/book/", Some("The Book"))
        .unwrap();
    let nested = source.create_sub_trail(root.id, Some("Async")).unwrap();
    source
        .create_page(nested.id, "https://tokio.rs", Some("Tokio [runtime]"))
        .unwrap();
    source.create_sub_trail(nested.id, Some("Deeper")).unwrap();
    let exported = source.export_trails_to_markdown();

    let mut target = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    let summary = target.import_markdown(&exported).unwrap();

    assert_eq!(summary.roots.len(), 1);
    assert_eq!(summary.trails, 3);
    assert_eq!(summary.pages, 2);
    assert_eq!(target.export_trails_to_markdown(), exported);
    assert_eq!(target.backend().save_count(), 1);
}

#[test]
fn malformed_import_reports_line() {
    let mut store = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    let err = store
        .import_markdown("# Title\n\n- [Root]\n   - [Odd indent]\n")
        .unwrap_err();
    assert!(matches!(
        err,
        TrailStoreError::Validation(ValidationError::MalformedImport { line: 4, .. })
    ));
    assert!(store.is_empty());
}

#[test]
fn json_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let (trail_id, page_id) = {
        let mut store = TrailStore::open_in(dir.path(), StoreConfig::default()).unwrap();
        let trail = store
            .create_trail(Some("Persisted"), Default::default(), ParentContext::TopLevel)
            .unwrap();
        let page = store
            .create_page(trail.id, "https://example.org", None)
            .unwrap();
        store.set_active_page(Some(page.id)).unwrap();
        store
            .save_page_snapshot(page.id, Some(vec![0, 159, 146, 150, 255]))
            .unwrap();
        store.create_note(trail.id, Some("keep this")).unwrap();
        (trail.id, page.id)
    };

    assert!(dir.path().join("trails.json").exists());
    let store = TrailStore::open_in(dir.path(), StoreConfig::default()).unwrap();
    assert_eq!(store.trail(trail_id).unwrap().name, "Persisted");
    assert_eq!(store.selected_page().map(|p| p.id), Some(page_id));
    assert_eq!(store.page_snapshot(page_id), Some(&[0, 159, 146, 150, 255][..]));
    assert_eq!(store.note_for(trail_id).unwrap().content, "keep this");
}

#[test]
fn reopened_store_keeps_timestamps_increasing() {
    let dir = tempdir().unwrap();
    let trail = {
        let mut store = TrailStore::open_in(dir.path(), StoreConfig::default()).unwrap();
        store
            .create_trail(None, Default::default(), ParentContext::TopLevel)
            .unwrap()
    };
    let mut store = TrailStore::open_in(dir.path(), StoreConfig::default()).unwrap();
    let toggled_before = store.trail(trail.id).unwrap().updated_at;
    store.toggle_trail_collapsed(trail.id).unwrap();
    assert!(store.trail(trail.id).unwrap().updated_at > toggled_before);

    // New trails keep appending after the reloaded ones.
    let second = store
        .create_trail(None, Default::default(), ParentContext::TopLevel)
        .unwrap();
    assert_eq!(second.order_index, 1);
}

#[test]
fn corrupt_data_file_fails_open() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("trails.json"), "not json").unwrap();
    let err = TrailStore::open_in(dir.path(), StoreConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        TrailStoreError::Persistence {
            operation: "load",
            ..
        }
    ));
}

#[test]
fn failed_save_notifies_observers_and_keeps_state() {
    let mut store = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    store.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

    let trail = store
        .create_trail(Some("Stable"), Default::default(), ParentContext::TopLevel)
        .unwrap();
    store.backend_mut().fail_next_saves(1);
    let err = store.delete_trail(trail.id).unwrap_err();

    assert!(matches!(err, TrailStoreError::Persistence { .. }));
    assert!(store.resolve(&EntityRef::Trail(trail.id)).is_ok());
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0],
        StoreEvent::Changed {
            operation: "create trail"
        }
    );
    assert!(matches!(
        &events[1],
        StoreEvent::PersistenceFailed {
            operation: "delete trail",
            ..
        }
    ));
}

#[test]
fn validation_failures_emit_nothing() {
    let mut store = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    let count = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&count);
    let id = store.subscribe(move |_| *sink.lock().unwrap() += 1);

    let trail = store
        .create_trail(None, Default::default(), ParentContext::TopLevel)
        .unwrap();
    store.create_note(trail.id, None).unwrap();
    assert!(store.create_note(trail.id, None).is_err());
    assert_eq!(*count.lock().unwrap(), 2);

    assert!(store.unsubscribe(id));
    store.clear_all().unwrap();
    assert_eq!(*count.lock().unwrap(), 2);
}

#[test]
fn backup_writes_markdown_file() {
    let dir = tempdir().unwrap();
    let mut store = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    store
        .create_trail(Some("Saved"), Default::default(), ParentContext::TopLevel)
        .unwrap();
    let target = dir.path().join("exports").join("trails.md");
    store.backup_to(&target).unwrap();
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        "# Brie Browser Trails\n\n- [Saved]\n"
    );
}

#[test]
fn document_file_is_readable_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("custom.json");
    let mut store = TrailStore::open(JsonFileBackend::new(&path), StoreConfig::default()).unwrap();
    store
        .create_trail(Some("Visible"), Default::default(), ParentContext::TopLevel)
        .unwrap();

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["format_version"], 1);
    assert_eq!(value["trails"][0]["name"], "Visible");
    assert_eq!(value["trails"][0]["parent"]["kind"], "top_level");
}

#[test]
fn multi_line_text_still_round_trips_through_markdown() {
    let mut store = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    let trail = store
        .create_trail(Some("line1\nline2"), TrailKind::Trail, ParentContext::TopLevel)
        .unwrap();
    assert_eq!(trail.name, "Untitled Trail");
    store
        .update_trail(
            trail.id,
            TrailUpdate {
                icon: Some("🏠\n".into()),
                ..TrailUpdate::default()
            },
        )
        .unwrap();
    let page = store
        .create_page(trail.id, "https://a.example", Some("x\ny"))
        .unwrap();
    assert_eq!(page.title, "x y");
    let second = store
        .create_page(trail.id, "https://b.example", None)
        .unwrap();
    store
        .update_page(
            second.id,
            PageUpdate {
                title: Some("first\r\nsecond".into()),
                ..PageUpdate::default()
            },
        )
        .unwrap();

    let exported = store.export_trails_to_markdown();
    assert_eq!(
        exported,
        "# Brie Browser Trails\n\n- 🏠 [Untitled Trail]\n  - [x y](https://a.example)\n  - [first  second](https://b.example)\n"
    );

    let mut copy = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    copy.import_markdown(&exported).unwrap();
    assert_eq!(copy.export_trails_to_markdown(), exported);
}

#[test]
fn multi_line_names_are_rejected_under_strict_policy() {
    let config = StoreConfig {
        name_policy: NamePolicy::Reject,
        ..StoreConfig::default()
    };
    let mut store = TrailStore::open(MemoryBackend::new(), config).unwrap();
    let err = store
        .create_trail(Some("line1\nline2"), TrailKind::Trail, ParentContext::TopLevel)
        .unwrap_err();
    assert!(matches!(
        err,
        TrailStoreError::Validation(ValidationError::InvalidName(_))
    ));

    let trail = store
        .create_trail(Some("Valid"), TrailKind::Trail, ParentContext::TopLevel)
        .unwrap();
    let err = store
        .create_page(trail.id, "https://a.example/\nsecond", None)
        .unwrap_err();
    assert!(matches!(
        err,
        TrailStoreError::Validation(ValidationError::InvalidUrl(_))
    ));
}

#[test]
fn deactivated_selection_matches_after_reopen() {
    let dir = tempdir().unwrap();
    let (first, second) = {
        let mut store = TrailStore::open_in(dir.path(), StoreConfig::default()).unwrap();
        let trail = store
            .create_trail(Some("T"), TrailKind::Trail, ParentContext::TopLevel)
            .unwrap();
        let first = store.create_page(trail.id, "https://a.example", None).unwrap();
        let second = store.create_page(trail.id, "https://b.example", None).unwrap();
        store.set_active_page(Some(first.id)).unwrap();
        store
            .update_page(
                first.id,
                PageUpdate {
                    is_active: Some(false),
                    ..PageUpdate::default()
                },
            )
            .unwrap();
        assert!(store.selected_page().is_none());
        (first.id, second.id)
    };

    let mut store = TrailStore::open_in(dir.path(), StoreConfig::default()).unwrap();
    assert!(store.selected_page().is_none());
    assert!(store.page(first).is_some_and(|page| !page.is_active));

    // With two active pages the chosen one is remembered across reopen.
    store.set_active_page(Some(second)).unwrap();
    store
        .update_page(
            first,
            PageUpdate {
                is_active: Some(true),
                ..PageUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(store.selected_page().map(|page| page.id), Some(second));
    drop(store);

    let store = TrailStore::open_in(dir.path(), StoreConfig::default()).unwrap();
    assert_eq!(store.active_pages().len(), 2);
    assert_eq!(store.selected_page().map(|page| page.id), Some(second));
}

#[test]
fn deactivating_selection_falls_back_to_remaining_active_page() {
    let mut store = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    let trail = store
        .create_trail(None, TrailKind::Trail, ParentContext::TopLevel)
        .unwrap();
    let first = store.create_page(trail.id, "https://a.example", None).unwrap();
    let second = store.create_page(trail.id, "https://b.example", None).unwrap();
    store.set_active_page(Some(second.id)).unwrap();
    store
        .update_page(
            first.id,
            PageUpdate {
                is_active: Some(true),
                ..PageUpdate::default()
            },
        )
        .unwrap();
    store
        .update_page(
            second.id,
            PageUpdate {
                is_active: Some(false),
                ..PageUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(store.selected_page().map(|page| page.id), Some(first.id));
}

fn reopened(document: TrailDocument) -> TrailStore<MemoryBackend> {
    TrailStore::open(MemoryBackend::with_document(document), StoreConfig::default()).unwrap()
}

fn saved_document(store: &TrailStore<MemoryBackend>) -> TrailDocument {
    store.backend().document().cloned().expect("store saved a document")
}

fn without_trail(mut document: TrailDocument, id: TrailId) -> TrailDocument {
    document.trails.retain(|trail| trail.id != id);
    document
}

#[test]
fn trail_with_missing_parent_trail_is_lifted_to_top_level() {
    let mut store = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    let root = store
        .create_trail(Some("Root"), TrailKind::Trail, ParentContext::TopLevel)
        .unwrap();
    let child = store.create_sub_trail(root.id, Some("Child")).unwrap();
    store.create_page(child.id, "https://c.example", Some("C")).unwrap();

    let store = reopened(without_trail(saved_document(&store), root.id));
    let listed: Vec<TrailId> = store.trails().iter().map(|trail| trail.id).collect();
    assert_eq!(listed, vec![child.id]);
    assert_eq!(store.trail(child.id).unwrap().parent, ParentContext::TopLevel);
    assert_eq!(
        store.export_trails_to_markdown(),
        "# Brie Browser Trails\n\n- [Child]\n  - [C](https://c.example)\n"
    );
}

#[test]
fn trail_with_missing_area_or_folder_is_lifted_to_top_level() {
    let mut store = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    let area = store.create_area("Gone", None).unwrap();
    let folder = store.create_folder("Also gone", None).unwrap();
    let in_area = store
        .create_trail(Some("In area"), TrailKind::Trail, ParentContext::Area(area.id))
        .unwrap();
    let in_folder = store
        .create_trail(Some("In folder"), TrailKind::Trail, ParentContext::Folder(folder.id))
        .unwrap();

    let mut document = saved_document(&store);
    document.areas.clear();
    document.folders.clear();
    let store = reopened(document);

    let names: Vec<&str> = store.trails().iter().map(|trail| trail.name.as_str()).collect();
    assert_eq!(names, vec!["In area", "In folder"]);
    assert!(store.trail(in_area.id).unwrap().parent.is_top_level());
    assert!(store.trail(in_folder.id).unwrap().parent.is_top_level());
}

#[test]
fn page_of_missing_trail_is_dropped() {
    let mut store = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    let trail = store
        .create_trail(Some("Owner"), TrailKind::Trail, ParentContext::TopLevel)
        .unwrap();
    let page = store.create_page(trail.id, "https://p.example", None).unwrap();
    store.set_active_page(Some(page.id)).unwrap();

    let store = reopened(without_trail(saved_document(&store), trail.id));
    assert!(store.page(page.id).is_none());
    assert!(store.selected_page().is_none());
    assert!(store.is_empty());
}

#[test]
fn note_of_missing_trail_is_dropped() {
    let mut store = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    let trail = store
        .create_trail(Some("Owner"), TrailKind::Trail, ParentContext::TopLevel)
        .unwrap();
    let note = store.create_note(trail.id, Some("orphan")).unwrap();

    let store = reopened(without_trail(saved_document(&store), trail.id));
    assert!(store.note(note.id).is_none());
    assert!(store.is_empty());
}

#[test]
fn duplicate_notes_keep_the_oldest() {
    let mut store = TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap();
    let trail = store
        .create_trail(Some("Owner"), TrailKind::Trail, ParentContext::TopLevel)
        .unwrap();
    let note = store.create_note(trail.id, Some("original")).unwrap();

    let mut document = saved_document(&store);
    let mut copy = document.notes[0].clone();
    copy.id = NoteId::new();
    copy.created_at = note.created_at + chrono::Duration::seconds(1);
    copy.content = "later copy".into();
    document.notes.push(copy);

    let store = reopened(document);
    assert_eq!(store.note_for(trail.id).unwrap().id, note.id);
    assert_eq!(store.note_for(trail.id).unwrap().content, "original");
}
