use std::{cell::RefCell, fs, rc::Rc};

use tempfile::tempdir;

use transbuf::{
    archive::{Archive, Archived},
    config::{BufferConfig, ConfigError, DEFAULT_MAX_MEMORY_BYTES},
    core::buffer::{TransactionBuffer, Unavailable},
    object::{ElementOps, ScriptArray, Transactable},
    types::{ArrayHandle, ArrayOp, ObjectRef},
};

/// Serializes to exactly 32 bytes.
#[derive(Debug, Default)]
struct Block {
    cells: [u64; 4],
}

impl Transactable for Block {
    fn serialize(&mut self, ar: &mut dyn Archive) {
        self.cells.archive(ar);
    }
}

#[derive(Debug, Default)]
struct Track {
    samples: Vec<u64>,
}

impl Transactable for Track {
    fn serialize(&mut self, _ar: &mut dyn Archive) {}

    fn array_mut(&mut self, handle: ArrayHandle) -> Option<&mut dyn ScriptArray> {
        (handle == ArrayHandle(0)).then_some(&mut self.samples as &mut dyn ScriptArray)
    }
}

fn block() -> (Rc<RefCell<Block>>, ObjectRef) {
    let rc = Rc::new(RefCell::new(Block::default()));
    let obj = ObjectRef::from(&rc);
    (rc, obj)
}

fn edit(buffer: &mut TransactionBuffer, rc: &Rc<RefCell<Block>>, obj: &ObjectRef, n: u64) {
    buffer.begin("Editor", &format!("Edit {n}"));
    buffer.save_object(obj);
    rc.borrow_mut().cells = [n; 4];
    buffer.end();
}

#[test]
fn undo_size_tracks_captured_bytes() {
    let mut buffer = TransactionBuffer::default();
    let (rc, obj) = block();
    assert_eq!(buffer.undo_size(), 0);

    edit(&mut buffer, &rc, &obj, 1);
    assert_eq!(buffer.undo_size(), 32);

    let (other_rc, other) = block();
    buffer.begin("Editor", "Both");
    buffer.save_object(&obj);
    buffer.save_object(&other);
    other_rc.borrow_mut().cells[0] = 9;
    buffer.end();
    assert_eq!(buffer.undo_size(), 96);
    assert_eq!(buffer.get_transaction(1).map(|t| t.data_size()), Some(64));
}

#[test]
fn oldest_transactions_are_evicted_over_budget() {
    let mut buffer = TransactionBuffer::new(BufferConfig {
        max_memory_bytes: 64,
        ..BufferConfig::default()
    });
    let (rc, obj) = block();

    edit(&mut buffer, &rc, &obj, 1);
    edit(&mut buffer, &rc, &obj, 2);
    edit(&mut buffer, &rc, &obj, 3);
    assert_eq!(buffer.queue_len(), 3);
    assert_eq!(buffer.undo_size(), 96);

    // History is 96 bytes when this one begins, so "Edit 1" goes.
    buffer.begin("Editor", "Edit 4");
    assert_eq!(buffer.undo_size(), 64);
    buffer.save_object(&obj);
    rc.borrow_mut().cells = [4; 4];
    buffer.end();
    assert_eq!(buffer.undo_size(), 96);
    assert_eq!(buffer.queue_len(), 3);
    assert_eq!(buffer.get_transaction(0).map(|t| t.title()), Some("Edit 2"));

    for expected in [3, 2, 1] {
        assert!(buffer.undo());
        assert_eq!(rc.borrow().cells, [expected; 4]);
    }
    assert_eq!(
        buffer.can_undo(),
        Err(Unavailable::NothingToUndo("Startup".to_string()))
    );
    assert_eq!(rc.borrow().cells, [1; 4]);
}

#[test]
fn eviction_never_drops_the_transaction_being_opened() {
    let mut buffer = TransactionBuffer::new(BufferConfig {
        max_memory_bytes: 0,
        ..BufferConfig::default()
    });
    let (rc, obj) = block();

    edit(&mut buffer, &rc, &obj, 1);
    edit(&mut buffer, &rc, &obj, 2);
    assert_eq!(buffer.queue_len(), 1);
    assert!(buffer.undo());
    assert_eq!(rc.borrow().cells, [1; 4]);
}

#[test]
fn config_defaults_fill_missing_fields() {
    let config = BufferConfig::from_json_str(r#"{"max_memory_bytes": 4096}"#).expect("parse");
    assert_eq!(config.max_memory_bytes, 4096);
    assert_eq!(config.startup_reason, "Startup");

    let empty = BufferConfig::from_json_str("{}").expect("parse");
    assert_eq!(empty, BufferConfig::default());
    assert_eq!(empty.max_memory_bytes, DEFAULT_MAX_MEMORY_BYTES);
}

#[test]
fn config_loads_from_file_and_sets_reset_reason() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("buffer.json");
    fs::write(
        &path,
        r#"{"max_memory_bytes": 128, "startup_reason": "Map loaded"}"#,
    )
    .expect("write config");

    let config = BufferConfig::from_json_file(&path).expect("load");
    let buffer = TransactionBuffer::new(config);
    assert_eq!(buffer.max_memory(), 128);
    assert_eq!(buffer.reset_reason(), "Map loaded");
    assert_eq!(
        buffer.undo_context(true).title,
        "(Can't undo after: Map loaded)"
    );
}

#[test]
fn config_errors_are_reported() {
    let dir = tempdir().expect("tempdir");
    let missing = BufferConfig::from_json_file(dir.path().join("absent.json"));
    assert!(matches!(missing, Err(ConfigError::Io(_))));

    let malformed = BufferConfig::from_json_str(r#"{"max_memory_bytes": "lots"}"#);
    assert!(matches!(malformed, Err(ConfigError::Serde(_))));
}

#[test]
fn insert_records_capture_no_bytes_until_flipped() {
    let mut buffer = TransactionBuffer::default();
    let track = Rc::new(RefCell::new(Track { samples: vec![1, 2] }));
    let obj = ObjectRef::from(&track);

    buffer.begin("Editor", "Append");
    buffer.save_array(&obj, ArrayHandle(0), 2, 1, ArrayOp::Insert, ElementOps::of::<u64>());
    track.borrow_mut().samples.push(3);
    assert_eq!(buffer.undo_size(), 0);
    buffer.save_array(&obj, ArrayHandle(0), 0, 1, ArrayOp::Modify, ElementOps::of::<u64>());
    assert_eq!(buffer.undo_size(), 8);
    track.borrow_mut().samples[0] = 10;
    buffer.end();

    // Undo re-captures the inserted element as a remove record for redo.
    assert!(buffer.undo());
    assert_eq!(track.borrow().samples, vec![1, 2]);
    assert_eq!(buffer.undo_size(), 16);
}
