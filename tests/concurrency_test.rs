use rapport::config::CharacterTable;
use rapport::db;
use rapport::memory::emotion::{apply_delta, get_state};
use rapport::memory::types::EmotionalDelta;
use tempfile::TempDir;

#[test]
fn concurrent_deltas_are_never_lost() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("rapport.db");
    // Create schema once before the writers start
    drop(db::open_database(&db_path).unwrap());

    let writers: Vec<_> = (0..2)
        .map(|_| {
            let path = db_path.clone();
            std::thread::spawn(move || {
                let conn = db::open_database(&path).unwrap();
                let characters = CharacterTable::default();
                for _ in 0..40 {
                    apply_delta(&conn, &characters, "u1", "luna", &EmotionalDelta::default().trust(0.5)).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let conn = db::open_database(&db_path).unwrap();
    let state = get_state(&conn, "u1", "luna").unwrap().unwrap();
    // 50 baseline + 80 × 0.5
    assert!((state.vector.trust - 90.0).abs() < 1e-9, "trust = {}", state.vector.trust);
}

#[test]
fn concurrent_deltas_still_clamp() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("rapport.db");
    drop(db::open_database(&db_path).unwrap());

    let writers: Vec<_> = (0..3)
        .map(|_| {
            let path = db_path.clone();
            std::thread::spawn(move || {
                let conn = db::open_database(&path).unwrap();
                let characters = CharacterTable::default();
                for _ in 0..10 {
                    apply_delta(&conn, &characters, "u1", "luna", &EmotionalDelta::default().affection(7.0)).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let conn = db::open_database(&db_path).unwrap();
    let state = get_state(&conn, "u1", "luna").unwrap().unwrap();
    assert_eq!(state.vector.affection, 100.0);
}
