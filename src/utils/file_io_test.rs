use std::io::Write;

use super::file_io::open_file_for_append;

#[test]
fn test_open_file_for_append_creates_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs/agent/fleet.log");

    let mut f = open_file_for_append(&path).unwrap();
    writeln!(f, "first").unwrap();
    drop(f);
    let mut f = open_file_for_append(&path).unwrap();
    writeln!(f, "second").unwrap();
    drop(f);

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content, "first\nsecond\n");
}
