use super::*;
use crate::coordination::Stat;

#[test]
fn test_classify_routes_by_exact_segment() {
    assert_eq!(
        QueueKind::classify("/fleet/instances/g1/grp@s1/inst@i1/pingstatus"),
        QueueKind::Liveness
    );
    assert_eq!(
        QueueKind::classify("/fleet/instances/g1/grp@s1/inst@i1"),
        QueueKind::Topology
    );
    assert_eq!(
        QueueKind::classify("/fleet/instances/g1/grp@s1/inst@pingstatus2"),
        QueueKind::Topology
    );
}

#[test]
fn test_delete_entry_layout() {
    let event = ChangeEvent::deleted("/fleet/instances/g1", 1700000000000);
    assert_eq!(event.encode(), "0##/fleet/instances/g1##1##1700000000000");
}

#[test]
fn test_create_and_update_entry_layout() {
    let stat = Stat {
        czxid: 12,
        mtime: 99,
        ..Default::default()
    };
    let created = ChangeEvent::created("/fleet/instances/g1/grp@s1", &stat, 7, "W".to_string());
    assert_eq!(created.encode(), "0#12#/fleet/instances/g1/grp@s1#7#3#W#99");

    let updated = ChangeEvent::updated("/fleet/instances/g1/grp@s1", &stat, 7, "R".to_string());
    assert_eq!(updated.encode(), "0#12#/fleet/instances/g1/grp@s1#7#2#R#99");
}

#[test]
fn test_decode_keeps_hash_in_data() {
    let stat = Stat {
        czxid: 3,
        mtime: 5,
        ..Default::default()
    };
    let event = ChangeEvent::updated("/a/b", &stat, 1, "x#y@z".to_string());
    assert_eq!(ChangeEvent::decode(&event.encode()).unwrap(), event);

    let deleted = ChangeEvent::decode("0##/a/b##1##42").unwrap();
    assert_eq!(deleted.kind, ChangeKind::Delete);
    assert_eq!(deleted.txn_id, None);
    assert_eq!(deleted.timestamp, 42);
}

#[test]
fn test_decode_rejects_garbage() {
    assert!(ChangeEvent::decode("1").is_err());
    assert!(ChangeEvent::decode("0#x#/a#1#3#d#5").is_err());
    assert!(ChangeEvent::decode("0#1#/a#1#9#d#5").is_err());
}
