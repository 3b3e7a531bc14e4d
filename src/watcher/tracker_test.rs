use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::*;
use crate::coordination::CoordinationClient;
use crate::coordination::CreateMode;
use crate::coordination::MemorySession;
use crate::coordination::MemoryTree;
use crate::coordination::MockCoordinationClient;
use crate::coordination::Stat;
use crate::CoordinationError;

async fn tree_with_children(names: &[&str]) -> Arc<MemorySession> {
    let tree = MemoryTree::new(Duration::from_secs(1));
    let (tx, _rx) = mpsc::unbounded_channel();
    let client = tree.open_session(tx);
    client.create("/p", b"", CreateMode::Persistent).await.unwrap();
    for name in names {
        client
            .create(&format!("/p/{name}"), name.as_bytes(), CreateMode::Persistent)
            .await
            .unwrap();
    }
    client
}

#[tokio::test]
async fn test_discover_returns_each_child_once() {
    let client = tree_with_children(&["b", "a", "c"]).await;
    let tracker = NewChildTracker::new();

    let first = tracker.discover(client.as_ref(), "/p").await.unwrap();
    let paths: Vec<_> = first.iter().map(|n| n.path.as_str()).collect();
    assert_eq!(paths, vec!["/p/a", "/p/b", "/p/c"]);
    assert_eq!(first[0].data, b"a");

    for _ in 0..3 {
        assert!(tracker.discover(client.as_ref(), "/p").await.unwrap().is_empty());
    }
    assert_eq!(tracker.len().await, 3);
}

#[tokio::test]
async fn test_discover_sees_only_new_children() {
    let client = tree_with_children(&["a"]).await;
    let tracker = NewChildTracker::new();
    tracker.discover(client.as_ref(), "/p").await.unwrap();

    client.create("/p/d", b"d", CreateMode::Persistent).await.unwrap();
    let fresh = tracker.discover(client.as_ref(), "/p").await.unwrap();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].path, "/p/d");
    assert_eq!(fresh[0].data_str(), "d");
}

#[tokio::test]
async fn test_release_allows_rediscovery() {
    let client = tree_with_children(&["a"]).await;
    let tracker = NewChildTracker::new();
    tracker.discover(client.as_ref(), "/p").await.unwrap();

    client.delete("/p/a", None).await.unwrap();
    client.create("/p/a", b"again", CreateMode::Persistent).await.unwrap();
    assert!(tracker.discover(client.as_ref(), "/p").await.unwrap().is_empty());

    assert!(tracker.release("/p/a").await);
    assert!(!tracker.release("/p/a").await);
    let fresh = tracker.discover(client.as_ref(), "/p").await.unwrap();
    assert_eq!(fresh[0].data, b"again");
}

#[tokio::test]
async fn test_vanished_child_is_skipped_and_left_unclaimed() {
    let mut client = MockCoordinationClient::new();
    client
        .expect_get_children()
        .returning(|_, _| Ok(vec!["gone".to_string(), "here".to_string()]));
    client.expect_get_data().returning(|path, _| {
        if path.ends_with("gone") {
            Err(CoordinationError::NoNode(path.to_string()).into())
        } else {
            Ok((b"x".to_vec(), Stat::default()))
        }
    });
    let tracker = NewChildTracker::new();

    let fresh = tracker.discover(&client, "/p").await.unwrap();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].path, "/p/here");
    assert!(!tracker.is_tracked("/p/gone").await);
}

#[tokio::test]
async fn test_discover_propagates_missing_parent() {
    let client = tree_with_children(&[]).await;
    let tracker = NewChildTracker::new();

    let err = tracker.discover(client.as_ref(), "/absent").await.unwrap_err();
    assert!(err.is_no_node());
}

#[tokio::test]
async fn test_concurrent_discoveries_claim_each_child_once() {
    let client = tree_with_children(&["a", "b", "c", "d"]).await;
    let tracker = Arc::new(NewChildTracker::new());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let tracker = tracker.clone();
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            tracker.discover(client.as_ref(), "/p").await.unwrap().len()
        }));
    }
    let mut total = 0;
    for h in handles {
        total += h.await.unwrap();
    }
    assert_eq!(total, 4);
}
