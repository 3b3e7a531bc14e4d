use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::*;
use crate::coordination::ops::ensure_path;
use crate::coordination::ops::join_path;
use crate::coordination::CoordinationClient;
use crate::coordination::CreateMode;
use crate::coordination::MemorySession;
use crate::coordination::MemoryTree;
use crate::ClientConfig;
use crate::Error;
use crate::ProtocolError;

const ROOT: &str = "/fleet";
const HOST: &str = "10.0.0.1";

async fn setup() -> (Arc<MemorySession>, RemoteCommand) {
    let tree = MemoryTree::new(Duration::from_secs(1));
    let (tx, _rx) = mpsc::unbounded_channel();
    let session = tree.open_session(tx);
    ensure_path(session.as_ref(), &input_path(ROOT, HOST)).await.unwrap();
    ensure_path(session.as_ref(), &output_path(ROOT, HOST)).await.unwrap();
    let config = ClientConfig {
        poll_interval_ms: 10,
        read_retry_delay_ms: 1,
    };
    let rc = RemoteCommand::new(session.clone(), ROOT, &config);
    (session, rc)
}

async fn write_result(
    session: &MemorySession,
    command_id: u64,
    seq: u64,
    line: &str,
) {
    let path = join_path(&output_path(ROOT, HOST), &result_node_name(command_id, seq));
    session.create(&path, line.as_bytes(), CreateMode::Ephemeral).await.unwrap();
}

#[tokio::test]
async fn test_submit_creates_sequential_request() {
    let (session, rc) = setup().await;

    let first = rc.submit(HOST, "echo hi", Duration::from_millis(5000)).await.unwrap();
    let second = rc.submit(HOST, "uptime", Duration::ZERO).await.unwrap();
    assert_eq!(first.command_id(), 0);
    assert_eq!(second.command_id(), 1);

    let (data, _) = session
        .get_data(&format!("{}/cmd@0000000000", input_path(ROOT, HOST)), false)
        .await
        .unwrap();
    assert_eq!(data, b"echo hi&5000");
}

#[tokio::test]
async fn test_submit_validates_input() {
    let (_session, rc) = setup().await;

    for host in ["10.0.0", "10.0.0.256", "host-a", ""] {
        let err = rc.submit(host, "ls", Duration::ZERO).await.err().unwrap();
        assert!(matches!(err, Error::Protocol(ProtocolError::InvalidHost(_))), "{host}");
    }
    let err = rc.submit(HOST, "   ", Duration::ZERO).await.err().unwrap();
    assert!(matches!(err, Error::Protocol(ProtocolError::EmptyCommand)));
}

#[tokio::test]
async fn test_submit_to_unregistered_host() {
    let (_session, rc) = setup().await;
    let err = rc.submit("10.9.9.9", "ls", Duration::ZERO).await.err().unwrap();
    assert!(err.is_no_node());
}

#[tokio::test]
async fn test_next_line_reorders_and_consumes_results() {
    let (session, rc) = setup().await;
    let mut result = rc.submit(HOST, "cat f", Duration::from_secs(5)).await.unwrap();
    let id = result.command_id();

    // written out of order on purpose
    write_result(&session, id, 2, "three").await;
    write_result(&session, id, 0, "one").await;
    write_result(&session, id, 3, "EOF").await;
    write_result(&session, id, 1, "two").await;
    // another command's output must be left alone
    write_result(&session, id + 1, 0, "foreign").await;

    assert_eq!(result.poll().await.unwrap(), ResultStatus::Ready);
    assert_eq!(result.next_line().await.unwrap().as_deref(), Some("one"));
    assert_eq!(result.next_line().await.unwrap().as_deref(), Some("two"));
    assert_eq!(result.next_line().await.unwrap().as_deref(), Some("three"));
    assert_eq!(result.next_line().await.unwrap(), None);
    assert_eq!(result.next_line().await.unwrap(), None);

    let left = session.get_children(&output_path(ROOT, HOST), false).await.unwrap();
    assert_eq!(left, vec![result_node_name(id + 1, 0)]);
}

#[tokio::test]
async fn test_next_line_waits_for_gaps() {
    let (session, rc) = setup().await;
    let result = rc.submit(HOST, "slow", Duration::from_secs(5)).await.unwrap();
    let id = result.command_id();
    write_result(&session, id, 1, "second").await;

    let writer = session.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        write_result(&writer, id, 0, "first").await;
        write_result(&writer, id, 2, "EOF").await;
    });

    assert_eq!(result.collect().await.unwrap(), vec!["first", "second"]);
}

#[tokio::test(start_paused = true)]
async fn test_poll_reports_not_ready_after_timeout() {
    let (_session, rc) = setup().await;
    let result = rc.submit(HOST, "never", Duration::from_millis(200)).await.unwrap();

    assert_eq!(result.poll().await.unwrap(), ResultStatus::NotReady);
}

#[tokio::test(start_paused = true)]
async fn test_next_line_times_out_without_progress() {
    let (session, rc) = setup().await;
    let mut result = rc.submit(HOST, "partial", Duration::from_millis(500)).await.unwrap();
    write_result(&session, result.command_id(), 0, "only").await;

    assert_eq!(result.next_line().await.unwrap().as_deref(), Some("only"));
    let err = result.next_line().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::ResultTimeout { command_id: 0, .. })
    ));
}
