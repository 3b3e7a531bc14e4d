use std::time::Duration;

use fleet_agent::rpc::ResultStatus;
use fleet_agent::Error;
use fleet_agent::ProtocolError;

use crate::commons::start_fleet;
use crate::commons::HOST;

#[tokio::test]
async fn test_echo_round_trip() {
    let fleet = start_fleet("").await;
    let remote = fleet.remote();

    let result = remote.submit(HOST, "echo hi", Duration::from_millis(5000)).await.unwrap();

    assert_eq!(result.poll().await.unwrap(), ResultStatus::Ready);
    assert_eq!(result.collect().await.unwrap(), vec!["hi".to_string()]);
    fleet.stop().await;
}

#[tokio::test]
async fn test_long_output_keeps_line_order() {
    let fleet = start_fleet("").await;
    let remote = fleet.remote();

    let result = remote.submit(HOST, "seq 1 200", Duration::from_millis(5000)).await.unwrap();

    let expected: Vec<String> = (1..=200).map(|n| n.to_string()).collect();
    assert_eq!(result.collect().await.unwrap(), expected);
    fleet.stop().await;
}

#[tokio::test]
async fn test_concurrent_commands_do_not_mix() {
    let fleet = start_fleet("").await;
    let remote = fleet.remote();

    let first = remote.submit(HOST, "echo a; echo b", Duration::from_millis(5000)).await.unwrap();
    let second = remote.submit(HOST, "echo c", Duration::from_millis(5000)).await.unwrap();
    assert_ne!(first.command_id(), second.command_id());

    assert_eq!(second.collect().await.unwrap(), vec!["c".to_string()]);
    assert_eq!(first.collect().await.unwrap(), vec!["a".to_string(), "b".to_string()]);
    fleet.stop().await;
}

#[tokio::test]
async fn test_killed_command_ends_in_timeout() {
    let fleet = start_fleet("").await;
    let remote = fleet.remote();

    let mut result = remote
        .submit(HOST, "echo started; sleep 10", Duration::from_millis(300))
        .await
        .unwrap();

    assert_eq!(result.poll().await.unwrap(), ResultStatus::Ready);
    assert_eq!(result.next_line().await.unwrap(), Some("started".to_string()));
    let err = result.next_line().await.unwrap_err();
    assert!(matches!(err, Error::Protocol(ProtocolError::ResultTimeout { .. })));
    fleet.stop().await;
}

#[tokio::test]
async fn test_silent_failure_is_not_ready() {
    let fleet = start_fleet("").await;
    let remote = fleet.remote();

    let result = remote.submit(HOST, "sleep 10", Duration::from_millis(200)).await.unwrap();

    assert_eq!(result.poll().await.unwrap(), ResultStatus::NotReady);
    fleet.stop().await;
}

#[tokio::test]
async fn test_unknown_host_is_rejected() {
    let fleet = start_fleet("").await;
    let remote = fleet.remote();

    let err = remote
        .submit("10.9.9.9", "echo hi", Duration::from_millis(100))
        .await
        .err()
        .unwrap();
    assert!(err.is_no_node());
    let err = remote.submit("not-an-ip", "echo hi", Duration::ZERO).await.err().unwrap();
    assert!(matches!(err, Error::Protocol(ProtocolError::InvalidHost(_))));
    fleet.stop().await;
}
