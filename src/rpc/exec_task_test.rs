use std::sync::Arc;
use std::time::Duration;

use futures::stream;
use futures::StreamExt;

use super::*;
use crate::coordination::ops::ensure_path;
use crate::coordination::CoordinationClient;
use crate::coordination::MemoryConnector;
use crate::coordination::MemoryTree;
use crate::exec::MockScriptRunner;
use crate::exec::ShellRunner;
use crate::watcher::AbortHandle;
use crate::watcher::AbortSignal;
use crate::watcher::WatcherHub;
use crate::Error;
use crate::ExecError;

const OUTPUT: &str = "/fleet/remotecontrol/10.0.0.1/output";

async fn hub() -> (Arc<WatcherHub>, tokio::sync::mpsc::UnboundedReceiver<AbortSignal>) {
    let tree = MemoryTree::new(Duration::from_secs(1));
    let (abort, rx) = AbortHandle::channel();
    let hub = WatcherHub::connect(
        "exec-test",
        Arc::new(MemoryConnector::new(tree)),
        abort,
        Duration::from_secs(1),
    )
    .await
    .unwrap();
    ensure_path(hub.client().as_ref(), OUTPUT).await.unwrap();
    (hub, rx)
}

fn request(
    id: u64,
    command: &str,
    timeout_ms: u64,
) -> CommandRequest {
    CommandRequest {
        id,
        command: command.to_string(),
        timeout: Duration::from_millis(timeout_ms),
    }
}

async fn results(hub: &WatcherHub) -> Vec<(String, String)> {
    let client = hub.client();
    let mut names = client.get_children(OUTPUT, false).await.unwrap();
    names.sort();
    let mut out = Vec::new();
    for name in names {
        let (data, _) = client.get_data(&format!("{OUTPUT}/{name}"), false).await.unwrap();
        out.push((name, String::from_utf8(data).unwrap()));
    }
    out
}

#[tokio::test]
async fn test_lines_then_eof_are_written_as_ephemerals() {
    let (hub, _rx) = hub().await;
    let mut runner = MockScriptRunner::new();
    runner.expect_stream_lines().returning(|_| {
        Ok(stream::iter(vec![Ok("a".to_string()), Ok("b".to_string())]).boxed())
    });
    let task = ExecCmdTask::new(hub.clone(), OUTPUT, request(7, "two-lines", 1000), Arc::new(runner));

    assert_eq!(task.run().await.unwrap(), ExecOutcome::Completed { lines: 2 });
    assert_eq!(
        results(&hub).await,
        vec![
            ("cmd@7_0".to_string(), "a".to_string()),
            ("cmd@7_1".to_string(), "b".to_string()),
            ("cmd@7_2".to_string(), "EOF".to_string()),
        ]
    );
    let (_, stat) = hub
        .client()
        .get_data(&format!("{OUTPUT}/cmd@7_0"), false)
        .await
        .unwrap();
    assert_eq!(stat.ephemeral_owner, hub.session_id());
}

#[tokio::test]
async fn test_empty_output_still_terminates() {
    let (hub, _rx) = hub().await;
    let task = ExecCmdTask::new(hub.clone(), OUTPUT, request(1, "true", 0), Arc::new(ShellRunner::new()));

    assert_eq!(task.run().await.unwrap(), ExecOutcome::Completed { lines: 0 });
    assert_eq!(
        results(&hub).await,
        vec![("cmd@1_0".to_string(), "EOF".to_string())]
    );
}

#[tokio::test]
async fn test_watchdog_keeps_partial_output_without_eof() {
    let (hub, _rx) = hub().await;
    let task = ExecCmdTask::new(
        hub.clone(),
        OUTPUT,
        request(3, "echo started; sleep 5; echo late", 300),
        Arc::new(ShellRunner::new()),
    );

    assert_eq!(task.run().await.unwrap(), ExecOutcome::TimedOut { lines: 1 });
    assert_eq!(
        results(&hub).await,
        vec![("cmd@3_0".to_string(), "started".to_string())]
    );
}

#[tokio::test]
async fn test_spawn_failure_is_escalated() {
    let (hub, mut rx) = hub().await;
    let mut runner = MockScriptRunner::new();
    runner.expect_stream_lines().returning(|cmd| {
        Err(ExecError::Spawn {
            command: cmd.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no shell"),
        }
        .into())
    });
    let task = ExecCmdTask::new(hub.clone(), OUTPUT, request(4, "x", 0), Arc::new(runner));

    task.spawn(tokio_util::sync::CancellationToken::new()).await.unwrap();

    let signal = rx.try_recv().unwrap();
    assert!(matches!(signal.cause, Error::Exec(ExecError::Spawn { .. })));
    assert!(results(&hub).await.is_empty());
}

#[tokio::test]
async fn test_cancelled_task_writes_nothing_more() {
    let (hub, mut rx) = hub().await;
    let mut runner = MockScriptRunner::new();
    runner
        .expect_stream_lines()
        .returning(|_| Ok(stream::pending().boxed()));
    let task = ExecCmdTask::new(hub.clone(), OUTPUT, request(5, "hang", 0), Arc::new(runner));
    let cancel = tokio_util::sync::CancellationToken::new();

    let handle = task.spawn(cancel.clone());
    cancel.cancel();
    handle.await.unwrap();

    assert!(rx.try_recv().is_err());
    assert!(results(&hub).await.is_empty());
}
