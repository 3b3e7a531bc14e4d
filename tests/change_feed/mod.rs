use fleet_agent::cdc::ChangeEvent;
use fleet_agent::cdc::ChangeKind;
use fleet_agent::coordination::ops::ensure_path;

use crate::commons::start_fleet;
use crate::commons::wait_for_queue;
use crate::commons::LIVENESS_QUEUE;
use crate::commons::TOPOLOGY_QUEUE;

const PING: &str = "/fleet/instances/g9/grp@s9/inst@i9/pingstatus";

fn kinds_of(
    events: &[ChangeEvent],
    path: &str,
) -> Vec<ChangeKind> {
    events.iter().filter(|e| e.path == path).map(|e| e.kind).collect()
}

#[tokio::test]
async fn test_liveness_delete_routes_to_liveness_queue() {
    let fleet = start_fleet("").await;
    let client = fleet.operator();
    ensure_path(client.as_ref(), PING).await.unwrap();
    wait_for_queue(client.as_ref(), LIVENESS_QUEUE, |events| {
        kinds_of(events, PING) == vec![ChangeKind::Create]
    })
    .await;

    client.delete(PING, None).await.unwrap();

    let liveness = wait_for_queue(client.as_ref(), LIVENESS_QUEUE, |events| {
        kinds_of(events, PING).contains(&ChangeKind::Delete)
    })
    .await;
    assert_eq!(kinds_of(&liveness, PING), vec![ChangeKind::Create, ChangeKind::Delete]);
    let topology = wait_for_queue(client.as_ref(), TOPOLOGY_QUEUE, |events| {
        kinds_of(events, "/fleet/instances/g9/grp@s9/inst@i9") == vec![ChangeKind::Create]
    })
    .await;
    assert!(kinds_of(&topology, PING).is_empty());
    fleet.stop().await;
}

#[tokio::test]
async fn test_events_of_one_path_keep_observation_order() {
    let fleet = start_fleet("").await;
    let client = fleet.operator();
    let path = "/fleet/instances/g1";
    ensure_path(client.as_ref(), path).await.unwrap();
    wait_for_queue(client.as_ref(), TOPOLOGY_QUEUE, |events| kinds_of(events, path).len() == 1).await;

    for (n, payload) in ["v1", "v2"].iter().enumerate() {
        client.set_data(path, payload.as_bytes(), None).await.unwrap();
        wait_for_queue(client.as_ref(), TOPOLOGY_QUEUE, |events| {
            kinds_of(events, path).len() == n + 2
        })
        .await;
    }
    client.delete(path, None).await.unwrap();

    let events = wait_for_queue(client.as_ref(), TOPOLOGY_QUEUE, |events| {
        kinds_of(events, path).len() == 4
    })
    .await;
    assert_eq!(
        kinds_of(&events, path),
        vec![
            ChangeKind::Create,
            ChangeKind::Update,
            ChangeKind::Update,
            ChangeKind::Delete
        ]
    );
    let payloads: Vec<_> = events
        .iter()
        .filter(|e| e.path == path && e.kind == ChangeKind::Update)
        .map(|e| e.data.as_str())
        .collect();
    assert_eq!(payloads, vec!["v1", "v2"]);
    fleet.stop().await;
}

#[tokio::test]
async fn test_reconciled_topology_shows_up_in_feed() {
    let fleet = start_fleet("").await;
    let client = fleet.operator();

    fleet.set_discovery("C:mysql:g1:s1:i1:role=master\n");

    let events = wait_for_queue(client.as_ref(), TOPOLOGY_QUEUE, |events| {
        kinds_of(events, "/fleet/instances/g1/grp@s1/inst@i1") == vec![ChangeKind::Create]
    })
    .await;
    let created: Vec<_> = events.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(
        created,
        vec![
            "/fleet/instances/g1",
            "/fleet/instances/g1/grp@s1",
            "/fleet/instances/g1/grp@s1/inst@i1"
        ]
    );
    let instance = events.last().unwrap();
    assert_eq!(instance.data, "role=master");
    assert_eq!(instance.parent_txn_id, events[1].txn_id);

    fleet.set_discovery("Y");
    let events = wait_for_queue(client.as_ref(), TOPOLOGY_QUEUE, |events| {
        kinds_of(events, "/fleet/instances/g1/grp@s1/inst@i1").len() == 2
    })
    .await;
    assert_eq!(events.last().unwrap().kind, ChangeKind::Delete);
    fleet.stop().await;
}
