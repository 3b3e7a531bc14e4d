use std::time::Duration;

use crate::commons::exists;
use crate::commons::start_fleet;
use crate::commons::wait_for_presence;
use crate::commons::MONITOR_INTERVAL_IN_MS;

const I1: &str = "/fleet/instances/g1/grp@s1/inst@i1";
const I2: &str = "/fleet/instances/g1/grp@s1/inst@i2";
const I3: &str = "/fleet/instances/g2/grp@s3/inst@i3";

#[tokio::test]
async fn test_vanished_instance_is_deleted() {
    let fleet = start_fleet("C:mysql:g1:s1:i1:role=master\n").await;
    let client = fleet.operator();
    assert!(wait_for_presence(client.as_ref(), I1, true).await);

    fleet.set_discovery("C:mysql:g1:s1:i2:role=slave\n");

    assert!(wait_for_presence(client.as_ref(), I1, false).await);
    assert!(wait_for_presence(client.as_ref(), I2, true).await);
    fleet.stop().await;
}

#[tokio::test]
async fn test_unchanged_discovery_writes_nothing() {
    let fleet = start_fleet("C:mysql:g1:s1:i1:role=master\nC:mysql:g1:s1:i2:role=slave\n").await;
    let client = fleet.operator();
    assert!(wait_for_presence(client.as_ref(), I2, true).await);
    // let the collector finish appending the creates
    tokio::time::sleep(Duration::from_millis(100)).await;
    let zxid = fleet.tree.last_zxid();

    tokio::time::sleep(Duration::from_millis(MONITOR_INTERVAL_IN_MS * 10)).await;

    assert_eq!(fleet.tree.last_zxid(), zxid);
    fleet.stop().await;
}

#[tokio::test]
async fn test_mirror_converges_to_latest_snapshot() {
    let fleet = start_fleet("C:mysql:g1:s1:i1:a\nC:mysql:g1:s1:i2:b\n").await;
    let client = fleet.operator();
    assert!(wait_for_presence(client.as_ref(), I2, true).await);

    // a missed snapshot in between must not matter
    fleet.set_discovery("C:mysql:g1:s1:i1:a\n");
    fleet.set_discovery("Y:mysql:g1:s1:i2:b2\nC:proxy:g2:s3:i3:c\n");

    assert!(wait_for_presence(client.as_ref(), I1, false).await);
    assert!(wait_for_presence(client.as_ref(), I3, true).await);
    let (data, _) = client.get_data(I2, false).await.unwrap();
    assert_eq!(
        String::from_utf8(data).unwrap(),
        "b2@is_ha=Y@is_keepalived=Y@haVersion=keepalived"
    );
    let (role, _) = client.get_data("/fleet/instances/g2/grp@s3", false).await.unwrap();
    assert_eq!(role, b"R");
    fleet.stop().await;
}

#[tokio::test]
async fn test_no_database_clears_mirror() {
    let fleet = start_fleet("C:mysql:g1:s1:i1:a\n").await;
    let client = fleet.operator();
    assert!(wait_for_presence(client.as_ref(), I1, true).await);

    fleet.set_discovery("JA_RESULT=Y\n");

    assert!(wait_for_presence(client.as_ref(), I1, false).await);
    assert!(exists(client.as_ref(), "/fleet/instances/g1/grp@s1").await);
    fleet.stop().await;
}

#[tokio::test]
async fn test_mirror_survives_session_expiry() {
    let fleet = start_fleet("C:mysql:g1:s1:i1:a\n").await;
    let client = fleet.operator();
    assert!(wait_for_presence(client.as_ref(), I1, true).await);
    let (_, stat) = client.get_data(I1, false).await.unwrap();

    fleet.tree.expire_session(stat.ephemeral_owner);

    assert!(wait_for_presence(client.as_ref(), I1, false).await);
    assert!(wait_for_presence(client.as_ref(), I1, true).await);
    let (_, renewed) = client.get_data(I1, false).await.unwrap();
    assert_ne!(renewed.ephemeral_owner, stat.ephemeral_owner);
    fleet.stop().await;
}
