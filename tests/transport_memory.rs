// tests/transport_memory.rs

use bytes::Bytes;
use tokio::time::{timeout, Duration};

use mesh_ipc::{
    // ---
    create_memory_transport,
    Address,
    Envelope,
    Subscription,
};

#[tokio::test]
async fn subscribe_then_publish_delivers() {
    // ---
    // Arrange
    // ---
    let transport = create_memory_transport()
        .await
        .expect("failed to create memory transport");

    let address = Address::from("test.address");

    let mut sub = transport
        .subscribe(address.clone().into())
        .await
        .expect("subscribe failed");

    let payload = Bytes::from_static(b"hello");
    let env = Envelope::json(address.clone(), payload.clone());

    // ---
    // Act
    // ---
    transport.publish(env).await.expect("publish failed");

    // ---
    // Assert
    // ---
    let received = timeout(Duration::from_millis(100), sub.inbox.recv())
        .await
        .expect("timed out waiting for message")
        .expect("subscription channel closed unexpectedly");

    assert_eq!(received.payload, payload);
    assert_eq!(received.address, address);
}

#[tokio::test]
async fn matching_is_exact() {
    // ---
    let transport = create_memory_transport().await.expect("create failed");

    let mut sub = transport
        .subscribe(Subscription::from("rpc.a"))
        .await
        .expect("subscribe failed");

    // A longer subject sharing the prefix must not match.
    let env = Envelope::json(Address::from("rpc.a.request"), Bytes::from_static(b"x"));
    transport.publish(env).await.expect("publish failed");

    let received = timeout(Duration::from_millis(50), sub.inbox.recv()).await;
    assert!(received.is_err(), "prefix subject unexpectedly matched");
}

#[tokio::test]
async fn publish_fans_out_to_all_subscribers() {
    // ---
    let transport = create_memory_transport().await.expect("create failed");
    let address = Address::from("fanout.subject");

    let mut sub_a = transport
        .subscribe(address.clone().into())
        .await
        .expect("subscribe a failed");
    let mut sub_b = transport
        .subscribe(address.clone().into())
        .await
        .expect("subscribe b failed");

    let env = Envelope::json(address, Bytes::from_static(b"payload"));
    transport.publish(env).await.expect("publish failed");

    for sub in [&mut sub_a, &mut sub_b] {
        let received = timeout(Duration::from_millis(100), sub.inbox.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(received.payload, Bytes::from_static(b"payload"));
    }
}

#[tokio::test]
async fn close_ends_every_subscription() {
    // ---
    let transport = create_memory_transport().await.expect("create failed");

    let mut sub = transport
        .subscribe(Subscription::from("anything"))
        .await
        .expect("subscribe failed");

    transport.close().await.expect("close failed");

    let received = timeout(Duration::from_millis(100), sub.inbox.recv())
        .await
        .expect("timed out waiting for end-of-stream");
    assert!(received.is_none(), "expected closed inbox");
}

#[tokio::test]
async fn publish_without_subscribers_is_a_no_op() {
    // ---
    let transport = create_memory_transport().await.expect("create failed");

    let env = Envelope::json(Address::from("nobody.home"), Bytes::from_static(b"void"));
    transport.publish(env).await.expect("publish failed");
}
