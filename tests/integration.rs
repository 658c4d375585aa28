use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mesh_ipc::{
    //
    create_transport,
    IpcConfig,
    IpcError,
    IpcNode,
    IpcNodeBuilder,
    Result,
    TransportPtr,
};

#[derive(Debug, Serialize, Deserialize)]
struct AddRequest {
    a: i64,
    b: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct AddResponse {
    sum: i64,
}

/// A node with the test service methods registered.
struct Service {
    // ---
    node: IpcNode,
    transport: TransportPtr,
}

impl Service {
    async fn start(id: &str) -> Result<Self> {
        // ---
        init_logging();

        let config = IpcConfig::memory(id);
        let transport = create_transport(&config).await?;

        let node = IpcNodeBuilder::new(transport.clone())
            .node_id("svc")
            .build()
            .await?;

        node.register("echo", |(msg,): (String,)| async move { Ok(msg) });

        node.register("add", |req: AddRequest| async move {
            // ---
            Ok(AddResponse { sum: req.a + req.b })
        });

        node.register("double_slow", |(n,): (i64,)| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(n * 2)
        });

        node.register("sleepy", |(n,): (i64,)| async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(n)
        });

        node.register("nap", |(n,): (i64,)| async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok(n)
        });

        node.register("fail", |(): ()| async move {
            Err::<i64, _>(IpcError::RemoteFault("division by zero".into()))
        });

        Ok(Self { node, transport })
    }

    async fn client(&self, id: &str) -> Result<IpcNode> {
        // ---
        IpcNodeBuilder::new(self.transport.clone())
            .node_id(id)
            .build()
            .await
    }

    async fn shutdown(self) -> Result<()> {
        // ---
        self.node.shutdown().await
    }
}

/// Poll `cond` every 10ms until it holds or `deadline` elapses.
async fn wait_until(mut cond: impl FnMut() -> bool, deadline: Duration) -> bool {
    // ---
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[tokio::test]
async fn echo_round_trip() -> Result<()> {
    // ---
    let service = Service::start("echo_round_trip").await?;
    let client = service.client("alice").await?;

    let echoed: String = client
        .call_with_timeout("svc", "echo", ("hi",), Duration::from_secs(1))
        .await?;

    assert_eq!(echoed, "hi");
    assert_eq!(client.pending_calls(), 0);

    service.shutdown().await
}

#[tokio::test]
async fn struct_args_round_trip() -> Result<()> {
    // ---
    let service = Service::start("struct_args").await?;
    let client = service.client("bob").await?;

    let resp: AddResponse = client.call("svc", "add", AddRequest { a: 20, b: 3 }).await?;
    assert_eq!(resp.sum, 23);

    service.shutdown().await
}

#[tokio::test]
async fn missing_method_fails_and_leaves_no_pending_entry() -> Result<()> {
    // ---
    let service = Service::start("missing_method").await?;
    let client = service.client("carol").await?;

    let result: Result<Value> = client.call("svc", "missing", ()).await;
    match result {
        Err(IpcError::MethodNotFound(method)) => assert_eq!(method, "missing"),
        other => panic!("expected MethodNotFound, got {other:?}"),
    }

    assert_eq!(client.pending_calls(), 0);

    service.shutdown().await
}

#[tokio::test]
async fn slow_handler_times_out() -> Result<()> {
    // ---
    let service = Service::start("slow_times_out").await?;
    let client = service.client("dave").await?;

    let result: Result<i64> = client
        .call_with_timeout("svc", "sleepy", (7,), Duration::from_millis(10))
        .await;

    assert!(matches!(result, Err(IpcError::Timeout)));
    assert_eq!(client.pending_calls(), 0);

    service.shutdown().await
}

#[tokio::test]
async fn late_reply_is_discarded_and_node_stays_usable() -> Result<()> {
    // ---
    let service = Service::start("late_reply").await?;
    let client = service.client("erin").await?;

    let result: Result<i64> = client
        .call_with_timeout("svc", "nap", (1,), Duration::from_millis(20))
        .await;
    assert!(matches!(result, Err(IpcError::Timeout)));
    assert_eq!(client.pending_calls(), 0);

    // Let the 150ms handler finish and its reply arrive with no pending
    // entry to land in.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.pending_calls(), 0);

    // The node is unaffected by the discarded reply.
    let echoed: String = client.call("svc", "echo", ("still here",)).await?;
    assert_eq!(echoed, "still here");

    service.shutdown().await
}

#[tokio::test]
async fn concurrent_calls_resolve_independently() -> Result<()> {
    // ---
    let service = Service::start("concurrent_pair").await?;
    let client = service.client("frank").await?;

    let slow_client = client.clone();
    let slow = tokio::spawn(async move {
        slow_client
            .call::<_, i64>("svc", "double_slow", (21,))
            .await
    });

    // The fast call completes while the slow one is still pending.
    let echoed: String = client.call("svc", "echo", ("quick",)).await?;
    assert_eq!(echoed, "quick");

    // Resolving the fast call must not disturb the slow one.
    let doubled = slow.await.expect("slow call task panicked")?;
    assert_eq!(doubled, 42);
    assert_eq!(client.pending_calls(), 0);

    service.shutdown().await
}

#[tokio::test]
async fn many_concurrent_calls() {
    // ---
    let service = Service::start("concurrent_many").await.unwrap();
    let client = service.client("grace").await.unwrap();

    let mut handles = Vec::new();

    for i in 0..10i64 {
        // ---
        let c = client.clone();

        handles.push(tokio::spawn(async move {
            let resp: AddResponse = c
                .call("svc", "add", AddRequest { a: i, b: i })
                .await
                .unwrap();
            resp.sum
        }));
    }

    for (i, task) in handles.into_iter().enumerate() {
        let sum = task.await.unwrap();
        assert_eq!(sum, (i as i64) * 2);
    }

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn cancel_releases_waiter_with_cancelled() -> Result<()> {
    // ---
    let service = Service::start("cancel").await?;
    let client = service.client("heidi").await?;

    let call = client.start_call("svc", "sleepy", (5,)).await?;
    let correlation_id = call.correlation_id().clone();
    assert_eq!(client.pending_calls(), 1);

    assert!(client.cancel(&correlation_id));
    assert_eq!(client.pending_calls(), 0);

    let result = call.wait(Duration::from_secs(1)).await;
    assert!(matches!(result, Err(IpcError::Cancelled)));

    // Cancelling an already-resolved call finds nothing.
    assert!(!client.cancel(&correlation_id));

    service.shutdown().await
}

#[tokio::test]
async fn remote_fault_forwards_description() -> Result<()> {
    // ---
    let service = Service::start("remote_fault").await?;
    let client = service.client("ivan").await?;

    let result: Result<i64> = client.call("svc", "fail", ()).await;
    match result {
        Err(IpcError::RemoteFault(description)) => {
            assert!(description.contains("division by zero"), "{description}");
        }
        other => panic!("expected RemoteFault, got {other:?}"),
    }

    service.shutdown().await
}

#[tokio::test]
async fn broadcast_invokes_subscriber_once() -> Result<()> {
    // ---
    let service = Service::start("broadcast_once").await?;
    let publisher = service.client("pub").await?;
    let subscriber = service.client("sub").await?;

    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    subscriber
        .subscribe("topic", move |value: Value| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(value);
            }
        })
        .await?;

    publisher
        .broadcast("topic", serde_json::json!({"x": 1}))
        .await?;

    assert!(
        wait_until(|| seen.lock().unwrap().len() == 1, Duration::from_secs(1)).await,
        "broadcast never delivered"
    );
    assert_eq!(seen.lock().unwrap()[0], serde_json::json!({"x": 1}));

    // Exactly once: nothing else trickles in.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(seen.lock().unwrap().len(), 1);

    service.shutdown().await
}

#[tokio::test]
async fn broadcast_fans_out_to_every_handler() -> Result<()> {
    // ---
    let service = Service::start("broadcast_fanout").await?;
    let publisher = service.client("pub2").await?;
    let subscriber = service.client("sub2").await?;

    let first: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let second: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));

    for sink in [&first, &second] {
        let sink = sink.clone();
        subscriber
            .subscribe("metrics", move |value: i64| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(value);
                }
            })
            .await?;
    }

    publisher.broadcast("metrics", 99i64).await?;

    assert!(
        wait_until(
            || first.lock().unwrap().len() == 1 && second.lock().unwrap().len() == 1,
            Duration::from_secs(1)
        )
        .await,
        "fan-out incomplete"
    );

    service.shutdown().await
}

#[tokio::test]
async fn unsubscribe_stops_delivery() -> Result<()> {
    // ---
    let service = Service::start("unsubscribe").await?;
    let publisher = service.client("pub3").await?;
    let subscriber = service.client("sub3").await?;

    let seen: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    subscriber
        .subscribe("feed", move |value: i64| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(value);
            }
        })
        .await?;

    publisher.broadcast("feed", 1i64).await?;
    assert!(wait_until(|| seen.lock().unwrap().len() == 1, Duration::from_secs(1)).await);

    assert!(subscriber.unsubscribe("feed"));
    assert!(!subscriber.unsubscribe("feed"));

    publisher.broadcast("feed", 2i64).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(seen.lock().unwrap().as_slice(), &[1]);

    service.shutdown().await
}

#[tokio::test]
async fn metrics_track_calls_and_errors() -> Result<()> {
    // ---
    let service = Service::start("metrics").await?;
    let client = service.client("judy").await?;

    let _: String = client.call("svc", "echo", ("one",)).await?;
    let _: String = client.call("svc", "echo", ("two",)).await?;
    let missing: Result<Value> = client.call("svc", "nowhere", ()).await;
    assert!(missing.is_err());

    let snapshot = client.metrics();
    assert_eq!(snapshot.total_calls, 3);
    assert_eq!(snapshot.total_errors, 1);
    assert_eq!(snapshot.methods["echo"].calls, 2);
    assert_eq!(snapshot.methods["nowhere"].errors, 1);

    client.reset_metrics();
    assert_eq!(client.metrics().total_calls, 0);

    service.shutdown().await
}

#[tokio::test]
async fn invalid_node_id_is_rejected() -> Result<()> {
    // ---
    let config = IpcConfig::memory("invalid_node_id");
    let transport = create_transport(&config).await?;

    let result = IpcNodeBuilder::new(transport)
        .node_id("not a subject")
        .build()
        .await;

    assert!(matches!(result, Err(IpcError::InvalidNodeId(_))));
    Ok(())
}

#[tokio::test]
async fn shutdown_cancels_outstanding_calls() -> Result<()> {
    // ---
    let service = Service::start("shutdown_cancels").await?;
    let client = service.client("kate").await?;

    let call = client.start_call("svc", "sleepy", (9,)).await?;
    client.shutdown().await?;

    let result = call.wait(Duration::from_secs(1)).await;
    assert!(matches!(result, Err(IpcError::Cancelled)));
    Ok(())
}

#[cfg(feature = "logging")]
mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        });
    }
}

#[cfg(not(feature = "logging"))]
mod imp {
    #[inline]
    pub fn init() {}
}

pub fn init_logging() {
    imp::init();
}
