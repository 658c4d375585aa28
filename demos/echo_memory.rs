use mesh_ipc::{create_transport, IpcConfig, IpcNodeBuilder, Result};
use serde_json::Value;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    let config = IpcConfig::memory("demo");
    let transport = create_transport(&config).await?;

    let server = IpcNodeBuilder::new(transport.clone())
        .node_id("server")
        .build()
        .await?;

    server.register("echo", |(msg,): (String,)| async move { Ok(msg) });
    server.register("add", |(a, b): (i64, i64)| async move { Ok(a + b) });

    let client = IpcNodeBuilder::new(transport.clone())
        .node_id("client")
        .build()
        .await?;

    let echoed: String = client.call("server", "echo", ("hi",)).await?;
    println!("echo -> {echoed}");

    let sum: i64 = client.call("server", "add", (20, 3)).await?;
    println!("20 + 3 = {sum}");

    client
        .subscribe("ticks", |value: Value| async move {
            println!("tick: {value}");
        })
        .await?;

    server.broadcast("ticks", serde_json::json!({"seq": 1})).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("calls made: {}", client.metrics().total_calls);

    client.shutdown().await?;
    Ok(())
}
