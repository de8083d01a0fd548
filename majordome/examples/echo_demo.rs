//! All-in-one demo: broker, two echo workers and a client in one process.
//!
//! Watch:
//! 1. The broker binds and the workers send READY + heartbeats
//! 2. The client round-trips a few requests
//! 3. Worker 2 dies after ~3 seconds; the broker purges it
//! 4. Remaining traffic flows through worker 1
//!
//! Run with `RUST_LOG=debug` to see the protocol chatter.

use majordome::{
    AsyncClient, Broker, Endpoint, MqConfig, MqMessage, MqOptions, Worker,
};
use std::time::Duration;
use tracing::{error, info};

const PORT: u16 = 40420;

fn demo_options() -> MqOptions {
    MqOptions::default()
        .with_hb_interval(Duration::from_millis(250))
        .with_reconnect_ivl(Duration::from_millis(500))
        .with_reconnect_ivl_max(Duration::from_millis(500))
}

async fn run_worker(worker_id: u32, lifetime: Option<Duration>) {
    let endpoint = match Endpoint::parse(&format!("tcp://127.0.0.1:{PORT}")) {
        Ok(ep) => ep,
        Err(e) => {
            error!("[demo] bad endpoint: {e}");
            return;
        }
    };
    let worker = Worker::new(endpoint, "echo", demo_options());

    let mut served = 0u32;
    let mut handler = move |request: MqMessage| {
        served += 1;
        info!("[demo] worker-{worker_id} served request #{served}");
        request.insert("served_by", format!("worker-{worker_id}"))
    };

    match lifetime {
        None => {
            if let Err(e) = worker.run(&mut handler).await {
                error!("[demo] worker-{worker_id} failed: {e}");
            }
        }
        Some(ttl) => {
            // Die mid-flight: stop serving and heartbeating without a
            // goodbye, so the broker's liveness sweep has to purge us.
            let run = worker.run(&mut handler);
            let death = compio::time::sleep(ttl);
            futures::pin_mut!(run, death);
            let _ = futures::future::select(run, death).await;
            info!("[demo] worker-{worker_id} died");
        }
    }
}

#[compio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("[demo] starting broker on port {PORT}");
    let broker = Broker::start(MqConfig::new("127.0.0.1", PORT), demo_options()).await?;

    compio::runtime::spawn(run_worker(1, None)).detach();
    compio::runtime::spawn(run_worker(2, Some(Duration::from_secs(3)))).detach();

    // Give the workers a moment to register.
    compio::time::sleep(Duration::from_millis(500)).await;

    let endpoint = Endpoint::parse(&format!("tcp://127.0.0.1:{PORT}"))?;
    let mut client = AsyncClient::new(endpoint, demo_options());

    info!(
        "[demo] services: {}",
        client
            .known_services(Duration::from_secs(1))
            .await?
            .unwrap_or_default()
    );

    for i in 1..=6u32 {
        let request = MqMessage::new("echo").insert("seq", i);
        match client.request("echo", &request, Duration::from_secs(2)).await? {
            Some(reply) => info!(
                "[demo] reply #{i} served by {}",
                reply
                    .get("served_by")
                    .and_then(|v| v.as_str())
                    .unwrap_or("?")
            ),
            None => info!("[demo] request #{i} timed out"),
        }
        compio::time::sleep(Duration::from_millis(700)).await;
    }

    info!("[demo] shutting down");
    broker.shutdown().await;
    Ok(())
}
