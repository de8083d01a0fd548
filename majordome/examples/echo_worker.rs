//! Echo worker: registers for the `echo` service and replies with the
//! payload it received.
//!
//! Usage: `cargo run --example echo_worker -- [--port 40410]`

use majordome::{Endpoint, MqMessage, MqOptions, Worker};
use std::env;

#[compio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let port = if args.len() > 2 && args[1] == "--port" {
        args[2].parse::<u16>()?
    } else {
        40410
    };

    let endpoint = Endpoint::parse(&format!("tcp://127.0.0.1:{port}"))?;
    let worker = Worker::new(endpoint, "echo", MqOptions::default());
    worker.run(&mut |request: MqMessage| request).await?;
    Ok(())
}
