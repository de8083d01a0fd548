//! Standalone broker.
//!
//! Usage: `cargo run --example broker -- [--port 40410] [--client-port 40411]`

use majordome::{Broker, MqConfig, MqOptions};
use std::env;
use std::time::Duration;
use tracing::info;

#[compio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut port = 40410u16;
    let mut client_port = None;
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i + 1 < args.len() {
        match args[i].as_str() {
            "--port" => port = args[i + 1].parse()?,
            "--client-port" => client_port = Some(args[i + 1].parse()?),
            _ => {}
        }
        i += 2;
    }

    let mut config = MqConfig::new("127.0.0.1", port);
    if let Some(p) = client_port {
        config = config.with_client_port(p);
    }

    let _handle = Broker::start(config, MqOptions::default()).await?;
    info!("broker up; press Ctrl-C to stop");

    loop {
        compio::time::sleep(Duration::from_secs(60)).await;
    }
}
