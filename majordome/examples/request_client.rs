//! Send one request to the `echo` service and print the reply.
//!
//! Usage: `cargo run --example request_client -- [--port 40410]`

use majordome::{AsyncClient, Endpoint, MqMessage, MqOptions};
use std::env;
use std::time::Duration;

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
    let mut client = AsyncClient::new(endpoint, MqOptions::default());

    let request = MqMessage::new("echo").insert("greeting", "hello from majordome");
    match client
        .request("echo", &request, Duration::from_secs(2))
        .await?
    {
        Some(reply) => println!(
            "reply: action={} data={}",
            reply.action(),
            serde_json::Value::Object(reply.data().clone())
        ),
        None => println!("no reply within 2s (is a worker running?)"),
    }
    Ok(())
}
