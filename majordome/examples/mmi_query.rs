//! Query the broker's introspection services.
//!
//! Usage: `cargo run --example mmi_query -- [--port 40410] [service]`

use majordome::{AsyncClient, Endpoint, MqOptions};
use std::env;
use std::time::Duration;

#[compio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut port = 40410u16;
    let mut service = None;
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            port = args[i + 1].parse()?;
            i += 2;
        } else {
            service = Some(args[i].clone());
            i += 1;
        }
    }

    let endpoint = Endpoint::parse(&format!("tcp://127.0.0.1:{port}"))?;
    let mut client = AsyncClient::new(endpoint, MqOptions::default());
    let timeout = Duration::from_secs(1);

    match client.known_services(timeout).await? {
        Some(listing) if listing.is_empty() => println!("registered workers: none"),
        Some(listing) => println!("registered workers: {listing}"),
        None => {
            println!("broker did not answer within {timeout:?}");
            return Ok(());
        }
    }

    if let Some(service) = service {
        match client.service_status(&service, timeout).await? {
            Some(code) => println!("service {service}: {code}"),
            None => println!("broker did not answer within {timeout:?}"),
        }
    }
    Ok(())
}
