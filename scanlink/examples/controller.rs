//! Controller example
//!
//! Accepts one device, waits for it to log in, then stops and restarts its
//! firmware while a heartbeat keeps its status fresh.

use std::sync::Arc;
use std::time::Duration;

use scanlink::{DeviceCommand, ResourceHints, Server, ServerConfig};
use tokio::time::sleep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    
    let device_name = std::env::var("DEVICE_NAME").unwrap_or_else(|_| "scanner-1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000);
    
    let config = ServerConfig::default()
        .with_request_timeout(Duration::from_secs(3))
        .with_heartbeat_interval(Duration::from_secs(5));
    let server = Arc::new(Server::new(config));
    server.accept_device(
        device_name.clone(),
        ResourceHints::default().with_description("example device"),
    );
    
    let addr = server.start("0.0.0.0", port, false).await?;
    println!("Listening on {}, waiting for {}...", addr, device_name);
    
    while server.session_for(&device_name).is_none() {
        sleep(Duration::from_millis(200)).await;
    }
    println!("{} logged in", device_name);
    
    let status = server.dispatch(&device_name, DeviceCommand::RequestStatus).await?;
    println!("Status: {:?}", status);
    
    println!("Stopping firmware...");
    let stopped = server.dispatch(&device_name, DeviceCommand::StopFirmware).await?;
    println!("{:?}", stopped);
    
    sleep(Duration::from_secs(1)).await;
    
    println!("Starting firmware...");
    let started = server
        .dispatch(
            &device_name,
            DeviceCommand::StartFirmware { file_name: "scan_profile.bin".into() },
        )
        .await?;
    println!("{:?}", started);
    
    sleep(Duration::from_secs(6)).await;
    if let Some(status) = server.device_status(&device_name) {
        println!("Last heartbeat: {}", status);
    }
    
    server.stop().await;
    Ok(())
}
