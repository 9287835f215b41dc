//! Device emulator
//!
//! Logs in to a controller and answers its requests until the connection
//! closes.

use scanlink::{
    DeviceClient, DeviceStatusBody, LoginRequest, MessageBody, StartFirmware, StopFirmware,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();
    
    let host = std::env::var("CONTROLLER_IP").unwrap_or_else(|_| "127.0.0.1".to_string());
    let name = std::env::var("DEVICE_NAME").unwrap_or_else(|_| "scanner-1".to_string());
    
    let login = LoginRequest::new(name.as_str(), "emulator", env!("CARGO_PKG_VERSION"))?;
    let mut device = DeviceClient::new(host, 5000, login)
        .with_timeout(std::time::Duration::from_secs(30));
    device.connect().await?;
    
    let mut running = true;
    let mut firmware = String::from("default.bin");
    
    loop {
        let request = match device.next_message().await {
            Ok(request) => request,
            Err(e) => {
                println!("Connection ended: {}", e);
                break;
            }
        };
        
        let body = match request.body {
            MessageBody::DeviceStatusRequest(_) => {
                let state = if running { "running" } else { "stopped" };
                MessageBody::DeviceStatusReply(DeviceStatusBody::new(
                    "scanner",
                    name.as_str(),
                    env!("CARGO_PKG_VERSION"),
                    state,
                )?)
            }
            MessageBody::StopFirmwareRequest(_) => {
                running = false;
                MessageBody::StopFirmwareReply(StopFirmware::new(true, firmware.as_str())?)
            }
            MessageBody::StartFirmwareRequest(ref start) => {
                running = true;
                firmware = start.firmware_file_name.clone();
                MessageBody::StartFirmwareReply(StartFirmware::new(true, firmware.as_str())?)
            }
            MessageBody::ErrorMessage(ref error) => {
                println!("Controller reported: {}", error.text);
                continue;
            }
            ref other => {
                println!("Ignoring {}", other.message_type());
                continue;
            }
        };
        
        device.reply(&request, body).await?;
    }
    
    device.disconnect().await?;
    Ok(())
}
