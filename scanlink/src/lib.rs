//! # scanlink
//!
//! Controller and device endpoints for the scanlink firmware control
//! protocol.
//!
//! ## Features
//!
//! - Length-prefixed, versioned binary framing over TCP
//! - Login-gated device sessions with request/reply correlation
//! - Server registry of accepted devices with optional status polling
//! - Device-side client for emulators and firmware hosts
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use scanlink::{DeviceCommand, ResourceHints, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> scanlink::Result<()> {
//!     let server = Arc::new(Server::new(ServerConfig::default()));
//!     server.accept_device("laser-1", ResourceHints::default());
//!     server.start("0.0.0.0", 5000, false).await?;
//!     
//!     // Once the device has logged in
//!     let outcome = server
//!         .dispatch("laser-1", DeviceCommand::StartFirmware { file_name: "cut.bin".into() })
//!         .await?;
//!     println!("{:?}", outcome);
//!     
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod server;

// Re-exports
pub use command::{CommandOutcome, DeviceCommand};
pub use config::ServerConfig;
pub use device::DeviceClient;
pub use error::{Error, Result};
pub use server::Server;

// Re-export protocol types
pub use scanlink_core::{
    DecodePolicy, DeviceStatusBody, ErrorBody, LoginRequest, Message, MessageBody, MessageType,
    Session, SessionConfig, SessionState, StartFirmware, StopFirmware,
};
pub use scanlink_types::{DeviceIdentity, DeviceStatus, ResourceHints};
