//! # scanlink-core
//!
//! Core protocol implementation for scanner and laser firmware control.
//!
//! This crate provides the transport-independent protocol:
//! - Frame envelope and incremental stream framing
//! - Versioned payload layout and field encoding
//! - Message catalog and the type/version decoder registry
//! - Per-connection session state machine
//!
//! It never opens sockets; bytes come in through
//! [`Session::on_bytes_received`] and leave through an [`Outbound`].

pub mod buffer;
pub mod constants;
pub mod error;
pub mod frame;
pub mod message;
pub mod message_type;
pub mod registry;
pub mod session;
pub mod wire;

pub use error::{Error, Result};
pub use frame::{Frame, FrameCodec};
pub use message::{
    DeviceStatusBody, ErrorBody, LoginRequest, Message, MessageBody, StartFirmware, StopFirmware,
};
pub use message_type::MessageType;
pub use registry::MessageRegistry;
pub use session::{
    CloseReason, DecodePolicy, Outbound, Session, SessionConfig, SessionEvent, SessionId,
    SessionState,
};

/// Protocol version information
pub const PROTOCOL_VERSION: &str = "1.0";
