//! Protocol constants

use std::time::Duration;

/// Maximum length, in bytes, of any string field
pub const MAX_NAME_LENGTH: usize = 256;

/// Default cap on a frame's payload length (64KB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Default capacity of a session's unsolicited-message queue
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

/// Default request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// First sequence number handed out by a session
pub const INITIAL_SEQUENCE_NUMBER: u32 = 1;

/// Sequence number of unsolicited frames; never answers a request
pub const UNSOLICITED_SEQUENCE_NUMBER: u32 = 0;

/// Message type codes
pub mod message_types {
    pub const DEVICE_STATUS_REQUEST: u32 = 1;
    pub const DEVICE_STATUS_REPLY: u32 = 2;
    pub const ERROR_MESSAGE: u32 = 3;
    pub const STOP_FIRMWARE_REQUEST: u32 = 4;
    pub const STOP_FIRMWARE_REPLY: u32 = 5;
    pub const START_FIRMWARE_REQUEST: u32 = 6;
    pub const START_FIRMWARE_REPLY: u32 = 7;

    /// Reserved code for the login handshake
    pub const LOGIN_REQUEST: u32 = 0x0000_FFFF;
}

/// Current wire-format version per message body
pub mod versions {
    pub const LOGIN_REQUEST: u32 = 1;
    pub const DEVICE_STATUS: u32 = 1;
    pub const ERROR_MESSAGE: u32 = 1;
    pub const STOP_FIRMWARE: u32 = 1;
    pub const START_FIRMWARE: u32 = 1;
}
