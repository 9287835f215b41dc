//! Error types for scanlink-core

use std::time::Duration;

use crate::message_type::MessageType;
use crate::session::DecodePolicy;

/// Result type alias for scanlink-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Declared payload length exceeds the configured maximum
    #[error("Frame too large: {size} bytes (max: {max} bytes)")]
    FrameTooLarge {
        size: usize,
        max: usize,
    },
    
    /// Unknown message type code
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u32),
    
    /// Known message type, unknown wire version
    #[error("Unsupported packet version {version} for {message_type}")]
    UnsupportedPacketVersion {
        message_type: &'static str,
        version: u32,
    },
    
    /// String field longer than the protocol allows
    #[error("String exceeds character limit: {length} bytes (max: {max})")]
    StringExceedsCharacterLimit {
        length: usize,
        max: usize,
    },
    
    /// Payload ended before a field was complete
    #[error("Payload truncated: needed {needed} bytes, {available} available")]
    PayloadTruncated {
        needed: usize,
        available: usize,
    },
    
    /// Variable header length does not match what the fields consumed
    #[error("Variable header length mismatch: declared {declared}, consumed {consumed}")]
    HeaderLengthMismatch {
        declared: usize,
        consumed: usize,
    },
    
    /// Bytes left in the payload after the variable header
    #[error("{count} trailing bytes after variable header")]
    TrailingBytes {
        count: usize,
    },
    
    /// Boolean field holding something other than 0 or 1
    #[error("Invalid boolean byte: 0x{0:02X}")]
    InvalidBoolean(u8),
    
    /// String field is not valid UTF-8
    #[error("Invalid string field: {0}")]
    InvalidString(#[from] std::string::FromUtf8Error),
    
    /// Message received before the login handshake
    #[error("Message type {message_type} received before login")]
    NotLoggedIn {
        message_type: u32,
    },
    
    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),
    
    /// No reply within the request timeout
    #[error("Timeout waiting for reply to sequence {sequence} after {timeout:?}")]
    Timeout {
        sequence: u32,
        timeout: Duration,
    },
    
    /// Session closed while the operation was outstanding
    #[error("Session closed")]
    SessionClosed,
    
    /// Outbound bytes could not be handed to the transport
    #[error("Write failed: {0}")]
    WriteFailed(String),
    
    /// Reply arrived for the right sequence number but with the wrong type
    #[error("Unexpected reply: expected {expected}, got {actual}")]
    UnexpectedReply {
        expected: MessageType,
        actual: MessageType,
    },
    
    /// Device answered a request with an ErrorMessage
    #[error("Device returned error: {0}")]
    Remote(String),
}

impl Error {
    /// Check if error is recoverable (retry might succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Remote(_)
                | Self::UnexpectedReply { .. }
        )
    }
    
    /// Check if error requires reconnection
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::SessionClosed
                | Self::WriteFailed(_)
                | Self::FrameTooLarge { .. }
                | Self::NotLoggedIn { .. }
        )
    }
    
    /// Check if a decode error means the byte stream itself is desynchronized
    pub fn is_desync(&self) -> bool {
        matches!(
            self,
            Self::StringExceedsCharacterLimit { .. }
                | Self::PayloadTruncated { .. }
                | Self::HeaderLengthMismatch { .. }
                | Self::TrailingBytes { .. }
                | Self::InvalidBoolean(_)
                | Self::InvalidString(_)
        )
    }
    
    /// Check whether a frame decode error closes the session under `policy`
    ///
    /// Version and type errors only reject the frame; desync errors follow
    /// the policy.
    pub fn closes_session(&self, policy: DecodePolicy) -> bool {
        match self {
            Self::FrameTooLarge { .. } => true,
            Self::UnsupportedPacketVersion { .. } | Self::UnknownMessageType(_) => false,
            e if e.is_desync() => policy == DecodePolicy::CloseSession,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_error_never_closes() {
        let err = Error::UnsupportedPacketVersion {
            message_type: "ErrorMessage",
            version: 9,
        };
        assert!(!err.closes_session(DecodePolicy::CloseSession));
        assert!(!err.closes_session(DecodePolicy::DropFrame));
    }

    #[test]
    fn test_desync_follows_policy() {
        let err = Error::StringExceedsCharacterLimit { length: 1100, max: 256 };
        assert!(err.closes_session(DecodePolicy::CloseSession));
        assert!(!err.closes_session(DecodePolicy::DropFrame));
    }

    #[test]
    fn test_classification() {
        assert!(Error::Timeout { sequence: 1, timeout: Duration::from_millis(50) }.is_recoverable());
        assert!(Error::SessionClosed.requires_reconnect());
        assert!(!Error::SessionClosed.is_recoverable());
    }
}
