//! Message type codes

use std::fmt;

use crate::constants::message_types as codes;
use crate::error::{Error, Result};

/// Message type carried in every frame envelope
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum MessageType {
    // Status
    DeviceStatusRequest = codes::DEVICE_STATUS_REQUEST,
    DeviceStatusReply = codes::DEVICE_STATUS_REPLY,
    
    // Errors (either direction, solicited or not)
    ErrorMessage = codes::ERROR_MESSAGE,
    
    // Firmware control
    StopFirmwareRequest = codes::STOP_FIRMWARE_REQUEST,
    StopFirmwareReply = codes::STOP_FIRMWARE_REPLY,
    StartFirmwareRequest = codes::START_FIRMWARE_REQUEST,
    StartFirmwareReply = codes::START_FIRMWARE_REPLY,
    
    // Handshake
    LoginRequest = codes::LOGIN_REQUEST,
}

impl MessageType {
    /// All known message types
    pub const ALL: [MessageType; 8] = [
        Self::DeviceStatusRequest,
        Self::DeviceStatusReply,
        Self::ErrorMessage,
        Self::StopFirmwareRequest,
        Self::StopFirmwareReply,
        Self::StartFirmwareRequest,
        Self::StartFirmwareReply,
        Self::LoginRequest,
    ];
    
    /// Check if this type is a reply to an earlier request
    pub fn is_reply(self) -> bool {
        matches!(
            self,
            Self::DeviceStatusReply | Self::StopFirmwareReply | Self::StartFirmwareReply
        )
    }
    
    /// Replies that are only meaningful as an answer to a request
    ///
    /// A DeviceStatusReply with no request behind it is a status push.
    pub fn requires_request(self) -> bool {
        matches!(self, Self::StopFirmwareReply | Self::StartFirmwareReply)
    }
    
    /// Reply type a request of this type expects, if any
    pub fn expected_reply(self) -> Option<MessageType> {
        match self {
            Self::DeviceStatusRequest => Some(Self::DeviceStatusReply),
            Self::StopFirmwareRequest => Some(Self::StopFirmwareReply),
            Self::StartFirmwareRequest => Some(Self::StartFirmwareReply),
            _ => None,
        }
    }
    
    /// Get type name
    pub fn name(self) -> &'static str {
        match self {
            Self::DeviceStatusRequest => "DeviceStatusRequest",
            Self::DeviceStatusReply => "DeviceStatusReply",
            Self::ErrorMessage => "ErrorMessage",
            Self::StopFirmwareRequest => "StopFirmwareRequest",
            Self::StopFirmwareReply => "StopFirmwareReply",
            Self::StartFirmwareRequest => "StartFirmwareRequest",
            Self::StartFirmwareReply => "StartFirmwareReply",
            Self::LoginRequest => "LoginRequest",
        }
    }
}

impl From<MessageType> for u32 {
    fn from(message_type: MessageType) -> u32 {
        message_type as u32
    }
}

impl TryFrom<u32> for MessageType {
    type Error = Error;
    
    fn try_from(value: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| *t as u32 == value)
            .ok_or(Error::UnknownMessageType(value))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), *self as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_message_type_conversion() {
        assert_eq!(u32::from(MessageType::ErrorMessage), 3);
        assert_eq!(MessageType::try_from(0xFFFF).unwrap(), MessageType::LoginRequest);
        for t in MessageType::ALL {
            assert_eq!(MessageType::try_from(u32::from(t)).unwrap(), t);
        }
    }
    
    #[test]
    fn test_expected_reply() {
        assert_eq!(
            MessageType::StopFirmwareRequest.expected_reply(),
            Some(MessageType::StopFirmwareReply)
        );
        assert_eq!(MessageType::ErrorMessage.expected_reply(), None);
        assert!(MessageType::DeviceStatusReply.is_reply());
        assert!(!MessageType::DeviceStatusRequest.is_reply());
        assert!(MessageType::StopFirmwareReply.requires_request());
        assert!(!MessageType::DeviceStatusReply.requires_request());
    }
    
    #[test]
    fn test_unknown_message_type() {
        assert!(matches!(
            MessageType::try_from(9999),
            Err(Error::UnknownMessageType(9999))
        ));
    }
    
    #[test]
    fn test_display() {
        assert_eq!(MessageType::LoginRequest.to_string(), "LoginRequest(65535)");
    }
}
