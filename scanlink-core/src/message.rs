//! Message catalog
//!
//! Every body owns its typed fields and knows how to write its current wire
//! version. Decoders for each supported version are looked up through the
//! [`MessageRegistry`](crate::registry::MessageRegistry).

use std::fmt;

use scanlink_types::{DeviceIdentity, DeviceStatus};

use crate::{
    constants::versions,
    error::{Error, Result},
    message_type::MessageType,
    wire::{check_string, FieldReader, FieldWriter},
};

/// Login handshake, the first frame a device sends after connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub device_name: String,
    pub application_name: String,
    pub application_version: String,
    
    /// Reserved flag; carried for wire compatibility, never interpreted
    pub reserved: bool,
}

impl LoginRequest {
    pub fn new(
        device_name: impl Into<String>,
        application_name: impl Into<String>,
        application_version: impl Into<String>,
    ) -> Result<Self> {
        let login = Self {
            device_name: device_name.into(),
            application_name: application_name.into(),
            application_version: application_version.into(),
            reserved: false,
        };
        login.validate()?;
        Ok(login)
    }
    
    fn validate(&self) -> Result<()> {
        check_string(&self.device_name)?;
        check_string(&self.application_name)?;
        check_string(&self.application_version)
    }
    
    /// Build the connection identity this login announces
    pub fn identity(&self) -> Result<DeviceIdentity> {
        DeviceIdentity::new(
            self.device_name.as_str(),
            self.application_name.as_str(),
            self.application_version.as_str(),
        )
        .map_err(|e| Error::InvalidSessionState(format!("rejected login: {}", e)))
    }
    
    fn write_fields(&self, w: &mut FieldWriter) -> Result<()> {
        w.put_string(&self.device_name)?;
        w.put_string(&self.application_name)?;
        w.put_string(&self.application_version)?;
        w.put_bool(self.reserved);
        Ok(())
    }
    
    pub(crate) fn read_v1(r: &mut FieldReader<'_>) -> Result<MessageBody> {
        Ok(MessageBody::LoginRequest(Self {
            device_name: r.read_string()?,
            application_name: r.read_string()?,
            application_version: r.read_string()?,
            reserved: r.read_bool()?,
        }))
    }
}

/// Body shared by DeviceStatusRequest and DeviceStatusReply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStatusBody {
    pub device_type: String,
    pub device_name: String,
    pub device_version: String,
    pub device_status: String,
}

impl DeviceStatusBody {
    pub fn new(
        device_type: impl Into<String>,
        device_name: impl Into<String>,
        device_version: impl Into<String>,
        device_status: impl Into<String>,
    ) -> Result<Self> {
        let body = Self {
            device_type: device_type.into(),
            device_name: device_name.into(),
            device_version: device_version.into(),
            device_status: device_status.into(),
        };
        body.validate()?;
        Ok(body)
    }
    
    fn validate(&self) -> Result<()> {
        check_string(&self.device_type)?;
        check_string(&self.device_name)?;
        check_string(&self.device_version)?;
        check_string(&self.device_status)
    }
    
    fn write_fields(&self, w: &mut FieldWriter) -> Result<()> {
        w.put_string(&self.device_type)?;
        w.put_string(&self.device_name)?;
        w.put_string(&self.device_version)?;
        w.put_string(&self.device_status)
    }
    
    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            device_type: r.read_string()?,
            device_name: r.read_string()?,
            device_version: r.read_string()?,
            device_status: r.read_string()?,
        })
    }
    
    pub(crate) fn read_request_v1(r: &mut FieldReader<'_>) -> Result<MessageBody> {
        Self::read_fields(r).map(MessageBody::DeviceStatusRequest)
    }
    
    pub(crate) fn read_reply_v1(r: &mut FieldReader<'_>) -> Result<MessageBody> {
        Self::read_fields(r).map(MessageBody::DeviceStatusReply)
    }
}

impl From<DeviceStatusBody> for DeviceStatus {
    fn from(body: DeviceStatusBody) -> Self {
        DeviceStatus::new(
            body.device_type,
            body.device_name,
            body.device_version,
            body.device_status,
        )
    }
}

/// Error text, sent solicited or unsolicited by either side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub text: String,
}

impl ErrorBody {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        check_string(&text)?;
        Ok(Self { text })
    }
    
    pub(crate) fn read_v1(r: &mut FieldReader<'_>) -> Result<MessageBody> {
        Ok(MessageBody::ErrorMessage(Self {
            text: r.read_string()?,
        }))
    }
}

/// Body shared by StopFirmwareRequest and StopFirmwareReply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopFirmware {
    pub firmware_stopped: bool,
    pub firmware_file_name: String,
}

impl StopFirmware {
    pub fn new(firmware_stopped: bool, firmware_file_name: impl Into<String>) -> Result<Self> {
        let firmware_file_name = firmware_file_name.into();
        check_string(&firmware_file_name)?;
        Ok(Self {
            firmware_stopped,
            firmware_file_name,
        })
    }
    
    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            firmware_stopped: r.read_bool()?,
            firmware_file_name: r.read_string()?,
        })
    }
    
    pub(crate) fn read_request_v1(r: &mut FieldReader<'_>) -> Result<MessageBody> {
        Self::read_fields(r).map(MessageBody::StopFirmwareRequest)
    }
    
    pub(crate) fn read_reply_v1(r: &mut FieldReader<'_>) -> Result<MessageBody> {
        Self::read_fields(r).map(MessageBody::StopFirmwareReply)
    }
}

/// Body shared by StartFirmwareRequest and StartFirmwareReply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartFirmware {
    pub firmware_started: bool,
    pub firmware_file_name: String,
}

impl StartFirmware {
    pub fn new(firmware_started: bool, firmware_file_name: impl Into<String>) -> Result<Self> {
        let firmware_file_name = firmware_file_name.into();
        check_string(&firmware_file_name)?;
        Ok(Self {
            firmware_started,
            firmware_file_name,
        })
    }
    
    fn read_fields(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            firmware_started: r.read_bool()?,
            firmware_file_name: r.read_string()?,
        })
    }
    
    pub(crate) fn read_request_v1(r: &mut FieldReader<'_>) -> Result<MessageBody> {
        Self::read_fields(r).map(MessageBody::StartFirmwareRequest)
    }
    
    pub(crate) fn read_reply_v1(r: &mut FieldReader<'_>) -> Result<MessageBody> {
        Self::read_fields(r).map(MessageBody::StartFirmwareReply)
    }
}

/// Closed set of message bodies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    DeviceStatusRequest(DeviceStatusBody),
    DeviceStatusReply(DeviceStatusBody),
    ErrorMessage(ErrorBody),
    StopFirmwareRequest(StopFirmware),
    StopFirmwareReply(StopFirmware),
    StartFirmwareRequest(StartFirmware),
    StartFirmwareReply(StartFirmware),
    LoginRequest(LoginRequest),
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::DeviceStatusRequest(_) => MessageType::DeviceStatusRequest,
            Self::DeviceStatusReply(_) => MessageType::DeviceStatusReply,
            Self::ErrorMessage(_) => MessageType::ErrorMessage,
            Self::StopFirmwareRequest(_) => MessageType::StopFirmwareRequest,
            Self::StopFirmwareReply(_) => MessageType::StopFirmwareReply,
            Self::StartFirmwareRequest(_) => MessageType::StartFirmwareRequest,
            Self::StartFirmwareReply(_) => MessageType::StartFirmwareReply,
            Self::LoginRequest(_) => MessageType::LoginRequest,
        }
    }
    
    /// Highest wire version this body is written with
    pub fn current_version(&self) -> u32 {
        match self {
            Self::DeviceStatusRequest(_) | Self::DeviceStatusReply(_) => versions::DEVICE_STATUS,
            Self::ErrorMessage(_) => versions::ERROR_MESSAGE,
            Self::StopFirmwareRequest(_) | Self::StopFirmwareReply(_) => versions::STOP_FIRMWARE,
            Self::StartFirmwareRequest(_) | Self::StartFirmwareReply(_) => versions::START_FIRMWARE,
            Self::LoginRequest(_) => versions::LOGIN_REQUEST,
        }
    }
    
    /// Write the current version's fields
    pub fn write_fields(&self, w: &mut FieldWriter) -> Result<()> {
        match self {
            Self::DeviceStatusRequest(b) | Self::DeviceStatusReply(b) => b.write_fields(w),
            Self::ErrorMessage(b) => w.put_string(&b.text),
            Self::StopFirmwareRequest(b) | Self::StopFirmwareReply(b) => {
                w.put_bool(b.firmware_stopped);
                w.put_string(&b.firmware_file_name)
            }
            Self::StartFirmwareRequest(b) | Self::StartFirmwareReply(b) => {
                w.put_bool(b.firmware_started);
                w.put_string(&b.firmware_file_name)
            }
            Self::LoginRequest(b) => b.write_fields(w),
        }
    }
    
    /// Check every string field against the length limit
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::DeviceStatusRequest(b) | Self::DeviceStatusReply(b) => b.validate(),
            Self::ErrorMessage(b) => check_string(&b.text),
            Self::StopFirmwareRequest(b) | Self::StopFirmwareReply(b) => {
                check_string(&b.firmware_file_name)
            }
            Self::StartFirmwareRequest(b) | Self::StartFirmwareReply(b) => {
                check_string(&b.firmware_file_name)
            }
            Self::LoginRequest(b) => b.validate(),
        }
    }
}

/// A decoded or outbound message
///
/// `version` is the wire version the message was decoded from; outbound
/// messages always carry (and are written with) the current version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sequence_number: u32,
    pub version: u32,
    pub body: MessageBody,
}

impl Message {
    /// Create an outbound message at the body's current version
    pub fn new(sequence_number: u32, body: MessageBody) -> Self {
        Self {
            sequence_number,
            version: body.current_version(),
            body,
        }
    }
    
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(seq={}, v{})",
            self.message_type(),
            self.sequence_number,
            self.version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_NAME_LENGTH;
    
    #[test]
    fn test_constructors_enforce_limit() {
        let long = "n".repeat(1100);
        
        assert!(matches!(
            LoginRequest::new(long.as_str(), "ctrl", "1.0"),
            Err(Error::StringExceedsCharacterLimit { length: 1100, max: MAX_NAME_LENGTH })
        ));
        assert!(DeviceStatusBody::new("Printer", long.as_str(), "1.0", "idle").is_err());
        assert!(ErrorBody::new(long.as_str()).is_err());
        assert!(StopFirmware::new(true, long.as_str()).is_err());
        assert!(StartFirmware::new(true, long.as_str()).is_err());
    }
    
    #[test]
    fn test_validate_catches_direct_construction() {
        let body = MessageBody::ErrorMessage(ErrorBody { text: "e".repeat(300) });
        assert!(body.validate().is_err());
    }
    
    #[test]
    fn test_message_new_uses_current_version() {
        let body = MessageBody::ErrorMessage(ErrorBody::new("boom").unwrap());
        let message = Message::new(9, body);
        assert_eq!(message.version, versions::ERROR_MESSAGE);
        assert_eq!(message.message_type(), MessageType::ErrorMessage);
        assert_eq!(message.to_string(), "ErrorMessage(3)(seq=9, v1)");
    }
    
    #[test]
    fn test_login_identity() {
        let login = LoginRequest::new("dev1", "ctrl", "1.0").unwrap();
        let identity = login.identity().unwrap();
        assert_eq!(identity.device_name, "dev1");
        
        let anonymous = LoginRequest::new("", "ctrl", "1.0").unwrap();
        assert!(anonymous.identity().is_err());
    }
}
