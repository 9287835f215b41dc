//! Commands the controller dispatches to devices

use scanlink_core::{
    DeviceStatusBody, Message, MessageBody, MessageType, StartFirmware, StopFirmware,
};
use scanlink_types::DeviceStatus;

use crate::error::{Error, Result};

/// Command addressed to one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Ask for a DeviceStatusReply
    RequestStatus,
    
    /// Start the given firmware image
    StartFirmware { file_name: String },
    
    /// Stop the running firmware
    StopFirmware,
}

impl DeviceCommand {
    /// Request body and the reply type it expects
    pub(crate) fn into_request(self) -> Result<(MessageBody, MessageType)> {
        let body = match self {
            Self::RequestStatus => MessageBody::DeviceStatusRequest(DeviceStatusBody::default()),
            Self::StartFirmware { file_name } => {
                MessageBody::StartFirmwareRequest(StartFirmware::new(false, file_name)?)
            }
            Self::StopFirmware => MessageBody::StopFirmwareRequest(StopFirmware::default()),
        };
        
        let expected = body.message_type().expected_reply().ok_or_else(|| {
            Error::InvalidResponse(format!("{} has no reply type", body.message_type()))
        })?;
        
        Ok((body, expected))
    }
}

/// Result of a dispatched command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Status(DeviceStatus),
    FirmwareStarted { started: bool, file_name: String },
    FirmwareStopped { stopped: bool, file_name: String },
}

impl TryFrom<Message> for CommandOutcome {
    type Error = Error;
    
    fn try_from(reply: Message) -> Result<Self> {
        match reply.body {
            MessageBody::DeviceStatusReply(body) => Ok(Self::Status(body.into())),
            MessageBody::StartFirmwareReply(body) => Ok(Self::FirmwareStarted {
                started: body.firmware_started,
                file_name: body.firmware_file_name,
            }),
            MessageBody::StopFirmwareReply(body) => Ok(Self::FirmwareStopped {
                stopped: body.firmware_stopped,
                file_name: body.firmware_file_name,
            }),
            other => Err(Error::InvalidResponse(format!(
                "{} is not a command reply",
                other.message_type()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scanlink_core::ErrorBody;
    
    #[test]
    fn test_command_requests() {
        let (body, expected) = DeviceCommand::StopFirmware.into_request().unwrap();
        assert_eq!(body.message_type(), MessageType::StopFirmwareRequest);
        assert_eq!(expected, MessageType::StopFirmwareReply);
        
        let (body, expected) = DeviceCommand::StartFirmware { file_name: "fw.bin".into() }
            .into_request()
            .unwrap();
        assert_eq!(
            body,
            MessageBody::StartFirmwareRequest(StartFirmware::new(false, "fw.bin").unwrap())
        );
        assert_eq!(expected, MessageType::StartFirmwareReply);
    }
    
    #[test]
    fn test_start_firmware_long_name() {
        let command = DeviceCommand::StartFirmware { file_name: "f".repeat(300) };
        assert!(matches!(
            command.into_request(),
            Err(Error::Core(scanlink_core::Error::StringExceedsCharacterLimit { .. }))
        ));
    }
    
    #[test]
    fn test_outcome_from_reply() {
        let reply = Message::new(
            3,
            MessageBody::StopFirmwareReply(StopFirmware::new(true, "fw.bin").unwrap()),
        );
        assert_eq!(
            CommandOutcome::try_from(reply).unwrap(),
            CommandOutcome::FirmwareStopped { stopped: true, file_name: "fw.bin".into() }
        );
        
        let not_a_reply = Message::new(3, MessageBody::ErrorMessage(ErrorBody::new("x").unwrap()));
        assert!(CommandOutcome::try_from(not_a_reply).is_err());
    }
}
