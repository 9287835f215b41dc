//! Message registry
//!
//! Maps each message type to its decoders, one per supported wire version,
//! and serializes outbound messages at their current version.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};

use bytes::Bytes;
use tracing::trace;

use crate::{
    error::{Error, Result},
    frame::Frame,
    message::{
        DeviceStatusBody, ErrorBody, LoginRequest, Message, MessageBody, StartFirmware,
        StopFirmware,
    },
    message_type::MessageType,
    wire::{FieldReader, FieldWriter, PayloadReader},
};

/// Decoder for one (type, version) pair
pub type DecodeFn = fn(&mut FieldReader<'_>) -> Result<MessageBody>;

static STANDARD: LazyLock<Arc<MessageRegistry>> =
    LazyLock::new(|| Arc::new(MessageRegistry::new()));

/// Type-code to decoder table
#[derive(Debug, Clone)]
pub struct MessageRegistry {
    decoders: HashMap<MessageType, BTreeMap<u32, DecodeFn>>,
}

impl MessageRegistry {
    /// Create a registry holding every catalog type at version 1
    pub fn new() -> Self {
        let mut registry = Self {
            decoders: HashMap::new(),
        };
        
        registry.register_decoder(MessageType::LoginRequest, 1, LoginRequest::read_v1);
        registry.register_decoder(MessageType::DeviceStatusRequest, 1, DeviceStatusBody::read_request_v1);
        registry.register_decoder(MessageType::DeviceStatusReply, 1, DeviceStatusBody::read_reply_v1);
        registry.register_decoder(MessageType::ErrorMessage, 1, ErrorBody::read_v1);
        registry.register_decoder(MessageType::StopFirmwareRequest, 1, StopFirmware::read_request_v1);
        registry.register_decoder(MessageType::StopFirmwareReply, 1, StopFirmware::read_reply_v1);
        registry.register_decoder(MessageType::StartFirmwareRequest, 1, StartFirmware::read_request_v1);
        registry.register_decoder(MessageType::StartFirmwareReply, 1, StartFirmware::read_reply_v1);
        
        registry
    }
    
    /// Shared registry with the standard catalog
    pub fn standard() -> Arc<Self> {
        Arc::clone(&STANDARD)
    }
    
    /// Add (or replace) the decoder for one wire version of a type
    pub fn register_decoder(&mut self, message_type: MessageType, version: u32, decoder: DecodeFn) {
        self.decoders
            .entry(message_type)
            .or_default()
            .insert(version, decoder);
    }
    
    /// Wire versions this registry can decode for `message_type`
    pub fn supported_versions(&self, message_type: MessageType) -> Vec<u32> {
        self.decoders
            .get(&message_type)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default()
    }
    
    /// Decode a payload using the version it declares
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownMessageType`] for an unregistered type code
    /// - [`Error::UnsupportedPacketVersion`] for an unregistered version
    /// - field errors ([`Error::StringExceedsCharacterLimit`],
    ///   [`Error::PayloadTruncated`], ...) from the version's decoder
    pub fn decode(&self, message_type: u32, sequence_number: u32, payload: &[u8]) -> Result<Message> {
        let message_type = MessageType::try_from(message_type)?;
        let reader = PayloadReader::new(payload)?;
        let version = reader.version();
        
        let decoder = self
            .decoders
            .get(&message_type)
            .and_then(|versions| versions.get(&version))
            .ok_or(Error::UnsupportedPacketVersion {
                message_type: message_type.name(),
                version,
            })?;
        
        let mut fields = reader.into_fields()?;
        let body = decoder(&mut fields)?;
        fields.finish()?;
        
        trace!(
            message_type = message_type.name(),
            sequence = sequence_number,
            version = version,
            "Decoded message"
        );
        
        Ok(Message {
            sequence_number,
            version,
            body,
        })
    }
    
    /// Decode a complete frame
    pub fn decode_frame(&self, frame: &Frame) -> Result<Message> {
        self.decode(frame.message_type, frame.sequence_number, &frame.payload)
    }
    
    /// Serialize a message body at its current version
    pub fn encode(&self, message: &Message) -> Result<Bytes> {
        let mut fields = FieldWriter::new();
        message.body.write_fields(&mut fields)?;
        Ok(fields.finish(message.body.current_version()))
    }
    
    /// Serialize a message into a frame
    pub fn encode_frame(&self, message: &Message) -> Result<Frame> {
        let payload = self.encode(message)?;
        Ok(Frame::new(message.sequence_number, message.message_type(), payload))
    }
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
