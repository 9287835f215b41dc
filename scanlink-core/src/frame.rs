//! Frame envelope and incremental stream framing

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::{
    constants::DEFAULT_MAX_PAYLOAD_SIZE,
    error::{Error, Result},
    message_type::MessageType,
};

/// One complete envelope + payload unit on the wire
///
/// # Frame Structure
///
/// ```text
/// ┌─────────────┬─────────────┬─────────────┬─────────────┐
/// │  Sequence   │ MessageType │ PayloadLen  │   Payload   │
/// │   4 bytes   │   4 bytes   │   4 bytes   │   N bytes   │
/// │  (LE u32)   │  (LE u32)   │  (LE u32)   │   (bytes)   │
/// └─────────────┴─────────────┴─────────────┴─────────────┘
/// ```
///
/// The payload length is not stored; it is always `payload.len()`.
///
/// # Examples
///
/// ```
/// use scanlink_core::{Frame, FrameCodec};
///
/// let frame = Frame::new(5, 3u32, vec![1, 2, 3]);
/// let mut buf = frame.encode();
///
/// let decoded = FrameCodec::default().try_read_frame(&mut buf).unwrap();
/// assert_eq!(decoded, Some(frame));
/// assert!(buf.is_empty());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number (assigned by the requester, echoed in the reply)
    pub sequence_number: u32,
    
    /// Raw message type code
    pub message_type: u32,
    
    /// Versioned message payload
    pub payload: Bytes,
}

impl Frame {
    /// Envelope size in bytes
    pub const HEADER_SIZE: usize = 12;
    
    pub fn new(sequence_number: u32, message_type: impl Into<u32>, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence_number,
            message_type: message_type.into(),
            payload: payload.into(),
        }
    }
    
    /// Payload length as written in the envelope
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
    
    /// Resolve the raw type code
    pub fn message_type(&self) -> Result<MessageType> {
        MessageType::try_from(self.message_type)
    }
    
    /// Encode frame to bytes
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());
        self.encode_into(&mut buf);
        buf
    }
    
    /// Append the encoded frame to `dst`
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.size());
        dst.put_u32_le(self.sequence_number);
        dst.put_u32_le(self.message_type);
        dst.put_u32_le(self.payload.len() as u32);
        dst.put_slice(&self.payload);
    }
    
    /// Get total frame size
    pub fn size(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("sequence_number", &self.sequence_number)
            .field("message_type", &format!("0x{:08X}", self.message_type))
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message_type() {
            Ok(t) => write!(f, "Frame[{}](seq={}, len={})", t, self.sequence_number, self.payload.len()),
            Err(_) => write!(
                f,
                "Frame[0x{:08X}](seq={}, len={})",
                self.message_type,
                self.sequence_number,
                self.payload.len()
            ),
        }
    }
}

/// Length-prefixed stream framing
///
/// Operates on an accumulating buffer fed by the transport. Never blocks and
/// never performs I/O.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload_size: usize,
}

impl FrameCodec {
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }
    
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
    
    /// Try to take one complete frame off the front of `buf`
    ///
    /// Returns `Ok(None)` when more bytes are needed; the partial bytes stay
    /// in `buf` for the next call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] as soon as the envelope declares a
    /// payload above the configured maximum.
    pub fn try_read_frame(&self, buf: &mut BytesMut) -> Result<Option<Frame>> {
        if buf.len() < Frame::HEADER_SIZE {
            return Ok(None);
        }
        
        let payload_len = LittleEndian::read_u32(&buf[8..12]) as usize;
        if payload_len > self.max_payload_size {
            return Err(Error::FrameTooLarge {
                size: payload_len,
                max: self.max_payload_size,
            });
        }
        
        let total = Frame::HEADER_SIZE + payload_len;
        if buf.len() < total {
            buf.reserve(total - buf.len());
            return Ok(None);
        }
        
        let mut raw = buf.split_to(total);
        trace!(
            "Frame bytes: {}",
            hex::encode(&raw[..raw.len().min(32)])
        );
        
        let sequence_number = raw.get_u32_le();
        let message_type = raw.get_u32_le();
        raw.advance(4);
        
        Ok(Some(Frame {
            sequence_number,
            message_type,
            payload: raw.freeze(),
        }))
    }
    
    /// Encode a frame, enforcing the payload cap on the way out
    pub fn write_frame(&self, frame: &Frame) -> Result<BytesMut> {
        if frame.payload_len() > self.max_payload_size {
            return Err(Error::FrameTooLarge {
                size: frame.payload_len(),
                max: self.max_payload_size,
            });
        }
        Ok(frame.encode())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    
    #[test]
    fn test_frame_encode_layout() {
        let frame = Frame::new(5, MessageType::ErrorMessage, vec![0xAA, 0xBB]);
        let encoded = frame.encode();
        
        assert_eq!(
            encoded.as_ref(),
            &[5, 0, 0, 0, 3, 0, 0, 0, 2, 0, 0, 0, 0xAA, 0xBB][..]
        );
    }
    
    #[test]
    fn test_need_more_data_header() {
        let codec = FrameCodec::default();
        let mut buf = BytesMut::from(&[1, 2, 3][..]);
        
        assert_eq!(codec.try_read_frame(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 3);
    }
    
    #[test]
    fn test_need_more_data_payload() {
        let codec = FrameCodec::default();
        let frame = Frame::new(1, 2u32, vec![9; 10]);
        let encoded = frame.encode();
        let mut buf = BytesMut::from(&encoded[..15]);
        
        assert_eq!(codec.try_read_frame(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 15);
        
        buf.extend_from_slice(&encoded[15..]);
        assert_eq!(codec.try_read_frame(&mut buf).unwrap(), Some(frame));
    }
    
    #[test]
    fn test_frame_too_large() {
        let codec = FrameCodec::new(16);
        let mut buf = BytesMut::new();
        buf.put_u32_le(1);
        buf.put_u32_le(1);
        buf.put_u32_le(17);
        
        assert!(matches!(
            codec.try_read_frame(&mut buf),
            Err(Error::FrameTooLarge { size: 17, max: 16 })
        ));
        assert!(codec.write_frame(&Frame::new(1, 1u32, vec![0; 17])).is_err());
    }
    
    #[test]
    fn test_back_to_back_frames() {
        let codec = FrameCodec::default();
        let first = Frame::new(1, 1u32, vec![1]);
        let second = Frame::new(2, 2u32, Bytes::new());
        
        let mut buf = first.encode();
        second.encode_into(&mut buf);
        
        assert_eq!(codec.try_read_frame(&mut buf).unwrap(), Some(first));
        assert_eq!(codec.try_read_frame(&mut buf).unwrap(), Some(second));
        assert_eq!(codec.try_read_frame(&mut buf).unwrap(), None);
    }
    
    proptest! {
        #[test]
        fn prop_incremental_assembly_matches_whole(
            seq in any::<u32>(),
            code in any::<u32>(),
            payload in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let codec = FrameCodec::default();
            let frame = Frame::new(seq, code, payload);
            let encoded = frame.encode();
            
            let mut whole = encoded.clone();
            let at_once = codec.try_read_frame(&mut whole).unwrap();
            
            let mut buf = BytesMut::new();
            let mut one_by_one = None;
            for byte in encoded.iter() {
                prop_assert!(one_by_one.is_none());
                buf.put_u8(*byte);
                one_by_one = codec.try_read_frame(&mut buf).unwrap();
            }
            
            prop_assert_eq!(one_by_one, at_once);
        }
    }
}
