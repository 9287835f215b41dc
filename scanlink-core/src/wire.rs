//! Versioned payload layout and field encoding
//!
//! ```text
//! ┌─────────────┬─────────────┬────────────────────────────────┐
//! │   Version   │  HeaderLen  │ Variable header (typed fields) │
//! │   4 bytes   │   4 bytes   │        HeaderLen bytes         │
//! └─────────────┴─────────────┴────────────────────────────────┘
//! ```
//!
//! Fields: strings are a `u32` length followed by that many bytes, booleans
//! are one byte (0 or 1), integers are fixed-width little-endian.

use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    constants::MAX_NAME_LENGTH,
    error::{Error, Result},
};

/// Reads the leading version of a payload
#[derive(Debug)]
pub struct PayloadReader<'a> {
    version: u32,
    rest: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    pub fn new(payload: &'a [u8]) -> Result<Self> {
        if payload.len() < 4 {
            return Err(Error::PayloadTruncated {
                needed: 4,
                available: payload.len(),
            });
        }
        
        Ok(Self {
            version: LittleEndian::read_u32(&payload[..4]),
            rest: &payload[4..],
        })
    }
    
    pub fn version(&self) -> u32 {
        self.version
    }
    
    /// Bound a reader to the declared variable-header region
    ///
    /// The region must account for every remaining payload byte.
    pub fn into_fields(self) -> Result<FieldReader<'a>> {
        if self.rest.len() < 4 {
            return Err(Error::PayloadTruncated {
                needed: 4,
                available: self.rest.len(),
            });
        }
        
        let declared = LittleEndian::read_u32(&self.rest[..4]) as usize;
        let region = &self.rest[4..];
        
        if region.len() < declared {
            return Err(Error::PayloadTruncated {
                needed: declared,
                available: region.len(),
            });
        }
        if region.len() > declared {
            return Err(Error::TrailingBytes {
                count: region.len() - declared,
            });
        }
        
        Ok(FieldReader { buf: region, pos: 0 })
    }
}

/// Cursor over a variable-header region
#[derive(Debug)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        if available < n {
            return Err(Error::PayloadTruncated { needed: n, available });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
    
    pub fn read_u32(&mut self) -> Result<u32> {
        self.take(4).map(LittleEndian::read_u32)
    }
    
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::InvalidBoolean(other)),
        }
    }
    
    /// Read a length-prefixed string, enforcing [`MAX_NAME_LENGTH`]
    /// before touching the string bytes
    pub fn read_string(&mut self) -> Result<String> {
        let length = self.read_u32()? as usize;
        if length > MAX_NAME_LENGTH {
            return Err(Error::StringExceedsCharacterLimit {
                length,
                max: MAX_NAME_LENGTH,
            });
        }
        let raw = self.take(length)?;
        Ok(String::from_utf8(raw.to_vec())?)
    }
    
    pub fn consumed(&self) -> usize {
        self.pos
    }
    
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
    
    /// Verify the fields consumed the whole declared region
    pub fn finish(self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(Error::HeaderLengthMismatch {
                declared: self.buf.len(),
                consumed: self.pos,
            });
        }
        Ok(())
    }
}

/// Builds the variable-header region of an outbound payload
#[derive(Debug, Default)]
pub struct FieldWriter {
    buf: BytesMut,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }
    
    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }
    
    pub fn put_bool(&mut self, value: bool) {
        self.buf.put_u8(value as u8);
    }
    
    pub fn put_string(&mut self, value: &str) -> Result<()> {
        check_string(value)?;
        self.buf.put_u32_le(value.len() as u32);
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }
    
    /// Wrap the fields in the version + declared-length prefix
    pub fn finish(self, version: u32) -> Bytes {
        let mut payload = BytesMut::with_capacity(8 + self.buf.len());
        payload.put_u32_le(version);
        payload.put_u32_le(self.buf.len() as u32);
        payload.put_slice(&self.buf);
        payload.freeze()
    }
}

/// Check a string against [`MAX_NAME_LENGTH`]
pub fn check_string(value: &str) -> Result<()> {
    if value.len() > MAX_NAME_LENGTH {
        return Err(Error::StringExceedsCharacterLimit {
            length: value.len(),
            max: MAX_NAME_LENGTH,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    
    fn payload_with(version: u32, fields: FieldWriter) -> Bytes {
        fields.finish(version)
    }
    
    #[test]
    fn test_field_round_trip() {
        let mut w = FieldWriter::new();
        w.put_string("dev1").unwrap();
        w.put_bool(true);
        w.put_u32(42);
        let payload = payload_with(1, w);
        
        let reader = PayloadReader::new(&payload).unwrap();
        assert_eq!(reader.version(), 1);
        
        let mut fields = reader.into_fields().unwrap();
        assert_eq!(fields.read_string().unwrap(), "dev1");
        assert!(fields.read_bool().unwrap());
        assert_eq!(fields.read_u32().unwrap(), 42);
        fields.finish().unwrap();
    }
    
    #[test]
    fn test_string_layout() {
        let mut w = FieldWriter::new();
        w.put_string("ab").unwrap();
        let payload = payload_with(7, w);
        
        assert_eq!(
            payload.as_ref(),
            &[7, 0, 0, 0, 6, 0, 0, 0, 2, 0, 0, 0, b'a', b'b'][..]
        );
    }
    
    #[test]
    fn test_string_limit_on_write() {
        let mut w = FieldWriter::new();
        let long = "x".repeat(MAX_NAME_LENGTH + 1);
        assert!(matches!(
            w.put_string(&long),
            Err(Error::StringExceedsCharacterLimit { length: 257, max: 256 })
        ));
        assert!(w.put_string(&"x".repeat(MAX_NAME_LENGTH)).is_ok());
    }
    
    #[test]
    fn test_string_limit_on_read() {
        let mut region = BytesMut::new();
        region.put_u32_le(1100);
        region.put_slice(&[b'a'; 1100]);
        let mut payload = BytesMut::new();
        payload.put_u32_le(1);
        payload.put_u32_le(region.len() as u32);
        payload.put_slice(&region);
        
        let mut fields = PayloadReader::new(&payload).unwrap().into_fields().unwrap();
        assert!(matches!(
            fields.read_string(),
            Err(Error::StringExceedsCharacterLimit { length: 1100, .. })
        ));
    }
    
    #[test]
    fn test_truncated_region() {
        let payload = [1, 0, 0, 0, 10, 0, 0, 0, 1, 2];
        let result = PayloadReader::new(&payload).unwrap().into_fields();
        assert!(matches!(
            result,
            Err(Error::PayloadTruncated { needed: 10, available: 2 })
        ));
    }
    
    #[test]
    fn test_trailing_bytes() {
        let payload = [1, 0, 0, 0, 1, 0, 0, 0, 1, 0xEE];
        let result = PayloadReader::new(&payload).unwrap().into_fields();
        assert!(matches!(result, Err(Error::TrailingBytes { count: 1 })));
    }
    
    #[test]
    fn test_unread_header_bytes() {
        let payload = [1, 0, 0, 0, 2, 0, 0, 0, 1, 0];
        let mut fields = PayloadReader::new(&payload).unwrap().into_fields().unwrap();
        assert!(fields.read_bool().unwrap());
        assert!(matches!(
            fields.finish(),
            Err(Error::HeaderLengthMismatch { declared: 2, consumed: 1 })
        ));
    }
    
    #[test]
    fn test_invalid_bool() {
        let payload = [1, 0, 0, 0, 1, 0, 0, 0, 2];
        let mut fields = PayloadReader::new(&payload).unwrap().into_fields().unwrap();
        assert!(matches!(fields.read_bool(), Err(Error::InvalidBoolean(2))));
    }
}
