//! Byte cursor over a binary module.
//!
//! A [`Reader`] walks a byte slice and tracks its absolute position in the
//! original input, so errors from nested readers (section payloads, code
//! entries) still report offsets into the full module. Sub-readers borrow a
//! sub-slice and carry the base offset forward.

use crate::decode::error::DecodeError;
use crate::leb128;
use crate::module::ValueType;

#[derive(Debug, PartialEq)]
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Reader {
            bytes,
            pos: 0,
            base: 0,
        }
    }

    /// Absolute offset into the original input.
    pub(crate) fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub(crate) fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let byte = self
            .bytes
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof {
                offset: self.offset(),
            })?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn peek_byte(&self) -> Result<u8, DecodeError> {
        self.bytes
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof {
                offset: self.offset(),
            })
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DecodeError::UnexpectedEof {
                offset: self.base + self.bytes.len(),
            })?;
        let slice = self.bytes.get(self.pos..end).unwrap_or(&[]);
        self.pos = end;
        Ok(slice)
    }

    /// Consumes everything left in this reader.
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let slice = self.bytes.get(self.pos..).unwrap_or(&[]);
        self.pos = self.bytes.len();
        slice
    }

    /// Splits off the next `len` bytes as a nested reader.
    ///
    /// The nested reader reports offsets relative to the original input,
    /// not to its own slice.
    pub(crate) fn sub_reader(&mut self, len: usize) -> Result<Reader<'a>, DecodeError> {
        let start = self.offset();
        let bytes = self.read_bytes(len)?;
        Ok(Reader {
            bytes,
            pos: 0,
            base: start,
        })
    }

    pub(crate) fn read_var_u32(&mut self) -> Result<u32, DecodeError> {
        let start = self.offset();
        let value = leb128::read_unsigned(self.bytes, &mut self.pos, 32)
            .map_err(|e| self.map_leb128(e, start))?;
        Ok(value as u32)
    }

    pub(crate) fn read_var_u64(&mut self) -> Result<u64, DecodeError> {
        let start = self.offset();
        leb128::read_unsigned(self.bytes, &mut self.pos, 64)
            .map_err(|e| self.map_leb128(e, start))
    }

    pub(crate) fn read_var_s32(&mut self) -> Result<i32, DecodeError> {
        let start = self.offset();
        let value = leb128::read_signed(self.bytes, &mut self.pos, 32)
            .map_err(|e| self.map_leb128(e, start))?;
        Ok(value as i32)
    }

    pub(crate) fn read_var_s33(&mut self) -> Result<i64, DecodeError> {
        let start = self.offset();
        leb128::read_signed(self.bytes, &mut self.pos, 33)
            .map_err(|e| self.map_leb128(e, start))
    }

    pub(crate) fn read_var_s64(&mut self) -> Result<i64, DecodeError> {
        let start = self.offset();
        leb128::read_signed(self.bytes, &mut self.pos, 64)
            .map_err(|e| self.map_leb128(e, start))
    }

    fn map_leb128(&self, err: leb128::Leb128Error, start: usize) -> DecodeError {
        match err {
            leb128::Leb128Error::Truncated => DecodeError::UnexpectedEof {
                offset: self.offset(),
            },
            leb128::Leb128Error::Overflow { bits } => DecodeError::InvalidInt {
                bits,
                offset: start,
            },
        }
    }

    /// Reads a fixed-width little-endian word (the version field, f32
    /// immediates).
    pub(crate) fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        let offset = self.offset();
        let bytes = self.read_bytes(4)?;
        let array: [u8; 4] = bytes
            .try_into()
            .map_err(|_| DecodeError::UnexpectedEof { offset })?;
        Ok(u32::from_le_bytes(array))
    }

    pub(crate) fn read_u64_le(&mut self) -> Result<u64, DecodeError> {
        let offset = self.offset();
        let bytes = self.read_bytes(8)?;
        let array: [u8; 8] = bytes
            .try_into()
            .map_err(|_| DecodeError::UnexpectedEof { offset })?;
        Ok(u64::from_le_bytes(array))
    }

    /// Reads a length-prefixed UTF-8 name.
    pub(crate) fn read_name(&mut self) -> Result<String, DecodeError> {
        let len = self.read_var_u32()?;
        let offset = self.offset();
        let bytes = self.read_bytes(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    pub(crate) fn read_value_type(&mut self) -> Result<ValueType, DecodeError> {
        let offset = self.offset();
        let byte = self.read_byte()?;
        ValueType::from_byte(byte).ok_or(DecodeError::InvalidValueType { byte, offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_byte_advances() {
        let mut r = Reader::new(&[0x01, 0x02]);
        assert_eq!(r.read_byte().unwrap(), 0x01);
        assert_eq!(r.offset(), 1);
        assert_eq!(r.read_byte().unwrap(), 0x02);
        assert!(r.is_empty());
    }

    #[test]
    fn test_read_byte_past_end() {
        let mut r = Reader::new(&[]);
        assert_eq!(
            r.read_byte(),
            Err(DecodeError::UnexpectedEof { offset: 0 })
        );
    }

    #[test]
    fn test_sub_reader_offsets_are_absolute() {
        let mut r = Reader::new(&[0xAA, 0xBB, 0xCC, 0xDD]);
        r.read_byte().unwrap();
        let mut sub = r.sub_reader(2).unwrap();
        assert_eq!(sub.offset(), 1);
        sub.read_byte().unwrap();
        assert_eq!(sub.offset(), 2);
        assert_eq!(
            sub.read_bytes(5),
            Err(DecodeError::UnexpectedEof { offset: 3 })
        );
        assert_eq!(r.offset(), 3);
    }

    #[test]
    fn test_sub_reader_too_long() {
        let mut r = Reader::new(&[0x00, 0x01]);
        assert_eq!(
            r.sub_reader(3),
            Err(DecodeError::UnexpectedEof { offset: 2 })
        );
    }

    #[test]
    fn test_var_u32_overlong_rejected() {
        // Six bytes for a 32-bit value is one past the ceiling.
        let mut r = Reader::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00]);
        assert_eq!(
            r.read_var_u32(),
            Err(DecodeError::InvalidInt { bits: 32, offset: 0 })
        );
    }

    #[test]
    fn test_var_u32_truncated() {
        let mut r = Reader::new(&[0x80, 0x80]);
        assert_eq!(
            r.read_var_u32(),
            Err(DecodeError::UnexpectedEof { offset: 2 })
        );
    }

    #[test]
    fn test_read_name() {
        let mut r = Reader::new(&[0x02, b'h', b'i', 0xFF]);
        assert_eq!(r.read_name().unwrap(), "hi");
        assert_eq!(r.offset(), 3);
    }

    #[test]
    fn test_read_name_bad_utf8() {
        let mut r = Reader::new(&[0x02, 0xC3, 0x28]);
        assert_eq!(r.read_name(), Err(DecodeError::InvalidUtf8 { offset: 1 }));
    }

    #[test]
    fn test_read_u64_le() {
        let bytes = 1.0f64.to_le_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_u64_le().unwrap(), 1.0f64.to_bits());
    }
}
