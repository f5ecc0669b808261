//! LEB128 variable-length integer encoding and decoding.
//!
//! Every integer in the binary module format outside the fixed header is
//! encoded as LEB128: 7 payload bits per byte, LSB-first, with the high bit
//! of each byte flagging continuation. Writers always emit the minimal
//! encoding. Readers accept overlong encodings only up to the byte-count
//! ceiling for the target width (`ceil(bits / 7)`) and reject any encoding
//! carrying significant bits beyond that width.

use thiserror::Error;

/// Errors produced when decoding a LEB128 integer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leb128Error {
    #[error("Integer encoding overflows the {bits}-bit target width")]
    Overflow { bits: u32 },

    #[error("Truncated integer encoding")]
    Truncated,
}

/// Read an unsigned LEB128 integer of the given bit width (32 or 64).
///
/// `pos` is advanced past the consumed bytes on success and is left at the
/// offending byte on failure.
pub fn read_unsigned(bytes: &[u8], pos: &mut usize, bits: u32) -> Result<u64, Leb128Error> {
    let max_bytes = bits.div_ceil(7) as usize;
    let mut result: u64 = 0;

    for i in 0..max_bytes {
        let byte = *bytes.get(*pos).ok_or(Leb128Error::Truncated)?;
        let payload = u64::from(byte & 0x7f);

        if i + 1 == max_bytes {
            // Bits this final byte is allowed to contribute.
            let allowed = bits - 7 * i as u32;
            if allowed < 7 && (payload >> allowed) != 0 {
                return Err(Leb128Error::Overflow { bits });
            }
        }

        result |= payload << (7 * i);
        *pos += 1;

        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }

    // Continuation bit still set after the byte-count ceiling.
    Err(Leb128Error::Overflow { bits })
}

/// Read a signed LEB128 integer of the given bit width (32, 33, or 64).
///
/// Width 33 covers block-type encodings, where a non-negative value is a
/// type index and the single-byte negative values alias value types.
pub fn read_signed(bytes: &[u8], pos: &mut usize, bits: u32) -> Result<i64, Leb128Error> {
    let max_bytes = bits.div_ceil(7) as usize;
    let mut result: u64 = 0;

    for i in 0..max_bytes {
        let byte = *bytes.get(*pos).ok_or(Leb128Error::Truncated)?;
        let payload = u64::from(byte & 0x7f);

        if i + 1 == max_bytes {
            // The bits above the target width must replicate the sign bit.
            let allowed = bits - 7 * i as u32;
            if allowed < 7 {
                let upper = payload >> (allowed - 1);
                let mask = (1u64 << (8 - allowed)) - 1;
                if upper != 0 && upper != mask {
                    return Err(Leb128Error::Overflow { bits });
                }
            }
        }

        result |= payload << (7 * i);
        *pos += 1;

        if byte & 0x80 == 0 {
            let shift = 7 * (i as u32 + 1);
            if shift < 64 && byte & 0x40 != 0 {
                result |= !0u64 << shift;
            }
            return Ok(result as i64);
        }
    }

    Err(Leb128Error::Overflow { bits })
}

/// Write an unsigned LEB128 integer in minimal form.
pub fn write_unsigned(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            out.push(byte | 0x80);
        } else {
            out.push(byte);
            return;
        }
    }
}

/// Write a signed LEB128 integer in minimal form.
pub fn write_signed(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}
