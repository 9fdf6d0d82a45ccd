//! Unsigned LEB128 varint encoding, used by `PostingList`'s delta-compressed
//! serialization (spec §4.1). Grounded on the teacher's
//! `index/text_encoding.rs` varint codec.

use crate::error::{IndexError, Result};

pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Returns `(value, bytes_consumed)`.
pub fn decode_varint(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    let mut pos = 0usize;
    loop {
        let byte = *bytes.get(pos).ok_or_else(|| IndexError::CorruptPosting {
            path: None,
            reason: "truncated varint".into(),
        })?;
        pos += 1;
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
        if shift >= 64 {
            return Err(IndexError::CorruptPosting { path: None, reason: "varint overflow".into() });
        }
    }
    Ok((value, pos))
}
