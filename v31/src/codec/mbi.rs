use bytes::BufMut;

use crate::error::CodecError;

/// Largest value that fits in four length bytes.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

const MAX_LENGTH_BYTES: usize = 4;

pub const fn encoded_len(value: usize) -> usize {
    if value < 128 {
        1
    } else if value < 16_384 {
        2
    } else if value < 2_097_152 {
        3
    } else {
        4
    }
}

pub fn write_remaining_length<B: BufMut>(value: usize, out: &mut B) -> Result<(), CodecError> {
    if value > MAX_REMAINING_LENGTH {
        return Err(CodecError::PacketTooLarge(value));
    }

    let mut remaining = value;
    loop {
        let mut digit = (remaining % 128) as u8;
        remaining >>= 7;
        if remaining > 0 {
            digit |= 0x80;
        }
        out.put_u8(digit);
        if remaining == 0 {
            return Ok(());
        }
    }
}

/// Returns the value and the number of bytes it used, or `None` when the
/// input ends before the last length byte.
pub fn read_remaining_length(input: &[u8]) -> Result<Option<(usize, usize)>, CodecError> {
    let mut value = 0usize;
    let mut multiplier = 1usize;

    for (i, digit) in input.iter().take(MAX_LENGTH_BYTES).enumerate() {
        value += (*digit as usize & 0x7f) * multiplier;
        if digit & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
        multiplier *= 128;
    }

    if input.len() >= MAX_LENGTH_BYTES {
        Err(CodecError::MalformedLength)
    } else {
        Ok(None)
    }
}
