//! String coding used on the wire.
//!
//! Encoding walks UTF-16 code units and writes each one as a 1 to 3 byte
//! sequence. Surrogate pairs are not combined, so a character above U+FFFF
//! takes six bytes. Decoding accepts exactly what the encoder produces and
//! rejects 4-byte sequences. Changing either side changes what goes on the
//! wire for such strings.

use bytes::BufMut;

use crate::error::CodecError;

/// Number of bytes `write_utf8` produces for `input`.
pub fn utf8_length(input: &str) -> usize {
    input
        .encode_utf16()
        .map(|unit| match unit {
            0..=0x7f => 1,
            0x80..=0x7ff => 2,
            _ => 3,
        })
        .sum()
}

pub fn write_utf8<B: BufMut>(input: &str, out: &mut B) {
    for unit in input.encode_utf16() {
        write_unit(unit, out);
    }
}

fn write_unit<B: BufMut>(unit: u16, out: &mut B) {
    match unit {
        0..=0x7f => out.put_u8(unit as u8),
        0x80..=0x7ff => {
            out.put_u8((unit >> 6) as u8 & 0x1f | 0xc0);
            out.put_u8(unit as u8 & 0x3f | 0x80);
        }
        _ => {
            out.put_u8((unit >> 12) as u8 & 0x0f | 0xe0);
            out.put_u8((unit >> 6) as u8 & 0x3f | 0x80);
            out.put_u8(unit as u8 & 0x3f | 0x80);
        }
    }
}

pub fn encode(input: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(utf8_length(input));
    write_utf8(input, &mut out);
    out
}

fn malformed(bytes: &[u8]) -> CodecError {
    CodecError::MalformedUtf(bytes.iter().take(3).copied().collect())
}

pub fn decode(input: &[u8]) -> Result<String, CodecError> {
    let mut units = Vec::with_capacity(input.len());
    let mut pos = 0;

    while pos < input.len() {
        let lead = input[pos];
        if lead < 0x80 {
            units.push(lead as u16);
            pos += 1;
            continue;
        }

        let width = match lead {
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            _ => return Err(malformed(&input[pos..])),
        };
        let end = pos + width;
        if end > input.len() {
            return Err(malformed(&input[pos..]));
        }

        let seq = &input[pos..end];
        if seq[1..].iter().any(|b| b & 0xc0 != 0x80) {
            return Err(malformed(seq));
        }

        let unit = if width == 2 {
            (lead as u16 & 0x1f) << 6 | (seq[1] as u16 & 0x3f)
        } else {
            (lead as u16 & 0x0f) << 12 | (seq[1] as u16 & 0x3f) << 6 | (seq[2] as u16 & 0x3f)
        };
        units.push(unit);
        pos = end;
    }

    char::decode_utf16(units.iter().copied())
        .map(|c| {
            c.map_err(|err| {
                let mut bytes = Vec::with_capacity(3);
                write_unit(err.unpaired_surrogate(), &mut bytes);
                malformed(&bytes)
            })
        })
        .collect()
}
