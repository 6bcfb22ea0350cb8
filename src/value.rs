//! Field value text (`"0x04"`, `"0x1234"`, `"7"`) to big-endian bytes.

use byteorder::{BigEndian, ByteOrder};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("not a byte value: {0:?}")]
    Invalid(String),
}

/// Bytes written by a value, most significant first.
///
/// Hex literals keep their written width (`"0x0001"` is two bytes); decimal
/// literals use the fewest bytes that hold the number.
pub fn parse_value_bytes(text: &str) -> Result<Vec<u8>, ValueError> {
    let s = text.trim();
    let invalid = || ValueError::Invalid(text.to_string());
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex.is_empty() || !hex.bytes().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let padded = if hex.len() % 2 == 1 {
            format!("0{}", hex)
        } else {
            hex.to_string()
        };
        return padded
            .as_bytes()
            .chunks(2)
            .map(|pair| {
                std::str::from_utf8(pair)
                    .ok()
                    .and_then(|p| u8::from_str_radix(p, 16).ok())
                    .ok_or_else(invalid)
            })
            .collect();
    }
    let n: u64 = s.parse().map_err(|_| invalid())?;
    let mut buf = [0u8; 8];
    BigEndian::write_u64(&mut buf, n);
    let first = buf.iter().position(|&b| b != 0).unwrap_or(buf.len() - 1);
    Ok(buf[first..].to_vec())
}

/// Parse a value that must fit in one byte (template tokens, command codes).
pub fn parse_byte(text: &str) -> Result<u8, ValueError> {
    let bytes = parse_value_bytes(text)?;
    let (last, rest) = bytes
        .split_last()
        .ok_or_else(|| ValueError::Invalid(text.to_string()))?;
    if rest.iter().any(|&b| b != 0) {
        return Err(ValueError::Invalid(text.to_string()));
    }
    Ok(*last)
}

/// Number of bytes a value occupies when written; at least one.
pub fn value_width(text: &str) -> usize {
    parse_value_bytes(text).map(|b| b.len().max(1)).unwrap_or(1)
}

/// Fit `bytes` into exactly `width` bytes: shorter input is left-padded with
/// zeros, longer input keeps its least significant bytes. The flag is true
/// when bytes were dropped.
pub fn fit_to_width(bytes: &[u8], width: usize) -> (Vec<u8>, bool) {
    if bytes.len() <= width {
        let mut out = vec![0u8; width - bytes.len()];
        out.extend_from_slice(bytes);
        (out, false)
    } else {
        let dropped = &bytes[..bytes.len() - width];
        (bytes[bytes.len() - width..].to_vec(), dropped.iter().any(|&b| b != 0))
    }
}

/// `0xNN`, upper-case, zero-padded.
pub fn format_hex_byte(b: u8) -> String {
    format!("0x{:02X}", b)
}

/// `0xNNNN...` over several bytes, upper-case.
pub fn format_hex_bytes(bytes: &[u8]) -> String {
    let digits: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
    format!("0x{}", digits)
}
