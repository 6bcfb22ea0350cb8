//! Template toolkit: fill placeholders, list variables, check raw packets and
//! decode responses against a command's field table.

use crate::byte_index::ByteRange;
use crate::checksum::{checksum, is_valid_sum};
use crate::document::{Command, Conversion};
use crate::layout::Variable;
use crate::template::{parse_tokens, render, TemplateError, Token, CHECKSUM_VARIABLE, HEADER};
use crate::value::{format_hex_byte, format_hex_bytes, parse_byte, parse_value_bytes};
use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;
use std::collections::HashMap;

/// Smallest complete packet: header, size, command, checksum.
pub const MIN_PACKET_LEN: usize = 5;

/// A response must reach the command byte to be analyzed.
pub const MIN_RESPONSE_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketCheckError {
    #[error("invalid hex byte {0:?}")]
    InvalidHex(String),
    #[error("packet too short: at least {min} bytes required, found {found}")]
    TooShort { found: usize, min: usize },
    #[error("invalid header {0:#04X} {1:#04X}: must be 0xFF 0xFF")]
    BadHeader(u8, u8),
    #[error("size field ({size}) does not match packet length ({len})")]
    SizeMismatch { size: u8, len: usize },
    #[error("checksum invalid")]
    BadChecksum,
    #[error("command code mismatch: expected {expected}, found {actual}")]
    CommandMismatch { expected: String, actual: String },
}

/// Substitute `values` into `template`. Values wider than a byte expand into
/// one token per byte, most significant first. Placeholders without a value
/// stay as they are, except `${checksum}`, which always receives the checksum
/// of the filled packet.
pub fn fill_template(template: &str, values: &HashMap<String, String>) -> Result<String, TemplateError> {
    let mut out = Vec::new();
    for token in parse_tokens(template)? {
        match token {
            Token::Placeholder(name) if name != CHECKSUM_VARIABLE => match values.get(&name) {
                Some(value) => {
                    let bytes = parse_value_bytes(value).map_err(|_| TemplateError::BadValue {
                        name: name.clone(),
                        value: value.clone(),
                    })?;
                    out.extend(bytes.into_iter().map(Token::Byte));
                }
                None => out.push(Token::Placeholder(name)),
            },
            other => out.push(other),
        }
    }

    let is_checksum = |t: &Token| t.placeholder() == Some(CHECKSUM_VARIABLE);
    if out.iter().any(is_checksum) {
        let resolved: Vec<u8> = out.iter().map(Token::resolved).collect();
        let sum = checksum(&resolved);
        for t in out.iter_mut() {
            if is_checksum(t) {
                *t = Token::Byte(sum);
            }
        }
    }
    Ok(render(&out))
}

/// Unique placeholders in template order. `position` is the token index.
pub fn extract_variables(template: &str) -> Result<Vec<Variable>, TemplateError> {
    let mut vars: Vec<Variable> = Vec::new();
    for (index, token) in parse_tokens(template)?.iter().enumerate() {
        let Some(name) = token.placeholder() else {
            continue;
        };
        if vars.iter().any(|v| v.name == name) {
            continue;
        }
        let default = if name == CHECKSUM_VARIABLE { "auto" } else { "0x00" };
        let mut var = Variable::new(name, default);
        var.position = Some(index);
        vars.push(var);
    }
    Ok(vars)
}

/// Template bytes with every placeholder read as `0`.
pub fn parse_packet_bytes(template: &str) -> Result<Vec<u8>, TemplateError> {
    Ok(parse_tokens(template)?.iter().map(Token::resolved).collect())
}

/// Parse a hex dump such as `"FF FF 02 04 FC"` or `"FFFF0204FC"`.
pub fn parse_hex_dump(hex: &str) -> Result<Vec<u8>, PacketCheckError> {
    let digits: Vec<char> = hex.chars().filter(|c| !c.is_whitespace()).collect();
    digits
        .chunks(2)
        .map(|pair| {
            let s: String = pair.iter().collect();
            u8::from_str_radix(&s, 16).map_err(|_| PacketCheckError::InvalidHex(s))
        })
        .collect()
}

/// `FF FF 02 04 FC`.
pub fn to_hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Check a complete packet given as a hex dump and return its bytes.
pub fn validate_packet(hex: &str) -> Result<Vec<u8>, PacketCheckError> {
    let bytes = parse_hex_dump(hex)?;
    if bytes.len() < MIN_PACKET_LEN {
        return Err(PacketCheckError::TooShort {
            found: bytes.len(),
            min: MIN_PACKET_LEN,
        });
    }
    if bytes[..2] != HEADER {
        return Err(PacketCheckError::BadHeader(bytes[0], bytes[1]));
    }
    let size = bytes[2];
    if bytes.len() != size as usize + 3 {
        return Err(PacketCheckError::SizeMismatch { size, len: bytes.len() });
    }
    if !is_valid_sum(&bytes) {
        return Err(PacketCheckError::BadChecksum);
    }
    Ok(bytes)
}

/// Raw value of one response field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Byte(u8),
    /// Two bytes, high byte first.
    Word(u16),
    Bytes(Vec<u8>),
}

impl FieldValue {
    fn from_bytes(bytes: &[u8]) -> Self {
        match bytes {
            [b] => FieldValue::Byte(*b),
            [_, _] => FieldValue::Word(BigEndian::read_u16(bytes)),
            _ => FieldValue::Bytes(bytes.to_vec()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Byte(b) => Some(f64::from(*b)),
            FieldValue::Word(w) => Some(f64::from(*w)),
            FieldValue::Bytes(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedField {
    pub name: String,
    pub byte_index: String,
    pub raw: FieldValue,
    pub hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseAnalysis {
    pub command: String,
    pub code: String,
    pub fields: Vec<AnalyzedField>,
    pub bytes: Vec<u8>,
    pub checksum_valid: bool,
}

/// Decode a response hex dump with `command`'s response field table.
///
/// A bad checksum does not fail the analysis; it is reported in
/// [`ResponseAnalysis::checksum_valid`].
pub fn analyze_response(hex: &str, command: &Command) -> Result<ResponseAnalysis, PacketCheckError> {
    let bytes = parse_hex_dump(hex)?;
    if bytes.len() < MIN_RESPONSE_LEN {
        return Err(PacketCheckError::TooShort {
            found: bytes.len(),
            min: MIN_RESPONSE_LEN,
        });
    }
    let actual = bytes[3];
    if parse_byte(&command.code).ok() != Some(actual) {
        return Err(PacketCheckError::CommandMismatch {
            expected: command.code.clone(),
            actual: format_hex_byte(actual),
        });
    }

    let mut fields = Vec::new();
    for def in &command.response.fields {
        let range: ByteRange = match def.byte_index.parse() {
            Ok(r) => r,
            Err(e) => {
                log::warn!("skipping response field {:?}: {}", def.name, e);
                continue;
            }
        };
        let slice: Vec<u8> = bytes.iter().skip(range.start()).take(range.len()).copied().collect();
        let raw = FieldValue::from_bytes(&slice);
        let conversion = find_conversion(&command.response.conversion, &def.name);
        let converted = conversion.and_then(|c| {
            let x = raw.as_f64()?;
            let y = apply_formula(&c.formula, x);
            if y.is_none() {
                log::warn!("unsupported conversion formula {:?}", c.formula);
            }
            y
        });
        fields.push(AnalyzedField {
            name: def.name.clone(),
            byte_index: def.byte_index.clone(),
            hex: format_hex_bytes(&slice),
            raw,
            converted,
            unit: conversion.and_then(|c| c.unit.clone()),
        });
    }

    Ok(ResponseAnalysis {
        command: command.name.clone(),
        code: command.code.clone(),
        fields,
        checksum_valid: is_valid_sum(&bytes),
        bytes,
    })
}

/// First conversion naming `field` exactly, or naming part of it when the
/// conversion is not tied to a `Raw` value.
fn find_conversion<'a>(conversions: &'a [Conversion], field: &str) -> Option<&'a Conversion> {
    conversions
        .iter()
        .find(|c| c.field == field || (field.contains(c.field.as_str()) && !c.field.contains("Raw")))
}

/// Evaluate a linear formula `<name> <op> <number>` with `op` one of
/// `* / + -`. A bare name is the identity. Anything else is unsupported.
pub fn apply_formula(formula: &str, x: f64) -> Option<f64> {
    let parts: Vec<&str> = formula.split_whitespace().collect();
    if parts.len() >= 3 {
        let op = parts[parts.len() - 2];
        if let Ok(k) = parts[parts.len() - 1].parse::<f64>() {
            return match op {
                "*" => Some(x * k),
                "/" if k != 0.0 => Some(x / k),
                "+" => Some(x + k),
                "-" => Some(x - k),
                _ => None,
            };
        }
    }
    if formula.contains(|c: char| "*/+-()".contains(c)) {
        return None;
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formulas() {
        assert_eq!(apply_formula("Raw Position * 0.05", 200.0), Some(10.0));
        assert_eq!(apply_formula("Voltage / 100.0", 1234.0), Some(12.34));
        assert_eq!(apply_formula("Temp - 40", 50.0), Some(10.0));
        assert_eq!(apply_formula("Level", 3.0), Some(3.0));
        assert_eq!(apply_formula("(Raw * 2) / 3", 3.0), None);
        assert_eq!(apply_formula("x / 0", 3.0), None);
    }

    #[test]
    fn hex_dump_tolerates_spacing() {
        assert_eq!(parse_hex_dump("FF FF  02 04FC").unwrap(), vec![0xFF, 0xFF, 0x02, 0x04, 0xFC]);
        assert_eq!(to_hex_dump(&[0xFF, 0x0A]), "FF 0A");
        assert!(matches!(parse_hex_dump("FG"), Err(PacketCheckError::InvalidHex(_))));
    }

    #[test]
    fn conversion_matching() {
        let convs = vec![
            Conversion { field: "Position".into(), formula: "Raw Position * 0.05".into(), unit: None },
            Conversion { field: "Raw Speed".into(), formula: "Raw Speed * 2".into(), unit: None },
        ];
        assert!(find_conversion(&convs, "Raw Position L").is_some());
        assert!(find_conversion(&convs, "Raw Speed").is_some());
        assert!(find_conversion(&convs, "Raw Speed X").is_none());
    }

    #[test]
    fn field_values_by_width() {
        assert_eq!(FieldValue::from_bytes(&[7]), FieldValue::Byte(7));
        assert_eq!(FieldValue::from_bytes(&[0x01, 0x02]), FieldValue::Word(0x0102));
        assert_eq!(FieldValue::from_bytes(&[1, 2, 3]), FieldValue::Bytes(vec![1, 2, 3]));
    }
}
