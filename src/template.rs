//! Parse and render packet templates using PEST.
//!
//! A template is a bracketed, comma-separated list of byte tokens:
//! `[0xFF, 0xFF, 0x03, 0x65, ${power}, ${checksum}]`. Each token is a hex
//! byte, a decimal byte, or a `${name}` placeholder filled in later.

use crate::value::{format_hex_byte, parse_byte};
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::fmt;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct TemplateParser;

/// Fixed packet header.
pub const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Header, Size and Command must be present in every template.
pub const MIN_TOKENS: usize = 4;

/// Placeholder owned by the Checksum field; never a user variable.
pub const CHECKSUM_VARIABLE: &str = "checksum";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("packet must start with '[' and end with ']'")]
    MissingBrackets,
    #[error("malformed packet: {0}")]
    Syntax(String),
    #[error("token {0:?} does not fit in one byte")]
    ByteOutOfRange(String),
    #[error("packet too short: at least {MIN_TOKENS} bytes required, found {0}")]
    TooShort(usize),
    #[error("invalid header {0}, {1}: must be 0xFF, 0xFF")]
    BadHeader(String, String),
    #[error("value {value:?} for ${{{name}}} is not a byte value")]
    BadValue { name: String, value: String },
}

/// One template token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Byte(u8),
    Placeholder(String),
}

impl Token {
    /// Byte value with placeholders read as `0`.
    pub fn resolved(&self) -> u8 {
        match self {
            Token::Byte(b) => *b,
            Token::Placeholder(_) => 0,
        }
    }

    pub fn placeholder(&self) -> Option<&str> {
        match self {
            Token::Placeholder(name) => Some(name),
            Token::Byte(_) => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Byte(b) => f.write_str(&format_hex_byte(*b)),
            Token::Placeholder(name) => write!(f, "${{{}}}", name),
        }
    }
}

/// Tokenize a template without any structural checks.
pub fn parse_tokens(source: &str) -> Result<Vec<Token>, TemplateError> {
    let trimmed = source.trim();
    if !trimmed.starts_with('[') || !trimmed.ends_with(']') {
        return Err(TemplateError::MissingBrackets);
    }
    let pairs = TemplateParser::parse(Rule::template, trimmed)
        .map_err(|e| TemplateError::Syntax(e.to_string()))?;
    let template = pairs
        .into_iter()
        .next()
        .ok_or_else(|| TemplateError::Syntax("empty parse".to_string()))?;

    let mut tokens = Vec::new();
    for inner in template.into_inner() {
        match inner.as_rule() {
            Rule::placeholder => {
                let name = inner
                    .into_inner()
                    .next()
                    .map(|p| p.as_str().to_string())
                    .ok_or_else(|| TemplateError::Syntax("placeholder without name".to_string()))?;
                tokens.push(Token::Placeholder(name));
            }
            Rule::hex_literal | Rule::dec_literal => {
                let text = inner.as_str();
                let b = parse_byte(text).map_err(|_| TemplateError::ByteOutOfRange(text.to_string()))?;
                tokens.push(Token::Byte(b));
            }
            _ => {}
        }
    }
    Ok(tokens)
}

/// Tokenize a request template and check its fixed prefix: at least
/// [`MIN_TOKENS`] tokens, header `0xFF, 0xFF` (placeholders count as `0`).
pub fn parse_template(source: &str) -> Result<Vec<Token>, TemplateError> {
    let tokens = parse_tokens(source)?;
    if tokens.len() < MIN_TOKENS {
        return Err(TemplateError::TooShort(tokens.len()));
    }
    if tokens[0].resolved() != HEADER[0] || tokens[1].resolved() != HEADER[1] {
        return Err(TemplateError::BadHeader(
            tokens[0].to_string(),
            tokens[1].to_string(),
        ));
    }
    Ok(tokens)
}

/// True when `${name}` parses back as a single placeholder.
pub fn is_variable_name(name: &str) -> bool {
    let candidate = format!("${{{}}}", name);
    TemplateParser::parse(Rule::placeholder, &candidate)
        .map(|mut pairs| pairs.next().map(|p| p.as_str().len()) == Some(candidate.len()))
        .unwrap_or(false)
}

/// Render tokens back to `[a, b, ...]`.
pub fn render(tokens: &[Token]) -> String {
    let parts: Vec<String> = tokens.iter().map(Token::to_string).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_names_follow_placeholder_grammar() {
        assert!(is_variable_name("power"));
        assert!(is_variable_name("target_type.2"));
        assert!(!is_variable_name(""));
        assert!(!is_variable_name("my var"));
        assert!(!is_variable_name("a}b"));
        assert!(!is_variable_name("a,b"));
        assert!(!is_variable_name("[x]"));
    }

    #[test]
    fn tokenizes_mixed_template() {
        let tokens = parse_tokens("[0xFF, 0xff, 3, ${power}, ${checksum}]").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Byte(0xFF),
                Token::Byte(0xFF),
                Token::Byte(3),
                Token::Placeholder("power".to_string()),
                Token::Placeholder("checksum".to_string()),
            ]
        );
    }

    #[test]
    fn render_normalizes_spelling() {
        let tokens = parse_tokens("[0xff,0XFF,  2,${cmd}]").unwrap();
        assert_eq!(render(&tokens), "[0xFF, 0xFF, 0x02, ${cmd}]");
    }

    #[test]
    fn empty_list_is_syntactically_fine() {
        assert!(parse_tokens("[]").unwrap().is_empty());
        assert_eq!(parse_template("[]"), Err(TemplateError::TooShort(0)));
    }

    #[test]
    fn structural_failures() {
        assert_eq!(
            parse_template("0xFF, 0xFF, 0x02, 0x04"),
            Err(TemplateError::MissingBrackets)
        );
        assert!(matches!(
            parse_template("[0xFF, 0xFF, 0x02, 0x04, 0x1FF]"),
            Err(TemplateError::ByteOutOfRange(_))
        ));
        assert!(matches!(
            parse_template("[0xFF, 0xFF, 0x02, zz]"),
            Err(TemplateError::Syntax(_))
        ));
        assert_eq!(
            parse_template("[0xFE, 0xFF, 0x02, 0x04]"),
            Err(TemplateError::BadHeader("0xFE".to_string(), "0xFF".to_string()))
        );
        assert!(matches!(
            parse_template("[${h}, 0xFF, 0x02, 0x04]"),
            Err(TemplateError::BadHeader(_, _))
        ));
    }
}
