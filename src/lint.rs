//! Linter for protocol documents: checks every command's request template
//! and response table against the layout rules.
//!
//! ## Rules
//!
//! - **Template syntax**: request templates must parse, with at least 4 bytes and a `0xFF, 0xFF` header.
//! - **Size**: a literal Size byte must equal the byte count of Command + Data + Checksum.
//! - **Checksum**: a literal checksum must make the packet sum to 0 (mod 256).
//! - **Command code**: a literal Command byte must equal the command's code.
//! - **Response layout**: response tables need Header, Size, Command and Checksum, with derived values up to date.
//! - **Duplicate code**: command codes should be unique in a document.
//! - **Undocumented variable**: every `${name}` should have an entry in the request's variable list.
//!
//! Run the linter via the `lint_protocol` binary: `cargo run --bin lint_protocol -- protocol.json`.
//! Exit code 1 if any error-level findings. `lint_fix` repairs what the layout
//! engine can derive.

use crate::checksum::checksum;
use crate::document::{Command, NamedValue, Protocol};
use crate::layout::{LayoutConfig, PacketLayout};
use crate::template::{parse_template, Token, CHECKSUM_VARIABLE};
use crate::value::{format_hex_byte, parse_byte};
use std::collections::HashMap;

/// Severity of a lint finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Identifies which rule produced the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintRule {
    /// Request template does not parse.
    TemplateSyntax,
    /// Size byte disagrees with the packet length, or does not fit.
    SizeMismatch,
    /// Literal checksum is wrong or missing.
    ChecksumMismatch,
    /// Command byte disagrees with the command code, or the code is not a byte.
    CommandCodeMismatch,
    /// Response table is incomplete or stale.
    ResponseLayout,
    /// Two commands share a code.
    DuplicateCommandCode,
    /// Placeholder without a variable entry.
    UndocumentedVariable,
}

/// A single lint message with location (`category / command`).
#[derive(Debug, Clone)]
pub struct LintMessage {
    pub location: String,
    pub rule: LintRule,
    pub severity: Severity,
    pub message: String,
}

/// Run all lint rules on a document. Messages follow document order.
pub fn lint(protocol: &Protocol) -> Vec<LintMessage> {
    let config = LayoutConfig::default();
    let mut out = Vec::new();
    let mut seen_codes: HashMap<u8, String> = HashMap::new();

    for (category, command) in protocol.commands() {
        let location = format!("{} / {}", category.name, command.name);
        let mut push = |rule: LintRule, severity: Severity, message: String| {
            out.push(LintMessage {
                location: location.clone(),
                rule,
                severity,
                message,
            });
        };

        let code = parse_byte(&command.code).ok();
        match code {
            None => push(
                LintRule::CommandCodeMismatch,
                Severity::Error,
                format!("command code {:?} is not a byte value", command.code),
            ),
            Some(c) => {
                if let Some(first) = seen_codes.get(&c) {
                    push(
                        LintRule::DuplicateCommandCode,
                        Severity::Warning,
                        format!("code {} already used by {}", format_hex_byte(c), first),
                    );
                } else {
                    seen_codes.insert(c, location.clone());
                }
            }
        }

        match parse_template(&command.request.packet) {
            Err(e) => push(LintRule::TemplateSyntax, Severity::Error, e.to_string()),
            Ok(tokens) => {
                if let (Token::Byte(b), Some(c)) = (&tokens[3], code) {
                    if *b != c {
                        push(
                            LintRule::CommandCodeMismatch,
                            Severity::Error,
                            format!(
                                "command byte {} differs from code {}",
                                format_hex_byte(*b),
                                command.code
                            ),
                        );
                    }
                }

                let layout = PacketLayout::from_template(&command.request.packet, &command.request.variables, config);
                if let Some(e) = layout.error() {
                    push(LintRule::SizeMismatch, Severity::Error, e.to_string());
                } else if let Token::Byte(s) = &tokens[2] {
                    if format_hex_byte(*s) != layout.size_hex() {
                        push(
                            LintRule::SizeMismatch,
                            Severity::Error,
                            format!("size byte {} should be {}", format_hex_byte(*s), layout.size_hex()),
                        );
                    }
                }

                if let Some(message) = literal_checksum_problem(&tokens) {
                    push(LintRule::ChecksumMismatch, Severity::Error, message);
                }

                let mut reported: Vec<&str> = Vec::new();
                for name in tokens.iter().filter_map(Token::placeholder) {
                    if name == CHECKSUM_VARIABLE || reported.contains(&name) {
                        continue;
                    }
                    if !command.request.variables.iter().any(|v| v.name == name) {
                        push(
                            LintRule::UndocumentedVariable,
                            Severity::Warning,
                            format!("${{{}}} has no variable entry", name),
                        );
                        reported.push(name);
                    }
                }
            }
        }

        let response = command.response_layout(config);
        match response.error() {
            Some(e) => push(LintRule::ResponseLayout, Severity::Error, e.to_string()),
            None => {
                if response.to_packet_fields() != command.response.fields {
                    push(
                        LintRule::ResponseLayout,
                        Severity::Warning,
                        "response table is out of date (offsets, Size or Checksum)".to_string(),
                    );
                }
            }
        }
    }

    out
}

/// Checksum problems of a template with no placeholders. Templates with
/// placeholders get their checksum when filled.
fn literal_checksum_problem(tokens: &[Token]) -> Option<String> {
    if tokens.iter().any(|t| t.placeholder().is_some()) {
        return None;
    }
    let bytes: Vec<u8> = tokens.iter().map(Token::resolved).collect();
    let (last, body) = bytes.split_last()?;
    if bytes.len() <= crate::template::MIN_TOKENS {
        return Some("packet has no checksum byte".to_string());
    }
    let expected = checksum(body);
    if *last != expected {
        return Some(format!(
            "checksum {} should be {}",
            format_hex_byte(*last),
            format_hex_byte(expected)
        ));
    }
    None
}

/// Rewrite request templates and response tables through the layout engine:
/// Size, Checksum and Command are re-derived and variable lists rebuilt.
/// Commands whose template does not parse are left untouched.
pub fn lint_fix(protocol: &Protocol) -> Protocol {
    let config = LayoutConfig::default();
    let mut fixed = protocol.clone();
    for category in &mut fixed.categories {
        for command in &mut category.commands {
            fix_command(command, config);
        }
    }
    fixed
}

fn fix_command(command: &mut Command, config: LayoutConfig) {
    if parse_template(&command.request.packet).is_ok() {
        let layout = command.request_layout(config);
        if layout.is_valid() {
            command.request.packet = layout.template().to_string();
            command.request.variables = layout.variables().to_vec();
            match command.request.fields.iter_mut().find(|f| f.name == "Size") {
                Some(size) => size.value = layout.size_hex().to_string(),
                None => command.request.fields.insert(
                    0,
                    NamedValue {
                        name: "Size".to_string(),
                        value: layout.size_hex().to_string(),
                    },
                ),
            }
        } else {
            log::warn!("{}: request layout invalid, not fixed", command.name);
        }
    }

    let response = command.response_layout(config);
    if response.is_valid() {
        command.response.fields = response.to_packet_fields();
    } else {
        log::warn!("{}: response table incomplete, not fixed", command.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::CommandCategory;

    fn single(command: Command) -> Protocol {
        let mut p = Protocol::new("T", "1");
        p.categories.push(CommandCategory {
            id: "c".to_string(),
            name: "Cat".to_string(),
            description: String::new(),
            commands: vec![command],
        });
        p
    }

    fn rules(p: &Protocol) -> Vec<LintRule> {
        lint(p).iter().map(|m| m.rule).collect()
    }

    #[test]
    fn sample_is_clean() {
        let msgs = lint(&Protocol::sample());
        assert!(msgs.is_empty(), "sample document should lint clean: {:?}", msgs);
    }

    #[test]
    fn wrong_size_and_checksum() {
        let mut cmd = Command::new("Q", "0x04");
        cmd.request.packet = "[0xFF, 0xFF, 0x05, 0x04, 0x00]".to_string();
        let r = rules(&single(cmd));
        assert!(r.contains(&LintRule::SizeMismatch));
        assert!(r.contains(&LintRule::ChecksumMismatch));
    }

    #[test]
    fn command_byte_must_match_code() {
        let mut cmd = Command::new("Q", "0x04");
        cmd.request.packet = "[0xFF, 0xFF, 0x02, 0x05, 0xFB]".to_string();
        assert_eq!(rules(&single(cmd)), vec![LintRule::CommandCodeMismatch]);
    }

    #[test]
    fn undocumented_variable_reported_once() {
        let mut cmd = Command::new("Set", "0x65");
        cmd.request.packet = "[0xFF, 0xFF, 0x04, 0x65, ${v}, ${v}, ${checksum}]".to_string();
        let msgs = lint(&single(cmd));
        let undocumented: Vec<_> = msgs.iter().filter(|m| m.rule == LintRule::UndocumentedVariable).collect();
        assert_eq!(undocumented.len(), 1);
        assert_eq!(undocumented[0].location, "Cat / Set");
    }

    #[test]
    fn fix_repairs_request() {
        let mut cmd = Command::new("Q", "0x04");
        cmd.request.packet = "[0xFF, 0xFF, 0x05, 0x03, 0x00]".to_string();
        let fixed = lint_fix(&single(cmd));
        let cmd = &fixed.categories[0].commands[0];
        assert_eq!(cmd.request.packet, "[0xFF, 0xFF, 0x02, 0x04, 0xFC]");
        assert!(lint(&fixed).is_empty());
    }
}
