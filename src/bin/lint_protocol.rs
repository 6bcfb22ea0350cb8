//! Lint protocol documents: request templates, Size/Checksum bytes, command
//! codes, response tables and variable lists.
//!
//! Usage:
//!   lint_protocol [OPTIONS] [PROTOCOL.json ...]
//!   lint_protocol < protocol.json
//!
//! Options:
//!   --fix, -f    Rewrite files through the layout engine before linting.
//!                With stdin: print the fixed document to stdout.
//!   --human, -H  Human-readable output
//!
//! If no files are given, reads from stdin (lint only unless --fix).

use packet_designer::lint::{lint, lint_fix, LintMessage, LintRule, Severity};
use packet_designer::Protocol;
use std::io::{self, Read, Write};
use std::path::Path;

fn rule_id(rule: LintRule) -> &'static str {
    match rule {
        LintRule::TemplateSyntax => "template-syntax",
        LintRule::SizeMismatch => "size-mismatch",
        LintRule::ChecksumMismatch => "checksum-mismatch",
        LintRule::CommandCodeMismatch => "command-code-mismatch",
        LintRule::ResponseLayout => "response-layout",
        LintRule::DuplicateCommandCode => "duplicate-command-code",
        LintRule::UndocumentedVariable => "undocumented-variable",
    }
}

fn print_message(path: &str, m: &LintMessage, style: OutputStyle) {
    let severity_str = match m.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    };
    match style {
        OutputStyle::Compact => {
            println!(
                "{}: {}: {}: {} [{}]",
                path,
                m.location,
                severity_str,
                m.message,
                rule_id(m.rule)
            );
        }
        OutputStyle::Human => {
            println!("  {} ({}): {}", path, m.location, m.message);
            println!("    rule: {}", rule_id(m.rule));
        }
    }
}

#[derive(Clone, Copy)]
enum OutputStyle {
    Compact,
    Human,
}

#[derive(Default)]
struct Totals {
    errors: usize,
    warnings: usize,
}

impl Totals {
    fn report(&mut self, path: &str, messages: &[LintMessage], style: OutputStyle) -> bool {
        for m in messages {
            match m.severity {
                Severity::Error => self.errors += 1,
                Severity::Warning => self.warnings += 1,
            }
            print_message(path, m, style);
        }
        messages.iter().any(|m| m.severity == Severity::Error)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let fix = if let Some(pos) = args.iter().position(|a| a == "--fix" || a == "-f") {
        args.remove(pos);
        true
    } else {
        false
    };
    let style = if let Some(pos) = args.iter().position(|a| a == "--human" || a == "-H") {
        args.remove(pos);
        OutputStyle::Human
    } else {
        OutputStyle::Compact
    };

    let mut has_error = false;
    let mut totals = Totals::default();

    if args.is_empty() {
        let mut src = String::new();
        io::stdin().read_to_string(&mut src)?;
        let protocol = Protocol::from_json(&src)?;
        if fix {
            let fixed = lint_fix(&protocol);
            io::stdout().write_all(fixed.to_json_pretty()?.as_bytes())?;
            return Ok(());
        }
        has_error = totals.report("<stdin>", &lint(&protocol), style);
    } else {
        for path in &args {
            let path = Path::new(path);
            let display_path = path.display().to_string();
            let protocol = match Protocol::load(path) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("{}: {}", display_path, e);
                    has_error = true;
                    continue;
                }
            };
            let protocol = if fix {
                let fixed = lint_fix(&protocol);
                if fixed != protocol {
                    if let Err(e) = fixed.save(path) {
                        eprintln!("{}: write failed: {}", display_path, e);
                        has_error = true;
                        continue;
                    }
                    eprintln!("{}: fixed", display_path);
                }
                fixed
            } else {
                protocol
            };
            if totals.report(&display_path, &lint(&protocol), style) {
                has_error = true;
            }
        }
    }

    if totals.errors > 0 || totals.warnings > 0 {
        eprintln!("lint: {} error(s), {} warning(s)", totals.errors, totals.warnings);
    }
    if has_error {
        std::process::exit(1);
    }
    Ok(())
}
