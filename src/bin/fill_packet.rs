//! Fill a packet template and print the resulting packet.
//!
//! Usage:
//!   fill_packet [OPTIONS] TEMPLATE [NAME=VALUE ...]
//!
//! Example:
//!   fill_packet '[0xFF, 0xFF, 0x03, 0x65, ${power}, ${checksum}]' power=0x01
//!
//! Options:
//!   --check, -c  Validate the filled packet (header, size, checksum)
//!   --vars       List the template's variables instead of filling it
//!
//! Set `RUST_LOG=debug` for engine logs.

use anyhow::{bail, Context};
use packet_designer::packet::{extract_variables, fill_template, parse_packet_bytes, to_hex_dump, validate_packet};
use std::collections::HashMap;

fn take_flag(args: &mut Vec<String>, long: &str, short: Option<&str>) -> bool {
    match args.iter().position(|a| a == long || Some(a.as_str()) == short) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let check = take_flag(&mut args, "--check", Some("-c"));
    let list_vars = take_flag(&mut args, "--vars", None);

    if args.is_empty() {
        bail!("usage: fill_packet [--check] [--vars] TEMPLATE [NAME=VALUE ...]");
    }
    let template = args.remove(0);

    if list_vars {
        for v in extract_variables(&template)? {
            println!("{}\t{}\tposition {}", v.name, v.default_value, v.position.unwrap_or(0));
        }
        return Ok(());
    }

    let mut values = HashMap::new();
    for arg in &args {
        let (name, value) = arg
            .split_once('=')
            .with_context(|| format!("expected NAME=VALUE, got {:?}", arg))?;
        values.insert(name.trim().to_string(), value.trim().to_string());
    }

    let filled = fill_template(&template, &values)?;
    let bytes = parse_packet_bytes(&filled)?;
    let dump = to_hex_dump(&bytes);
    println!("{}", filled);
    println!("{}", dump);

    if check {
        match validate_packet(&dump) {
            Ok(_) => eprintln!("packet: valid"),
            Err(e) => {
                eprintln!("packet: {}", e);
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
