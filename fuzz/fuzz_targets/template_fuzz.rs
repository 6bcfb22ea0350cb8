//! Template fuzz target: feed arbitrary text to the template parser and the
//! layout engine. Neither may panic; a rejected template yields the default
//! layout with an error, and any accepted layout must checksum to zero.
//! Build with: cargo fuzz run template_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    let _ = packet_designer::template::parse_tokens(s);
    let layout = packet_designer::PacketLayout::from_template(s, &[], Default::default());
    if layout.is_valid() {
        assert!(packet_designer::is_valid_sum(layout.bytes()));
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run template_fuzz");
}
