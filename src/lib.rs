//! # packet-designer — packet layout and checksum engine
//!
//! Models the request and response packets of a simple serial protocol and
//! keeps them structurally valid while they are edited.
//!
//! ## Packet structure
//!
//! ```text
//! [0xFF, 0xFF, Size, Command, Data..., Checksum]
//! ```
//!
//! - **Header**: two fixed `0xFF` bytes
//! - **Size**: number of bytes after it (Command + Data + Checksum)
//! - **Command**: the owning command's code
//! - **Data**: zero or more user fields, each one or more bytes
//! - **Checksum**: `(256 - sum % 256) % 256` over every preceding byte
//!
//! Request packets are written as templates, `[0xFF, 0xFF, 0x03, 0x65, ${power}, ${checksum}]`,
//! where `${name}` is filled in at send time.
//!
//! ## Modules
//!
//! - [`layout`]: the editing engine ([`PacketLayout`])
//! - [`template`]: template grammar and rendering
//! - [`packet`]: fill, validate and analyze packets
//! - [`document`], [`store`], [`history`]: the protocol document with undo/redo
//! - [`lint`]: consistency checks over a whole document
//!
//! ## Usage
//!
//! See `tests/layout.rs` and `tests/integration.rs` for full examples.

pub mod byte_index;
pub mod checksum;
pub mod document;
pub mod history;
pub mod layout;
pub mod lint;
pub mod packet;
pub mod store;
pub mod template;
pub mod value;

pub use byte_index::{ByteRange, ByteRangeError, Notation};
pub use checksum::{checksum, is_valid_sum};
pub use document::{Command, CommandCategory, DocumentError, PacketField, Protocol};
pub use history::History;
pub use layout::{
    EditError, Field, FieldEdit, FieldId, FieldRole, HeaderStyle, LayoutConfig, LayoutError,
    PacketLayout, Variable,
};
pub use packet::{
    analyze_response, extract_variables, fill_template, parse_packet_bytes, validate_packet,
    PacketCheckError, ResponseAnalysis,
};
pub use store::{ProtocolAction, ProtocolStore};
pub use template::{parse_template, TemplateError, Token};
