//! Protocol document: categories of commands with their request templates
//! and response field tables, as exported to JSON.

use crate::layout::{LayoutConfig, PacketLayout, Variable};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Timestamp used when the clock cannot be formatted.
pub const DEFAULT_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Unknown field: {0}")]
    UnknownField(String),
    #[error("Unknown history entry: {0}")]
    UnknownHistoryEntry(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    pub id: String,
    pub name: String,
    pub version: String,
    pub base_packet: BasePacket,
    pub categories: Vec<CommandCategory>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub last_modified: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BasePacket {
    pub fields: Vec<PacketField>,
}

/// Row of a field table: `byteIndex` is `"4"`, `"4-5"` or `"4 ~ 5"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketField {
    pub id: String,
    pub name: String,
    pub byte_index: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl PacketField {
    pub fn new(id: &str, name: &str, byte_index: &str, value: Option<&str>) -> Self {
        PacketField {
            id: id.to_string(),
            name: name.to_string(),
            byte_index: byte_index.to_string(),
            value: value.map(str::to_string),
            description: String::new(),
        }
    }

    fn described(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub name: String,
    /// Hex code, e.g. `"0x04"`.
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub request: RequestPacket,
    pub response: ResponsePacket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPacket {
    /// Template, e.g. `[0xFF, 0xFF, 0x02, 0x04, 0xFC]`.
    pub packet: String,
    #[serde(default)]
    pub fields: Vec<NamedValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponsePacket {
    pub fields: Vec<PacketField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversion: Vec<Conversion>,
}

/// Conversion from a raw response value, e.g. `Raw Position * 0.05`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub field: String,
    pub formula: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub timestamp: String,
    pub description: String,
}

/// Random identifier for documents, categories, commands and fields.
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect()
}

/// Current time as RFC 3339.
pub fn now_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| DEFAULT_TIMESTAMP.to_string())
}

impl Command {
    /// New command with a minimal request (no data) and response skeleton.
    pub fn new(name: &str, code: &str) -> Self {
        let mut layout = PacketLayout::default();
        layout.sync_command_code(code);
        Command {
            id: generate_id(),
            name: name.to_string(),
            code: code.to_string(),
            description: String::new(),
            request: RequestPacket {
                packet: layout.template().to_string(),
                fields: vec![NamedValue {
                    name: "Size".to_string(),
                    value: layout.size_hex().to_string(),
                }],
                variables: Vec::new(),
            },
            response: ResponsePacket {
                fields: layout.to_packet_fields(),
                conversion: Vec::new(),
            },
        }
    }

    /// Engine view of the request template, Command synced to `code`.
    pub fn request_layout(&self, config: LayoutConfig) -> PacketLayout {
        let mut layout = PacketLayout::from_template(&self.request.packet, &self.request.variables, config);
        if layout.is_valid() && !layout.command_field().is_variable() {
            layout.sync_command_code(&self.code);
        }
        layout
    }

    /// Engine view of the response field table, Command synced to `code`.
    pub fn response_layout(&self, config: LayoutConfig) -> PacketLayout {
        PacketLayout::from_packet_fields(&self.response.fields, &self.code, config)
    }
}

impl Protocol {
    /// Empty protocol with the default base packet table.
    pub fn new(name: &str, version: &str) -> Self {
        Protocol {
            id: generate_id(),
            name: name.to_string(),
            version: version.to_string(),
            base_packet: BasePacket {
                fields: default_base_fields(),
            },
            categories: Vec::new(),
            history: Vec::new(),
            last_modified: now_timestamp(),
        }
    }

    /// Built-in sample protocol with query and control commands.
    pub fn sample() -> Self {
        let mut protocol = Protocol::new("Packet Communication Protocol", "1.0.0");

        let mut position = Command::new("Get Position Data", "0x04");
        position.description = "Returns position data.".to_string();
        position.response = response_table(
            "0x04",
            &[
                ("Raw Position L", "4-5", "Left position"),
                ("Raw Position R", "6-7", "Right position"),
            ],
            vec![conversion("Position", "Raw Position * 0.05", None)],
        );

        let mut voltage = Command::new("Voltage Data", "0x05");
        voltage.description = "Returns voltage data.".to_string();
        voltage.response = response_table(
            "0x05",
            &[("Voltage", "4-5", "Voltage (high byte first)")],
            vec![conversion("Voltage", "Voltage / 100.0", Some("V"))],
        );

        let mut power = Command::new("On/Off", "0x65");
        power.description = "Turns the device on or off.".to_string();
        power.request.packet = "[0xFF, 0xFF, 0x03, 0x65, ${power}, ${checksum}]".to_string();
        power.request.fields = vec![
            NamedValue {
                name: "Size".to_string(),
                value: "0x03".to_string(),
            },
            NamedValue {
                name: "Data".to_string(),
                value: "Byte 4 = 0x01 (On) or 0x00 (Off)".to_string(),
            },
        ];
        power.request.variables = vec![Variable {
            name: "power".to_string(),
            description: "Power state".to_string(),
            default_value: "0x01".to_string(),
            position: Some(4),
        }];
        power.response = response_table("0x65", &[("On/Off", "4", "Current state (0x00 or 0x01)")], Vec::new());

        let mut weight = Command::new("Weight Data", "0x66");
        weight.description = "Adjusts the weight.".to_string();
        weight.request.packet = "[0xFF, 0xFF, 0x04, 0x66, ${targetType}, ${amount}, ${checksum}]".to_string();
        weight.request.fields[0].value = "0x04".to_string();
        weight.request.variables = vec![
            Variable {
                name: "targetType".to_string(),
                description: "Target (0x01 left, 0x02 right, 0x03 both)".to_string(),
                default_value: "0x02".to_string(),
                position: Some(4),
            },
            Variable {
                name: "amount".to_string(),
                description: "Step (0x01 one unit, 0x02 five units)".to_string(),
                default_value: "0x01".to_string(),
                position: Some(5),
            },
        ];
        weight.response = response_table(
            "0x66",
            &[("Weight", "4", "Current weight"), ("Mode", "5", "Current mode")],
            Vec::new(),
        );

        protocol.categories = vec![
            CommandCategory {
                id: generate_id(),
                name: "Query commands".to_string(),
                description: "Read system state and data".to_string(),
                commands: vec![position, voltage],
            },
            CommandCategory {
                id: generate_id(),
                name: "Control commands".to_string(),
                description: "Control the system".to_string(),
                commands: vec![power, weight],
            },
        ];
        protocol
    }

    pub fn from_json(s: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let text = std::fs::read_to_string(path)?;
        Protocol::from_json(&text)
    }

    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    pub fn category(&self, id: &str) -> Option<&CommandCategory> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn category_mut(&mut self, id: &str) -> Result<&mut CommandCategory, DocumentError> {
        self.categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| DocumentError::UnknownCategory(id.to_string()))
    }

    /// All commands, in category order.
    pub fn commands(&self) -> impl Iterator<Item = (&CommandCategory, &Command)> {
        self.categories
            .iter()
            .flat_map(|c| c.commands.iter().map(move |cmd| (c, cmd)))
    }

    pub fn find_command(&self, code: &str) -> Option<&Command> {
        self.commands()
            .map(|(_, cmd)| cmd)
            .find(|cmd| cmd.code.eq_ignore_ascii_case(code))
    }
}

fn default_base_fields() -> Vec<PacketField> {
    vec![
        PacketField::new(&generate_id(), "Header", "0", Some("0xFF")).described("First byte, fixed"),
        PacketField::new(&generate_id(), "Header", "1", Some("0xFF")).described("Second byte, fixed"),
        PacketField::new(&generate_id(), "Size", "2", None).described("Bytes that follow (Command + Data + Checksum)"),
        PacketField::new(&generate_id(), "Command", "3", None).described("Command code"),
        PacketField::new(&generate_id(), "Data", "4", None).described("Command-specific data (may be empty)"),
        PacketField::new(&generate_id(), "Checksum", "5", None).described("Checksum for packet validation"),
    ]
}

/// Response table for `code` with the given data rows, Size and Checksum
/// derived by the layout engine.
fn response_table(code: &str, data: &[(&str, &str, &str)], conversion: Vec<Conversion>) -> ResponsePacket {
    let mut fields = vec![
        PacketField::new(&generate_id(), "Header", "0", Some("0xFF")),
        PacketField::new(&generate_id(), "Header", "1", Some("0xFF")),
        PacketField::new(&generate_id(), "Size", "2", None),
        PacketField::new(&generate_id(), "Command", "3", Some(code)),
    ];
    let mut next = 4;
    for (name, byte_index, description) in data {
        fields.push(PacketField::new(&generate_id(), name, byte_index, None).described(description));
        next += byte_index.parse::<crate::byte_index::ByteRange>().map(|r| r.len()).unwrap_or(1);
    }
    fields.push(PacketField::new(&generate_id(), "Checksum", &next.to_string(), None));
    let layout = PacketLayout::from_packet_fields(&fields, code, LayoutConfig::default());
    ResponsePacket {
        fields: layout.to_packet_fields(),
        conversion,
    }
}

fn conversion(field: &str, formula: &str, unit: Option<&str>) -> Conversion {
    Conversion {
        field: field.to_string(),
        formula: formula.to_string(),
        unit: unit.map(str::to_string),
    }
}
