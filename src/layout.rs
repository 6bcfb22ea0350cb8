//! Packet layout engine: keeps one request/response packet structurally valid.
//!
//! A layout is always `Header, Size, Command, Data..., Checksum` laid out on
//! contiguous bytes. Every accepted mutation ends in a single [`recompute`]
//! pass that reflows Data offsets, derives `Size` and `Checksum`, re-renders
//! the template string and refreshes the variable list. Rejected mutations
//! return an [`EditError`] and leave the layout untouched.
//!
//! ```
//! use packet_designer::layout::{FieldEdit, LayoutConfig, PacketLayout};
//!
//! let mut layout = PacketLayout::from_template("[0xFF, 0xFF, 0x02, 0x04, 0xFC]", &[], LayoutConfig::default());
//! let id = layout.add_data_field();
//! layout.set_field_value(&id, FieldEdit::Value("0x01".into())).unwrap();
//! assert_eq!(layout.size_hex(), "0x03");
//! assert_eq!(layout.template(), "[0xFF, 0xFF, 0x03, 0x04, 0x01, 0xFA]");
//! ```
//!
//! [`recompute`]: PacketLayout::recompute

use crate::byte_index::ByteRange;
use crate::checksum::checksum;
use crate::document::PacketField;
use crate::template::{self, TemplateError, Token, CHECKSUM_VARIABLE, HEADER};
use crate::value::{fit_to_width, format_hex_byte, format_hex_bytes, parse_value_bytes, value_width};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Stable field identifier, unique within one layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldId(String);

impl FieldId {
    pub fn new(id: impl Into<String>) -> Self {
        FieldId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldId {
    fn from(s: &str) -> Self {
        FieldId(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Header,
    Size,
    Command,
    Data,
    Checksum,
}

impl FieldRole {
    /// Header, Size, Command and Checksum have fixed positions.
    pub fn is_structural(self) -> bool {
        !matches!(self, FieldRole::Data)
    }

    /// Size and Checksum values are computed, never set.
    pub fn is_auto_calculated(self) -> bool {
        matches!(self, FieldRole::Size | FieldRole::Checksum)
    }
}

impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldRole::Header => "Header",
            FieldRole::Size => "Size",
            FieldRole::Command => "Command",
            FieldRole::Data => "Data",
            FieldRole::Checksum => "Checksum",
        };
        f.write_str(s)
    }
}

/// One positioned region of a packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    pub role: FieldRole,
    pub range: ByteRange,
    /// Value text: `0x..` hex or decimal; may be empty.
    pub value: String,
    /// Placeholder name when the field renders as `${name}`.
    pub variable: Option<String>,
    pub description: String,
}

impl Field {
    pub fn is_variable(&self) -> bool {
        self.variable.is_some()
    }

    pub fn byte_offset(&self) -> usize {
        self.range.start()
    }

    pub fn byte_length(&self) -> usize {
        self.range.len()
    }
}

/// Named placeholder in a request template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub default_value: String,
    /// Byte offset of the first field bound to this variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

impl Variable {
    pub fn new(name: impl Into<String>, default_value: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            description: String::new(),
            default_value: default_value.into(),
            position: None,
        }
    }
}

/// How the two header bytes are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderStyle {
    /// Two one-byte Header fields.
    #[default]
    Split,
    /// One two-byte Header field.
    Combined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutConfig {
    pub header: HeaderStyle,
}

/// Edit applied by [`PacketLayout::set_field_value`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEdit {
    Value(String),
    Name(String),
    Description(String),
}

/// Refused mutation. The layout is unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("unknown field: {0}")]
    UnknownField(FieldId),
    #[error("{role} field {id} is fixed and cannot be removed or moved")]
    Structural { id: FieldId, role: FieldRole },
    #[error("{0} value cannot be edited")]
    ReadOnlyValue(FieldRole),
    #[error("{0} field width is fixed")]
    FixedWidth(FieldRole),
    #[error("field width must be at least 1 byte")]
    ZeroWidth,
    #[error("{role} field cannot be bound to a variable")]
    NotBindable { role: FieldRole },
    #[error("variable name {0:?} is reserved")]
    ReservedVariable(String),
    #[error("variable name must not be empty")]
    EmptyVariable,
    #[error("variable name {0:?} cannot appear in a template")]
    InvalidVariable(String),
}

/// Why a layout is not valid.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("required fields missing: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("packet too long: size {0} does not fit in one byte")]
    SizeOverflow(usize),
}

/// Structurally valid field list for one packet plus its derived values.
#[derive(Debug, Clone)]
pub struct PacketLayout {
    config: LayoutConfig,
    header: Vec<Field>,
    size: Field,
    command: Field,
    data: Vec<Field>,
    checksum: Field,
    variables: Vec<Variable>,
    template: String,
    bytes: Vec<u8>,
    /// Error from construction; cleared by the first accepted mutation.
    init_error: Option<LayoutError>,
    size_error: Option<LayoutError>,
    next_seq: u64,
    /// Ids of removed fields; never handed out again.
    retired: HashSet<FieldId>,
}

impl PacketLayout {
    /// Default skeleton: Header, Size, Command, Checksum.
    pub fn new(config: LayoutConfig) -> Self {
        let mut layout = PacketLayout::skeleton(config);
        layout.recompute();
        layout
    }

    fn skeleton(config: LayoutConfig) -> Self {
        let placeholder = |role: FieldRole| Field {
            id: FieldId::new(String::new()),
            name: role.to_string(),
            role,
            range: ByteRange::single(0),
            value: String::new(),
            variable: None,
            description: String::new(),
        };
        let mut layout = PacketLayout {
            config,
            header: Vec::new(),
            size: placeholder(FieldRole::Size),
            command: placeholder(FieldRole::Command),
            data: Vec::new(),
            checksum: placeholder(FieldRole::Checksum),
            variables: Vec::new(),
            template: String::new(),
            bytes: Vec::new(),
            init_error: None,
            size_error: None,
            next_seq: 0,
            retired: HashSet::new(),
        };
        layout.header = match config.header {
            HeaderStyle::Split => vec![
                layout.header_field(ByteRange::single(0), "0xFF", "Fixed header (first byte)"),
                layout.header_field(ByteRange::single(1), "0xFF", "Fixed header (second byte)"),
            ],
            HeaderStyle::Combined => vec![layout.header_field(
                ByteRange::new(0, HEADER.len()),
                &format_hex_bytes(&HEADER),
                "Fixed header",
            )],
        };
        layout.size.id = layout.fresh_id();
        layout.size.value = "0x02".to_string();
        layout.size.description = "Bytes that follow (Command + Data + Checksum)".to_string();
        layout.command.id = layout.fresh_id();
        layout.command.description = "Command code".to_string();
        layout.checksum.id = layout.fresh_id();
        layout.checksum.value = "0x00".to_string();
        layout.checksum.description = "Checksum for packet validation".to_string();
        layout
    }

    fn header_field(&mut self, range: ByteRange, value: &str, description: &str) -> Field {
        Field {
            id: self.fresh_id(),
            name: FieldRole::Header.to_string(),
            role: FieldRole::Header,
            range,
            value: value.to_string(),
            variable: None,
            description: description.to_string(),
        }
    }

    /// Build a layout from a template string. `variables` supplies default
    /// values and descriptions for `${name}` tokens. On a parse failure the
    /// default skeleton is returned with the reason in [`error`](Self::error).
    pub fn from_template(source: &str, variables: &[Variable], config: LayoutConfig) -> Self {
        match template::parse_template(source) {
            Ok(tokens) => PacketLayout::from_tokens(&tokens, variables, config),
            Err(e) => {
                log::warn!("packet template rejected, using default layout: {}", e);
                let mut layout = PacketLayout::new(config);
                layout.init_error = Some(e.into());
                layout
            }
        }
    }

    fn from_tokens(tokens: &[Token], variables: &[Variable], config: LayoutConfig) -> Self {
        let mut layout = PacketLayout::skeleton(config);
        layout.variables = variables.to_vec();
        let default_for = |name: &str| -> String {
            variables
                .iter()
                .find(|v| v.name == name)
                .map(|v| v.default_value.clone())
                .filter(|v| parse_value_bytes(v).is_ok())
                .unwrap_or_else(|| "0x00".to_string())
        };

        if let Token::Placeholder(name) = &tokens[2] {
            layout.size.variable = Some(name.clone());
        }
        match &tokens[3] {
            Token::Byte(b) => layout.command.value = format_hex_byte(*b),
            Token::Placeholder(name) => {
                layout.command.value = default_for(name);
                layout.command.variable = Some(name.clone());
            }
        }

        let data_tokens = if tokens.len() > template::MIN_TOKENS {
            &tokens[template::MIN_TOKENS..tokens.len() - 1]
        } else {
            &[]
        };
        let mut cursor = HEADER.len() + 2;
        for (i, token) in data_tokens.iter().enumerate() {
            let field = match token {
                Token::Byte(b) => Field {
                    id: layout.fresh_id(),
                    name: format!("Data {}", i + 1),
                    role: FieldRole::Data,
                    range: ByteRange::single(cursor),
                    value: format_hex_byte(*b),
                    variable: None,
                    description: String::new(),
                },
                Token::Placeholder(name) => {
                    let value = default_for(name);
                    let description = variables
                        .iter()
                        .find(|v| &v.name == name && !v.description.is_empty())
                        .map(|v| v.description.clone())
                        .unwrap_or_else(|| format!("Variable {}", name));
                    Field {
                        id: layout.fresh_id(),
                        name: name.clone(),
                        role: FieldRole::Data,
                        range: ByteRange::new(cursor, value_width(&value)),
                        value,
                        variable: Some(name.clone()),
                        description,
                    }
                }
            };
            cursor += field.range.len();
            layout.data.push(field);
        }

        if tokens.len() > template::MIN_TOKENS {
            if let Some(Token::Placeholder(name)) = tokens.last() {
                if name == CHECKSUM_VARIABLE {
                    layout.checksum.variable = Some(name.clone());
                } else {
                    log::warn!("${{{}}} in the checksum slot is replaced by the computed checksum", name);
                }
            }
        }
        layout.recompute();
        layout
    }

    /// Build a layout from a document's field table (response packets).
    /// Structural fields are found by name and position; when any is
    /// missing the default skeleton is returned with the reason recorded.
    pub fn from_packet_fields(fields: &[PacketField], command_code: &str, config: LayoutConfig) -> Self {
        let parsed: Vec<(Option<ByteRange>, &PacketField)> = fields
            .iter()
            .map(|f| {
                let range = f.byte_index.parse::<ByteRange>().map_err(|e| {
                    log::warn!("field {:?}: {}", f.name, e);
                    e
                });
                (range.ok(), f)
            })
            .collect();
        let at = |name: &str, start: usize| {
            parsed
                .iter()
                .position(|(r, f)| f.name == name && r.map(|r| r.start()) == Some(start))
        };

        let combined = at("Header", 0).filter(|&i| parsed[i].0.map(|r| r.len()) == Some(HEADER.len()));
        let (header_idx, style) = match combined {
            Some(i) => (vec![Some(i)], HeaderStyle::Combined),
            None => (vec![at("Header", 0), at("Header", 1)], HeaderStyle::Split),
        };
        let size_idx = at("Size", HEADER.len());
        let command_idx = at("Command", HEADER.len() + 1);
        let checksum_idx = parsed.iter().position(|(_, f)| f.name == "Checksum");

        let mut missing = Vec::new();
        if header_idx.iter().any(Option::is_none) {
            missing.push("Header");
        }
        if size_idx.is_none() {
            missing.push("Size");
        }
        if command_idx.is_none() {
            missing.push("Command");
        }
        if checksum_idx.is_none() {
            missing.push("Checksum");
        }
        if !missing.is_empty() {
            log::warn!("response fields incomplete ({}), using default layout", missing.join(", "));
            let mut layout = PacketLayout::new(config);
            layout.init_error = Some(LayoutError::MissingFields(missing));
            if !command_code.is_empty() {
                layout.command.value = command_code.to_string();
                layout.recompute();
            }
            return layout;
        }

        let structural: Vec<usize> = header_idx
            .iter()
            .flatten()
            .copied()
            .chain(size_idx)
            .chain(command_idx)
            .chain(checksum_idx)
            .collect();
        let adopt = |(range, f): &(Option<ByteRange>, &PacketField), role: FieldRole| Field {
            id: FieldId::new(f.id.clone()),
            name: f.name.clone(),
            role,
            range: range.unwrap_or_else(|| ByteRange::single(0)),
            value: f.value.clone().unwrap_or_default(),
            variable: None,
            description: f.description.clone(),
        };

        let mut layout = PacketLayout::skeleton(LayoutConfig { header: style });
        layout.header = header_idx
            .iter()
            .flatten()
            .map(|&i| {
                let mut h = adopt(&parsed[i], FieldRole::Header);
                match style {
                    HeaderStyle::Split => {
                        h.value = format_hex_byte(HEADER[0]);
                        h.range = ByteRange::single(h.range.start());
                    }
                    HeaderStyle::Combined => h.value = format_hex_bytes(&HEADER),
                }
                h
            })
            .collect();
        if let (Some(s), Some(c), Some(k)) = (size_idx, command_idx, checksum_idx) {
            layout.size = adopt(&parsed[s], FieldRole::Size);
            layout.command = adopt(&parsed[c], FieldRole::Command);
            layout.checksum = adopt(&parsed[k], FieldRole::Checksum);
            for field in [&mut layout.size, &mut layout.command, &mut layout.checksum] {
                field.range = field.range.resized(1);
            }
        }

        let mut data: Vec<(usize, Field)> = parsed
            .iter()
            .enumerate()
            .filter(|(i, _)| !structural.contains(i))
            .map(|(_, p)| (p.0.map(|r| r.start()).unwrap_or(usize::MAX), adopt(p, FieldRole::Data)))
            .collect();
        data.sort_by_key(|(start, _)| *start);
        layout.data = data.into_iter().map(|(_, f)| f).collect();
        layout.reflow();
        if !command_code.is_empty() {
            layout.command.value = command_code.to_string();
        }
        layout.recompute();
        layout
    }

    /// Field table for a document, in byte order.
    pub fn to_packet_fields(&self) -> Vec<PacketField> {
        self.fields()
            .map(|f| PacketField {
                id: f.id.to_string(),
                name: f.name.clone(),
                byte_index: f.range.to_string(),
                value: if f.value.is_empty() { None } else { Some(f.value.clone()) },
                description: f.description.clone(),
            })
            .collect()
    }

    // ==================== Accessors ====================

    pub fn config(&self) -> LayoutConfig {
        self.config
    }

    /// All fields in byte order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.header
            .iter()
            .chain(std::iter::once(&self.size))
            .chain(std::iter::once(&self.command))
            .chain(self.data.iter())
            .chain(std::iter::once(&self.checksum))
    }

    /// Fields sorted by byte offset, ties in layout order.
    pub fn ordered_fields(&self) -> Vec<&Field> {
        let mut fields: Vec<&Field> = self.fields().collect();
        fields.sort_by_key(|f| f.byte_offset());
        fields
    }

    fn fields_mut(&mut self) -> impl Iterator<Item = &mut Field> {
        self.header
            .iter_mut()
            .chain(std::iter::once(&mut self.size))
            .chain(std::iter::once(&mut self.command))
            .chain(self.data.iter_mut())
            .chain(std::iter::once(&mut self.checksum))
    }

    pub fn data_fields(&self) -> &[Field] {
        &self.data
    }

    pub fn field(&self, id: &FieldId) -> Option<&Field> {
        self.fields().find(|f| &f.id == id)
    }

    pub fn size_field(&self) -> &Field {
        &self.size
    }

    pub fn command_field(&self) -> &Field {
        &self.command
    }

    pub fn checksum_field(&self) -> &Field {
        &self.checksum
    }

    pub fn is_structural(&self, id: &FieldId) -> bool {
        self.field(id).map(|f| f.role.is_structural()).unwrap_or(false)
    }

    pub fn is_auto_calculated(&self, id: &FieldId) -> bool {
        self.field(id).map(|f| f.role.is_auto_calculated()).unwrap_or(false)
    }

    /// Rendered template, e.g. `[0xFF, 0xFF, 0x03, 0x65, ${power}, ${checksum}]`.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// User variables referenced by the template (never `checksum`).
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Concrete packet bytes, variables at their current values.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn total_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn size_hex(&self) -> &str {
        &self.size.value
    }

    pub fn checksum_hex(&self) -> &str {
        &self.checksum.value
    }

    pub fn is_valid(&self) -> bool {
        self.error().is_none()
    }

    pub fn error(&self) -> Option<&LayoutError> {
        self.init_error.as_ref().or(self.size_error.as_ref())
    }

    /// Checksum the template would carry if every variable were `0`.
    pub fn preview_checksum_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(self.bytes.len());
        for f in self.fields() {
            match f.role {
                FieldRole::Checksum => bytes.push(0),
                FieldRole::Data | FieldRole::Command if f.is_variable() => {
                    bytes.extend(std::iter::repeat(0).take(f.range.len()))
                }
                _ => bytes.extend(resolve_field_bytes(f)),
            }
        }
        format_hex_byte(checksum(&bytes))
    }

    // ==================== Mutations ====================

    /// Append a Data field right before Checksum and return its id.
    pub fn add_data_field(&mut self) -> FieldId {
        let id = self.fresh_id();
        let start = self.checksum.range.start();
        self.data.push(Field {
            id: id.clone(),
            name: String::new(),
            role: FieldRole::Data,
            range: ByteRange::single(start),
            value: String::new(),
            variable: None,
            description: String::new(),
        });
        self.accept();
        id
    }

    /// Remove a Data field. Structural fields are refused.
    pub fn remove_data_field(&mut self, id: &FieldId) -> Result<Field, EditError> {
        let idx = self.data_index(id)?;
        let removed = self.data.remove(idx);
        self.retired.insert(removed.id.clone());
        self.accept();
        Ok(removed)
    }

    /// Move Data field `moved` to the position `target` holds among Data
    /// fields. Header, Size and Command offsets never change.
    pub fn reorder_data_field(&mut self, moved: &FieldId, target: &FieldId) -> Result<(), EditError> {
        let from = self.data_index(moved)?;
        let to = self.data_index(target)?;
        let field = self.data.remove(from);
        self.data.insert(to, field);
        self.reflow();
        self.accept();
        Ok(())
    }

    /// Edit a field's value, name or description. Values of Header, Size
    /// and Checksum are refused.
    pub fn set_field_value(&mut self, id: &FieldId, edit: FieldEdit) -> Result<(), EditError> {
        let role = self.field(id).map(|f| f.role).ok_or_else(|| EditError::UnknownField(id.clone()))?;
        if matches!(edit, FieldEdit::Value(_)) && matches!(role, FieldRole::Header | FieldRole::Size | FieldRole::Checksum) {
            log::debug!("refused value edit on {} field {}", role, id);
            return Err(EditError::ReadOnlyValue(role));
        }
        if let Some(field) = self.fields_mut().find(|f| &f.id == id) {
            match edit {
                FieldEdit::Value(v) => field.value = v,
                FieldEdit::Name(n) => field.name = n,
                FieldEdit::Description(d) => field.description = d,
            }
        }
        self.accept();
        Ok(())
    }

    /// Resize a Data field; later fields and Checksum shift accordingly.
    pub fn set_field_width(&mut self, id: &FieldId, width: usize) -> Result<(), EditError> {
        if let Some(f) = self.field(id).filter(|f| f.role.is_structural()) {
            return Err(EditError::FixedWidth(f.role));
        }
        let idx = self.data_index(id)?;
        if width == 0 {
            return Err(EditError::ZeroWidth);
        }
        let field = &mut self.data[idx];
        field.range = field.range.resized(width);
        self.reflow();
        self.accept();
        Ok(())
    }

    /// Render a Data or Command field as `${name}`.
    pub fn bind_variable(&mut self, id: &FieldId, name: &str) -> Result<(), EditError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EditError::EmptyVariable);
        }
        if name == CHECKSUM_VARIABLE {
            return Err(EditError::ReservedVariable(name.to_string()));
        }
        if !template::is_variable_name(name) {
            return Err(EditError::InvalidVariable(name.to_string()));
        }
        let field = self.bindable_mut(id)?;
        field.variable = Some(name.to_string());
        if field.role == FieldRole::Data && field.name.is_empty() {
            field.name = name.to_string();
        }
        self.accept();
        Ok(())
    }

    /// Turn a bound field back into a literal with its current value.
    pub fn unbind_variable(&mut self, id: &FieldId) -> Result<(), EditError> {
        self.bindable_mut(id)?.variable = None;
        self.accept();
        Ok(())
    }

    /// Keep the Command field mirroring the owning command's code.
    pub fn sync_command_code(&mut self, code: &str) {
        if self.command.value != code {
            self.command.value = code.to_string();
            self.accept();
        }
    }

    fn bindable_mut(&mut self, id: &FieldId) -> Result<&mut Field, EditError> {
        let field = self
            .fields_mut()
            .find(|f| &f.id == id)
            .ok_or_else(|| EditError::UnknownField(id.clone()))?;
        match field.role {
            FieldRole::Data | FieldRole::Command => Ok(field),
            role => Err(EditError::NotBindable { role }),
        }
    }

    fn data_index(&self, id: &FieldId) -> Result<usize, EditError> {
        if let Some(i) = self.data.iter().position(|f| &f.id == id) {
            return Ok(i);
        }
        match self.field(id) {
            Some(f) => {
                log::debug!("refused structural edit on {} field {}", f.role, id);
                Err(EditError::Structural { id: id.clone(), role: f.role })
            }
            None => Err(EditError::UnknownField(id.clone())),
        }
    }

    fn fresh_id(&mut self) -> FieldId {
        loop {
            self.next_seq += 1;
            let id = FieldId(format!("field-{}", self.next_seq));
            if self.field(&id).is_none() && !self.retired.contains(&id) {
                return id;
            }
        }
    }

    fn accept(&mut self) {
        self.init_error = None;
        self.recompute();
    }

    // ==================== Recompute ====================

    /// Assign contiguous offsets in current field order.
    fn reflow(&mut self) {
        let mut cursor = 0;
        for field in self.fields_mut() {
            field.range = field.range.moved_to(cursor);
            cursor += field.range.len();
        }
    }

    /// Restore every layout invariant in one pass.
    pub fn recompute(&mut self) {
        self.data.sort_by_key(|f| f.range.start());
        self.reflow();

        let size = self.command.range.len()
            + self.data.iter().map(|f| f.range.len()).sum::<usize>()
            + self.checksum.range.len();
        self.size_error = if size > u8::MAX as usize {
            log::warn!("packet size {} does not fit in the Size byte", size);
            Some(LayoutError::SizeOverflow(size))
        } else {
            None
        };
        self.size.value = format_hex_byte(size as u8);

        let mut bytes = Vec::with_capacity(HEADER.len() + 1 + size);
        for field in self.fields() {
            if field.role == FieldRole::Checksum {
                bytes.push(0);
            } else {
                bytes.extend(resolve_field_bytes(field));
            }
        }
        let sum = checksum(&bytes);
        if let Some(last) = bytes.last_mut() {
            *last = sum;
        }
        self.checksum.value = format_hex_byte(sum);
        self.bytes = bytes;

        let mut tokens = Vec::new();
        let mut offset = 0;
        let mut fresh_vars: Vec<Variable> = Vec::new();
        for field in self.fields() {
            match &field.variable {
                Some(name) => {
                    tokens.push(Token::Placeholder(name.clone()));
                    if name != CHECKSUM_VARIABLE && !fresh_vars.iter().any(|v| &v.name == name) {
                        let previous = self.variables.iter().find(|v| &v.name == name);
                        let default_value = if field.value.is_empty() {
                            previous.map(|v| v.default_value.clone()).unwrap_or_else(|| "0x00".to_string())
                        } else {
                            field.value.clone()
                        };
                        fresh_vars.push(Variable {
                            name: name.clone(),
                            description: previous.map(|v| v.description.clone()).unwrap_or_default(),
                            default_value,
                            position: Some(field.range.start()),
                        });
                    }
                }
                None => tokens.extend(
                    self.bytes[offset..offset + field.range.len()]
                        .iter()
                        .map(|&b| Token::Byte(b)),
                ),
            }
            offset += field.range.len();
        }
        self.template = template::render(&tokens);
        self.variables = fresh_vars;
        log::debug!(
            "layout recomputed: size={} checksum={} template={}",
            self.size.value,
            self.checksum.value,
            self.template
        );
    }
}

impl Default for PacketLayout {
    fn default() -> Self {
        PacketLayout::new(LayoutConfig::default())
    }
}

/// Bytes a field contributes to the packet. Empty values are zeros;
/// unparseable values degrade to zeros with a warning.
fn resolve_field_bytes(field: &Field) -> Vec<u8> {
    let width = field.range.len();
    if field.value.trim().is_empty() {
        return vec![0; width];
    }
    match parse_value_bytes(&field.value) {
        Ok(raw) => {
            let (bytes, truncated) = fit_to_width(&raw, width);
            if truncated {
                log::warn!(
                    "field {} ({:?}): value {} wider than {} byte(s), keeping low bytes",
                    field.id,
                    field.name,
                    field.value,
                    width
                );
            }
            bytes
        }
        Err(e) => {
            log::warn!("field {} ({:?}): {}, counted as 0", field.id, field.name, e);
            vec![0; width]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_skeleton_is_consistent() {
        let layout = PacketLayout::default();
        let roles: Vec<_> = layout.fields().map(|f| f.role).collect();
        assert_eq!(
            roles,
            vec![FieldRole::Header, FieldRole::Header, FieldRole::Size, FieldRole::Command, FieldRole::Checksum]
        );
        assert_eq!(layout.size_hex(), "0x02");
        assert_eq!(layout.template(), "[0xFF, 0xFF, 0x02, 0x00, 0xFE]");
        assert!(layout.is_valid());
    }

    #[test]
    fn combined_header_is_one_two_byte_field() {
        let layout = PacketLayout::new(LayoutConfig { header: HeaderStyle::Combined });
        let header: Vec<_> = layout.fields().filter(|f| f.role == FieldRole::Header).collect();
        assert_eq!(header.len(), 1);
        assert_eq!(header[0].range.to_string(), "0-1");
        assert_eq!(layout.size_field().byte_offset(), 2);
        assert_eq!(layout.template(), "[0xFF, 0xFF, 0x02, 0x00, 0xFE]");
    }

    #[test]
    fn fresh_ids_skip_existing() {
        let fields = vec![
            PacketField::new("field-1", "Header", "0", Some("0xFF")),
            PacketField::new("field-2", "Header", "1", Some("0xFF")),
            PacketField::new("field-3", "Size", "2", None),
            PacketField::new("field-4", "Command", "3", None),
            PacketField::new("field-5", "Checksum", "4", None),
        ];
        let mut layout = PacketLayout::from_packet_fields(&fields, "0x04", LayoutConfig::default());
        let id = layout.add_data_field();
        assert!(!["field-1", "field-2", "field-3", "field-4", "field-5"].contains(&id.as_str()));
    }

    #[test]
    fn removed_ids_are_not_reused() {
        let fields = vec![
            PacketField::new("field-1", "Header", "0", Some("0xFF")),
            PacketField::new("field-2", "Header", "1", Some("0xFF")),
            PacketField::new("field-3", "Size", "2", None),
            PacketField::new("field-4", "Command", "3", None),
            PacketField::new("field-6", "Flag", "4", Some("0x01")),
            PacketField::new("field-5", "Checksum", "5", None),
        ];
        let mut layout = PacketLayout::from_packet_fields(&fields, "0x04", LayoutConfig::default());
        layout.remove_data_field(&FieldId::from("field-6")).unwrap();
        let id = layout.add_data_field();
        assert_ne!(id.as_str(), "field-6");
        let again = layout.add_data_field();
        assert_ne!(again.as_str(), "field-6");
        assert_ne!(again, id);
    }

    #[test]
    fn oversized_packet_is_flagged() {
        let mut layout = PacketLayout::default();
        let id = layout.add_data_field();
        layout.set_field_width(&id, 300).unwrap();
        assert!(matches!(layout.error(), Some(LayoutError::SizeOverflow(302))));
        layout.set_field_width(&id, 2).unwrap();
        assert!(layout.is_valid());
    }
}
