//! Document store: applies editing actions to a [`Protocol`] and keeps every
//! resulting state in a [`History`].

use crate::document::{
    generate_id, now_timestamp, Command, CommandCategory, DocumentError, HistoryEntry, PacketField, Protocol,
};
use crate::history::History;

/// Partial update of a base packet field; `None` leaves the value as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketFieldPatch {
    pub name: Option<String>,
    pub byte_index: Option<String>,
    pub value: Option<Option<String>>,
    pub description: Option<String>,
}

/// Editing actions on a protocol document.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolAction {
    UpdateProtocolInfo { name: Option<String>, version: Option<String> },
    AddBaseField(PacketField),
    UpdateBaseField { id: String, patch: PacketFieldPatch },
    RemoveBaseField(String),
    AddCategory { name: String, description: String },
    UpdateCategory { id: String, name: Option<String>, description: Option<String> },
    RemoveCategory(String),
    AddCommand { category_id: String, command: Command },
    UpdateCommand { category_id: String, command: Command },
    RemoveCommand { category_id: String, command_id: String },
    Import(Protocol),
}

impl ProtocolAction {
    fn describe(&self) -> String {
        match self {
            ProtocolAction::UpdateProtocolInfo { .. } => "Updated protocol information".to_string(),
            ProtocolAction::AddBaseField(f) => format!("Added base field '{}'", f.name),
            ProtocolAction::UpdateBaseField { id, .. } => format!("Updated base field {}", id),
            ProtocolAction::RemoveBaseField(id) => format!("Removed base field {}", id),
            ProtocolAction::AddCategory { name, .. } => format!("Added category '{}'", name),
            ProtocolAction::UpdateCategory { id, .. } => format!("Updated category {}", id),
            ProtocolAction::RemoveCategory(id) => format!("Removed category {}", id),
            ProtocolAction::AddCommand { command, .. } => format!("Added command '{}'", command.name),
            ProtocolAction::UpdateCommand { command, .. } => format!("Updated command '{}'", command.name),
            ProtocolAction::RemoveCommand { command_id, .. } => format!("Removed command {}", command_id),
            ProtocolAction::Import(p) => format!("Imported protocol '{}'", p.name),
        }
    }
}

/// Current document plus the snapshot log behind it.
#[derive(Debug, Clone)]
pub struct ProtocolStore {
    history: History<Protocol>,
}

impl ProtocolStore {
    pub fn new(protocol: Protocol) -> Self {
        ProtocolStore {
            history: History::new(protocol),
        }
    }

    /// Keep at most `limit` snapshots.
    pub fn with_limit(protocol: Protocol, limit: usize) -> Self {
        ProtocolStore {
            history: History::with_limit(protocol, limit),
        }
    }

    pub fn current(&self) -> &Protocol {
        self.history.current()
    }

    pub fn history(&self) -> &History<Protocol> {
        &self.history
    }

    /// Apply `action` to a copy of the current document and record it.
    /// On error nothing is recorded.
    pub fn apply(&mut self, action: ProtocolAction) -> Result<&Protocol, DocumentError> {
        let description = action.describe();
        let mut next = self.current().clone();
        match action {
            ProtocolAction::UpdateProtocolInfo { name, version } => {
                if let Some(name) = name {
                    next.name = name;
                }
                if let Some(version) = version {
                    next.version = version;
                }
            }
            ProtocolAction::AddBaseField(mut field) => {
                if field.id.is_empty() {
                    field.id = generate_id();
                }
                next.base_packet.fields.push(field);
            }
            ProtocolAction::UpdateBaseField { id, patch } => {
                let field = next
                    .base_packet
                    .fields
                    .iter_mut()
                    .find(|f| f.id == id)
                    .ok_or(DocumentError::UnknownField(id))?;
                if let Some(name) = patch.name {
                    field.name = name;
                }
                if let Some(byte_index) = patch.byte_index {
                    field.byte_index = byte_index;
                }
                if let Some(value) = patch.value {
                    field.value = value;
                }
                if let Some(description) = patch.description {
                    field.description = description;
                }
            }
            ProtocolAction::RemoveBaseField(id) => {
                let before = next.base_packet.fields.len();
                next.base_packet.fields.retain(|f| f.id != id);
                if next.base_packet.fields.len() == before {
                    return Err(DocumentError::UnknownField(id));
                }
            }
            ProtocolAction::AddCategory { name, description } => {
                next.categories.push(CommandCategory {
                    id: generate_id(),
                    name,
                    description,
                    commands: Vec::new(),
                });
            }
            ProtocolAction::UpdateCategory { id, name, description } => {
                let category = next.category_mut(&id)?;
                if let Some(name) = name {
                    category.name = name;
                }
                if let Some(description) = description {
                    category.description = description;
                }
            }
            ProtocolAction::RemoveCategory(id) => {
                let before = next.categories.len();
                next.categories.retain(|c| c.id != id);
                if next.categories.len() == before {
                    return Err(DocumentError::UnknownCategory(id));
                }
            }
            ProtocolAction::AddCommand { category_id, mut command } => {
                if command.id.is_empty() {
                    command.id = generate_id();
                }
                next.category_mut(&category_id)?.commands.push(command);
            }
            ProtocolAction::UpdateCommand { category_id, command } => {
                let category = next.category_mut(&category_id)?;
                let slot = category
                    .commands
                    .iter_mut()
                    .find(|c| c.id == command.id)
                    .ok_or_else(|| DocumentError::UnknownCommand(command.id.clone()))?;
                *slot = command;
            }
            ProtocolAction::RemoveCommand { category_id, command_id } => {
                let category = next.category_mut(&category_id)?;
                let before = category.commands.len();
                category.commands.retain(|c| c.id != command_id);
                if category.commands.len() == before {
                    return Err(DocumentError::UnknownCommand(command_id));
                }
            }
            ProtocolAction::Import(protocol) => {
                let history = next.history;
                next = protocol;
                if next.history.is_empty() {
                    next.history = history;
                }
            }
        }
        self.commit(next, description);
        Ok(self.current())
    }

    /// Step back to the previous snapshot. Returns false at the beginning.
    pub fn undo(&mut self) -> bool {
        self.history.undo().is_some()
    }

    pub fn redo(&mut self) -> bool {
        self.history.redo().is_some()
    }

    /// Make the snapshot recorded with history entry `entry_id` current
    /// again, as a new snapshot.
    pub fn restore(&mut self, entry_id: u64) -> Result<&Protocol, DocumentError> {
        let snapshot = self
            .history
            .iter()
            .find(|p| p.history.last().map(|e| e.id) == Some(entry_id))
            .cloned()
            .ok_or(DocumentError::UnknownHistoryEntry(entry_id))?;
        let mut next = snapshot;
        next.history = self.current().history.clone();
        self.commit(next, format!("Restored version {}", entry_id));
        Ok(self.current())
    }

    pub fn export_json(&self) -> Result<String, DocumentError> {
        self.current().to_json_pretty()
    }

    pub fn import_json(&mut self, json: &str) -> Result<&Protocol, DocumentError> {
        let protocol = Protocol::from_json(json)?;
        self.apply(ProtocolAction::Import(protocol))
    }

    fn commit(&mut self, mut next: Protocol, description: String) {
        let timestamp = now_timestamp();
        let id = next.history.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        next.history.push(HistoryEntry {
            id,
            timestamp: timestamp.clone(),
            description,
        });
        next.last_modified = timestamp;
        log::debug!("recorded history entry {}", id);
        self.history.record(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_action_records_nothing() {
        let mut store = ProtocolStore::new(Protocol::new("P", "1.0"));
        let err = store.apply(ProtocolAction::RemoveCategory("missing".to_string()));
        assert!(matches!(err, Err(DocumentError::UnknownCategory(_))));
        assert_eq!(store.history().len(), 1);
        assert!(store.current().history.is_empty());
    }

    #[test]
    fn restore_brings_back_old_state_as_new_entry() {
        let mut store = ProtocolStore::new(Protocol::new("P", "1.0"));
        store
            .apply(ProtocolAction::UpdateProtocolInfo { name: Some("A".into()), version: None })
            .unwrap();
        store
            .apply(ProtocolAction::UpdateProtocolInfo { name: Some("B".into()), version: None })
            .unwrap();
        let restored = store.restore(1).unwrap();
        assert_eq!(restored.name, "A");
        assert_eq!(restored.history.len(), 3);
        assert_eq!(restored.history[2].description, "Restored version 1");
        assert!(matches!(store.restore(99), Err(DocumentError::UnknownHistoryEntry(99))));
    }
}
