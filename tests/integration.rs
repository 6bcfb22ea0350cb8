//! Integration tests: protocol documents on disk, the undo/redo store, lint
//! over whole documents, and response analysis with the sample commands.

use packet_designer::document::{Command, Protocol};
use packet_designer::lint::{lint, lint_fix, LintRule, Severity};
use packet_designer::packet::{analyze_response, FieldValue, PacketCheckError};
use packet_designer::store::{PacketFieldPatch, ProtocolAction, ProtocolStore};
use packet_designer::{DocumentError, PacketField};

fn command_mut<'a>(p: &'a mut Protocol, code: &str) -> &'a mut Command {
    p.categories
        .iter_mut()
        .flat_map(|c| c.commands.iter_mut())
        .find(|c| c.code == code)
        .expect("command")
}

// ==================== Documents ====================

#[test]
fn save_and_load_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("protocol.json");
    let p = Protocol::sample();
    p.save(&path).expect("save");
    let loaded = Protocol::load(&path).expect("load");
    assert_eq!(loaded, p);
    assert_eq!(loaded.commands().count(), 4);
}

#[test]
fn load_reports_bad_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").expect("write");
    assert!(matches!(Protocol::load(&path), Err(DocumentError::Json(_))));
    assert!(matches!(
        Protocol::load(&dir.path().join("missing.json")),
        Err(DocumentError::Io(_))
    ));
}

#[test]
fn request_layout_uses_document_variables() {
    let p = Protocol::sample();
    let power = p.find_command("0x65").expect("power");
    let layout = power.request_layout(Default::default());
    assert!(layout.is_valid());
    assert_eq!(layout.template(), power.request.packet);
    assert_eq!(layout.checksum_hex(), "0x99");
    assert_eq!(layout.variables()[0].description, "Power state");
}

// ==================== Store ====================

#[test]
fn store_undo_redo() {
    let mut store = ProtocolStore::new(Protocol::sample());
    store
        .apply(ProtocolAction::AddCategory {
            name: "Diagnostics".to_string(),
            description: String::new(),
        })
        .expect("add category");
    assert_eq!(store.current().categories.len(), 3);
    assert_eq!(store.current().history.len(), 1);
    assert_eq!(store.current().history[0].id, 1);

    assert!(store.undo());
    assert_eq!(store.current().categories.len(), 2);
    assert!(!store.undo());
    assert!(store.redo());
    assert_eq!(store.current().categories.len(), 3);
    assert!(!store.redo());

    store.undo();
    store
        .apply(ProtocolAction::UpdateProtocolInfo {
            name: None,
            version: Some("2.0.0".to_string()),
        })
        .expect("update");
    assert!(!store.history().can_redo());
    assert_eq!(store.current().categories.len(), 2);
    assert_eq!(store.current().version, "2.0.0");
}

#[test]
fn store_command_and_field_actions() {
    let mut store = ProtocolStore::new(Protocol::sample());
    let category = store.current().categories[0].id.clone();

    let mut cmd = Command::new("Start Report", "0x41");
    cmd.id = String::new();
    store
        .apply(ProtocolAction::AddCommand {
            category_id: category.clone(),
            command: cmd,
        })
        .expect("add command");
    let mut added = store.current().find_command("0x41").expect("added").clone();
    assert_eq!(added.id.len(), 16);

    added.description = "Starts periodic reports".to_string();
    store
        .apply(ProtocolAction::UpdateCommand {
            category_id: category.clone(),
            command: added.clone(),
        })
        .expect("update command");
    assert_eq!(
        store.current().find_command("0x41").map(|c| c.description.as_str()),
        Some("Starts periodic reports")
    );

    store
        .apply(ProtocolAction::RemoveCommand {
            category_id: category.clone(),
            command_id: added.id.clone(),
        })
        .expect("remove command");
    assert!(store.current().find_command("0x41").is_none());

    let err = store
        .apply(ProtocolAction::RemoveCommand {
            category_id: category,
            command_id: added.id,
        })
        .unwrap_err();
    assert!(matches!(err, DocumentError::UnknownCommand(_)));

    store
        .apply(ProtocolAction::AddBaseField(PacketField::new("extra", "Reserved", "6", None)))
        .expect("add field");
    store
        .apply(ProtocolAction::UpdateBaseField {
            id: "extra".to_string(),
            patch: PacketFieldPatch {
                byte_index: Some("6-7".to_string()),
                ..Default::default()
            },
        })
        .expect("update field");
    let extra = store.current().base_packet.fields.iter().find(|f| f.id == "extra").expect("extra");
    assert_eq!(extra.byte_index, "6-7");
    store
        .apply(ProtocolAction::RemoveBaseField("extra".to_string()))
        .expect("remove field");
    assert_eq!(store.current().base_packet.fields.len(), 6);
    assert_eq!(store.current().history.len(), 6);
}

#[test]
fn store_restore_and_json() {
    let mut store = ProtocolStore::new(Protocol::new("Device", "1.0"));
    store
        .apply(ProtocolAction::UpdateProtocolInfo {
            name: Some("Device A".to_string()),
            version: None,
        })
        .expect("rename");
    store
        .apply(ProtocolAction::UpdateProtocolInfo {
            name: Some("Device B".to_string()),
            version: None,
        })
        .expect("rename");

    let restored = store.restore(1).expect("restore");
    assert_eq!(restored.name, "Device A");
    assert_eq!(restored.history.last().map(|e| e.id), Some(3));

    let json = store.export_json().expect("export");
    let mut other = ProtocolStore::new(Protocol::sample());
    let imported = other.import_json(&json).expect("import");
    assert_eq!(imported.name, "Device A");
    assert!(imported.history.len() >= 3);
    assert!(other.undo());
    assert_eq!(other.current().name, "Packet Communication Protocol");
}

// ==================== Lint ====================

#[test]
fn sample_lints_clean_and_fix_is_stable() {
    let p = Protocol::sample();
    assert!(lint(&p).is_empty());
    assert_eq!(lint_fix(&p), p);
}

#[test]
fn corrupted_document_is_reported_and_fixed() {
    let mut p = Protocol::sample();
    command_mut(&mut p, "0x65").request.packet = "[0xFF, 0xFF, 0x05, 0x65, ${power}, ${checksum}]".to_string();
    command_mut(&mut p, "0x66").response.fields.retain(|f| f.name != "Checksum");
    command_mut(&mut p, "0x05").code = "0x04".to_string();

    let msgs = lint(&p);
    let rules: Vec<_> = msgs.iter().map(|m| m.rule).collect();
    assert!(rules.contains(&LintRule::SizeMismatch));
    assert!(rules.contains(&LintRule::ResponseLayout));
    assert!(rules.contains(&LintRule::DuplicateCommandCode));
    assert!(rules.contains(&LintRule::CommandCodeMismatch));
    assert!(msgs.iter().any(|m| m.severity == Severity::Error));

    let fixed = lint_fix(&p);
    let remaining: Vec<_> = lint(&fixed).iter().map(|m| m.rule).collect();
    assert!(remaining.contains(&LintRule::DuplicateCommandCode));
    assert!(remaining.contains(&LintRule::ResponseLayout), "missing Checksum cannot be derived");
    assert!(!remaining.contains(&LintRule::SizeMismatch));
    assert!(!remaining.contains(&LintRule::CommandCodeMismatch));
    let power = fixed.find_command("0x65").expect("power");
    assert_eq!(power.request.packet, "[0xFF, 0xFF, 0x03, 0x65, ${power}, ${checksum}]");
}

// ==================== Response analysis ====================

#[test]
fn analyze_position_response() {
    let p = Protocol::sample();
    let cmd = p.find_command("0x04").expect("position");
    let analysis = analyze_response("FF FF 06 04 00 C8 01 90 9F", cmd).expect("analyze");
    assert!(analysis.checksum_valid);
    assert_eq!(analysis.command, "Get Position Data");
    assert_eq!(analysis.fields.len(), 7);

    let left = analysis.fields.iter().find(|f| f.name == "Raw Position L").expect("left");
    assert_eq!(left.raw, FieldValue::Word(200));
    assert_eq!(left.hex, "0x00C8");
    assert_eq!(left.converted, Some(10.0));
    let right = analysis.fields.iter().find(|f| f.name == "Raw Position R").expect("right");
    assert_eq!(right.converted, Some(20.0));
    let size = analysis.fields.iter().find(|f| f.name == "Size").expect("size");
    assert_eq!(size.raw, FieldValue::Byte(6));
    assert_eq!(size.converted, None);
}

#[test]
fn analyze_voltage_with_unit() {
    let p = Protocol::sample();
    let cmd = p.find_command("0x05").expect("voltage");
    let analysis = analyze_response("FF FF 04 05 04 D2 23", cmd).expect("analyze");
    assert!(analysis.checksum_valid);
    let voltage = analysis.fields.iter().find(|f| f.name == "Voltage").expect("voltage");
    assert_eq!(voltage.converted, Some(12.34));
    assert_eq!(voltage.unit.as_deref(), Some("V"));

    let bad = analyze_response("FF FF 04 05 04 D2 24", cmd).expect("analyze");
    assert!(!bad.checksum_valid);
}

#[test]
fn analyze_rejects_wrong_command_and_short_input() {
    let p = Protocol::sample();
    let cmd = p.find_command("0x04").expect("position");
    assert_eq!(
        analyze_response("FF FF 02 05 FB", cmd).unwrap_err(),
        PacketCheckError::CommandMismatch {
            expected: "0x04".to_string(),
            actual: "0x05".to_string()
        }
    );
    assert_eq!(
        analyze_response("FF FF", cmd).unwrap_err(),
        PacketCheckError::TooShort { found: 2, min: 4 }
    );
}
