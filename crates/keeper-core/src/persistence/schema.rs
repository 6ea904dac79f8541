//! Schema validation and repair.
//!
//! A loaded file may be partial, hand-edited or written by an older build.
//! [`validate`] walks the canonical field list once and builds a fully
//! shaped [`Document`]:
//!
//! - A missing field gets its empty default.
//! - A field of the wrong shape (object where a list was expected, ...) is
//!   replaced by its empty default.
//! - A record field of the wrong type is removed so the field's default
//!   applies; the rest of the record is kept.
//! - A record that still doesn't deserialize (a required field is missing or
//!   broken) is dropped from its list.
//! - Everything else is kept verbatim.
//!
//! Validation never fails. What it changed is returned as a [`RepairReport`].

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::types::{Document, Settings, SCHEMA_VERSION};

/// JSON shape a canonical field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Number,
    Sequence,
    Mapping,
}

impl Shape {
    fn matches(self, value: &Value) -> bool {
        match self {
            Shape::Number => value.is_u64(),
            Shape::Sequence => value.is_array(),
            Shape::Mapping => value.is_object(),
        }
    }
}

/// Every top-level field of the document with its expected shape.
pub const CANONICAL_FIELDS: &[(&str, Shape)] = &[
    ("version", Shape::Number),
    ("commandHistory", Shape::Sequence),
    ("scheduledTasks", Shape::Sequence),
    ("scheduleHistory", Shape::Sequence),
    ("servers", Shape::Sequence),
    ("players", Shape::Sequence),
    ("playerStats", Shape::Mapping),
    ("playerActions", Shape::Sequence),
    ("serverEvents", Shape::Sequence),
    ("mods", Shape::Sequence),
    ("notes", Shape::Sequence),
    ("presets", Shape::Sequence),
    ("performance", Shape::Sequence),
    ("settings", Shape::Mapping),
];

/// What validation had to change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// The root was not a JSON object and was discarded entirely.
    pub root_replaced: bool,
    /// Fields that were absent.
    pub missing: Vec<String>,
    /// Fields that had the wrong shape.
    pub mistyped: Vec<String>,
    /// Record fields reset to their defaults, as `collection.field`.
    pub reset_fields: Vec<String>,
    /// Records dropped because they could not be salvaged.
    pub dropped_records: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        !self.root_replaced
            && self.missing.is_empty()
            && self.mistyped.is_empty()
            && self.reset_fields.is_empty()
            && self.dropped_records == 0
    }

    /// Number of individual repair actions.
    pub fn total(&self) -> usize {
        usize::from(self.root_replaced)
            + self.missing.len()
            + self.mistyped.len()
            + self.reset_fields.len()
            + self.dropped_records
    }
}

/// Reconcile `raw` against the canonical schema.
pub fn validate(raw: Value) -> (Document, RepairReport) {
    let mut report = RepairReport::default();
    let fields = match raw {
        Value::Object(fields) => fields,
        _ => {
            report.root_replaced = true;
            Map::new()
        }
    };

    let mut r = Reconciler { fields, report };
    let doc = Document {
        version: r.version(),
        command_history: r.sequence("commandHistory"),
        scheduled_tasks: r.sequence("scheduledTasks"),
        schedule_history: r.sequence("scheduleHistory"),
        servers: r.sequence("servers"),
        players: r.sequence("players"),
        player_stats: r.mapping("playerStats"),
        player_actions: r.sequence("playerActions"),
        server_events: r.sequence("serverEvents"),
        mods: r.sequence("mods"),
        notes: r.sequence("notes"),
        presets: r.sequence("presets"),
        performance: r.sequence("performance"),
        settings: r.settings(),
    };

    for key in r.fields.keys() {
        log::debug!("Ignoring unknown document field: {}", key);
    }

    (doc, r.report)
}

struct Reconciler {
    fields: Map<String, Value>,
    report: RepairReport,
}

impl Reconciler {
    /// Remove `key` and return it only if it has the canonical shape.
    fn take(&mut self, key: &str) -> Option<Value> {
        let shape = CANONICAL_FIELDS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, shape)| *shape)?;

        match self.fields.remove(key) {
            None => {
                self.report.missing.push(key.to_string());
                None
            }
            Some(value) if shape.matches(&value) => Some(value),
            Some(_) => {
                self.report.mistyped.push(key.to_string());
                None
            }
        }
    }

    fn version(&mut self) -> u32 {
        self.take("version")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(SCHEMA_VERSION)
    }

    fn sequence<T: DeserializeOwned>(&mut self, key: &str) -> Vec<T> {
        let Some(Value::Array(items)) = self.take(key) else {
            return Vec::new();
        };

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            if let Some(record) = self.record(key, item) {
                records.push(record);
            }
        }
        records
    }

    fn mapping<T: DeserializeOwned>(&mut self, key: &str) -> BTreeMap<String, T> {
        let Some(Value::Object(entries)) = self.take(key) else {
            return BTreeMap::new();
        };

        let mut records = BTreeMap::new();
        for (name, item) in entries {
            if let Some(record) = self.record(key, item) {
                records.insert(name, record);
            }
        }
        records
    }

    fn record<T: DeserializeOwned>(&mut self, key: &str, item: Value) -> Option<T> {
        match salvage(item) {
            Ok((record, reset)) => {
                for field in reset {
                    log::debug!("Reset mistyped field {}.{}", key, field);
                    self.report.reset_fields.push(format!("{key}.{field}"));
                }
                Some(record)
            }
            Err(e) => {
                self.report.dropped_records += 1;
                log::debug!("Dropping malformed {} record: {}", key, e);
                None
            }
        }
    }

    fn settings(&mut self) -> Settings {
        match self.take("settings") {
            Some(Value::Object(settings)) => settings,
            _ => Settings::new(),
        }
    }
}

/// Deserialize one record, removing fields that block it until it parses.
///
/// Deserialization stops at the first bad field, so removing any other
/// field reproduces the same error. The field whose removal changes the
/// error is the culprit. Removing a required field only swaps in a
/// "missing field" error, which no later removal can fix, so such records
/// still fail.
fn salvage<T: DeserializeOwned>(item: Value) -> Result<(T, Vec<String>), serde_json::Error> {
    let mut fields = match item {
        Value::Object(fields) => fields,
        other => return serde_json::from_value(other).map(|record| (record, Vec::new())),
    };

    let mut reset = Vec::new();
    loop {
        let error = match serde_json::from_value::<T>(Value::Object(fields.clone())) {
            Ok(record) => return Ok((record, reset)),
            Err(e) => e.to_string(),
        };

        let culprit = fields
            .keys()
            .find(|name| {
                let mut trial = fields.clone();
                trial.remove(name.as_str());
                match serde_json::from_value::<T>(Value::Object(trial)) {
                    Ok(_) => true,
                    Err(e) => e.to_string() != error,
                }
            })
            .cloned();

        match culprit {
            Some(name) => {
                fields.remove(&name);
                reset.push(name);
            }
            None => return serde_json::from_value(Value::Object(fields)).map(|r| (r, reset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_object_yields_default_document() {
        let (doc, report) = validate(json!({}));

        assert_eq!(doc, Document::default());
        assert_eq!(report.missing.len(), CANONICAL_FIELDS.len());
        assert!(!report.is_clean());
    }

    #[test]
    fn non_object_root_is_replaced() {
        let (doc, report) = validate(json!([1, 2, 3]));

        assert_eq!(doc, Document::default());
        assert!(report.root_replaced);
    }

    #[test]
    fn missing_collection_becomes_empty() {
        let mut raw = serde_json::to_value(Document::default()).unwrap();
        raw.as_object_mut().unwrap().remove("mods");

        let (doc, report) = validate(raw);
        assert!(doc.mods.is_empty());
        assert_eq!(report.missing, vec!["mods".to_string()]);
        assert!(report.mistyped.is_empty());
    }

    #[test]
    fn wrong_shape_is_replaced_not_fatal() {
        let mut raw = serde_json::to_value(Document::default()).unwrap();
        raw["commandHistory"] = json!({ "not": "a list" });
        raw["settings"] = json!(["not", "a", "map"]);

        let (doc, report) = validate(raw);
        assert!(doc.command_history.is_empty());
        assert!(doc.settings.is_empty());
        assert_eq!(
            report.mistyped,
            vec!["commandHistory".to_string(), "settings".to_string()]
        );
    }

    #[test]
    fn malformed_records_are_dropped_individually() {
        let mut raw = serde_json::to_value(Document::default()).unwrap();
        raw["notes"] = json!([
            {
                "id": 1,
                "title": "Restart window",
                "body": "Sundays 04:00",
                "createdAt": "2026-01-01T00:00:00Z",
                "updatedAt": "2026-01-01T00:00:00Z"
            },
            { "title": "no id or timestamps" }
        ]);

        let (doc, report) = validate(raw);
        assert_eq!(doc.notes.len(), 1);
        assert_eq!(doc.notes[0].title, "Restart window");
        assert_eq!(report.dropped_records, 1);
    }

    #[test]
    fn mistyped_field_is_reset_not_dropped() {
        let mut raw = serde_json::to_value(Document::default()).unwrap();
        raw["servers"] = json!([{
            "id": "srv-1",
            "name": "Survival",
            "installPath": "/srv/survival",
            "rconPort": "27015",
            "gamePort": 25570,
            "isActive": true,
            "createdAt": "2026-01-01T00:00:00Z"
        }]);

        let (doc, report) = validate(raw);
        assert_eq!(doc.servers.len(), 1);
        assert_eq!(doc.servers[0].rcon_port, 25575);
        assert_eq!(doc.servers[0].game_port, 25570);
        assert!(doc.servers[0].is_active);
        assert_eq!(report.reset_fields, vec!["servers.rconPort".to_string()]);
        assert_eq!(report.dropped_records, 0);
    }

    #[test]
    fn several_mistyped_fields_are_all_reset() {
        let mut raw = serde_json::to_value(Document::default()).unwrap();
        raw["players"] = json!([{
            "id": "p-1",
            "name": "Alex",
            "accessTier": "overlord",
            "note": 42,
            "firstSeen": "2026-01-01T00:00:00Z",
            "lastSeen": "2026-01-02T00:00:00Z",
            "createdAt": "2026-01-01T00:00:00Z"
        }]);

        let (doc, report) = validate(raw);
        assert_eq!(doc.players.len(), 1);
        assert_eq!(doc.players[0].name, "Alex");
        assert_eq!(report.reset_fields.len(), 2);
    }

    #[test]
    fn broken_required_field_still_drops_record() {
        let mut raw = serde_json::to_value(Document::default()).unwrap();
        raw["mods"] = json!([{ "id": "m-1", "name": "Lithium", "createdAt": 7 }]);

        let (doc, report) = validate(raw);
        assert!(doc.mods.is_empty());
        assert_eq!(report.dropped_records, 1);
    }

    #[test]
    fn well_formed_document_is_kept_verbatim() {
        let mut original = Document::default();
        original
            .settings
            .insert("theme".to_string(), json!("dark"));
        let raw = serde_json::to_value(&original).unwrap();

        let (doc, report) = validate(raw);
        assert!(report.is_clean());
        assert_eq!(doc, original);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let mut raw = serde_json::to_value(Document::default()).unwrap();
        raw["legacyThing"] = json!(true);

        let (_, report) = validate(raw);
        assert!(report.is_clean());
    }
}
