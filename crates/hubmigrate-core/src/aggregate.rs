//! Cross-member aggregation of entity result sets.
//!
//! Each fleet member reports the entities it considers orphaned. An entity is
//! orphaned for the fleet only when *every* member reports it: a member that
//! leaves it out has its own reason to, so the decision is a strict
//! intersection keyed by entity id.

use crate::envelope::{Data, OutputScan};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Key under a success envelope's `data` holding the entity list.
pub const ENTITIES_KEY: &str = "entities";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    pub id: String,
    /// Every other field reported for the entity.
    #[serde(flatten)]
    pub payload: Data,
}

impl EntityRecord {
    pub fn new(id: impl Into<String>, payload: Data) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Parse `{"id": ..., ...}`. Numeric ids are accepted and stringified.
    pub fn from_value(value: &Value) -> Option<Self> {
        let mut obj = value.as_object()?.clone();
        let id = match obj.remove("id")? {
            Value::String(s) if !s.is_empty() => s,
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Self { id, payload: obj })
    }

    /// Short human label: `id (type)` when the payload carries a type.
    pub fn label(&self) -> String {
        match self.payload.get("type").and_then(Value::as_str) {
            Some(kind) => format!("{} ({kind})", self.id),
            None => self.id.clone(),
        }
    }
}

struct Occurrence<'a> {
    record: &'a EntityRecord,
    count: usize,
}

/// Entities present in every member's list, in first-seen order.
///
/// Every sighting counts, including repeats inside one member's list, so a
/// caller that needs one vote per member must de-duplicate first.
pub fn aggregate(per_member: &[Vec<EntityRecord>]) -> Vec<EntityRecord> {
    let members = per_member.len();
    let mut order: Vec<&str> = Vec::new();
    let mut seen: HashMap<&str, Occurrence<'_>> = HashMap::new();

    for record in per_member.iter().flatten() {
        seen.entry(record.id.as_str())
            .and_modify(|o| o.count += 1)
            .or_insert_with(|| {
                order.push(record.id.as_str());
                Occurrence { record, count: 1 }
            });
    }

    order
        .into_iter()
        .filter_map(|id| seen.get(id))
        .filter(|o| o.count == members)
        .map(|o| o.record.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Member result extraction
// ---------------------------------------------------------------------------

/// One member's contribution to an aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberRecords {
    Parsed(Vec<EntityRecord>),
    /// Counted as an empty list, which excludes every entity.
    Unparseable { reason: String },
}

impl MemberRecords {
    pub fn records(&self) -> &[EntityRecord] {
        match self {
            MemberRecords::Parsed(records) => records,
            MemberRecords::Unparseable { .. } => &[],
        }
    }
}

/// Collect the `entities` arrays of every success envelope in `scan`.
pub fn member_records(scan: &OutputScan) -> MemberRecords {
    let mut records = Vec::new();
    let mut found = false;
    for data in scan.success_data() {
        let Some(entities) = data.get(ENTITIES_KEY) else {
            continue;
        };
        let Some(items) = entities.as_array() else {
            return MemberRecords::Unparseable {
                reason: format!("'{ENTITIES_KEY}' is not a list"),
            };
        };
        found = true;
        for (i, item) in items.iter().enumerate() {
            match EntityRecord::from_value(item) {
                Some(record) => records.push(record),
                None => {
                    return MemberRecords::Unparseable {
                        reason: format!("entry {i} of '{ENTITIES_KEY}' has no usable 'id'"),
                    }
                }
            }
        }
    }
    if !found {
        return MemberRecords::Unparseable {
            reason: format!("no success envelope with an '{ENTITIES_KEY}' list"),
        };
    }
    MemberRecords::Parsed(records)
}
