use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::records::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Advisory only, never blocks a create.
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What importing the record would do to the store without resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictAction {
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub entity_type: EntityKind,
    pub action: ConflictAction,
    pub existing_id: Option<String>,
    pub incoming_id: String,
    pub existing_data: Value,
    pub incoming_data: Value,
    pub conflict_fields: Vec<String>,
    pub severity: Severity,
    pub description: String,
}

impl Conflict {
    /// Whether this conflict stops an unconditional create.
    pub fn is_blocking(&self) -> bool {
        self.severity != Severity::Low
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictStatistics {
    pub total_conflicts: usize,
    pub conflicts_by_type: BTreeMap<EntityKind, usize>,
    pub conflicts_by_severity: BTreeMap<Severity, usize>,
}

impl ConflictStatistics {
    pub fn tally(conflicts: &[Conflict]) -> Self {
        let mut stats = Self::default();
        for conflict in conflicts {
            stats.total_conflicts += 1;
            *stats.conflicts_by_type.entry(conflict.entity_type).or_default() += 1;
            *stats.conflicts_by_severity.entry(conflict.severity).or_default() += 1;
        }
        stats
    }
}

/// Top-level scalar fields whose values differ between two JSON objects.
/// A field absent on one side compares as `null`; objects and arrays are
/// not scalar and never reported.
pub fn differing_scalar_fields(existing: &Value, incoming: &Value) -> Vec<String> {
    let (Some(old), Some(new)) = (existing.as_object(), incoming.as_object()) else {
        return Vec::new();
    };
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    keys.into_iter()
        .filter(|key| {
            let a = old.get(*key).unwrap_or(&Value::Null);
            let b = new.get(*key).unwrap_or(&Value::Null);
            is_scalar(a) && is_scalar(b) && a != b
        })
        .cloned()
        .collect()
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diff_reports_only_changed_scalars() {
        let old = json!({"id": "a", "firstName": "Ada", "phone": null, "tags": [1]});
        let new = json!({"id": "a", "firstName": "Augusta", "phone": "555", "tags": [2]});
        assert_eq!(differing_scalar_fields(&old, &new), vec!["firstName", "phone"]);
    }

    #[test]
    fn missing_keys_compare_as_null() {
        let old = json!({"a": 1, "b": null});
        let new = json!({"a": 1});
        assert!(differing_scalar_fields(&old, &new).is_empty());
        let new = json!({"a": 1, "c": true});
        assert_eq!(differing_scalar_fields(&old, &new), vec!["c"]);
    }

    #[test]
    fn tally_groups_by_type_and_severity() {
        let mk = |entity_type, severity| Conflict {
            entity_type,
            action: ConflictAction::Create,
            existing_id: None,
            incoming_id: "x".into(),
            existing_data: Value::Null,
            incoming_data: Value::Null,
            conflict_fields: Vec::new(),
            severity,
            description: String::new(),
        };
        let conflicts = vec![
            mk(EntityKind::Person, Severity::Low),
            mk(EntityKind::Person, Severity::Medium),
            mk(EntityKind::Account, Severity::High),
        ];
        let stats = ConflictStatistics::tally(&conflicts);
        assert_eq!(stats.total_conflicts, 3);
        assert_eq!(stats.conflicts_by_type[&EntityKind::Person], 2);
        assert_eq!(stats.conflicts_by_severity[&Severity::High], 1);
        assert!(!conflicts[0].is_blocking());
        assert!(conflicts[1].is_blocking());
    }
}
