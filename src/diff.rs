// 🔀 Diff Engine - what changed between two snapshots of one dataset
//
// Records are matched by identity key. For matched pairs every declared
// field is compared (text case-insensitively), except the ignored ones.
// Output partitions are sorted by key, never by input order.

use crate::records::RecordIdentity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

// ============================================================================
// FIELD VALUES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Number(i64),
    Empty,
}

impl FieldValue {
    pub fn text(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }

    /// Text compares case-insensitively, everything else exactly
    pub fn same_as(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => a.to_lowercase() == b.to_lowercase(),
            _ => self == other,
        }
    }
}

impl From<Option<i64>> for FieldValue {
    fn from(value: Option<i64>) -> Self {
        value.map(FieldValue::Number).unwrap_or(FieldValue::Empty)
    }
}

impl From<Option<&str>> for FieldValue {
    fn from(value: Option<&str>) -> Self {
        value.map(FieldValue::text).unwrap_or(FieldValue::Empty)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Empty => Ok(()),
        }
    }
}

/// A record type that can be compared field by field.
///
/// The field list is explicit per type: the comparison is fixed at compile
/// time rather than discovered from the value.
pub trait Diffable: RecordIdentity {
    /// Fields that never count as a change for this record type
    const DEFAULT_IGNORED: &'static [&'static str];

    /// Every comparable field, always in the same order
    fn fields(&self) -> Vec<(&'static str, FieldValue)>;
}

// ============================================================================
// DIFF RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: &'static str,
    pub new: FieldValue,
    pub old: FieldValue,
}

#[derive(Debug, Clone)]
pub struct ChangedRecord<'a, R> {
    pub key: String,
    pub current: &'a R,
    pub previous: &'a R,
    pub changes: Vec<FieldChange>,
}

#[derive(Debug, Clone)]
pub struct DiffResult<'a, R> {
    /// In current, not in previous
    pub added: Vec<&'a R>,
    /// In both, with at least one field difference
    pub changed: Vec<ChangedRecord<'a, R>>,
    /// In previous, not in current
    pub removed: Vec<&'a R>,
}

impl<'a, R> DiffResult<'a, R> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} added, {} changed, {} removed",
            self.added.len(),
            self.changed.len(),
            self.removed.len()
        )
    }
}

// ============================================================================
// DIFF ENGINE
// ============================================================================

pub struct DiffEngine {
    ignored: BTreeSet<String>,
}

impl DiffEngine {
    /// Engine ignoring exactly the given fields
    pub fn new<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DiffEngine {
            ignored: ignored.into_iter().map(Into::into).collect(),
        }
    }

    /// Engine with the default ignore set of a record type
    pub fn for_record<R: Diffable>() -> Self {
        Self::new(R::DEFAULT_IGNORED.iter().copied())
    }

    pub fn is_ignored(&self, field: &str) -> bool {
        self.ignored.contains(field)
    }

    /// Compute added / changed / removed between two snapshots.
    ///
    /// Within `previous`, and for keys matched against `previous`, the last
    /// record with a given key wins. Records whose key only exists in
    /// `current` are all reported as added, duplicates included.
    pub fn diff<'a, R: Diffable>(&self, current: &'a [R], previous: &'a [R]) -> DiffResult<'a, R> {
        let mut current_map: BTreeMap<String, Vec<&'a R>> = BTreeMap::new();
        for record in current {
            current_map.entry(record.key()).or_default().push(record);
        }

        let mut previous_map: BTreeMap<String, &'a R> = BTreeMap::new();
        for record in previous {
            if previous_map.insert(record.key(), record).is_some() {
                debug!(key = %record.key(), "duplicate key in previous snapshot, keeping last");
            }
        }

        let mut added = Vec::new();
        let mut changed = Vec::new();

        for (key, records) in current_map {
            match previous_map.remove(&key) {
                Some(prev) => {
                    // Non-empty by construction of current_map
                    let Some(&latest) = records.last() else { continue };

                    let changes = self.compare(latest, prev);
                    if !changes.is_empty() {
                        changed.push(ChangedRecord {
                            key,
                            current: latest,
                            previous: prev,
                            changes,
                        });
                    }
                }
                None => added.extend(records),
            }
        }

        let removed: Vec<&'a R> = previous_map.into_values().collect();

        let result = DiffResult {
            added,
            changed,
            removed,
        };
        info!(summary = %result.summary(), "diff computed");

        result
    }

    /// Field-level comparison of two versions of one record.
    /// Returns (field, new, old) for every non-ignored field that differs.
    pub fn compare<R: Diffable>(&self, new: &R, old: &R) -> Vec<FieldChange> {
        let old_fields: BTreeMap<&'static str, FieldValue> = old.fields().into_iter().collect();

        new.fields()
            .into_iter()
            .filter(|(name, _)| !self.is_ignored(name))
            .filter_map(|(name, new_value)| {
                let old_value = old_fields.get(name).cloned().unwrap_or(FieldValue::Empty);
                if new_value.same_as(&old_value) {
                    None
                } else {
                    Some(FieldChange {
                        field: name,
                        new: new_value,
                        old: old_value,
                    })
                }
            })
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
