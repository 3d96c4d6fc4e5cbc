// ABOUTME: Defines the entry envelope appended to the log and the views derived from it.
// ABOUTME: Entries are immutable facts; records and field histories are recomputed on every read.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// Globally unique, strictly increasing identifier of one appended entry.
pub type EntryId = u64;

/// Identifier of a record. Always positive once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct RecordId(i64);

impl RecordId {
    /// Build a record id, rejecting zero and negative values.
    pub fn new(id: i64) -> Result<Self, RecordError> {
        if id <= 0 {
            return Err(RecordError::InvalidId(id.to_string()));
        }
        Ok(Self(id))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl FromStr for RecordId {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s
            .trim()
            .parse::<i64>()
            .map_err(|_| RecordError::InvalidId(s.to_string()))?;
        Self::new(id)
    }
}

impl TryFrom<i64> for RecordId {
    type Error = RecordError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<RecordId> for i64 {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One immutable append to the log. An absent `value` is a deletion marker
/// for `key` as of this entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub entry_id: EntryId,
    pub record_id: RecordId,
    pub key: String,
    pub value: Option<String>,
}

impl Entry {
    pub fn is_deletion(&self) -> bool {
        self.value.is_none()
    }
}

/// The resolved current state of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub data: BTreeMap<String, String>,
}

impl Record {
    /// An existing record whose fields are all deleted, or a fresh one.
    pub fn empty(id: RecordId) -> Self {
        Self {
            id,
            data: BTreeMap::new(),
        }
    }

    /// Fold one field change into this view: present values replace,
    /// absent values remove the key.
    pub fn apply_change(&mut self, key: &str, value: Option<&str>) {
        match value {
            Some(v) => {
                self.data.insert(key.to_string(), v.to_string());
            }
            None => {
                self.data.remove(key);
            }
        }
    }
}

/// One point in a field's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldVersion {
    pub entry_id: EntryId,
    pub value: Option<String>,
}

/// Every value ever written for one `(record, key)` pair, ascending by entry id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldHistory {
    pub id: RecordId,
    pub key: String,
    pub history: Vec<FieldVersion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_rejects_non_positive() {
        assert!(RecordId::new(0).is_err());
        assert!(RecordId::new(-3).is_err());
        assert_eq!(RecordId::new(7).unwrap().get(), 7);
    }

    #[test]
    fn record_id_parses_from_path_segment() {
        assert_eq!("42".parse::<RecordId>().unwrap().get(), 42);
        assert!(matches!(
            "abc".parse::<RecordId>(),
            Err(RecordError::InvalidId(s)) if s == "abc"
        ));
        assert!("-1".parse::<RecordId>().is_err());
        assert!("".parse::<RecordId>().is_err());
    }

    #[test]
    fn record_id_deserialize_rejects_zero() {
        assert!(serde_json::from_str::<RecordId>("0").is_err());
        let id: RecordId = serde_json::from_str("9").unwrap();
        assert_eq!(id.get(), 9);
    }

    #[test]
    fn record_serializes_as_id_and_data() {
        let mut record = Record::empty(RecordId::new(1).unwrap());
        record.apply_change("foo", Some("bar"));
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":1,"data":{"foo":"bar"}}"#);
    }

    #[test]
    fn apply_change_removes_on_absent_value() {
        let mut record = Record::empty(RecordId::new(1).unwrap());
        record.apply_change("a", Some("1"));
        record.apply_change("b", Some("2"));
        record.apply_change("a", None);
        assert_eq!(record.data.len(), 1);
        assert_eq!(record.data.get("b").map(String::as_str), Some("2"));
    }
}
