// ABOUTME: Snapshot and history resolution over an entry log.
// ABOUTME: A snapshot keeps the newest entry per key; a history keeps every entry for one key.

use std::collections::HashSet;

use crate::entry::{Entry, FieldHistory, FieldVersion, Record, RecordId};
use crate::error::RecordError;
use crate::log::{EntryLog, latest_value};

/// Reduce a record's entries to its current fields.
///
/// Walks newest-first and keeps only the first occurrence of each key, so the
/// highest entry id wins regardless of how the input was ordered. Keys whose
/// newest entry is a deletion marker are left out.
pub fn fold_snapshot(record_id: RecordId, entries: &[Entry]) -> Record {
    let mut newest_first: Vec<&Entry> = entries.iter().collect();
    newest_first.sort_unstable_by(|a, b| b.entry_id.cmp(&a.entry_id));

    let mut seen = HashSet::new();
    let mut record = Record::empty(record_id);
    for entry in newest_first {
        if !seen.insert(entry.key.as_str()) {
            continue;
        }
        if let Some(value) = &entry.value {
            record.data.insert(entry.key.clone(), value.clone());
        }
    }
    record
}

/// Resolve the current state of a record. A record with entries but every
/// field deleted resolves to an empty record, not `RecordNotFound`.
pub fn resolve(log: &dyn EntryLog, record_id: RecordId) -> Result<Record, RecordError> {
    let entries = log.scan_record(record_id)?;
    if entries.is_empty() {
        return Err(RecordError::RecordNotFound(record_id));
    }
    Ok(fold_snapshot(record_id, &entries))
}

/// Every value ever written for `(record_id, key)`, deletion markers included.
pub fn history(
    log: &dyn EntryLog,
    record_id: RecordId,
    key: &str,
) -> Result<FieldHistory, RecordError> {
    let mut entries = log.scan_field(record_id, key)?;
    if entries.is_empty() {
        return Err(RecordError::FieldNotFound {
            record_id,
            key: key.to_string(),
        });
    }
    entries.sort_unstable_by_key(|e| e.entry_id);

    Ok(FieldHistory {
        id: record_id,
        key: key.to_string(),
        history: entries
            .into_iter()
            .map(|e| FieldVersion {
                entry_id: e.entry_id,
                value: e.value,
            })
            .collect(),
    })
}

/// Current value of one field; `None` if never written or currently deleted.
pub fn current_value(
    log: &dyn EntryLog,
    record_id: RecordId,
    key: &str,
) -> Result<Option<String>, RecordError> {
    let entries = log.scan_field(record_id, key)?;
    Ok(latest_value(&entries).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLog;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn rid(id: i64) -> RecordId {
        RecordId::new(id).unwrap()
    }

    fn entry(entry_id: u64, key: &str, value: Option<&str>) -> Entry {
        Entry {
            entry_id,
            record_id: rid(1),
            key: key.to_string(),
            value: value.map(str::to_string),
        }
    }

    #[test]
    fn overwrite_then_history() {
        let log = MemoryLog::new();
        assert_eq!(log.append(rid(5), "color", Some("red")).unwrap(), 1);
        assert_eq!(log.append(rid(5), "color", Some("blue")).unwrap(), 2);

        let record = resolve(&log, rid(5)).unwrap();
        assert_eq!(record.data.get("color").map(String::as_str), Some("blue"));
        assert_eq!(record.data.len(), 1);

        let hist = history(&log, rid(5), "color").unwrap();
        assert_eq!(
            hist.history,
            vec![
                FieldVersion {
                    entry_id: 1,
                    value: Some("red".to_string())
                },
                FieldVersion {
                    entry_id: 2,
                    value: Some("blue".to_string())
                },
            ]
        );
    }

    #[test]
    fn deleted_key_drops_from_snapshot() {
        let log = MemoryLog::new();
        log.append(rid(7), "a", Some("1")).unwrap();
        log.append(rid(7), "b", Some("2")).unwrap();
        log.append(rid(7), "a", None).unwrap();

        let record = resolve(&log, rid(7)).unwrap();
        let expected: BTreeMap<String, String> =
            [("b".to_string(), "2".to_string())].into_iter().collect();
        assert_eq!(record.data, expected);

        // Both entries for `a` are still in the timeline.
        let hist = history(&log, rid(7), "a").unwrap();
        assert_eq!(hist.history.len(), 2);
        assert_eq!(hist.history[1].value, None);
    }

    #[test]
    fn unknown_record_is_not_found() {
        let log = MemoryLog::new();
        assert!(matches!(
            resolve(&log, rid(3)),
            Err(RecordError::RecordNotFound(id)) if id == rid(3)
        ));
    }

    #[test]
    fn unknown_field_is_not_found_but_deleted_field_is_not() {
        let log = MemoryLog::new();
        log.append(rid(1), "a", Some("1")).unwrap();
        log.append(rid(1), "a", None).unwrap();

        assert!(matches!(
            history(&log, rid(1), "b"),
            Err(RecordError::FieldNotFound { .. })
        ));
        assert!(history(&log, rid(1), "a").is_ok());
    }

    #[test]
    fn all_fields_deleted_still_exists() {
        let log = MemoryLog::new();
        log.append(rid(1), "foo", Some("bar")).unwrap();
        log.append(rid(1), "foo", None).unwrap();

        let record = resolve(&log, rid(1)).unwrap();
        assert!(record.data.is_empty());
    }

    #[test]
    fn fold_is_independent_of_input_order() {
        let forward = vec![
            entry(1, "a", Some("1")),
            entry(2, "b", Some("2")),
            entry(3, "a", Some("3")),
            entry(4, "b", None),
            entry(5, "c", Some("5")),
        ];
        let mut shuffled = forward.clone();
        shuffled.swap(0, 4);
        shuffled.swap(1, 3);

        let a = fold_snapshot(rid(1), &forward);
        let b = fold_snapshot(rid(1), &shuffled);
        assert_eq!(a, b);
        assert_eq!(a.data.get("a").map(String::as_str), Some("3"));
        assert!(!a.data.contains_key("b"));
        assert_eq!(a.data.get("c").map(String::as_str), Some("5"));
    }

    #[test]
    fn fold_matches_last_write_per_key() {
        // Deterministic pseudo-random sequences over a small key space.
        let keys = ["a", "b", "c", "d"];
        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        for _ in 0..50 {
            let log = MemoryLog::new();
            let mut model: BTreeMap<String, Option<String>> = BTreeMap::new();
            for step in 0..40 {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                let key = keys[(seed % keys.len() as u64) as usize];
                let value = if seed % 3 == 0 {
                    None
                } else {
                    Some(format!("v{}", step))
                };
                log.append(rid(1), key, value.as_deref()).unwrap();
                model.insert(key.to_string(), value);
            }

            let expected: BTreeMap<String, String> = model
                .into_iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .collect();
            assert_eq!(resolve(&log, rid(1)).unwrap().data, expected);
        }
    }

    #[test]
    fn history_length_matches_appends_to_pair() {
        let log = MemoryLog::new();
        for i in 0..5 {
            log.append(rid(2), "k", Some(&i.to_string())).unwrap();
            log.append(rid(2), "other", Some("x")).unwrap();
        }
        let hist = history(&log, rid(2), "k").unwrap();
        assert_eq!(hist.history.len(), 5);
        assert!(hist.history.windows(2).all(|w| w[0].entry_id < w[1].entry_id));
    }

    #[test]
    fn reads_are_idempotent() {
        let log = MemoryLog::new();
        log.append(rid(1), "a", Some("1")).unwrap();
        log.append(rid(1), "b", Some("2")).unwrap();

        assert_eq!(resolve(&log, rid(1)).unwrap(), resolve(&log, rid(1)).unwrap());
        assert_eq!(
            history(&log, rid(1), "a").unwrap(),
            history(&log, rid(1), "a").unwrap()
        );
    }

    #[test]
    fn concurrent_appends_to_distinct_keys_all_resolve() {
        let log = Arc::new(MemoryLog::new());
        let n = 32;
        let ids: Vec<u64> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..n)
                .map(|i| {
                    let log = Arc::clone(&log);
                    s.spawn(move || {
                        log.append(rid(9), &format!("key{}", i), Some(&i.to_string()))
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), n);

        let record = resolve(&*log, rid(9)).unwrap();
        assert_eq!(record.data.len(), n);
        for i in 0..n {
            assert_eq!(
                record.data.get(&format!("key{}", i)),
                Some(&i.to_string())
            );
        }
    }
}
