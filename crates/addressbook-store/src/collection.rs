//! A user's full set of records and its on-disk text form
//!
//! One encoded record per line, joined with `\n`, no trailing newline.

use std::collections::btree_map::{self, BTreeMap};
use std::collections::HashSet;

use crate::record::ContactRecord;
use crate::{Result, StoreError};

/// The maximum number of records a single user can hold
pub const MAX_RECORDS: usize = 256;

const LINE_SEPARATOR: char = '\n';

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordCollection {
    records: BTreeMap<String, ContactRecord>,
}

impl RecordCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= MAX_RECORDS
    }

    pub fn get(&self, record_id: &str) -> Option<&ContactRecord> {
        self.records.get(record_id)
    }

    pub fn contains(&self, record_id: &str) -> bool {
        self.records.contains_key(record_id)
    }

    /// Records in ID order
    pub fn iter(&self) -> btree_map::Values<'_, String, ContactRecord> {
        self.records.values()
    }

    /// Insert or replace, returning the replaced record. No capacity check.
    pub fn upsert(&mut self, record: ContactRecord) -> Option<ContactRecord> {
        self.records.insert(record.id().to_string(), record)
    }

    pub fn remove(&mut self, record_id: &str) -> Option<ContactRecord> {
        self.records.remove(record_id)
    }

    pub fn serialize(&self) -> String {
        self.records
            .values()
            .map(ContactRecord::encode)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse collection text. A repeated record ID is fatal.
    pub fn parse(text: &str) -> Result<Self> {
        let mut collection = Self::new();
        for record in Self::parse_ordered(text)? {
            collection.upsert(record);
        }
        Ok(collection)
    }

    /// Parse collection text, keeping the records in the order they were written
    pub fn parse_ordered(text: &str) -> Result<Vec<ContactRecord>> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for (index, line) in text.split(LINE_SEPARATOR).enumerate() {
            // CRLF input
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            let record = ContactRecord::decode(line).map_err(|source| {
                StoreError::MalformedRecord {
                    line: index + 1,
                    source,
                }
            })?;
            if !seen.insert(record.id().to_string()) {
                return Err(StoreError::DuplicateRecord(record.id().to_string()));
            }
            records.push(record);
        }

        Ok(records)
    }
}

impl<'a> IntoIterator for &'a RecordCollection {
    type Item = &'a ContactRecord;
    type IntoIter = btree_map::Values<'a, String, ContactRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
