//! Table records.

use crate::record_file::SlotRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tabula_codec::Value;

/// A document stored in a table's data file.
///
/// A record is a map from column name to [`Value`]. A column missing from the
/// map is *undefined*, which is distinct from a column holding
/// [`Value::Null`].
///
/// Records read back from a [`RecordFile`](crate::RecordFile) carry the slot
/// index they were read from. The index is never persisted and equality
/// ignores it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
    #[serde(skip)]
    index: Option<u64>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column, builder style.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    /// Sets a column, returning the previous value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(column.into(), value.into())
    }

    /// Removes a column, making it undefined.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.fields.remove(column)
    }

    /// Returns the column value, or `None` when the column is undefined.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    /// Returns all columns.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Slot index this record was read from.
    #[must_use]
    pub fn index(&self) -> Option<u64> {
        self.index
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Record {}

impl SlotRecord for Record {
    fn attach_index(&mut self, index: u64) {
        self.index = Some(index);
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self {
            fields,
            index: None,
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<BTreeMap<_, _>>()
            .into()
    }
}
