//! Persisted hash index with online resize.
//!
//! The index file is a [`RecordFile`](crate::RecordFile) whose slot 0 holds
//! the [`HashHeader`] and slots `1..=n` the heads of `n` bucket chains.
//! Buckets that outgrow one slot link to overflow slots appended at the end
//! of the file.
//!
//! When the load factor passes the configured threshold a background worker
//! rebuilds the index into a larger file while live mutations continue; see
//! [`HashTableIndex`].

mod file;
mod index;
mod worker;

pub use file::HashHeader;
pub use index::{HashTableIndex, ResizeState};

use serde::{Deserialize, Serialize};
use tabula_codec::Value;

/// Key of a bucket entry. Keeps undefined apart from an explicit null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum EntryKey {
    Undefined,
    Defined(Value),
}

impl EntryKey {
    pub fn from_operand(value: Option<&Value>) -> Self {
        match value {
            Some(value) => Self::Defined(value.clone()),
            None => Self::Undefined,
        }
    }

    pub fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (Self::Undefined, None) => true,
            (Self::Defined(key), Some(value)) => key == value,
            _ => false,
        }
    }

    fn hash_text(&self) -> String {
        match self {
            Self::Undefined => String::new(),
            Self::Defined(Value::Text(text)) => text.clone(),
            Self::Defined(other) => other.to_string(),
        }
    }

    /// Bucket of this key among `buckets` buckets.
    pub fn bucket(&self, buckets: u64) -> u64 {
        u64::from(djb2(&self.hash_text())) % buckets.max(1)
    }
}

/// DJB2 over the UTF-16 code units of `text`, leaving out the final unit.
///
/// Dropping the last unit is part of the on-disk format: files written with
/// it must keep hashing to the same buckets.
pub(crate) fn djb2(text: &str) -> u32 {
    let units: Vec<u16> = text.encode_utf16().collect();
    let hashed = units.len().saturating_sub(1);
    units[..hashed].iter().fold(5381u32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_add(hash)
            .wrapping_add(u32::from(*unit))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn djb2_skips_last_unit() {
        assert_eq!(djb2(""), 5381);
        assert_eq!(djb2("a"), 5381);
        assert_eq!(djb2("ab"), 5381 * 33 + 97);
        assert_eq!(djb2("ab"), djb2("az"));
        assert_ne!(djb2("ab"), djb2("bb"));
    }

    #[test]
    fn null_and_undefined_keys_differ() {
        let undefined = EntryKey::from_operand(None);
        let null = EntryKey::from_operand(Some(&Value::Null));
        assert!(undefined.matches(None));
        assert!(!undefined.matches(Some(&Value::Null)));
        assert!(null.matches(Some(&Value::Null)));
        assert!(!null.matches(None));
    }

    #[test]
    fn text_hashes_its_raw_string() {
        let text = EntryKey::Defined(Value::from("hello"));
        assert_eq!(text.bucket(1024), u64::from(djb2("hello")) % 1024);
        let number = EntryKey::Defined(Value::Integer(1234));
        assert_eq!(number.bucket(1024), u64::from(djb2("1234")) % 1024);
    }
}
