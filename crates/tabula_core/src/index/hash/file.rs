//! Hash bucket file.

use super::EntryKey;
use crate::error::{CoreError, CoreResult};
use crate::record_file::{RecordFile, SlotRecord};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tabula_codec::{CodecError, Value};

const HEADER_SLOT: u64 = 0;

/// Header of a hash index file, stored in slot 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashHeader {
    /// Number of bucket chains.
    pub number_of_buckets: u64,
    /// Number of stored entries.
    pub number_of_entries: u64,
    /// Load factor above which the index resizes.
    pub load_factor_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Entry {
    pub key: EntryKey,
    pub value: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Bucket {
    entries: Vec<Entry>,
    next_entry_index: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum HashSlot {
    Header(HashHeader),
    Bucket(Bucket),
}

impl SlotRecord for HashSlot {}

fn is_overflow(err: &CoreError) -> bool {
    matches!(err, CoreError::Codec(CodecError::SlotOverflow { .. }))
}

/// A hash index file: header, bucket heads and overflow records.
#[derive(Debug)]
pub(crate) struct HashFile {
    file: RecordFile,
    header: HashHeader,
    max_entries: usize,
}

impl HashFile {
    /// Creates a fresh file at `path`, replacing anything already there.
    pub fn create(
        path: &Path,
        buckets: u64,
        threshold: f64,
        record_length: usize,
        max_entries: usize,
    ) -> CoreResult<Self> {
        if max_entries == 0 {
            return Err(CoreError::illegal_argument("bucket records must hold an entry"));
        }
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let mut file = Self {
            file: RecordFile::open(path, record_length)?,
            header: HashHeader {
                number_of_buckets: buckets,
                number_of_entries: 0,
                load_factor_threshold: threshold,
            },
            max_entries,
        };
        file.reset(buckets)?;
        Ok(file)
    }

    /// Drops every entry and lays out `buckets` empty buckets.
    pub fn reset(&mut self, buckets: u64) -> CoreResult<()> {
        if buckets == 0 {
            return Err(CoreError::illegal_argument("hash index needs at least one bucket"));
        }
        self.file.clear()?;
        self.header.number_of_buckets = buckets;
        self.header.number_of_entries = 0;
        self.file.append_record(&HashSlot::Header(self.header.clone()))?;
        let empty = vec![HashSlot::Bucket(Bucket::default()); buckets as usize];
        self.file.append_records(&empty)?;
        Ok(())
    }

    /// Opens an existing file.
    pub fn open(path: &Path, record_length: usize, max_entries: usize) -> CoreResult<Self> {
        let file = RecordFile::open(path, record_length)?;
        let header = match file.read_record::<HashSlot>(HEADER_SLOT)? {
            Some(HashSlot::Header(header)) => header,
            _ => {
                return Err(CoreError::invalid_format(format!(
                    "{} has no hash header",
                    path.display()
                )))
            }
        };
        Ok(Self {
            file,
            header,
            max_entries: max_entries.max(1),
        })
    }

    pub fn header(&self) -> &HashHeader {
        &self.header
    }

    pub fn load_factor(&self) -> f64 {
        self.header.number_of_entries as f64 / self.header.number_of_buckets as f64
    }

    pub fn load_factor_exceeded(&self) -> bool {
        self.load_factor() > self.header.load_factor_threshold
    }

    fn bucket_slot(&self, key: &EntryKey) -> u64 {
        1 + key.bucket(self.header.number_of_buckets)
    }

    fn read_bucket(&self, slot: u64) -> CoreResult<Bucket> {
        match self.file.read_record::<HashSlot>(slot)? {
            Some(HashSlot::Bucket(bucket)) => Ok(bucket),
            _ => Err(CoreError::invalid_format(format!("slot {slot} is not a hash bucket"))),
        }
    }

    fn write_bucket(&self, slot: u64, bucket: Bucket) -> CoreResult<()> {
        self.file.update_record(slot, &HashSlot::Bucket(bucket))
    }

    fn write_header(&self) -> CoreResult<()> {
        self.file.update_record(HEADER_SLOT, &HashSlot::Header(self.header.clone()))
    }

    /// Visits the chain of `key`'s bucket, head first.
    fn chain(&self, key: &EntryKey) -> CoreResult<Vec<(u64, Bucket)>> {
        let mut chain = Vec::new();
        let mut next = Some(self.bucket_slot(key));
        while let Some(slot) = next {
            let bucket = self.read_bucket(slot)?;
            next = bucket.next_entry_index;
            chain.push((slot, bucket));
        }
        Ok(chain)
    }

    fn insert_entry(&mut self, key: EntryKey, address: u64, unique: bool) -> CoreResult<bool> {
        let mut chain = self.chain(&key)?;

        for (slot, bucket) in &mut chain {
            if let Some(entry) = bucket
                .entries
                .iter_mut()
                .find(|entry| entry.key == key && (unique || entry.value == address))
            {
                if entry.value == address {
                    return Ok(false);
                }
                entry.value = address;
                self.write_bucket(*slot, bucket.clone())?;
                return Ok(false);
            }
        }

        let entry = Entry { key, value: address };
        let mut placed = false;
        for (slot, bucket) in &chain {
            if bucket.entries.len() >= self.max_entries {
                continue;
            }
            let mut grown = bucket.clone();
            grown.entries.push(entry.clone());
            match self.write_bucket(*slot, grown) {
                Ok(()) => {
                    placed = true;
                    break;
                }
                Err(err) if is_overflow(&err) => {}
                Err(err) => return Err(err),
            }
        }

        if !placed {
            let overflow = self.file.append_record(&HashSlot::Bucket(Bucket {
                entries: vec![entry],
                next_entry_index: None,
            }))?;
            if let Some((slot, mut tail)) = chain.pop() {
                tail.next_entry_index = Some(overflow);
                self.write_bucket(slot, tail)?;
            }
        }

        self.header.number_of_entries += 1;
        Ok(true)
    }

    /// Adds `address` under `key`.
    ///
    /// A unique index keeps one entry per key and moves it to the new
    /// address; otherwise each `(key, address)` pair is stored once. Returns
    /// whether a new entry was added.
    pub fn insert(&mut self, key: Option<&Value>, address: u64, unique: bool) -> CoreResult<bool> {
        let added = self.insert_entry(EntryKey::from_operand(key), address, unique)?;
        if added {
            self.write_header()?;
        }
        Ok(added)
    }

    /// Adds a batch of entries, writing the header once.
    pub fn insert_many(&mut self, entries: Vec<(EntryKey, u64)>, unique: bool) -> CoreResult<usize> {
        let mut added = 0;
        for (key, address) in entries {
            if self.insert_entry(key, address, unique)? {
                added += 1;
            }
        }
        if added > 0 {
            self.write_header()?;
        }
        Ok(added)
    }

    /// Removes the entry matching both `key` and `address`.
    pub fn delete(&mut self, key: Option<&Value>, address: u64) -> CoreResult<bool> {
        let key = EntryKey::from_operand(key);
        for (slot, mut bucket) in self.chain(&key)? {
            if let Some(position) = bucket
                .entries
                .iter()
                .position(|entry| entry.key == key && entry.value == address)
            {
                bucket.entries.remove(position);
                self.write_bucket(slot, bucket)?;
                self.header.number_of_entries = self.header.number_of_entries.saturating_sub(1);
                self.write_header()?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Addresses stored under `key`.
    pub fn lookup(&self, key: Option<&Value>) -> CoreResult<Vec<u64>> {
        let wanted = EntryKey::from_operand(key);
        Ok(self
            .chain(&wanted)?
            .into_iter()
            .flat_map(|(_, bucket)| bucket.entries)
            .filter(|entry| entry.key.matches(key))
            .map(|entry| entry.value)
            .collect())
    }

    /// Every stored entry, bucket by bucket.
    pub fn all_entries(&self) -> CoreResult<Vec<(EntryKey, u64)>> {
        let mut entries = Vec::with_capacity(self.header.number_of_entries as usize);
        for bucket in 0..self.header.number_of_buckets {
            let mut next = Some(1 + bucket);
            while let Some(slot) = next {
                let bucket = self.read_bucket(slot)?;
                next = bucket.next_entry_index;
                entries.extend(bucket.entries.into_iter().map(|e| (e.key, e.value)));
            }
        }
        Ok(entries)
    }

    pub fn sync(&self) -> CoreResult<()> {
        self.file.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create(dir: &Path, buckets: u64) -> HashFile {
        HashFile::create(&dir.join("h.hash"), buckets, 0.75, 512, 2).unwrap()
    }

    #[test]
    fn create_writes_header_and_buckets() {
        let dir = tempdir().unwrap();
        let file = create(dir.path(), 4);
        assert_eq!(file.header().number_of_buckets, 4);
        assert_eq!(file.header().number_of_entries, 0);
        assert_eq!(file.file.total_number_of_records(), 5);
        assert!(file.all_entries().unwrap().is_empty());
    }

    #[test]
    fn non_unique_keeps_every_pair_once() {
        let dir = tempdir().unwrap();
        let mut file = create(dir.path(), 1);
        let key = Value::from("k");
        assert!(file.insert(Some(&key), 1, false).unwrap());
        assert!(file.insert(Some(&key), 2, false).unwrap());
        assert!(file.insert(Some(&key), 3, false).unwrap());
        assert!(!file.insert(Some(&key), 2, false).unwrap());
        assert_eq!(file.header().number_of_entries, 3);

        let mut found = file.lookup(Some(&key)).unwrap();
        found.sort_unstable();
        assert_eq!(found, vec![1, 2, 3]);

        assert!(file.delete(Some(&key), 2).unwrap());
        assert!(!file.delete(Some(&key), 2).unwrap());
        let mut found = file.lookup(Some(&key)).unwrap();
        found.sort_unstable();
        assert_eq!(found, vec![1, 3]);
        assert_eq!(file.header().number_of_entries, 2);
    }

    #[test]
    fn unique_moves_the_address() {
        let dir = tempdir().unwrap();
        let mut file = create(dir.path(), 2);
        let key = Value::from(7i64);
        assert!(file.insert(Some(&key), 1, true).unwrap());
        assert!(!file.insert(Some(&key), 9, true).unwrap());
        assert_eq!(file.lookup(Some(&key)).unwrap(), vec![9]);
        assert_eq!(file.header().number_of_entries, 1);
    }

    #[test]
    fn overflow_records_chain_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h.hash");
        {
            let mut file = HashFile::create(&path, 1, 0.75, 512, 2).unwrap();
            let batch = (0..7u64)
                .map(|i| (EntryKey::Defined(Value::Integer(i as i64)), i))
                .collect();
            assert_eq!(file.insert_many(batch, false).unwrap(), 7);
            // head plus three overflow records
            assert_eq!(file.file.total_number_of_records(), 5);
            file.sync().unwrap();
        }
        let file = HashFile::open(&path, 512, 2).unwrap();
        assert_eq!(file.header().number_of_entries, 7);
        assert_eq!(file.all_entries().unwrap().len(), 7);
        assert_eq!(file.lookup(Some(&Value::Integer(5))).unwrap(), vec![5]);
        assert!(file.load_factor_exceeded());
    }

    #[test]
    fn reset_empties_and_resizes() {
        let dir = tempdir().unwrap();
        let mut file = create(dir.path(), 2);
        file.insert(Some(&Value::from("a")), 1, false).unwrap();
        file.reset(6).unwrap();
        assert_eq!(file.header().number_of_buckets, 6);
        assert_eq!(file.header().number_of_entries, 0);
        assert!(file.lookup(Some(&Value::from("a"))).unwrap().is_empty());
        assert_eq!(file.file.total_number_of_records(), 7);
    }

    #[test]
    fn null_and_undefined_keys_are_distinct() {
        let dir = tempdir().unwrap();
        let mut file = create(dir.path(), 8);
        file.insert(None, 1, false).unwrap();
        file.insert(Some(&Value::Null), 2, false).unwrap();
        assert_eq!(file.lookup(None).unwrap(), vec![1]);
        assert_eq!(file.lookup(Some(&Value::Null)).unwrap(), vec![2]);
    }

    #[test]
    fn open_rejects_files_without_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.dat");
        RecordFile::open(&path, 512).unwrap();
        let err = HashFile::open(&path, 512, 2).unwrap_err();
        assert!(matches!(err, CoreError::InvalidFormat { .. }));
    }
}
