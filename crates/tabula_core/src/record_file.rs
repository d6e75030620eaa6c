//! Fixed-length slotted record files.
//!
//! A record file is a header followed by equally sized slots:
//!
//! ```text
//! | header (48) | slot 0 | slot 1 | ... | slot n-1 |
//! ```
//!
//! Header layout (little endian):
//!
//! | offset | size | field                                  |
//! |--------|------|----------------------------------------|
//! | 0      | 4    | magic `TBRF`                           |
//! | 4      | 2    | format version                         |
//! | 6      | 2    | reserved                               |
//! | 8      | 4    | record length                          |
//! | 12     | 8    | live record count                      |
//! | 20     | 8    | deleted record count                   |
//! | 28     | 8    | high-water mark (slots ever allocated) |
//! | 36     | 8    | free list head (`u64::MAX` = empty)    |
//! | 44     | 4    | padding                                |
//!
//! Each slot holds a framed [`Slot`] document. Deleted slots hold a
//! tombstone that links to the previously deleted slot, forming a LIFO free
//! list that appends pop before growing the file.

use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tabula_codec::{decode_slot, encode_slot, to_cbor, SLOT_PREFIX_SIZE};
use tabula_storage::{FileBackend, StorageBackend};
use tracing::warn;

/// Size of the record file header in bytes.
pub const HEADER_SIZE: u64 = 48;

const MAGIC: [u8; 4] = *b"TBRF";
const FORMAT_VERSION: u16 = 1;
const NO_SLOT: u64 = u64::MAX;

/// A type that can be stored in a record file slot.
pub trait SlotRecord: Serialize + DeserializeOwned {
    /// Called after a successful read with the slot the value came from.
    fn attach_index(&mut self, _index: u64) {}
}

impl SlotRecord for tabula_codec::Value {}

/// Content of a single slot.
#[derive(Debug, Serialize, Deserialize)]
enum Slot<T> {
    Live(T),
    Tombstone {
        previous_deleted_record_index: Option<u64>,
    },
}

/// What a slot holds, without decoding the live payload.
enum SlotState {
    Empty,
    Live,
    Tombstone(Option<u64>),
    Damaged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    record_length: u32,
    live: u64,
    deleted: u64,
    high_water: u64,
    free_head: Option<u64>,
}

impl Header {
    fn empty(record_length: u32) -> Self {
        Self {
            record_length,
            live: 0,
            deleted: 0,
            high_water: 0,
            free_head: None,
        }
    }

    fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[8..12].copy_from_slice(&self.record_length.to_le_bytes());
        buf[12..20].copy_from_slice(&self.live.to_le_bytes());
        buf[20..28].copy_from_slice(&self.deleted.to_le_bytes());
        buf[28..36].copy_from_slice(&self.high_water.to_le_bytes());
        buf[36..44].copy_from_slice(&self.free_head.unwrap_or(NO_SLOT).to_le_bytes());
        buf
    }

    fn decode(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(CoreError::invalid_format("record file header too short"));
        }
        if bytes[0..4] != MAGIC {
            return Err(CoreError::invalid_format("bad record file magic"));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported record file version {version}"
            )));
        }

        let u64_at = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(raw)
        };
        let free_head = u64_at(36);

        Ok(Self {
            record_length: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            live: u64_at(12),
            deleted: u64_at(20),
            high_water: u64_at(28),
            free_head: (free_head != NO_SLOT).then_some(free_head),
        })
    }
}

struct Inner {
    backend: Box<dyn StorageBackend>,
    header: Header,
}

/// A slotted file of fixed-length records with a free list of deleted slots.
///
/// All methods take `&self`; the backend and header sit behind a
/// reader-writer lock so concurrent readers never observe a half-applied
/// header update.
///
/// # Example
///
/// ```rust
/// use tabula_core::{Record, RecordFile};
/// use tabula_storage::InMemoryBackend;
///
/// let file = RecordFile::with_backend(Box::new(InMemoryBackend::new()), 257).unwrap();
/// let index = file.append_record(&Record::new().with("a", 1i64)).unwrap();
/// assert_eq!(index, 0);
///
/// let record: Record = file.read_record(index).unwrap().unwrap();
/// assert_eq!(record.index(), Some(0));
/// ```
pub struct RecordFile {
    inner: RwLock<Inner>,
    record_length: usize,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for RecordFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("RecordFile")
            .field("path", &self.path)
            .field("record_length", &self.record_length)
            .field("header", &inner.header)
            .finish()
    }
}

impl RecordFile {
    /// Opens the record file at `path`, creating it with an empty header if
    /// it does not exist.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened, its header is invalid, or it was
    /// created with a different record length.
    pub fn open(path: &Path, record_length: usize) -> CoreResult<Self> {
        let backend = FileBackend::open_with_create_dirs(path)?;
        let mut file = Self::with_backend(Box::new(backend), record_length)?;
        file.path = Some(path.to_path_buf());
        Ok(file)
    }

    /// Opens a record file over an arbitrary backend.
    ///
    /// # Errors
    ///
    /// Same as [`RecordFile::open`].
    pub fn with_backend(
        mut backend: Box<dyn StorageBackend>,
        record_length: usize,
    ) -> CoreResult<Self> {
        let length = u32::try_from(record_length)
            .map_err(|_| CoreError::illegal_argument("record length exceeds u32"))?;
        if record_length <= SLOT_PREFIX_SIZE {
            return Err(CoreError::illegal_argument(format!(
                "record length {record_length} leaves no room for a payload"
            )));
        }

        let header = if backend.size()? == 0 {
            let header = Header::empty(length);
            backend.write_at(0, &header.encode())?;
            backend.flush()?;
            header
        } else {
            let header = Header::decode(&backend.read_at(0, HEADER_SIZE as usize)?)?;
            if header.record_length != length {
                return Err(CoreError::invalid_format(format!(
                    "file has record length {}, expected {record_length}",
                    header.record_length
                )));
            }
            header
        };

        Ok(Self {
            inner: RwLock::new(Inner { backend, header }),
            record_length,
            path: None,
        })
    }

    /// Path of the underlying file, if file backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Fixed slot length in bytes.
    #[must_use]
    pub fn record_length(&self) -> usize {
        self.record_length
    }

    /// Returns true if `record` would fit one slot of this file.
    ///
    /// # Errors
    ///
    /// Fails only if the record cannot be encoded.
    pub fn fits<T: SlotRecord>(&self, record: &T) -> CoreResult<bool> {
        let payload = to_cbor(&Slot::Live(record))?;
        Ok(SLOT_PREFIX_SIZE + payload.len() <= self.record_length)
    }

    fn offset(&self, index: u64) -> u64 {
        HEADER_SIZE + index * self.record_length as u64
    }

    fn slot_state(&self, inner: &Inner, index: u64) -> CoreResult<SlotState> {
        let bytes = inner
            .backend
            .read_at(self.offset(index), self.record_length)?;
        Ok(match decode_slot::<Slot<IgnoredAny>>(&bytes) {
            Ok(None) => SlotState::Empty,
            Ok(Some(Slot::Live(_))) => SlotState::Live,
            Ok(Some(Slot::Tombstone {
                previous_deleted_record_index,
            })) => SlotState::Tombstone(previous_deleted_record_index),
            Err(e) => {
                warn!(slot = index, error = %e, "undecodable record slot");
                SlotState::Damaged
            }
        })
    }

    fn write_header(inner: &mut Inner) -> CoreResult<()> {
        let bytes = inner.header.encode();
        inner.backend.write_at(0, &bytes)?;
        Ok(())
    }

    fn write_tombstone(&self, inner: &mut Inner, index: u64, previous: Option<u64>) -> CoreResult<()> {
        let slot = encode_slot(
            &Slot::<()>::Tombstone {
                previous_deleted_record_index: previous,
            },
            self.record_length,
        )?;
        inner.backend.write_at(self.offset(index), &slot)?;
        Ok(())
    }

    /// Picks the slot for a new record: the free list head, else a new slot.
    fn allocate(&self, inner: &mut Inner) -> CoreResult<u64> {
        let index = match inner.header.free_head {
            Some(head) => {
                let next = match self.slot_state(inner, head)? {
                    SlotState::Tombstone(previous) => previous,
                    _ => {
                        warn!(slot = head, "free list head is not a tombstone, dropping free list");
                        None
                    }
                };
                inner.header.free_head = next;
                inner.header.deleted = inner.header.deleted.saturating_sub(1);
                head
            }
            None => {
                let index = inner.header.high_water;
                inner.header.high_water += 1;
                index
            }
        };
        inner.header.live += 1;
        Ok(index)
    }

    /// Appends a record, reusing the most recently deleted slot if any.
    ///
    /// # Errors
    ///
    /// Fails with a slot overflow if the record does not fit the record
    /// length, or on I/O errors.
    pub fn append_record<T: SlotRecord>(&self, record: &T) -> CoreResult<u64> {
        let slot = encode_slot(&Slot::Live(record), self.record_length)?;

        let mut inner = self.inner.write();
        let index = self.allocate(&mut inner)?;
        inner.backend.write_at(self.offset(index), &slot)?;
        Self::write_header(&mut inner)?;
        Ok(index)
    }

    /// Appends records in order, writing the header once.
    ///
    /// Slot allocation is identical to repeated [`append_record`] calls.
    ///
    /// [`append_record`]: RecordFile::append_record
    ///
    /// # Errors
    ///
    /// Fails before writing anything if any record overflows its slot.
    pub fn append_records<T: SlotRecord>(&self, records: &[T]) -> CoreResult<Vec<u64>> {
        let slots = records
            .iter()
            .map(|record| encode_slot(&Slot::Live(record), self.record_length))
            .collect::<Result<Vec<_>, _>>()?;

        let mut inner = self.inner.write();
        let mut indices = Vec::with_capacity(slots.len());
        for slot in &slots {
            let index = self.allocate(&mut inner)?;
            inner.backend.write_at(self.offset(index), slot)?;
            indices.push(index);
        }
        Self::write_header(&mut inner)?;
        Ok(indices)
    }

    fn read_locked<T: SlotRecord>(&self, inner: &Inner, index: u64) -> CoreResult<Option<T>> {
        if index >= inner.header.high_water {
            return Ok(None);
        }
        let bytes = inner
            .backend
            .read_at(self.offset(index), self.record_length)?;
        match decode_slot::<Slot<T>>(&bytes) {
            Ok(Some(Slot::Live(mut record))) => {
                record.attach_index(index);
                Ok(Some(record))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(slot = index, error = %e, "failed to decode record");
                Ok(None)
            }
        }
    }

    /// Reads the record in slot `index`.
    ///
    /// Returns `None` for deleted, unallocated, or undecodable slots.
    ///
    /// # Errors
    ///
    /// Fails only on I/O errors.
    pub fn read_record<T: SlotRecord>(&self, index: u64) -> CoreResult<Option<T>> {
        let inner = self.inner.read();
        self.read_locked(&inner, index)
    }

    /// Reads several slots; see [`RecordFile::read_record`].
    ///
    /// # Errors
    ///
    /// Fails only on I/O errors.
    pub fn read_records<T: SlotRecord>(&self, indices: &[u64]) -> CoreResult<Vec<Option<T>>> {
        let inner = self.inner.read();
        indices
            .iter()
            .map(|index| self.read_locked(&inner, *index))
            .collect()
    }

    /// Overwrites a live record in place.
    ///
    /// # Errors
    ///
    /// Fails with not found if the slot is unallocated or deleted.
    pub fn update_record<T: SlotRecord>(&self, index: u64, record: &T) -> CoreResult<()> {
        let slot = encode_slot(&Slot::Live(record), self.record_length)?;

        let mut inner = self.inner.write();
        if index >= inner.header.high_water {
            return Err(CoreError::not_found(format!("record slot {index}")));
        }
        match self.slot_state(&inner, index)? {
            SlotState::Tombstone(_) | SlotState::Empty => {
                Err(CoreError::not_found(format!("record slot {index} is deleted")))
            }
            SlotState::Live | SlotState::Damaged => {
                inner.backend.write_at(self.offset(index), &slot)?;
                Ok(())
            }
        }
    }

    fn delete_locked(&self, inner: &mut Inner, index: u64) -> CoreResult<bool> {
        if index >= inner.header.high_water {
            return Ok(false);
        }
        match self.slot_state(inner, index)? {
            SlotState::Tombstone(_) | SlotState::Empty => Ok(false),
            SlotState::Live | SlotState::Damaged => {
                let previous = inner.header.free_head;
                self.write_tombstone(inner, index, previous)?;
                inner.header.free_head = Some(index);
                inner.header.live = inner.header.live.saturating_sub(1);
                inner.header.deleted += 1;
                Ok(true)
            }
        }
    }

    /// Tombstones a record and pushes its slot onto the free list.
    ///
    /// Returns `false` if the slot was not live.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn delete_record(&self, index: u64) -> CoreResult<bool> {
        let mut inner = self.inner.write();
        let deleted = self.delete_locked(&mut inner, index)?;
        if deleted {
            Self::write_header(&mut inner)?;
        }
        Ok(deleted)
    }

    /// Deletes several records, writing the header once.
    ///
    /// Returns how many slots were actually deleted.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors; deletions before the failure stay applied.
    pub fn delete_records(&self, indices: &[u64]) -> CoreResult<usize> {
        let mut inner = self.inner.write();
        let mut count = 0;
        let mut result = Ok(());
        for index in indices {
            match self.delete_locked(&mut inner, *index) {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        Self::write_header(&mut inner)?;
        result.map(|()| count)
    }

    /// Drops every slot at or above `index` and rebuilds the free list and
    /// counts from the surviving slots.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn truncate(&self, index: u64) -> CoreResult<()> {
        let mut inner = self.inner.write();
        if index >= inner.header.high_water {
            return Ok(());
        }

        let new_size = self.offset(index);
        inner.backend.truncate(new_size)?;

        let mut header = Header::empty(inner.header.record_length);
        header.high_water = index;
        for slot in 0..index {
            match self.slot_state(&inner, slot)? {
                SlotState::Tombstone(previous) => {
                    if previous != header.free_head {
                        self.write_tombstone(&mut inner, slot, header.free_head)?;
                    }
                    header.free_head = Some(slot);
                    header.deleted += 1;
                }
                SlotState::Live | SlotState::Damaged => header.live += 1,
                SlotState::Empty => {
                    warn!(slot, "unwritten slot below high-water mark, reclaiming");
                    self.write_tombstone(&mut inner, slot, header.free_head)?;
                    header.free_head = Some(slot);
                    header.deleted += 1;
                }
            }
        }

        inner.header = header;
        Self::write_header(&mut inner)?;
        inner.backend.flush()?;
        Ok(())
    }

    /// Removes every slot and resets all counters.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn clear(&self) -> CoreResult<()> {
        let mut inner = self.inner.write();
        inner.backend.truncate(HEADER_SIZE)?;
        inner.header = Header::empty(inner.header.record_length);
        Self::write_header(&mut inner)?;
        inner.backend.flush()?;
        Ok(())
    }

    /// Number of live records.
    #[must_use]
    pub fn number_of_records(&self) -> u64 {
        self.inner.read().header.live
    }

    /// Number of tombstoned slots on the free list.
    #[must_use]
    pub fn number_of_deleted_records(&self) -> u64 {
        self.inner.read().header.deleted
    }

    /// Number of slots ever allocated (the high-water mark).
    #[must_use]
    pub fn total_number_of_records(&self) -> u64 {
        self.inner.read().header.high_water
    }

    /// Reads every live record in slot order.
    ///
    /// # Errors
    ///
    /// Fails only on I/O errors; undecodable slots are skipped.
    pub fn live_records<T: SlotRecord>(&self) -> CoreResult<Vec<T>> {
        let inner = self.inner.read();
        let mut records = Vec::with_capacity(inner.header.live as usize);
        for index in 0..inner.header.high_water {
            if let Some(record) = self.read_locked(&inner, index)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Flushes buffered writes and syncs the file to disk.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn sync(&self) -> CoreResult<()> {
        let mut inner = self.inner.write();
        inner.backend.flush()?;
        inner.backend.sync()?;
        Ok(())
    }
}
