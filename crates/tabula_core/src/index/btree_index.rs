//! B+Tree table index.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::index::btree::{allocate_roots, AddressTree, ValueTree, MIN_ORDER};
use crate::index::resolve;
use crate::index::traits::{IndexSpec, TableIndex};
use crate::record::Record;
use crate::record_file::RecordFile;
use parking_lot::RwLock;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use tabula_codec::Value;
use tabula_storage::InMemoryBackend;
use tracing::{info, warn};

const VALUE_ROOT: u64 = 0;
const NULL_ROOT: u64 = 1;
const UNDEFINED_ROOT: u64 = 2;
const ROOT_COUNT: usize = 3;

pub(crate) fn check_order(order: usize) -> CoreResult<()> {
    if order < MIN_ORDER {
        return Err(CoreError::illegal_argument(format!(
            "B+Tree order {order} is below the minimum of {MIN_ORDER}"
        )));
    }
    Ok(())
}

pub(crate) fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// An index backed by a persisted B+Tree.
///
/// The index file holds three trees rooted at fixed slots:
///
/// | slot | tree                                        |
/// |------|---------------------------------------------|
/// | 0    | column value to per-value address tree      |
/// | 1    | addresses of records whose column is null   |
/// | 2    | addresses of records without the column     |
///
/// Duplicate values share one key in the value tree; each key owns an
/// address tree holding every record with that value, so deleting one of
/// many duplicates never disturbs the others.
///
/// `unequal(v)` is `less(v) ∪ greater(v)` and never returns null or
/// undefined columns; see [`crate::predicate`].
pub struct BTreeTableIndex {
    spec: IndexSpec,
    data: Arc<RecordFile>,
    file: RecordFile,
    order: usize,
    latch: RwLock<()>,
}

impl std::fmt::Debug for BTreeTableIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BTreeTableIndex")
            .field("name", &self.spec.name)
            .field("column", &self.spec.column)
            .field("order", &self.order)
            .finish()
    }
}

impl BTreeTableIndex {
    /// Opens the index file at `path`, building it from `data` if new.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, an invalid order, or (for unique indices) if
    /// the existing data holds duplicate values.
    pub fn open(path: &Path, spec: IndexSpec, data: Arc<RecordFile>, config: &Config) -> CoreResult<Self> {
        let file = RecordFile::open(path, config.btree_record_length)?;
        Self::with_file(file, spec, data, config)
    }

    /// Creates an index whose file lives in memory.
    ///
    /// # Errors
    ///
    /// Same as [`BTreeTableIndex::open`].
    pub fn in_memory(spec: IndexSpec, data: Arc<RecordFile>, config: &Config) -> CoreResult<Self> {
        let file = RecordFile::with_backend(Box::new(InMemoryBackend::new()), config.btree_record_length)?;
        Self::with_file(file, spec, data, config)
    }

    fn with_file(file: RecordFile, spec: IndexSpec, data: Arc<RecordFile>, config: &Config) -> CoreResult<Self> {
        check_order(config.btree_order)?;
        let index = Self {
            spec,
            data,
            file,
            order: config.btree_order,
            latch: RwLock::new(()),
        };
        if index.file.total_number_of_records() == 0 {
            let _guard = index.latch.write();
            index.rebuild()?;
        }
        Ok(index)
    }

    fn values(&self) -> ValueTree<'_> {
        ValueTree::open(&self.file, VALUE_ROOT, self.order, &self.spec.column_type)
    }

    fn nulls(&self) -> AddressTree<'_> {
        AddressTree::open(&self.file, NULL_ROOT, self.order)
    }

    fn undefined(&self) -> AddressTree<'_> {
        AddressTree::open(&self.file, UNDEFINED_ROOT, self.order)
    }

    fn initialize(&self) -> CoreResult<()> {
        let roots = allocate_roots(&self.file, ROOT_COUNT)?;
        if roots != [VALUE_ROOT, NULL_ROOT, UNDEFINED_ROOT] {
            return Err(CoreError::invalid_format("index roots not at fixed slots"));
        }
        self.values().initialize()?;
        AddressTree::initialize(&self.file, NULL_ROOT, self.order)?;
        AddressTree::initialize(&self.file, UNDEFINED_ROOT, self.order)
    }

    fn rebuild(&self) -> CoreResult<usize> {
        self.file.clear()?;
        self.initialize()?;
        let mut indexed = 0;
        for record in self.data.live_records::<Record>()? {
            let Some(address) = record.index() else { continue };
            match self.insert_locked(record.get(&self.spec.column), address) {
                Ok(()) => indexed += 1,
                Err(CoreError::IllegalArgument { message }) => {
                    warn!(index = %self.spec.uuid, address, %message, "skipping record");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(indexed)
    }

    fn insert_locked(&self, value: Option<&Value>, address: u64) -> CoreResult<()> {
        match value {
            None => self.undefined().insert(address).map(drop),
            Some(Value::Null) => self.nulls().insert(address).map(drop),
            Some(value) => {
                let values = self.values();
                if self.spec.unique {
                    if let Some(existing) = values.conflicting(value, address)? {
                        return Err(CoreError::Conflict {
                            index: self.spec.name.clone(),
                            key: value.to_string(),
                            existing,
                        });
                    }
                }
                values.insert(value, address).map(drop)
            }
        }
    }

    fn equal_addresses(&self, value: Option<&Value>) -> CoreResult<Vec<u64>> {
        match value {
            None => self.undefined().addresses(),
            Some(Value::Null) => self.nulls().addresses(),
            Some(value) => self.values().equal(value),
        }
    }

    fn range_records(&self, lower: Bound<&Value>, upper: Bound<&Value>) -> CoreResult<Vec<Record>> {
        let _guard = self.latch.read();
        resolve(&self.data, self.values().range(lower, upper)?)
    }

    /// Path of the index file, if file backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.file.path()
    }

    /// Flushes the index file to disk.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn sync(&self) -> CoreResult<()> {
        self.file.sync()
    }
}

impl TableIndex for BTreeTableIndex {
    fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    fn kind(&self) -> &'static str {
        "btree index"
    }

    fn insert(&self, value: Option<&Value>, address: u64) -> CoreResult<()> {
        let _guard = self.latch.write();
        self.insert_locked(value, address)
    }

    fn delete(&self, value: Option<&Value>, address: u64) -> CoreResult<()> {
        let _guard = self.latch.write();
        match value {
            None => self.undefined().remove(address)?,
            Some(Value::Null) => self.nulls().remove(address)?,
            Some(value) => self.values().remove(value, address)?,
        };
        Ok(())
    }

    fn refresh(&self) -> CoreResult<()> {
        let _guard = self.latch.write();
        let count = self.rebuild()?;
        info!(index = %self.spec.uuid, name = %self.spec.name, records = count, "refreshed btree index");
        Ok(())
    }

    fn equal(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let _guard = self.latch.read();
        resolve(&self.data, self.equal_addresses(value)?)
    }

    fn unequal(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let _guard = self.latch.read();
        let addresses = match value {
            None => {
                let mut addresses = self.nulls().addresses()?;
                addresses.extend(self.values().all()?);
                addresses
            }
            Some(Value::Null) => {
                let mut addresses = self.undefined().addresses()?;
                addresses.extend(self.values().all()?);
                addresses
            }
            Some(value) => {
                let values = self.values();
                let mut addresses = values.range(Bound::Unbounded, Bound::Excluded(value))?;
                addresses.extend(values.range(Bound::Excluded(value), Bound::Unbounded)?);
                addresses
            }
        };
        resolve(&self.data, addresses)
    }

    fn greater(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        match present(value) {
            Some(v) => self.range_records(Bound::Excluded(v), Bound::Unbounded),
            None => Ok(Vec::new()),
        }
    }

    fn greater_or_equal(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        match present(value) {
            Some(v) => self.range_records(Bound::Included(v), Bound::Unbounded),
            None => Ok(Vec::new()),
        }
    }

    fn less(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        match present(value) {
            Some(v) => self.range_records(Bound::Unbounded, Bound::Excluded(v)),
            None => Ok(Vec::new()),
        }
    }

    fn less_or_equal(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        match present(value) {
            Some(v) => self.range_records(Bound::Unbounded, Bound::Included(v)),
            None => Ok(Vec::new()),
        }
    }

    fn between(&self, low: Option<&Value>, high: Option<&Value>) -> CoreResult<Vec<Record>> {
        match (present(low), present(high)) {
            (Some(low), Some(high)) => self.range_records(Bound::Included(low), Bound::Included(high)),
            _ => Ok(Vec::new()),
        }
    }

    fn in_values(&self, values: &[Value]) -> CoreResult<Vec<Record>> {
        let _guard = self.latch.read();
        let mut addresses = Vec::new();
        for value in values {
            addresses.extend(self.equal_addresses(Some(value))?);
        }
        resolve(&self.data, addresses)
    }
}
