//! Tables: a data file plus the indices kept in step with it.

use crate::column::ColumnType;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::index::{
    ArrayTableIndex, BTreeTableIndex, DefaultTableIndex, HashTableIndex, IndexSpec, TableIndex,
};
use crate::lock::LockManager;
use crate::record::Record;
use crate::record_file::RecordFile;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabula_storage::InMemoryBackend;
use tracing::{info, warn};
use uuid::Uuid;

/// A table of [`Record`]s with secondary indices.
///
/// Records are addressed by their slot in the data file. Every mutation
/// updates the data file and each registered index; if an index rejects
/// the change, the indices already touched and the data file are rolled
/// back before the error is returned.
///
/// ```
/// use tabula_core::{ColumnType, Config, Record, Table, TableIndex, Value};
///
/// let table = Table::in_memory("fruit", Config::default()).unwrap();
/// let by_name = table
///     .create_btree_index("by_name", "name", ColumnType::Text, false)
///     .unwrap();
///
/// table.insert(&Record::new().with("name", "banana")).unwrap();
/// table.insert(&Record::new().with("name", "apple")).unwrap();
///
/// let found = by_name.equal(Some(&Value::from("apple"))).unwrap();
/// assert_eq!(found.len(), 1);
/// ```
pub struct Table {
    uuid: Uuid,
    name: String,
    data: Arc<RecordFile>,
    dir: Option<PathBuf>,
    indices: RwLock<Vec<Arc<dyn TableIndex>>>,
    locks: LockManager,
    config: Config,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("uuid", &self.uuid)
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("indices", &self.indices.read().len())
            .finish()
    }
}

impl Table {
    /// Opens (or creates) the table `name` stored in `dir`.
    ///
    /// # Errors
    ///
    /// Fails if the data file cannot be opened.
    pub fn open(dir: &Path, name: &str, config: Config) -> CoreResult<Self> {
        let data = RecordFile::open(&dir.join(format!("{name}.dat")), config.data_record_length)?;
        Ok(Self::with_data(name, data, Some(dir.to_path_buf()), config))
    }

    /// Creates a table held entirely in memory. Hash indices need a
    /// directory and are unavailable.
    ///
    /// # Errors
    ///
    /// Fails if the configured record length is invalid.
    pub fn in_memory(name: &str, config: Config) -> CoreResult<Self> {
        let data = RecordFile::with_backend(Box::new(InMemoryBackend::new()), config.data_record_length)?;
        Ok(Self::with_data(name, data, None, config))
    }

    fn with_data(name: &str, data: RecordFile, dir: Option<PathBuf>, config: Config) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            data: Arc::new(data),
            dir,
            indices: RwLock::new(Vec::new()),
            locks: LockManager::new(config.lock_timeout),
            config,
        }
    }

    /// Table identifier.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying data file.
    #[must_use]
    pub fn data(&self) -> &Arc<RecordFile> {
        &self.data
    }

    fn index_path(&self, index: &str, extension: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.{index}.{extension}", self.name)))
    }

    fn spec(&self, name: &str, column: &str, column_type: ColumnType, unique: bool) -> CoreResult<IndexSpec> {
        if self.indices.read().iter().any(|index| index.spec().name == name) {
            return Err(CoreError::illegal_argument(format!(
                "table {} already has an index named {name}",
                self.name
            )));
        }
        let spec = IndexSpec::new(name, self.uuid, column, column_type);
        Ok(if unique { spec.unique() } else { spec })
    }

    fn register<I: TableIndex + 'static>(&self, index: I) -> Arc<I> {
        let index = Arc::new(index);
        info!(
            table = %self.name,
            index = %index.spec().name,
            column = %index.spec().column,
            kind = index.kind(),
            "registered index"
        );
        self.indices.write().push(Arc::clone(&index) as Arc<dyn TableIndex>);
        index
    }

    /// Creates a B+Tree index on `column`, built from the current data.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken, the order is invalid, or a unique index
    /// finds duplicate values.
    pub fn create_btree_index(
        &self,
        name: &str,
        column: &str,
        column_type: ColumnType,
        unique: bool,
    ) -> CoreResult<Arc<BTreeTableIndex>> {
        let spec = self.spec(name, column, column_type, unique)?;
        let data = Arc::clone(&self.data);
        let index = match self.index_path(name, "btree") {
            Some(path) => BTreeTableIndex::open(&path, spec, data, &self.config)?,
            None => BTreeTableIndex::in_memory(spec, data, &self.config)?,
        };
        Ok(self.register(index))
    }

    /// Creates an array index on `column`.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken or the column type is not an array type.
    pub fn create_array_index(
        &self,
        name: &str,
        column: &str,
        column_type: ColumnType,
        unique: bool,
    ) -> CoreResult<Arc<ArrayTableIndex>> {
        if !column_type.is_array() {
            return Err(CoreError::illegal_argument(format!(
                "array index {name} needs an array column type"
            )));
        }
        let spec = self.spec(name, column, column_type, unique)?;
        let data = Arc::clone(&self.data);
        let index = match self.index_path(name, "array") {
            Some(path) => ArrayTableIndex::open(&path, spec, data, &self.config)?,
            None => ArrayTableIndex::in_memory(spec, data, &self.config)?,
        };
        Ok(self.register(index))
    }

    /// Creates a hash index on `column`.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken or the table has no directory.
    pub fn create_hash_index(
        &self,
        name: &str,
        column: &str,
        column_type: ColumnType,
        unique: bool,
    ) -> CoreResult<Arc<HashTableIndex>> {
        let path = self.index_path(name, "hash").ok_or_else(|| {
            CoreError::illegal_argument(format!("hash index {name} needs an on-disk table"))
        })?;
        let spec = self.spec(name, column, column_type, unique)?;
        let index = HashTableIndex::open(&path, spec, Arc::clone(&self.data), &self.config)?;
        Ok(self.register(index))
    }

    /// Registered indices, in creation order.
    #[must_use]
    pub fn indices(&self) -> Vec<Arc<dyn TableIndex>> {
        self.indices.read().clone()
    }

    /// The first index on `column`, or a scanning index if there is none.
    #[must_use]
    pub fn index_for(&self, column: &str) -> Arc<dyn TableIndex> {
        if let Some(index) = self
            .indices
            .read()
            .iter()
            .find(|index| index.spec().column == column)
        {
            return Arc::clone(index);
        }
        let spec = IndexSpec::new(format!("{column}_scan"), self.uuid, column, ColumnType::Any);
        Arc::new(DefaultTableIndex::new(spec, Arc::clone(&self.data)))
    }

    /// Reads the record at `address`.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn get(&self, address: u64) -> CoreResult<Option<Record>> {
        self.data.read_record(address)
    }

    /// Stores `record` and indexes it, returning its address.
    ///
    /// # Errors
    ///
    /// Fails if the record does not fit a slot or an index rejects it; the
    /// table is unchanged afterwards.
    pub fn insert(&self, record: &Record) -> CoreResult<u64> {
        let address = self.data.append_record(record)?;
        let indices = self.indices();
        for (position, index) in indices.iter().enumerate() {
            if let Err(err) = index.insert(record.get(&index.spec().column), address) {
                for done in &indices[..=position] {
                    if let Err(undo) = done.delete(record.get(&done.spec().column), address) {
                        warn!(index = %done.spec().name, error = %undo, "rollback failed");
                    }
                }
                self.data.delete_record(address)?;
                return Err(err);
            }
        }
        Ok(address)
    }

    fn record_lock(&self, address: u64) -> String {
        format!("{}/{address}", self.uuid)
    }

    /// Replaces the record at `address`, updating indices whose column
    /// changed.
    ///
    /// # Errors
    ///
    /// Fails with not found if `address` holds no record, or with the
    /// index's error (after rolling back) if an index rejects the change.
    pub fn update(&self, address: u64, record: &Record) -> CoreResult<()> {
        let _lock = self.locks.write(&self.record_lock(address))?;
        let old: Record = self
            .data
            .read_record(address)?
            .ok_or_else(|| CoreError::not_found(format!("record {address} in {}", self.name)))?;
        self.data.update_record(address, record)?;

        let mut changed: Vec<Arc<dyn TableIndex>> = Vec::new();
        for index in self.indices() {
            let column = &index.spec().column;
            let (before, after) = (old.get(column), record.get(column));
            if before == after {
                continue;
            }
            index.delete(before, address)?;
            if let Err(err) = index.insert(after, address) {
                let undo = index
                    .delete(after, address)
                    .and_then(|()| index.insert(before, address));
                if let Err(undo) = undo {
                    warn!(index = %index.spec().name, error = %undo, "rollback failed");
                }
                for done in &changed {
                    let column = &done.spec().column;
                    let undo = done
                        .delete(record.get(column), address)
                        .and_then(|()| done.insert(old.get(column), address));
                    if let Err(undo) = undo {
                        warn!(index = %done.spec().name, error = %undo, "rollback failed");
                    }
                }
                self.data.update_record(address, &old)?;
                return Err(err);
            }
            changed.push(index);
        }
        Ok(())
    }

    /// Deletes the record at `address`. Returns false if it was not live.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn delete(&self, address: u64) -> CoreResult<bool> {
        let _lock = self.locks.write(&self.record_lock(address))?;
        let Some(old) = self.data.read_record::<Record>(address)? else {
            return Ok(false);
        };
        for index in self.indices() {
            index.delete(old.get(&index.spec().column), address)?;
        }
        self.data.delete_record(address)
    }

    /// Rebuilds every index from the data file.
    ///
    /// # Errors
    ///
    /// Fails with the first index error.
    pub fn refresh_indices(&self) -> CoreResult<()> {
        for index in self.indices() {
            index.refresh()?;
        }
        Ok(())
    }

    /// Syncs the data file.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn sync(&self) -> CoreResult<()> {
        self.data.sync()
    }
}
