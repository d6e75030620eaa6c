//! Array table index.

use crate::column::ColumnType;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::index::btree::{allocate_roots, AddressTree, ValueTree};
use crate::index::btree_index::check_order;
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

const ELEMENT_ROOT: u64 = 0;
const NULL_ROOT: u64 = 1;
const UNDEFINED_ROOT: u64 = 2;
const ARRAY_ROOT: u64 = 3;
const ROOT_COUNT: usize = 4;

const ELEMENT_SEPARATOR: char = '\u{1f}';

static ARRAY_KEY_COLUMN: ColumnType = ColumnType::Text;

fn escape_into(key: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '\\' => key.push_str("\\\\"),
            ELEMENT_SEPARATOR => key.push_str("\\s"),
            c => key.push(c),
        }
    }
}

/// Joins the elements of an array into one text key.
///
/// Each element is preceded by a unit separator. Text elements are written
/// as is and other elements as `\v` followed by their rendered form, with
/// backslashes and separators escaped, so distinct arrays get distinct
/// keys. A non-array operand gets a key no array can produce.
fn array_key(value: &Value) -> Value {
    let mut key = String::new();
    match value {
        Value::Array(items) => {
            for item in items {
                key.push(ELEMENT_SEPARATOR);
                match item {
                    Value::Text(text) => escape_into(&mut key, text),
                    other => {
                        key.push_str("\\v");
                        escape_into(&mut key, &other.to_string());
                    }
                }
            }
        }
        other => {
            key.push_str("\\v");
            escape_into(&mut key, &other.to_string());
        }
    }
    Value::Text(key)
}

fn distinct(items: &[Value]) -> Vec<&Value> {
    let mut seen: Vec<&Value> = Vec::with_capacity(items.len());
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}

/// An index over an array column.
///
/// Keeps two value trees: one keyed by each distinct element (answering
/// `includes`) and one keyed by the whole array (answering `equal`,
/// `unequal` and `in`). Whole arrays are keyed by their elements joined
/// into one escaped text key.
pub struct ArrayTableIndex {
    spec: IndexSpec,
    data: Arc<RecordFile>,
    file: RecordFile,
    order: usize,
    latch: RwLock<()>,
}

impl ArrayTableIndex {
    /// Opens the index file at `path`, building it from `data` if new.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or an invalid order.
    pub fn open(path: &Path, spec: IndexSpec, data: Arc<RecordFile>, config: &Config) -> CoreResult<Self> {
        let file = RecordFile::open(path, config.array_record_length)?;
        Self::with_file(file, spec, data, config)
    }

    /// Creates an index whose file lives in memory.
    ///
    /// # Errors
    ///
    /// Fails on an invalid order.
    pub fn in_memory(spec: IndexSpec, data: Arc<RecordFile>, config: &Config) -> CoreResult<Self> {
        let file = RecordFile::with_backend(Box::new(InMemoryBackend::new()), config.array_record_length)?;
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
            index.rebuild()?;
        }
        Ok(index)
    }

    fn elements(&self) -> ValueTree<'_> {
        ValueTree::open(
            &self.file,
            ELEMENT_ROOT,
            self.order,
            self.spec.column_type.base_column_type(),
        )
    }

    fn arrays(&self) -> ValueTree<'_> {
        ValueTree::open(&self.file, ARRAY_ROOT, self.order, &ARRAY_KEY_COLUMN)
    }

    fn nulls(&self) -> AddressTree<'_> {
        AddressTree::open(&self.file, NULL_ROOT, self.order)
    }

    fn undefined(&self) -> AddressTree<'_> {
        AddressTree::open(&self.file, UNDEFINED_ROOT, self.order)
    }

    fn rebuild(&self) -> CoreResult<usize> {
        self.file.clear()?;
        let roots = allocate_roots(&self.file, ROOT_COUNT)?;
        if roots != [ELEMENT_ROOT, NULL_ROOT, UNDEFINED_ROOT, ARRAY_ROOT] {
            return Err(CoreError::invalid_format("index roots not at fixed slots"));
        }
        self.elements().initialize()?;
        AddressTree::initialize(&self.file, NULL_ROOT, self.order)?;
        AddressTree::initialize(&self.file, UNDEFINED_ROOT, self.order)?;
        self.arrays().initialize()?;

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
            Some(array) => {
                let Value::Array(items) = array else {
                    return Err(CoreError::illegal_argument(format!(
                        "array index {} cannot store a {} value",
                        self.spec.name,
                        array.type_name()
                    )));
                };
                let key = array_key(array);
                let items = distinct(items);
                let arrays = self.arrays();
                let elements = self.elements();
                arrays.check_key(&key)?;
                for item in &items {
                    elements.check_key(item)?;
                }
                if self.spec.unique {
                    if let Some(existing) = arrays.conflicting(&key, address)? {
                        return Err(CoreError::Conflict {
                            index: self.spec.name.clone(),
                            key: array.to_string(),
                            existing,
                        });
                    }
                }

                let mut added: Vec<&Value> = Vec::new();
                let mut outcome: CoreResult<()> = Ok(());
                for item in items {
                    match elements.insert(item, address) {
                        Ok(true) => added.push(item),
                        Ok(false) => {}
                        Err(err) => {
                            outcome = Err(err);
                            break;
                        }
                    }
                }
                if outcome.is_ok() {
                    outcome = arrays.insert(&key, address).map(drop);
                }
                if outcome.is_err() {
                    for item in added {
                        if let Err(undo) = elements.remove(item, address) {
                            warn!(index = %self.spec.uuid, address, error = %undo, "element rollback failed");
                        }
                    }
                }
                outcome
            }
        }
    }

    fn equal_addresses(&self, value: Option<&Value>) -> CoreResult<Vec<u64>> {
        match value {
            None => self.undefined().addresses(),
            Some(Value::Null) => self.nulls().addresses(),
            Some(value) => self.arrays().equal(&array_key(value)),
        }
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

impl TableIndex for ArrayTableIndex {
    fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    fn kind(&self) -> &'static str {
        "array index"
    }

    fn insert(&self, value: Option<&Value>, address: u64) -> CoreResult<()> {
        let _guard = self.latch.write();
        self.insert_locked(value, address)
    }

    fn delete(&self, value: Option<&Value>, address: u64) -> CoreResult<()> {
        let _guard = self.latch.write();
        match value {
            None => {
                self.undefined().remove(address)?;
            }
            Some(Value::Null) => {
                self.nulls().remove(address)?;
            }
            Some(array) => {
                if let Value::Array(items) = array {
                    let elements = self.elements();
                    for item in distinct(items) {
                        elements.remove(item, address)?;
                    }
                    self.arrays().remove(&array_key(array), address)?;
                }
            }
        }
        Ok(())
    }

    fn refresh(&self) -> CoreResult<()> {
        let _guard = self.latch.write();
        let count = self.rebuild()?;
        info!(index = %self.spec.uuid, name = %self.spec.name, records = count, "refreshed array index");
        Ok(())
    }

    fn equal(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let _guard = self.latch.read();
        resolve(&self.data, self.equal_addresses(value)?)
    }

    fn unequal(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let _guard = self.latch.read();
        let arrays = self.arrays();
        let addresses = match value {
            None => {
                let mut addresses = self.nulls().addresses()?;
                addresses.extend(arrays.all()?);
                addresses
            }
            Some(Value::Null) => {
                let mut addresses = self.undefined().addresses()?;
                addresses.extend(arrays.all()?);
                addresses
            }
            Some(value) => {
                let key = array_key(value);
                let mut addresses = arrays.range(Bound::Unbounded, Bound::Excluded(&key))?;
                addresses.extend(arrays.range(Bound::Excluded(&key), Bound::Unbounded)?);
                addresses
            }
        };
        resolve(&self.data, addresses)
    }

    fn in_values(&self, values: &[Value]) -> CoreResult<Vec<Record>> {
        let _guard = self.latch.read();
        let mut addresses = Vec::new();
        for value in values {
            addresses.extend(self.equal_addresses(Some(value))?);
        }
        resolve(&self.data, addresses)
    }

    fn includes(&self, value: &Value) -> CoreResult<Vec<Record>> {
        let _guard = self.latch.read();
        resolve(&self.data, self.elements().equal(value)?)
    }
}
