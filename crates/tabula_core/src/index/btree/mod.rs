//! B+Tree storage shared by the tree-backed indices.
//!
//! Two layers sit on top of [`BPlusTree`]:
//!
//! - [`AddressTree`]: a set of record addresses, keyed by the address itself.
//! - [`ValueTree`]: column value to [`AddressTree`] root, so duplicate column
//!   values share one key and each key owns its own address set.

mod node;
mod tree;

pub(crate) use tree::{BPlusTree, MIN_ORDER};

use crate::column::ColumnType;
use crate::error::{CoreError, CoreResult};
use crate::record_file::RecordFile;
use std::ops::Bound;
use tabula_codec::Value;
use tracing::warn;

static ADDRESS_COLUMN: ColumnType = ColumnType::Integer;

/// Appends `count` placeholder root records to an empty file so the trees
/// of an index land on fixed slots `0..count`.
pub(crate) fn allocate_roots(file: &RecordFile, count: usize) -> CoreResult<Vec<u64>> {
    let placeholders = vec![node::Node::Root(node::RootNode { first_node: 0 }); count];
    file.append_records(&placeholders)
}

fn address_key(address: u64) -> CoreResult<Value> {
    i64::try_from(address)
        .map(Value::Integer)
        .map_err(|_| CoreError::illegal_argument(format!("address {address} out of range")))
}

/// A persisted set of record addresses.
pub(crate) struct AddressTree<'a> {
    tree: BPlusTree<'a>,
}

impl<'a> AddressTree<'a> {
    pub fn open(file: &'a RecordFile, root: u64, order: usize) -> Self {
        Self {
            tree: BPlusTree::new(file, root, order, &ADDRESS_COLUMN),
        }
    }

    pub fn create(file: &'a RecordFile, order: usize) -> CoreResult<Self> {
        Ok(Self {
            tree: BPlusTree::create(file, order, &ADDRESS_COLUMN)?,
        })
    }

    /// Attaches a first leaf to a preallocated root slot.
    pub fn initialize(file: &'a RecordFile, root: u64, order: usize) -> CoreResult<()> {
        Self::open(file, root, order).tree.initialize()
    }

    pub fn root(&self) -> u64 {
        self.tree.root()
    }

    pub fn insert(&self, address: u64) -> CoreResult<bool> {
        self.tree.insert(address_key(address)?, address)
    }

    pub fn remove(&self, address: u64) -> CoreResult<bool> {
        Ok(self.tree.remove(&address_key(address)?)?.is_some())
    }

    pub fn addresses(&self) -> CoreResult<Vec<u64>> {
        Ok(self
            .tree
            .range(Bound::Unbounded, Bound::Unbounded)?
            .into_iter()
            .map(|(_, address)| address)
            .collect())
    }

    pub fn is_empty(&self) -> CoreResult<bool> {
        self.tree.is_empty()
    }

    pub fn destroy(&self) -> CoreResult<()> {
        self.tree.destroy()
    }
}

/// Column values mapped to their sets of record addresses.
pub(crate) struct ValueTree<'a> {
    file: &'a RecordFile,
    order: usize,
    tree: BPlusTree<'a>,
}

impl<'a> ValueTree<'a> {
    pub fn open(file: &'a RecordFile, root: u64, order: usize, column_type: &'a ColumnType) -> Self {
        Self {
            file,
            order,
            tree: BPlusTree::new(file, root, order, column_type),
        }
    }

    /// Attaches a first leaf to a preallocated root slot.
    pub fn initialize(&self) -> CoreResult<()> {
        self.tree.initialize()
    }

    fn addresses_of(&self, root: u64) -> AddressTree<'a> {
        AddressTree::open(self.file, root, self.order)
    }

    /// Returns an address other than `address` already stored under `key`.
    pub fn conflicting(&self, key: &Value, address: u64) -> CoreResult<Option<u64>> {
        match self.tree.get(key)? {
            Some(root) => Ok(self
                .addresses_of(root)
                .addresses()?
                .into_iter()
                .find(|existing| *existing != address)),
            None => Ok(None),
        }
    }

    /// Fails with an illegal argument if `key` cannot fit a node.
    pub fn check_key(&self, key: &Value) -> CoreResult<()> {
        self.tree.check_key(key)
    }

    /// Adds `address` under `key`, creating the key's address set if needed.
    ///
    /// A new key either lands together with its address set or not at all.
    pub fn insert(&self, key: &Value, address: u64) -> CoreResult<bool> {
        if let Some(root) = self.tree.get(key)? {
            return self.addresses_of(root).insert(address);
        }

        self.check_key(key)?;
        let set = AddressTree::create(self.file, self.order)?;
        let linked = set
            .insert(address)
            .and_then(|_| self.tree.insert(key.clone(), set.root()));
        if let Err(err) = linked {
            if let Err(undo) = set.destroy() {
                warn!(root = set.root(), error = %undo, "failed to free address set");
            }
            return Err(err);
        }
        Ok(true)
    }

    /// Removes `address` from `key`; the key goes once its set is empty.
    pub fn remove(&self, key: &Value, address: u64) -> CoreResult<bool> {
        let Some(root) = self.tree.get(key)? else {
            return Ok(false);
        };
        let set = self.addresses_of(root);
        let removed = set.remove(address)?;
        if set.is_empty()? {
            set.destroy()?;
            self.tree.remove(key)?;
        }
        Ok(removed)
    }

    pub fn equal(&self, key: &Value) -> CoreResult<Vec<u64>> {
        match self.tree.get(key)? {
            Some(root) => self.addresses_of(root).addresses(),
            None => Ok(Vec::new()),
        }
    }

    pub fn range(&self, lower: Bound<&Value>, upper: Bound<&Value>) -> CoreResult<Vec<u64>> {
        let mut addresses = Vec::new();
        for (_, root) in self.tree.range(lower, upper)? {
            addresses.extend(self.addresses_of(root).addresses()?);
        }
        Ok(addresses)
    }

    pub fn all(&self) -> CoreResult<Vec<u64>> {
        self.range(Bound::Unbounded, Bound::Unbounded)
    }

    /// Number of distinct keys.
    #[cfg(test)]
    pub fn key_count(&self) -> CoreResult<usize> {
        self.tree.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_storage::InMemoryBackend;

    static TEXT: ColumnType = ColumnType::Text;

    fn file() -> RecordFile {
        RecordFile::with_backend(Box::new(InMemoryBackend::new()), 512).unwrap()
    }

    fn value_tree(file: &RecordFile) -> ValueTree<'_> {
        let root = allocate_roots(file, 1).unwrap()[0];
        let tree = ValueTree::open(file, root, 3, &TEXT);
        tree.initialize().unwrap();
        tree
    }

    #[test]
    fn duplicates_share_a_key() {
        let file = file();
        let tree = value_tree(&file);
        let banana = Value::from("banana");
        for address in 0..5 {
            assert!(tree.insert(&banana, address).unwrap());
        }
        assert!(!tree.insert(&banana, 3).unwrap());
        assert_eq!(tree.key_count().unwrap(), 1);

        let mut found = tree.equal(&banana).unwrap();
        found.sort_unstable();
        assert_eq!(found, vec![0, 1, 2, 3, 4]);

        for address in 0..4 {
            assert!(tree.remove(&banana, address).unwrap());
            assert_eq!(tree.key_count().unwrap(), 1);
        }
        assert!(tree.remove(&banana, 4).unwrap());
        assert_eq!(tree.key_count().unwrap(), 0);
        assert!(tree.equal(&banana).unwrap().is_empty());
    }

    #[test]
    fn emptied_address_sets_are_freed() {
        let file = file();
        let tree = value_tree(&file);
        let live_before = file.number_of_records();
        for address in 0..10 {
            tree.insert(&Value::from(format!("k{address}")), address).unwrap();
        }
        for address in 0..10 {
            tree.remove(&Value::from(format!("k{address}")), address).unwrap();
        }
        assert_eq!(file.number_of_records(), live_before);
    }

    #[test]
    fn oversized_key_leaves_no_address_set() {
        let file = file();
        let tree = value_tree(&file);
        let live = file.number_of_records();
        let err = tree.insert(&Value::Text("q".repeat(400)), 1).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::IllegalArgument);
        assert_eq!(file.number_of_records(), live);
        assert_eq!(tree.key_count().unwrap(), 0);
    }

    #[test]
    fn conflicting_address() {
        let file = file();
        let tree = value_tree(&file);
        let key = Value::from("k");
        assert_eq!(tree.conflicting(&key, 1).unwrap(), None);
        tree.insert(&key, 1).unwrap();
        assert_eq!(tree.conflicting(&key, 1).unwrap(), None);
        assert_eq!(tree.conflicting(&key, 2).unwrap(), Some(1));
    }

    #[test]
    fn range_flattens_address_sets() {
        let file = file();
        let tree = value_tree(&file);
        for (i, name) in ["a", "b", "b", "c", "d"].iter().enumerate() {
            tree.insert(&Value::from(*name), i as u64).unwrap();
        }
        let b = Value::from("b");
        let d = Value::from("d");
        let mut found = tree
            .range(Bound::Included(&b), Bound::Excluded(&d))
            .unwrap();
        found.sort_unstable();
        assert_eq!(found, vec![1, 2, 3]);
        assert_eq!(tree.all().unwrap().len(), 5);
    }
}
