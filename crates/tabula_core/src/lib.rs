//! # Tabula Core
//!
//! Storage engine for Tabula tables.
//!
//! This crate provides:
//! - [`RecordFile`]: fixed-slot record files with a free list
//! - B+Tree, array and hash indices behind one [`TableIndex`] contract
//! - online resizing of hash indices on a background worker
//! - [`Table`], keeping a data file and its indices in step
//! - named read/write locks ([`LockManager`])
//!
//! ```
//! use tabula_core::{ColumnType, Config, Record, Table, TableIndex, Value};
//!
//! let table = Table::in_memory("fruit", Config::default()).unwrap();
//! let index = table
//!     .create_btree_index("by_name", "name", ColumnType::Text, false)
//!     .unwrap();
//! for _ in 0..5 {
//!     table.insert(&Record::new().with("name", "banana")).unwrap();
//! }
//! assert_eq!(index.equal(Some(&Value::from("banana"))).unwrap().len(), 5);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod column;
mod config;
mod error;
mod index;
mod lock;
pub mod predicate;
mod record;
mod record_file;
mod table;

pub use column::ColumnType;
pub use config::Config;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use index::{
    ArrayTableIndex, BTreeTableIndex, DefaultTableIndex, HashHeader, HashTableIndex, IndexSpec,
    ResizeState, TableIndex,
};
pub use lock::{LockGuard, LockManager};
pub use record::Record;
pub use record_file::{RecordFile, SlotRecord, HEADER_SIZE};
pub use table::Table;
pub use tabula_codec::Value;
