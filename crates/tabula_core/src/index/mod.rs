//! Table indices.
//!
//! Every index answers the same comparison contract ([`TableIndex`]) over
//! one column of a table's data file:
//!
//! - [`DefaultTableIndex`]: linear scan, supports everything
//! - [`BTreeTableIndex`]: persisted B+Tree with per-key address trees
//! - [`ArrayTableIndex`]: element and whole-array trees for array columns
//! - [`HashTableIndex`]: persisted hash buckets with online resize
//!
//! The default index defines the reference semantics; the others return the
//! same records (in any order) for every predicate they support.

mod array_index;
pub(crate) mod btree;
mod btree_index;
mod default_index;
mod hash;
mod traits;

pub use array_index::ArrayTableIndex;
pub use btree_index::BTreeTableIndex;
pub use default_index::DefaultTableIndex;
pub use hash::{HashHeader, HashTableIndex, ResizeState};
pub use traits::{IndexSpec, TableIndex};

use crate::error::CoreResult;
use crate::record::Record;
use crate::record_file::RecordFile;
use std::collections::HashSet;

/// Reads the records behind `addresses`, skipping duplicates and slots that
/// are no longer live.
pub(crate) fn resolve(
    data: &RecordFile,
    addresses: impl IntoIterator<Item = u64>,
) -> CoreResult<Vec<Record>> {
    let mut seen = HashSet::new();
    let unique: Vec<u64> = addresses
        .into_iter()
        .filter(|address| seen.insert(*address))
        .collect();
    Ok(data
        .read_records::<Record>(&unique)?
        .into_iter()
        .flatten()
        .collect())
}
