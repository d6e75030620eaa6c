//! # Tabula Testkit
//!
//! Test utilities for the Tabula storage engine.
//!
//! This crate provides:
//! - Temporary tables that clean up after themselves
//! - Property-based generators for column values and slot operations
//! - Index equivalence checks against the scanning index
//!
//! ## Usage
//!
//! ```rust
//! use tabula_core::{ColumnType, Record, TableIndex};
//! use tabula_testkit::prelude::*;
//!
//! with_temp_table(|table| {
//!     table.insert(&Record::new().with("n", 1i64)).unwrap();
//!     let scan = table.index_for("n");
//!     let btree: std::sync::Arc<dyn TableIndex> = table
//!         .create_btree_index("by_n", "n", ColumnType::Integer, false)
//!         .unwrap();
//!     assert_same_results(&scan, &btree, &[Query::Equal(None)]);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod equivalence;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::equivalence::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use equivalence::*;
pub use fixtures::*;
pub use generators::*;
