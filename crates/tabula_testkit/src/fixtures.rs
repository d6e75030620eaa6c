//! Test fixtures and table helpers.

use std::path::Path;
use tabula_core::{Config, Record, Table};
use tempfile::TempDir;

/// A test table with automatic cleanup.
pub struct TestTable {
    /// The table instance.
    pub table: Table,
    /// Keeps the directory alive for file-backed tables.
    temp_dir: Option<TempDir>,
}

impl TestTable {
    /// Creates an in-memory table.
    pub fn memory() -> Self {
        Self::memory_with(Config::default())
    }

    /// Creates an in-memory table with `config`.
    pub fn memory_with(config: Config) -> Self {
        Self {
            table: Table::in_memory("test", config).expect("Failed to create in-memory table"),
            temp_dir: None,
        }
    }

    /// Creates a table in a fresh temporary directory.
    pub fn file() -> Self {
        Self::file_with(Config::default())
    }

    /// Creates a file-backed table with `config`.
    pub fn file_with(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let table = Table::open(temp_dir.path(), "test", config).expect("Failed to open table");
        Self {
            table,
            temp_dir: Some(temp_dir),
        }
    }

    /// Directory of a file-backed table.
    pub fn dir(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Inserts every record, returning their addresses.
    pub fn insert_all(&self, records: &[Record]) -> Vec<u64> {
        records
            .iter()
            .map(|record| self.table.insert(record).expect("Failed to insert record"))
            .collect()
    }
}

impl std::ops::Deref for TestTable {
    type Target = Table;

    fn deref(&self) -> &Self::Target {
        &self.table
    }
}

/// Runs a test with a temporary in-memory table.
pub fn with_temp_table<F, R>(f: F) -> R
where
    F: FnOnce(&Table) -> R,
{
    let test_table = TestTable::memory();
    f(&test_table.table)
}

/// Runs a test with a temporary file-backed table and its directory.
pub fn with_file_table<F, R>(f: F) -> R
where
    F: FnOnce(&Table, &Path) -> R,
{
    let test_table = TestTable::file();
    let dir = test_table
        .dir()
        .expect("File table should have a directory")
        .to_path_buf();
    f(&test_table.table, &dir)
}

/// Sorted addresses of `records`.
pub fn addresses(records: &[Record]) -> Vec<u64> {
    let mut addresses: Vec<u64> = records.iter().filter_map(Record::index).collect();
    addresses.sort_unstable();
    addresses
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A table with `count` records `{ n: i, parity: "even" | "odd" }`.
    pub fn populated_table(count: i64) -> TestTable {
        let test_table = TestTable::memory();
        for n in 0..count {
            let parity = if n % 2 == 0 { "even" } else { "odd" };
            test_table
                .table
                .insert(&Record::new().with("n", n).with("parity", parity))
                .expect("Failed to insert record");
        }
        test_table
    }
}
