//! Index equivalence checks.
//!
//! Every index must return the same set of records as the scanning index
//! for each query it supports. These helpers run a [`Query`] against any
//! [`TableIndex`] and compare address sets.

use crate::fixtures::addresses;
use std::sync::Arc;
use tabula_codec::Value;
use tabula_core::{CoreResult, TableIndex};

/// A comparison query against one indexed column.
#[derive(Debug, Clone)]
pub enum Query {
    /// `equal`
    Equal(Option<Value>),
    /// `unequal`
    Unequal(Option<Value>),
    /// `greater`
    Greater(Option<Value>),
    /// `greater_or_equal`
    GreaterOrEqual(Option<Value>),
    /// `less`
    Less(Option<Value>),
    /// `less_or_equal`
    LessOrEqual(Option<Value>),
    /// `between`, inclusive
    Between(Option<Value>, Option<Value>),
    /// `in`
    In(Vec<Value>),
    /// `includes`
    Includes(Value),
}

impl Query {
    /// Runs the query, returning the sorted addresses of the matches.
    pub fn run(&self, index: &dyn TableIndex) -> CoreResult<Vec<u64>> {
        let records = match self {
            Self::Equal(v) => index.equal(v.as_ref()),
            Self::Unequal(v) => index.unequal(v.as_ref()),
            Self::Greater(v) => index.greater(v.as_ref()),
            Self::GreaterOrEqual(v) => index.greater_or_equal(v.as_ref()),
            Self::Less(v) => index.less(v.as_ref()),
            Self::LessOrEqual(v) => index.less_or_equal(v.as_ref()),
            Self::Between(low, high) => index.between(low.as_ref(), high.as_ref()),
            Self::In(values) => index.in_values(values),
            Self::Includes(v) => index.includes(v),
        }?;
        Ok(addresses(&records))
    }
}

/// Asserts that both indices return the same addresses for every query.
pub fn assert_same_results(
    expected: &Arc<dyn TableIndex>,
    actual: &Arc<dyn TableIndex>,
    queries: &[Query],
) {
    for query in queries {
        let want = query
            .run(expected.as_ref())
            .unwrap_or_else(|e| panic!("{} failed {query:?}: {e}", expected.kind()));
        let got = query
            .run(actual.as_ref())
            .unwrap_or_else(|e| panic!("{} failed {query:?}: {e}", actual.kind()));
        assert_eq!(got, want, "{} disagrees on {query:?}", actual.kind());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestTable;
    use crate::generators::*;
    use proptest::prelude::*;
    use tabula_core::{ColumnType, Config, DefaultTableIndex, ErrorKind, Record, Table};

    fn record(column: &str, value: &Option<Value>) -> Record {
        let mut record = Record::new().with("id", 0i64);
        if let Some(value) = value {
            record.insert(column, value.clone());
        }
        record
    }

    /// Inserts every value; a rejected record must be an illegal argument
    /// and leaves nothing behind.
    fn insert_allowing_rejects(table: &Table, column: &str, values: &[Option<Value>]) {
        for value in values {
            if let Err(err) = table.insert(&record(column, value)) {
                assert_eq!(err.kind(), ErrorKind::IllegalArgument, "{err}");
            }
        }
    }

    fn scan_of(index: &Arc<dyn TableIndex>, table: &Table) -> Arc<dyn TableIndex> {
        Arc::new(DefaultTableIndex::new(
            index.spec().clone(),
            Arc::clone(table.data()),
        ))
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn btree_matches_scan_with_long_values(
            values in prop::collection::vec(long_text_operand_strategy(), 0..30),
            queries in prop::collection::vec(long_text_query_strategy(), 1..8),
            order in 3usize..8,
        ) {
            let table = TestTable::memory_with(Config::default().btree_order(order));
            let btree: Arc<dyn TableIndex> = table
                .create_btree_index("btree", "v", ColumnType::Text, false)
                .unwrap();
            insert_allowing_rejects(&table, "v", &values);
            let scan = scan_of(&btree, &table);
            assert_same_results(&scan, &btree, &queries);
            btree.refresh().unwrap();
            assert_same_results(&scan, &btree, &queries);
        }

        #[test]
        fn array_index_matches_scan_with_long_arrays(
            values in prop::collection::vec(long_array_operand_strategy(), 0..20),
            queries in prop::collection::vec(long_array_query_strategy(), 1..8),
        ) {
            let table = TestTable::memory();
            let column_type = ColumnType::array_of(ColumnType::Text);
            let array: Arc<dyn TableIndex> = table
                .create_array_index("tags", "tags", column_type, false)
                .unwrap();
            insert_allowing_rejects(&table, "tags", &values);
            let scan = scan_of(&array, &table);
            assert_same_results(&scan, &array, &queries);
            array.refresh().unwrap();
            assert_same_results(&scan, &array, &queries);
        }

        #[test]
        fn hash_matches_scan(
            values in prop::collection::vec(long_text_operand_strategy(), 0..40),
            doomed in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
            queries in prop::collection::vec(hash_query_strategy(), 1..8),
        ) {
            let table = TestTable::file();
            let hash: Arc<dyn TableIndex> = table
                .create_hash_index("hash", "v", ColumnType::Text, false)
                .unwrap();
            let inserted: Vec<u64> = values
                .iter()
                .map(|value| table.insert(&record("v", value)).unwrap())
                .collect();
            if !inserted.is_empty() {
                for pick in &doomed {
                    table.delete(inserted[pick.index(inserted.len())]).unwrap();
                }
            }
            let scan = scan_of(&hash, &table);
            assert_same_results(&scan, &hash, &queries);
        }

        #[test]
        fn btree_matches_scan(
            values in prop::collection::vec(integer_operand_strategy(), 0..40),
            queries in prop::collection::vec(ordered_query_strategy(), 1..12),
            order in 3usize..6,
        ) {
            let table = TestTable::memory_with(Config::default().btree_order(order));
            for value in &values {
                table.insert(&record("v", value)).unwrap();
            }
            let scan = table.index_for("v");
            let btree: Arc<dyn TableIndex> = table
                .create_btree_index("btree", "v", ColumnType::Integer, false)
                .unwrap();
            assert_same_results(&scan, &btree, &queries);
        }

        #[test]
        fn btree_matches_scan_after_deletes(
            values in prop::collection::vec(integer_operand_strategy(), 1..40),
            doomed in prop::collection::vec(any::<prop::sample::Index>(), 0..20),
            queries in prop::collection::vec(ordered_query_strategy(), 1..8),
        ) {
            let table = TestTable::memory();
            let btree: Arc<dyn TableIndex> = table
                .create_btree_index("btree", "v", ColumnType::Integer, false)
                .unwrap();
            let inserted: Vec<u64> = values
                .iter()
                .map(|value| table.insert(&record("v", value)).unwrap())
                .collect();
            for pick in &doomed {
                table.delete(inserted[pick.index(inserted.len())]).unwrap();
            }
            let scan = tabula_core::DefaultTableIndex::new(
                btree.spec().clone(),
                Arc::clone(table.data()),
            );
            let scan: Arc<dyn TableIndex> = Arc::new(scan);
            assert_same_results(&scan, &btree, &queries);
        }

        #[test]
        fn array_index_matches_scan(
            values in prop::collection::vec(array_operand_strategy(), 0..30),
            queries in prop::collection::vec(array_query_strategy(), 1..10),
        ) {
            let table = TestTable::memory();
            for value in &values {
                table.insert(&record("tags", value)).unwrap();
            }
            let column_type = ColumnType::array_of(ColumnType::Text);
            let scan = table.index_for("tags");
            let array: Arc<dyn TableIndex> = table
                .create_array_index("tags", "tags", column_type, false)
                .unwrap();
            assert_same_results(&scan, &array, &queries);
        }

        #[test]
        fn refresh_is_idempotent(
            values in prop::collection::vec(text_operand_strategy(), 0..30),
        ) {
            let table = TestTable::memory();
            for value in &values {
                table.insert(&record("v", value)).unwrap();
            }
            let btree: Arc<dyn TableIndex> = table
                .create_btree_index("btree", "v", ColumnType::Text, false)
                .unwrap();
            let checks: Vec<Query> = values
                .iter()
                .cloned()
                .map(Query::Equal)
                .chain([Query::Unequal(None), Query::Greater(Some(Value::from("b")))])
                .collect();

            btree.refresh().unwrap();
            let first: Vec<Vec<u64>> = checks.iter().map(|q| q.run(btree.as_ref()).unwrap()).collect();
            btree.refresh().unwrap();
            let second: Vec<Vec<u64>> = checks.iter().map(|q| q.run(btree.as_ref()).unwrap()).collect();
            prop_assert_eq!(first, second);
        }
    }
}
