//! Linear-scan index.

use crate::error::CoreResult;
use crate::index::traits::{IndexSpec, TableIndex};
use crate::predicate::{self, LikePattern};
use crate::record::Record;
use crate::record_file::RecordFile;
use std::sync::Arc;
use tabula_codec::Value;

/// Answers every predicate by scanning the table's data file.
///
/// Holds no state of its own, so `insert`, `delete` and `refresh` are
/// no-ops. Its results are the reference the other indices must match.
pub struct DefaultTableIndex {
    spec: IndexSpec,
    data: Arc<RecordFile>,
}

impl DefaultTableIndex {
    /// Creates a scan index over `data`.
    pub fn new(spec: IndexSpec, data: Arc<RecordFile>) -> Self {
        Self { spec, data }
    }

    fn scan(&self, keep: impl Fn(&Record) -> bool) -> CoreResult<Vec<Record>> {
        Ok(self
            .data
            .live_records::<Record>()?
            .into_iter()
            .filter(|record| keep(record))
            .collect())
    }

    fn field<'r>(&self, record: &'r Record) -> Option<&'r Value> {
        record.get(&self.spec.column)
    }

    fn scan_column(
        &self,
        other: &str,
        test: fn(&crate::ColumnType, Option<&Value>, Option<&Value>) -> bool,
    ) -> CoreResult<Vec<Record>> {
        let column_type = &self.spec.column_type;
        self.scan(|record| test(column_type, self.field(record), record.get(other)))
    }
}

impl TableIndex for DefaultTableIndex {
    fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    fn kind(&self) -> &'static str {
        "default index"
    }

    fn insert(&self, _value: Option<&Value>, _address: u64) -> CoreResult<()> {
        Ok(())
    }

    fn delete(&self, _value: Option<&Value>, _address: u64) -> CoreResult<()> {
        Ok(())
    }

    fn refresh(&self) -> CoreResult<()> {
        Ok(())
    }

    fn equal(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let t = &self.spec.column_type;
        self.scan(|r| predicate::equal(t, self.field(r), value))
    }

    fn unequal(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let t = &self.spec.column_type;
        self.scan(|r| predicate::unequal(t, self.field(r), value))
    }

    fn greater(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let t = &self.spec.column_type;
        self.scan(|r| predicate::greater(t, self.field(r), value))
    }

    fn greater_or_equal(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let t = &self.spec.column_type;
        self.scan(|r| predicate::greater_or_equal(t, self.field(r), value))
    }

    fn less(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let t = &self.spec.column_type;
        self.scan(|r| predicate::less(t, self.field(r), value))
    }

    fn less_or_equal(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let t = &self.spec.column_type;
        self.scan(|r| predicate::less_or_equal(t, self.field(r), value))
    }

    fn between(&self, low: Option<&Value>, high: Option<&Value>) -> CoreResult<Vec<Record>> {
        let t = &self.spec.column_type;
        self.scan(|r| predicate::between(t, self.field(r), low, high))
    }

    fn in_values(&self, values: &[Value]) -> CoreResult<Vec<Record>> {
        let t = &self.spec.column_type;
        self.scan(|r| predicate::in_values(t, self.field(r), values))
    }

    fn includes(&self, value: &Value) -> CoreResult<Vec<Record>> {
        let t = &self.spec.column_type;
        self.scan(|r| predicate::includes(t, self.field(r), value))
    }

    fn like(&self, pattern: &str) -> CoreResult<Vec<Record>> {
        let pattern = LikePattern::new(pattern)?;
        self.scan(|r| pattern.matches(self.field(r)))
    }

    fn equal_column(&self, other: &str) -> CoreResult<Vec<Record>> {
        self.scan_column(other, predicate::equal)
    }

    fn unequal_column(&self, other: &str) -> CoreResult<Vec<Record>> {
        self.scan_column(other, predicate::unequal)
    }

    fn greater_column(&self, other: &str) -> CoreResult<Vec<Record>> {
        self.scan_column(other, predicate::greater)
    }

    fn greater_or_equal_column(&self, other: &str) -> CoreResult<Vec<Record>> {
        self.scan_column(other, predicate::greater_or_equal)
    }

    fn less_column(&self, other: &str) -> CoreResult<Vec<Record>> {
        self.scan_column(other, predicate::less)
    }

    fn less_or_equal_column(&self, other: &str) -> CoreResult<Vec<Record>> {
        self.scan_column(other, predicate::less_or_equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ColumnType;
    use tabula_storage::InMemoryBackend;
    use uuid::Uuid;

    fn index(records: &[Record]) -> DefaultTableIndex {
        let data =
            Arc::new(RecordFile::with_backend(Box::new(InMemoryBackend::new()), 257).unwrap());
        data.append_records(records).unwrap();
        let spec = IndexSpec::new("scan", Uuid::new_v4(), "a", ColumnType::Integer);
        DefaultTableIndex::new(spec, data)
    }

    fn slots(records: Vec<Record>) -> Vec<u64> {
        let mut slots: Vec<u64> = records.iter().filter_map(Record::index).collect();
        slots.sort_unstable();
        slots
    }

    fn fixture() -> DefaultTableIndex {
        index(&[
            Record::new().with("a", 1i64).with("b", 1i64),
            Record::new().with("a", 2i64).with("b", 5i64),
            Record::new().with("a", Value::Null),
            Record::new().with("b", 3i64),
            Record::new().with("a", 3i64).with("b", 0i64),
        ])
    }

    #[test]
    fn equal_and_unequal() {
        let index = fixture();
        assert_eq!(slots(index.equal(Some(&Value::from(2i64))).unwrap()), vec![1]);
        assert_eq!(slots(index.equal(Some(&Value::Null)).unwrap()), vec![2]);
        assert_eq!(slots(index.equal(None).unwrap()), vec![3]);

        assert_eq!(
            slots(index.unequal(Some(&Value::from(2i64))).unwrap()),
            vec![0, 4]
        );
        assert_eq!(slots(index.unequal(Some(&Value::Null)).unwrap()), vec![0, 1, 3, 4]);
        assert_eq!(slots(index.unequal(None).unwrap()), vec![0, 1, 2, 4]);
    }

    #[test]
    fn ranges() {
        let index = fixture();
        let two = Value::from(2i64);
        assert_eq!(slots(index.greater(Some(&two)).unwrap()), vec![4]);
        assert_eq!(slots(index.greater_or_equal(Some(&two)).unwrap()), vec![1, 4]);
        assert_eq!(slots(index.less(Some(&two)).unwrap()), vec![0]);
        assert_eq!(slots(index.less_or_equal(Some(&two)).unwrap()), vec![0, 1]);
        assert_eq!(
            slots(index.between(Some(&Value::from(1i64)), Some(&two)).unwrap()),
            vec![0, 1]
        );
        assert!(index.greater(None).unwrap().is_empty());
        assert_eq!(
            slots(index.in_values(&[Value::from(3i64), Value::Null]).unwrap()),
            vec![2, 4]
        );
    }

    #[test]
    fn column_comparisons() {
        let index = fixture();
        assert_eq!(slots(index.equal_column("b").unwrap()), vec![0]);
        assert_eq!(slots(index.greater_column("b").unwrap()), vec![4]);
        assert_eq!(slots(index.less_column("b").unwrap()), vec![1]);
        assert_eq!(slots(index.less_or_equal_column("b").unwrap()), vec![0, 1]);
        assert_eq!(slots(index.greater_or_equal_column("b").unwrap()), vec![0, 4]);
        assert_eq!(slots(index.unequal_column("b").unwrap()), vec![1, 2, 4]);
    }

    #[test]
    fn like_and_includes_on_text() {
        let data =
            Arc::new(RecordFile::with_backend(Box::new(InMemoryBackend::new()), 257).unwrap());
        data.append_records(&[
            Record::new().with("name", "banana"),
            Record::new().with("name", "bandana"),
            Record::new().with("name", "apple"),
        ])
        .unwrap();
        let spec = IndexSpec::new("scan", Uuid::new_v4(), "name", ColumnType::Text);
        let index = DefaultTableIndex::new(spec, data);

        assert_eq!(slots(index.like("ban%").unwrap()), vec![0, 1]);
        assert_eq!(slots(index.like("b_nana").unwrap()), vec![0]);
        assert_eq!(slots(index.includes(&Value::from("ana")).unwrap()), vec![0, 1]);
    }
}
