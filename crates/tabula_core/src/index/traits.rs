//! Index traits and specifications.

use crate::column::ColumnType;
use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use tabula_codec::Value;
use uuid::Uuid;

/// Identity and column metadata of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Stable identifier; also names the index's write lock.
    pub uuid: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Table the index belongs to.
    pub table_uuid: Uuid,
    /// Indexed column.
    pub column: String,
    /// Comparison semantics of the column.
    pub column_type: ColumnType,
    /// Whether a key may map to at most one record.
    pub unique: bool,
}

impl IndexSpec {
    /// Creates a non-unique index specification with a fresh UUID.
    pub fn new(
        name: impl Into<String>,
        table_uuid: Uuid,
        column: impl Into<String>,
        column_type: ColumnType,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            table_uuid,
            column: column.into(),
            column_type,
            unique: false,
        }
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Replaces the generated UUID, for reopening a known index.
    #[must_use]
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }
}

/// The comparison contract every table index answers.
///
/// Values are passed as `Option<&Value>`: `None` is an undefined column and
/// `Some(&Value::Null)` an explicit null. Queries return the matching live
/// records; result order is unspecified.
///
/// Every query has a default implementation returning
/// [`CoreError::NotImplemented`], so callers can fall back to the default
/// index for predicates an index variant does not support.
pub trait TableIndex: Send + Sync {
    /// Returns the index specification.
    fn spec(&self) -> &IndexSpec;

    /// Short name of the index variant, used in errors.
    fn kind(&self) -> &'static str;

    /// Adds a `(value, address)` pair.
    fn insert(&self, value: Option<&Value>, address: u64) -> CoreResult<()>;

    /// Removes a `(value, address)` pair.
    fn delete(&self, value: Option<&Value>, address: u64) -> CoreResult<()>;

    /// Rebuilds the index from the table's data file.
    fn refresh(&self) -> CoreResult<()>;

    /// Records whose column equals `value`.
    fn equal(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let _ = value;
        Err(CoreError::not_implemented("equal", self.kind()))
    }

    /// Records whose column differs from `value`.
    fn unequal(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let _ = value;
        Err(CoreError::not_implemented("unequal", self.kind()))
    }

    /// Records whose column is greater than `value`.
    fn greater(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let _ = value;
        Err(CoreError::not_implemented("greater", self.kind()))
    }

    /// Records whose column is greater than or equal to `value`.
    fn greater_or_equal(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let _ = value;
        Err(CoreError::not_implemented("greater_or_equal", self.kind()))
    }

    /// Records whose column is less than `value`.
    fn less(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let _ = value;
        Err(CoreError::not_implemented("less", self.kind()))
    }

    /// Records whose column is less than or equal to `value`.
    fn less_or_equal(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        let _ = value;
        Err(CoreError::not_implemented("less_or_equal", self.kind()))
    }

    /// Records whose column lies in `[low, high]`.
    fn between(&self, low: Option<&Value>, high: Option<&Value>) -> CoreResult<Vec<Record>> {
        let _ = (low, high);
        Err(CoreError::not_implemented("between", self.kind()))
    }

    /// Records whose column equals any of `values`.
    fn in_values(&self, values: &[Value]) -> CoreResult<Vec<Record>> {
        let _ = values;
        Err(CoreError::not_implemented("in", self.kind()))
    }

    /// Records whose array column contains `value` (or text column contains
    /// it as a substring).
    fn includes(&self, value: &Value) -> CoreResult<Vec<Record>> {
        let _ = value;
        Err(CoreError::not_implemented("includes", self.kind()))
    }

    /// Records whose text column matches a SQL `LIKE` pattern.
    fn like(&self, pattern: &str) -> CoreResult<Vec<Record>> {
        let _ = pattern;
        Err(CoreError::not_implemented("like", self.kind()))
    }

    /// Records where the indexed column equals column `other`.
    fn equal_column(&self, other: &str) -> CoreResult<Vec<Record>> {
        let _ = other;
        Err(CoreError::not_implemented("equal_column", self.kind()))
    }

    /// Records where the indexed column differs from column `other`.
    fn unequal_column(&self, other: &str) -> CoreResult<Vec<Record>> {
        let _ = other;
        Err(CoreError::not_implemented("unequal_column", self.kind()))
    }

    /// Records where the indexed column is greater than column `other`.
    fn greater_column(&self, other: &str) -> CoreResult<Vec<Record>> {
        let _ = other;
        Err(CoreError::not_implemented("greater_column", self.kind()))
    }

    /// Records where the indexed column is at least column `other`.
    fn greater_or_equal_column(&self, other: &str) -> CoreResult<Vec<Record>> {
        let _ = other;
        Err(CoreError::not_implemented("greater_or_equal_column", self.kind()))
    }

    /// Records where the indexed column is less than column `other`.
    fn less_column(&self, other: &str) -> CoreResult<Vec<Record>> {
        let _ = other;
        Err(CoreError::not_implemented("less_column", self.kind()))
    }

    /// Records where the indexed column is at most column `other`.
    fn less_or_equal_column(&self, other: &str) -> CoreResult<Vec<Record>> {
        let _ = other;
        Err(CoreError::not_implemented("less_or_equal_column", self.kind()))
    }
}
