//! Column types and their comparison semantics.

use std::cmp::Ordering;
use tabula_codec::Value;

/// The declared type of an indexed column.
///
/// Indices never interpret values themselves; they order keys through
/// [`ColumnType::compare`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// UTF-8 text.
    Text,
    /// Signed integers.
    Integer,
    /// Booleans.
    Boolean,
    /// Raw bytes.
    Bytes,
    /// Any value, ordered by the natural value order.
    Any,
    /// Arrays whose elements have the given type.
    Array(Box<ColumnType>),
}

impl ColumnType {
    /// Creates an array column type.
    #[must_use]
    pub fn array_of(element: ColumnType) -> Self {
        Self::Array(Box::new(element))
    }

    /// Total order over values of this column.
    ///
    /// Values of the column's own type compare naturally; anything else
    /// falls back to the cross-type value order so the result stays total.
    #[must_use]
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match (self, a, b) {
            (Self::Array(element), Value::Array(left), Value::Array(right)) => {
                for (l, r) in left.iter().zip(right) {
                    match element.compare(l, r) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                }
                left.len().cmp(&right.len())
            }
            _ => a.cmp(b),
        }
    }

    /// Element type for array columns, the type itself otherwise.
    #[must_use]
    pub fn base_column_type(&self) -> &ColumnType {
        match self {
            Self::Array(element) => element,
            other => other,
        }
    }

    /// Returns true for array column types.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_order() {
        let t = ColumnType::Integer;
        assert_eq!(t.compare(&Value::from(-3i64), &Value::from(2i64)), Ordering::Less);
        assert_eq!(t.compare(&Value::from(2i64), &Value::from(2i64)), Ordering::Equal);
    }

    #[test]
    fn arrays_compare_elementwise_then_by_length() {
        let t = ColumnType::array_of(ColumnType::Text);
        let ab = Value::Array(vec![Value::from("a"), Value::from("b")]);
        let a = Value::Array(vec![Value::from("a")]);
        let b = Value::Array(vec![Value::from("b")]);
        assert_eq!(t.compare(&a, &ab), Ordering::Less);
        assert_eq!(t.compare(&ab, &b), Ordering::Less);
        assert_eq!(t.base_column_type(), &ColumnType::Text);
    }
}
