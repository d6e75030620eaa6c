//! Comparison predicates shared by every index.
//!
//! A column operand is an `Option<&Value>`: `None` means the column is
//! undefined (absent from the record) and `Some(Value::Null)` means it holds
//! an explicit null. The two are never conflated.
//!
//! Ordering predicates only match present, non-null values. `unequal` is
//! three-valued:
//!
//! | operand     | matches                         |
//! |-------------|---------------------------------|
//! | undefined   | null columns and present values |
//! | null        | undefined columns and values    |
//! | value `v`   | values less or greater than `v` |

use crate::column::ColumnType;
use crate::error::{CoreError, CoreResult};
use std::cmp::Ordering;
use tabula_codec::Value;

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn order(column_type: &ColumnType, field: Option<&Value>, operand: Option<&Value>) -> Option<Ordering> {
    Some(column_type.compare(present(field)?, present(operand)?))
}

/// `field = operand`.
#[must_use]
pub fn equal(column_type: &ColumnType, field: Option<&Value>, operand: Option<&Value>) -> bool {
    match operand {
        None => field.is_none(),
        Some(Value::Null) => matches!(field, Some(Value::Null)),
        Some(_) => order(column_type, field, operand) == Some(Ordering::Equal),
    }
}

/// `field <> operand`, with the three-valued semantics described above.
#[must_use]
pub fn unequal(column_type: &ColumnType, field: Option<&Value>, operand: Option<&Value>) -> bool {
    match operand {
        None => field.is_some(),
        Some(Value::Null) => !matches!(field, Some(Value::Null)),
        Some(_) => matches!(
            order(column_type, field, operand),
            Some(Ordering::Less | Ordering::Greater)
        ),
    }
}

/// `field > operand`.
#[must_use]
pub fn greater(column_type: &ColumnType, field: Option<&Value>, operand: Option<&Value>) -> bool {
    order(column_type, field, operand) == Some(Ordering::Greater)
}

/// `field >= operand`.
#[must_use]
pub fn greater_or_equal(
    column_type: &ColumnType,
    field: Option<&Value>,
    operand: Option<&Value>,
) -> bool {
    matches!(
        order(column_type, field, operand),
        Some(Ordering::Greater | Ordering::Equal)
    )
}

/// `field < operand`.
#[must_use]
pub fn less(column_type: &ColumnType, field: Option<&Value>, operand: Option<&Value>) -> bool {
    order(column_type, field, operand) == Some(Ordering::Less)
}

/// `field <= operand`.
#[must_use]
pub fn less_or_equal(
    column_type: &ColumnType,
    field: Option<&Value>,
    operand: Option<&Value>,
) -> bool {
    matches!(
        order(column_type, field, operand),
        Some(Ordering::Less | Ordering::Equal)
    )
}

/// `field BETWEEN low AND high`, inclusive on both ends.
#[must_use]
pub fn between(
    column_type: &ColumnType,
    field: Option<&Value>,
    low: Option<&Value>,
    high: Option<&Value>,
) -> bool {
    greater_or_equal(column_type, field, low) && less_or_equal(column_type, field, high)
}

/// `field IN (values...)`.
#[must_use]
pub fn in_values(column_type: &ColumnType, field: Option<&Value>, values: &[Value]) -> bool {
    values
        .iter()
        .any(|value| equal(column_type, field, Some(value)))
}

/// Array membership, or substring containment for text columns.
#[must_use]
pub fn includes(column_type: &ColumnType, field: Option<&Value>, operand: &Value) -> bool {
    match (field, operand) {
        (Some(Value::Array(items)), _) => {
            let element_type = column_type.base_column_type();
            items.iter().any(|item| {
                if item.is_null() || operand.is_null() {
                    item.is_null() && operand.is_null()
                } else {
                    element_type.compare(item, operand) == Ordering::Equal
                }
            })
        }
        (Some(Value::Text(text)), Value::Text(needle)) => text.contains(needle.as_str()),
        _ => false,
    }
}

/// One token of a `LIKE` pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LikeToken {
    /// `%`
    AnyRun,
    /// `_`
    AnyOne,
    Literal(char),
}

/// A compiled SQL `LIKE` pattern.
///
/// `%` matches any run of characters and `_` exactly one; everything else is
/// literal. The whole text must match.
#[derive(Debug, Clone)]
pub struct LikePattern {
    tokens: Vec<LikeToken>,
}

impl LikePattern {
    /// Compiles a pattern. Consecutive `%` collapse into one.
    ///
    /// # Errors
    ///
    /// Returns an illegal argument error for an empty pattern.
    pub fn new(pattern: &str) -> CoreResult<Self> {
        if pattern.is_empty() {
            return Err(CoreError::illegal_argument("LIKE pattern is empty"));
        }
        let mut tokens = Vec::with_capacity(pattern.len());
        for ch in pattern.chars() {
            let token = match ch {
                '%' => LikeToken::AnyRun,
                '_' => LikeToken::AnyOne,
                other => LikeToken::Literal(other),
            };
            if token == LikeToken::AnyRun && tokens.last() == Some(&LikeToken::AnyRun) {
                continue;
            }
            tokens.push(token);
        }
        Ok(Self { tokens })
    }

    /// Returns true if `field` is text matching the pattern.
    #[must_use]
    pub fn matches(&self, field: Option<&Value>) -> bool {
        field
            .and_then(Value::as_text)
            .is_some_and(|text| self.matches_text(text))
    }

    // Greedy scan that backtracks to the most recent `%`.
    fn matches_text(&self, text: &str) -> bool {
        let chars: Vec<char> = text.chars().collect();
        let (mut t, mut p) = (0, 0);
        let mut resume: Option<(usize, usize)> = None;

        while t < chars.len() {
            match self.tokens.get(p) {
                Some(LikeToken::AnyRun) => {
                    resume = Some((p, t));
                    p += 1;
                }
                Some(LikeToken::AnyOne) => {
                    t += 1;
                    p += 1;
                }
                Some(LikeToken::Literal(ch)) if *ch == chars[t] => {
                    t += 1;
                    p += 1;
                }
                _ => match resume {
                    Some((star, from)) => {
                        p = star + 1;
                        t = from + 1;
                        resume = Some((star, from + 1));
                    }
                    None => return false,
                },
            }
        }
        self.tokens[p..].iter().all(|token| *token == LikeToken::AnyRun)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: ColumnType = ColumnType::Any;

    fn int(n: i64) -> Value {
        Value::Integer(n)
    }

    #[test]
    fn equal_distinguishes_null_and_undefined() {
        assert!(equal(&T, None, None));
        assert!(!equal(&T, Some(&Value::Null), None));
        assert!(equal(&T, Some(&Value::Null), Some(&Value::Null)));
        assert!(!equal(&T, None, Some(&Value::Null)));
        assert!(equal(&T, Some(&int(1)), Some(&int(1))));
        assert!(!equal(&T, Some(&Value::Null), Some(&int(1))));
    }

    #[test]
    fn unequal_is_three_valued() {
        let null = Value::Null;
        let one = int(1);
        let two = int(2);

        assert!(!unequal(&T, None, None));
        assert!(unequal(&T, Some(&null), None));
        assert!(unequal(&T, Some(&one), None));

        assert!(unequal(&T, None, Some(&null)));
        assert!(!unequal(&T, Some(&null), Some(&null)));
        assert!(unequal(&T, Some(&one), Some(&null)));

        assert!(!unequal(&T, None, Some(&one)));
        assert!(!unequal(&T, Some(&null), Some(&one)));
        assert!(!unequal(&T, Some(&one), Some(&one)));
        assert!(unequal(&T, Some(&two), Some(&one)));
    }

    #[test]
    fn ordering_ignores_null_and_undefined() {
        assert!(greater(&T, Some(&int(3)), Some(&int(2))));
        assert!(!greater(&T, Some(&Value::Null), Some(&int(2))));
        assert!(!less(&T, None, Some(&int(2))));
        assert!(!less(&T, Some(&int(1)), Some(&Value::Null)));
        assert!(between(&T, Some(&int(2)), Some(&int(2)), Some(&int(4))));
        assert!(between(&T, Some(&int(4)), Some(&int(2)), Some(&int(4))));
        assert!(!between(&T, Some(&int(5)), Some(&int(2)), Some(&int(4))));
    }

    #[test]
    fn includes_arrays_and_text() {
        let array = Value::Array(vec![Value::from("a"), Value::Null, Value::from("c")]);
        assert!(includes(&T, Some(&array), &Value::from("c")));
        assert!(includes(&T, Some(&array), &Value::Null));
        assert!(!includes(&T, Some(&array), &Value::from("b")));
        assert!(includes(&T, Some(&Value::from("banana")), &Value::from("nan")));
        assert!(!includes(&T, None, &Value::from("a")));
    }

    #[test]
    fn like_patterns() {
        let pattern = LikePattern::new("b_n%a").unwrap();
        assert!(pattern.matches(Some(&Value::from("banana"))));
        assert!(pattern.matches(Some(&Value::from("bona"))));
        assert!(!pattern.matches(Some(&Value::from("bnana"))));
        assert!(!pattern.matches(Some(&int(1))));
        assert!(!pattern.matches(None));

        let literal = LikePattern::new("a.c(").unwrap();
        assert!(literal.matches(Some(&Value::from("a.c("))));
        assert!(!literal.matches(Some(&Value::from("abc("))));

        let multiline = LikePattern::new("a%").unwrap();
        assert!(multiline.matches(Some(&Value::from("a\nb"))));

        let runs = LikePattern::new("%%an%").unwrap();
        assert!(runs.matches(Some(&Value::from("banana"))));
        assert!(!runs.matches(Some(&Value::from("bnn"))));
        assert_eq!(LikePattern::new("").unwrap_err().kind(), crate::ErrorKind::IllegalArgument);
    }
}
