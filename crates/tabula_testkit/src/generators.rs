//! Property-based test generators using proptest.
//!
//! Column operands are `Option<Value>`: `None` is an absent column and
//! `Some(Value::Null)` an explicit null. Strategies draw from small domains
//! so duplicates and range boundaries come up often.

use crate::equivalence::Query;
use proptest::prelude::*;
use tabula_codec::Value;

/// Strategy for integer column values, including null and undefined.
pub fn integer_operand_strategy() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        1 => Just(None),
        1 => Just(Some(Value::Null)),
        6 => (-20i64..20).prop_map(|n| Some(Value::Integer(n))),
    ]
}

/// Strategy for short text column values, including null and undefined.
pub fn text_operand_strategy() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        1 => Just(None),
        1 => Just(Some(Value::Null)),
        6 => prop::string::string_regex("[a-d]{0,3}")
            .expect("Invalid regex")
            .prop_map(|s| Some(Value::Text(s))),
    ]
}

/// Strategy for array column values of short text elements.
pub fn array_operand_strategy() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        1 => Just(None),
        1 => Just(Some(Value::Null)),
        6 => prop::collection::vec(
            prop::string::string_regex("[a-c]").expect("Invalid regex"),
            0..4,
        )
        .prop_map(|items| Some(Value::Array(items.into_iter().map(Value::Text).collect()))),
    ]
}

/// Strategy for text values from empty up to close to the default data
/// record length, including null and undefined.
///
/// A short prefix keeps duplicates likely; the padding lengths cluster
/// around the largest key an index slot can hold.
pub fn long_text_operand_strategy() -> impl Strategy<Value = Option<Value>> {
    let padding = prop::sample::select(vec![0usize, 40, 120, 160, 190, 200, 210, 220]);
    prop_oneof![
        1 => Just(None),
        1 => Just(Some(Value::Null)),
        6 => (prop::string::string_regex("[a-c]{0,2}").expect("Invalid regex"), padding)
            .prop_map(|(prefix, n)| Some(Value::Text(prefix + &"x".repeat(n)))),
    ]
}

/// Strategy for one array element of up to 16 characters.
pub fn long_tag_strategy() -> impl Strategy<Value = Value> {
    (prop::string::string_regex("[a-c]").expect("Invalid regex"), 0usize..16)
        .prop_map(|(head, n)| Value::Text(head + &"x".repeat(n)))
}

/// Strategy for arrays of up to 12 long elements, enough that some whole
/// arrays no longer fit an array index slot.
pub fn long_array_operand_strategy() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        1 => Just(None),
        1 => Just(Some(Value::Null)),
        6 => prop::collection::vec(long_tag_strategy(), 0..13)
            .prop_map(|items| Some(Value::Array(items))),
    ]
}

/// Strategy for queries over integer columns that both the B+Tree and the
/// scanning index answer.
pub fn ordered_query_strategy() -> impl Strategy<Value = Query> {
    let operand = integer_operand_strategy;
    prop_oneof![
        operand().prop_map(Query::Equal),
        operand().prop_map(Query::Unequal),
        operand().prop_map(Query::Greater),
        operand().prop_map(Query::GreaterOrEqual),
        operand().prop_map(Query::Less),
        operand().prop_map(Query::LessOrEqual),
        (operand(), operand()).prop_map(|(low, high)| Query::Between(low, high)),
        prop::collection::vec((-20i64..20).prop_map(Value::Integer), 0..4).prop_map(Query::In),
    ]
}

/// Strategy for queries over array columns that the array index answers.
pub fn array_query_strategy() -> impl Strategy<Value = Query> {
    prop_oneof![
        array_operand_strategy().prop_map(Query::Equal),
        array_operand_strategy().prop_map(Query::Unequal),
        prop::string::string_regex("[a-c]")
            .expect("Invalid regex")
            .prop_map(|s| Query::Includes(Value::Text(s))),
    ]
}

/// Strategy for queries over long text columns that the B+Tree answers.
pub fn long_text_query_strategy() -> impl Strategy<Value = Query> {
    let operand = long_text_operand_strategy;
    prop_oneof![
        operand().prop_map(Query::Equal),
        operand().prop_map(Query::Unequal),
        operand().prop_map(Query::Greater),
        operand().prop_map(Query::LessOrEqual),
        (operand(), operand()).prop_map(|(low, high)| Query::Between(low, high)),
    ]
}

/// Strategy for queries over long arrays that the array index answers.
pub fn long_array_query_strategy() -> impl Strategy<Value = Query> {
    prop_oneof![
        long_array_operand_strategy().prop_map(Query::Equal),
        long_array_operand_strategy().prop_map(Query::Unequal),
        long_tag_strategy().prop_map(Query::Includes),
    ]
}

/// Strategy for queries a hash index answers over long text columns.
pub fn hash_query_strategy() -> impl Strategy<Value = Query> {
    prop_oneof![
        3 => long_text_operand_strategy().prop_map(Query::Equal),
        1 => prop::collection::vec(
            long_text_operand_strategy()
                .prop_filter_map("absent or null", |value| value.filter(|v| *v != Value::Null)),
            0..4,
        )
        .prop_map(Query::In),
    ]
}

/// An operation on a record file.
#[derive(Debug, Clone)]
pub enum SlotOperation {
    /// Append a record holding the value.
    Append(i64),
    /// Delete the live record at this position among live slots (modulo
    /// the live count).
    Delete(usize),
}

/// Strategy for a slot operation.
pub fn slot_operation_strategy() -> impl Strategy<Value = SlotOperation> {
    prop_oneof![
        3 => any::<i64>().prop_map(SlotOperation::Append),
        2 => any::<usize>().prop_map(SlotOperation::Delete),
    ]
}

/// Strategy for a sequence of slot operations.
pub fn slot_operations_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<SlotOperation>> {
    prop::collection::vec(slot_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
