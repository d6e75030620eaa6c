//! Record file free-list properties.

use proptest::prelude::*;
use tabula_core::{Record, RecordFile};
use tabula_storage::InMemoryBackend;
use tabula_testkit::{slot_operations_strategy, PropTestConfig, SlotOperation};

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn deleted_slots_are_reused_last_in_first_out(
        operations in slot_operations_strategy(1, 80),
    ) {
        let file = RecordFile::with_backend(Box::new(InMemoryBackend::new()), 257).unwrap();
        let mut live: Vec<u64> = Vec::new();
        let mut free: Vec<u64> = Vec::new();
        let mut high_water = 0u64;

        for operation in operations {
            match operation {
                SlotOperation::Append(n) => {
                    let expected = free.pop().unwrap_or_else(|| {
                        high_water += 1;
                        high_water - 1
                    });
                    let index = file.append_record(&Record::new().with("n", n)).unwrap();
                    prop_assert_eq!(index, expected);
                    live.push(index);
                }
                SlotOperation::Delete(pick) => {
                    if live.is_empty() {
                        continue;
                    }
                    let index = live.swap_remove(pick % live.len());
                    prop_assert!(file.delete_record(index).unwrap());
                    free.push(index);
                }
            }

            prop_assert_eq!(file.number_of_records(), live.len() as u64);
            prop_assert_eq!(file.number_of_deleted_records(), free.len() as u64);
            prop_assert_eq!(
                file.number_of_records() + file.number_of_deleted_records(),
                file.total_number_of_records()
            );
        }
    }

    #[test]
    fn records_read_back_after_churn(
        operations in slot_operations_strategy(1, 60),
    ) {
        let file = RecordFile::with_backend(Box::new(InMemoryBackend::new()), 257).unwrap();
        let mut expected: Vec<(u64, i64)> = Vec::new();

        for operation in operations {
            match operation {
                SlotOperation::Append(n) => {
                    let index = file.append_record(&Record::new().with("n", n)).unwrap();
                    expected.push((index, n));
                }
                SlotOperation::Delete(pick) if !expected.is_empty() => {
                    let (index, _) = expected.swap_remove(pick % expected.len());
                    file.delete_record(index).unwrap();
                }
                SlotOperation::Delete(_) => {}
            }
        }

        for (index, n) in expected {
            let record: Record = file.read_record(index).unwrap().unwrap();
            prop_assert_eq!(record.get("n").and_then(|v| v.as_integer()), Some(n));
        }
    }
}
