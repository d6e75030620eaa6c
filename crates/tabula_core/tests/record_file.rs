//! Record file behaviour across reopen and slot reuse.

use tabula_core::{Record, RecordFile, Value};
use tempfile::tempdir;

fn a(n: i64) -> Record {
    Record::new().with("a", n)
}

#[test]
fn deleted_slot_is_reused_by_next_append() {
    let dir = tempdir().unwrap();
    let file = RecordFile::open(&dir.path().join("data.dat"), 257).unwrap();

    assert_eq!(file.append_record(&a(1)).unwrap(), 0);
    assert!(file.delete_record(0).unwrap());
    assert_eq!(file.append_record(&a(2)).unwrap(), 0);

    let record: Record = file.read_record(0).unwrap().unwrap();
    assert_eq!(record.get("a"), Some(&Value::Integer(2)));
    assert_eq!(file.number_of_records(), 1);
    assert_eq!(file.number_of_deleted_records(), 0);
}

#[test]
fn free_list_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.dat");
    {
        let file = RecordFile::open(&path, 257).unwrap();
        file.append_records(&[a(0), a(1), a(2), a(3)]).unwrap();
        file.delete_record(1).unwrap();
        file.delete_record(3).unwrap();
        file.sync().unwrap();
    }

    let file = RecordFile::open(&path, 257).unwrap();
    assert_eq!(file.number_of_records(), 2);
    assert_eq!(file.number_of_deleted_records(), 2);
    assert_eq!(file.append_record(&a(30)).unwrap(), 3);
    assert_eq!(file.append_record(&a(10)).unwrap(), 1);
    assert_eq!(file.append_record(&a(4)).unwrap(), 4);

    let live: Vec<Record> = file.live_records().unwrap();
    let values: Vec<i64> = live
        .iter()
        .filter_map(|r| r.get("a").and_then(Value::as_integer))
        .collect();
    assert_eq!(values, vec![0, 10, 2, 30, 4]);
}

#[test]
fn reopening_with_another_record_length_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.dat");
    RecordFile::open(&path, 257).unwrap().append_record(&a(1)).unwrap();
    assert!(RecordFile::open(&path, 512).is_err());
}

#[test]
fn truncate_drops_tail_and_rechains() {
    let dir = tempdir().unwrap();
    let file = RecordFile::open(&dir.path().join("data.dat"), 257).unwrap();
    file.append_records(&[a(0), a(1), a(2), a(3), a(4)]).unwrap();
    file.delete_record(1).unwrap();
    file.delete_record(4).unwrap();

    file.truncate(3).unwrap();
    assert_eq!(file.total_number_of_records(), 3);
    assert_eq!(file.number_of_records(), 2);
    assert_eq!(file.number_of_deleted_records(), 1);
    assert_eq!(file.append_record(&a(9)).unwrap(), 1);
    assert_eq!(file.append_record(&a(8)).unwrap(), 3);
}
