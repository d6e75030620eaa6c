//! Index behaviour driven through tables.

use std::time::Duration;
use tabula_core::{ColumnType, Config, Record, ResizeState, Table, TableIndex, Value};
use tempfile::tempdir;

fn slots(records: Vec<Record>) -> Vec<u64> {
    let mut slots: Vec<u64> = records.iter().filter_map(Record::index).collect();
    slots.sort_unstable();
    slots
}

#[test]
fn banana_five_times() {
    let dir = tempdir().unwrap();
    let table = Table::open(dir.path(), "fruit", Config::default().btree_order(3)).unwrap();
    let index = table
        .create_btree_index("by_name", "name", ColumnType::Text, false)
        .unwrap();
    let banana = Value::from("banana");

    let addresses: Vec<u64> = (0..5)
        .map(|_| table.insert(&Record::new().with("name", "banana")).unwrap())
        .collect();
    assert_eq!(slots(index.equal(Some(&banana)).unwrap()), addresses);

    table.delete(addresses[2]).unwrap();
    assert_eq!(index.equal(Some(&banana)).unwrap().len(), 4);

    for address in &addresses {
        table.delete(*address).unwrap();
    }
    assert!(index.equal(Some(&banana)).unwrap().is_empty());
}

#[test]
fn duplicates_removed_one_at_a_time() {
    let table = Table::in_memory("t", Config::default()).unwrap();
    let index = table
        .create_btree_index("by_k", "k", ColumnType::Integer, false)
        .unwrap();
    let key = Value::Integer(42);
    let mut addresses: Vec<u64> = (0..12)
        .map(|i| {
            let k = if i % 3 == 0 { 7 } else { 42 };
            table.insert(&Record::new().with("k", k as i64)).unwrap()
        })
        .filter(|address| address % 3 != 0)
        .collect();

    while let Some(address) = addresses.pop() {
        table.delete(address).unwrap();
        assert_eq!(slots(index.equal(Some(&key)).unwrap()), addresses);
    }
    assert_eq!(index.equal(Some(&Value::Integer(7))).unwrap().len(), 4);
}

#[test]
fn btree_index_reopens_without_rebuild() {
    let dir = tempdir().unwrap();
    {
        let table = Table::open(dir.path(), "t", Config::default()).unwrap();
        table
            .create_btree_index("by_n", "n", ColumnType::Integer, false)
            .unwrap();
        for n in 0..50i64 {
            table.insert(&Record::new().with("n", n)).unwrap();
        }
        table.sync().unwrap();
    }

    let table = Table::open(dir.path(), "t", Config::default()).unwrap();
    let index = table
        .create_btree_index("by_n", "n", ColumnType::Integer, false)
        .unwrap();
    assert_eq!(
        index
            .between(Some(&Value::Integer(10)), Some(&Value::Integer(19)))
            .unwrap()
            .len(),
        10
    );
}

#[test]
fn hash_resize_is_transparent() {
    let dir = tempdir().unwrap();
    let config = Config::default()
        .hash_initial_buckets(4)
        .hash_load_factor_threshold(0.75);
    let table = Table::open(dir.path(), "codes", config).unwrap();
    let index = table
        .create_hash_index("by_code", "code", ColumnType::Text, false)
        .unwrap();
    assert_eq!(index.number_of_buckets(), 4);

    let mut inserted = Vec::new();
    for n in 0..200 {
        let code = format!("code-{n}");
        let address = table.insert(&Record::new().with("code", code.as_str())).unwrap();
        inserted.push((code, address));
    }
    assert!(index.wait_for_resize(Duration::from_secs(30)).unwrap());

    assert_eq!(index.resize_state(), ResizeState::Idle);
    assert_eq!(index.number_of_entries(), 200);
    assert!(index.number_of_buckets() > 4);
    assert!(index.load_factor() <= 0.75);
    for (code, address) in &inserted {
        assert_eq!(
            slots(index.equal(Some(&Value::from(code.as_str()))).unwrap()),
            vec![*address]
        );
    }
}

#[test]
fn array_membership_and_identity() {
    let table = Table::in_memory("posts", Config::default()).unwrap();
    let index = table
        .create_array_index("by_tag", "tags", ColumnType::array_of(ColumnType::Text), false)
        .unwrap();
    let tags = |items: &[&str]| Value::Array(items.iter().map(|s| Value::from(*s)).collect());

    let rust = table
        .insert(&Record::new().with("tags", tags(&["rust", "db"])))
        .unwrap();
    let reversed = table
        .insert(&Record::new().with("tags", tags(&["db", "rust"])))
        .unwrap();
    let null = table.insert(&Record::new().with("tags", Value::Null)).unwrap();
    let absent = table.insert(&Record::new()).unwrap();

    assert_eq!(
        slots(index.includes(&Value::from("rust")).unwrap()),
        vec![rust, reversed]
    );
    assert_eq!(slots(index.equal(Some(&tags(&["rust", "db"]))).unwrap()), vec![rust]);
    assert_eq!(slots(index.equal(Some(&Value::Null)).unwrap()), vec![null]);
    assert_eq!(slots(index.equal(None).unwrap()), vec![absent]);

    table
        .update(rust, &Record::new().with("tags", tags(&["go"])))
        .unwrap();
    assert_eq!(slots(index.includes(&Value::from("rust")).unwrap()), vec![reversed]);
    assert_eq!(slots(index.includes(&Value::from("go")).unwrap()), vec![rust]);
}

#[test]
fn every_index_agrees_with_scan_on_equality() {
    let dir = tempdir().unwrap();
    let table = Table::open(dir.path(), "t", Config::default()).unwrap();
    let values = [
        Some(Value::from("a")),
        Some(Value::from("b")),
        Some(Value::Null),
        None,
        Some(Value::from("a")),
    ];
    for value in &values {
        let mut record = Record::new().with("other", 1i64);
        if let Some(value) = value {
            record.insert("v", value.clone());
        }
        table.insert(&record).unwrap();
    }
    let scan = table.index_for("v");
    let btree = table
        .create_btree_index("btree", "v", ColumnType::Text, false)
        .unwrap();
    let hash = table
        .create_hash_index("hash", "v", ColumnType::Text, false)
        .unwrap();

    for value in &values {
        let expected = slots(scan.equal(value.as_ref()).unwrap());
        assert_eq!(slots(btree.equal(value.as_ref()).unwrap()), expected);
        assert_eq!(slots(hash.equal(value.as_ref()).unwrap()), expected);
    }
}
