//! Benchmark utilities.

#![warn(missing_docs)]

use rand::distributions::Alphanumeric;
use rand::Rng;
use tabula_core::Record;

/// A random alphanumeric string of `len` characters.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// `count` records `{ id, name, score }` with random names and scores.
pub fn generate_records(count: usize, name_len: usize) -> Vec<Record> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|id| {
            Record::new()
                .with("id", id as i64)
                .with("name", random_text(name_len))
                .with("score", rng.gen_range(0..1_000i64))
        })
        .collect()
}
