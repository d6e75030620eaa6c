//! Engine configuration.

use std::time::Duration;

/// Configuration shared by record files and indices.
#[derive(Debug, Clone)]
pub struct Config {
    /// Slot length of table data files.
    pub data_record_length: usize,

    /// Slot length of B+Tree index files.
    pub btree_record_length: usize,

    /// Slot length of array index files.
    pub array_record_length: usize,

    /// Slot length of hash index files.
    pub hash_record_length: usize,

    /// Maximum number of keys per B+Tree node.
    pub btree_order: usize,

    /// Bucket count of a freshly created hash index.
    pub hash_initial_buckets: u64,

    /// Load factor above which a hash index starts resizing.
    pub hash_load_factor_threshold: f64,

    /// Maximum entries stored in one bucket chain record.
    pub hash_max_entries_per_record: usize,

    /// How long mutators wait for a named lock.
    pub lock_timeout: Duration,

    /// How long a resize may take before it is abandoned.
    pub resize_timeout: Duration,

    /// Entries per `insert_many` batch during refresh.
    pub refresh_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_record_length: 257,
            btree_record_length: 512,
            array_record_length: 257,
            hash_record_length: 512,
            btree_order: 3,
            hash_initial_buckets: 16,
            hash_load_factor_threshold: 0.75,
            hash_max_entries_per_record: 8,
            lock_timeout: Duration::from_secs(30),
            resize_timeout: Duration::from_secs(60),
            refresh_batch_size: 256,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data file slot length.
    #[must_use]
    pub const fn data_record_length(mut self, length: usize) -> Self {
        self.data_record_length = length;
        self
    }

    /// Sets the B+Tree file slot length.
    #[must_use]
    pub const fn btree_record_length(mut self, length: usize) -> Self {
        self.btree_record_length = length;
        self
    }

    /// Sets the array index file slot length.
    #[must_use]
    pub const fn array_record_length(mut self, length: usize) -> Self {
        self.array_record_length = length;
        self
    }

    /// Sets the hash file slot length.
    #[must_use]
    pub const fn hash_record_length(mut self, length: usize) -> Self {
        self.hash_record_length = length;
        self
    }

    /// Sets the B+Tree order.
    #[must_use]
    pub const fn btree_order(mut self, order: usize) -> Self {
        self.btree_order = order;
        self
    }

    /// Sets the initial hash bucket count.
    #[must_use]
    pub const fn hash_initial_buckets(mut self, buckets: u64) -> Self {
        self.hash_initial_buckets = buckets;
        self
    }

    /// Sets the hash load factor threshold.
    #[must_use]
    pub const fn hash_load_factor_threshold(mut self, threshold: f64) -> Self {
        self.hash_load_factor_threshold = threshold;
        self
    }

    /// Sets the maximum entries per bucket chain record.
    #[must_use]
    pub const fn hash_max_entries_per_record(mut self, entries: usize) -> Self {
        self.hash_max_entries_per_record = entries;
        self
    }

    /// Sets the named lock timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the resize timeout.
    #[must_use]
    pub const fn resize_timeout(mut self, timeout: Duration) -> Self {
        self.resize_timeout = timeout;
        self
    }

    /// Sets the refresh batch size.
    #[must_use]
    pub const fn refresh_batch_size(mut self, size: usize) -> Self {
        self.refresh_batch_size = size;
        self
    }
}
