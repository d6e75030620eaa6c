//! Hash table index with online resize.

use super::file::{HashFile, HashHeader};
use super::worker::{BuildRequest, HashOperation, Worker, WorkerEvent, WorkerRequest};
use super::EntryKey;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::index::resolve;
use crate::index::traits::{IndexSpec, TableIndex};
use crate::lock::LockManager;
use crate::record::Record;
use crate::record_file::RecordFile;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tabula_codec::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Progress of an online resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeState {
    /// No resize running.
    Idle,
    /// The worker is rebuilding a snapshot; mutations are queued.
    Building,
    /// The rebuilt file receives mutations as they happen.
    ReadyForLiveUpdates,
    /// The worker is flushing; mutations are queued for the swap.
    Finalizing,
    /// The worker could not be restarted; no resize will start.
    Error,
}

struct Session {
    worker: Option<Worker>,
    state: ResizeState,
    snapshot_path: Option<PathBuf>,
    temp_path: Option<PathBuf>,
    queue: VecDeque<HashOperation>,
    started: Option<Instant>,
    closed: bool,
}

fn remove_if_present(path: &Path) -> CoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{suffix}"));
    path.with_file_name(name)
}

/// A hash index that grows without blocking writers.
///
/// Supports `equal` and `in` only. Every mutation runs under the index's
/// named write lock and goes through these steps:
///
/// 1. collect worker events and move the resize forward
/// 2. apply the mutation to the live file
/// 3. mirror it onto the file being rebuilt (queued while the worker is
///    busy, sent straight away once it is ready)
/// 4. start a resize if the load factor passed the threshold, or ask the
///    worker to finish one that is ready
///
/// A resize has the worker copy the live file and rebuild the copy with at
/// least twice the buckets, then swaps the rebuilt file in. Because mutations always land
/// on the live file first, an aborted resize loses nothing.
pub struct HashTableIndex {
    spec: IndexSpec,
    data: Arc<RecordFile>,
    path: PathBuf,
    config: Config,
    live: Arc<RwLock<HashFile>>,
    session: Mutex<Session>,
    locks: LockManager,
}

impl std::fmt::Debug for HashTableIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashTableIndex")
            .field("name", &self.spec.name)
            .field("column", &self.spec.column)
            .field("path", &self.path)
            .finish()
    }
}

impl HashTableIndex {
    /// Opens the hash index at `path`, building it from `data` if the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, a corrupt header, or an invalid configuration.
    pub fn open(path: &Path, spec: IndexSpec, data: Arc<RecordFile>, config: &Config) -> CoreResult<Self> {
        if config.hash_initial_buckets == 0 || config.hash_max_entries_per_record == 0 {
            return Err(CoreError::illegal_argument(
                "hash index needs buckets and room for entries",
            ));
        }
        if config.hash_load_factor_threshold <= 0.0 {
            return Err(CoreError::illegal_argument("load factor threshold must be positive"));
        }

        let fresh = !path.exists();
        let file = if fresh {
            HashFile::create(
                path,
                config.hash_initial_buckets,
                config.hash_load_factor_threshold,
                config.hash_record_length,
                config.hash_max_entries_per_record,
            )?
        } else {
            HashFile::open(path, config.hash_record_length, config.hash_max_entries_per_record)?
        };

        let index = Self {
            session: Mutex::new(Session {
                worker: Some(Worker::spawn(&spec.name)?),
                state: ResizeState::Idle,
                snapshot_path: None,
                temp_path: None,
                queue: VecDeque::new(),
                started: None,
                closed: false,
            }),
            locks: LockManager::new(config.lock_timeout),
            spec,
            data,
            path: path.to_path_buf(),
            config: config.clone(),
            live: Arc::new(RwLock::new(file)),
        };
        if fresh {
            index.refresh()?;
        }
        Ok(index)
    }

    fn lock_name(&self) -> String {
        self.spec.uuid.to_string()
    }

    fn mutate(&self, operation: HashOperation) -> CoreResult<()> {
        let _lock = self.locks.write(&self.lock_name())?;
        let mut session = self.session.lock();
        if session.closed {
            return Err(CoreError::illegal_argument(format!(
                "hash index {} is closed",
                self.spec.name
            )));
        }
        self.pump(&mut session)?;
        operation.apply(&mut self.live.write(), self.spec.unique)?;
        self.mirror(&mut session, operation)?;
        self.advance(&mut session)
    }

    fn mirror(&self, session: &mut Session, operation: HashOperation) -> CoreResult<()> {
        match session.state {
            ResizeState::Building | ResizeState::Finalizing => session.queue.push_back(operation),
            ResizeState::ReadyForLiveUpdates => {
                let sent = session
                    .worker
                    .as_ref()
                    .is_some_and(|worker| worker.send(WorkerRequest::Apply(operation)));
                if !sent {
                    self.abort(session, "worker stopped accepting updates")?;
                }
            }
            ResizeState::Idle | ResizeState::Error => {}
        }
        Ok(())
    }

    /// Drains worker events and enforces the resize timeout.
    fn pump(&self, session: &mut Session) -> CoreResult<()> {
        if session.state == ResizeState::Error {
            self.respawn(session);
        }

        loop {
            let event = match session.worker.as_ref().map(Worker::try_event) {
                Some(Ok(Some(event))) => event,
                Some(Ok(None)) | None => break,
                Some(Err(_)) => {
                    self.abort(session, "worker disconnected")?;
                    break;
                }
            };
            match event {
                WorkerEvent::ReadyForLiveUpdates if session.state == ResizeState::Building => {
                    let queued: Vec<HashOperation> = session.queue.drain(..).collect();
                    let sent = session.worker.as_ref().is_some_and(|worker| {
                        queued
                            .into_iter()
                            .all(|operation| worker.send(WorkerRequest::Apply(operation)))
                    });
                    if sent {
                        debug!(index = %self.spec.uuid, "hash resize ready for live updates");
                        session.state = ResizeState::ReadyForLiveUpdates;
                    } else {
                        self.abort(session, "worker stopped accepting updates")?;
                    }
                }
                WorkerEvent::Finalized if session.state == ResizeState::Finalizing => {
                    if let Err(err) = self.swap(session) {
                        warn!(index = %self.spec.uuid, error = %err, "hash resize swap failed");
                        self.abort(session, &err.to_string())?;
                    }
                }
                WorkerEvent::Error(reason) => self.abort(session, &reason)?,
                WorkerEvent::Stopped if session.state != ResizeState::Idle => {
                    self.abort(session, "worker stopped")?;
                }
                other => debug!(index = %self.spec.uuid, event = ?other, "ignoring worker event"),
            }
        }

        let running = matches!(
            session.state,
            ResizeState::Building | ResizeState::ReadyForLiveUpdates | ResizeState::Finalizing
        );
        if running
            && session
                .started
                .is_some_and(|started| started.elapsed() > self.config.resize_timeout)
        {
            self.abort(session, "resize timed out")?;
        }
        Ok(())
    }

    fn advance(&self, session: &mut Session) -> CoreResult<()> {
        match session.state {
            ResizeState::Idle => {
                if self.live.read().load_factor_exceeded() {
                    self.launch(session)?;
                }
            }
            ResizeState::ReadyForLiveUpdates => {
                let sent = session
                    .worker
                    .as_ref()
                    .is_some_and(|worker| worker.send(WorkerRequest::Finalize));
                if sent {
                    session.state = ResizeState::Finalizing;
                } else {
                    self.abort(session, "worker stopped accepting updates")?;
                }
            }
            ResizeState::Building | ResizeState::Finalizing | ResizeState::Error => {}
        }
        Ok(())
    }

    fn launch(&self, session: &mut Session) -> CoreResult<()> {
        let live = self.live.read();
        let header = live.header();
        let mut buckets = header.number_of_buckets.saturating_mul(2);
        while header.number_of_entries as f64 / buckets as f64 > header.load_factor_threshold / 2.0 {
            buckets = buckets.saturating_mul(2);
        }

        let tag = Uuid::new_v4();
        let snapshot = sibling(&self.path, &format!("{tag}.snapshot"));
        let target = sibling(&self.path, &format!("{tag}.resize"));
        let request = BuildRequest {
            live: Arc::clone(&self.live),
            source: self.path.clone(),
            snapshot: snapshot.clone(),
            target: target.clone(),
            buckets,
            threshold: header.load_factor_threshold,
            unique: self.spec.unique,
            record_length: self.config.hash_record_length,
            max_entries: self.config.hash_max_entries_per_record,
        };
        info!(
            index = %self.spec.uuid,
            entries = header.number_of_entries,
            from = header.number_of_buckets,
            to = buckets,
            "starting hash resize"
        );
        drop(live);

        session.snapshot_path = Some(snapshot);
        session.temp_path = Some(target);
        session.started = Some(Instant::now());
        session.queue.clear();
        session.state = ResizeState::Building;

        let sent = session
            .worker
            .as_ref()
            .is_some_and(|worker| worker.send(WorkerRequest::Build(request)));
        if !sent {
            self.abort(session, "worker not running")?;
        }
        Ok(())
    }

    fn swap(&self, session: &mut Session) -> CoreResult<()> {
        let temp = session
            .temp_path
            .take()
            .ok_or_else(|| CoreError::resize_aborted("no rebuilt file to swap in"))?;
        let mut rebuilt = HashFile::open(
            &temp,
            self.config.hash_record_length,
            self.config.hash_max_entries_per_record,
        )?;
        for operation in session.queue.drain(..) {
            operation.apply(&mut rebuilt, self.spec.unique)?;
        }
        rebuilt.sync()?;
        let buckets = rebuilt.header().number_of_buckets;

        let mut live = self.live.write();
        drop(std::mem::replace(&mut *live, rebuilt));
        remove_if_present(&self.path)?;
        fs::rename(&temp, &self.path)?;
        *live = HashFile::open(
            &self.path,
            self.config.hash_record_length,
            self.config.hash_max_entries_per_record,
        )?;
        drop(live);

        if let Some(snapshot) = session.snapshot_path.take() {
            remove_if_present(&snapshot)?;
        }
        let elapsed = session.started.take().map(|started| started.elapsed());
        session.state = ResizeState::Idle;
        info!(index = %self.spec.uuid, buckets, ?elapsed, "hash resize complete");
        Ok(())
    }

    /// Abandons a running resize. The live file already holds every
    /// mutation, so only the worker and its files are discarded.
    fn abort(&self, session: &mut Session, reason: &str) -> CoreResult<()> {
        if session.state != ResizeState::Idle {
            warn!(index = %self.spec.uuid, %reason, "aborting hash resize");
        }
        if let Some(mut worker) = session.worker.take() {
            worker.stop();
        }
        self.discard_files(session)?;
        session.queue.clear();
        session.started = None;
        session.state = ResizeState::Idle;
        if !session.closed {
            self.respawn(session);
        }
        Ok(())
    }

    fn respawn(&self, session: &mut Session) {
        match Worker::spawn(&self.spec.name) {
            Ok(worker) => {
                session.worker = Some(worker);
                if session.state == ResizeState::Error {
                    session.state = ResizeState::Idle;
                }
            }
            Err(err) => {
                warn!(index = %self.spec.uuid, error = %err, "cannot start hash resize worker");
                session.state = ResizeState::Error;
            }
        }
    }

    fn discard_files(&self, session: &mut Session) -> CoreResult<()> {
        for path in [session.snapshot_path.take(), session.temp_path.take()]
            .into_iter()
            .flatten()
        {
            remove_if_present(&path)?;
        }
        Ok(())
    }

    /// Waits until no resize is running, finishing one that is pending.
    ///
    /// Returns false if `timeout` passed first.
    ///
    /// # Errors
    ///
    /// Fails if the index lock cannot be taken or the swap fails on I/O.
    pub fn wait_for_resize(&self, timeout: Duration) -> CoreResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let _lock = self.locks.write(&self.lock_name())?;
                let mut session = self.session.lock();
                self.pump(&mut session)?;
                if !session.closed {
                    self.advance(&mut session)?;
                }
                if matches!(session.state, ResizeState::Idle | ResizeState::Error) {
                    return Ok(true);
                }
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Stops the resize worker and removes temporary files. Mutations fail
    /// afterwards; queries keep working.
    ///
    /// # Errors
    ///
    /// Fails if temporary files cannot be removed or the live file cannot
    /// be synced.
    pub fn close(&self) -> CoreResult<()> {
        let mut session = self.session.lock();
        if session.closed {
            return Ok(());
        }
        session.closed = true;
        if let Some(mut worker) = session.worker.take() {
            worker.stop();
        }
        session.queue.clear();
        session.state = ResizeState::Idle;
        self.discard_files(&mut session)?;
        self.live.read().sync()
    }

    /// Current resize state.
    #[must_use]
    pub fn resize_state(&self) -> ResizeState {
        self.session.lock().state
    }

    /// Bucket count of the live file.
    #[must_use]
    pub fn number_of_buckets(&self) -> u64 {
        self.live.read().header().number_of_buckets
    }

    /// Entry count of the live file.
    #[must_use]
    pub fn number_of_entries(&self) -> u64 {
        self.live.read().header().number_of_entries
    }

    /// Entries per bucket in the live file.
    #[must_use]
    pub fn load_factor(&self) -> f64 {
        self.live.read().load_factor()
    }

    /// Header of the live file.
    #[must_use]
    pub fn header(&self) -> HashHeader {
        self.live.read().header().clone()
    }

    /// Path of the live file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lookup(&self, value: Option<&Value>) -> CoreResult<Vec<u64>> {
        self.live.read().lookup(value)
    }
}

impl TableIndex for HashTableIndex {
    fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    fn kind(&self) -> &'static str {
        "hash index"
    }

    fn insert(&self, value: Option<&Value>, address: u64) -> CoreResult<()> {
        self.mutate(HashOperation::Insert {
            key: value.cloned(),
            address,
        })
    }

    fn delete(&self, value: Option<&Value>, address: u64) -> CoreResult<()> {
        self.mutate(HashOperation::Delete {
            key: value.cloned(),
            address,
        })
    }

    fn refresh(&self) -> CoreResult<()> {
        let entries: Vec<(EntryKey, u64)> = self
            .data
            .live_records::<Record>()?
            .into_iter()
            .filter_map(|record| {
                let address = record.index()?;
                Some((EntryKey::from_operand(record.get(&self.spec.column)), address))
            })
            .collect();
        let count = entries.len();

        {
            let _lock = self.locks.write(&self.lock_name())?;
            let mut session = self.session.lock();
            if session.closed {
                return Err(CoreError::illegal_argument(format!(
                    "hash index {} is closed",
                    self.spec.name
                )));
            }
            if session.state != ResizeState::Idle {
                self.abort(&mut session, "index refresh")?;
            }
            self.live.write().reset(self.config.hash_initial_buckets)?;

            for batch in entries.chunks(self.config.refresh_batch_size.max(1)) {
                let operation = HashOperation::InsertMany {
                    entries: batch.to_vec(),
                };
                self.pump(&mut session)?;
                operation.apply(&mut self.live.write(), self.spec.unique)?;
                self.mirror(&mut session, operation)?;
                self.advance(&mut session)?;
            }
        }

        if !self.wait_for_resize(self.config.resize_timeout)? {
            warn!(index = %self.spec.uuid, "hash resize still running after refresh");
        }
        info!(
            index = %self.spec.uuid,
            name = %self.spec.name,
            records = count,
            buckets = self.number_of_buckets(),
            "refreshed hash index"
        );
        Ok(())
    }

    fn equal(&self, value: Option<&Value>) -> CoreResult<Vec<Record>> {
        resolve(&self.data, self.lookup(value)?)
    }

    fn in_values(&self, values: &[Value]) -> CoreResult<Vec<Record>> {
        let mut addresses = Vec::new();
        for value in values {
            addresses.extend(self.lookup(Some(value))?);
        }
        resolve(&self.data, addresses)
    }
}

impl Drop for HashTableIndex {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(index = %self.spec.uuid, error = %err, "failed to close hash index");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColumnType, ErrorKind};
    use tempfile::tempdir;

    fn config() -> Config {
        Config::default()
            .hash_initial_buckets(2)
            .hash_max_entries_per_record(4)
    }

    fn spec() -> IndexSpec {
        IndexSpec::new("by_code", Uuid::new_v4(), "code", ColumnType::Integer)
    }

    fn slots(records: Vec<Record>) -> Vec<u64> {
        let mut slots: Vec<u64> = records.iter().filter_map(Record::index).collect();
        slots.sort_unstable();
        slots
    }

    fn table(dir: &Path, rows: i64) -> Arc<RecordFile> {
        let data = Arc::new(RecordFile::open(&dir.join("t.dat"), 257).unwrap());
        for code in 0..rows {
            data.append_record(&Record::new().with("code", code % 10))
                .unwrap();
        }
        data
    }

    #[test]
    fn refresh_builds_from_data() {
        let dir = tempdir().unwrap();
        let data = table(dir.path(), 40);
        let index =
            HashTableIndex::open(&dir.path().join("t.code.hash"), spec(), data, &config()).unwrap();

        assert_eq!(index.resize_state(), ResizeState::Idle);
        assert_eq!(index.number_of_entries(), 40);
        assert!(index.load_factor() <= 0.75);
        assert_eq!(
            slots(index.equal(Some(&Value::Integer(3))).unwrap()),
            vec![3, 13, 23, 33]
        );
        assert_eq!(
            index
                .in_values(&[Value::Integer(1), Value::Integer(2)])
                .unwrap()
                .len(),
            8
        );
    }

    #[test]
    fn grows_while_inserting() {
        let dir = tempdir().unwrap();
        let data = table(dir.path(), 0);
        let index = HashTableIndex::open(
            &dir.path().join("t.code.hash"),
            spec(),
            Arc::clone(&data),
            &config(),
        )
        .unwrap();

        for code in 0..100i64 {
            let record = Record::new().with("code", code);
            let address = data.append_record(&record).unwrap();
            index.insert(record.get("code"), address).unwrap();
        }
        assert!(index.wait_for_resize(Duration::from_secs(10)).unwrap());
        assert!(index.number_of_buckets() > 2);
        assert_eq!(index.number_of_entries(), 100);
        for code in [0i64, 57, 99] {
            assert_eq!(
                slots(index.equal(Some(&Value::Integer(code))).unwrap()),
                vec![code as u64]
            );
        }
    }

    #[test]
    fn deletes_during_resize_are_kept() {
        let dir = tempdir().unwrap();
        let data = table(dir.path(), 0);
        let index = HashTableIndex::open(
            &dir.path().join("t.code.hash"),
            spec(),
            Arc::clone(&data),
            &config(),
        )
        .unwrap();

        let mut addresses = Vec::new();
        for code in 0..30i64 {
            let record = Record::new().with("code", code);
            let address = data.append_record(&record).unwrap();
            index.insert(record.get("code"), address).unwrap();
            addresses.push(address);
        }
        for (code, address) in addresses.iter().enumerate().step_by(2) {
            index.delete(Some(&Value::Integer(code as i64)), *address).unwrap();
        }
        assert!(index.wait_for_resize(Duration::from_secs(10)).unwrap());
        assert_eq!(index.number_of_entries(), 15);
        assert!(index.equal(Some(&Value::Integer(4))).unwrap().is_empty());
        assert_eq!(slots(index.equal(Some(&Value::Integer(5))).unwrap()), vec![5]);
    }

    #[test]
    fn undefined_and_null_keys() {
        let dir = tempdir().unwrap();
        let data = Arc::new(RecordFile::open(&dir.path().join("t.dat"), 257).unwrap());
        data.append_records(&[
            Record::new().with("code", Value::Null),
            Record::new(),
            Record::new().with("code", 1i64),
        ])
        .unwrap();
        let index =
            HashTableIndex::open(&dir.path().join("t.code.hash"), spec(), data, &config()).unwrap();
        assert_eq!(slots(index.equal(None).unwrap()), vec![1]);
        assert_eq!(slots(index.equal(Some(&Value::Null)).unwrap()), vec![0]);
    }

    #[test]
    fn reopens_existing_file() {
        let dir = tempdir().unwrap();
        let data = table(dir.path(), 20);
        let path = dir.path().join("t.code.hash");
        let spec = spec();
        let buckets = {
            let index =
                HashTableIndex::open(&path, spec.clone(), Arc::clone(&data), &config()).unwrap();
            index.close().unwrap();
            index.number_of_buckets()
        };
        let index = HashTableIndex::open(&path, spec, data, &config()).unwrap();
        assert_eq!(index.number_of_buckets(), buckets);
        assert_eq!(index.number_of_entries(), 20);
    }

    #[test]
    fn only_equality_is_supported() {
        let dir = tempdir().unwrap();
        let data = table(dir.path(), 1);
        let index =
            HashTableIndex::open(&dir.path().join("t.code.hash"), spec(), data, &config()).unwrap();
        let err = index.greater(Some(&Value::Integer(0))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
        let err = index.like("%").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
    }

    #[test]
    fn closed_index_rejects_mutations() {
        let dir = tempdir().unwrap();
        let data = table(dir.path(), 1);
        let index =
            HashTableIndex::open(&dir.path().join("t.code.hash"), spec(), data, &config()).unwrap();
        index.close().unwrap();
        let err = index.insert(Some(&Value::Integer(1)), 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalArgument);
        assert_eq!(slots(index.equal(Some(&Value::Integer(0))).unwrap()), vec![0]);
    }

    #[test]
    fn leaves_no_temporary_files() {
        let dir = tempdir().unwrap();
        let data = table(dir.path(), 60);
        let index =
            HashTableIndex::open(&dir.path().join("t.code.hash"), spec(), data, &config()).unwrap();
        drop(index);
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["t.code.hash", "t.dat"]);
    }
}
