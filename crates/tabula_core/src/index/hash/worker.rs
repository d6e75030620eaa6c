//! Background rebuild of a hash index into a larger file.

use super::file::HashFile;
use super::EntryKey;
use crate::error::{CoreError, CoreResult};
use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use parking_lot::RwLock;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tabula_codec::Value;
use tracing::{debug, warn};

/// A mutation mirrored onto the file being rebuilt.
#[derive(Debug, Clone)]
pub(crate) enum HashOperation {
    Insert { key: Option<Value>, address: u64 },
    Delete { key: Option<Value>, address: u64 },
    InsertMany { entries: Vec<(EntryKey, u64)> },
}

impl HashOperation {
    pub fn apply(&self, file: &mut HashFile, unique: bool) -> CoreResult<()> {
        match self {
            Self::Insert { key, address } => {
                file.insert(key.as_ref(), *address, unique)?;
            }
            Self::Delete { key, address } => {
                file.delete(key.as_ref(), *address)?;
            }
            Self::InsertMany { entries } => {
                file.insert_many(entries.clone(), unique)?;
            }
        }
        Ok(())
    }
}

/// Rebuild `source` into `target`.
///
/// The worker copies `source` to `snapshot` while holding a read guard on
/// `live`, so the copy never sees a half-applied mutation. Mutations made
/// between the request and the copy are in the copy and also replayed
/// afterwards; replaying a pair insert or delete is a no-op.
#[derive(Debug, Clone)]
pub(crate) struct BuildRequest {
    pub live: Arc<RwLock<HashFile>>,
    pub source: PathBuf,
    pub snapshot: PathBuf,
    pub target: PathBuf,
    pub buckets: u64,
    pub threshold: f64,
    pub unique: bool,
    pub record_length: usize,
    pub max_entries: usize,
}

#[derive(Debug)]
pub(crate) enum WorkerRequest {
    Build(BuildRequest),
    Apply(HashOperation),
    Finalize,
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WorkerEvent {
    ReadyForLiveUpdates,
    Finalized,
    Error(String),
    Stopped,
}

/// Handle to the resize thread.
pub(crate) struct Worker {
    requests: Sender<WorkerRequest>,
    events: Receiver<WorkerEvent>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(name: &str) -> CoreResult<Self> {
        let (requests, request_rx) = unbounded();
        let (event_tx, events) = unbounded();
        let handle = thread::Builder::new()
            .name(format!("tabula-hash-resize-{name}"))
            .spawn(move || run(&request_rx, &event_tx))
            .map_err(|e| CoreError::Io(io::Error::other(e)))?;
        Ok(Self {
            requests,
            events,
            handle: Some(handle),
        })
    }

    /// Sends a request; false if the thread is gone.
    pub fn send(&self, request: WorkerRequest) -> bool {
        self.requests.send(request).is_ok()
    }

    /// Next pending event, `Err` if the thread exited without saying so.
    pub fn try_event(&self) -> Result<Option<WorkerEvent>, TryRecvError> {
        match self.events.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Stops the thread and waits for it.
    pub fn stop(&mut self) {
        let _ = self.requests.send(WorkerRequest::Stop);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("hash resize worker panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn copy_live(request: &BuildRequest) -> CoreResult<()> {
    let live = request.live.read();
    live.sync()?;
    fs::copy(&request.source, &request.snapshot)?;
    Ok(())
}

fn build(request: &BuildRequest) -> CoreResult<HashFile> {
    copy_live(request)?;
    let snapshot = HashFile::open(&request.snapshot, request.record_length, request.max_entries)?;
    let entries = snapshot.all_entries()?;
    drop(snapshot);

    let mut target = HashFile::create(
        &request.target,
        request.buckets,
        request.threshold,
        request.record_length,
        request.max_entries,
    )?;
    let count = entries.len();
    target.insert_many(entries, request.unique)?;
    debug!(entries = count, buckets = request.buckets, "rebuilt hash snapshot");
    Ok(target)
}

fn run(requests: &Receiver<WorkerRequest>, events: &Sender<WorkerEvent>) {
    let mut target: Option<(HashFile, bool)> = None;

    while let Ok(request) = requests.recv() {
        let outcome = match request {
            WorkerRequest::Build(build_request) => match build(&build_request) {
                Ok(file) => {
                    target = Some((file, build_request.unique));
                    Ok(Some(WorkerEvent::ReadyForLiveUpdates))
                }
                Err(err) => Err(err),
            },
            WorkerRequest::Apply(operation) => match target.as_mut() {
                Some((file, unique)) => operation.apply(file, *unique).map(|()| None),
                None => Err(CoreError::resize_aborted("live update before build")),
            },
            WorkerRequest::Finalize => match target.take() {
                Some((file, _)) => file.sync().map(|()| Some(WorkerEvent::Finalized)),
                None => Err(CoreError::resize_aborted("finalize before build")),
            },
            WorkerRequest::Stop => break,
        };

        let event = match outcome {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(err) => {
                target = None;
                WorkerEvent::Error(err.to_string())
            }
        };
        if events.send(event).is_err() {
            return;
        }
    }

    let _ = events.send(WorkerEvent::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    fn wait(worker: &Worker) -> WorkerEvent {
        worker
            .events
            .recv_timeout(Duration::from_secs(10))
            .unwrap()
    }

    fn live(path: &Path, count: u64) -> Arc<RwLock<HashFile>> {
        let mut file = HashFile::create(path, 2, 0.75, 512, 4).unwrap();
        for i in 0..count {
            file.insert(Some(&Value::Integer(i as i64)), i, false).unwrap();
        }
        Arc::new(RwLock::new(file))
    }

    fn request(live: &Arc<RwLock<HashFile>>, source: &Path, dir: &Path) -> BuildRequest {
        BuildRequest {
            live: Arc::clone(live),
            source: source.to_path_buf(),
            snapshot: dir.join("snap.hash"),
            target: dir.join("target.hash"),
            buckets: 8,
            threshold: 0.75,
            unique: false,
            record_length: 512,
            max_entries: 4,
        }
    }

    #[test]
    fn builds_applies_and_finalizes() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("live.hash");
        let live = live(&source, 5);

        let worker = Worker::spawn("test").unwrap();
        assert!(worker.send(WorkerRequest::Build(request(&live, &source, dir.path()))));
        assert_eq!(wait(&worker), WorkerEvent::ReadyForLiveUpdates);
        assert!(dir.path().join("snap.hash").exists());

        worker.send(WorkerRequest::Apply(HashOperation::Insert {
            key: Some(Value::Integer(9)),
            address: 9,
        }));
        worker.send(WorkerRequest::Apply(HashOperation::Delete {
            key: Some(Value::Integer(0)),
            address: 0,
        }));
        worker.send(WorkerRequest::Finalize);
        assert_eq!(wait(&worker), WorkerEvent::Finalized);

        let rebuilt = HashFile::open(&dir.path().join("target.hash"), 512, 4).unwrap();
        assert_eq!(rebuilt.header().number_of_buckets, 8);
        assert_eq!(rebuilt.header().number_of_entries, 5);
        assert_eq!(rebuilt.lookup(Some(&Value::Integer(9))).unwrap(), vec![9]);
        assert!(rebuilt.lookup(Some(&Value::Integer(0))).unwrap().is_empty());
    }

    #[test]
    fn mutations_before_the_copy_are_not_counted_twice() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("live.hash");
        let live = live(&source, 3);

        let worker = Worker::spawn("test").unwrap();
        {
            // the worker cannot copy until this guard is gone
            let mut guard = live.write();
            worker.send(WorkerRequest::Build(request(&live, &source, dir.path())));
            guard.insert(Some(&Value::Integer(7)), 7, false).unwrap();
            guard.delete(Some(&Value::Integer(1)), 1).unwrap();
        }
        assert_eq!(wait(&worker), WorkerEvent::ReadyForLiveUpdates);
        worker.send(WorkerRequest::Apply(HashOperation::Insert {
            key: Some(Value::Integer(7)),
            address: 7,
        }));
        worker.send(WorkerRequest::Apply(HashOperation::Delete {
            key: Some(Value::Integer(1)),
            address: 1,
        }));
        worker.send(WorkerRequest::Finalize);
        assert_eq!(wait(&worker), WorkerEvent::Finalized);

        let rebuilt = HashFile::open(&dir.path().join("target.hash"), 512, 4).unwrap();
        assert_eq!(rebuilt.header().number_of_entries, 3);
        assert_eq!(rebuilt.lookup(Some(&Value::Integer(7))).unwrap(), vec![7]);
        assert!(rebuilt.lookup(Some(&Value::Integer(1))).unwrap().is_empty());
    }

    #[test]
    fn missing_source_reports_error() {
        let dir = tempdir().unwrap();
        let live = live(&dir.path().join("live.hash"), 1);
        let worker = Worker::spawn("test").unwrap();
        worker.send(WorkerRequest::Build(request(
            &live,
            &dir.path().join("missing.hash"),
            dir.path(),
        )));
        assert!(matches!(wait(&worker), WorkerEvent::Error(_)));
    }

    #[test]
    fn stop_acknowledges() {
        let mut worker = Worker::spawn("test").unwrap();
        worker.send(WorkerRequest::Stop);
        assert_eq!(wait(&worker), WorkerEvent::Stopped);
        worker.stop();
    }
}
