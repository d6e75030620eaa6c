//! Named reader-writer locks with bounded waits.

use crate::error::{CoreError, CoreResult};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
}

#[derive(Debug, Default)]
struct Shared {
    states: Mutex<HashMap<String, LockState>>,
    released: Condvar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Read,
    Write,
}

/// Reader-writer locks keyed by name (table, index or record UUIDs).
///
/// Locks exist only while held or awaited. Acquisition waits at most the
/// configured timeout and then fails with [`CoreError::LockTimeout`].
/// Locks are not reentrant.
///
/// # Example
///
/// ```rust
/// use tabula_core::LockManager;
/// use std::time::Duration;
///
/// let locks = LockManager::new(Duration::from_millis(50));
/// let guard = locks.write("index-1").unwrap();
/// assert!(locks.read("index-1").is_err());
/// drop(guard);
/// assert!(locks.read("index-1").is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct LockManager {
    shared: Arc<Shared>,
    timeout: Duration,
}

impl LockManager {
    /// Creates a lock manager with the given acquisition timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            timeout,
        }
    }

    /// Acquires the shared lock for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockTimeout`] if a writer holds the lock for
    /// longer than the timeout.
    pub fn read(&self, name: &str) -> CoreResult<LockGuard> {
        self.acquire(name, LockMode::Read)
    }

    /// Acquires the exclusive lock for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockTimeout`] if the lock stays held for longer
    /// than the timeout.
    pub fn write(&self, name: &str) -> CoreResult<LockGuard> {
        self.acquire(name, LockMode::Write)
    }

    fn acquire(&self, name: &str, mode: LockMode) -> CoreResult<LockGuard> {
        let deadline = Instant::now() + self.timeout;
        let mut states = self.shared.states.lock();
        loop {
            let state = states.entry(name.to_string()).or_default();
            let free = match mode {
                LockMode::Read => !state.writer,
                LockMode::Write => !state.writer && state.readers == 0,
            };
            if free {
                match mode {
                    LockMode::Read => state.readers += 1,
                    LockMode::Write => state.writer = true,
                }
                return Ok(LockGuard {
                    shared: Arc::clone(&self.shared),
                    name: name.to_string(),
                    mode,
                });
            }

            if self
                .shared
                .released
                .wait_until(&mut states, deadline)
                .timed_out()
            {
                if let Some(state) = states.get(name) {
                    if !state.writer && state.readers == 0 {
                        states.remove(name);
                    }
                }
                return Err(CoreError::LockTimeout {
                    name: name.to_string(),
                    timeout: self.timeout,
                });
            }
        }
    }

    /// Returns true if any guard for `name` is alive.
    #[must_use]
    pub fn is_locked(&self, name: &str) -> bool {
        self.shared
            .states
            .lock()
            .get(name)
            .is_some_and(|state| state.writer || state.readers > 0)
    }
}

/// Releases a named lock on drop.
#[derive(Debug)]
pub struct LockGuard {
    shared: Arc<Shared>,
    name: String,
    mode: LockMode,
}

impl LockGuard {
    /// Name of the held lock.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut states = self.shared.states.lock();
        if let Some(state) = states.get_mut(&self.name) {
            match self.mode {
                LockMode::Read => state.readers = state.readers.saturating_sub(1),
                LockMode::Write => state.writer = false,
            }
            if !state.writer && state.readers == 0 {
                states.remove(&self.name);
            }
        }
        drop(states);
        self.shared.released.notify_all();
    }
}
