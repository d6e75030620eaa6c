//! # Tabula Storage
//!
//! Byte-store backends for the Tabula storage engine.
//!
//! A backend is a **seekable byte device**: it can read and write at any
//! offset, report its size and shrink. It has no idea what the bytes mean.
//! Slot layouts, headers and free lists all belong to `tabula_core`.
//!
//! ## Design Principles
//!
//! - Positional reads and writes (`read_at` / `write_at`) plus `append`
//! - Writes past the end grow the store, zero-filling any gap
//! - Must be `Send + Sync` so record files can be shared across threads
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral tables
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use tabula_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.write_at(4, b"slot").unwrap();
//! assert_eq!(backend.size().unwrap(), 8);
//! assert_eq!(backend.read_at(0, 8).unwrap(), b"\0\0\0\0slot");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
