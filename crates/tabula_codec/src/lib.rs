//! # Tabula Codec
//!
//! Document values and slot framing for the Tabula storage engine.
//!
//! Every record file slot holds one length-prefixed CBOR document padded to
//! the file's fixed record length. This crate provides:
//! - [`Value`], the dynamic document value stored in table columns
//! - [`encode_slot`] / [`decode_slot`], which frame any serde type into a slot
//!
//! ## Slot Format
//!
//! ```text
//! | payload_len: u32 LE (4) | CBOR payload (payload_len) | zero padding |
//! ```
//!
//! A zero `payload_len` marks a slot that was never written.
//!
//! ## Usage
//!
//! ```
//! use tabula_codec::{decode_slot, encode_slot, Value};
//!
//! let value = Value::Array(vec![Value::from("a"), Value::from(2i64)]);
//! let slot = encode_slot(&value, 64).unwrap();
//! assert_eq!(slot.len(), 64);
//!
//! let decoded: Option<Value> = decode_slot(&slot).unwrap();
//! assert_eq!(decoded, Some(value));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod slot;
mod value;

pub use error::{CodecError, CodecResult};
pub use slot::{decode_slot, encode_slot, from_cbor, to_cbor, SLOT_PREFIX_SIZE};
pub use value::Value;
