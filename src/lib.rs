//! vcdiff-stream: streaming VCDIFF (RFC 3284) sessions in Rust.
//!
//! The crate provides:
//! - A stream adapter (`stream`) that coalesces small writes into windows,
//!   dispatches them to a codec engine one at a time and hands the output
//!   back in order
//! - The codec engine contract and a pure-Rust VCDIFF engine (`codec`)
//! - The wire format layer (`vcdiff`) and dictionary matching (`hash`)
//! - Whole-buffer helpers (`oneshot`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vcdiff_stream::{DecodeOptions, EncodeOptions, HashedDictionary};
//! use vcdiff_stream::{vcdiff_decode_sync, vcdiff_encode_sync};
//!
//! let dictionary = b"hello old world";
//! let hashed = Arc::new(HashedDictionary::new(&dictionary[..]).unwrap());
//!
//! let delta = vcdiff_encode_sync(b"hello new world", &EncodeOptions::new(hashed)).unwrap();
//! let target = vcdiff_decode_sync(&delta, &DecodeOptions::new(&dictionary[..])).unwrap();
//! assert_eq!(target.as_ref(), b"hello new world");
//! ```
//!
//! # Streaming
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vcdiff_stream::{EncodeOptions, HashedDictionary, StreamState, VcdiffStream};
//!
//! let hashed = Arc::new(HashedDictionary::new(&b"shared dictionary"[..]).unwrap());
//! let mut stream = VcdiffStream::encoder(&EncodeOptions::new(hashed)).unwrap();
//! stream.write(&b"shared "[..]).unwrap();
//! stream.write(&b"dictionary bytes"[..]).unwrap();
//! stream.end().unwrap();
//!
//! let mut delta = Vec::new();
//! while !matches!(stream.state(), StreamState::Closed | StreamState::Errored) {
//!     while let Some(chunk) = stream.read() {
//!         delta.extend_from_slice(&chunk);
//!     }
//!     stream.wait();
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod hash;
pub mod oneshot;
pub mod stream;
pub mod vcdiff;

#[cfg(feature = "cli")]
pub mod cli;

pub use codec::{CodecEngine, Dispatched, EngineState, PendingRequest, VcdiffEngine};
pub use config::{DecodeOptions, EncodeOptions, FormatFlags, Mode, SessionConfig};
pub use error::{ErrorKind, VcdiffError};
pub use hash::HashedDictionary;
pub use oneshot::{create_decoder, create_encoder, vcdiff_decode, vcdiff_decode_sync, vcdiff_encode, vcdiff_encode_sync};
pub use stream::{Event, StreamState, StreamStats, VcdiffStream};
