//! # bzsplit Core
//!
//! Core components for the bzsplit BZip2 decoder.
//!
//! This crate provides the layer the decoder is built on:
//!
//! - [`bitstream`]: MSB-first bit-level input with exact consumed-byte
//!   accounting (the basis for split-aware position reporting)
//! - [`crc`]: the BZip2 CRC-32 (big-endian polynomial, distinct from the
//!   zlib CRC-32) and the combined-CRC fold
//! - [`error`]: error types
//!
//! ## Example
//!
//! ```rust
//! use bzsplit_core::bitstream::BitReader;
//! use bzsplit_core::crc::Crc32;
//! use std::io::Cursor;
//!
//! let data = vec![0x31, 0x41];
//! let mut reader = BitReader::new(Cursor::new(data));
//! let bits = reader.read_bits(12).unwrap();
//! assert_eq!(bits, 0x314);
//!
//! let crc = Crc32::compute(b"Hello, World!");
//! assert_ne!(crc, 0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bitstream;
pub mod crc;
pub mod error;

// Re-exports for convenience
pub use bitstream::BitReader;
pub use crc::Crc32;
pub use error::{BzError, Result};
