//! Streaming BZip2 decompression for split-aware readers.
//!
//! This crate decodes the BZip2 block format from any byte source and, in
//! addition to plain streaming decompression, supports *by-block* reading:
//! the decoder resynchronizes to the (non byte-aligned) 48-bit block
//! delimiter and reports, at each block boundary, the exact byte offset in
//! the compressed source where the next block begins. Parallel readers use
//! those offsets to hand out compressed-byte ranges to workers.
//!
//! The pipeline is the classic BZip2 inverse chain: bit-level unpacking,
//! canonical Huffman decoding over up to six switched tables, inverse
//! move-to-front with run-length expansion, inverse Burrows-Wheeler
//! transform, optional block de-randomization, and per-block plus combined
//! CRC verification.
//!
//! # Example
//!
//! ```no_run
//! use bzsplit_decoder::{BzDecoder, ReadMode};
//! use std::fs::File;
//! use std::io::Read;
//!
//! // `File` contains a .bz2 stream with the two "BZ" magic bytes stripped.
//! let file = File::open("data.bz2.headerless").unwrap();
//! let mut decoder = BzDecoder::new(file, ReadMode::Continuous).unwrap();
//! let mut out = Vec::new();
//! decoder.read_to_end(&mut out).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod block;
pub mod huffman;
mod ibwt;
pub mod marker;
pub mod position;
pub mod rand;
mod stream;

pub use bzsplit_core::error::{BzError, Result};
pub use stream::{BzDecoder, ReadMode, ReadOutcome, ReadStatus};

/// 48-bit delimiter that starts every block (`0x314159265359`).
pub const BLOCK_DELIMITER: u64 = 0x3141_5926_5359;

/// 48-bit delimiter that ends a stream (`0x177245385090`), followed by the
/// 32-bit combined CRC.
pub const EOS_DELIMITER: u64 = 0x1772_4538_5090;

/// Bit length of the block and end-of-stream delimiters.
pub const DELIMITER_BITS: u32 = 48;

/// Symbols per Huffman selector group.
pub const G_SIZE: usize = 50;

/// Maximum number of Huffman tables per block.
pub const N_GROUPS: usize = 6;

/// Maximum Huffman alphabet size (256 byte values + RUNA/RUNB, compacted).
pub const MAX_ALPHA_SIZE: usize = 258;

/// Maximum number of selector entries per block.
pub const MAX_SELECTORS: usize = 2 + 900_000 / G_SIZE;

/// Maximum Huffman code length.
pub const MAX_CODE_LEN: usize = 23;

/// Run-length symbol contributing `2^k` during MTF decode.
pub const RUN_A: u16 = 0;

/// Run-length symbol contributing `2 * 2^k` during MTF decode.
pub const RUN_B: u16 = 1;

/// Block size granularity; a stream at level `n` uses blocks of
/// `n * BASE_BLOCK_SIZE` bytes.
pub const BASE_BLOCK_SIZE: usize = 100_000;

/// Largest possible block size (level 9).
pub const MAX_BLOCK_SIZE: usize = 9 * BASE_BLOCK_SIZE;
